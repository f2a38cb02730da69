//! Test pattern generation for single stuck-at faults
//!
//! This crate generates test patterns for combinational circuits, so that every
//! detectable single stuck-at fault makes at least one primary output differ from the
//! fault-free circuit.
//!
//! # Usage
//!
//! ```bash
//! # Show available commands
//! # At the moment, only .bench files are supported
//! stuckat help
//! # Show statistics about the circuit
//! stuckat show mydesign.bench
//! # Generate test patterns, after a random phase of up to 10000 patterns
//! stuckat atpg mydesign.bench -r 10000 --reverse -o atpg.test
//! ```
//!
//! # Algorithm
//!
//! Faults are first collapsed by structural equivalence. Each remaining fault is
//! targeted by a branch-and-bound search in the style of the D-algorithm:
//! * values of the fault-free and faulty circuits are kept separately, in three-valued logic;
//! * implication propagates forced values forward and backward, and undoes them on backtrack;
//! * unique sensitization fixes the side inputs of gates every fault effect must traverse;
//! * static learning and conflict-free assignments are precomputed to prune the search.
//!
//! Every pattern found is verified by simulation. Fault simulation, 64 patterns at a
//! time, then drops the other faults that the pattern detects.
//!
//! ```
//! # use stuckat::atpg::Atpg;
//! # use stuckat::config::AtpgConfig;
//! use stuckat::network::CircuitBuilder;
//!
//! let mut b = CircuitBuilder::new();
//! let i0 = b.add_input();
//! let i1 = b.add_input();
//! let o = b.and(i0, i1);
//! b.add_output(o);
//! let circuit = b.build().unwrap();
//!
//! let mut atpg = Atpg::with_collapsed_faults(circuit, AtpgConfig::default()).unwrap();
//! let stats = atpg.run().unwrap();
//! assert_eq!(stats.detected, stats.nb_faults);
//! ```
//!
//! ## Datastructures
//!
//! `Circuit` is an arena of gates, each with its own fanins and fanouts. It is built once
//! with `CircuitBuilder`, and only modified during the search to insert a fault site.

#![warn(missing_docs)]

pub mod atpg;
pub mod config;
pub mod error;
pub mod io;
pub mod network;
pub mod sim;

pub use network::{stats, Circuit, CircuitBuilder, GateKind};
