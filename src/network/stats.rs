//! Compute circuit statistics
//!
//! ```
//! # use stuckat::network::generators::testcases;
//! use stuckat::network::stats::stats;
//! let circuit = testcases::c17().unwrap();
//! let stats = stats(&circuit);
//!
//! assert_eq!(stats.nb_and, 6);
//! assert_eq!(stats.nb_xor, 0);
//!
//! // Show the statistics
//! println!("{}", stats);
//! ```

use std::fmt;

use crate::network::{Circuit, GateKind};

/// Number of inputs, outputs and gates in a circuit
#[derive(Clone, Debug, Default)]
pub struct CircuitStats {
    /// Number of inputs
    pub nb_inputs: usize,
    /// Number of outputs
    pub nb_outputs: usize,
    /// Number of And, Or and similar gates
    pub nb_and: usize,
    /// Arity of And gates
    pub and_arity: Vec<usize>,
    /// Number of Xor and similar gates
    pub nb_xor: usize,
    /// Arity of Xor gates
    pub xor_arity: Vec<usize>,
    /// Number of Buf
    pub nb_buf: usize,
    /// Number of Not
    pub nb_not: usize,
    /// Number of constants
    pub nb_const: usize,
    /// Number of gates with more than one fanout
    pub nb_stems: usize,
    /// Number of gates dominating their fanin cone
    pub nb_basis: usize,
    /// Highest topological level
    pub max_level: usize,
}

impl CircuitStats {
    /// Total number of logic gates
    pub fn nb_gates(&self) -> usize {
        self.nb_and + self.nb_xor + self.nb_buf + self.nb_not
    }

    /// Record a new and
    fn add_and(&mut self, sz: usize) {
        self.nb_and += 1;
        while self.and_arity.len() <= sz {
            self.and_arity.push(0);
        }
        self.and_arity[sz] += 1;
    }

    /// Record a new xor
    fn add_xor(&mut self, sz: usize) {
        self.nb_xor += 1;
        while self.xor_arity.len() <= sz {
            self.xor_arity.push(0);
        }
        self.xor_arity[sz] += 1;
    }
}

impl fmt::Display for CircuitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stats:")?;
        writeln!(f, "  Inputs: {}", self.nb_inputs)?;
        writeln!(f, "  Outputs: {}", self.nb_outputs)?;
        writeln!(f, "  Gates: {}", self.nb_gates())?;
        writeln!(f, "  Levels: {}", self.max_level)?;
        if self.nb_and != 0 {
            writeln!(f, "  And: {}", self.nb_and)?;
            for (i, nb) in self.and_arity.iter().enumerate() {
                if *nb != 0 {
                    writeln!(f, "      {}: {}", i, nb)?;
                }
            }
        }
        if self.nb_xor != 0 {
            writeln!(f, "  Xor: {}", self.nb_xor)?;
            for (i, nb) in self.xor_arity.iter().enumerate() {
                if *nb != 0 {
                    writeln!(f, "      {}: {}", i, nb)?;
                }
            }
        }
        if self.nb_not != 0 {
            writeln!(f, "  Not: {}", self.nb_not)?;
        }
        if self.nb_buf != 0 {
            writeln!(f, "  Buf: {}", self.nb_buf)?;
        }
        if self.nb_const != 0 {
            writeln!(f, "  Constants: {}", self.nb_const)?;
        }
        writeln!(f, "  Fanout stems: {}", self.nb_stems)?;
        writeln!(f, "  Basis gates: {}", self.nb_basis)?;
        fmt::Result::Ok(())
    }
}

/// Compute the statistics of the circuit
pub fn stats(circuit: &Circuit) -> CircuitStats {
    use GateKind::*;
    let mut ret = CircuitStats {
        nb_inputs: circuit.nb_inputs(),
        nb_outputs: circuit.nb_outputs(),
        max_level: circuit.max_level(),
        ..Default::default()
    };
    for i in 0..circuit.nb_gates() {
        let g = circuit.gate(i);
        match g.kind() {
            And | Nand | Or | Nor => ret.add_and(g.fanins().len()),
            Xor | Xnor => ret.add_xor(g.fanins().len()),
            Buf | FaultSite(_) => ret.nb_buf += 1,
            Not => ret.nb_not += 1,
            Const0 | Const1 => ret.nb_const += 1,
            Input => (),
        }
        if g.fanouts().len() > 1 {
            ret.nb_stems += 1;
        }
        if g.is_basis() && g.kind() != Input {
            ret.nb_basis += 1;
        }
    }
    ret
}
