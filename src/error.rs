//! Error types

use thiserror::Error;

use crate::network::GateKind;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, AtpgError>;

/// Malformed circuit, rejected when building
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A gate refers to an input that does not exist
    #[error("gate {gate} refers to undefined fanin {fanin}")]
    DanglingFanin {
        /// Gate with the bad reference
        gate: usize,
        /// Index of the missing fanin
        fanin: usize,
    },

    /// An output refers to a gate that does not exist
    #[error("output {output} refers to undefined gate {gate}")]
    DanglingOutput {
        /// Position of the output
        output: usize,
        /// Index of the missing gate
        gate: usize,
    },

    /// The circuit contains a combinational loop
    #[error("combinational loop through gate {gate}")]
    CombinationalLoop {
        /// A gate on the loop
        gate: usize,
    },

    /// A gate has a number of inputs incompatible with its kind
    #[error("gate {gate} of kind {kind} cannot have {arity} inputs")]
    BadArity {
        /// Gate with the bad arity
        gate: usize,
        /// Kind of the gate
        kind: GateKind,
        /// Number of inputs given
        arity: usize,
    },

    /// Fault sites are created by the engine only
    #[error("gate {gate} is a fault site, which cannot be part of a netlist")]
    FaultSiteInNetlist {
        /// Offending gate
        gate: usize,
    },
}

/// Error while reading a netlist or a pattern file
#[derive(Debug, Error)]
pub enum ParseError {
    /// Underlying IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Syntax error at a given line
    #[error("line {line}: {message}")]
    Syntax {
        /// Line number, starting at 1
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// A signal is used but never defined
    #[error("signal {0} is not generated anywhere")]
    UndefinedSignal(String),

    /// A signal is defined twice
    #[error("signal {0} is defined twice")]
    DuplicateSignal(String),

    /// Gate type not supported by the engine
    #[error("unsupported gate type {0}")]
    UnsupportedGate(String),

    /// Unknown file extension
    #[error("unsupported file extension for {0}")]
    UnknownExtension(String),
}

/// Top-level error of the test pattern generator
#[derive(Debug, Error)]
pub enum AtpgError {
    /// Malformed circuit
    #[error("invalid circuit: {0}")]
    Build(#[from] BuildError),

    /// Malformed input file
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pattern does not have one value per primary input
    #[error("pattern has {found} values, expected {expected}")]
    PatternWidth {
        /// Number of primary inputs
        expected: usize,
        /// Number of values in the pattern
        found: usize,
    },

    /// Fault refers to a gate or pin that does not exist
    #[error("fault {0} does not match the circuit")]
    InvalidFault(String),

    /// Internal invariant violation; the run is stopped
    #[error("internal error on fault {fault} at gate {gate}: {message}")]
    Internal {
        /// Fault being processed
        fault: String,
        /// Gate where the problem was observed
        gate: usize,
        /// Description of the problem
        message: String,
    },
}
