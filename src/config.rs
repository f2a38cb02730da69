//! Configuration of the test pattern generator

use std::fmt;

use crate::error::{AtpgError, Result};

/// Default number of backtracks allowed per fault
pub const DEFAULT_BACKTRACK_LIMIT: usize = 16;

/// How fault simulation is used during deterministic generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FsimMode {
    /// No fault simulation: each pattern only covers its target and the faults dropped in its region
    None,
    /// Simulate each new pattern immediately against the remaining faults
    Single,
    /// Accumulate 64 patterns and simulate them together
    #[default]
    Parallel,
}

/// When dynamic implication is applied during a fault's search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DynMode {
    /// Never
    #[default]
    None,
    /// At the start of each search, until it stops finding forced values
    Once,
    /// In every iteration
    Always,
}

/// How far a justification decision walks down from an unjustified value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BacktraceMode {
    /// Stop at the first unassigned line
    #[default]
    D,
    /// Continue through unassigned gates down to a primary input or a conflict-free gate
    /// outside the fault cone; the faulty values still stop at the first unassigned line
    Podem,
}

impl fmt::Display for FsimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsimMode::None => write!(f, "none"),
            FsimMode::Single => write!(f, "single"),
            FsimMode::Parallel => write!(f, "parallel"),
        }
    }
}

impl fmt::Display for BacktraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktraceMode::D => write!(f, "d"),
            BacktraceMode::Podem => write!(f, "podem"),
        }
    }
}

impl fmt::Display for DynMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynMode::None => write!(f, "none"),
            DynMode::Once => write!(f, "once"),
            DynMode::Always => write!(f, "always"),
        }
    }
}

/// Options of the test pattern generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtpgConfig {
    /// Number of backtracks allowed before a fault is aborted
    pub backtrack_limit: usize,
    /// Fault simulation mode
    pub fsim_mode: FsimMode,
    /// Dynamic implication mode
    pub dyn_mode: DynMode,
    /// Strength of unique sensitization, from 0 (disabled) to 2
    pub sensitization_level: u8,
    /// Backtrace used by justification decisions
    pub backtrace_mode: BacktraceMode,
    /// Activate one fault cone at a time
    pub scoped: bool,
    /// Run static learning before generation
    pub learning: bool,
    /// Use conflict-free node assignment templates
    pub cfna: bool,
    /// Seed for random decisions: X-filling, fault order, random patterns
    pub seed: u64,
    /// Show progress bars
    pub progress: bool,
}

impl Default for AtpgConfig {
    fn default() -> Self {
        AtpgConfig {
            backtrack_limit: DEFAULT_BACKTRACK_LIMIT,
            fsim_mode: FsimMode::default(),
            dyn_mode: DynMode::default(),
            sensitization_level: 2,
            backtrace_mode: BacktraceMode::default(),
            scoped: false,
            learning: false,
            cfna: true,
            seed: 1,
            progress: false,
        }
    }
}

impl AtpgConfig {
    /// Set the backtrack limit
    pub fn with_backtrack_limit(mut self, limit: usize) -> Self {
        self.backtrack_limit = limit;
        self
    }

    /// Set the fault simulation mode
    pub fn with_fsim_mode(mut self, mode: FsimMode) -> Self {
        self.fsim_mode = mode;
        self
    }

    /// Set the dynamic implication mode
    pub fn with_dyn_mode(mut self, mode: DynMode) -> Self {
        self.dyn_mode = mode;
        self
    }

    /// Set the unique sensitization level
    pub fn with_sensitization_level(mut self, level: u8) -> Self {
        self.sensitization_level = level;
        self
    }

    /// Set the backtrace mode
    pub fn with_backtrace_mode(mut self, mode: BacktraceMode) -> Self {
        self.backtrace_mode = mode;
        self
    }

    /// Enable or disable scoped activation
    pub fn with_scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    /// Enable or disable static learning
    pub fn with_learning(mut self, learning: bool) -> Self {
        self.learning = learning;
        self
    }

    /// Enable or disable conflict-free node assignment
    pub fn with_cfna(mut self, cfna: bool) -> Self {
        self.cfna = cfna;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Check that the options are consistent
    pub fn validate(&self) -> Result<()> {
        if self.sensitization_level > 2 {
            return Err(AtpgError::InvalidConfig(format!(
                "sensitization level must be between 0 and 2, got {}",
                self.sensitization_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AtpgConfig::default();
        assert_eq!(config.backtrack_limit, 16);
        assert_eq!(config.fsim_mode, FsimMode::Parallel);
        assert_eq!(config.dyn_mode, DynMode::None);
        assert_eq!(config.backtrace_mode, BacktraceMode::D);
        assert!(config.validate().is_ok());
        let config = config.with_backtrace_mode(BacktraceMode::Podem);
        assert_eq!(config.backtrace_mode.to_string(), "podem");
    }

    #[test]
    fn test_validate() {
        let config = AtpgConfig::default().with_sensitization_level(3);
        assert!(matches!(
            config.validate(),
            Err(AtpgError::InvalidConfig(_))
        ));
        let config = AtpgConfig::default()
            .with_backtrack_limit(0)
            .with_dyn_mode(DynMode::Always);
        assert!(config.validate().is_ok());
        assert_eq!(config.backtrack_limit, 0);
    }
}
