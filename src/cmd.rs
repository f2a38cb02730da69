//! Command line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stuckat::atpg::Atpg;
use stuckat::config::{AtpgConfig, BacktraceMode, DynMode, FsimMode};
use stuckat::error::Result;
use stuckat::io::{read_network_file, write_patterns};
use stuckat::network::stats::stats;
use stuckat::sim::FaultStatus;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity; repeat for more details (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command line arguments
#[derive(Subcommand)]
pub enum Commands {
    /// Show statistics about a circuit
    ///
    /// Will print statistics on the number of inputs, outputs and gates in the circuit.
    #[clap()]
    Show(ShowArgs),

    /// Test pattern generation for a circuit
    ///
    /// Generate patterns to detect all single stuck-at faults in a combinational design.
    /// An optional random phase drops the easy faults, then each remaining fault is
    /// targeted by a branch-and-bound search.
    ///
    /// Fault types are:
    ///   * Output stuck-at fault, where the output of the gate is stuck at a constant value
    ///   * Input stuck-at fault, where the input of the gate is stuck at a constant value
    ///
    /// Patterns use the same format as Atalanta, with one bit per input:
    ///    1: 00011101
    ///    2: 01110000
    #[clap()]
    Atpg(AtpgArgs),

    /// Random test pattern generation with fault simulation
    #[clap()]
    Random(RandomArgs),
}

/// Command arguments for circuit informations
#[derive(Args)]
pub struct ShowArgs {
    /// Circuit to show
    file: PathBuf,
}

impl ShowArgs {
    pub fn run(&self) -> Result<()> {
        let circuit = read_network_file(&self.file)?;
        println!("Circuit stats:\n{}\n\n", stats(&circuit));
        Ok(())
    }
}

/// Options of the random pattern phase
#[derive(Args)]
pub struct RandomOptions {
    /// Maximum number of random patterns to simulate
    #[arg(short = 'r', long, default_value_t = 0)]
    num_random: usize,

    /// A batch detecting at most this many new faults counts as a stall
    #[arg(long, default_value_t = 0)]
    min_detect: usize,

    /// Stop after this many stalled batches in a row; 0 disables
    #[arg(long, default_value_t = 8)]
    max_stall: usize,

    /// Read the patterns from a file instead of generating them
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,
}

impl RandomOptions {
    fn run(&self, atpg: &mut Atpg) -> Result<()> {
        if self.num_random == 0 && self.input.is_none() {
            return Ok(());
        }
        let max_patterns = if self.num_random == 0 {
            usize::MAX
        } else {
            self.num_random
        };
        atpg.run_random_pattern_generation(
            self.min_detect,
            self.max_stall,
            max_patterns,
            self.input.as_deref(),
        )?;
        Ok(())
    }
}

/// Command arguments for test pattern generation
#[derive(Args)]
pub struct AtpgArgs {
    /// Circuit to write test patterns for
    network: PathBuf,

    /// Output file for test patterns
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Maximum number of backtracks per fault
    #[arg(short = 'b', long, default_value_t = 16)]
    backtrack_limit: usize,

    /// Fault simulation after each new pattern
    #[arg(long, value_enum, default_value_t = FsimMode::Parallel)]
    fsim: FsimMode,

    /// Dynamic unique sensitization and implication during search
    #[arg(long = "dyn", value_enum, default_value_t = DynMode::None)]
    dyn_mode: DynMode,

    /// Unique sensitization level, from 0 to 2
    #[arg(short = 'l', long, default_value_t = 2)]
    level: u8,

    /// Backtrace of justification decisions
    #[arg(long, value_enum, default_value_t = BacktraceMode::D)]
    backtrace: BacktraceMode,

    /// Process the faults one output cone at a time
    #[arg(long)]
    scope: bool,

    /// Compute static learning before the search
    #[arg(long)]
    learn: bool,

    /// Do not precompute conflict-free assignments
    #[arg(long)]
    no_cfna: bool,

    #[command(flatten)]
    random: RandomOptions,

    /// Simulate the patterns in reverse order to remove the useless ones
    #[arg(long)]
    reverse: bool,

    /// Compact the patterns with a greedy set cover
    #[arg(long)]
    compact: bool,

    /// Random seed for test pattern generation
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Show progress bars
    #[arg(long)]
    progress: bool,
}

impl AtpgArgs {
    fn config(&self) -> AtpgConfig {
        AtpgConfig::default()
            .with_backtrack_limit(self.backtrack_limit)
            .with_fsim_mode(self.fsim)
            .with_dyn_mode(self.dyn_mode)
            .with_sensitization_level(self.level)
            .with_backtrace_mode(self.backtrace)
            .with_scoped(self.scope)
            .with_learning(self.learn)
            .with_cfna(!self.no_cfna)
            .with_seed(self.seed)
            .with_progress(self.progress)
    }

    pub fn run(&self) -> Result<()> {
        let circuit = read_network_file(&self.network)?;
        let mut atpg = Atpg::with_collapsed_faults(circuit, self.config())?;
        self.random.run(&mut atpg)?;
        atpg.run()?;
        if self.reverse {
            atpg.run_reverse_fault_simulation()?;
        }
        if self.compact {
            atpg.compact_patterns();
        }
        for fault in atpg.aborted_faults() {
            println!("Aborted: {}", fault.describe(atpg.circuit()));
        }
        println!("{}", atpg.stats());
        write_patterns(&self.output, atpg.patterns())?;
        Ok(())
    }
}

/// Command arguments for random pattern generation
#[derive(Args)]
pub struct RandomArgs {
    /// Circuit to write test patterns for
    network: PathBuf,

    /// Output file for test patterns
    #[arg(short = 'o', long)]
    output: PathBuf,

    #[command(flatten)]
    random: RandomOptions,

    /// Random seed for test pattern generation
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Show progress bars
    #[arg(long)]
    progress: bool,
}

impl RandomArgs {
    pub fn run(&self) -> Result<()> {
        let circuit = read_network_file(&self.network)?;
        let config = AtpgConfig::default()
            .with_seed(self.seed)
            .with_progress(self.progress);
        let mut atpg = Atpg::with_collapsed_faults(circuit, config)?;
        let max_patterns = if self.random.num_random == 0 {
            4 * (atpg.circuit().nb_inputs() + 1) * 64
        } else {
            self.random.num_random
        };
        let stats = atpg.run_random_pattern_generation(
            self.random.min_detect,
            self.random.max_stall,
            max_patterns,
            self.random.input.as_deref(),
        )?;
        println!("{}", stats);
        println!(
            "Fault coverage: {:.2}% ({} undetected)",
            atpg.faults().coverage(),
            atpg.faults().count(FaultStatus::Undetected)
        );
        write_patterns(&self.output, atpg.patterns())?;
        Ok(())
    }
}
