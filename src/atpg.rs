//! Test pattern generation
//!
//! [`Atpg`] owns a circuit, a fault list and the patterns generated for it. Each
//! undetected fault is targeted in turn by a branch-and-bound search on the good and
//! faulty values of the circuit. Every pattern found is checked by simulation before it
//! is recorded, and fault simulation drops the other faults it detects.
//!
//! ```
//! # use stuckat::atpg::Atpg;
//! # use stuckat::config::{AtpgConfig, DynMode, FsimMode};
//! # use stuckat::network::generators::testcases;
//! let mut atpg = Atpg::with_collapsed_faults(testcases::c17().unwrap(), AtpgConfig::default()).unwrap();
//! let stats = atpg.run_dtpg(FsimMode::Parallel, DynMode::None, false).unwrap();
//! assert_eq!(stats.detected, stats.nb_faults);
//! ```

mod cfna;
mod compaction;
mod decision;
mod dynamic;
mod imply;
mod learn;
mod pgraph;
mod random;
mod search;
mod sense;

use std::fmt;

use fxhash::FxHashMap;
use kdam::{tqdm, Bar, BarExt};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{AtpgConfig, DynMode, FsimMode};
use crate::error::{AtpgError, Result};
use crate::network::{Circuit, PackedVal, Val3, NB_LANES};
use crate::sim::{
    detects, Fault, FaultList, FaultStatus, IncrementalSimulator, PatternStore, SimpleSimulator,
    TestPattern,
};

use search::{Episode, SearchContext, SearchOutcome};

/// Summary of the fault list and of the pattern set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of target faults
    pub nb_faults: usize,
    /// Faults detected by a pattern
    pub detected: usize,
    /// Faults proven untestable
    pub redundant: usize,
    /// Faults abandoned at the backtrack limit
    pub aborted: usize,
    /// Faults not processed yet
    pub undetected: usize,
    /// Number of patterns in the store
    pub nb_patterns: usize,
    /// Patterns added by the last run
    pub new_patterns: usize,
    /// Backtracks over all searches so far
    pub backtracks: usize,
    /// Patterns that failed verification and were generated again without templates
    pub fallbacks: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Faults: {}", self.nb_faults)?;
        writeln!(f, "  Detected: {}", self.detected)?;
        writeln!(f, "  Redundant: {}", self.redundant)?;
        writeln!(f, "  Aborted: {}", self.aborted)?;
        writeln!(f, "  Undetected: {}", self.undetected)?;
        writeln!(f, "Patterns: {} ({} new)", self.nb_patterns, self.new_patterns)?;
        writeln!(f, "Backtracks: {}", self.backtracks)
    }
}

/// Faults that fault simulation may still detect
fn simulation_targets(faults: &FaultList) -> Vec<usize> {
    (0..faults.len())
        .filter(|&i| {
            matches!(
                faults.status(i),
                FaultStatus::Undetected | FaultStatus::Aborted
            )
        })
        .collect()
}

/// Simulate up to 64 patterns; returns the newly detected faults with the first lane
/// detecting each of them
fn simulate_batch(
    circuit: &Circuit,
    faults: &FaultList,
    batch: &[&TestPattern],
) -> Vec<(usize, usize)> {
    let targets = simulation_targets(faults);
    let list: Vec<Fault> = targets.iter().map(|&i| faults.fault(i)).collect();
    let mut sim = IncrementalSimulator::from_circuit(circuit);
    sim.run_initial(batch);
    let detections = sim.detect_faults(&list);
    targets
        .into_iter()
        .zip(detections)
        .filter_map(|(i, d)| d.lowest_lane().map(|lane| (i, lane)))
        .collect()
}

/// Simulate a single pattern; returns the newly detected faults
fn simulate_single(circuit: &Circuit, faults: &FaultList, pattern: &TestPattern) -> Vec<usize> {
    let targets = simulation_targets(faults);
    let list: Vec<Fault> = targets.iter().map(|&i| faults.fault(i)).collect();
    let mut sim = IncrementalSimulator::from_circuit(circuit);
    sim.run_initial_single(pattern);
    let detections = sim.detect_faults_single(&list);
    targets
        .into_iter()
        .zip(detections)
        .filter(|(_, d)| *d)
        .map(|(i, _)| i)
        .collect()
}

/// Deterministic test pattern generator for a combinational circuit
pub struct Atpg {
    ctx: SearchContext,
    faults: FaultList,
    patterns: PatternStore,
    config: AtpgConfig,
    rng: SmallRng,
    /// Learning and templates are computed once, on the first run
    prepared: bool,
    backtracks: usize,
    fallbacks: usize,
}

impl Atpg {
    /// Create a generator for the given faults
    pub fn new(circuit: Circuit, faults: FaultList, config: AtpgConfig) -> Result<Atpg> {
        config.validate()?;
        if let Some(f) = faults.faults().iter().find(|f| !circuit.is_valid_fault(f)) {
            return Err(AtpgError::InvalidFault(f.to_string()));
        }
        let patterns = PatternStore::new(circuit.nb_inputs());
        let mut ctx = SearchContext::new(circuit, config.backtrack_limit, config.sensitization_level);
        ctx.backtrace_mode = config.backtrace_mode;
        Ok(Atpg {
            ctx,
            faults,
            patterns,
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            prepared: false,
            backtracks: 0,
            fallbacks: 0,
        })
    }

    /// Create a generator targeting the collapsed fault list of the circuit
    pub fn with_collapsed_faults(circuit: Circuit, config: AtpgConfig) -> Result<Atpg> {
        let faults = FaultList::collapsed(&circuit);
        Atpg::new(circuit, faults, config)
    }

    /// The circuit under test
    pub fn circuit(&self) -> &Circuit {
        &self.ctx.circuit
    }

    /// The options of the generator
    pub fn config(&self) -> &AtpgConfig {
        &self.config
    }

    /// The patterns generated so far, in generation order
    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// The faults with their classification and detecting pattern
    pub fn faults(&self) -> &FaultList {
        &self.faults
    }

    /// Iterate over the faults with a given classification
    pub fn faults_with_status(&self, status: FaultStatus) -> impl Iterator<Item = Fault> + '_ {
        self.faults
            .iter()
            .filter(move |(_, s, _)| *s == status)
            .map(|(f, _, _)| f)
    }

    /// Iterate over the detected faults
    pub fn detected_faults(&self) -> impl Iterator<Item = Fault> + '_ {
        self.faults_with_status(FaultStatus::Detected)
    }

    /// Iterate over the faults proven untestable
    pub fn redundant_faults(&self) -> impl Iterator<Item = Fault> + '_ {
        self.faults_with_status(FaultStatus::Redundant)
    }

    /// Iterate over the faults abandoned at the backtrack limit
    pub fn aborted_faults(&self) -> impl Iterator<Item = Fault> + '_ {
        self.faults_with_status(FaultStatus::Aborted)
    }

    /// Current statistics
    pub fn stats(&self) -> Stats {
        Stats {
            nb_faults: self.faults.len(),
            detected: self.faults.count(FaultStatus::Detected),
            redundant: self.faults.count(FaultStatus::Redundant),
            aborted: self.faults.count(FaultStatus::Aborted),
            undetected: self.faults.count(FaultStatus::Undetected),
            nb_patterns: self.patterns.len(),
            new_patterns: 0,
            backtracks: self.backtracks,
            fallbacks: self.fallbacks,
        }
    }

    fn stats_since(&self, nb_patterns_before: usize) -> Stats {
        let mut ret = self.stats();
        ret.new_patterns = self.patterns.len().saturating_sub(nb_patterns_before);
        ret
    }

    fn progress_bar(&self, total: usize, description: &str) -> Option<Bar> {
        self.config.progress.then(|| {
            let mut bar = tqdm!(total = total);
            bar.set_description(description);
            bar
        })
    }

    /// Run static learning and template computation, once
    fn prepare(&mut self) {
        if self.prepared {
            return;
        }
        self.ctx.circuit.activate_all();
        if self.config.learning {
            self.ctx.learn();
            self.ctx.use_learning = true;
        }
        if self.config.cfna {
            self.ctx.compute_cfna();
            self.ctx.use_cfna = true;
        }
        self.prepared = true;
    }

    /// Run deterministic generation with the modes of the configuration
    pub fn run(&mut self) -> Result<Stats> {
        self.run_dtpg(
            self.config.fsim_mode,
            self.config.dyn_mode,
            self.config.scoped,
        )
    }

    /// Target every undetected fault, including those aborted by a previous run
    pub fn run_dtpg(&mut self, fsim_mode: FsimMode, dyn_mode: DynMode, scoped: bool) -> Result<Stats> {
        self.faults.retry_aborted();
        self.prepare();
        let nb_patterns_before = self.patterns.len();
        let mut order = self.faults.with_status(FaultStatus::Undetected);
        if fsim_mode == FsimMode::Parallel {
            order.shuffle(&mut self.rng);
        }
        let mut progress = self.progress_bar(order.len(), "Faults processed");
        let ret = self.dtpg_loop(&order, fsim_mode, dyn_mode, scoped, &mut progress);
        if scoped {
            self.ctx.circuit.activate_all();
        }
        ret?;
        let stats = self.stats_since(nb_patterns_before);
        info!(
            "DTPG: {} detected, {} redundant, {} aborted, {} new patterns, {} backtracks",
            stats.detected, stats.redundant, stats.aborted, stats.new_patterns, stats.backtracks
        );
        Ok(stats)
    }

    fn dtpg_loop(
        &mut self,
        order: &[usize],
        fsim_mode: FsimMode,
        dyn_mode: DynMode,
        scoped: bool,
        progress: &mut Option<Bar>,
    ) -> Result<()> {
        let regions = self.regions();
        let mut pending = Vec::new();
        if !scoped {
            for (k, &i) in order.iter().enumerate() {
                if self.faults.is_undetected(i) {
                    self.target(i, &regions, fsim_mode, dyn_mode, &mut pending)?;
                }
                if let Some(bar) = progress {
                    bar.update_to(k + 1).ok();
                }
            }
        } else {
            let mut cursor = 0;
            loop {
                while cursor < order.len() && !self.faults.is_undetected(order[cursor]) {
                    cursor += 1;
                }
                let Some(&first) = order.get(cursor) else {
                    break;
                };
                let fault = self.faults.fault(first);
                let driver = self.ctx.circuit.fault_driver(&fault);
                if !self.ctx.circuit.activate_cone(driver) {
                    debug!("{}: no output reachable", fault.describe(&self.ctx.circuit));
                    self.faults.set_status(first, FaultStatus::Redundant);
                    continue;
                }
                if !self.ctx.circuit.in_scope(fault.gate()) {
                    // The driver reaches an output, but not through the faulty gate
                    debug!(
                        "{}: faulty gate reaches no output",
                        fault.describe(&self.ctx.circuit)
                    );
                    self.faults.set_status(first, FaultStatus::Redundant);
                    continue;
                }
                for &i in &order[cursor..] {
                    let gate = self.faults.fault(i).gate();
                    if self.faults.is_undetected(i) && self.ctx.circuit.in_scope(gate) {
                        self.target(i, &regions, fsim_mode, dyn_mode, &mut pending)?;
                    }
                }
                self.flush(&mut pending);
                if let Some(bar) = progress {
                    bar.update_to(cursor + 1).ok();
                }
            }
        }
        self.flush(&mut pending);
        Ok(())
    }

    /// Faults grouped by the root of their fanout-free region
    fn regions(&self) -> FxHashMap<usize, Vec<usize>> {
        let mut ret: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (i, f) in self.faults.faults().iter().enumerate() {
            ret.entry(f.region(&self.ctx.circuit)).or_default().push(i);
        }
        ret
    }

    /// Search a pattern for one fault and record the outcome
    fn target(
        &mut self,
        i: usize,
        regions: &FxHashMap<usize, Vec<usize>>,
        fsim_mode: FsimMode,
        dyn_mode: DynMode,
        pending: &mut Vec<usize>,
    ) -> Result<()> {
        let fault = self.faults.fault(i);
        let peers: Vec<(usize, Fault)> = regions
            .get(&fault.region(&self.ctx.circuit))
            .map(|members| {
                members
                    .iter()
                    .filter(|&&j| j != i && self.faults.is_undetected(j))
                    .map(|&j| (j, self.faults.fault(j)))
                    .collect()
            })
            .unwrap_or_default();
        let (episode, pattern) = self.solve(&fault, &peers, dyn_mode)?;
        let name = fault.describe(&self.ctx.circuit);
        match (episode.outcome, pattern) {
            (SearchOutcome::Detected, Some(pattern)) => {
                let p = self.patterns.push(pattern);
                self.faults.set_detected(i, p);
                for &j in &episode.dropped {
                    self.faults.set_detected(j, p);
                }
                debug!(
                    "{}: detected by pattern {} after {} backtracks, {} dropped",
                    name,
                    p,
                    episode.backtracks,
                    episode.dropped.len()
                );
                match fsim_mode {
                    FsimMode::None => (),
                    FsimMode::Single => {
                        let found = simulate_single(&self.ctx.circuit, &self.faults, self.patterns.get(p));
                        for j in found {
                            self.faults.set_detected(j, p);
                        }
                    }
                    FsimMode::Parallel => {
                        pending.push(p);
                        if pending.len() == NB_LANES {
                            self.flush(pending);
                        }
                    }
                }
            }
            (SearchOutcome::Redundant, _) => {
                debug!("{}: redundant after {} backtracks", name, episode.backtracks);
                self.faults.set_status(i, FaultStatus::Redundant);
            }
            _ => {
                debug!("{}: aborted after {} backtracks", name, episode.backtracks);
                self.faults.set_status(i, FaultStatus::Aborted);
            }
        }
        Ok(())
    }

    /// Simulate the patterns waiting for parallel fault simulation
    fn flush(&mut self, pending: &mut Vec<usize>) {
        if pending.is_empty() {
            return;
        }
        let batch: Vec<&TestPattern> = pending.iter().map(|&p| self.patterns.get(p)).collect();
        let found = simulate_batch(&self.ctx.circuit, &self.faults, &batch);
        for (j, lane) in found {
            self.faults.set_detected(j, pending[lane]);
        }
        pending.clear();
    }

    /// Run the search and turn its result into a verified pattern
    ///
    /// A pattern that fails verification is searched again without templates.
    fn solve(
        &mut self,
        fault: &Fault,
        peers: &[(usize, Fault)],
        dyn_mode: DynMode,
    ) -> Result<(Episode, Option<TestPattern>)> {
        let episode = self.ctx.generate(fault, peers, dyn_mode);
        self.backtracks += episode.backtracks;
        if episode.outcome != SearchOutcome::Detected {
            return Ok((episode, None));
        }
        let pattern = self.fill(&episode.cube);
        if self.verify(fault, &episode, &pattern) {
            return Ok((episode, Some(pattern)));
        }
        if !self.ctx.use_cfna {
            return Err(self.internal_error(fault, "generated pattern fails verification"));
        }
        warn!(
            "Pattern for {} fails verification, retrying without templates",
            fault.describe(&self.ctx.circuit)
        );
        self.fallbacks += 1;
        self.ctx.use_cfna = false;
        let episode = self.ctx.generate(fault, peers, dyn_mode);
        self.ctx.use_cfna = true;
        self.backtracks += episode.backtracks;
        if episode.outcome != SearchOutcome::Detected {
            return Ok((episode, None));
        }
        let pattern = self.fill(&episode.cube);
        if self.verify(fault, &episode, &pattern) {
            Ok((episode, Some(pattern)))
        } else {
            Err(self.internal_error(fault, "generated pattern fails verification without templates"))
        }
    }

    fn internal_error(&self, fault: &Fault, message: &str) -> AtpgError {
        AtpgError::Internal {
            fault: fault.describe(&self.ctx.circuit),
            gate: fault.gate(),
            message: message.to_string(),
        }
    }

    /// Complete a cube with random values
    fn fill(&mut self, cube: &[Val3]) -> TestPattern {
        let values: Vec<bool> = cube
            .iter()
            .map(|v| v.to_bool().unwrap_or_else(|| self.rng.gen()))
            .collect();
        TestPattern::from_bools(&values)
    }

    /// Check a pattern against the values the search relied on, and against the fault
    fn verify(&self, fault: &Fault, episode: &Episode, pattern: &TestPattern) -> bool {
        let circuit = &self.ctx.circuit;
        let inputs: Vec<PackedVal> = (0..circuit.nb_inputs())
            .map(|i| PackedVal::splat(pattern.get(i)))
            .collect();
        let mut sim = SimpleSimulator::from_circuit(circuit);
        sim.run(&inputs);
        let consistent = episode
            .good_values
            .iter()
            .all(|&(g, b)| sim.node_values[g].lane(0) == b);
        consistent && detects(circuit, pattern, fault)
    }
}
