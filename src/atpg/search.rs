//! Search state of a fault episode: value assignments, undo log and choice points

use std::collections::VecDeque;

use crate::config::{BacktraceMode, DynMode};
use crate::network::{Circuit, GateKind, GateState, Val3, SINK};
use crate::sim::Fault;

use super::cfna::CfnaTable;
use super::learn::LearnedImplications;
use super::pgraph::PropagationGraph;

/// Which values of a gate an assignment applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rail {
    /// Fault-free circuit only
    Good,
    /// Faulty circuit only
    Faulty,
    /// Both circuits, for gates outside the fault cone
    Both,
}

/// A pending assignment; X on a rail means the rail is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub gate: usize,
    pub gval: Val3,
    pub fval: Val3,
}

/// Untried branch of a choice point
#[derive(Debug, Clone, Copy)]
struct Alternative {
    assignment: Assignment,
    /// Size of the undo log when the choice was made
    bottom: usize,
}

/// Result of a backtrack request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backtrack {
    /// The search resumes with an untried alternative
    Resumed,
    /// No alternative left: the search space is exhausted
    Exhausted,
    /// The backtrack limit is reached
    LimitReached,
}

/// Order in which the decision procedures are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Justify assigned values before propagating the fault effect
    JustifyFirst,
    /// Propagate the fault effect before justifying
    PropagateFirst,
}

/// Final state of a fault episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchOutcome {
    Detected,
    Redundant,
    Aborted,
}

/// Result of the search for one fault
#[derive(Debug, Clone)]
pub(crate) struct Episode {
    pub outcome: SearchOutcome,
    pub backtracks: usize,
    /// Primary input values required by the test, indexed by input position
    pub cube: Vec<Val3>,
    /// Indices of the other faults detected by the same assignment
    pub dropped: Vec<usize>,
    /// Good values fixed by the search
    pub good_values: Vec<(usize, bool)>,
}

/// Generation-stamped marks, cleared in constant time
#[derive(Debug, Clone, Default)]
pub(crate) struct Marks {
    stamp: u32,
    marks: Vec<u32>,
}

impl Marks {
    pub fn resize(&mut self, n: usize) {
        self.marks.resize(n, 0);
    }

    /// Clear all marks
    pub fn clear(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.marks.fill(0);
            self.stamp = 1;
        }
    }

    /// Mark a gate; returns false if it was already marked
    pub fn mark(&mut self, g: usize) -> bool {
        if self.marks[g] == self.stamp {
            false
        } else {
            self.marks[g] = self.stamp;
            true
        }
    }

    pub fn is_marked(&self, g: usize) -> bool {
        self.marks[g] == self.stamp
    }
}

/// All the state of the search engine, owning the circuit
pub(crate) struct SearchContext {
    pub(crate) circuit: Circuit,
    pub(crate) save_stack: Vec<(usize, GateState)>,
    alt_stack: Vec<Alternative>,
    pub(crate) eventq: VecDeque<Assignment>,
    backtracks: usize,
    pub(crate) backtrack_limit: usize,
    /// Current fault site, or SINK outside of an episode
    pub(crate) site: usize,
    pub(crate) pgraph: PropagationGraph,
    pub(crate) sensitization_level: u8,
    pub(crate) learned: LearnedImplications,
    pub(crate) use_learning: bool,
    /// Stop backward implication at basis gates, while learning
    pub(crate) learning_mode: bool,
    /// Structural constants found by learning or justification
    pub(crate) constant_value: Vec<Val3>,
    pub(crate) cfna: CfnaTable,
    pub(crate) use_cfna: bool,
    pub(crate) marks: Marks,
    /// Stamp for unjustified results within one decision pass
    pub(crate) unjustified: [Marks; 2],
    /// Gates blocked by a candidate side input value, during sensitization
    pub(crate) blocked: Marks,
    pub(crate) dyn_candidates: Vec<usize>,
    pub(crate) dyn_pos: usize,
    pub(crate) backtrace_mode: BacktraceMode,
}

impl SearchContext {
    pub(crate) fn new(circuit: Circuit, backtrack_limit: usize, sensitization_level: u8) -> Self {
        let n = circuit.nb_gates();
        SearchContext {
            circuit,
            save_stack: Vec::new(),
            alt_stack: Vec::new(),
            eventq: VecDeque::new(),
            backtracks: 0,
            backtrack_limit,
            site: SINK,
            pgraph: PropagationGraph::default(),
            sensitization_level,
            learned: LearnedImplications::new(n),
            use_learning: false,
            learning_mode: false,
            constant_value: vec![Val3::X; n],
            cfna: CfnaTable::new(n),
            use_cfna: false,
            marks: Marks::default(),
            unjustified: [Marks::default(), Marks::default()],
            blocked: Marks::default(),
            dyn_candidates: Vec::new(),
            dyn_pos: 0,
            backtrace_mode: BacktraceMode::default(),
        }
    }

    /// Size the scratch structures for the current number of gates
    pub(crate) fn resize_scratch(&mut self) {
        let n = self.circuit.nb_gates();
        self.marks.resize(n);
        self.unjustified[0].resize(n);
        self.unjustified[1].resize(n);
        self.blocked.resize(n);
    }

    pub(crate) fn reset_backtracks(&mut self) {
        self.backtracks = 0;
    }

    /// Value of a gate on a rail
    pub(crate) fn value(&self, g: usize, rail: Rail) -> Val3 {
        let s = &self.circuit.gates[g].state;
        match rail {
            Rail::Faulty => s.fval,
            _ => s.gval,
        }
    }

    /// Record a structural constant, to be assigned at the start of every search
    pub(crate) fn add_constant(&mut self, g: usize, v: Val3) {
        if self.constant_value[g].is_unknown() {
            self.constant_value[g] = v;
        }
    }

    /// Queue a mandatory assignment
    pub(crate) fn enqueue(&mut self, gate: usize, gval: Val3, fval: Val3) {
        self.eventq.push_back(Assignment { gate, gval, fval });
    }

    /// Queue an assignment and remember its negation as an alternative
    pub(crate) fn opt_assign(&mut self, gate: usize, gval: Val3, fval: Val3) {
        self.alt_stack.push(Alternative {
            assignment: Assignment {
                gate,
                gval: !gval,
                fval: !fval,
            },
            bottom: self.save_stack.len(),
        });
        self.enqueue(gate, gval, fval);
    }

    /// Undo all assignments made after the log reached `bottom`
    pub(crate) fn restore_to(&mut self, bottom: usize) {
        while self.save_stack.len() > bottom {
            if let Some((g, s)) = self.save_stack.pop() {
                self.circuit.gates[g].state = s;
            }
        }
    }

    /// Undo everything and drop all choice points
    pub(crate) fn restore_all(&mut self) {
        self.restore_to(0);
        self.alt_stack.clear();
        self.eventq.clear();
    }

    /// Return to the most recent choice point and queue its alternative
    pub(crate) fn back_track(&mut self) -> Backtrack {
        self.eventq.clear();
        let Some(alt) = self.alt_stack.last().copied() else {
            return Backtrack::Exhausted;
        };
        if self.backtracks >= self.backtrack_limit {
            return Backtrack::LimitReached;
        }
        self.alt_stack.pop();
        self.restore_to(alt.bottom);
        self.eventq.push_back(alt.assignment);
        self.backtracks += 1;
        Backtrack::Resumed
    }

    /// Queue the assignments common to every search: constants and fault excitation
    fn set_request(&mut self, stuck: bool) {
        self.restore_all();
        let site = self.site;
        self.enqueue(site, Val3::from_bool(!stuck), Val3::from_bool(stuck));
        self.enqueue_constants();
    }

    /// Whether the fault effect is visible at an output
    pub(crate) fn fault_at_output(&self) -> bool {
        self.circuit.outputs.iter().any(|&o| {
            let s = self.circuit.gates[o].state;
            self.circuit.gates[o].fcone && s.gval.conflicts_with(s.fval)
        })
    }

    /// Run the search loop once the fault site is in place
    fn search(&mut self, stuck: bool, strategy: Strategy, dyn_mode: DynMode) -> SearchOutcome {
        self.set_request(stuck);
        let mut dyn_active = dyn_mode != DynMode::None;
        loop {
            let consistent = self.implication() && self.update_pgraph();
            if consistent {
                if self.sensitization_level > 0 && self.sensitize() {
                    continue;
                }
                if dyn_active && self.examine_dyn_imp() {
                    continue;
                }
                // In single-shot mode, trying values stops once it no longer finds anything
                if dyn_mode == DynMode::Once {
                    dyn_active = false;
                }
                let decided = match strategy {
                    Strategy::JustifyFirst => self.c_decision() || self.o_decision(),
                    Strategy::PropagateFirst => self.o_decision() || self.c_decision(),
                };
                if decided {
                    continue;
                }
                if self.fault_at_output() {
                    return SearchOutcome::Detected;
                }
            }
            match self.back_track() {
                Backtrack::Resumed => continue,
                Backtrack::Exhausted => return SearchOutcome::Redundant,
                Backtrack::LimitReached => return SearchOutcome::Aborted,
            }
        }
    }

    /// Search for a test for the fault with a given strategy
    fn run_episode(
        &mut self,
        fault: &Fault,
        peers: &[(usize, Fault)],
        strategy: Strategy,
        dyn_mode: DynMode,
    ) -> Episode {
        let splice = self.circuit.splice_fault(fault);
        self.site = splice.site;
        self.reset_backtracks();
        self.resize_scratch();
        let reached = self.pgraph.construct(&mut self.circuit, self.site);
        if reached {
            self.set_dyn_candidates(splice.driver);
        }
        let outcome = if reached {
            self.search(fault.value(), strategy, dyn_mode)
        } else {
            SearchOutcome::Redundant
        };
        let mut episode = Episode {
            outcome,
            backtracks: self.backtracks,
            cube: Vec::new(),
            dropped: Vec::new(),
            good_values: Vec::new(),
        };
        if outcome == SearchOutcome::Detected {
            episode.cube = self.extract_cube();
            episode.dropped = peers
                .iter()
                .filter(|(_, f)| self.detects_in_region(f))
                .map(|(i, _)| *i)
                .collect();
            episode.good_values = (0..self.circuit.nb_base_gates)
                .filter_map(|g| self.circuit.gval(g).to_bool().map(|b| (g, b)))
                .collect();
        }
        self.restore_all();
        self.pgraph.destruct(&mut self.circuit);
        self.circuit.unsplice_fault(splice);
        self.site = SINK;
        episode
    }

    /// Search for a test for the fault; an aborted search is retried once with the
    /// decision order swapped
    pub(crate) fn generate(
        &mut self,
        fault: &Fault,
        peers: &[(usize, Fault)],
        dyn_mode: DynMode,
    ) -> Episode {
        let mut total = 0;
        let mut ret = None;
        for strategy in [Strategy::JustifyFirst, Strategy::PropagateFirst] {
            let mut episode = self.run_episode(fault, peers, strategy, dyn_mode);
            total += episode.backtracks;
            episode.backtracks = total;
            let done = episode.outcome != SearchOutcome::Aborted;
            ret = Some(episode);
            if done {
                break;
            }
        }
        ret.unwrap_or(Episode {
            outcome: SearchOutcome::Aborted,
            backtracks: total,
            cube: Vec::new(),
            dropped: Vec::new(),
            good_values: Vec::new(),
        })
    }

    /// Input values fixed by the search, completed by the templates of the
    /// conflict-free gates it relied on
    fn extract_cube(&self) -> Vec<Val3> {
        let mut cube: Vec<Val3> = self
            .circuit
            .inputs
            .iter()
            .map(|&i| self.circuit.gval(i))
            .collect();
        if self.use_cfna {
            for &(g, _) in &self.save_stack {
                let gate = &self.circuit.gates[g];
                if gate.fcone || gate.kind == GateKind::Input {
                    continue;
                }
                if let Some(template) = self.cfna.template(g, gate.state.gval) {
                    for &(pos, b) in template {
                        if cube[pos].is_unknown() {
                            cube[pos] = Val3::from_bool(b);
                        }
                    }
                }
            }
        }
        cube
    }

    /// Whether a change on an input pin reaches the gate output, with the current good values
    fn pin_observed(&self, g: usize, pin: usize) -> bool {
        let gate = &self.circuit.gates[g];
        if matches!(gate.kind, GateKind::FaultSite(_)) {
            return true;
        }
        gate.kind.observes3(
            gate.fanins
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pin)
                .map(|(_, &f)| self.circuit.gval(f)),
        )
    }

    /// Whether another fault of the same fanout-free region is detected by the current assignment
    ///
    /// The fault must be excited and its effect must reach the region root through
    /// gates whose side inputs are fixed at non-blocking values.
    pub(crate) fn detects_in_region(&self, fault: &Fault) -> bool {
        let c = &self.circuit;
        let (mut cur, ok) = match *fault {
            Fault::OutputStuckAtFault { gate, value } => {
                (gate, c.gval(gate) == Val3::from_bool(!value))
            }
            Fault::InputStuckAtFault { gate, input, value } => {
                let d = c.gates[gate].fanins[input];
                let ok = c.gval(d) == Val3::from_bool(!value) && self.pin_observed(gate, input);
                (gate, ok)
            }
        };
        if !ok {
            return false;
        }
        let root = c.gates[fault.gate()].fos;
        while cur != root {
            let Some(fo) = c.gates[cur].fanouts.first().copied() else {
                return false;
            };
            if !self.pin_observed(fo.gate, fo.pin) {
                return false;
            }
            cur = fo.gate;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::testcases;

    fn context(circuit: Circuit, limit: usize, level: u8) -> SearchContext {
        SearchContext::new(circuit, limit, level)
    }

    fn all_unassigned(ctx: &SearchContext) -> bool {
        (0..ctx.circuit.nb_gates()).all(|g| ctx.circuit.state(g) == GateState::default())
    }

    #[test]
    fn test_and_output() {
        let mut ctx = context(testcases::and2().unwrap(), 16, 2);
        let fault = Fault::OutputStuckAtFault {
            gate: 2,
            value: false,
        };
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Detected);
        assert_eq!(ep.cube, vec![Val3::One, Val3::One]);
        assert_eq!(ep.backtracks, 0);
        assert!(all_unassigned(&ctx));
        assert_eq!(ctx.circuit.nb_gates(), 3);
    }

    #[test]
    fn test_unobserved() {
        let mut ctx = context(testcases::unobserved_inverter().unwrap(), 16, 2);
        let fault = Fault::OutputStuckAtFault {
            gate: 2,
            value: true,
        };
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Redundant);
    }

    #[test]
    fn test_xor_input() {
        let mut ctx = context(testcases::xor2().unwrap(), 16, 2);
        let fault = Fault::InputStuckAtFault {
            gate: 2,
            input: 1,
            value: false,
        };
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Detected);
        assert_eq!(ep.cube[1], Val3::One);
        assert!(all_unassigned(&ctx));
    }

    #[test]
    fn test_backtrack_limit() {
        let fault = Fault::OutputStuckAtFault {
            gate: 6,
            value: false,
        };
        // Without sensitization, proving the consensus term redundant needs a decision
        let mut ctx = context(testcases::consensus().unwrap(), 0, 0);
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Aborted);
        assert_eq!(ep.backtracks, 0);
        assert!(all_unassigned(&ctx));

        let mut ctx = context(testcases::consensus().unwrap(), 16, 0);
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Redundant);
        assert!(ep.backtracks > 0);

        // Unique sensitization proves it without any choice
        let mut ctx = context(testcases::consensus().unwrap(), 0, 1);
        let ep = ctx.generate(&fault, &[], DynMode::None);
        assert_eq!(ep.outcome, SearchOutcome::Redundant);
        assert_eq!(ep.backtracks, 0);
    }

    #[test]
    fn test_undo() {
        let mut ctx = context(testcases::c17().unwrap(), 16, 2);
        let fault = Fault::OutputStuckAtFault {
            gate: 8,
            value: true,
        };
        let splice = ctx.circuit.splice_fault(&fault);
        ctx.site = splice.site;
        ctx.resize_scratch();
        assert!(ctx.pgraph.construct(&mut ctx.circuit, ctx.site));
        ctx.set_request(true);
        assert!(ctx.implication());
        assert!(!ctx.save_stack.is_empty());
        ctx.opt_assign(0, Val3::One, Val3::X);
        assert!(ctx.implication());
        ctx.restore_all();
        ctx.pgraph.destruct(&mut ctx.circuit);
        ctx.circuit.unsplice_fault(splice);
        assert!(all_unassigned(&ctx));
        ctx.circuit.check();
    }

    #[test]
    fn test_marks() {
        let mut m = Marks::default();
        m.resize(4);
        m.clear();
        assert!(m.mark(2));
        assert!(!m.mark(2));
        assert!(m.is_marked(2));
        m.clear();
        assert!(!m.is_marked(2));
    }
}
