//! Conflict-free node assignment: input templates that set a gate to a value without
//! touching anything outside its fanin cone
//!
//! Basis gates are justified once each by a fault-free search with their fanouts cut.
//! Other gates reuse the templates of their inputs when those inputs do not reconverge.

use fxhash::FxHashMap;
use tracing::{debug, info};

use crate::network::{GateKind, Val3, SINK};

use super::search::{Backtrack, Rail, SearchContext};

/// Template of input values for each gate and value that has one
#[derive(Debug, Clone, Default)]
pub(crate) struct CfnaTable {
    terminal: Vec<[bool; 2]>,
    templates: FxHashMap<usize, Vec<(usize, bool)>>,
}

fn key(g: usize, v: bool) -> usize {
    2 * g + v as usize
}

impl CfnaTable {
    pub(crate) fn new(nb_gates: usize) -> Self {
        CfnaTable {
            terminal: vec![[false; 2]; nb_gates],
            templates: FxHashMap::default(),
        }
    }

    /// Whether the gate can be set to the value by its template alone
    pub(crate) fn is_terminal(&self, g: usize, v: Val3) -> bool {
        match (self.terminal.get(g), v.to_bool()) {
            (Some(t), Some(b)) => t[b as usize],
            _ => false,
        }
    }

    /// Input positions and values of the template
    pub(crate) fn template(&self, g: usize, v: Val3) -> Option<&[(usize, bool)]> {
        let b = v.to_bool()?;
        self.templates.get(&key(g, b)).map(|t| t.as_slice())
    }

    fn set(&mut self, g: usize, v: bool, template: Vec<(usize, bool)>) {
        self.terminal[g][v as usize] = true;
        self.templates.insert(key(g, v), template);
    }

    /// Number of gate values with a template
    pub(crate) fn len(&self) -> usize {
        self.templates.len()
    }
}

/// Result of a fault-free justification search
#[derive(Debug, Clone, PartialEq, Eq)]
enum Justification {
    /// Input values that justify the gate, by input position
    Justified(Vec<(usize, bool)>),
    /// No assignment can give the gate this value
    Impossible,
    Aborted,
}

/// Merge templates into one, or None if they disagree on an input
fn merge<'a, I: IntoIterator<Item = &'a [(usize, bool)]>>(templates: I) -> Option<Vec<(usize, bool)>> {
    let mut values: FxHashMap<usize, bool> = FxHashMap::default();
    for t in templates {
        for &(pos, b) in t {
            if *values.entry(pos).or_insert(b) != b {
                return None;
            }
        }
    }
    let mut ret: Vec<(usize, bool)> = values.into_iter().collect();
    ret.sort();
    Some(ret)
}

impl SearchContext {
    /// Justify a value on a gate in the fault-free circuit, ignoring its fanouts
    fn justify(&mut self, g: usize, v: Val3, input_pos: &[usize]) -> Justification {
        let fanouts = std::mem::take(&mut self.circuit.gates[g].act_fanouts);
        self.restore_all();
        self.reset_backtracks();
        self.enqueue_constants();
        self.enqueue(g, v, Val3::X);
        let ret = loop {
            if self.implication() {
                if self.c_decision() {
                    continue;
                }
                if self.chk_just(g, Rail::Both) {
                    let cube = self
                        .circuit
                        .inputs
                        .iter()
                        .filter_map(|&i| self.circuit.gval(i).to_bool().map(|b| (input_pos[i], b)))
                        .collect();
                    break Justification::Justified(cube);
                }
                break Justification::Aborted;
            }
            match self.back_track() {
                Backtrack::Resumed => continue,
                Backtrack::Exhausted => break Justification::Impossible,
                Backtrack::LimitReached => break Justification::Aborted,
            }
        };
        self.restore_all();
        self.circuit.gates[g].act_fanouts = fanouts;
        ret
    }

    /// Whether the fanout branches of a gate meet again
    fn has_reconvergence(&self, g: usize) -> bool {
        let fanouts = &self.circuit.gates[g].fanouts;
        if fanouts.len() < 2 {
            return false;
        }
        let mut branch: FxHashMap<usize, usize> = FxHashMap::default();
        for (b, fo) in fanouts.iter().enumerate() {
            let mut stack = vec![fo.gate];
            while let Some(y) = stack.pop() {
                if let Some(&other) = branch.get(&y) {
                    if other != b {
                        return true;
                    }
                    continue;
                }
                branch.insert(y, b);
                stack.extend(self.circuit.gates[y].fanouts.iter().map(|fo| fo.gate));
            }
        }
        false
    }

    /// Compose a template for a non-basis gate from the templates of its inputs
    fn compose_template(&self, g: usize, v: bool, free: &[bool]) -> Option<Vec<(usize, bool)>> {
        let gate = &self.circuit.gates[g];
        let kind = gate.kind;
        let usable = |x: usize, b: bool| free[x] && self.cfna.is_terminal(x, Val3::from_bool(b));
        let template = |x: usize, b: bool| self.cfna.template(x, Val3::from_bool(b)).unwrap_or(&[]);
        match kind {
            GateKind::Const0 | GateKind::Const1 => {
                (kind.constant_value() == Some(v)).then(Vec::new)
            }
            GateKind::Buf | GateKind::Not => {
                let x = gate.fanins[0];
                let b = v ^ (kind == GateKind::Not);
                usable(x, b).then(|| template(x, b).to_vec())
            }
            _ if kind.is_simple() => {
                let c = kind.controlling_value().to_bool()?;
                if Val3::from_bool(v) == kind.controlled_output() {
                    gate.fanins
                        .iter()
                        .find(|&&x| usable(x, c))
                        .map(|&x| template(x, c).to_vec())
                } else if gate.fanins.iter().all(|&x| usable(x, !c)) {
                    merge(gate.fanins.iter().map(|&x| template(x, !c)))
                } else {
                    None
                }
            }
            _ if kind.is_xor_like() => {
                // Inputs terminal for a single value are fixed; the first one terminal for
                // both absorbs the parity
                let mut parity = v ^ (kind == GateKind::Xnor);
                let mut slack = None;
                let mut choice = Vec::with_capacity(gate.fanins.len());
                for &x in &gate.fanins {
                    let (t0, t1) = (usable(x, false), usable(x, true));
                    if t0 && t1 && slack.is_none() {
                        slack = Some(choice.len());
                        choice.push((x, false));
                    } else if t0 {
                        choice.push((x, false));
                    } else if t1 {
                        parity ^= true;
                        choice.push((x, true));
                    } else {
                        return None;
                    }
                }
                match slack {
                    Some(i) => choice[i].1 = parity,
                    None if parity => return None,
                    None => (),
                }
                merge(choice.iter().map(|&(x, b)| template(x, b)))
            }
            _ => None,
        }
    }

    /// Compute the conflict-free templates of all active gates
    ///
    /// Returns the number of gate values with a template and of structural constants found.
    pub(crate) fn compute_cfna(&mut self) -> (usize, usize) {
        let n = self.circuit.nb_gates();
        self.cfna = CfnaTable::new(n);
        self.resize_scratch();
        let (use_learning, use_cfna) = (self.use_learning, self.use_cfna);
        self.use_learning = false;
        self.use_cfna = false;
        let mut input_pos = vec![SINK; n];
        for (pos, &i) in self.circuit.inputs.iter().enumerate() {
            input_pos[i] = pos;
            self.cfna.set(i, false, vec![(pos, false)]);
            self.cfna.set(i, true, vec![(pos, true)]);
        }

        let order = self.circuit.topo_order.clone();
        let mut nb_constants = 0;
        let mut nb_aborted = 0;
        for &g in &order {
            let gate = &self.circuit.gates[g];
            if !gate.active || !gate.basis || gate.kind == GateKind::Input {
                continue;
            }
            for v in [false, true] {
                if self.constant_value[g] == Val3::from_bool(!v) {
                    continue;
                }
                match self.justify(g, Val3::from_bool(v), &input_pos) {
                    Justification::Justified(cube) => self.cfna.set(g, v, cube),
                    Justification::Impossible => {
                        debug!("Gate {} can never be {}", self.circuit.gates[g].name, v as u8);
                        self.add_constant(g, Val3::from_bool(!v));
                        nb_constants += 1;
                    }
                    Justification::Aborted => nb_aborted += 1,
                }
            }
        }

        // A gate can lend its templates to its fanouts if its branches never meet again
        let mut free = vec![false; n];
        for &g in &order {
            if !self.circuit.gates[g].active {
                continue;
            }
            if self.circuit.gates[g].kind != GateKind::Input {
                for v in [false, true] {
                    if self.cfna.is_terminal(g, Val3::from_bool(v)) {
                        continue;
                    }
                    if let Some(t) = self.compose_template(g, v, &free) {
                        self.cfna.set(g, v, t);
                    }
                }
            }
            let terminal = self.cfna.is_terminal(g, Val3::Zero) || self.cfna.is_terminal(g, Val3::One);
            free[g] = terminal && !self.has_reconvergence(g);
        }

        self.use_learning = use_learning;
        self.use_cfna = use_cfna;
        info!(
            "CFNA: {} templates, {} constants, {} aborted justifications",
            self.cfna.len(),
            nb_constants,
            nb_aborted
        );
        (self.cfna.len(), nb_constants)
    }
}

#[cfg(test)]
mod tests {
    use super::merge;
    use crate::atpg::search::SearchContext;
    use crate::network::generators::{parity, testcases};
    use crate::network::{CircuitBuilder, GateKind, PackedVal, Val3};
    use crate::sim::{detects, Fault, SimpleSimulator, TestPattern};

    #[test]
    fn test_merge() {
        let a: &[(usize, bool)] = &[(0, true), (2, false)];
        let b: &[(usize, bool)] = &[(1, true), (2, false)];
        let c: &[(usize, bool)] = &[(2, true)];
        assert_eq!(merge([a, b]), Some(vec![(0, true), (1, true), (2, false)]));
        assert_eq!(merge([a, c]), None);
    }

    #[test]
    fn test_templates_justify() {
        for circuit in [testcases::c17().unwrap(), testcases::consensus().unwrap(), parity::tree(6).unwrap()] {
            let mut ctx = SearchContext::new(circuit, 64, 0);
            let (nb, _) = ctx.compute_cfna();
            assert!(nb >= 2 * ctx.circuit.nb_inputs());
            for g in 0..ctx.circuit.nb_gates() {
                for v in [Val3::Zero, Val3::One] {
                    let Some(template) = ctx.cfna.template(g, v) else {
                        continue;
                    };
                    let mut cube = vec![Val3::X; ctx.circuit.nb_inputs()];
                    for &(pos, b) in template {
                        cube[pos] = Val3::from_bool(b);
                    }
                    // Every completion of the template gives the value
                    for fill in [false, true] {
                        let values: Vec<bool> = cube
                            .iter()
                            .map(|x| x.to_bool().unwrap_or(fill))
                            .collect();
                        let inputs: Vec<PackedVal> =
                            values.iter().map(|&b| PackedVal::splat(b)).collect();
                        let mut sim = SimpleSimulator::from_circuit(&ctx.circuit);
                        sim.run(&inputs);
                        assert_eq!(Val3::from_bool(sim.node_values[g].lane(0)), v, "gate {g}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_impossible_value() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let na = b.not(a);
        let z = b.add_gate(GateKind::And, &[a, na]);
        b.add_output(z);
        let mut ctx = SearchContext::new(b.build().unwrap(), 16, 0);
        let (_, constants) = ctx.compute_cfna();
        assert_eq!(constants, 1);
        assert_eq!(ctx.constant_value[z], Val3::Zero);
        assert!(ctx.cfna.is_terminal(z, Val3::Zero));
        assert!(!ctx.cfna.is_terminal(z, Val3::One));
    }

    #[test]
    fn test_output_faults_detected() {
        // Every gate of a parity tree is a basis gate: its output faults are found through
        // the templates alone
        let mut ctx = SearchContext::new(parity::tree(8).unwrap(), 1000, 2);
        ctx.compute_cfna();
        ctx.use_cfna = true;
        let o = ctx.circuit.outputs[0];
        for value in [false, true] {
            let fault = Fault::OutputStuckAtFault { gate: o, value };
            let ep = ctx.generate(&fault, &[], crate::config::DynMode::None);
            assert_eq!(ep.outcome, crate::atpg::search::SearchOutcome::Detected);
            let bits: Vec<bool> = ep.cube.iter().map(|x| x.to_bool().unwrap_or(false)).collect();
            assert!(detects(&ctx.circuit, &TestPattern::from_bools(&bits), &fault));
        }
    }
}
