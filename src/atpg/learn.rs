//! Static learning: global implications found once by speculative assignment
//!
//! Each value of each multi-input gate is assigned on its own in the fault-free circuit.
//! A conflict makes the gate a structural constant. Otherwise every non-trivial
//! consequence `t = w` is recorded as its contrapositive: `t = !w` implies `s = !v`.

use itertools::Itertools;
use tracing::{debug, info};

use crate::network::{GateKind, Val3};

use super::search::{Rail, SearchContext};

/// Learned implications, attached to the gate and value that trigger them
#[derive(Debug, Clone, Default)]
pub(crate) struct LearnedImplications {
    lists: Vec<[Vec<(usize, Val3)>; 2]>,
}

fn slot(v: Val3) -> Option<usize> {
    match v {
        Val3::Zero => Some(0),
        Val3::One => Some(1),
        Val3::X => None,
    }
}

impl LearnedImplications {
    pub(crate) fn new(nb_gates: usize) -> Self {
        LearnedImplications {
            lists: vec![[Vec::new(), Vec::new()]; nb_gates],
        }
    }

    /// Consequences of a gate taking a value
    pub(crate) fn get(&self, g: usize, v: Val3) -> &[(usize, Val3)] {
        match (self.lists.get(g), slot(v)) {
            (Some(l), Some(i)) => &l[i],
            _ => &[],
        }
    }

    fn add(&mut self, g: usize, v: Val3, target: usize, w: Val3) {
        if let Some(i) = slot(v) {
            let list = &mut self.lists[g][i];
            if !list.contains(&(target, w)) {
                list.push((target, w));
            }
        }
    }

    /// Total number of learned implications
    pub(crate) fn len(&self) -> usize {
        self.lists.iter().map(|l| l[0].len() + l[1].len()).sum()
    }
}

/// Whether an implied value carries information the local rules cannot recover backward
fn is_nontrivial(kind: GateKind, w: Val3) -> bool {
    kind == GateKind::Input
        || kind.is_xor_like()
        || (kind.is_simple() && w == !kind.controlled_output())
}

impl SearchContext {
    /// Queue the values of the constant gates and of the known structural constants
    pub(crate) fn enqueue_constants(&mut self) {
        for g in 0..self.circuit.nb_gates() {
            let v = match self.circuit.gates[g].kind {
                GateKind::Const0 => Val3::Zero,
                GateKind::Const1 => Val3::One,
                _ => self.constant_value.get(g).copied().unwrap_or_default(),
            };
            if v.is_known() && self.circuit.gates[g].active {
                self.enqueue(g, v, Val3::X);
            }
        }
    }

    /// Assign a value speculatively; returns false on conflict, otherwise records the
    /// learned implications before undoing everything
    fn learn_value(&mut self, s: usize, v: Val3) -> bool {
        self.restore_all();
        self.enqueue_constants();
        if !self.implication() {
            self.restore_all();
            return true;
        }
        let base = self.save_stack.len();
        self.enqueue(s, v, Val3::X);
        // Basis gates stop backward implication, except for the source itself
        let consistent = self.implication()
            && self.imply_local(s, Rail::Good).is_ok()
            && self.implication();
        if !consistent {
            self.restore_all();
            return false;
        }
        for k in base..self.save_stack.len() {
            let t = self.save_stack[k].0;
            if t == s || self.circuit.equivalents(s).any(|e| e == t) {
                continue;
            }
            let w = self.circuit.gval(t);
            if w.is_known() && is_nontrivial(self.circuit.gates[t].kind, w) {
                self.learned.add(t, !w, s, !v);
            }
        }
        self.restore_all();
        true
    }

    /// Run static learning on all active gates with several inputs
    ///
    /// Returns the number of learned implications and of structural constants found.
    pub(crate) fn learn(&mut self) -> (usize, usize) {
        let n = self.circuit.nb_gates();
        self.learned = LearnedImplications::new(n);
        self.resize_scratch();
        let (use_learning, use_cfna) = (self.use_learning, self.use_cfna);
        self.use_learning = false;
        self.use_cfna = false;
        self.learning_mode = true;
        let order: Vec<usize> = (0..n)
            .filter(|&g| self.circuit.gates[g].active && self.circuit.gates[g].fanins.len() >= 2)
            .sorted_by_key(|&g| (self.circuit.gates[g].level, g))
            .collect();
        let mut nb_constants = 0;
        for s in order {
            for v in [Val3::Zero, Val3::One] {
                if self.constant_value[s].is_known() {
                    break;
                }
                if !self.learn_value(s, v) {
                    debug!("Gate {} is constant {}", self.circuit.gates[s].name, !v);
                    self.add_constant(s, !v);
                    nb_constants += 1;
                }
            }
        }
        self.learning_mode = false;
        self.use_learning = use_learning;
        self.use_cfna = use_cfna;
        let nb_learned = self.learned.len();
        info!(
            "Static learning: {} implications, {} constants",
            nb_learned, nb_constants
        );
        (nb_learned, nb_constants)
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::search::SearchContext;
    use crate::network::{CircuitBuilder, GateKind, Val3};

    #[test]
    fn test_learned_contrapositive() {
        // Half adder: s = 1 forces t = 0, so t = 1 implies s = 0
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let x = b.add_input();
        let s = b.and(a, x);
        let t = b.xor(a, x);
        b.add_output(s);
        b.add_output(t);
        let mut ctx = SearchContext::new(b.build().unwrap(), 16, 0);
        let (nb, constants) = ctx.learn();
        assert!(nb > 0);
        assert_eq!(constants, 0);
        assert!(ctx.learned.get(t, Val3::One).contains(&(s, Val3::Zero)));
        assert!(ctx.save_stack.is_empty());

        // The local rules alone see nothing
        ctx.enqueue(t, Val3::One, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(s), Val3::X);
        ctx.restore_all();

        ctx.use_learning = true;
        ctx.enqueue(t, Val3::One, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(s), Val3::Zero);
        ctx.restore_all();
    }

    #[test]
    fn test_structural_constant() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let na = b.not(a);
        let z = b.add_gate(GateKind::And, &[a, na]);
        let o = b.or(z, a);
        b.add_output(o);
        let mut ctx = SearchContext::new(b.build().unwrap(), 16, 0);
        let (_, constants) = ctx.learn();
        assert_eq!(constants, 1);
        assert_eq!(ctx.constant_value[z], Val3::Zero);
    }
}
