//! Structural analysis of the circuit: fanout-free regions, dominators, equivalent gates

use fxhash::FxHashMap;

use super::circuit::Circuit;
use super::gates::GateKind;

/// Virtual sink post-dominating every output
pub(crate) const SINK: usize = usize::MAX;

/// Closest common ancestor of two gates in a dominator tree, using levels to walk up
pub(crate) fn intersect(idom: &[usize], level: impl Fn(usize) -> usize, a: usize, b: usize) -> usize {
    let mut a = a;
    let mut b = b;
    while a != b {
        if a == SINK || b == SINK {
            return SINK;
        }
        let la = level(a);
        let lb = level(b);
        if la < lb {
            a = idom[a];
        } else if lb < la {
            b = idom[b];
        } else {
            a = idom[a];
            b = idom[b];
        }
    }
    a
}

impl Circuit {
    /// Compute all structural information derived from the topology
    pub(crate) fn compute_structure(&mut self) {
        self.compute_min_levels();
        self.compute_stems();
        self.compute_basis();
        self.compute_equivalences();
    }

    /// Level of the closest output reachable from each gate
    fn compute_min_levels(&mut self) {
        for i in (0..self.topo_order.len()).rev() {
            let g = self.topo_order[i];
            let gate = &self.gates[g];
            let mut m = if gate.is_output {
                gate.level
            } else {
                usize::MAX
            };
            for fo in &gate.fanouts {
                m = m.min(self.gates[fo.gate].min_level);
            }
            self.gates[g].min_level = m;
        }
    }

    /// Root of the fanout-free region of each gate
    ///
    /// A gate with a single fanout that is not an output belongs to the region of its fanout.
    fn compute_stems(&mut self) {
        for i in (0..self.topo_order.len()).rev() {
            let g = self.topo_order[i];
            let gate = &self.gates[g];
            let fos = if gate.is_output || gate.fanouts.len() != 1 {
                g
            } else {
                self.gates[gate.fanouts[0].gate].fos
            };
            self.gates[g].fos = fos;
        }
    }

    /// Immediate post-dominator of each gate, with the virtual sink above the outputs
    pub(crate) fn post_dominators(&self) -> Vec<usize> {
        let mut ipdom = vec![SINK; self.gates.len()];
        for i in (0..self.topo_order.len()).rev() {
            let g = self.topo_order[i];
            let gate = &self.gates[g];
            if gate.is_output || gate.fanouts.is_empty() {
                continue;
            }
            let mut d = gate.fanouts[0].gate;
            for fo in &gate.fanouts[1..] {
                d = intersect(&ipdom, |x| self.gates[x].level, d, fo.gate);
            }
            ipdom[g] = d;
        }
        ipdom
    }

    /// Mark the gates that post-dominate their whole transitive fanin
    ///
    /// The closest post-dominator of the fanin cone is computed incrementally: it is the
    /// common post-dominator of the gate and of the cone dominators of its inputs.
    fn compute_basis(&mut self) {
        let ipdom = self.post_dominators();
        let mut cone_dom = vec![SINK; self.gates.len()];
        for i in 0..self.topo_order.len() {
            let g = self.topo_order[i];
            let mut d = g;
            for &f in &self.gates[g].fanins {
                d = intersect(&ipdom, |x| self.gates[x].level, d, cone_dom[f]);
            }
            cone_dom[g] = d;
            self.gates[g].basis = d == g;
        }
    }

    /// Group gates computing the same function of the same representatives
    fn compute_equivalences(&mut self) {
        let mut rep: Vec<usize> = (0..self.gates.len()).collect();
        let mut classes: FxHashMap<(GateKind, Vec<usize>), usize> = FxHashMap::default();
        for i in 0..self.topo_order.len() {
            let g = self.topo_order[i];
            let kind = self.gates[g].kind;
            if kind == GateKind::Input {
                continue;
            }
            let mut key: Vec<usize> = self.gates[g].fanins.iter().map(|&f| rep[f]).collect();
            key.sort();
            rep[g] = *classes.entry((kind, key)).or_insert(g);
        }
        let mut members: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for &g in &self.topo_order {
            members.entry(rep[g]).or_default().push(g);
        }
        for g in 0..self.gates.len() {
            self.gates[g].eq_next = g;
        }
        for class in members.values() {
            for (i, &g) in class.iter().enumerate() {
                self.gates[g].eq_next = class[(i + 1) % class.len()];
            }
        }
    }

    /// Iterate over the other members of the equivalence class of a gate
    pub(crate) fn equivalents(&self, g: usize) -> impl Iterator<Item = usize> + '_ {
        let mut cur = self.gates[g].eq_next;
        std::iter::from_fn(move || {
            if cur == g {
                None
            } else {
                let ret = cur;
                cur = self.gates[cur].eq_next;
                Some(ret)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::network::CircuitBuilder;

    #[test]
    fn test_stems() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let x = b.and(a, c);
        let y = b.not(x);
        let z = b.or(y, a);
        b.add_output(z);
        let circuit = b.build().unwrap();
        assert_eq!(circuit.gate(x).fanout_stem(), z);
        assert_eq!(circuit.gate(y).fanout_stem(), z);
        assert_eq!(circuit.gate(c).fanout_stem(), z);
        // Two fanouts
        assert_eq!(circuit.gate(a).fanout_stem(), a);
        assert_eq!(circuit.gate(x).min_level(), circuit.gate(z).level());
    }

    #[test]
    fn test_basis() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let d = b.add_input();
        let x = b.and(a, c);
        let y = b.and(x, d);
        let z = b.or(a, y);
        b.add_output(z);
        let mut b2 = b.clone();
        let circuit = b.build().unwrap();
        // a reconverges at z, which dominates its whole cone
        assert!(circuit.gate(z).is_basis());
        assert!(!circuit.gate(x).is_basis());
        assert!(!circuit.gate(y).is_basis());
        assert!(circuit.gate(a).is_basis());

        // c escapes through w
        let w = b2.xor(c, d);
        b2.add_output(w);
        let circuit = b2.build().unwrap();
        assert!(!circuit.gate(z).is_basis());
        assert!(!circuit.gate(w).is_basis());
    }

    #[test]
    fn test_equivalences() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let x1 = b.and(a, c);
        let x2 = b.and(c, a);
        let y1 = b.not(x1);
        let y2 = b.not(x2);
        let z = b.or(y1, y2);
        let o = b.or(a, c);
        b.add_output(z);
        b.add_output(o);
        let circuit = b.build().unwrap();
        assert_eq!(circuit.gate(x1).eq_next(), x2);
        assert_eq!(circuit.gate(x2).eq_next(), x1);
        assert_eq!(circuit.equivalents(y1).collect::<Vec<_>>(), vec![y2]);
        assert_eq!(circuit.gate(o).eq_next(), o);
        assert_eq!(circuit.equivalents(a).count(), 0);
    }
}
