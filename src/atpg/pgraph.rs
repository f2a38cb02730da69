//! Propagation graph: the part of the fault cone where the fault effect may still reach an output

use std::collections::VecDeque;

use crate::network::{intersect, Circuit, SINK};

use super::search::SearchContext;

/// Fault cone of the current site and its possible propagation paths
#[derive(Debug, Clone, Default)]
pub(crate) struct PropagationGraph {
    /// Gates of the fault cone, by increasing level
    cone: Vec<usize>,
    /// Whether the good and faulty values may still differ
    dif: Vec<bool>,
    /// Whether the gate is on a possible propagation path to an output
    pg: Vec<bool>,
    /// Immediate dominator of each gate of the propagation graph, toward the outputs
    ipdom: Vec<usize>,
}

impl PropagationGraph {
    /// Mark the fault cone of the site; returns whether it reaches an output
    pub(crate) fn construct(&mut self, circuit: &mut Circuit, site: usize) -> bool {
        let n = circuit.nb_gates();
        self.dif.clear();
        self.dif.resize(n, false);
        self.pg.clear();
        self.pg.resize(n, false);
        self.ipdom.clear();
        self.ipdom.resize(n, SINK);
        self.cone.clear();
        let mut queue = VecDeque::from([site]);
        circuit.gates[site].fcone = true;
        let mut reached = false;
        while let Some(g) = queue.pop_front() {
            self.cone.push(g);
            reached |= circuit.gates[g].is_output && circuit.gates[g].active;
            for k in 0..circuit.gates[g].act_fanouts.len() {
                let y = circuit.gates[g].act_fanouts[k].gate;
                if !circuit.gates[y].fcone {
                    circuit.gates[y].fcone = true;
                    queue.push_back(y);
                }
            }
        }
        self.cone.sort_by_key(|&g| circuit.gates[g].level);
        reached
    }

    /// Clear the fault cone marks
    pub(crate) fn destruct(&mut self, circuit: &mut Circuit) {
        for &g in &self.cone {
            circuit.gates[g].fcone = false;
            self.dif[g] = false;
            self.pg[g] = false;
        }
        self.cone.clear();
    }

    /// Recompute the propagation paths from the current values; returns whether the site
    /// is still on one
    pub(crate) fn update(&mut self, circuit: &Circuit, site: usize) -> bool {
        for &g in &self.cone {
            let gate = &circuit.gates[g];
            let s = gate.state;
            let reachable = g == site || gate.fanins.iter().any(|&x| self.dif[x]);
            self.dif[g] = reachable && !(s.gval.is_known() && s.gval == s.fval);
        }
        for &g in self.cone.iter().rev() {
            let gate = &circuit.gates[g];
            self.pg[g] = self.dif[g]
                && ((gate.is_output && gate.active)
                    || gate.act_fanouts.iter().any(|fo| self.pg[fo.gate]));
        }
        self.pg[site]
    }

    /// Compute the dominators of the propagation graph: every path from a gate to an
    /// output goes through its dominators
    pub(crate) fn compute_dominators(&mut self, circuit: &Circuit) {
        for i in (0..self.cone.len()).rev() {
            let g = self.cone[i];
            if !self.pg[g] {
                continue;
            }
            let gate = &circuit.gates[g];
            let mut d = None;
            if !gate.is_output {
                for fo in &gate.act_fanouts {
                    if self.pg[fo.gate] {
                        d = Some(match d {
                            None => fo.gate,
                            Some(d) => {
                                intersect(&self.ipdom, |x| circuit.gates[x].level, d, fo.gate)
                            }
                        });
                    }
                }
            }
            self.ipdom[g] = d.unwrap_or(SINK);
        }
    }

    /// Immediate dominators, valid after [`PropagationGraph::compute_dominators`]
    pub(crate) fn dominators(&self) -> &[usize] {
        &self.ipdom
    }

    /// Gates of the fault cone, by increasing level
    #[cfg(test)]
    pub(crate) fn cone(&self) -> &[usize] {
        &self.cone
    }

    /// Whether the values of the gate may still differ between the two circuits
    pub(crate) fn is_dif(&self, g: usize) -> bool {
        self.dif.get(g).copied().unwrap_or(false)
    }

    /// Whether the gate is on a possible propagation path
    pub(crate) fn on_path(&self, g: usize) -> bool {
        self.pg.get(g).copied().unwrap_or(false)
    }
}

impl SearchContext {
    /// Refresh the propagation graph; false if the fault effect can no longer reach an output
    pub(crate) fn update_pgraph(&mut self) -> bool {
        self.pgraph.update(&self.circuit, self.site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::testcases;
    use crate::network::Val3;
    use crate::sim::Fault;

    #[test]
    fn test_blocked_path() {
        let mut c = testcases::and2().unwrap();
        let splice = c.splice_fault(&Fault::InputStuckAtFault {
            gate: 2,
            input: 0,
            value: true,
        });
        let mut pg = PropagationGraph::default();
        assert!(pg.construct(&mut c, splice.site));
        assert_eq!(pg.cone(), &[splice.site, 2]);
        assert!(pg.update(&c, splice.site));
        assert!(pg.on_path(2));

        // A controlling value on the side input blocks the only path
        c.gates[1].state.gval = Val3::Zero;
        c.gates[1].state.fval = Val3::Zero;
        c.gates[2].state.gval = Val3::Zero;
        c.gates[2].state.fval = Val3::Zero;
        assert!(!pg.update(&c, splice.site));
        assert!(pg.is_dif(splice.site));
        assert!(!pg.is_dif(2));

        pg.destruct(&mut c);
        c.gates[1].state = Default::default();
        c.gates[2].state = Default::default();
        c.unsplice_fault(splice);
        assert!(c.gates.iter().all(|g| !g.fcone));
        c.check();
    }

    #[test]
    fn test_unreachable() {
        let mut c = testcases::unobserved_inverter().unwrap();
        let splice = c.splice_fault(&Fault::OutputStuckAtFault {
            gate: 2,
            value: true,
        });
        let mut pg = PropagationGraph::default();
        assert!(!pg.construct(&mut c, splice.site));
        pg.destruct(&mut c);
        c.unsplice_fault(splice);
    }
}
