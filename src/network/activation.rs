//! Activation of the part of the circuit relevant to a group of faults, and fault site insertion

use std::collections::VecDeque;

use super::circuit::{Circuit, Fanout, Gate, GateState};
use super::gates::GateKind;
use crate::sim::Fault;

/// Record of a fault site spliced into the circuit, used to restore the topology
#[derive(Debug, Clone)]
pub(crate) struct Splice {
    /// The fault site gate
    pub site: usize,
    /// Gate driving the fault site
    pub driver: usize,
    /// Positions in the output list that moved from the driver to the site
    moved_outputs: Vec<usize>,
}

impl Circuit {
    /// Mark gates reachable backward from a set of gates
    fn mark_tfi(&self, roots: &[usize]) -> Vec<bool> {
        let mut marked = vec![false; self.gates.len()];
        let mut stack: Vec<usize> = roots.to_vec();
        while let Some(g) = stack.pop() {
            if marked[g] {
                continue;
            }
            marked[g] = true;
            stack.extend(self.gates[g].fanins.iter().copied());
        }
        marked
    }

    /// Mark gates reachable forward from a gate
    pub(crate) fn mark_tfo(&self, root: usize) -> Vec<bool> {
        let mut marked = vec![false; self.gates.len()];
        let mut queue = VecDeque::from([root]);
        while let Some(g) = queue.pop_front() {
            if marked[g] {
                continue;
            }
            marked[g] = true;
            queue.extend(self.gates[g].fanouts.iter().map(|fo| fo.gate));
        }
        marked
    }

    fn set_active(&mut self, active: Vec<bool>, scope: Option<Vec<bool>>) {
        for (g, a) in active.iter().enumerate() {
            self.gates[g].active = *a;
            self.gates[g].scope = scope.as_ref().map(|s| s[g] && *a).unwrap_or(false);
        }
        for g in 0..self.gates.len() {
            let act: Vec<Fanout> = if self.gates[g].active {
                self.gates[g]
                    .fanouts
                    .iter()
                    .filter(|fo| active[fo.gate])
                    .copied()
                    .collect()
            } else {
                Vec::new()
            };
            self.gates[g].act_fanouts = act;
        }
    }

    /// Activate every gate that can reach an output
    pub fn activate_all(&mut self) {
        let active = self.mark_tfi(&self.outputs);
        self.set_active(active, None);
    }

    /// Activate the cone of a pivot gate: its transitive fanout and everything that
    /// feeds the outputs it reaches
    ///
    /// Returns false if the pivot reaches no output, in which case nothing is active.
    pub fn activate_cone(&mut self, pivot: usize) -> bool {
        let tfo = self.mark_tfo(pivot);
        let reached: Vec<usize> = self
            .outputs
            .iter()
            .copied()
            .filter(|&o| tfo[o])
            .collect();
        if reached.is_empty() {
            self.deactivate();
            return false;
        }
        let active = self.mark_tfi(&reached);
        self.set_active(active, Some(tfo));
        true
    }

    /// Deactivate all gates
    pub fn deactivate(&mut self) {
        for g in &mut self.gates {
            g.active = false;
            g.scope = false;
            g.act_fanouts.clear();
        }
    }

    /// Whether a gate is in the transitive fanout of the current pivot
    pub fn in_scope(&self, g: usize) -> bool {
        self.gates[g].scope
    }

    /// Gate whose value excites the fault
    pub fn fault_driver(&self, fault: &Fault) -> usize {
        match *fault {
            Fault::OutputStuckAtFault { gate, .. } => gate,
            Fault::InputStuckAtFault { gate, input, .. } => self.gates[gate].fanins[input],
        }
    }

    /// Check that a fault refers to an existing location
    pub fn is_valid_fault(&self, fault: &Fault) -> bool {
        match *fault {
            Fault::OutputStuckAtFault { gate, .. } => gate < self.nb_base_gates,
            Fault::InputStuckAtFault { gate, input, .. } => {
                gate < self.nb_base_gates && input < self.gates[gate].fanins.len()
            }
        }
    }

    /// Insert a fault site for the fault
    ///
    /// For an output fault the site takes over all fanouts and the output status of the
    /// gate. For an input fault it is inserted on the single connection.
    pub(crate) fn splice_fault(&mut self, fault: &Fault) -> Splice {
        debug_assert_eq!(self.gates.len(), self.nb_base_gates);
        let site = self.gates.len();
        let driver = self.fault_driver(fault);
        let value = fault.value();
        let mut gate = Gate::new_site(GateKind::FaultSite(value), driver, site);
        let d = &self.gates[driver];
        gate.level = d.level + 1;
        gate.testability = d.testability;
        gate.active = d.active;
        gate.scope = d.scope;
        let mut moved_outputs = Vec::new();
        match *fault {
            Fault::OutputStuckAtFault { .. } => {
                gate.fanouts = std::mem::take(&mut self.gates[driver].fanouts);
                gate.act_fanouts = std::mem::take(&mut self.gates[driver].act_fanouts);
                gate.min_level = self.gates[driver].min_level;
                gate.fos = self.gates[driver].fos;
                for fo in &gate.fanouts {
                    self.gates[fo.gate].fanins[fo.pin] = site;
                }
                if self.gates[driver].is_output {
                    self.gates[driver].is_output = false;
                    gate.is_output = true;
                    for (i, o) in self.outputs.iter_mut().enumerate() {
                        if *o == driver {
                            *o = site;
                            moved_outputs.push(i);
                        }
                    }
                }
                let edge = Fanout { gate: site, pin: 0 };
                self.gates[driver].fanouts = vec![edge];
                if gate.active {
                    self.gates[driver].act_fanouts = vec![edge];
                }
            }
            Fault::InputStuckAtFault {
                gate: sink, input, ..
            } => {
                let edge = Fanout {
                    gate: sink,
                    pin: input,
                };
                let new_edge = Fanout { gate: site, pin: 0 };
                gate.fanouts = vec![edge];
                gate.active = self.gates[sink].active;
                gate.scope = self.gates[sink].scope;
                if gate.active {
                    gate.act_fanouts = vec![edge];
                }
                gate.min_level = self.gates[sink].min_level;
                gate.fos = self.gates[sink].fos;
                self.gates[sink].fanins[input] = site;
                let d = &mut self.gates[driver];
                for fo in d.fanouts.iter_mut().chain(d.act_fanouts.iter_mut()) {
                    if *fo == edge {
                        *fo = new_edge;
                    }
                }
            }
        }
        self.gates.push(gate);
        Splice {
            site,
            driver,
            moved_outputs,
        }
    }

    /// Remove a fault site and restore the original connections
    pub(crate) fn unsplice_fault(&mut self, splice: Splice) {
        debug_assert_eq!(splice.site + 1, self.gates.len());
        let Some(site) = self.gates.pop() else {
            return;
        };
        let driver = splice.driver;
        let site_edge = Fanout {
            gate: splice.site,
            pin: 0,
        };
        for fo in &site.fanouts {
            self.gates[fo.gate].fanins[fo.pin] = driver;
        }
        let d = &mut self.gates[driver];
        if d.fanouts == [site_edge] {
            d.fanouts = site.fanouts;
            d.act_fanouts = site.act_fanouts;
        } else {
            let edge = site.fanouts[0];
            for fo in d.fanouts.iter_mut().chain(d.act_fanouts.iter_mut()) {
                if *fo == site_edge {
                    *fo = edge;
                }
            }
        }
        if !splice.moved_outputs.is_empty() {
            self.gates[driver].is_output = true;
            for i in splice.moved_outputs {
                self.outputs[i] = driver;
            }
        }
    }
}

impl Gate {
    fn new_site(kind: GateKind, driver: usize, id: usize) -> Gate {
        Gate {
            name: format!("fault{}", id),
            kind,
            fanins: vec![driver],
            fanouts: Vec::new(),
            act_fanouts: Vec::new(),
            level: 0,
            min_level: usize::MAX,
            fos: id,
            eq_next: id,
            is_output: false,
            basis: false,
            active: false,
            scope: false,
            fcone: false,
            testability: Default::default(),
            fanin_order: vec![0],
            state: GateState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::network::{CircuitBuilder, GateKind};
    use crate::sim::Fault;

    fn circuit() -> (crate::network::Circuit, [usize; 6]) {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let d = b.add_input();
        let x = b.and(a, c);
        let y = b.or(x, d);
        let z = b.not(c);
        b.add_output(y);
        b.add_output(x);
        (b.build().unwrap(), [a, c, d, x, y, z])
    }

    #[test]
    fn test_activation() {
        let (mut circuit, [a, c, d, x, y, z]) = circuit();
        assert!(circuit.gate(a).is_active());
        // z is dangling
        assert!(!circuit.gate(z).is_active());
        assert_eq!(circuit.gate(c).active_fanouts().len(), 1);
        assert_eq!(circuit.gate(c).fanouts().len(), 2);

        assert!(circuit.activate_cone(d));
        assert!(circuit.gate(y).is_active());
        assert!(circuit.gate(x).is_active());
        assert!(circuit.in_scope(y));
        assert!(!circuit.in_scope(x));
        assert!(circuit.gate(d).active_fanouts().len() == 1);

        assert!(!circuit.activate_cone(z));
        assert!(!circuit.gate(y).is_active());
        circuit.activate_all();
        assert!(circuit.gate(y).is_active());
    }

    #[test]
    fn test_splice_output() {
        let (mut circuit, [a, _, _, x, y, _]) = circuit();
        let before = circuit.clone();
        let fault = Fault::OutputStuckAtFault {
            gate: x,
            value: false,
        };
        let splice = circuit.splice_fault(&fault);
        let site = splice.site;
        assert_eq!(circuit.kind(site), GateKind::FaultSite(false));
        assert_eq!(circuit.gate(y).fanins()[0], site);
        assert!(circuit.gate(site).is_output());
        assert!(!circuit.gate(x).is_output());
        assert_eq!(circuit.output(1), site);
        assert_eq!(circuit.gate(x).fanouts().len(), 1);
        assert_eq!(circuit.gate(site).fanin(0), x);
        circuit.unsplice_fault(splice);
        assert_eq!(circuit.nb_gates(), before.nb_gates());
        assert_eq!(circuit.outputs(), before.outputs());
        assert!(circuit.gate(x).is_output());
        assert_eq!(circuit.gate(y).fanins(), before.gate(y).fanins());
        assert_eq!(circuit.gate(x).fanouts(), before.gate(x).fanouts());
        assert_eq!(circuit.gate(a).fanouts(), before.gate(a).fanouts());
        circuit.check();
    }

    #[test]
    fn test_splice_input() {
        let (mut circuit, [_, c, _, x, _, z]) = circuit();
        let before = circuit.clone();
        let fault = Fault::InputStuckAtFault {
            gate: x,
            input: 1,
            value: true,
        };
        let splice = circuit.splice_fault(&fault);
        let site = splice.site;
        assert_eq!(circuit.gate(x).fanins()[1], site);
        assert_eq!(circuit.gate(site).fanin(0), c);
        assert!(circuit.gate(site).level() < circuit.gate(x).level());
        assert!(circuit.gate(c).fanouts().iter().any(|fo| fo.gate == site));
        assert!(circuit.gate(c).fanouts().iter().any(|fo| fo.gate == z));
        assert!(!circuit.gate(c).fanouts().iter().any(|fo| fo.gate == x));
        circuit.unsplice_fault(splice);
        assert_eq!(circuit.gate(x).fanins(), before.gate(x).fanins());
        assert_eq!(circuit.gate(c).fanouts(), before.gate(c).fanouts());
        assert_eq!(
            circuit.gate(c).active_fanouts(),
            before.gate(c).active_fanouts()
        );
        circuit.check();
    }
}
