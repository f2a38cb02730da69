//! Controllability and observability measures, used to order decisions

use itertools::Itertools;

use super::circuit::Circuit;
use super::gates::GateKind;

/// Cost of an impossible assignment
pub const INFINITE_COST: u32 = u32::MAX / 4;

fn add(a: u32, b: u32) -> u32 {
    a.saturating_add(b).min(INFINITE_COST)
}

impl Circuit {
    fn controllability(&self, g: usize) -> (u32, u32) {
        use GateKind::*;
        let gate = &self.gates[g];
        let t = |i: usize| self.gates[gate.fanins[i]].testability;
        let (c0, c1) = match gate.kind {
            Input => (1, 1),
            Const0 => (0, INFINITE_COST),
            Const1 => (INFINITE_COST, 0),
            Buf | FaultSite(_) => (add(t(0).c0, 1), add(t(0).c1, 1)),
            Not => (add(t(0).c1, 1), add(t(0).c0, 1)),
            And | Nand | Or | Nor => {
                let ctrl = gate.kind.controlling_value();
                let mut min_c = INFINITE_COST;
                let mut sum_nc = 0;
                for i in 0..gate.fanins.len() {
                    min_c = min_c.min(t(i).cost(ctrl));
                    sum_nc = add(sum_nc, t(i).cost(!ctrl));
                }
                let controlled = add(min_c, 1);
                let uncontrolled = add(sum_nc, 1);
                if gate.kind.controlled_output().to_bool() == Some(false) {
                    (controlled, uncontrolled)
                } else {
                    (uncontrolled, controlled)
                }
            }
            Xor | Xnor => {
                let mut z0 = t(0).c0;
                let mut z1 = t(0).c1;
                for i in 1..gate.fanins.len() {
                    let x = t(i);
                    let n0 = add(z0, x.c0).min(add(z1, x.c1));
                    let n1 = add(z0, x.c1).min(add(z1, x.c0));
                    z0 = n0;
                    z1 = n1;
                }
                if gate.kind == Xnor {
                    (add(z1, 1), add(z0, 1))
                } else {
                    (add(z0, 1), add(z1, 1))
                }
            }
        };
        (c0, c1)
    }

    /// Cost of observing the given input pin of a gate
    pub(crate) fn pin_observability(&self, g: usize, pin: usize) -> u32 {
        let gate = &self.gates[g];
        let mut cost = add(gate.testability.obs, 1);
        for (i, &f) in gate.fanins.iter().enumerate() {
            if i == pin {
                continue;
            }
            let t = &self.gates[f].testability;
            let side = if gate.kind.is_simple() {
                t.cost(gate.kind.non_controlling_value())
            } else if gate.kind.is_xor_like() {
                t.c0.min(t.c1)
            } else {
                0
            };
            cost = add(cost, side);
        }
        cost
    }

    /// Compute controllability and observability, then order inputs and outputs by cost
    pub(crate) fn compute_testability(&mut self) {
        for i in 0..self.topo_order.len() {
            let g = self.topo_order[i];
            let (c0, c1) = self.controllability(g);
            self.gates[g].testability.c0 = c0;
            self.gates[g].testability.c1 = c1;
        }
        for i in (0..self.topo_order.len()).rev() {
            let g = self.topo_order[i];
            let mut obs = if self.gates[g].is_output {
                0
            } else {
                INFINITE_COST
            };
            let mut fanouts = self.gates[g].fanouts.clone();
            let mut keyed = Vec::with_capacity(fanouts.len());
            for fo in fanouts.drain(..) {
                let o = self.pin_observability(fo.gate, fo.pin);
                obs = obs.min(o);
                keyed.push((o, fo));
            }
            keyed.sort_by_key(|(o, _)| *o);
            self.gates[g].fanouts = keyed.into_iter().map(|(_, fo)| fo).collect();
            self.gates[g].testability.obs = obs;
        }
        for g in 0..self.gates.len() {
            let gate = &self.gates[g];
            let ctrl = gate.kind.controlling_value();
            let order: Vec<usize> = (0..gate.fanins.len())
                .sorted_by_key(|&i| self.gates[gate.fanins[i]].testability.cost(ctrl))
                .collect();
            self.gates[g].fanin_order = order;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::CircuitBuilder;

    #[test]
    fn test_and_or() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let d = b.add_input();
        let x = b.and(a, c);
        let y = b.nor(x, d);
        b.add_output(y);
        let circuit = b.build().unwrap();
        let tx = circuit.gate(x).testability();
        assert_eq!((tx.c0, tx.c1), (2, 3));
        let ty = circuit.gate(y).testability();
        // Nor: 1 when all inputs 0, 0 when one input is 1
        assert_eq!(ty.c1, 2 + 1 + 1);
        assert_eq!(ty.c0, 1 + 1);
        assert_eq!(ty.obs, 0);
        // Observing x needs d at 0
        assert_eq!(tx.obs, 2);
        assert_eq!(circuit.gate(a).testability().obs, 2 + 1 + 1);
    }

    #[test]
    fn test_xor_and_constants() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let k = b.add_gate(GateKind::Const0, &[]);
        let x = b.xor(a, c);
        let y = b.and(x, k);
        b.add_output(y);
        b.add_output(x);
        let circuit = b.build().unwrap();
        let tx = circuit.gate(x).testability();
        assert_eq!((tx.c0, tx.c1), (3, 3));
        assert_eq!(circuit.gate(k).testability().c1, INFINITE_COST);
        assert_eq!(circuit.gate(y).testability().c1, INFINITE_COST);
        // The constant input is the cheapest to set to 0
        assert_eq!(circuit.gate(y).fanin_order[0], 1);
    }

    #[test]
    fn test_fanin_order() {
        let mut b = CircuitBuilder::new();
        let i: Vec<usize> = (0..6).map(|_| b.add_input()).collect();
        let x = b.and(i[0], i[1]);
        let y = b.or(i[2], i[3]);
        let g = b.add_gate(GateKind::And, &[x, i[4], y, i[5]]);
        let z = b.add_gate(GateKind::Or, &[x, i[4]]);
        b.add_output(g);
        b.add_output(z);
        let circuit = b.build().unwrap();
        // Cheapest to set to 0 first: the inputs in pin order, then x (2), then y (3)
        assert_eq!(circuit.gate(g).fanin_order, vec![1, 3, 0, 2]);
        // Cheapest to set to 1 first
        assert_eq!(circuit.gate(z).fanin_order, vec![1, 0]);
    }
}
