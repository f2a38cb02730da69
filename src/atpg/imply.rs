//! Implication engine: propagation of assigned values through the local gate rules,
//! the learned implications and the equivalent gates

use crate::network::{GateKind, Val3};

use super::search::{Assignment, Rail, SearchContext};

/// Inconsistency found while propagating values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

pub(crate) type Imply = Result<(), Conflict>;

impl SearchContext {
    /// Process the event queue until it is empty or a conflict is found
    ///
    /// On conflict the queue is cleared and the partial assignments are left for the
    /// backtracking to undo.
    pub(crate) fn implication(&mut self) -> bool {
        while let Some(a) = self.eventq.pop_front() {
            if self.apply(a).is_err() {
                self.eventq.clear();
                return false;
            }
        }
        true
    }

    fn apply(&mut self, a: Assignment) -> Imply {
        if a.gval.is_known() {
            self.assign(a.gate, Rail::Good, a.gval)?;
        }
        if a.fval.is_known() {
            self.assign(a.gate, Rail::Faulty, a.fval)?;
        }
        Ok(())
    }

    /// Assign a value on a rail of a gate and propagate its consequences
    ///
    /// Outside of the fault cone both rails always carry the same value.
    pub(crate) fn assign(&mut self, g: usize, rail: Rail, v: Val3) -> Imply {
        debug_assert!(v.is_known());
        if !self.circuit.gates[g].fcone {
            return self.set_value(g, Rail::Both, v);
        }
        match rail {
            Rail::Both => {
                self.set_value(g, Rail::Good, v)?;
                self.set_value(g, Rail::Faulty, v)
            }
            r => self.set_value(g, r, v),
        }
    }

    fn set_value(&mut self, g: usize, rail: Rail, v: Val3) -> Imply {
        let cur = self.value(g, rail);
        if cur == v {
            return Ok(());
        }
        if cur.is_known() {
            return Err(Conflict);
        }
        let old = self.circuit.gates[g].state;
        self.save_stack.push((g, old));
        let st = &mut self.circuit.gates[g].state;
        match rail {
            Rail::Good => st.gval = v,
            Rail::Faulty => st.fval = v,
            Rail::Both => {
                st.gval = v;
                st.fval = v;
            }
        }
        if rail != Rail::Faulty {
            self.learned_imply(g, v)?;
            self.equivalent_imply(g, v)?;
        }
        self.forward_imply(g, rail)?;
        self.backward_imply(g, rail, v)
    }

    /// Apply the implications learned for the good value of a gate
    fn learned_imply(&mut self, g: usize, v: Val3) -> Imply {
        if !self.use_learning {
            return Ok(());
        }
        for k in 0..self.learned.get(g, v).len() {
            let (t, w) = self.learned.get(g, v)[k];
            if self.circuit.gates[t].active {
                self.assign(t, Rail::Good, w)?;
            }
        }
        Ok(())
    }

    /// Copy the good value of a gate to the structurally equivalent gates
    fn equivalent_imply(&mut self, g: usize, v: Val3) -> Imply {
        let mut e = self.circuit.gates[g].eq_next;
        while e != g {
            if self.circuit.gates[e].active {
                self.assign(e, Rail::Good, v)?;
            }
            e = self.circuit.gates[e].eq_next;
        }
        Ok(())
    }

    /// Propagate a new value to the gates reading it
    fn forward_imply(&mut self, g: usize, rail: Rail) -> Imply {
        for k in 0..self.circuit.gates[g].act_fanouts.len() {
            let y = self.circuit.gates[g].act_fanouts[k].gate;
            if !self.circuit.gates[y].fcone {
                self.imply_local(y, Rail::Both)?;
            } else if rail == Rail::Both {
                self.imply_local(y, Rail::Good)?;
                self.imply_local(y, Rail::Faulty)?;
            } else {
                self.imply_local(y, rail)?;
            }
        }
        Ok(())
    }

    /// Propagate a new output value to the inputs of the gate, unless the gate is a terminal
    fn backward_imply(&mut self, g: usize, rail: Rail, v: Val3) -> Imply {
        let gate = &self.circuit.gates[g];
        let terminal = match gate.kind {
            GateKind::Input | GateKind::Const0 | GateKind::Const1 => true,
            GateKind::FaultSite(_) => rail == Rail::Faulty,
            _ => {
                (self.learning_mode && gate.basis) || (!gate.fcone && self.is_terminal(g, v))
            }
        };
        if terminal {
            return Ok(());
        }
        self.imply_local(g, rail)
    }

    /// Whether a value needs no justification below the gate: structural constants, and
    /// conflict-free assignments when enabled
    pub(crate) fn is_terminal(&self, g: usize, v: Val3) -> bool {
        self.constant_value.get(g) == Some(&v) || (self.use_cfna && self.cfna.is_terminal(g, v))
    }

    /// Apply the local rules of a gate in both directions
    pub(crate) fn imply_local(&mut self, y: usize, rail: Rail) -> Imply {
        let kind = self.circuit.gates[y].kind;
        match kind {
            GateKind::Input | GateKind::Const0 | GateKind::Const1 => Ok(()),
            GateKind::Buf => self.imply_buf(y, rail, false),
            GateKind::Not => self.imply_buf(y, rail, true),
            GateKind::FaultSite(stuck) => match rail {
                Rail::Faulty => self.assign(y, Rail::Faulty, Val3::from_bool(stuck)),
                _ => self.imply_buf(y, Rail::Good, false),
            },
            GateKind::And | GateKind::Nand | GateKind::Or | GateKind::Nor => {
                self.imply_simple(y, rail, kind)
            }
            GateKind::Xor | GateKind::Xnor => self.imply_xor(y, rail, kind == GateKind::Xnor),
        }
    }

    fn imply_buf(&mut self, y: usize, rail: Rail, inv: bool) -> Imply {
        let x = self.circuit.gates[y].fanins[0];
        let vin = self.value(x, rail);
        let vout = self.value(y, rail);
        if vin.is_known() {
            self.assign(y, rail, vin.invert_if(inv))?;
        }
        if vout.is_known() {
            self.assign(x, rail, vout.invert_if(inv))?;
        }
        Ok(())
    }

    fn imply_simple(&mut self, y: usize, rail: Rail, kind: GateKind) -> Imply {
        let c = kind.controlling_value();
        let o = kind.controlled_output();
        let n = self.circuit.gates[y].fanins.len();
        let mut has_c = false;
        let mut nb_x = 0;
        let mut last_x = 0;
        for pin in 0..n {
            let x = self.circuit.gates[y].fanins[pin];
            let v = self.value(x, rail);
            if v == c {
                has_c = true;
            } else if v.is_unknown() {
                nb_x += 1;
                last_x = x;
            }
        }
        if has_c {
            return self.assign(y, rail, o);
        }
        if nb_x == 0 {
            return self.assign(y, rail, !o);
        }
        let out = self.value(y, rail);
        if out == o {
            if nb_x == 1 {
                return self.assign(last_x, rail, c);
            }
        } else if out == !o {
            for pin in 0..n {
                let x = self.circuit.gates[y].fanins[pin];
                if self.value(x, rail).is_unknown() {
                    self.assign(x, rail, !c)?;
                }
            }
        }
        Ok(())
    }

    fn imply_xor(&mut self, y: usize, rail: Rail, inv: bool) -> Imply {
        let n = self.circuit.gates[y].fanins.len();
        let mut parity = inv;
        let mut nb_x = 0;
        let mut last_x = 0;
        for pin in 0..n {
            let x = self.circuit.gates[y].fanins[pin];
            match self.value(x, rail) {
                Val3::One => parity = !parity,
                Val3::Zero => (),
                Val3::X => {
                    nb_x += 1;
                    last_x = x;
                }
            }
        }
        if nb_x == 0 {
            return self.assign(y, rail, Val3::from_bool(parity));
        }
        if nb_x == 1 {
            if let Some(out) = self.value(y, rail).to_bool() {
                return self.assign(last_x, rail, Val3::from_bool(out ^ parity));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::search::{Rail, SearchContext};
    use crate::network::generators::testcases;
    use crate::network::{CircuitBuilder, GateKind, Val3};

    fn context(circuit: crate::network::Circuit) -> SearchContext {
        let mut ctx = SearchContext::new(circuit, 16, 0);
        ctx.resize_scratch();
        ctx
    }

    #[test]
    fn test_and_forward_backward() {
        let mut ctx = context(testcases::and2().unwrap());
        ctx.enqueue(2, Val3::One, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(0), Val3::One);
        assert_eq!(ctx.circuit.gval(1), Val3::One);
        ctx.restore_all();

        ctx.enqueue(0, Val3::Zero, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(2), Val3::Zero);
        assert_eq!(ctx.circuit.gval(1), Val3::X);
        ctx.restore_all();

        ctx.enqueue(2, Val3::Zero, Val3::X);
        ctx.enqueue(0, Val3::One, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(1), Val3::Zero);
        ctx.restore_all();

        ctx.enqueue(2, Val3::Zero, Val3::X);
        ctx.enqueue(0, Val3::One, Val3::X);
        ctx.enqueue(1, Val3::One, Val3::X);
        assert!(!ctx.implication());
        assert!(ctx.eventq.is_empty());
    }

    #[test]
    fn test_xor_rules() {
        let mut b = CircuitBuilder::new();
        let ins: Vec<usize> = (0..3).map(|_| b.add_input()).collect();
        let x = b.add_gate(GateKind::Xnor, &ins);
        b.add_output(x);
        let mut ctx = context(b.build().unwrap());
        ctx.enqueue(x, Val3::One, Val3::X);
        ctx.enqueue(ins[0], Val3::One, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(ins[2]), Val3::X);
        ctx.enqueue(ins[1], Val3::Zero, Val3::X);
        assert!(ctx.implication());
        // xnor(1, 0, z) = 1 requires an even number of ones
        assert_eq!(ctx.circuit.gval(ins[2]), Val3::One);
    }

    #[test]
    fn test_rails_outside_cone() {
        let mut ctx = context(testcases::c17().unwrap());
        ctx.assign(0, Rail::Faulty, Val3::One).unwrap();
        let s = ctx.circuit.state(0);
        assert_eq!(s.gval, Val3::One);
        assert_eq!(s.fval, Val3::One);
        assert!(ctx.assign(0, Rail::Good, Val3::Zero).is_err());
    }

    #[test]
    fn test_equivalent_gates() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let x = b.and(a, c);
        let y = b.and(c, a);
        let o = b.or(x, y);
        b.add_output(o);
        let mut ctx = context(b.build().unwrap());
        ctx.enqueue(x, Val3::Zero, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(y), Val3::Zero);
        assert_eq!(ctx.circuit.gval(o), Val3::Zero);
    }
}
