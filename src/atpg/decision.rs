//! Decision procedures: justification of assigned values and propagation of the fault effect

use crate::config::BacktraceMode;
use crate::network::{GateKind, Val3};

use super::search::{Rail, SearchContext};

impl SearchContext {
    /// Rail to use for a gate: both rails outside of the fault cone
    fn rail_for(&self, g: usize, rail: Rail) -> Rail {
        if !self.circuit.gates[g].fcone {
            Rail::Both
        } else if rail == Rail::Both {
            Rail::Good
        } else {
            rail
        }
    }

    /// Whether the value of a gate on a rail is explained by its inputs, recursively down to
    /// the primary inputs or the terminals
    ///
    /// Positive results are recorded in the gate state and undone on backtrack; negative
    /// results are only kept for the current decision pass.
    pub(crate) fn chk_just(&mut self, g: usize, rail: Rail) -> bool {
        let rail = self.rail_for(g, rail);
        let v = self.value(g, rail);
        if v.is_unknown() {
            return false;
        }
        let state = self.circuit.gates[g].state;
        let faulty = rail == Rail::Faulty;
        if (faulty && state.fj) || (!faulty && state.gj) {
            return true;
        }
        let memo = usize::from(faulty);
        if self.unjustified[memo].is_marked(g) {
            return false;
        }
        let ret = self.compute_just(g, rail, v);
        if ret {
            self.save_stack.push((g, state));
            let st = &mut self.circuit.gates[g].state;
            match rail {
                Rail::Faulty => st.fj = true,
                Rail::Good => st.gj = true,
                Rail::Both => {
                    st.gj = true;
                    st.fj = true;
                }
            }
        } else {
            self.unjustified[memo].mark(g);
        }
        ret
    }

    fn compute_just(&mut self, g: usize, rail: Rail, v: Val3) -> bool {
        let kind = self.circuit.gates[g].kind;
        match kind {
            GateKind::Input | GateKind::Const0 | GateKind::Const1 => return true,
            GateKind::FaultSite(_) if rail == Rail::Faulty => return true,
            _ => (),
        }
        if !self.circuit.gates[g].fcone && self.is_terminal(g, v) {
            return true;
        }
        let n = self.circuit.gates[g].fanins.len();
        if kind.is_simple() && v == kind.controlled_output() {
            let c = kind.controlling_value();
            for k in 0..n {
                let pin = self.circuit.gates[g].fanin_order[k];
                let x = self.circuit.gates[g].fanins[pin];
                if self.value(x, rail) == c && self.chk_just(x, rail) {
                    return true;
                }
            }
            false
        } else {
            for pin in 0..n {
                let x = self.circuit.gates[g].fanins[pin];
                if self.value(x, rail).is_unknown() || !self.chk_just(x, rail) {
                    return false;
                }
            }
            true
        }
    }

    /// Whether a backtrace stops at an unassigned line instead of walking through it
    fn ends_backtrace(&self, x: usize, rail: Rail, v: Val3) -> bool {
        if self.backtrace_mode == BacktraceMode::D || rail == Rail::Faulty {
            return true;
        }
        let gate = &self.circuit.gates[x];
        match gate.kind {
            GateKind::Input | GateKind::Const0 | GateKind::Const1 => true,
            _ => !gate.fcone && self.is_terminal(x, v),
        }
    }

    /// Walk down from an unjustified gate to an unassigned line that helps justify it
    ///
    /// In PODEM mode, the walk continues through unassigned gates with the value they
    /// need, and the decision is taken on the deepest line reached.
    fn backtrace(&mut self, g: usize, rail: Rail) -> Option<(usize, Rail, Val3)> {
        let mut g = g;
        let mut rail = self.rail_for(g, rail);
        // Value required on an unassigned gate the walk went through
        let mut required: Option<Val3> = None;
        let mut deepest = None;
        loop {
            let kind = self.circuit.gates[g].kind;
            let v = required.take().unwrap_or_else(|| self.value(g, rail));
            match kind {
                GateKind::Input | GateKind::Const0 | GateKind::Const1 => return deepest,
                GateKind::FaultSite(_) if rail == Rail::Faulty => return deepest,
                _ => (),
            }
            let n = self.circuit.gates[g].fanins.len();
            let mut next = None;
            let mut unassigned = None;
            if kind.is_simple() {
                let c = kind.controlling_value();
                let target = if v == kind.controlled_output() { c } else { !c };
                // Inputs already at the target value are followed first, then the
                // cheapest unassigned input is set
                for k in 0..n {
                    let pin = self.circuit.gates[g].fanin_order[k];
                    let x = self.circuit.gates[g].fanins[pin];
                    if self.value(x, rail) == target && !self.chk_just(x, rail) {
                        next = Some(x);
                        break;
                    }
                }
                if next.is_none() {
                    unassigned = (0..n)
                        .map(|k| self.circuit.gates[g].fanins[self.circuit.gates[g].fanin_order[k]])
                        .find(|&x| self.value(x, rail).is_unknown())
                        .map(|x| (x, target));
                }
            } else if kind.is_xor_like() {
                for pin in 0..n {
                    let x = self.circuit.gates[g].fanins[pin];
                    if self.value(x, rail).is_unknown() {
                        let t = self.circuit.gates[x].testability;
                        let b = if t.c0 <= t.c1 { Val3::Zero } else { Val3::One };
                        unassigned = Some((x, b));
                        break;
                    }
                }
                if unassigned.is_none() {
                    for pin in 0..n {
                        let x = self.circuit.gates[g].fanins[pin];
                        if !self.chk_just(x, rail) {
                            next = Some(x);
                            break;
                        }
                    }
                }
            } else {
                let x = self.circuit.gates[g].fanins[0];
                if self.value(x, rail).is_unknown() {
                    unassigned = Some((x, v.invert_if(kind == GateKind::Not)));
                } else if !self.chk_just(x, rail) {
                    next = Some(x);
                }
            }
            if let Some((x, t)) = unassigned {
                if self.ends_backtrace(x, rail, t) {
                    return Some((x, rail, t));
                }
                deepest = Some((x, rail, t));
                required = Some(t);
                next = Some(x);
            }
            let Some(x) = next else {
                return deepest;
            };
            rail = self.rail_for(x, rail);
            g = x;
        }
    }

    /// Make a decision on a line, remembering the opposite choice
    fn decide(&mut self, x: usize, rail: Rail, v: Val3) {
        if !self.circuit.gates[x].fcone {
            self.opt_assign(x, v, Val3::X);
        } else if !self.pgraph.is_dif(x) {
            self.opt_assign(x, v, v);
        } else if rail == Rail::Faulty {
            self.opt_assign(x, Val3::X, v);
        } else {
            self.opt_assign(x, v, Val3::X);
        }
    }

    /// Justification decision: find an assigned but unjustified value and take a decision
    /// toward justifying it
    pub(crate) fn c_decision(&mut self) -> bool {
        self.unjustified[0].clear();
        self.unjustified[1].clear();
        let n = self.save_stack.len();
        for k in 0..n {
            let g = self.save_stack[k].0;
            let rails: &[Rail] = if self.circuit.gates[g].fcone {
                &[Rail::Good, Rail::Faulty]
            } else {
                &[Rail::Both]
            };
            for &rail in rails {
                if self.value(g, rail).is_known() && !self.chk_just(g, rail) {
                    if let Some((x, r, v)) = self.backtrace(g, rail) {
                        self.decide(x, r, v);
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Propagation decision: extend the fault effect one gate further along the
    /// propagation graph, most observable path first
    pub(crate) fn o_decision(&mut self) -> bool {
        if self.fault_at_output() {
            return false;
        }
        self.marks.clear();
        let mut stack = vec![self.site];
        while let Some(g) = stack.pop() {
            if !self.marks.mark(g) || !self.pgraph.on_path(g) {
                continue;
            }
            let s = self.circuit.gates[g].state;
            match (s.gval.to_bool(), s.fval.to_bool()) {
                (Some(_), Some(_)) => {
                    // Fault effect already here: continue with the fanouts, most observable
                    // last so that it is visited first
                    let fanouts = &self.circuit.gates[g].act_fanouts;
                    stack.extend(fanouts.iter().rev().map(|fo| fo.gate));
                }
                (None, None) => {
                    self.opt_assign(g, Val3::Zero, Val3::X);
                    return true;
                }
                (None, Some(f)) => {
                    self.opt_assign(g, Val3::from_bool(!f), Val3::X);
                    return true;
                }
                (Some(b), None) => {
                    self.opt_assign(g, Val3::X, Val3::from_bool(!b));
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::search::{Rail, SearchContext};
    use crate::config::BacktraceMode;
    use crate::network::generators::testcases;
    use crate::network::{Circuit, CircuitBuilder, GateKind, Val3};

    /// `o = Or(And(a, b), And(c, d, f))`, where the two-input And is the cheapest to set
    ///
    /// Gates: a=0, b=1, c=2, d=3, f=4, x=5, e=6, o=7.
    fn and_or() -> Circuit {
        let mut b = CircuitBuilder::new();
        let i: Vec<usize> = (0..5).map(|_| b.add_input()).collect();
        let x = b.add_gate(GateKind::And, &[i[0], i[1]]);
        let e = b.add_gate(GateKind::And, &[i[2], i[3], i[4]]);
        let o = b.add_gate(GateKind::Or, &[x, e]);
        b.add_output(o);
        b.build().unwrap()
    }

    #[test]
    fn test_justification() {
        let mut ctx = SearchContext::new(testcases::c17().unwrap(), 16, 0);
        ctx.resize_scratch();
        // Gate 22 at 0 needs both inputs at 1, each needing one input at 0
        ctx.enqueue(9, Val3::Zero, Val3::X);
        assert!(ctx.implication());
        assert_eq!(ctx.circuit.gval(5), Val3::One);
        assert_eq!(ctx.circuit.gval(7), Val3::One);
        assert!(!ctx.chk_just(9, Rail::Both));
        let mut steps = 0;
        while ctx.c_decision() {
            assert!(ctx.implication());
            steps += 1;
            assert!(steps < 10);
        }
        assert!(ctx.chk_just(9, Rail::Both));
        assert!(ctx.circuit.gate(9).state().gj);
        let inputs: Vec<bool> = ctx
            .circuit
            .inputs()
            .iter()
            .map(|&i| ctx.circuit.gval(i) == Val3::One)
            .collect();
        // Any completion of the assigned inputs sets gate 22 to 0
        let out = crate::sim::simulate(&ctx.circuit, &inputs);
        assert!(!out[0]);
        ctx.restore_all();
        assert!(!ctx.circuit.gate(9).state().gj);
    }

    #[test]
    fn test_backtrace_modes() {
        for (mode, decided) in [(BacktraceMode::D, 5), (BacktraceMode::Podem, 0)] {
            let mut ctx = SearchContext::new(and_or(), 16, 0);
            ctx.backtrace_mode = mode;
            ctx.resize_scratch();
            ctx.enqueue(7, Val3::One, Val3::X);
            assert!(ctx.implication());
            assert_eq!(ctx.circuit.gval(5), Val3::X);
            assert!(ctx.c_decision());
            // D stops at the And gate, PODEM walks down to its first input
            let last = ctx.eventq.back().unwrap();
            assert_eq!((last.gate, last.gval), (decided, Val3::One));

            let mut steps = 0;
            while {
                assert!(ctx.implication());
                ctx.c_decision()
            } {
                steps += 1;
                assert!(steps < 10);
            }
            assert!(ctx.chk_just(7, Rail::Both));
            assert_eq!(ctx.circuit.gval(5), Val3::One);
            assert_eq!(ctx.circuit.gval(0), Val3::One);
            assert_eq!(ctx.circuit.gval(1), Val3::One);
            assert_eq!(ctx.circuit.gval(6), Val3::X);
            ctx.restore_all();
        }
    }
}
