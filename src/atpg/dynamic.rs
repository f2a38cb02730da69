//! Dynamic implication: values whose opposite leads to an immediate conflict under the
//! current assignment

use std::cmp::Reverse;

use crate::network::Val3;

use super::search::SearchContext;

impl SearchContext {
    /// Collect the gates tried by dynamic implication: multi-input gates in the transitive
    /// fanout of the fault location and in the fanin of that fanout, highest level first
    pub(crate) fn set_dyn_candidates(&mut self, driver: usize) {
        self.dyn_candidates.clear();
        self.dyn_pos = 0;
        self.marks.clear();
        let mut tfo = vec![driver];
        let mut tfi = Vec::new();
        while let Some(g) = tfo.pop() {
            if !self.marks.mark(g) {
                continue;
            }
            self.dyn_candidates.push(g);
            let gate = &self.circuit.gates[g];
            tfo.extend(gate.act_fanouts.iter().map(|fo| fo.gate));
            tfi.extend(gate.fanins.iter().copied());
        }
        while let Some(g) = tfi.pop() {
            if !self.marks.mark(g) {
                continue;
            }
            self.dyn_candidates.push(g);
            tfi.extend(self.circuit.gates[g].fanins.iter().copied());
        }
        let gates = &self.circuit.gates;
        self.dyn_candidates.retain(|&g| gates[g].fanins.len() >= 2);
        self.dyn_candidates
            .sort_by_key(|&g| (Reverse(gates[g].level), g));
    }

    /// Try an assignment and undo it; returns whether it is consistent
    fn dyn_imp(&mut self, g: usize, gval: Val3, fval: Val3) -> bool {
        let top = self.save_stack.len();
        self.enqueue(g, gval, fval);
        let ok = self.implication();
        self.restore_to(top);
        ok
    }

    /// Try both values of the unassigned rails of a gate; returns the forced assignment
    /// if one of them fails
    fn try_values(&mut self, g: usize) -> Option<(Val3, Val3)> {
        let gate = &self.circuit.gates[g];
        let s = gate.state;
        let (zero, one) = (Val3::Zero, Val3::One);
        let mut trials = [None; 4];
        if !gate.fcone {
            if s.gval.is_unknown() {
                trials[0] = Some((zero, Val3::X));
                trials[1] = Some((one, Val3::X));
            }
        } else if !self.pgraph.is_dif(g) {
            if s.gval.is_unknown() || s.fval.is_unknown() {
                trials[0] = Some((zero, zero));
                trials[1] = Some((one, one));
            }
        } else {
            if s.gval.is_unknown() {
                trials[0] = Some((zero, Val3::X));
                trials[1] = Some((one, Val3::X));
            }
            if s.fval.is_unknown() {
                trials[2] = Some((Val3::X, zero));
                trials[3] = Some((Val3::X, one));
            }
        }
        for (gval, fval) in trials.into_iter().flatten() {
            if !self.dyn_imp(g, gval, fval) {
                return Some((!gval, !fval));
            }
        }
        None
    }

    /// Look for a forced value among the candidates, starting where the last search stopped
    ///
    /// Returns whether an assignment was queued.
    pub(crate) fn examine_dyn_imp(&mut self) -> bool {
        let n = self.dyn_candidates.len();
        if n == 0 {
            return false;
        }
        let start = self.dyn_pos % n;
        let mut i = start;
        loop {
            let g = self.dyn_candidates[i];
            if let Some((gval, fval)) = self.try_values(g) {
                self.enqueue(g, gval, fval);
                self.dyn_pos = i;
                return true;
            }
            i = (i + 1) % n;
            if i == start {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::search::SearchContext;
    use crate::network::generators::testcases;
    use crate::network::Val3;
    use crate::sim::Fault;

    #[test]
    fn test_forced_value() {
        let mut ctx = SearchContext::new(testcases::consensus().unwrap(), 16, 0);
        let fault = Fault::OutputStuckAtFault {
            gate: 6,
            value: false,
        };
        let splice = ctx.circuit.splice_fault(&fault);
        ctx.site = splice.site;
        ctx.resize_scratch();
        assert!(ctx.pgraph.construct(&mut ctx.circuit, ctx.site));
        ctx.set_dyn_candidates(splice.driver);
        assert!(ctx.dyn_candidates.contains(&7));
        assert!(ctx.dyn_candidates.contains(&4));
        assert!(!ctx.dyn_candidates.contains(&3));

        ctx.enqueue(ctx.site, Val3::One, Val3::Zero);
        assert!(ctx.implication());
        assert!(ctx.update_pgraph());
        let before = ctx.save_stack.len();
        // The faulty output at 0 forces a = 0 and a = 1: the output must be 1
        assert!(ctx.examine_dyn_imp());
        assert_eq!(ctx.save_stack.len(), before);
        let a = ctx.eventq.pop_back().unwrap();
        assert_eq!(a.gate, 7);
        assert_eq!(a.fval, Val3::One);
    }
}
