//! Unique sensitization: mandatory assignments on the gates every propagation path goes through
//!
//! Level 1 handles the dominators of the D-frontier: their output must carry the fault
//! effect, and their side inputs that cannot carry it must be at the non-controlling value.
//! Level 2 also looks for side inputs of the primary path that would block every
//! remaining path at once if set to the controlling value.

use crate::network::{intersect, GateKind, Val3, SINK};

use super::search::SearchContext;

impl SearchContext {
    /// Gates of the propagation graph where the fault effect stops, reached from the site
    /// through gates that already carry it
    ///
    /// Empty if the fault effect is already visible at an output.
    fn d_frontier(&mut self) -> Vec<usize> {
        self.marks.clear();
        let mut ret = Vec::new();
        let mut stack = vec![self.site];
        while let Some(g) = stack.pop() {
            if !self.pgraph.on_path(g) || !self.marks.mark(g) {
                continue;
            }
            let gate = &self.circuit.gates[g];
            let s = gate.state;
            if s.gval.is_unknown() || s.fval.is_unknown() {
                ret.push(g);
            } else if gate.is_output {
                return Vec::new();
            } else {
                stack.extend(gate.act_fanouts.iter().rev().map(|fo| fo.gate));
            }
        }
        ret
    }

    /// Queue the assignment of a side input to a value that keeps it out of the fault effect
    fn enqueue_side(&mut self, x: usize, v: Val3) {
        if self.circuit.gates[x].fcone {
            self.enqueue(x, v, v);
        } else {
            self.enqueue(x, v, Val3::X);
        }
    }

    /// Queue the mandatory assignments of a dominator; returns whether any was queued
    fn sensitize_dominator(&mut self, y: usize) -> bool {
        let s = self.circuit.gates[y].state;
        match (s.gval.is_known(), s.fval.is_known()) {
            (false, true) => {
                self.enqueue(y, !s.fval, Val3::X);
                true
            }
            (true, false) => {
                self.enqueue(y, Val3::X, !s.gval);
                true
            }
            (false, false) => {
                let kind = self.circuit.gates[y].kind;
                if !kind.is_simple() {
                    return false;
                }
                let nc = kind.non_controlling_value();
                let mut assigned = false;
                for pin in 0..self.circuit.gates[y].fanins.len() {
                    let x = self.circuit.gates[y].fanins[pin];
                    if self.circuit.gval(x).is_unknown() && !self.pgraph.is_dif(x) {
                        self.enqueue_side(x, nc);
                        assigned = true;
                    }
                }
                assigned
            }
            (true, true) => false,
        }
    }

    /// Mark the gates of the propagation graph forced off the paths when a gate takes a
    /// value; returns the number of such gates
    fn set_block(&mut self, g: usize, v: Val3) -> usize {
        let mut count = 0;
        for k in 0..self.circuit.gates[g].act_fanouts.len() {
            let y = self.circuit.gates[g].act_fanouts[k].gate;
            let kind = self.circuit.gates[y].kind;
            if self.pgraph.on_path(y) {
                if kind.controlling_value() != v || !self.blocked.mark(y) {
                    continue;
                }
                count += 1 + self.set_block(y, kind.controlled_output());
            } else {
                if !self.blocked.mark(y) {
                    continue;
                }
                if kind.is_buf_like() {
                    count += self.set_block(y, v.invert_if(kind == GateKind::Not));
                } else if kind.controlling_value() == v {
                    count += self.set_block(y, kind.controlled_output());
                }
            }
        }
        count
    }

    /// Whether an output can still be reached from a gate while avoiding the blocked gates
    fn another_path(&mut self, from: usize) -> bool {
        let mut stack = vec![from];
        while let Some(g) = stack.pop() {
            if self.blocked.is_marked(g) || !self.pgraph.on_path(g) || !self.marks.mark(g) {
                continue;
            }
            let gate = &self.circuit.gates[g];
            if gate.is_output {
                return true;
            }
            stack.extend(gate.act_fanouts.iter().map(|fo| fo.gate));
        }
        false
    }

    /// Force a side input to the non-controlling value if the controlling value would cut
    /// every path from the frontier
    fn check_path_controller(&mut self, x: usize, c: Val3, frontier: &[usize]) -> bool {
        let mut root = x;
        let mut cval = c;
        loop {
            let gate = &self.circuit.gates[root];
            if !gate.kind.is_buf_like() {
                break;
            }
            if gate.kind == GateKind::Not {
                cval = !cval;
            }
            root = gate.fanins[0];
        }
        if self.circuit.gval(root).is_known() {
            return false;
        }
        self.blocked.clear();
        if self.set_block(root, cval) < 2 {
            return false;
        }
        self.marks.clear();
        for &f in frontier {
            if self.another_path(f) {
                return false;
            }
        }
        self.enqueue_side(root, !cval);
        true
    }

    /// Apply the path controller check along the most direct path from the frontier
    fn sensitize_primary_path(&mut self, frontier: &[usize], dominators: &[usize]) -> bool {
        let mut assigned = false;
        let mut g = frontier[0];
        loop {
            let kind = self.circuit.gates[g].kind;
            let n = self.circuit.gates[g].fanins.len();
            if kind.is_simple() && n >= 2 && !dominators.contains(&g) {
                let c = kind.controlling_value();
                for pin in 0..n {
                    let x = self.circuit.gates[g].fanins[pin];
                    if self.pgraph.is_dif(x) || self.circuit.gval(x).is_known() {
                        continue;
                    }
                    assigned |= self.check_path_controller(x, c, frontier);
                }
            }
            let gate = &self.circuit.gates[g];
            if gate.is_output {
                break;
            }
            let next = gate
                .act_fanouts
                .iter()
                .map(|fo| fo.gate)
                .filter(|&y| self.pgraph.on_path(y))
                .min_by_key(|&y| self.circuit.gates[y].min_level);
            match next {
                Some(y) => g = y,
                None => break,
            }
        }
        assigned
    }

    /// Queue the assignments required by every remaining propagation path; returns whether
    /// any was queued
    pub(crate) fn sensitize(&mut self) -> bool {
        let frontier = self.d_frontier();
        if frontier.is_empty() {
            return false;
        }
        self.pgraph.compute_dominators(&self.circuit);
        let ipdom = self.pgraph.dominators();
        let mut d = frontier[0];
        for &f in &frontier[1..] {
            d = intersect(ipdom, |x| self.circuit.gates[x].level, d, f);
        }
        let mut dominators = Vec::new();
        while d != SINK {
            dominators.push(d);
            d = ipdom[d];
        }
        let mut assigned = false;
        for &y in &dominators {
            assigned |= self.sensitize_dominator(y);
        }
        if self.sensitization_level >= 2 {
            assigned |= self.sensitize_primary_path(&frontier, &dominators);
        }
        assigned
    }
}
