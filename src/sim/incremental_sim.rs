use std::cmp::Reverse;
use std::collections::BinaryHeap;

use fxhash::FxHashMap;

use crate::network::{Circuit, PackedVal, NB_LANES};

use super::pattern::{pack_patterns, TestPattern};
use super::simple_sim::SimpleSimulator;
use super::Fault;

/// Fault simulation that only touches the values that were modified
///
/// Faults are grouped by fanout-free region. Inside a region, the detection condition
/// of a fault is computed from the good values alone; only the region root is flipped
/// and propagated to the outputs, once for the whole group.
pub struct IncrementalSimulator<'a> {
    circuit: &'a Circuit,
    /// Simulator holding the good values
    sim: SimpleSimulator<'a>,
    /// Values in the faulty circuit
    faulty: Vec<PackedVal>,
    /// Lanes flipped at each gate
    inject: Vec<PackedVal>,
    /// Queue of gates to update, lowest level first
    update_queue: BinaryHeap<Reverse<(usize, usize)>>,
    /// Whether each gate is in the queue
    is_queued: Vec<bool>,
    /// List of modified values
    modified_values: Vec<usize>,
    /// Whether each value is modified
    is_modified: Vec<bool>,
    /// Number of valid lanes
    nb_patterns: usize,
}

impl<'a> IncrementalSimulator<'a> {
    /// Build a simulator by capturing a circuit
    pub fn from_circuit(circuit: &'a Circuit) -> IncrementalSimulator<'a> {
        let n = circuit.nb_gates();
        IncrementalSimulator {
            circuit,
            sim: SimpleSimulator::from_circuit(circuit),
            faulty: vec![PackedVal::ZERO; n],
            inject: vec![PackedVal::ZERO; n],
            update_queue: BinaryHeap::new(),
            is_queued: vec![false; n],
            modified_values: Vec::new(),
            is_modified: vec![false; n],
            nb_patterns: 0,
        }
    }

    /// Run the good simulation for up to 64 patterns, one per lane
    pub fn run_initial(&mut self, patterns: &[&TestPattern]) {
        let inputs = pack_patterns(patterns, self.circuit.nb_inputs());
        self.sim.copy_inputs(&inputs);
        self.sim.run_comb(None);
        self.faulty.copy_from_slice(&self.sim.node_values);
        self.nb_patterns = patterns.len();
    }

    /// Run the good simulation for a single pattern, copied to all lanes
    pub fn run_initial_single(&mut self, pattern: &TestPattern) {
        let inputs: Vec<PackedVal> = (0..self.circuit.nb_inputs())
            .map(|i| PackedVal::splat(pattern.get(i)))
            .collect();
        self.sim.copy_inputs(&inputs);
        self.sim.run_comb(None);
        self.faulty.copy_from_slice(&self.sim.node_values);
        self.nb_patterns = NB_LANES;
    }

    /// Good value of a gate
    pub fn good_value(&self, g: usize) -> PackedVal {
        self.sim.node_values[g]
    }

    /// Lanes where the fault is excited and its effect reaches the root of its region
    pub(crate) fn local_detection(&self, fault: &Fault) -> PackedVal {
        let good = &self.sim.node_values;
        let (mut cur, mut ret) = match *fault {
            Fault::OutputStuckAtFault { gate, value } => (gate, good[gate] ^ PackedVal::splat(value)),
            Fault::InputStuckAtFault { gate, input, value } => {
                let g = self.circuit.gate(gate);
                let exc = good[g.fanin(input)] ^ PackedVal::splat(value);
                (gate, exc & self.observes(gate, input))
            }
        };
        let root = self.circuit.gate(cur).fanout_stem();
        while cur != root && !ret.is_zero() {
            let fo = self.circuit.gate(cur).fanouts()[0];
            ret = ret & self.observes(fo.gate, fo.pin);
            cur = fo.gate;
        }
        ret
    }

    /// Lanes where a change on the given input pin reaches the output of the gate
    fn observes(&self, gate: usize, pin: usize) -> PackedVal {
        let g = self.circuit.gate(gate);
        let good = &self.sim.node_values;
        g.kind().observes_packed(
            g.fanins()
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pin)
                .map(|(_, &f)| good[f]),
        )
    }

    /// Reset the faulty values to the good values
    fn reset(&mut self) {
        for &v in &self.modified_values {
            self.faulty[v] = self.sim.node_values[v];
            self.is_modified[v] = false;
            self.inject[v] = PackedVal::ZERO;
        }
        self.update_queue.clear();
        self.modified_values.clear();
    }

    fn push(&mut self, i: usize) {
        if !self.is_queued[i] {
            self.is_queued[i] = true;
            self.update_queue
                .push(Reverse((self.circuit.gate(i).level(), i)));
        }
    }

    /// Update a single gate
    fn update_gate(&mut self, i: usize, value: PackedVal) {
        if self.faulty[i] == value {
            return;
        }
        self.faulty[i] = value;
        if !self.is_modified[i] {
            self.is_modified[i] = true;
            self.modified_values.push(i);
        }
        for j in 0..self.circuit.gate(i).fanouts().len() {
            let fo = self.circuit.gate(i).fanouts()[j];
            self.push(fo.gate);
        }
    }

    fn eval_faulty(&self, i: usize) -> PackedVal {
        let g = self.circuit.gate(i);
        if g.fanins().is_empty() && !g.kind().is_constant() {
            return self.sim.node_values[i];
        }
        g.kind()
            .eval_packed(g.fanins().iter().map(|&f| self.faulty[f]))
    }

    /// Flip the given lanes of some gates and propagate; return the lanes where an output changes
    pub(crate) fn flip_and_propagate(&mut self, flips: &[(usize, PackedVal)]) -> PackedVal {
        for &(g, mask) in flips {
            self.inject[g] = self.inject[g] | mask;
            if !self.is_modified[g] {
                self.is_modified[g] = true;
                self.modified_values.push(g);
            }
            self.push(g);
        }
        while let Some(Reverse((_, i))) = self.update_queue.pop() {
            self.is_queued[i] = false;
            let v = self.eval_faulty(i) ^ self.inject[i];
            self.update_gate(i, v);
        }
        let mut ret = PackedVal::ZERO;
        for &i in &self.modified_values {
            if self.circuit.gate(i).is_output() {
                ret = ret | (self.faulty[i] ^ self.sim.node_values[i]);
            }
        }
        self.reset();
        ret.truncate(self.nb_patterns)
    }

    /// Lanes where each fault is detected, with one pattern per lane
    pub fn detect_faults(&mut self, faults: &[Fault]) -> Vec<PackedVal> {
        let lobs: Vec<PackedVal> = faults
            .iter()
            .map(|f| self.local_detection(f).truncate(self.nb_patterns))
            .collect();
        let mut groups: FxHashMap<usize, PackedVal> = FxHashMap::default();
        for (f, l) in faults.iter().zip(lobs.iter()) {
            let e = groups.entry(f.region(self.circuit)).or_default();
            *e = *e | *l;
        }
        let mut roots: Vec<(usize, PackedVal)> = groups.into_iter().collect();
        roots.sort_by_key(|r| r.0);
        let mut obs: FxHashMap<usize, PackedVal> = FxHashMap::default();
        for (root, req) in roots {
            let o = if req.is_zero() {
                PackedVal::ZERO
            } else if self.circuit.gate(root).is_output() {
                PackedVal::ONES
            } else {
                self.flip_and_propagate(&[(root, req)])
            };
            obs.insert(root, o);
        }
        faults
            .iter()
            .zip(lobs)
            .map(|(f, l)| l & obs[&f.region(self.circuit)])
            .collect()
    }

    /// Whether each fault is detected, after a single-pattern initial run
    ///
    /// Up to 64 region roots are flipped at once, each in its own lane.
    pub fn detect_faults_single(&mut self, faults: &[Fault]) -> Vec<bool> {
        let lobs: Vec<bool> = faults
            .iter()
            .map(|f| !self.local_detection(f).is_zero())
            .collect();
        let mut roots: Vec<usize> = faults
            .iter()
            .zip(lobs.iter())
            .filter(|(_, l)| **l)
            .map(|(f, _)| f.region(self.circuit))
            .filter(|&r| !self.circuit.gate(r).is_output())
            .collect();
        roots.sort();
        roots.dedup();
        let mut root_obs: FxHashMap<usize, bool> = FxHashMap::default();
        for chunk in roots.chunks(NB_LANES) {
            let flips: Vec<(usize, PackedVal)> = chunk
                .iter()
                .enumerate()
                .map(|(k, &r)| (r, PackedVal::lane_mask(k)))
                .collect();
            let obs = self.flip_and_propagate(&flips);
            for (k, &r) in chunk.iter().enumerate() {
                root_obs.insert(r, obs.lane(k));
            }
        }
        faults
            .iter()
            .zip(lobs)
            .map(|(f, l)| {
                let root = f.region(self.circuit);
                l && (self.circuit.gate(root).is_output()
                    || root_obs.get(&root).copied().unwrap_or(false))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::network::generators::{adder, testcases};
    use crate::sim::simulate_with_fault;

    fn reference(circuit: &Circuit, pattern: &TestPattern, fault: &Fault) -> bool {
        let values = pattern.to_bools();
        crate::sim::simulate(circuit, &values) != simulate_with_fault(circuit, &values, fault)
    }

    #[test]
    fn test_and2() {
        let c = testcases::and2().unwrap();
        let mut sim = IncrementalSimulator::from_circuit(&c);
        let p = TestPattern::from_bools(&[true, true]);
        sim.run_initial(&[&p]);
        let faults = [
            Fault::OutputStuckAtFault { gate: 2, value: false },
            Fault::OutputStuckAtFault { gate: 2, value: true },
            Fault::InputStuckAtFault {
                gate: 2,
                input: 1,
                value: false,
            },
        ];
        let det = sim.detect_faults(&faults);
        assert_eq!(det, vec![PackedVal(1), PackedVal(0), PackedVal(1)]);
    }

    #[test]
    fn test_against_reference() {
        for c in [adder::ripple_carry(3).unwrap(), testcases::c17().unwrap(), testcases::consensus().unwrap()] {
            let mut rng = SmallRng::seed_from_u64(7);
            let patterns: Vec<TestPattern> = (0..40)
                .map(|_| TestPattern::random(c.nb_inputs(), &mut rng))
                .collect();
            let refs: Vec<&TestPattern> = patterns.iter().collect();
            let faults = Fault::all(&c);
            let mut sim = IncrementalSimulator::from_circuit(&c);
            sim.run_initial(&refs);
            let det = sim.detect_faults(&faults);
            for (f, d) in faults.iter().zip(det.iter()) {
                for (k, p) in patterns.iter().enumerate() {
                    assert_eq!(d.lane(k), reference(&c, p, f), "{} pattern {}", f, p);
                }
                assert!(d.truncate(patterns.len()) == *d);
            }
            for p in &patterns[..5] {
                sim.run_initial_single(p);
                let det = sim.detect_faults_single(&faults);
                for (f, d) in faults.iter().zip(det.iter()) {
                    assert_eq!(*d, reference(&c, p, f), "{} pattern {}", f, p);
                }
            }
        }
    }
}
