//! Simulation of a circuit, with or without faults. Faster, multi-pattern fault simulation is
//! available through [`IncrementalSimulator`].

mod fault;
mod incremental_sim;
mod pattern;
mod simple_sim;

use crate::network::{Circuit, PackedVal};

pub use fault::{Fault, FaultList, FaultStatus};
pub use incremental_sim::IncrementalSimulator;
pub(crate) use pattern::pack_patterns;
pub use pattern::{PatternStore, TestPattern};
pub use simple_sim::SimpleSimulator;

/// Simple conversion to 64b format
fn bool_to_multi(values: &[bool]) -> Vec<PackedVal> {
    values.iter().map(|b| PackedVal::splat(*b)).collect()
}

/// Simple conversion from 64b format
fn multi_to_bool(values: &[PackedVal]) -> Vec<bool> {
    values.iter().map(|v| v.lane(0)).collect()
}

/// Simulate the circuit; return the output values
pub fn simulate(circuit: &Circuit, input_values: &[bool]) -> Vec<bool> {
    let mut sim = SimpleSimulator::from_circuit(circuit);
    multi_to_bool(&sim.run(&bool_to_multi(input_values)))
}

/// Simulate the circuit with a fault injected; return the output values
pub fn simulate_with_fault(circuit: &Circuit, input_values: &[bool], fault: &Fault) -> Vec<bool> {
    let mut sim = SimpleSimulator::from_circuit(circuit);
    multi_to_bool(&sim.run_with_fault(&bool_to_multi(input_values), fault))
}

/// Whether a pattern detects a fault, by full simulation of the good and faulty circuits
pub fn detects(circuit: &Circuit, pattern: &TestPattern, fault: &Fault) -> bool {
    let values = pattern.to_bools();
    simulate(circuit, &values) != simulate_with_fault(circuit, &values, fault)
}

/// Simulate up to 64 patterns at once; return the output values, one pattern per lane
pub fn simulate_multi(circuit: &Circuit, patterns: &[&TestPattern]) -> Vec<PackedVal> {
    let mut sim = SimpleSimulator::from_circuit(circuit);
    sim.run(&pack_patterns(patterns, circuit.nb_inputs()))
}

#[cfg(test)]
mod tests {
    use crate::network::{CircuitBuilder, GateKind};

    use super::*;

    #[test]
    fn test_basic() {
        let mut b = CircuitBuilder::new();
        let i0 = b.add_input();
        let i1 = b.add_input();
        let i2 = b.add_input();
        let x1 = b.xor(i0, i1);
        let x2 = b.and(i0, i2);
        let n1 = b.not(i1);
        let x3 = b.and(x2, n1);
        b.add_output(x1);
        b.add_output(x3);
        let c = b.build().unwrap();

        assert_eq!(simulate(&c, &[false, false, false]), vec![false, false]);
        assert_eq!(simulate(&c, &[true, false, false]), vec![true, false]);
        assert_eq!(simulate(&c, &[true, false, true]), vec![true, true]);
        assert_eq!(simulate(&c, &[true, true, true]), vec![false, false]);

        let f = Fault::InputStuckAtFault {
            gate: x3,
            input: 1,
            value: true,
        };
        assert_eq!(
            simulate_with_fault(&c, &[true, true, true], &f),
            vec![false, true]
        );
        let p = TestPattern::from_bools(&[true, true, true]);
        assert!(detects(&c, &p, &f));
        let f = Fault::OutputStuckAtFault {
            gate: i0,
            value: true,
        };
        assert!(!detects(&c, &p, &f));
    }

    #[test]
    fn test_nary() {
        let mut b = CircuitBuilder::new();
        let ins: Vec<usize> = (0..4).map(|_| b.add_input()).collect();
        for kind in [
            GateKind::And,
            GateKind::Xor,
            GateKind::Or,
            GateKind::Nand,
            GateKind::Nor,
            GateKind::Xnor,
        ] {
            let g = b.add_gate(kind, &ins);
            b.add_output(g);
        }
        let c = b.build().unwrap();

        let patterns = [
            [false, false, false, false],
            [true, false, false, false],
            [false, true, false, false],
            [false, false, true, false],
            [false, false, false, true],
            [true, true, true, true],
        ];
        let expected = [
            [false, false, false, true, true, true],
            [false, true, true, true, false, false],
            [false, true, true, true, false, false],
            [false, true, true, true, false, false],
            [false, true, true, true, false, false],
            [true, false, true, false, false, true],
        ];
        for (p, e) in patterns.iter().zip(expected.iter()) {
            assert_eq!(simulate(&c, p), e.to_vec());
        }
        let tps: Vec<TestPattern> = patterns.iter().map(|p| TestPattern::from_bools(p)).collect();
        let refs: Vec<&TestPattern> = tps.iter().collect();
        let multi = simulate_multi(&c, &refs);
        for (k, e) in expected.iter().enumerate() {
            for (o, v) in e.iter().enumerate() {
                assert_eq!(multi[o].lane(k), *v);
            }
        }
    }
}
