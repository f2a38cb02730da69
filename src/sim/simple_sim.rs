use crate::network::{Circuit, PackedVal};

use super::Fault;

/// Structure for simulation based directly on the circuit representation
#[derive(Clone)]
pub struct SimpleSimulator<'a> {
    circuit: &'a Circuit,
    pub(crate) node_values: Vec<PackedVal>,
}

impl<'a> SimpleSimulator<'a> {
    /// Build a simulator by capturing a circuit
    pub fn from_circuit(circuit: &'a Circuit) -> SimpleSimulator<'a> {
        SimpleSimulator {
            circuit,
            node_values: vec![PackedVal::ZERO; circuit.nb_gates()],
        }
    }

    /// Simulate 64 patterns; return the output values
    pub fn run(&mut self, input_values: &[PackedVal]) -> Vec<PackedVal> {
        self.copy_inputs(input_values);
        self.run_comb(None);
        self.get_output_values()
    }

    /// Simulate 64 patterns with a fault injected; return the output values
    pub fn run_with_fault(&mut self, input_values: &[PackedVal], fault: &Fault) -> Vec<PackedVal> {
        self.copy_inputs(input_values);
        self.run_comb(Some(fault));
        self.get_output_values()
    }

    pub(crate) fn copy_inputs(&mut self, inputs: &[PackedVal]) {
        assert_eq!(inputs.len(), self.circuit.nb_inputs());
        for (i, v) in inputs.iter().enumerate() {
            self.node_values[self.circuit.input(i)] = *v;
        }
    }

    /// Evaluate a gate from the current values of its inputs
    pub(crate) fn run_gate(&self, i: usize) -> PackedVal {
        let g = self.circuit.gate(i);
        g.kind()
            .eval_packed(g.fanins().iter().map(|&f| self.node_values[f]))
    }

    /// Evaluate a gate with one of its inputs stuck
    pub(crate) fn run_gate_with_input_stuck(&self, i: usize, input: usize, value: bool) -> PackedVal {
        let g = self.circuit.gate(i);
        g.kind().eval_packed(g.fanins().iter().enumerate().map(|(pin, &f)| {
            if pin == input {
                PackedVal::splat(value)
            } else {
                self.node_values[f]
            }
        }))
    }

    pub(crate) fn run_comb(&mut self, fault: Option<&Fault>) {
        for &i in self.circuit.topo_order() {
            if self.circuit.gate(i).fanins().is_empty() && !self.circuit.kind(i).is_constant() {
                // Primary input, already set
                if let Some(Fault::OutputStuckAtFault { gate, value }) = fault {
                    if *gate == i {
                        self.node_values[i] = PackedVal::splat(*value);
                    }
                }
                continue;
            }
            let val = match fault {
                Some(Fault::OutputStuckAtFault { gate, value }) if *gate == i => {
                    PackedVal::splat(*value)
                }
                Some(Fault::InputStuckAtFault { gate, input, value }) if *gate == i => {
                    self.run_gate_with_input_stuck(i, *input, *value)
                }
                _ => self.run_gate(i),
            };
            self.node_values[i] = val;
        }
    }

    fn get_output_values(&self) -> Vec<PackedVal> {
        self.circuit
            .outputs()
            .iter()
            .map(|&o| self.node_values[o])
            .collect()
    }
}
