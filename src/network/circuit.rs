use std::collections::VecDeque;

use crate::error::BuildError;

use super::gates::GateKind;
use super::value::Val3;

/// A fanout edge: the gate reading a signal and the input pin it reads it on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fanout {
    /// Gate using the signal
    pub gate: usize,
    /// Input position on that gate
    pub pin: usize,
}

/// Good and faulty values of a gate during the search, with their justification flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateState {
    /// Value in the fault-free circuit
    pub gval: Val3,
    /// Value in the faulty circuit
    pub fval: Val3,
    /// Whether the good value is justified
    pub gj: bool,
    /// Whether the faulty value is justified
    pub fj: bool,
}

/// SCOAP-like testability measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Testability {
    /// Cost of setting the gate to 0
    pub c0: u32,
    /// Cost of setting the gate to 1
    pub c1: u32,
    /// Cost of observing the gate at an output
    pub obs: u32,
}

impl Testability {
    /// Cost of setting the gate to a given value
    pub fn cost(&self, v: Val3) -> u32 {
        match v {
            Val3::Zero => self.c0,
            Val3::One => self.c1,
            Val3::X => self.c0.min(self.c1),
        }
    }
}

/// A gate of the circuit, with its topology and its search state
#[derive(Debug, Clone)]
pub struct Gate {
    pub(crate) name: String,
    pub(crate) kind: GateKind,
    pub(crate) fanins: Vec<usize>,
    pub(crate) fanouts: Vec<Fanout>,
    pub(crate) act_fanouts: Vec<Fanout>,
    pub(crate) level: usize,
    pub(crate) min_level: usize,
    pub(crate) fos: usize,
    pub(crate) eq_next: usize,
    pub(crate) is_output: bool,
    pub(crate) basis: bool,
    pub(crate) active: bool,
    pub(crate) scope: bool,
    pub(crate) fcone: bool,
    pub(crate) testability: Testability,
    /// Input positions, cheapest to set to the controlling value first
    pub(crate) fanin_order: Vec<usize>,
    pub(crate) state: GateState,
}

impl Gate {
    fn new(name: String, kind: GateKind, fanins: Vec<usize>) -> Gate {
        let nb = fanins.len();
        Gate {
            name,
            kind,
            fanins,
            fanouts: Vec::new(),
            act_fanouts: Vec::new(),
            level: 0,
            min_level: usize::MAX,
            fos: 0,
            eq_next: 0,
            is_output: false,
            basis: false,
            active: false,
            scope: false,
            fcone: false,
            testability: Testability::default(),
            fanin_order: (0..nb).collect(),
            state: GateState::default(),
        }
    }

    /// Name of the gate
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the gate
    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// Gates driving the inputs, in pin order
    pub fn fanins(&self) -> &[usize] {
        &self.fanins
    }

    /// Input at position i
    pub fn fanin(&self, i: usize) -> usize {
        self.fanins[i]
    }

    /// All gates using this gate
    pub fn fanouts(&self) -> &[Fanout] {
        &self.fanouts
    }

    /// Gates using this gate in the current activation scope
    pub fn active_fanouts(&self) -> &[Fanout] {
        &self.act_fanouts
    }

    /// Topological level
    pub fn level(&self) -> usize {
        self.level
    }

    /// Level of the closest reachable output
    pub fn min_level(&self) -> usize {
        self.min_level
    }

    /// Root of the fanout-free region containing the gate
    pub fn fanout_stem(&self) -> usize {
        self.fos
    }

    /// Next gate in the equivalence class
    pub fn eq_next(&self) -> usize {
        self.eq_next
    }

    /// Whether the gate is a primary output
    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Whether the gate post-dominates its whole transitive fanin
    pub fn is_basis(&self) -> bool {
        self.basis
    }

    /// Whether the gate is part of the current activation scope
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Testability measures
    pub fn testability(&self) -> &Testability {
        &self.testability
    }

    /// Current search state
    pub fn state(&self) -> GateState {
        self.state
    }
}

/// Combinational circuit, stored as an arena of gates addressed by index
///
/// The topology is fixed once built. The only mutation of the structure is the
/// temporary splicing of a fault site at the end of the arena during a search.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub(crate) gates: Vec<Gate>,
    pub(crate) inputs: Vec<usize>,
    pub(crate) outputs: Vec<usize>,
    pub(crate) topo_order: Vec<usize>,
    pub(crate) max_level: usize,
    pub(crate) nb_base_gates: usize,
}

impl Circuit {
    /// Number of gates, including primary inputs
    pub fn nb_gates(&self) -> usize {
        self.gates.len()
    }

    /// Number of primary inputs
    pub fn nb_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of primary outputs
    pub fn nb_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Gate of the primary input at index i
    pub fn input(&self, i: usize) -> usize {
        self.inputs[i]
    }

    /// Gate of the primary output at index i
    pub fn output(&self, i: usize) -> usize {
        self.outputs[i]
    }

    /// Gates of the primary inputs
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Gates of the primary outputs
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Gate at index i
    pub fn gate(&self, i: usize) -> &Gate {
        &self.gates[i]
    }

    /// Kind of the gate at index i
    pub fn kind(&self, i: usize) -> GateKind {
        self.gates[i].kind
    }

    /// Gates in topological order, inputs first
    pub fn topo_order(&self) -> &[usize] {
        &self.topo_order
    }

    /// Highest level in the circuit
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Find a gate by name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.gates.iter().position(|g| g.name == name)
    }

    #[cfg(test)]
    pub(crate) fn state(&self, g: usize) -> GateState {
        self.gates[g].state
    }

    pub(crate) fn gval(&self, g: usize) -> Val3 {
        self.gates[g].state.gval
    }

    #[cfg(test)]
    pub(crate) fn fval(&self, g: usize) -> Val3 {
        self.gates[g].state.fval
    }

    /// Check internal consistency
    pub fn check(&self) {
        for (i, g) in self.gates.iter().enumerate() {
            assert!(g.kind.check_arity(g.fanins.len()));
            for (pin, &f) in g.fanins.iter().enumerate() {
                assert!(f < self.gates.len());
                assert!(self.gates[f].level < g.level);
                assert!(self.gates[f]
                    .fanouts
                    .contains(&Fanout { gate: i, pin }));
            }
        }
        for &o in &self.outputs {
            assert!(self.gates[o].is_output);
        }
    }
}

/// Incremental construction of a circuit
///
/// Gates may be added in any order and refer to gates added later; the references
/// and the absence of combinational loops are checked by [`CircuitBuilder::build`].
///
/// ```
/// # use stuckat::network::CircuitBuilder;
/// let mut b = CircuitBuilder::new();
/// let a = b.add_input();
/// let c = b.add_input();
/// let o = b.and(a, c);
/// b.add_output(o);
/// let circuit = b.build().unwrap();
/// assert_eq!(circuit.nb_gates(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CircuitBuilder {
    kinds: Vec<GateKind>,
    fanins: Vec<Vec<usize>>,
    names: Vec<Option<String>>,
    outputs: Vec<usize>,
}

impl CircuitBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of gates added so far
    pub fn nb_gates(&self) -> usize {
        self.kinds.len()
    }

    /// Add a primary input
    pub fn add_input(&mut self) -> usize {
        self.add_gate(GateKind::Input, &[])
    }

    /// Add a named primary input
    pub fn add_named_input(&mut self, name: &str) -> usize {
        self.add_named_gate(name, GateKind::Input, &[])
    }

    /// Add a gate; returns its index
    pub fn add_gate(&mut self, kind: GateKind, fanins: &[usize]) -> usize {
        self.kinds.push(kind);
        self.fanins.push(fanins.to_vec());
        self.names.push(None);
        self.kinds.len() - 1
    }

    /// Add a named gate; returns its index
    pub fn add_named_gate(&mut self, name: &str, kind: GateKind, fanins: &[usize]) -> usize {
        let g = self.add_gate(kind, fanins);
        self.names[g] = Some(name.to_string());
        g
    }

    /// Mark a gate as a primary output
    pub fn add_output(&mut self, gate: usize) {
        self.outputs.push(gate);
    }

    /// Create a 2-input And gate
    pub fn and(&mut self, a: usize, b: usize) -> usize {
        self.add_gate(GateKind::And, &[a, b])
    }

    /// Create a 2-input Nand gate
    pub fn nand(&mut self, a: usize, b: usize) -> usize {
        self.add_gate(GateKind::Nand, &[a, b])
    }

    /// Create a 2-input Or gate
    pub fn or(&mut self, a: usize, b: usize) -> usize {
        self.add_gate(GateKind::Or, &[a, b])
    }

    /// Create a 2-input Nor gate
    pub fn nor(&mut self, a: usize, b: usize) -> usize {
        self.add_gate(GateKind::Nor, &[a, b])
    }

    /// Create a 2-input Xor gate
    pub fn xor(&mut self, a: usize, b: usize) -> usize {
        self.add_gate(GateKind::Xor, &[a, b])
    }

    /// Create an inverter
    pub fn not(&mut self, a: usize) -> usize {
        self.add_gate(GateKind::Not, &[a])
    }

    /// Create a buffer
    pub fn buf(&mut self, a: usize) -> usize {
        self.add_gate(GateKind::Buf, &[a])
    }

    fn validate(&self) -> Result<(), BuildError> {
        let n = self.kinds.len();
        for (gate, (kind, fanins)) in self.kinds.iter().zip(self.fanins.iter()).enumerate() {
            if matches!(kind, GateKind::FaultSite(_)) {
                return Err(BuildError::FaultSiteInNetlist { gate });
            }
            if !kind.check_arity(fanins.len()) {
                return Err(BuildError::BadArity {
                    gate,
                    kind: *kind,
                    arity: fanins.len(),
                });
            }
            for &fanin in fanins {
                if fanin >= n {
                    return Err(BuildError::DanglingFanin { gate, fanin });
                }
            }
        }
        for (output, &gate) in self.outputs.iter().enumerate() {
            if gate >= n {
                return Err(BuildError::DanglingOutput { output, gate });
            }
        }
        Ok(())
    }

    /// Topological sort; reports a loop if some gates can never be scheduled
    fn topo_sort(gates: &[Gate]) -> Result<Vec<usize>, BuildError> {
        let mut remaining: Vec<usize> = gates.iter().map(|g| g.fanins.len()).collect();
        let mut queue: VecDeque<usize> = (0..gates.len()).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(gates.len());
        while let Some(g) = queue.pop_front() {
            order.push(g);
            for fo in &gates[g].fanouts {
                remaining[fo.gate] -= 1;
                if remaining[fo.gate] == 0 {
                    queue.push_back(fo.gate);
                }
            }
        }
        if order.len() != gates.len() {
            let gate = (0..gates.len()).find(|&i| remaining[i] != 0).unwrap_or(0);
            return Err(BuildError::CombinationalLoop { gate });
        }
        Ok(order)
    }

    /// Check the netlist and build the circuit with all its precomputed structure
    pub fn build(self) -> Result<Circuit, BuildError> {
        self.validate()?;
        let mut gates: Vec<Gate> = self
            .kinds
            .iter()
            .zip(self.fanins)
            .zip(self.names)
            .enumerate()
            .map(|(i, ((kind, fanins), name))| {
                let name = name.unwrap_or_else(|| format!("g{}", i));
                Gate::new(name, *kind, fanins)
            })
            .collect();
        for i in 0..gates.len() {
            for pin in 0..gates[i].fanins.len() {
                let f = gates[i].fanins[pin];
                gates[f].fanouts.push(Fanout { gate: i, pin });
            }
        }
        let topo_order = Self::topo_sort(&gates)?;
        let mut max_level = 0;
        for &g in &topo_order {
            let level = gates[g]
                .fanins
                .iter()
                .map(|&f| gates[f].level + 2)
                .max()
                .unwrap_or(0);
            gates[g].level = level;
            max_level = max_level.max(level);
        }
        for &o in &self.outputs {
            gates[o].is_output = true;
        }
        let inputs = (0..gates.len())
            .filter(|&i| gates[i].kind == GateKind::Input)
            .collect();
        let nb_base_gates = gates.len();
        let mut ret = Circuit {
            gates,
            inputs,
            outputs: self.outputs,
            topo_order,
            max_level,
            nb_base_gates,
        };
        ret.compute_structure();
        ret.compute_testability();
        ret.activate_all();
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        let x = b.and(a, c);
        let y = b.not(x);
        b.add_output(y);
        let circuit = b.build().unwrap();
        circuit.check();
        assert_eq!(circuit.nb_inputs(), 2);
        assert_eq!(circuit.nb_outputs(), 1);
        assert_eq!(circuit.gate(x).level(), 2);
        assert_eq!(circuit.gate(y).level(), 4);
        assert_eq!(circuit.max_level(), 4);
        assert_eq!(circuit.gate(a).fanouts(), &[Fanout { gate: x, pin: 0 }]);
        assert_eq!(circuit.topo_order().len(), 4);
    }

    #[test]
    fn test_forward_reference() {
        let mut b = CircuitBuilder::new();
        let o = b.add_gate(GateKind::Or, &[1, 2]);
        let a = b.add_input();
        let c = b.add_input();
        b.add_output(o);
        let circuit = b.build().unwrap();
        assert_eq!(circuit.gate(o).fanins(), &[a, c]);
        assert_eq!(circuit.topo_order().last(), Some(&o));
    }

    #[test]
    fn test_dangling() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        b.add_gate(GateKind::And, &[a, 7]);
        assert_eq!(
            b.clone().build().unwrap_err(),
            BuildError::DanglingFanin { gate: 1, fanin: 7 }
        );
        let mut b = CircuitBuilder::new();
        b.add_input();
        b.add_output(3);
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::DanglingOutput { output: 0, gate: 3 }
        );
    }

    #[test]
    fn test_loop() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let x = b.add_gate(GateKind::And, &[a, 2]);
        b.add_gate(GateKind::Or, &[a, x]);
        b.add_output(x);
        assert!(matches!(
            b.build(),
            Err(BuildError::CombinationalLoop { .. })
        ));
    }

    #[test]
    fn test_bad_arity() {
        let mut b = CircuitBuilder::new();
        let a = b.add_input();
        let c = b.add_input();
        b.add_gate(GateKind::Not, &[a, c]);
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::BadArity {
                gate: 2,
                kind: GateKind::Not,
                arity: 2
            }
        );
    }
}
