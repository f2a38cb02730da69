use std::fmt;

use crate::network::Circuit;

/// Representation of a fault, with its type and location
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    /// Output stuck-at fault: the output of the given gate is stuck at a fixed value
    OutputStuckAtFault {
        /// Gate where the fault is located
        gate: usize,
        /// Fault value
        value: bool,
    },
    /// Input stuck-at fault: the input of the given gate is stuck at a fixed value
    InputStuckAtFault {
        /// Gate where the fault is located
        gate: usize,
        /// Input where the fault is located
        input: usize,
        /// Fault value
        value: bool,
    },
}

impl Fault {
    /// Gate where the fault is located
    pub fn gate(&self) -> usize {
        match *self {
            Fault::OutputStuckAtFault { gate, .. } => gate,
            Fault::InputStuckAtFault { gate, .. } => gate,
        }
    }

    /// Stuck value
    pub fn value(&self) -> bool {
        match *self {
            Fault::OutputStuckAtFault { value, .. } => value,
            Fault::InputStuckAtFault { value, .. } => value,
        }
    }

    /// Input pin, for input faults
    pub fn input(&self) -> Option<usize> {
        match *self {
            Fault::OutputStuckAtFault { .. } => None,
            Fault::InputStuckAtFault { input, .. } => Some(input),
        }
    }

    /// Root of the fanout-free region where the fault effect first appears
    pub fn region(&self, circuit: &Circuit) -> usize {
        circuit.gate(self.gate()).fanout_stem()
    }

    /// Get all possible faults in a circuit
    pub fn all(circuit: &Circuit) -> Vec<Fault> {
        let mut ret = Vec::new();
        for gate in 0..circuit.nb_gates() {
            for value in [false, true] {
                ret.push(Fault::OutputStuckAtFault { gate, value });
            }
            for input in 0..circuit.gate(gate).fanins().len() {
                for value in [false, true] {
                    ret.push(Fault::InputStuckAtFault { gate, input, value });
                }
            }
        }
        ret
    }

    /// Get all faults in a circuit, keeping one representative per equivalence class
    pub fn all_collapsed(circuit: &Circuit) -> Vec<Fault> {
        let mut ret = Fault::all(circuit);
        let equivalent = Fault::equivalent_faults(circuit);
        ret.retain(|f| equivalent.binary_search(f).is_err());
        ret
    }

    /// List the faults that are equivalent to another fault that is kept
    ///
    /// The equivalence found here is acyclic: the fault closest to the outputs is always
    /// the one kept, and output faults are kept over input faults.
    pub fn equivalent_faults(circuit: &Circuit) -> Vec<Fault> {
        // Whether the signal is used once, so that its input and output stuck-at faults are equivalent
        let is_single_use = |s: usize| -> bool {
            let g = circuit.gate(s);
            g.fanouts().len() == 1 && !g.is_output()
        };
        let mut ret = Vec::new();
        for gate in 0..circuit.nb_gates() {
            let g = circuit.gate(gate);
            let kind = g.kind();
            for (input, &s) in g.fanins().iter().enumerate() {
                for value in [false, true] {
                    let forced = if kind.is_buf_like() {
                        true
                    } else if kind.is_simple() {
                        kind.controlling_value().to_bool() == Some(value)
                    } else {
                        false
                    };
                    if is_single_use(s) || forced {
                        ret.push(Fault::InputStuckAtFault { gate, input, value });
                    }
                    if is_single_use(s) && forced {
                        ret.push(Fault::OutputStuckAtFault { gate: s, value });
                    }
                }
            }
        }
        ret.sort();
        ret.dedup();
        ret
    }

    /// Human-readable description using gate names
    pub fn describe(&self, circuit: &Circuit) -> String {
        let g = circuit.gate(self.gate());
        match *self {
            Fault::OutputStuckAtFault { value, .. } => {
                format!("{} /{}", g.name(), i32::from(value))
            }
            Fault::InputStuckAtFault { input, value, .. } => {
                let src = circuit.gate(g.fanin(input));
                format!("{}->{} /{}", src.name(), g.name(), i32::from(value))
            }
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::OutputStuckAtFault { gate, value } => {
                write!(f, "Gate {} output stuck at {}", gate, i32::from(*value))
            }
            Fault::InputStuckAtFault { gate, input, value } => {
                write!(
                    f,
                    "Gate {} input {} stuck at {}",
                    gate,
                    input,
                    i32::from(*value)
                )
            }
        }
    }
}

/// Classification of a fault
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Default)]
pub enum FaultStatus {
    /// Not processed yet
    #[default]
    Undetected,
    /// Detected by a pattern
    Detected,
    /// Proven untestable
    Redundant,
    /// The search gave up; may be retried later
    Aborted,
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultStatus::Undetected => "undetected",
            FaultStatus::Detected => "detected",
            FaultStatus::Redundant => "redundant",
            FaultStatus::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// List of target faults with their classification
#[derive(Clone, Debug, Default)]
pub struct FaultList {
    faults: Vec<Fault>,
    status: Vec<FaultStatus>,
    pattern: Vec<Option<usize>>,
}

impl FaultList {
    /// Create a list where all faults are undetected
    pub fn new(faults: Vec<Fault>) -> FaultList {
        let n = faults.len();
        FaultList {
            faults,
            status: vec![FaultStatus::Undetected; n],
            pattern: vec![None; n],
        }
    }

    /// Collapsed list of all faults of the circuit
    pub fn collapsed(circuit: &Circuit) -> FaultList {
        FaultList::new(Fault::all_collapsed(circuit))
    }

    /// Add a fault, undetected; returns its index
    pub fn add(&mut self, fault: Fault) -> usize {
        self.faults.push(fault);
        self.status.push(FaultStatus::Undetected);
        self.pattern.push(None);
        self.faults.len() - 1
    }

    /// Add one representative of each class of equivalent faults of the circuit
    pub fn add_all_collapsed(&mut self, circuit: &Circuit) {
        for f in Fault::all_collapsed(circuit) {
            self.add(f);
        }
    }

    /// Number of faults
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Fault at index i
    pub fn fault(&self, i: usize) -> Fault {
        self.faults[i]
    }

    /// All faults
    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    /// Classification of the fault at index i
    pub fn status(&self, i: usize) -> FaultStatus {
        self.status[i]
    }

    /// Index of the pattern that detected the fault at index i
    pub fn detecting_pattern(&self, i: usize) -> Option<usize> {
        self.pattern[i]
    }

    /// Whether the fault at index i still needs a pattern
    pub fn is_undetected(&self, i: usize) -> bool {
        self.status[i] == FaultStatus::Undetected
    }

    /// Mark a fault as detected by the given pattern
    pub fn set_detected(&mut self, i: usize, pattern: usize) {
        self.status[i] = FaultStatus::Detected;
        self.pattern[i] = Some(pattern);
    }

    /// Set the classification of a fault
    pub fn set_status(&mut self, i: usize, status: FaultStatus) {
        self.status[i] = status;
        if status != FaultStatus::Detected {
            self.pattern[i] = None;
        }
    }

    /// Number of faults with the given classification
    pub fn count(&self, status: FaultStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }

    /// Indices of the faults with the given classification
    pub fn with_status(&self, status: FaultStatus) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.status[i] == status).collect()
    }

    /// Make aborted faults available for a new generation run
    pub fn retry_aborted(&mut self) {
        for s in &mut self.status {
            if *s == FaultStatus::Aborted {
                *s = FaultStatus::Undetected;
            }
        }
    }

    /// Forget all detections, to simulate the patterns again
    pub(crate) fn reset_detected(&mut self) {
        for i in 0..self.len() {
            if self.status[i] == FaultStatus::Detected {
                self.status[i] = FaultStatus::Undetected;
                self.pattern[i] = None;
            }
        }
    }

    /// Renumber the detecting patterns after the pattern set changed; faults whose
    /// pattern was removed become undetected
    pub(crate) fn remap_patterns(&mut self, remap: &[Option<usize>]) {
        for i in 0..self.len() {
            if let Some(p) = self.pattern[i] {
                self.pattern[i] = remap.get(p).copied().flatten();
                if self.pattern[i].is_none() {
                    self.status[i] = FaultStatus::Undetected;
                }
            }
        }
    }

    /// Iterate over the faults with their classification
    pub fn iter(&self) -> impl Iterator<Item = (Fault, FaultStatus, Option<usize>)> + '_ {
        (0..self.len()).map(|i| (self.faults[i], self.status[i], self.pattern[i]))
    }

    /// Fault coverage: detected faults over all faults, in percent
    pub fn coverage(&self) -> f64 {
        if self.is_empty() {
            return 100.0;
        }
        100.0 * self.count(FaultStatus::Detected) as f64 / self.len() as f64
    }

    /// Fault efficiency: detected and redundant faults over all faults, in percent
    pub fn efficiency(&self) -> f64 {
        if self.is_empty() {
            return 100.0;
        }
        let resolved = self.count(FaultStatus::Detected) + self.count(FaultStatus::Redundant);
        100.0 * resolved as f64 / self.len() as f64
    }
}

impl fmt::Display for FaultList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Faults: {}", self.len())?;
        writeln!(f, "  Detected: {}", self.count(FaultStatus::Detected))?;
        writeln!(f, "  Redundant: {}", self.count(FaultStatus::Redundant))?;
        writeln!(f, "  Aborted: {}", self.count(FaultStatus::Aborted))?;
        writeln!(f, "  Undetected: {}", self.count(FaultStatus::Undetected))?;
        writeln!(f, "  Coverage: {:.2}%", self.coverage())?;
        writeln!(f, "  Efficiency: {:.2}%", self.efficiency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::testcases;

    #[test]
    fn test_all_faults() {
        let c = testcases::and2().unwrap();
        let faults = Fault::all(&c);
        // 3 outputs and 2 inputs, two values each
        assert_eq!(faults.len(), 10);
    }

    #[test]
    fn test_collapsing() {
        let c = testcases::and2().unwrap();
        let faults = Fault::all_collapsed(&c);
        // a/0, b/0 and o-input/0 all collapse to o/0
        assert!(faults.contains(&Fault::OutputStuckAtFault { gate: 2, value: false }));
        assert!(faults.contains(&Fault::OutputStuckAtFault { gate: 0, value: true }));
        assert!(!faults.contains(&Fault::OutputStuckAtFault { gate: 0, value: false }));
        assert!(!faults.iter().any(|f| f.input().is_some()));
        assert_eq!(faults.len(), 4);

        // Xor inputs are not collapsed, but single fanout stems are
        let c = testcases::xor2().unwrap();
        let faults = Fault::all_collapsed(&c);
        assert_eq!(faults.len(), 6);
        assert!(faults.iter().all(|f| f.input().is_none()));

        // Reconvergent stems keep their branch faults
        let c = testcases::consensus().unwrap();
        let faults = Fault::all_collapsed(&c);
        assert!(faults.contains(&Fault::InputStuckAtFault {
            gate: 4,
            input: 0,
            value: true
        }));
        assert!(!faults.contains(&Fault::InputStuckAtFault {
            gate: 4,
            input: 0,
            value: false
        }));
    }

    #[test]
    fn test_fault_list() {
        let c = testcases::and2().unwrap();
        let mut list = FaultList::collapsed(&c);
        assert_eq!(list.count(FaultStatus::Undetected), 4);
        list.set_detected(0, 3);
        list.set_status(1, FaultStatus::Aborted);
        assert_eq!(list.detecting_pattern(0), Some(3));
        assert_eq!(list.with_status(FaultStatus::Aborted), vec![1]);
        list.retry_aborted();
        assert!(list.is_undetected(1));
        assert_eq!(list.coverage(), 25.0);
        list.reset_detected();
        assert_eq!(list.detecting_pattern(0), None);
        assert!(list.is_undetected(0));
    }

    #[test]
    fn test_add_and_remap() {
        let c = testcases::xor2().unwrap();
        let mut list = FaultList::default();
        list.add_all_collapsed(&c);
        assert_eq!(list.len(), 6);
        let i = list.add(Fault::InputStuckAtFault {
            gate: 2,
            input: 1,
            value: false,
        });
        assert_eq!(i, 6);
        assert!(list.is_undetected(i));
        list.set_detected(0, 0);
        list.set_detected(1, 2);
        list.remap_patterns(&[None, None, Some(0)]);
        assert!(list.is_undetected(0));
        assert_eq!(list.detecting_pattern(1), Some(0));
    }
}
