use std::fmt;

use super::value::{PackedVal, Val3};

/// Kind of a gate in the circuit
///
/// The kind set is closed: every behaviour of a gate (evaluation, observability,
/// implication rules) is dispatched with a `match` on this enum.
/// N-ary gates take any number of inputs; the arity is given by the fanin list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GateKind {
    /// Primary input
    Input,
    /// Constant 0
    Const0,
    /// Constant 1
    Const1,
    /// Buffer
    Buf,
    /// Inverter
    Not,
    /// N-input And
    And,
    /// N-input Nand
    Nand,
    /// N-input Or
    Or,
    /// N-input Nor
    Nor,
    /// N-input Xor
    Xor,
    /// N-input Xnor
    Xnor,
    /// Fault site inserted during fault injection: passes the good value, forces the faulty value
    FaultSite(bool),
}

impl GateKind {
    /// Whether the gate is an And/Nand/Or/Nor, with a controlling input value
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            GateKind::And | GateKind::Nand | GateKind::Or | GateKind::Nor
        )
    }

    /// Whether the gate is a Xor/Xnor
    pub fn is_xor_like(self) -> bool {
        matches!(self, GateKind::Xor | GateKind::Xnor)
    }

    /// Whether the gate is a Buf/Not
    pub fn is_buf_like(self) -> bool {
        matches!(self, GateKind::Buf | GateKind::Not)
    }

    /// Whether the gate is a constant
    pub fn is_constant(self) -> bool {
        matches!(self, GateKind::Const0 | GateKind::Const1)
    }

    /// Value of a constant gate
    pub fn constant_value(self) -> Option<bool> {
        match self {
            GateKind::Const0 => Some(false),
            GateKind::Const1 => Some(true),
            _ => None,
        }
    }

    /// Whether the gate inverts its inputs (Not/Nand/Nor/Xnor)
    pub fn is_inverting(self) -> bool {
        matches!(
            self,
            GateKind::Not | GateKind::Nand | GateKind::Nor | GateKind::Xnor
        )
    }

    /// Input value that forces the output, for And-like gates
    pub fn controlling_value(self) -> Val3 {
        match self {
            GateKind::And | GateKind::Nand => Val3::Zero,
            GateKind::Or | GateKind::Nor => Val3::One,
            _ => Val3::X,
        }
    }

    /// Input value that lets the other inputs through, for And-like gates
    pub fn non_controlling_value(self) -> Val3 {
        !self.controlling_value()
    }

    /// Output value when an input is at the controlling value
    pub fn controlled_output(self) -> Val3 {
        match self {
            GateKind::And | GateKind::Nor => Val3::Zero,
            GateKind::Nand | GateKind::Or => Val3::One,
            _ => Val3::X,
        }
    }

    /// Whether the number of inputs is valid for this kind
    pub fn check_arity(self, nb_inputs: usize) -> bool {
        match self {
            GateKind::Input | GateKind::Const0 | GateKind::Const1 => nb_inputs == 0,
            GateKind::Buf | GateKind::Not | GateKind::FaultSite(_) => nb_inputs == 1,
            _ => nb_inputs >= 1,
        }
    }

    /// Three-valued evaluation of the good function
    ///
    /// A fault site behaves as a buffer; primary inputs have no function and evaluate to X.
    pub fn eval3<I: IntoIterator<Item = Val3>>(self, inputs: I) -> Val3 {
        use GateKind::*;
        match self {
            Input => Val3::X,
            Const0 => Val3::Zero,
            Const1 => Val3::One,
            Buf | FaultSite(_) | Not => {
                let v = inputs.into_iter().next().unwrap_or_default();
                v.invert_if(self == Not)
            }
            And | Nand | Or | Nor => {
                let c = self.controlling_value();
                let mut all_nc = true;
                for v in inputs {
                    if v == c {
                        return self.controlled_output();
                    }
                    if v.is_unknown() {
                        all_nc = false;
                    }
                }
                if all_nc {
                    !self.controlled_output()
                } else {
                    Val3::X
                }
            }
            Xor | Xnor => {
                let mut ret = Val3::from_bool(self == Xnor);
                for v in inputs {
                    ret = ret.xor(v);
                }
                ret
            }
        }
    }

    /// Packed evaluation of the good function
    pub fn eval_packed<I: IntoIterator<Item = PackedVal>>(self, inputs: I) -> PackedVal {
        use GateKind::*;
        match self {
            Input => PackedVal::ZERO,
            Const0 => PackedVal::ZERO,
            Const1 => PackedVal::ONES,
            Buf | FaultSite(_) | Not => {
                let v = inputs.into_iter().next().unwrap_or_default();
                v.invert_if(self == Not)
            }
            And | Nand => {
                let mut ret = PackedVal::ONES;
                for v in inputs {
                    ret = ret & v;
                }
                ret.invert_if(self == Nand)
            }
            Or | Nor => {
                let mut ret = PackedVal::ZERO;
                for v in inputs {
                    ret = ret | v;
                }
                ret.invert_if(self == Nor)
            }
            Xor | Xnor => {
                let mut ret = PackedVal::ZERO;
                for v in inputs {
                    ret = ret ^ v;
                }
                ret.invert_if(self == Xnor)
            }
        }
    }

    /// Whether a change on one input reaches the output, given the other input values
    ///
    /// For And-like gates all side inputs must be known non-controlling; for Xor-like
    /// gates they must be known.
    pub fn observes3<I: IntoIterator<Item = Val3>>(self, side_inputs: I) -> bool {
        if self.is_simple() {
            let nc = self.non_controlling_value();
            side_inputs.into_iter().all(|v| v == nc)
        } else if self.is_xor_like() {
            side_inputs.into_iter().all(|v| v.is_known())
        } else {
            true
        }
    }

    /// Lanes where a change on one input reaches the output, given the other input values
    pub fn observes_packed<I: IntoIterator<Item = PackedVal>>(self, side_inputs: I) -> PackedVal {
        match self {
            GateKind::And | GateKind::Nand => {
                let mut ret = PackedVal::ONES;
                for v in side_inputs {
                    ret = ret & v;
                }
                ret
            }
            GateKind::Or | GateKind::Nor => {
                let mut ret = PackedVal::ONES;
                for v in side_inputs {
                    ret = ret & !v;
                }
                ret
            }
            _ => PackedVal::ONES,
        }
    }

    /// Name of the gate in .bench files
    pub fn bench_name(self) -> &'static str {
        use GateKind::*;
        match self {
            Input => "INPUT",
            Const0 => "gnd",
            Const1 => "vdd",
            Buf => "BUF",
            Not => "NOT",
            And => "AND",
            Nand => "NAND",
            Or => "OR",
            Nor => "NOR",
            Xor => "XOR",
            Xnor => "XNOR",
            FaultSite(false) => "SA0",
            FaultSite(true) => "SA1",
        }
    }

    /// Parse a gate name from a .bench file
    pub fn from_bench_name(name: &str) -> Option<GateKind> {
        use GateKind::*;
        let ret = match name.to_uppercase().as_str() {
            "BUF" | "BUFF" => Buf,
            "NOT" | "INV" => Not,
            "AND" => And,
            "NAND" => Nand,
            "OR" => Or,
            "NOR" => Nor,
            "XOR" => Xor,
            "XNOR" => Xnor,
            "VDD" | "CONST1" => Const1,
            "GND" | "VSS" | "CONST0" => Const0,
            _ => return None,
        };
        Some(ret)
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bench_name())
    }
}

#[cfg(test)]
mod tests {
    use super::GateKind::*;
    use super::*;

    #[test]
    fn test_controlling_values() {
        assert_eq!(And.controlling_value(), Val3::Zero);
        assert_eq!(And.controlled_output(), Val3::Zero);
        assert_eq!(Nand.controlled_output(), Val3::One);
        assert_eq!(Or.controlling_value(), Val3::One);
        assert_eq!(Nor.controlled_output(), Val3::Zero);
        assert_eq!(Xor.controlling_value(), Val3::X);
    }

    #[test]
    fn test_eval3() {
        use Val3::*;
        assert_eq!(And.eval3([One, X]), X);
        assert_eq!(And.eval3([Zero, X]), Zero);
        assert_eq!(Nand.eval3([One, One]), Zero);
        assert_eq!(Nor.eval3([Zero, Zero, Zero]), One);
        assert_eq!(Or.eval3([X, One]), One);
        assert_eq!(Xor.eval3([One, One, One]), One);
        assert_eq!(Xnor.eval3([One, Zero]), Zero);
        assert_eq!(Xor.eval3([One, X]), X);
        assert_eq!(Not.eval3([One]), Zero);
        assert_eq!(FaultSite(false).eval3([One]), One);
    }

    #[test]
    fn test_eval_packed() {
        let a = PackedVal(0b1100);
        let b = PackedVal(0b1010);
        assert_eq!(And.eval_packed([a, b]).truncate(4), PackedVal(0b1000));
        assert_eq!(Nor.eval_packed([a, b]).truncate(4), PackedVal(0b0001));
        assert_eq!(Xnor.eval_packed([a, b]).truncate(4), PackedVal(0b1001));
        assert_eq!(Or.observes_packed([a]).truncate(4), PackedVal(0b0011));
    }

    #[test]
    fn test_arity() {
        assert!(Input.check_arity(0));
        assert!(!Not.check_arity(2));
        assert!(And.check_arity(4));
        assert!(!And.check_arity(0));
        assert_eq!(GateKind::from_bench_name("buff"), Some(Buf));
        assert_eq!(GateKind::from_bench_name("DFF"), None);
    }
}
