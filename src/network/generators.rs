//! Circuit generators and small test circuits

use crate::error::BuildError;
use crate::network::{Circuit, CircuitBuilder};

fn finish(b: CircuitBuilder) -> Result<Circuit, BuildError> {
    let ret = b.build()?;
    ret.check();
    Ok(ret)
}

/// Adder generators
pub mod adder {
    use super::{finish, BuildError};
    use crate::network::{Circuit, CircuitBuilder, GateKind};

    /// A simple and slow ripple-carry adder, built from two-input gates
    pub fn ripple_carry(len: usize) -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let mut c = ret.add_gate(GateKind::Const0, &[]);
        for _ in 0..len {
            let a = ret.add_input();
            let b = ret.add_input();
            let p = ret.xor(a, b);
            let o = ret.xor(p, c);
            let g = ret.and(a, b);
            let t = ret.and(p, c);
            let next_c = ret.or(g, t);
            ret.add_output(o);
            c = next_c;
        }
        ret.add_output(c);
        finish(ret)
    }
}

/// Xor trees
pub mod parity {
    use super::{finish, BuildError};
    use crate::network::{Circuit, CircuitBuilder};

    /// A balanced tree of two-input Xor gates computing the parity of its inputs
    pub fn tree(len: usize) -> Result<Circuit, BuildError> {
        assert!(len > 0);
        let mut ret = CircuitBuilder::new();
        let mut layer: Vec<usize> = (0..len).map(|_| ret.add_input()).collect();
        while layer.len() > 1 {
            let mut next = Vec::new();
            for pair in layer.chunks(2) {
                if pair.len() == 2 {
                    next.push(ret.xor(pair[0], pair[1]));
                } else {
                    next.push(pair[0]);
                }
            }
            layer = next;
        }
        ret.add_output(layer[0]);
        finish(ret)
    }
}

/// Small circuits with known test properties
pub mod testcases {
    use super::{finish, BuildError};
    use crate::network::{Circuit, CircuitBuilder, GateKind};

    /// A single two-input And gate
    pub fn and2() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let a = ret.add_named_input("a");
        let b = ret.add_named_input("b");
        let o = ret.add_named_gate("o", GateKind::And, &[a, b]);
        ret.add_output(o);
        finish(ret)
    }

    /// A single two-input Xor gate
    pub fn xor2() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let a = ret.add_named_input("a");
        let b = ret.add_named_input("b");
        let o = ret.add_named_gate("o", GateKind::Xor, &[a, b]);
        ret.add_output(o);
        finish(ret)
    }

    /// An And gate driving an inverter that reaches no output; the output is an Or of the inputs
    ///
    /// Gate 2 is the And, gate 3 the inverter.
    pub fn unobserved_inverter() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let a = ret.add_named_input("a");
        let b = ret.add_named_input("b");
        let x = ret.add_named_gate("x", GateKind::And, &[a, b]);
        ret.add_named_gate("y", GateKind::Not, &[x]);
        let o = ret.add_named_gate("o", GateKind::Or, &[a, b]);
        ret.add_output(o);
        finish(ret)
    }

    /// Majority-like function `a.b + !a.c + b.c`, where the consensus term `b.c` is redundant
    ///
    /// Gates: a=0, b=1, c=2, !a=3, a.b=4, !a.c=5, b.c=6, output=7.
    pub fn consensus() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let a = ret.add_named_input("a");
        let b = ret.add_named_input("b");
        let c = ret.add_named_input("c");
        let na = ret.add_named_gate("na", GateKind::Not, &[a]);
        let p = ret.add_named_gate("p", GateKind::And, &[a, b]);
        let q = ret.add_named_gate("q", GateKind::And, &[na, c]);
        let t = ret.add_named_gate("t", GateKind::And, &[b, c]);
        let o = ret.add_named_gate("o", GateKind::Or, &[p, q, t]);
        ret.add_output(o);
        finish(ret)
    }

    /// The ISCAS-85 c17 benchmark: five inputs, six Nand gates, two outputs
    pub fn c17() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let i1 = ret.add_named_input("1");
        let i2 = ret.add_named_input("2");
        let i3 = ret.add_named_input("3");
        let i6 = ret.add_named_input("6");
        let i7 = ret.add_named_input("7");
        let g10 = ret.add_named_gate("10", GateKind::Nand, &[i1, i3]);
        let g11 = ret.add_named_gate("11", GateKind::Nand, &[i3, i6]);
        let g16 = ret.add_named_gate("16", GateKind::Nand, &[i2, g11]);
        let g19 = ret.add_named_gate("19", GateKind::Nand, &[g11, i7]);
        let g22 = ret.add_named_gate("22", GateKind::Nand, &[g10, g16]);
        let g23 = ret.add_named_gate("23", GateKind::Nand, &[g16, g19]);
        ret.add_output(g22);
        ret.add_output(g23);
        finish(ret)
    }

    /// A circuit with a constant input, a multiplexer and a reconvergent stem
    pub fn mux_with_constant() -> Result<Circuit, BuildError> {
        let mut ret = CircuitBuilder::new();
        let s = ret.add_named_input("s");
        let a = ret.add_named_input("a");
        let b = ret.add_named_input("b");
        let one = ret.add_named_gate("vdd", GateKind::Const1, &[]);
        let ns = ret.not(s);
        let x = ret.and(s, a);
        let y = ret.and(ns, b);
        let m = ret.or(x, y);
        let k = ret.add_gate(GateKind::Nand, &[m, one]);
        let e = ret.add_gate(GateKind::Xnor, &[s, a, b]);
        ret.add_output(k);
        ret.add_output(e);
        finish(ret)
    }
}
