//! IO for .bench (ISCAS) files

use std::io::{BufRead, BufReader, Read, Write};

use fxhash::FxHashMap;
use itertools::Itertools;

use crate::error::{ParseError, Result};
use crate::network::{Circuit, CircuitBuilder, GateKind};

/// A gate definition, before names are resolved
struct Statement {
    line: usize,
    name: String,
    kind: GateKind,
    deps: Vec<String>,
}

fn syntax(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.into(),
    }
}

fn parse_statement(line: usize, t: &str) -> std::result::Result<Statement, ParseError> {
    let parts: Vec<&str> = t
        .split(['=', '(', ',', ')'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() < 2 {
        return Err(syntax(line, format!("malformed gate definition \"{t}\"")));
    }
    let kind = GateKind::from_bench_name(parts[1])
        .ok_or_else(|| ParseError::UnsupportedGate(parts[1].to_string()))?;
    let deps: Vec<String> = parts[2..].iter().map(|s| s.to_string()).collect();
    let arity_ok = match kind {
        GateKind::Const0 | GateKind::Const1 => deps.is_empty(),
        _ => kind.check_arity(deps.len()),
    };
    if !arity_ok {
        return Err(syntax(
            line,
            format!("gate {} cannot have {} inputs", parts[1], deps.len()),
        ));
    }
    Ok(Statement {
        line,
        name: parts[0].to_string(),
        kind,
        deps,
    })
}

fn circuit_from_statements(
    statements: Vec<Statement>,
    inputs: Vec<String>,
    outputs: Vec<String>,
) -> Result<Circuit> {
    let mut name_to_gate: FxHashMap<String, usize> = FxHashMap::default();
    let mut b = CircuitBuilder::new();
    for name in &inputs {
        let g = b.add_named_input(name);
        if name_to_gate.insert(name.clone(), g).is_some() {
            return Err(ParseError::DuplicateSignal(name.clone()).into());
        }
    }
    // Gates are numbered before their fanins are known, to allow forward references
    let first = b.nb_gates();
    for (i, s) in statements.iter().enumerate() {
        if name_to_gate.insert(s.name.clone(), first + i).is_some() {
            return Err(ParseError::DuplicateSignal(s.name.clone()).into());
        }
    }
    let mut constants = Vec::new();
    let mut resolve = |name: &str, map: &FxHashMap<String, usize>| -> Option<usize> {
        if let Some(&g) = map.get(name) {
            return Some(g);
        }
        // ABC-style naming for constant signals
        let kind = match name {
            "vdd" => GateKind::Const1,
            "gnd" => GateKind::Const0,
            _ => return None,
        };
        let pos = match constants.iter().position(|&(k, _)| k == kind) {
            Some(p) => p,
            None => {
                constants.push((kind, name.to_string()));
                constants.len() - 1
            }
        };
        Some(first + statements.len() + pos)
    };
    let mut fanins = Vec::with_capacity(statements.len());
    for s in &statements {
        let mut f = Vec::with_capacity(s.deps.len());
        for d in &s.deps {
            match resolve(d, &name_to_gate) {
                Some(g) => f.push(g),
                None => {
                    return Err(syntax(s.line, format!("gate input {d} is not generated anywhere")).into())
                }
            }
        }
        fanins.push(f);
    }
    let mut output_gates = Vec::with_capacity(outputs.len());
    for o in &outputs {
        match resolve(o, &name_to_gate) {
            Some(g) => output_gates.push(g),
            None => return Err(ParseError::UndefinedSignal(o.clone()).into()),
        }
    }
    for (s, f) in statements.iter().zip(fanins) {
        b.add_named_gate(&s.name, s.kind, &f);
    }
    for (kind, name) in constants {
        b.add_named_gate(&name, kind, &[]);
    }
    for g in output_gates {
        b.add_output(g);
    }
    Ok(b.build()?)
}

/// Read a circuit in .bench format, as used by the ISCAS benchmarks
///
/// These files describe the design with simple statements like:
/// ```text
///     # This is a comment
///     INPUT(i0)
///     INPUT(i1)
///     x0 = AND(i0, i1)
///     x1 = NAND(x0, i1)
///     x2 = OR(x0, i0)
///     x3 = NOR(i0, x1)
///     x4 = XOR(x3, x2)
///     x5 = BUF(x4)
///     x6 = NOT(x5)
///     x7 = gnd
///     x8 = vdd
///     OUTPUT(x0)
/// ```
///
/// Signals may be used before they are defined. Sequential elements are rejected.
pub fn read_bench<R: Read>(r: R) -> Result<Circuit> {
    let mut statements = Vec::new();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for (i, l) in BufReader::new(r).lines().enumerate() {
        let line = i + 1;
        let s = l.map_err(ParseError::Io)?;
        let t = s.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if !t.contains('=') {
            let parts: Vec<_> = t
                .split(['(', ')'])
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if parts.len() != 2 {
                return Err(syntax(line, format!("malformed statement \"{t}\"")).into());
            }
            match parts[0].to_uppercase().as_str() {
                "INPUT" | "PINPUT" => inputs.push(parts[1].to_string()),
                "OUTPUT" | "POUTPUT" => outputs.push(parts[1].to_string()),
                _ => {
                    return Err(syntax(line, format!("unknown keyword {}", parts[0])).into());
                }
            }
        } else {
            statements.push(parse_statement(line, t)?);
        }
    }
    circuit_from_statements(statements, inputs, outputs)
}

/// Write a circuit in .bench format, as used by the ISCAS benchmarks
///
/// Gates are written in topological order, with their own names.
pub fn write_bench<W: Write>(w: &mut W, circuit: &Circuit) -> std::io::Result<()> {
    writeln!(w, "# .bench (ISCAS) file")?;
    writeln!(w, "# Generated by stuckat")?;
    for &i in circuit.inputs() {
        writeln!(w, "INPUT({})", circuit.gate(i).name())?;
    }
    writeln!(w)?;
    for &o in circuit.outputs() {
        writeln!(w, "OUTPUT({})", circuit.gate(o).name())?;
    }
    writeln!(w)?;
    for &g in circuit.topo_order() {
        let gate = circuit.gate(g);
        match gate.kind() {
            GateKind::Input => (),
            GateKind::Const0 | GateKind::Const1 => {
                writeln!(w, "{} = {}", gate.name(), gate.kind().bench_name())?;
            }
            kind => {
                let rep = gate
                    .fanins()
                    .iter()
                    .map(|&f| circuit.gate(f).name())
                    .join(", ");
                writeln!(w, "{} = {}({})", gate.name(), kind.bench_name(), rep)?;
            }
        }
    }
    Ok(())
}
