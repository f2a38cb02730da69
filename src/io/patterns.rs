//! IO for test pattern files
//!
//! This uses the same test pattern format as Atalanta, with one bit per input:
//! ```text
//!    1: 00011101
//!    2: 01110000
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{AtpgError, ParseError, Result};
use crate::sim::{PatternStore, TestPattern};

/// Parse patterns, checking that each has one value per primary input
///
/// The index before the colon is optional and ignored. Lines starting with `#` are comments.
pub fn parse_patterns<R: Read>(r: R, nb_inputs: usize) -> Result<Vec<TestPattern>> {
    let mut ret = Vec::new();
    for (i, l) in BufReader::new(r).lines().enumerate() {
        let s = l.map_err(ParseError::Io)?;
        let t = s.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let bits = match t.split_once(':') {
            Some((_, b)) => b.trim(),
            None => t,
        };
        let mut values = Vec::with_capacity(bits.len());
        for c in bits.chars() {
            match c {
                '0' => values.push(false),
                '1' => values.push(true),
                _ => {
                    return Err(ParseError::Syntax {
                        line: i + 1,
                        message: format!("unexpected character '{c}' in pattern"),
                    }
                    .into())
                }
            }
        }
        if values.len() != nb_inputs {
            return Err(AtpgError::PatternWidth {
                expected: nb_inputs,
                found: values.len(),
            });
        }
        ret.push(TestPattern::from_bools(&values));
    }
    Ok(ret)
}

/// Write patterns, numbered from 1
pub fn write_pattern_list<W: Write>(w: &mut W, patterns: &PatternStore) -> std::io::Result<()> {
    for (i, p) in patterns.iter().enumerate() {
        writeln!(w, "{}: {}", i + 1, p)?;
    }
    Ok(())
}

/// Read patterns from a file
pub fn read_patterns(path: &Path, nb_inputs: usize) -> Result<Vec<TestPattern>> {
    let f = File::open(path).map_err(ParseError::Io)?;
    parse_patterns(f, nb_inputs)
}

/// Write patterns to a file
pub fn write_patterns(path: &Path, patterns: &PatternStore) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_pattern_list(&mut w, patterns)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::{AtpgError, ParseError};
    use crate::sim::{PatternStore, TestPattern};

    #[test]
    fn test_parse() {
        let text = "# generated\n1: 0101\n2:1100\n\n0011\n";
        let patterns = super::parse_patterns(text.as_bytes(), 4).unwrap();
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[0].to_string(), "0101");
        assert_eq!(patterns[1].to_string(), "1100");
        assert_eq!(patterns[2].to_string(), "0011");
    }

    #[test]
    fn test_write() {
        let mut store = PatternStore::new(3);
        store.push(TestPattern::from_bools(&[true, false, true]));
        store.push(TestPattern::from_bools(&[false, false, true]));
        let mut buf = Vec::new();
        super::write_pattern_list(&mut buf, &store).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "1: 101\n2: 001\n");
        let back = super::parse_patterns(text.as_bytes(), 3).unwrap();
        assert_eq!(back[1].to_bools(), vec![false, false, true]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            super::parse_patterns("1: 010\n".as_bytes(), 4),
            Err(AtpgError::PatternWidth {
                expected: 4,
                found: 3
            })
        ));
        assert!(matches!(
            super::parse_patterns("1: 0101\n2: 01x1\n".as_bytes(), 4),
            Err(AtpgError::Parse(ParseError::Syntax { line: 2, .. }))
        ));
    }
}
