//! Read and write circuits and test patterns

mod bench;
mod patterns;

use std::fs::File;
use std::path::Path;

pub use bench::{read_bench, write_bench};
pub use patterns::{parse_patterns, read_patterns, write_pattern_list, write_patterns};

use crate::error::{ParseError, Result};
use crate::network::Circuit;

/// Read a circuit from a file
///
/// Following extensions are supported: .bench
pub fn read_network_file(path: &Path) -> Result<Circuit> {
    match path.extension() {
        Some(s) if s == "bench" => {
            let f = File::open(path).map_err(ParseError::Io)?;
            read_bench(f)
        }
        _ => Err(ParseError::UnknownExtension(path.display().to_string()).into()),
    }
}

/// Write a circuit to a file
///
/// Following extensions are supported: .bench
pub fn write_network_file(path: &Path, circuit: &Circuit) -> Result<()> {
    match path.extension() {
        Some(s) if s == "bench" => {
            let mut f = File::create(path)?;
            write_bench(&mut f, circuit)?;
            Ok(())
        }
        _ => Err(ParseError::UnknownExtension(path.display().to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::error::{AtpgError, ParseError};
    use crate::network::generators::testcases;

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join("stuckat_io_c17.bench");
        let circuit = testcases::c17().unwrap();
        super::write_network_file(&path, &circuit).unwrap();
        let read = super::read_network_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(read.nb_inputs(), 5);
        assert_eq!(read.nb_outputs(), 2);
        assert_eq!(read.nb_gates(), circuit.nb_gates());
    }

    #[test]
    fn test_bad_extension() {
        let res = super::read_network_file(Path::new("design.blif"));
        assert!(matches!(
            res,
            Err(AtpgError::Parse(ParseError::UnknownExtension(_)))
        ));
    }
}
