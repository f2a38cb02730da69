//! Random pattern generation with fault dropping

use std::path::Path;

use kdam::BarExt;
use tracing::info;

use crate::error::Result;
use crate::io::read_patterns;
use crate::network::NB_LANES;
use crate::sim::{FaultStatus, TestPattern};

use super::{simulate_batch, simulation_targets, Atpg, Stats};

impl Atpg {
    /// Fault simulate patterns 64 at a time, keeping those that detect new faults
    ///
    /// Patterns are read from `input_file` if given, and drawn at random otherwise.
    /// Generation stops when:
    /// * `max_patterns` patterns have been simulated, or the file is exhausted;
    /// * no fault is left;
    /// * `max_stall` batches in a row detected at most `min_detect` new faults each.
    ///
    /// A `max_stall` of 0 disables the last criterion.
    pub fn run_random_pattern_generation(
        &mut self,
        min_detect: usize,
        max_stall: usize,
        max_patterns: usize,
        input_file: Option<&Path>,
    ) -> Result<Stats> {
        let nb_inputs = self.ctx.circuit.nb_inputs();
        let mut source = match input_file {
            Some(path) => Some(read_patterns(path, nb_inputs)?.into_iter()),
            None => None,
        };
        let nb_patterns_before = self.patterns.len();
        let mut progress = self.progress_bar(self.faults.len(), "Faults detected");
        let mut simulated = 0;
        let mut stall = 0;
        while simulated < max_patterns && !simulation_targets(&self.faults).is_empty() {
            let size = NB_LANES.min(max_patterns - simulated);
            let batch: Vec<TestPattern> = match &mut source {
                Some(it) => it.by_ref().take(size).collect(),
                None => (0..size)
                    .map(|_| TestPattern::random(nb_inputs, &mut self.rng))
                    .collect(),
            };
            if batch.is_empty() {
                break;
            }
            simulated += batch.len();
            let nb_new = self.keep_detecting(batch);
            if let Some(bar) = &mut progress {
                bar.set_postfix(format!("patterns={}", self.patterns.len()));
                bar.update_to(self.faults.count(FaultStatus::Detected)).ok();
            }
            if nb_new <= min_detect {
                stall += 1;
                if max_stall > 0 && stall >= max_stall {
                    break;
                }
            } else {
                stall = 0;
            }
        }
        let stats = self.stats_since(nb_patterns_before);
        info!(
            "Random generation: {} patterns simulated, {} kept, {} faults detected",
            simulated, stats.new_patterns, stats.detected
        );
        Ok(stats)
    }

    /// Fault simulate a batch and store the patterns that detect at least one new fault
    ///
    /// Returns the number of faults detected.
    fn keep_detecting(&mut self, batch: Vec<TestPattern>) -> usize {
        let found = {
            let refs: Vec<&TestPattern> = batch.iter().collect();
            simulate_batch(&self.ctx.circuit, &self.faults, &refs)
        };
        let mut used = vec![false; batch.len()];
        for &(_, lane) in &found {
            used[lane] = true;
        }
        let mut index = vec![None; batch.len()];
        for (lane, pattern) in batch.into_iter().enumerate() {
            if used[lane] {
                index[lane] = Some(self.patterns.push(pattern));
            }
        }
        for &(f, lane) in &found {
            if let Some(p) = index[lane] {
                self.faults.set_detected(f, p);
            }
        }
        found.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::Atpg;
    use crate::config::AtpgConfig;
    use crate::io::write_patterns;
    use crate::network::generators::{adder, testcases};
    use crate::sim::{detects, FaultStatus, PatternStore, TestPattern};

    #[test]
    fn test_random_generation() {
        let config = AtpgConfig::default().with_backtrack_limit(1000);
        let mut atpg = Atpg::with_collapsed_faults(adder::ripple_carry(8).unwrap(), config).unwrap();
        let stats = atpg.run_random_pattern_generation(0, 4, 1024, None).unwrap();
        assert!(stats.detected > 0);
        assert_eq!(stats.new_patterns, atpg.patterns().len());
        // Each kept pattern is the first to detect some fault
        for p in 0..atpg.patterns().len() {
            assert!(atpg
                .faults()
                .iter()
                .any(|(_, _, pattern)| pattern == Some(p)));
        }
        for (fault, status, pattern) in atpg.faults().iter() {
            if status == FaultStatus::Detected {
                let pattern = atpg.patterns().get(pattern.unwrap());
                assert!(detects(atpg.circuit(), pattern, &fault));
            }
        }

        // Deterministic generation finishes the job
        let stats = atpg.run().unwrap();
        assert_eq!(stats.undetected, 0);
        assert_eq!(stats.aborted, 0);
    }

    #[test]
    fn test_pattern_limit() {
        let mut atpg =
            Atpg::with_collapsed_faults(adder::ripple_carry(16).unwrap(), AtpgConfig::default()).unwrap();
        let stats = atpg.run_random_pattern_generation(0, 0, 3, None).unwrap();
        assert!(stats.new_patterns <= 3);
        assert!(stats.new_patterns >= 1);
    }

    #[test]
    fn test_patterns_from_file() {
        let circuit = testcases::and2().unwrap();
        let mut store = PatternStore::new(2);
        store.push(TestPattern::from_bools(&[false, false]));
        store.push(TestPattern::from_bools(&[true, true]));
        let path = std::env::temp_dir().join("stuckat_random_input.pat");
        write_patterns(&path, &store).unwrap();

        let mut atpg = Atpg::with_collapsed_faults(circuit, AtpgConfig::default()).unwrap();
        let stats = atpg
            .run_random_pattern_generation(0, 0, 100, Some(&path))
            .unwrap();
        std::fs::remove_file(&path).ok();
        // 00 and 11 both detect something
        assert_eq!(stats.new_patterns, 2);
        assert_eq!(atpg.patterns().get(1).to_string(), "11");
    }
}
