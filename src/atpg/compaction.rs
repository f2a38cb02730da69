//! Reduction of the pattern set: reverse order fault simulation and greedy covering

use std::cmp::Reverse;

use tracing::info;

use crate::error::Result;
use crate::network::NB_LANES;
use crate::sim::{Fault, FaultStatus, IncrementalSimulator, TestPattern};

use super::{simulate_batch, Atpg, Stats};

impl Atpg {
    /// Keep the selected patterns in generation order, and renumber the detections
    fn retain_patterns(&mut self, keep: &[bool]) {
        let mut remap = vec![None; keep.len()];
        let mut kept = Vec::new();
        for (i, p) in self.patterns.iter().enumerate() {
            if keep[i] {
                remap[i] = Some(kept.len());
                kept.push(p.clone());
            }
        }
        self.patterns.replace(kept);
        self.faults.remap_patterns(&remap);
    }

    /// Simulate the patterns again, newest first, and drop those that detect nothing
    /// the later patterns did not already detect
    pub fn run_reverse_fault_simulation(&mut self) -> Result<Stats> {
        let nb_before = self.patterns.len();
        self.faults.reset_detected();
        let order: Vec<usize> = (0..nb_before).rev().collect();
        let mut keep = vec![false; nb_before];
        for chunk in order.chunks(NB_LANES) {
            let batch: Vec<&TestPattern> = chunk.iter().map(|&p| self.patterns.get(p)).collect();
            let found = simulate_batch(&self.ctx.circuit, &self.faults, &batch);
            for (f, lane) in found {
                keep[chunk[lane]] = true;
                self.faults.set_detected(f, chunk[lane]);
            }
        }
        self.retain_patterns(&keep);
        let stats = self.stats();
        info!(
            "Reverse fault simulation: {} patterns kept out of {}",
            stats.nb_patterns, nb_before
        );
        Ok(stats)
    }

    /// Keep as few patterns as possible while detecting the same faults
    ///
    /// This is a minimum set cover problem on the full detection matrix. It is solved
    /// greedily, taking the pattern that detects the most uncovered faults each time.
    pub fn compact_patterns(&mut self) -> Stats {
        let nb_before = self.patterns.len();
        let detected = self.faults.with_status(FaultStatus::Detected);
        let list: Vec<Fault> = detected.iter().map(|&i| self.faults.fault(i)).collect();

        // Which faults are detected by a given pattern
        let mut pattern_to_faults: Vec<Vec<usize>> = vec![Vec::new(); nb_before];
        let mut sim = IncrementalSimulator::from_circuit(&self.ctx.circuit);
        for (c, chunk) in self.patterns.patterns().chunks(NB_LANES).enumerate() {
            let refs: Vec<&TestPattern> = chunk.iter().collect();
            sim.run_initial(&refs);
            for (f, d) in sim.detect_faults(&list).into_iter().enumerate() {
                for lane in 0..chunk.len() {
                    if d.lane(lane) {
                        pattern_to_faults[c * NB_LANES + lane].push(f);
                    }
                }
            }
        }

        // Which patterns detect a given fault
        let mut fault_to_patterns: Vec<Vec<usize>> = vec![Vec::new(); list.len()];
        for (p, faults) in pattern_to_faults.iter().enumerate() {
            for &f in faults {
                fault_to_patterns[f].push(p);
            }
        }

        // How many new faults each pattern detects
        let mut nb_detected_by_pattern: Vec<usize> =
            pattern_to_faults.iter().map(|v| v.len()).collect();
        let mut remaining_to_detect = fault_to_patterns.iter().filter(|v| !v.is_empty()).count();
        let mut keep = vec![false; nb_before];
        let mut assigned = vec![None; list.len()];
        while remaining_to_detect > 0 {
            let Some(best) = (0..nb_before).max_by_key(|&p| (nb_detected_by_pattern[p], Reverse(p)))
            else {
                break;
            };
            if nb_detected_by_pattern[best] == 0 {
                break;
            }
            keep[best] = true;
            remaining_to_detect -= nb_detected_by_pattern[best];
            for &f in &pattern_to_faults[best] {
                if fault_to_patterns[f].is_empty() {
                    continue;
                }
                for &p in &fault_to_patterns[f] {
                    nb_detected_by_pattern[p] -= 1;
                }
                // So we don't remove a fault twice
                fault_to_patterns[f].clear();
                assigned[f] = Some(best);
            }
        }
        for (f, &i) in detected.iter().enumerate() {
            if let Some(p) = assigned[f] {
                self.faults.set_detected(i, p);
            }
        }
        self.retain_patterns(&keep);
        let stats = self.stats();
        info!(
            "Compaction: {} patterns kept out of {}",
            stats.nb_patterns, nb_before
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use crate::atpg::Atpg;
    use crate::config::{AtpgConfig, FsimMode};
    use crate::network::generators::{adder, testcases};
    use crate::sim::{detects, FaultStatus};

    fn check_detections(atpg: &Atpg) {
        for (fault, status, pattern) in atpg.faults().iter() {
            if status == FaultStatus::Detected {
                let pattern = atpg.patterns().get(pattern.unwrap());
                assert!(detects(atpg.circuit(), pattern, &fault));
            }
        }
    }

    fn generated(circuit: crate::network::Circuit) -> Atpg {
        let config = AtpgConfig::default().with_fsim_mode(FsimMode::None);
        let mut atpg = Atpg::with_collapsed_faults(circuit, config).unwrap();
        atpg.run().unwrap();
        atpg
    }

    #[test]
    fn test_reverse_fault_simulation() {
        for circuit in [testcases::c17().unwrap(), adder::ripple_carry(4).unwrap()] {
            let mut atpg = generated(circuit);
            let before = atpg.stats();
            let stats = atpg.run_reverse_fault_simulation().unwrap();
            assert!(stats.nb_patterns <= before.nb_patterns);
            assert_eq!(stats.detected, before.detected);
            assert_eq!(stats.redundant, before.redundant);
            check_detections(&atpg);
            // The newest pattern always detects something
            assert!(atpg
                .faults()
                .iter()
                .any(|(_, _, p)| p == Some(stats.nb_patterns - 1)));
        }
    }

    #[test]
    fn test_compaction() {
        let mut atpg = generated(adder::ripple_carry(4).unwrap());
        let before = atpg.stats();
        let stats = atpg.compact_patterns();
        assert!(stats.nb_patterns <= before.nb_patterns);
        assert_eq!(stats.detected, before.detected);
        check_detections(&atpg);
        // Every kept pattern is needed by some fault
        for p in 0..stats.nb_patterns {
            assert!(atpg.faults().iter().any(|(_, _, q)| q == Some(p)));
        }
    }
}
