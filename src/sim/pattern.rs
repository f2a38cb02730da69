use std::fmt;

use rand::Rng;

use crate::network::{PackedVal, NB_LANES};

/// A test pattern: one value per primary input, packed in machine words
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct TestPattern {
    bits: Vec<u64>,
    len: usize,
}

impl TestPattern {
    /// Pattern with all inputs at 0
    pub fn new(len: usize) -> TestPattern {
        TestPattern {
            bits: vec![0; (len + NB_LANES - 1) / NB_LANES],
            len,
        }
    }

    /// Pattern from a list of input values
    pub fn from_bools(values: &[bool]) -> TestPattern {
        let mut ret = TestPattern::new(values.len());
        for (i, b) in values.iter().enumerate() {
            ret.set(i, *b);
        }
        ret
    }

    /// Random pattern
    pub fn random<R: Rng>(len: usize, rng: &mut R) -> TestPattern {
        let mut ret = TestPattern::new(len);
        for w in &mut ret.bits {
            *w = rng.gen();
        }
        ret.clear_padding();
        ret
    }

    fn clear_padding(&mut self) {
        let rem = self.len % NB_LANES;
        if rem != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }

    /// Number of inputs
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pattern has no input
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of input i
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        (self.bits[i / NB_LANES] >> (i % NB_LANES)) & 1 != 0
    }

    /// Set the value of input i
    pub fn set(&mut self, i: usize, b: bool) {
        debug_assert!(i < self.len);
        let mask = 1u64 << (i % NB_LANES);
        if b {
            self.bits[i / NB_LANES] |= mask;
        } else {
            self.bits[i / NB_LANES] &= !mask;
        }
    }

    /// Input values as booleans
    pub fn to_bools(&self) -> Vec<bool> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// Merge a cube into the pattern: inputs in `or_mask` are forced to 1, inputs
    /// missing from `and_mask` are forced to 0
    pub fn apply_masks(&mut self, or_mask: &TestPattern, and_mask: &TestPattern) {
        assert_eq!(or_mask.len, self.len);
        assert_eq!(and_mask.len, self.len);
        for (i, w) in self.bits.iter_mut().enumerate() {
            *w = (*w | or_mask.bits[i]) & and_mask.bits[i];
        }
    }

    /// Number of inputs at 1
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl fmt::Display for TestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            write!(f, "{}", if self.get(i) { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// Transpose up to 64 patterns into one packed value per input, lane k holding pattern k
pub(crate) fn pack_patterns(patterns: &[&TestPattern], nb_inputs: usize) -> Vec<PackedVal> {
    assert!(patterns.len() <= NB_LANES);
    let mut ret = vec![PackedVal::ZERO; nb_inputs];
    for (lane, p) in patterns.iter().enumerate() {
        for (i, v) in ret.iter_mut().enumerate() {
            if p.get(i) {
                v.set_lane(lane, true);
            }
        }
    }
    ret
}

/// Ordered list of test patterns
#[derive(Clone, Debug, Default)]
pub struct PatternStore {
    nb_inputs: usize,
    patterns: Vec<TestPattern>,
}

impl PatternStore {
    /// Empty store for patterns of the given width
    pub fn new(nb_inputs: usize) -> PatternStore {
        PatternStore {
            nb_inputs,
            patterns: Vec::new(),
        }
    }

    /// Width of the patterns
    pub fn nb_inputs(&self) -> usize {
        self.nb_inputs
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern at index i
    pub fn get(&self, i: usize) -> &TestPattern {
        &self.patterns[i]
    }

    /// Add a pattern; returns its index
    pub fn push(&mut self, pattern: TestPattern) -> usize {
        assert_eq!(pattern.len(), self.nb_inputs);
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    /// All patterns, in generation order
    pub fn patterns(&self) -> &[TestPattern] {
        &self.patterns
    }

    /// Iterate over the patterns in generation order
    pub fn iter(&self) -> impl Iterator<Item = &TestPattern> {
        self.patterns.iter()
    }

    /// Replace the content of the store
    pub(crate) fn replace(&mut self, patterns: Vec<TestPattern>) {
        self.patterns = patterns;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_pattern_bits() {
        let mut p = TestPattern::new(70);
        p.set(0, true);
        p.set(65, true);
        assert!(p.get(65));
        assert!(!p.get(64));
        assert_eq!(p.count_ones(), 2);
        p.set(0, false);
        assert_eq!(p.count_ones(), 1);
        let q = TestPattern::from_bools(&[true, false, true]);
        assert_eq!(q.to_string(), "101");
        assert_eq!(q.to_bools(), vec![true, false, true]);
    }

    #[test]
    fn test_random_padding() {
        let mut rng = SmallRng::seed_from_u64(1);
        let p = TestPattern::random(3, &mut rng);
        assert!(p.count_ones() <= 3);
    }

    #[test]
    fn test_masks() {
        let mut p = TestPattern::from_bools(&[true, false, true, false]);
        let or_mask = TestPattern::from_bools(&[false, true, false, false]);
        let and_mask = TestPattern::from_bools(&[true, true, false, true]);
        p.apply_masks(&or_mask, &and_mask);
        assert_eq!(p.to_string(), "1100");
    }

    #[test]
    fn test_pack() {
        let p0 = TestPattern::from_bools(&[true, false]);
        let p1 = TestPattern::from_bools(&[true, true]);
        let packed = pack_patterns(&[&p0, &p1], 2);
        assert_eq!(packed[0], PackedVal(0b11));
        assert_eq!(packed[1], PackedVal(0b10));
        let mut store = PatternStore::new(2);
        assert_eq!(store.push(p0), 0);
        assert_eq!(store.push(p1.clone()), 1);
        assert_eq!(store.get(1), &p1);
    }
}
