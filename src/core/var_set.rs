//! Growable bit set over graph node indices.
//!
//! Conflict graph rows use node indices, where `0..R` name physical registers
//! and `R + v` names variable `v`; liveness sets use plain variable indices.
//! Iteration always runs from the lowest to the highest index, which keeps
//! spill and pick order deterministic for a fixed input.

use std::fmt;

const WORD_BITS: usize = 64;

/// Flat bit vector that only ever grows.
#[derive(Clone, Default)]
pub struct VarSet {
    words: Vec<u64>,
}

impl VarSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create an empty set able to hold indices below `bits` without growing.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0; words_for(bits)],
        }
    }

    /// Number of indices the set can hold without reallocation.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Zero-extend the set so it can hold indices below `bits`.
    pub fn grow(&mut self, bits: usize) {
        let needed = words_for(bits);
        if needed > self.words.len() {
            self.words.resize(needed, 0);
        }
    }

    pub fn set(&mut self, idx: usize) {
        self.grow(idx + 1);
        self.words[idx / WORD_BITS] |= 1u64 << (idx % WORD_BITS);
    }

    pub fn clear(&mut self, idx: usize) {
        if let Some(word) = self.words.get_mut(idx / WORD_BITS) {
            *word &= !(1u64 << (idx % WORD_BITS));
        }
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.words
            .get(idx / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (idx % WORD_BITS)) != 0)
    }

    /// Lowest set index.
    pub fn first(&self) -> Option<usize> {
        self.scan_from(0)
    }

    /// Lowest set index strictly greater than `idx`.
    pub fn next_after(&self, idx: usize) -> Option<usize> {
        self.scan_from(idx + 1)
    }

    fn scan_from(&self, start: usize) -> Option<usize> {
        let mut word_idx = start / WORD_BITS;
        if word_idx >= self.words.len() {
            return None;
        }
        let mut word = self.words[word_idx] & (!0u64 << (start % WORD_BITS));
        loop {
            if word != 0 {
                return Some(word_idx * WORD_BITS + word.trailing_zeros() as usize);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Clear every bit, keeping the capacity.
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// `self |= other`, growing `self` when `other` is larger.
    pub fn union_with(&mut self, other: &VarSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst |= *src;
        }
    }

    /// `self &= !other`.
    pub fn subtract(&mut self, other: &VarSet) {
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst &= !*src;
        }
    }

    /// Make `self` an exact copy of `other`; a longer tail is zero-padded.
    pub fn copy_from(&mut self, other: &VarSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let (head, tail) = self.words.split_at_mut(other.words.len());
        head.copy_from_slice(&other.words);
        tail.fill(0);
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            next: self.first(),
        }
    }

    /// Raw word storage, used by the conflict graph for row arithmetic.
    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }
}

impl PartialEq for VarSet {
    /// Sets are equal when they hold the same indices, whatever their capacity.
    fn eq(&self, other: &Self) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        short[..] == long[..short.len()] && long[short.len()..].iter().all(|&w| w == 0)
    }
}

impl Eq for VarSet {}

impl fmt::Debug for VarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for VarSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = VarSet::new();
        for idx in iter {
            set.set(idx);
        }
        set
    }
}

impl<'s> IntoIterator for &'s VarSet {
    type Item = usize;
    type IntoIter = Iter<'s>;

    fn into_iter(self) -> Iter<'s> {
        self.iter()
    }
}

/// Ascending iterator over the set bits.
pub struct Iter<'s> {
    set: &'s VarSet,
    next: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.set.next_after(current);
        Some(current)
    }
}

fn words_for(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_contains() {
        let mut set = VarSet::new();
        assert!(!set.contains(3));
        set.set(3);
        set.set(130);
        assert!(set.contains(3));
        assert!(set.contains(130));
        assert!(set.capacity() >= 131);
        set.clear(3);
        assert!(!set.contains(3));
        // Clearing outside the capacity is a no-op.
        set.clear(10_000);
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_scan_order() {
        let set: VarSet = [70, 5, 64, 63].into_iter().collect();
        assert_eq!(set.first(), Some(5));
        assert_eq!(set.next_after(5), Some(63));
        assert_eq!(set.next_after(63), Some(64));
        assert_eq!(set.next_after(64), Some(70));
        assert_eq!(set.next_after(70), None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![5, 63, 64, 70]);
    }

    #[test]
    fn test_union_and_difference() {
        let mut a: VarSet = [1, 2, 3].into_iter().collect();
        let b: VarSet = [3, 200].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 3, 200]);

        let c: VarSet = [2, 200].into_iter().collect();
        a.subtract(&c);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_copy_zero_pads_tail() {
        let mut dst: VarSet = [1, 150].into_iter().collect();
        let src: VarSet = [7].into_iter().collect();
        dst.copy_from(&src);
        assert_eq!(dst.iter().collect::<Vec<_>>(), vec![7]);
        assert!(dst.capacity() >= 151);
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a = VarSet::with_capacity(512);
        let mut b = VarSet::new();
        assert_eq!(a, b);
        a.set(9);
        assert_ne!(a, b);
        b.set(9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_clear_all_keeps_capacity() {
        let mut set: VarSet = [100].into_iter().collect();
        let cap = set.capacity();
        set.clear_all();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), cap);
        assert_eq!(set.first(), None);
    }
}
