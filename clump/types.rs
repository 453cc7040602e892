// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is only for types that are shared between files, not types that only are used in one file.

use std::fmt;

/// An index into the locus arena owned by the orchestrating caller.
///
/// This newtype keeps arena positions apart from column indices and bin numbers at
/// compile time. The `#[repr(transparent)]` attribute makes it a zero-cost abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LocusIndex(pub usize);

impl fmt::Display for LocusIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The number of coverage bins held by one mask word.
pub const WORD_BITS: usize = usize::BITS as usize;

/// A dense, fixed-width bit set over the externally enumerated coverage bins.
///
/// The readers give every locus of a pass a mask of the same width; a narrower mask
/// behaves as if padded with empty words. The words are the platform's natural
/// integer so that every update in the engine is a handful of word-parallel bitwise
/// operations, no matter how many bins a locus tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageMask {
    words: Box<[usize]>,
}

impl CoverageMask {
    /// An empty mask wide enough to address `bins` bins.
    pub fn with_bins(bins: usize) -> Self {
        Self {
            words: vec![0; bins.div_ceil(WORD_BITS)].into_boxed_slice(),
        }
    }

    /// Wraps raw words. Bin `b` lives in word `b / WORD_BITS`, bit `b % WORD_BITS`.
    pub fn from_words(words: Vec<usize>) -> Self {
        Self {
            words: words.into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn words(&self) -> &[usize] {
        &self.words
    }

    #[inline(always)]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The highest bin number this mask can hold, plus one.
    #[inline]
    pub fn bin_capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Sets the bit for `bin`. Addressing a bin beyond the mask width is a caller bug.
    #[inline]
    pub fn insert(&mut self, bin: usize) {
        assert!(
            bin < self.bin_capacity(),
            "Coverage bin {bin} does not fit a mask of {} bins",
            self.bin_capacity()
        );
        self.words[bin / WORD_BITS] |= 1usize << (bin % WORD_BITS);
    }

    #[inline]
    pub fn contains(&self, bin: usize) -> bool {
        self.words
            .get(bin / WORD_BITS)
            .is_some_and(|word| word & (1usize << (bin % WORD_BITS)) != 0)
    }

    /// Population count over all words.
    #[inline]
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|word| word.count_ones()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Clears every bit that is also set in `covering` (`self &= !covering`), written
    /// per word as `self ^= covering & self`. Returns the remaining population count
    /// over every word of `self`; words past the end of `covering` cover nothing.
    #[inline]
    pub fn clear_covered_by(&mut self, covering: &CoverageMask) -> u32 {
        let mut remaining = 0u32;
        for (i, word) in self.words.iter_mut().enumerate() {
            let cover = covering.words.get(i).copied().unwrap_or(0);
            *word ^= cover & *word;
            remaining += word.count_ones();
        }
        remaining
    }

    /// Ors the bits of `other` into this mask, widening it when `other` is wider.
    #[inline]
    pub fn absorb(&mut self, other: &CoverageMask) {
        if other.words.len() > self.words.len() {
            let mut widened = self.words.to_vec();
            widened.resize(other.words.len(), 0);
            self.words = widened.into_boxed_slice();
        }
        for (word, &extra) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= extra;
        }
    }

    /// Iterates the set bins in ascending order.
    pub fn bins(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                (0..WORD_BITS)
                    .filter(move |bit| word & (1usize << bit) != 0)
                    .map(move |bit| word_idx * WORD_BITS + bit)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_removes_only_shared_bits() {
        let representative = CoverageMask::from_words(vec![0b1010]);
        let mut target = CoverageMask::from_words(vec![0b1110]);

        let remaining = target.clear_covered_by(&representative);

        assert_eq!(target.words(), &[0b0100]);
        assert_eq!(remaining, 1);
        assert!(!target.is_empty());
    }

    #[test]
    fn clearing_with_identical_mask_empties_target() {
        let representative = CoverageMask::from_words(vec![0b1110]);
        let mut target = CoverageMask::from_words(vec![0b1110]);

        assert_eq!(target.clear_covered_by(&representative), 0);
        assert!(target.is_empty());
    }

    #[test]
    fn bins_spill_into_later_words() {
        let mut mask = CoverageMask::with_bins(WORD_BITS + 3);
        assert_eq!(mask.word_count(), 2);

        mask.insert(1);
        mask.insert(WORD_BITS + 2);

        assert!(mask.contains(1));
        assert!(mask.contains(WORD_BITS + 2));
        assert!(!mask.contains(WORD_BITS));
        assert!(!mask.contains(10 * WORD_BITS));
        assert_eq!(mask.count_ones(), 2);
        assert_eq!(mask.bins().collect::<Vec<_>>(), vec![1, WORD_BITS + 2]);
    }

    #[test]
    fn absorb_is_a_bitwise_union() {
        let mut representative = CoverageMask::from_words(vec![0b0011, 0]);
        let target = CoverageMask::from_words(vec![0b0110, 0b1]);

        representative.absorb(&target);

        assert_eq!(representative.words(), &[0b0111, 0b1]);
    }

    #[test]
    fn narrower_covering_mask_leaves_extra_words_alone() {
        let mut target = CoverageMask::from_words(vec![0b0110, 0b1]);

        assert_eq!(target.clear_covered_by(&CoverageMask::default()), 3);
        assert_eq!(target.words(), &[0b0110, 0b1]);

        assert_eq!(target.clear_covered_by(&CoverageMask::from_words(vec![0b0010])), 2);
        assert_eq!(target.words(), &[0b0100, 0b1]);
    }

    #[test]
    fn absorbing_a_wider_mask_widens_the_receiver() {
        let mut representative = CoverageMask::default();
        representative.absorb(&CoverageMask::from_words(vec![0b10, 0b1]));

        assert_eq!(representative.words(), &[0b10, 0b1]);
        assert_eq!(representative.bins().collect::<Vec<_>>(), vec![1, WORD_BITS]);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn inserting_past_capacity_panics() {
        let mut mask = CoverageMask::with_bins(4);
        mask.insert(WORD_BITS);
    }
}
