// ========================================================================================
//
//                       Allele reconciliation across input files
//
// ========================================================================================
//
// Two summary-statistics files can describe the same physical variant with the
// alleles swapped, reported on the opposite strand, or both. The rules below decide
// whether an observed allele pair belongs to a stored one and in which orientation.

/// The strand complement of an allele, base by base (A<->T, C<->G).
///
/// The result is upper case. Symbols other than the four bases (`N`, `-`, `*`, ...)
/// are carried through unchanged, and multi-base alleles are not reversed.
pub fn complement(allele: &str) -> String {
    allele
        .chars()
        .map(|base| match base.to_ascii_uppercase() {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            other => other,
        })
        .collect()
}

/// The verdict of matching an observed allele pair against a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The observation cannot describe the stored variant, even after flipping.
    Mismatch,
    /// Same variant, same orientation.
    Matched,
    /// Same variant, but the observed reference is the stored alternate
    /// (directly or on the opposite strand).
    Flipped,
}

impl Reconciliation {
    #[inline]
    pub fn is_same_locus(self) -> bool {
        !matches!(self, Reconciliation::Mismatch)
    }
}

/// The reference/alternate pair of a locus. An empty alternate means only one
/// allele has been seen so far, and the pair may still adopt a partner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllelePair {
    reference: String,
    alternate: String,
}

impl AllelePair {
    /// Builds a pair, normalizing both alleles to upper case.
    pub fn new(reference: &str, alternate: &str) -> Self {
        Self {
            reference: reference.trim().to_ascii_uppercase(),
            alternate: alternate.trim().to_ascii_uppercase(),
        }
    }

    #[inline(always)]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    #[inline(always)]
    pub fn alternate(&self) -> &str {
        &self.alternate
    }

    /// True while the alternate allele is still unknown.
    #[inline]
    pub fn is_underdetermined(&self) -> bool {
        self.alternate.is_empty()
    }

    /// Classifies an observed pair against the current stored pair without
    /// touching it.
    pub fn assess(&self, observed_ref: &str, observed_alt: &str) -> Reconciliation {
        let observed_ref = observed_ref.trim().to_ascii_uppercase();
        let observed_alt = observed_alt.trim().to_ascii_uppercase();
        let stored_ref_comp = complement(&self.reference);

        let shares_reference = observed_ref == self.reference
            || observed_alt == self.reference
            || observed_ref == stored_ref_comp
            || observed_alt == stored_ref_comp;
        if !shares_reference {
            return Reconciliation::Mismatch;
        }

        let flipped = if self.is_underdetermined() {
            // Only the stored reference is known: the observation is flipped when its
            // alternate carries that allele, on either strand.
            (observed_ref != self.reference && observed_alt == self.reference)
                || (observed_ref != stored_ref_comp && observed_alt == stored_ref_comp)
        } else {
            let stored_alt_comp = complement(&self.alternate);
            (observed_ref == self.alternate && observed_alt == self.reference)
                || (observed_ref == stored_alt_comp && observed_alt == stored_ref_comp)
        };

        if flipped {
            Reconciliation::Flipped
        } else {
            Reconciliation::Matched
        }
    }

    /// Re-expresses the pair in the observed coding after a `Flipped` verdict: the
    /// stored reference becomes the observed alternate and vice versa. Applying the
    /// same observation again leaves the pair unchanged.
    pub fn reorient(&mut self, observed_ref: &str, observed_alt: &str) {
        self.alternate = observed_ref.trim().to_ascii_uppercase();
        self.reference = observed_alt.trim().to_ascii_uppercase();
    }
}
