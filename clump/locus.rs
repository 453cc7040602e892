// ========================================================================================
//                                  The locus record
// ========================================================================================

use crate::alleles::{AllelePair, Reconciliation};
use crate::types::{CoverageMask, LocusIndex};

/// Where a locus stands in the clumping pass. Transitions only go forward:
/// `Open -> Index` or `Open -> Clumped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClumpState {
    /// Not yet visited, and not explained by any earlier locus.
    Open,
    /// Visited as the representative of its clump. Its mask is frozen.
    Index,
    /// Explained by a more significant linked locus.
    Clumped,
}

/// A candidate relationship prepared by the external linkage step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClumpLink {
    pub target: LocusIndex,
    /// Squared correlation with the target, when the producer supplied one.
    pub r2: Option<f64>,
}

/// One association record: identity and statistics fixed at parse time, plus the
/// small amount of state the reconciler and the clump engine are allowed to touch.
#[derive(Debug, Clone)]
pub struct Locus {
    id: String,
    chromosome: String,
    position: Option<u64>,
    alleles: AllelePair,
    statistic: f64,
    standard_error: f64,
    p_value: f64,
    flipped: bool,
    state: ClumpState,
    coverage: CoverageMask,
    links: Vec<ClumpLink>,
}

impl Locus {
    /// `position` is `None` when the input carries no base-pair column.
    /// `alternate` may be empty when only one allele is known.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        chromosome: &str,
        position: Option<u64>,
        reference: &str,
        alternate: &str,
        statistic: f64,
        standard_error: f64,
        p_value: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            chromosome: chromosome.to_string(),
            position,
            alleles: AllelePair::new(reference, alternate),
            statistic,
            standard_error,
            p_value,
            flipped: false,
            state: ClumpState::Open,
            coverage: CoverageMask::default(),
            links: Vec::new(),
        }
    }

    // --- Identity and statistics ---

    #[inline(always)]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline(always)]
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    #[inline(always)]
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    #[inline(always)]
    pub fn reference(&self) -> &str {
        self.alleles.reference()
    }

    #[inline(always)]
    pub fn alternate(&self) -> &str {
        self.alleles.alternate()
    }

    #[inline(always)]
    pub fn statistic(&self) -> f64 {
        self.statistic
    }

    #[inline(always)]
    pub fn standard_error(&self) -> f64 {
        self.standard_error
    }

    #[inline(always)]
    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    /// Set once the alleles of a secondary file were found in the opposite
    /// orientation. Never cleared.
    #[inline(always)]
    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    // --- Clump state ---

    #[inline(always)]
    pub fn state(&self) -> ClumpState {
        self.state
    }

    /// True once the locus is locked, either as an index locus or as redundant.
    /// Locked loci are never modified again.
    #[inline]
    pub fn is_clumped(&self) -> bool {
        self.state != ClumpState::Open
    }

    /// True when a more significant locus explains this one.
    #[inline]
    pub fn is_redundant(&self) -> bool {
        self.state == ClumpState::Clumped
    }

    #[inline(always)]
    pub fn coverage(&self) -> &CoverageMask {
        &self.coverage
    }

    #[inline(always)]
    pub fn links(&self) -> &[ClumpLink] {
        &self.links
    }

    /// Installs the coverage mask. Returns `false`, leaving the mask alone, when the
    /// locus is already locked.
    pub fn set_coverage(&mut self, coverage: CoverageMask) -> bool {
        if self.is_clumped() {
            return false;
        }
        self.coverage = coverage;
        true
    }

    /// Records a candidate link towards `target`.
    pub fn add_link(&mut self, target: LocusIndex, r2: Option<f64>) {
        debug_assert!(
            r2.is_none_or(|value| (0.0..=1.0).contains(&value)),
            "r2 must lie in [0, 1]"
        );
        self.links.push(ClumpLink { target, r2 });
    }

    /// Matches a secondary observation of this locus and, when it is the same
    /// variant seen in the opposite orientation, re-expresses the stored alleles in
    /// the observed coding and raises the flip flag.
    ///
    /// Chromosome and position must agree exactly (an unknown position only matches
    /// an unknown position). A locked locus still gets a verdict but is not modified.
    pub fn reconcile(
        &mut self,
        chromosome: &str,
        position: Option<u64>,
        reference: &str,
        alternate: &str,
    ) -> Reconciliation {
        if chromosome != self.chromosome || position != self.position {
            return Reconciliation::Mismatch;
        }
        let verdict = self.alleles.assess(reference, alternate);
        if verdict == Reconciliation::Flipped && !self.is_clumped() {
            self.alleles.reorient(reference, alternate);
            self.flipped = true;
        }
        verdict
    }

    // --- Engine-only mutation ---

    #[inline(always)]
    pub(crate) fn coverage_mut(&mut self) -> &mut CoverageMask {
        debug_assert!(!self.is_clumped(), "locked loci must not be modified");
        &mut self.coverage
    }

    #[inline(always)]
    pub(crate) fn links_mut(&mut self) -> &mut Vec<ClumpLink> {
        &mut self.links
    }

    #[inline]
    pub(crate) fn mark_clumped(&mut self) {
        debug_assert!(!self.is_clumped(), "a locus can only be clumped once");
        self.state = ClumpState::Clumped;
    }

    #[inline]
    pub(crate) fn mark_index(&mut self) {
        debug_assert!(
            !self.is_clumped(),
            "a locked locus cannot represent a clump"
        );
        self.state = ClumpState::Index;
    }
}
