// ========================================================================================
//                               Significance ranking
// ========================================================================================

use crate::locus::Locus;
use crate::types::LocusIndex;
use std::cmp::Ordering;

/// Orders two loci so that the more significant one comes first.
///
/// Ties on the p-value are broken by chromosome label (plain string order), then
/// position, then the larger absolute effect, then the smaller standard error.
/// Floating-point fields use IEEE total ordering, so the comparator stays a total
/// order even for NaN input.
pub fn compare_significance(a: &Locus, b: &Locus) -> Ordering {
    a.p_value()
        .total_cmp(&b.p_value())
        .then_with(|| a.chromosome().cmp(b.chromosome()))
        .then_with(|| a.position().cmp(&b.position()))
        .then_with(|| b.statistic().abs().total_cmp(&a.statistic().abs()))
        .then_with(|| a.standard_error().total_cmp(&b.standard_error()))
}

/// Returns the arena indices in processing order. Loci that compare equal keep
/// their input order, so the permutation is reproducible run to run.
pub fn rank_by_significance(loci: &[Locus]) -> Vec<LocusIndex> {
    let mut order: Vec<LocusIndex> = (0..loci.len()).map(LocusIndex).collect();
    order.sort_by(|a, b| compare_significance(&loci[a.0], &loci[b.0]));
    order
}
