// ========================================================================================
//
//                                The clump engine
//
// ========================================================================================
//
// Loci are visited from most to least significant. Each open locus becomes the
// representative of a clump and consumes its linked neighbours:
//
// - Exact mode: a neighbour loses every coverage bin the representative already
//   tags, and is discarded only once nothing is left. A locus can therefore survive
//   one representative and be explained later by the union of several.
// - Proxy mode: every open neighbour is discarded, and the representative takes
//   over the bins of the neighbours it is correlated with strongly enough.
//
// A representative is locked after its turn so that no later locus can touch its
// mask. The traversal is single-writer; independent chromosomes may run in parallel.

use crate::diagnostics::Diagnostics;
use crate::locus::Locus;
use crate::rank::{compare_significance, rank_by_significance};
use crate::types::LocusIndex;
use ahash::AHashMap;
use log::debug;
use rayon::prelude::*;

/// Which clumping rule to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClumpMode {
    /// Clear the representative's bins from each neighbour.
    Exact,
    /// Discard each neighbour, absorbing its bins when `r2 >= threshold`.
    Proxy { threshold: f64 },
}

/// The result of a full clumping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClumpOutcome {
    /// Loci that acted as representatives, in rank order.
    pub index_loci: Vec<LocusIndex>,
    /// Loci not explained by any other locus, in arena order.
    pub retained: Vec<LocusIndex>,
    /// The number of loci marked redundant.
    pub clumped: usize,
}

impl ClumpOutcome {
    fn collect(loci: &[Locus], index_loci: Vec<LocusIndex>) -> Self {
        let retained: Vec<LocusIndex> = loci
            .iter()
            .enumerate()
            .filter(|(_, locus)| !locus.is_redundant())
            .map(|(idx, _)| LocusIndex(idx))
            .collect();
        Self {
            clumped: loci.len() - retained.len(),
            index_loci,
            retained,
        }
    }
}

/// Two disjoint mutable borrows out of the arena.
#[inline]
fn pair_mut(loci: &mut [Locus], first: usize, second: usize) -> (&mut Locus, &mut Locus) {
    debug_assert_ne!(first, second, "a locus cannot link to itself");
    if first < second {
        let (head, tail) = loci.split_at_mut(second);
        (&mut head[first], &mut tail[0])
    } else {
        let (head, tail) = loci.split_at_mut(first);
        (&mut tail[0], &mut head[second])
    }
}

/// Exact clumping around `representative`.
///
/// For every linked target that is still open, the bins set in the representative's
/// mask are cleared from the target's mask; a target left with an empty mask is
/// marked clumped. The representative is locked only after all targets are done,
/// because its mask must stay stable while it clears the others.
pub fn clump(loci: &mut [Locus], representative: LocusIndex) {
    debug_assert!(
        !loci[representative.0].is_clumped(),
        "representative {representative} is already locked"
    );

    for link_idx in 0..loci[representative.0].links().len() {
        let target = loci[representative.0].links()[link_idx].target;
        let (rep, tgt) = pair_mut(loci, representative.0, target.0);
        if tgt.is_clumped() {
            continue;
        }
        let remaining = tgt.coverage_mut().clear_covered_by(rep.coverage());
        if remaining == 0 {
            tgt.mark_clumped();
        }
    }

    loci[representative.0].mark_index();
}

/// Proxy clumping around `representative`.
///
/// Every linked target that is still open is marked clumped. When the link's
/// correlation reaches `threshold`, the target's bins are also merged into the
/// representative's mask so that it stands in for the regions the target tagged.
/// A link without a correlation value never merges.
pub fn proxy_clump(loci: &mut [Locus], representative: LocusIndex, threshold: f64) {
    debug_assert!(
        !loci[representative.0].is_clumped(),
        "representative {representative} is already locked"
    );

    for link_idx in 0..loci[representative.0].links().len() {
        let link = loci[representative.0].links()[link_idx];
        let (rep, tgt) = pair_mut(loci, representative.0, link.target.0);
        if tgt.is_clumped() {
            continue;
        }
        tgt.mark_clumped();
        if link.r2.is_some_and(|r2| r2 >= threshold) {
            rep.coverage_mut().absorb(tgt.coverage());
        }
    }

    loci[representative.0].mark_index();
}

/// Walks `order` and clumps around every locus that is still open when its turn
/// comes. Returns those representatives in the order they were visited.
pub fn clump_ranked(loci: &mut [Locus], order: &[LocusIndex], mode: ClumpMode) -> Vec<LocusIndex> {
    let mut index_loci = Vec::new();
    for &idx in order {
        if loci[idx.0].is_clumped() {
            continue;
        }
        match mode {
            ClumpMode::Exact => clump(loci, idx),
            ClumpMode::Proxy { threshold } => proxy_clump(loci, idx, threshold),
        }
        index_loci.push(idx);
    }
    index_loci
}

/// Ranks the whole arena and clumps it in one sequential pass.
pub fn run_clumping(loci: &mut [Locus], mode: ClumpMode) -> ClumpOutcome {
    let order = rank_by_significance(loci);
    let index_loci = clump_ranked(loci, &order, mode);
    ClumpOutcome::collect(loci, index_loci)
}

/// The loci of one chromosome, moved out of the arena, with links rewritten to
/// partition-local indices.
struct Partition {
    global: Vec<LocusIndex>,
    loci: Vec<Locus>,
}

/// Clumps each chromosome on its own task and produces the same outcome as
/// [`run_clumping`].
///
/// The arena is split by chromosome label, every partition is ranked and clumped
/// by exactly one rayon task, and the records are put back at their original
/// positions. Links that cross chromosomes cannot be honoured by any partition;
/// they are dropped and reported once to `diagnostics`.
pub fn clump_by_chromosome(
    loci: &mut Vec<Locus>,
    mode: ClumpMode,
    diagnostics: &mut dyn Diagnostics,
) -> ClumpOutcome {
    let total = loci.len();

    // Assign each locus to a partition, remembering its local position.
    let mut partition_ids: AHashMap<String, usize> = AHashMap::new();
    let mut placement: Vec<(usize, usize)> = Vec::with_capacity(total);
    let mut members: Vec<Vec<LocusIndex>> = Vec::new();
    for (idx, locus) in loci.iter().enumerate() {
        let partition = *partition_ids
            .entry(locus.chromosome().to_string())
            .or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
        placement.push((partition, members[partition].len()));
        members[partition].push(LocusIndex(idx));
    }
    debug!(
        "Clumping {total} loci across {} chromosome partition(s)",
        members.len()
    );

    let mut slots: Vec<Option<Locus>> = loci.drain(..).map(Some).collect();
    let mut dropped_links = 0usize;
    let mut partitions: Vec<Partition> = members
        .into_iter()
        .enumerate()
        .map(|(partition, global)| {
            let mut part_loci = Vec::with_capacity(global.len());
            for idx in &global {
                if let Some(mut locus) = slots[idx.0].take() {
                    locus.links_mut().retain_mut(|link| {
                        let (target_partition, local) = placement[link.target.0];
                        if target_partition == partition {
                            link.target = LocusIndex(local);
                            true
                        } else {
                            dropped_links += 1;
                            false
                        }
                    });
                    part_loci.push(locus);
                }
            }
            Partition {
                global,
                loci: part_loci,
            }
        })
        .collect();

    if dropped_links > 0 {
        diagnostics.warn(&format!(
            "Ignored {dropped_links} link(s) between loci on different chromosomes"
        ));
    }

    let per_partition: Vec<Vec<LocusIndex>> = partitions
        .par_iter_mut()
        .map(|part| {
            let order = rank_by_significance(&part.loci);
            clump_ranked(&mut part.loci, &order, mode)
                .into_iter()
                .map(|local| part.global[local.0])
                .collect()
        })
        .collect();

    for part in partitions {
        let Partition { global, loci: part_loci } = part;
        for (local, mut locus) in part_loci.into_iter().enumerate() {
            for link in locus.links_mut() {
                link.target = global[link.target.0];
            }
            slots[global[local].0] = Some(locus);
        }
    }

    loci.extend(slots.into_iter().flatten());
    debug_assert_eq!(loci.len(), total, "every locus must return to the arena");

    let mut index_loci: Vec<LocusIndex> = per_partition.into_iter().flatten().collect();
    index_loci.sort_by(|a, b| compare_significance(&loci[a.0], &loci[b.0]).then(a.cmp(b)));

    ClumpOutcome::collect(loci, index_loci)
}
