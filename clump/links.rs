// ========================================================================================
//
//                         Linkage graph and coverage readers
//
// ========================================================================================
//
// The clump engine does not compute linkage. It consumes two precomputed tables:
//
// - a link table of `ID_A ID_B [R2]` rows naming correlated locus pairs, and
// - a coverage table of `ID bin[,bin...]` rows naming the bins each locus tags.
//
// Both are matched against the loaded summary statistics by identifier. Rows naming
// variants outside the table are reported once, in aggregate.

use crate::diagnostics::Diagnostics;
use crate::ingest::{IngestError, LocusTable};
use crate::io::open_text_source;
use crate::types::{CoverageMask, LocusIndex};
use log::info;
use std::io;
use std::path::Path;

/// The widest coverage mask the readers accept. Masks are dense, so every locus
/// costs `MAX_COVERAGE_BINS / 8` bytes at this width.
pub const MAX_COVERAGE_BINS: usize = 1 << 20;

/// Counts produced by [`read_link_graph`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkSummary {
    /// Pairs attached to the table. Each pair produces a link in both directions.
    pub pairs: usize,
    /// Rows naming at least one identifier outside the table.
    pub unknown: usize,
    /// Rows linking a locus to itself.
    pub self_links: usize,
}

/// Counts produced by [`read_coverage`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoverageSummary {
    /// The mask width given to every locus.
    pub bins: usize,
    /// Loci that received at least one bin.
    pub assigned: usize,
    /// Rows whose identifier is outside the table.
    pub unknown: usize,
}

fn row_error(path: &Path, line: usize, details: String) -> IngestError {
    IngestError::Row {
        path: path.to_path_buf(),
        line,
        details,
    }
}

fn report_unknown(path: &Path, count: usize, first: &[String], diagnostics: &mut dyn Diagnostics) {
    if count == 0 {
        return;
    }
    diagnostics.warn(&format!(
        "{count} row(s) of '{}' name variants absent from the summary statistics and were ignored (e.g. {})",
        path.display(),
        first.join(", ")
    ));
}

/// Reads a link table and attaches every pair to both of its loci.
///
/// A first row whose identifiers are both unknown and whose third field is present
/// but not a number is taken to be a header. A missing third column leaves the link without a correlation, which proxy mode
/// never absorbs. A correlation that is not a number in `[0, 1]` aborts the file.
pub fn read_link_graph(
    path: &Path,
    table: &mut LocusTable,
    diagnostics: &mut dyn Diagnostics,
) -> Result<LinkSummary, IngestError> {
    let mut source = open_text_source(path).map_err(|e| IngestError::io(path, e))?;
    let mut summary = LinkSummary::default();
    let mut unknown_examples = Vec::new();
    let mut first_data_row = true;
    let mut line_number = 0;

    while let Some(line) = source.next_line().map_err(|e| IngestError::io(path, e))? {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let is_first = std::mem::replace(&mut first_data_row, false);

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(row_error(
                path,
                line_number,
                "expected two variant identifiers".to_string(),
            ));
        }

        let (Some(a), Some(b)) = (table.find(fields[0]), table.find(fields[1])) else {
            let looks_like_header = fields
                .get(2)
                .is_some_and(|text| lexical_core::parse::<f64>(text.as_bytes()).is_err());
            if is_first
                && looks_like_header
                && table.find(fields[0]).is_none()
                && table.find(fields[1]).is_none()
            {
                continue;
            }
            summary.unknown += 1;
            if unknown_examples.len() < 3 {
                unknown_examples.push(format!("line {line_number}"));
            }
            continue;
        };

        let r2 = match fields.get(2) {
            Some(text) => {
                let value = lexical_core::parse::<f64>(text.as_bytes()).map_err(|e| {
                    row_error(path, line_number, format!("invalid r2 '{text}': {e}"))
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(row_error(
                        path,
                        line_number,
                        format!("r2 {value} lies outside [0, 1]"),
                    ));
                }
                Some(value)
            }
            None => None,
        };

        if a == b {
            summary.self_links += 1;
            continue;
        }

        let loci = table.loci_mut();
        loci[a.0].add_link(b, r2);
        loci[b.0].add_link(a, r2);
        summary.pairs += 1;
    }

    report_unknown(path, summary.unknown, &unknown_examples, diagnostics);
    if summary.self_links > 0 {
        diagnostics.warn(&format!(
            "Ignored {} self link(s) in '{}'",
            summary.self_links,
            path.display()
        ));
    }
    info!(
        "Attached {} linked pair(s) from '{}'",
        summary.pairs,
        path.display()
    );
    Ok(summary)
}

/// Parses the bin list of one coverage row. Bins may be separated by commas,
/// blanks, or both.
fn parse_bins(fields: &[&str]) -> Result<Vec<usize>, String> {
    fields
        .iter()
        .flat_map(|field| field.split(','))
        .filter(|token| !token.is_empty())
        .map(|token| {
            lexical_core::parse::<usize>(token.as_bytes())
                .map_err(|e| format!("invalid coverage bin '{token}': {e}"))
        })
        .collect()
}

/// Reads a coverage table and gives every locus a mask of one shared width.
///
/// The width is `bins` when configured, otherwise the largest bin seen plus one.
/// A bin outside the configured width, or at or above [`MAX_COVERAGE_BINS`], aborts
/// the file. Loci without a row get an empty mask; in exact mode they are clumped
/// by the first representative linked to them.
pub fn read_coverage(
    path: &Path,
    table: &mut LocusTable,
    bins: Option<usize>,
    diagnostics: &mut dyn Diagnostics,
) -> Result<CoverageSummary, IngestError> {
    if let Some(configured) = bins.filter(|&configured| configured > MAX_COVERAGE_BINS) {
        return Err(IngestError::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{configured} coverage bins exceed the limit of {MAX_COVERAGE_BINS}"),
            ),
        ));
    }
    let limit = bins.unwrap_or(MAX_COVERAGE_BINS);
    let mut source = open_text_source(path).map_err(|e| IngestError::io(path, e))?;
    let mut rows: Vec<(LocusIndex, Vec<usize>)> = Vec::new();
    let mut unknown = 0;
    let mut unknown_examples = Vec::new();
    let mut line_number = 0;

    while let Some(line) = source.next_line().map_err(|e| IngestError::io(path, e))? {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let Some(idx) = table.find(fields[0]) else {
            unknown += 1;
            if unknown_examples.len() < 3 {
                unknown_examples.push(format!("'{}'", fields[0]));
            }
            continue;
        };
        let row_bins =
            parse_bins(&fields[1..]).map_err(|details| row_error(path, line_number, details))?;
        if let Some(&bin) = row_bins.iter().find(|&&bin| bin >= limit) {
            let details = match bins {
                Some(configured) => {
                    format!("coverage bin {bin} exceeds the configured {configured} bin(s)")
                }
                None => format!("coverage bin {bin} exceeds the limit of {MAX_COVERAGE_BINS} bins"),
            };
            return Err(row_error(path, line_number, details));
        }
        rows.push((idx, row_bins));
    }

    // Every bin is below `limit`, so the increment cannot overflow.
    let needed = rows
        .iter()
        .flat_map(|(_, row_bins)| row_bins.iter())
        .max()
        .map_or(0, |highest| highest + 1);
    let width = bins.unwrap_or(needed);

    let mut masks = vec![CoverageMask::with_bins(width); table.len()];
    for (idx, row_bins) in &rows {
        for &bin in row_bins {
            masks[idx.0].insert(bin);
        }
    }

    let mut assigned = 0;
    for (locus, mask) in table.loci_mut().iter_mut().zip(masks) {
        if !mask.is_empty() {
            assigned += 1;
        }
        if !locus.set_coverage(mask) {
            diagnostics.warn(&format!(
                "Coverage of '{}' left unchanged: the variant is already clumped",
                locus.id()
            ));
        }
    }

    report_unknown(path, unknown, &unknown_examples, diagnostics);
    info!(
        "Assigned coverage over {width} bin(s) to {assigned} variant(s) from '{}'",
        path.display()
    );
    Ok(CoverageSummary {
        bins: width,
        assigned,
        unknown,
    })
}
