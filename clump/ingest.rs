// ========================================================================================
//
//                       Summary-statistics ingestion and merging
//
// ========================================================================================
//
// Turns the rows of a summary-statistics file into locus records using a resolved
// column map, and folds the rows of a second, differently coded file into the
// existing records through the allele reconciler.

use crate::alleles::Reconciliation;
use crate::columns::{ColumnError, ColumnMap, Field};
use crate::diagnostics::Diagnostics;
use crate::io::open_text_source;
use crate::locus::Locus;
use crate::types::LocusIndex;
use ahash::AHashMap;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The number of skipped rows listed individually in the warning report.
const SKIP_REPORT_LIMIT: usize = 5;

/// Failures while reading any of the tool's inputs.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Columns(#[from] ColumnError),

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}, line {line}: {details}", path.display())]
    Row {
        path: PathBuf,
        line: usize,
        details: String,
    },
}

impl IngestError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        IngestError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The locus arena plus an identifier lookup.
#[derive(Debug, Default)]
pub struct LocusTable {
    loci: Vec<Locus>,
    by_id: AHashMap<String, LocusIndex>,
}

impl LocusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a locus. Returns `None`, keeping the existing record, when the identifier
    /// is already present.
    pub fn push(&mut self, locus: Locus) -> Option<LocusIndex> {
        if self.by_id.contains_key(locus.id()) {
            return None;
        }
        let idx = LocusIndex(self.loci.len());
        self.by_id.insert(locus.id().to_string(), idx);
        self.loci.push(locus);
        Some(idx)
    }

    #[inline]
    pub fn find(&self, id: &str) -> Option<LocusIndex> {
        self.by_id.get(id).copied()
    }

    #[inline]
    pub fn get(&self, idx: LocusIndex) -> Option<&Locus> {
        self.loci.get(idx.0)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.loci.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.loci.is_empty()
    }

    #[inline(always)]
    pub fn loci(&self) -> &[Locus] {
        &self.loci
    }

    /// Mutable access to the arena for the clumping pass. Records may be mutated but
    /// the arena must keep its length and order, or the identifier lookup goes stale.
    #[inline(always)]
    pub fn loci_mut(&mut self) -> &mut Vec<Locus> {
        &mut self.loci
    }

    pub fn into_loci(self) -> Vec<Locus> {
        self.loci
    }
}

/// One data row, parsed but not yet attached to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub chromosome: String,
    pub position: Option<u64>,
    pub reference: String,
    pub alternate: String,
    pub statistic: f64,
    pub standard_error: f64,
    pub p_value: f64,
}

impl Observation {
    /// Extracts the mapped fields of a tokenized row. Absent optional columns fall
    /// back to an empty chromosome and alternate allele, an unknown position and a
    /// zero standard error.
    pub fn from_fields(fields: &[&str], columns: &ColumnMap) -> Result<Self, String> {
        if fields.len() <= columns.max_index() {
            return Err(format!(
                "row has {} column(s) but at least {} are required",
                fields.len(),
                columns.max_index() + 1
            ));
        }

        let text = |field: Field| columns.get(field).map(|idx| fields[idx]);
        let required = |field: Field| match text(field) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(format!("missing {field}")),
        };

        let p_value = parse_float(required(Field::P)?, Field::P)?;
        if !(0.0..=1.0).contains(&p_value) {
            return Err(format!("p-value {p_value} lies outside [0, 1]"));
        }

        let position = match text(Field::Bp).filter(|value| !value.is_empty()) {
            Some(value) => Some(
                lexical_core::parse::<u64>(value.as_bytes())
                    .map_err(|e| format!("invalid {} '{value}': {e}", Field::Bp))?,
            ),
            None => None,
        };

        let standard_error = match text(Field::Se).filter(|value| !value.is_empty()) {
            Some(value) => parse_float(value, Field::Se)?,
            None => 0.0,
        };
        if standard_error < 0.0 {
            return Err(format!("negative {}", Field::Se));
        }

        Ok(Self {
            id: required(Field::Id)?.to_string(),
            chromosome: text(Field::Chr).unwrap_or_default().to_string(),
            position,
            reference: required(Field::Ref)?.to_string(),
            alternate: text(Field::Alt).unwrap_or_default().to_string(),
            statistic: parse_float(required(Field::Stat)?, Field::Stat)?,
            standard_error,
            p_value,
        })
    }

    pub fn into_locus(self) -> Locus {
        Locus::new(
            &self.id,
            &self.chromosome,
            self.position,
            &self.reference,
            &self.alternate,
            self.statistic,
            self.standard_error,
            self.p_value,
        )
    }
}

fn parse_float(value: &str, field: Field) -> Result<f64, String> {
    let parsed = lexical_core::parse::<f64>(value.as_bytes())
        .map_err(|e| format!("invalid {field} '{value}': {e}"))?;
    if parsed.is_nan() {
        return Err(format!("{field} is not a number"));
    }
    Ok(parsed)
}

/// Rows that could not be used, reported as a single warning at the end of a file.
#[derive(Debug, Default)]
struct SkippedRows {
    count: usize,
    examples: Vec<(usize, String)>,
}

impl SkippedRows {
    fn record(&mut self, line: usize, reason: String) {
        self.count += 1;
        if self.examples.len() < SKIP_REPORT_LIMIT {
            self.examples.push((line, reason));
        }
    }

    fn report(&self, path: &Path, what: &str, diagnostics: &mut dyn Diagnostics) {
        if self.count == 0 {
            return;
        }
        let mut message = format!(
            "Skipped {} {what} from '{}'. First entries:",
            self.count,
            path.display()
        );
        for (line, reason) in &self.examples {
            message.push_str(&format!("\n  - line {line}: {reason}"));
        }
        diagnostics.warn(&message);
    }
}

/// Streams the data rows of `path`, skipping the header when the map has one.
fn for_each_row(
    path: &Path,
    columns: &ColumnMap,
    mut visit: impl FnMut(usize, Result<Observation, String>),
) -> Result<(), IngestError> {
    let mut source = open_text_source(path).map_err(|e| IngestError::io(path, e))?;
    let separator = columns.separator();
    let mut header_pending = columns.has_header();
    let mut line_number = 0;

    while let Some(line) = source.next_line().map_err(|e| IngestError::io(path, e))? {
        line_number += 1;
        if header_pending {
            header_pending = false;
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields = separator.split(trimmed);
        visit(line_number, Observation::from_fields(&fields, columns));
    }
    Ok(())
}

/// Builds the locus table of a primary summary-statistics file.
///
/// Malformed rows and repeated identifiers are skipped and reported as warnings;
/// only I/O failures abort the file.
pub fn read_summary_statistics(
    path: &Path,
    columns: &ColumnMap,
    diagnostics: &mut dyn Diagnostics,
) -> Result<LocusTable, IngestError> {
    let mut table = LocusTable::new();
    let mut skipped = SkippedRows::default();
    let mut duplicates = SkippedRows::default();

    for_each_row(path, columns, |line, row| match row {
        Ok(observation) => {
            let id = observation.id.clone();
            if table.push(observation.into_locus()).is_none() {
                duplicates.record(line, format!("identifier '{id}' seen before"));
            }
        }
        Err(reason) => skipped.record(line, reason),
    })?;

    skipped.report(path, "malformed row(s)", diagnostics);
    duplicates.report(path, "duplicated variant(s)", diagnostics);
    info!(
        "Loaded {} variant(s) from '{}'",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Counts produced by [`merge_secondary`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Rows matching a record in the same orientation.
    pub matched: usize,
    /// Rows matching a record in the opposite orientation.
    pub flipped: usize,
    /// Rows whose identifier is known but whose coordinates or alleles disagree.
    pub mismatched: usize,
    /// Rows whose identifier is not in the table.
    pub absent: usize,
}

/// Folds a second file into `table`, reconciling every row whose identifier is
/// already known. Records never gain new rows from this file.
pub fn merge_secondary(
    table: &mut LocusTable,
    path: &Path,
    columns: &ColumnMap,
    diagnostics: &mut dyn Diagnostics,
) -> Result<MergeSummary, IngestError> {
    let mut summary = MergeSummary::default();
    let mut skipped = SkippedRows::default();
    let mut mismatched = SkippedRows::default();

    for_each_row(path, columns, |line, row| {
        let observation = match row {
            Ok(observation) => observation,
            Err(reason) => {
                skipped.record(line, reason);
                return;
            }
        };
        let Some(idx) = table.find(&observation.id) else {
            summary.absent += 1;
            return;
        };
        let locus = &mut table.loci[idx.0];
        match locus.reconcile(
            &observation.chromosome,
            observation.position,
            &observation.reference,
            &observation.alternate,
        ) {
            Reconciliation::Matched => summary.matched += 1,
            Reconciliation::Flipped => summary.flipped += 1,
            Reconciliation::Mismatch => {
                summary.mismatched += 1;
                mismatched.record(
                    line,
                    format!(
                        "'{}' differs in chromosome, position or alleles",
                        observation.id
                    ),
                );
            }
        }
    })?;

    skipped.report(path, "malformed row(s)", diagnostics);
    mismatched.report(path, "mismatched variant(s)", diagnostics);
    debug!(
        "Merged '{}': {} matched, {} flipped, {} mismatched, {} absent",
        path.display(),
        summary.matched,
        summary.flipped,
        summary.mismatched,
        summary.absent
    );
    Ok(summary)
}
