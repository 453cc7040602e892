// ========================================================================================
//
//                           Column index resolution
//
// ========================================================================================
//
// Summary statistics arrive in arbitrary layouts. Before any record is built, the
// logical fields the engine needs are pinned to column positions, either from
// explicit indices or by looking their names up in the header line.

use crate::diagnostics::Diagnostics;
use crate::io::open_text_source;
use ahash::AHashSet;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// The logical fields of a summary-statistics row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Chr,
    Ref,
    Alt,
    Stat,
    Id,
    Bp,
    Se,
    P,
}

impl Field {
    /// Every field, in slot order.
    pub const ALL: [Field; 8] = [
        Field::Chr,
        Field::Ref,
        Field::Alt,
        Field::Stat,
        Field::Id,
        Field::Bp,
        Field::Se,
        Field::P,
    ];

    /// Reference allele, statistic, identifier and p-value cannot be done without.
    #[inline]
    pub fn is_mandatory(self) -> bool {
        matches!(self, Field::Ref | Field::Stat | Field::Id | Field::P)
    }

    #[inline(always)]
    fn slot(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Chr => "chromosome",
            Field::Ref => "reference allele",
            Field::Alt => "alternate allele",
            Field::Stat => "effect statistic",
            Field::Id => "variant identifier",
            Field::Bp => "base-pair position",
            Field::Se => "standard error",
            Field::P => "p-value",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a line is cut into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum FieldSeparator {
    /// Runs of spaces and tabs separate fields.
    #[default]
    Whitespace,
    /// A single delimiter character; empty fields are kept.
    Char(char),
}

impl FieldSeparator {
    /// Splits a line, ignoring surrounding blanks on every field.
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            FieldSeparator::Whitespace => line.split_whitespace().collect(),
            FieldSeparator::Char(delimiter) => line.split(*delimiter).map(str::trim).collect(),
        }
    }
}

impl FromStr for FieldSeparator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "whitespace" | "space" => Ok(FieldSeparator::Whitespace),
            "tab" | "\\t" | "\t" => Ok(FieldSeparator::Char('\t')),
            "comma" | "," => Ok(FieldSeparator::Char(',')),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(single), None) => Ok(FieldSeparator::Char(single)),
                    _ => Err(format!(
                        "Unknown separator '{other}'. Use 'whitespace', 'tab', 'comma' or a single character."
                    )),
                }
            }
        }
    }
}

impl TryFrom<String> for FieldSeparator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Column names (or, with `by_index`, column numbers as text) for every field.
/// Optional fields may be left out entirely.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnNames {
    pub chr: Option<String>,
    pub reference: String,
    pub alternate: Option<String>,
    pub statistic: String,
    pub id: String,
    pub bp: Option<String>,
    pub se: Option<String>,
    pub p: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            chr: Some("CHR".to_string()),
            reference: "A1".to_string(),
            alternate: Some("A2".to_string()),
            statistic: "OR".to_string(),
            id: "SNP".to_string(),
            bp: Some("BP".to_string()),
            se: Some("SE".to_string()),
            p: "P".to_string(),
        }
    }
}

impl ColumnNames {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Chr => self.chr.as_deref(),
            Field::Ref => Some(&self.reference),
            Field::Alt => self.alternate.as_deref(),
            Field::Stat => Some(&self.statistic),
            Field::Id => Some(&self.id),
            Field::Bp => self.bp.as_deref(),
            Field::Se => self.se.as_deref(),
            Field::P => Some(&self.p),
        }
    }
}

/// Everything needed to locate the fields of one input file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnSpec {
    pub names: ColumnNames,
    /// Interpret `names` as 0-based column numbers of a header-less file.
    pub by_index: bool,
    pub separator: FieldSeparator,
}

/// The resolved field positions of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    slots: [Option<usize>; 8],
    max_index: usize,
    has_header: bool,
    separator: FieldSeparator,
}

impl ColumnMap {
    #[inline]
    pub fn get(&self, field: Field) -> Option<usize> {
        self.slots[field.slot()]
    }

    /// The largest resolved column index. A row needs `max_index + 1` fields.
    #[inline(always)]
    pub fn max_index(&self) -> usize {
        self.max_index
    }

    /// True when the first line of the file is a header row.
    #[inline(always)]
    pub fn has_header(&self) -> bool {
        self.has_header
    }

    #[inline(always)]
    pub fn separator(&self) -> FieldSeparator {
        self.separator
    }
}

/// Unrecoverable problems with the column layout of a file.
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error(
        "Invalid index '{value}' for the {field} column: column indices must be non-negative integers"
    )]
    InvalidIndex { field: Field, value: String },

    #[error("No {name} column in input data (needed for the {field})")]
    MissingColumn { field: Field, name: String },

    #[error("Cannot read {}: {reason}", path.display())]
    UnreadableInput { path: PathBuf, reason: String },

    #[error(
        "Number of columns in {} ({found}) is less than required by the specified index {max_index}",
        path.display()
    )]
    ColumnCountMismatch {
        path: PathBuf,
        found: usize,
        max_index: usize,
    },
}

impl ColumnSpec {
    /// Reads the first line of `path` and resolves the layout against it.
    pub fn resolve(
        &self,
        path: &Path,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<ColumnMap, ColumnError> {
        let unreadable = |reason: String| ColumnError::UnreadableInput {
            path: path.to_path_buf(),
            reason,
        };

        let first_line = open_text_source(path)
            .and_then(|mut source| Ok(source.next_line()?.map(str::to_string)))
            .map_err(|e| unreadable(e.to_string()))
            .inspect_err(|e| diagnostics.fail(&e.to_string()))?
            .unwrap_or_default();

        self.resolve_line(&first_line, path, diagnostics)
    }

    /// Resolves against an already-read first line. `source` only labels errors.
    /// Every error is also reported to `diagnostics` as a failure.
    pub fn resolve_line(
        &self,
        first_line: &str,
        source: &Path,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<ColumnMap, ColumnError> {
        self.locate(first_line, source, diagnostics)
            .inspect_err(|e| diagnostics.fail(&e.to_string()))
    }

    fn locate(
        &self,
        first_line: &str,
        source: &Path,
        diagnostics: &mut dyn Diagnostics,
    ) -> Result<ColumnMap, ColumnError> {
        let tokens = self.separator.split(first_line.trim());
        if tokens.is_empty() || tokens.iter().all(|token| token.is_empty()) {
            let reason = if self.by_index {
                "the file has no data".to_string()
            } else {
                "empty header line".to_string()
            };
            return Err(ColumnError::UnreadableInput {
                path: source.to_path_buf(),
                reason,
            });
        }

        let mut slots = [None; 8];
        if self.by_index {
            for field in Field::ALL {
                if let Some(text) = self.names.get(field) {
                    slots[field.slot()] = Some(parse_index(field, text)?);
                }
            }
        } else {
            for field in Field::ALL {
                let Some(name) = self.names.get(field) else {
                    continue;
                };
                match tokens.iter().position(|token| *token == name) {
                    Some(idx) => slots[field.slot()] = Some(idx),
                    None if field.is_mandatory() => {
                        return Err(ColumnError::MissingColumn {
                            field,
                            name: name.to_string(),
                        });
                    }
                    None => diagnostics.warn(&format!(
                        "No {name} column in input data; the {field} will be treated as missing"
                    )),
                }
            }

            let mut seen = AHashSet::with_capacity(tokens.len());
            if !tokens.iter().all(|token| seen.insert(*token)) {
                diagnostics.warn(
                    "Header contains duplicated column names. Only the first occurrence is used; please check the input file",
                );
            }
        }

        let max_index = slots.iter().flatten().copied().max().unwrap_or(0);
        if self.by_index && tokens.len() < max_index + 1 {
            return Err(ColumnError::ColumnCountMismatch {
                path: source.to_path_buf(),
                found: tokens.len(),
                max_index,
            });
        }

        Ok(ColumnMap {
            slots,
            max_index,
            has_header: !self.by_index,
            separator: self.separator,
        })
    }
}

fn parse_index(field: Field, text: &str) -> Result<usize, ColumnError> {
    text.trim()
        .parse::<i64>()
        .ok()
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| ColumnError::InvalidIndex {
            field,
            value: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectedDiagnostics;

    fn header_spec() -> ColumnSpec {
        ColumnSpec::default()
    }

    fn index_spec(chr: &str, reference: &str, statistic: &str, id: &str, p: &str) -> ColumnSpec {
        ColumnSpec {
            names: ColumnNames {
                chr: Some(chr.to_string()),
                reference: reference.to_string(),
                alternate: None,
                statistic: statistic.to_string(),
                id: id.to_string(),
                bp: None,
                se: None,
                p: p.to_string(),
            },
            by_index: true,
            separator: FieldSeparator::Whitespace,
        }
    }

    #[test]
    fn header_names_resolve_to_positions() {
        let mut diag = CollectedDiagnostics::new();
        let map = header_spec()
            .resolve_line("SNP CHR BP A1 A2 OR SE P", Path::new("base"), &mut diag)
            .unwrap();

        assert_eq!(map.get(Field::Id), Some(0));
        assert_eq!(map.get(Field::Chr), Some(1));
        assert_eq!(map.get(Field::Bp), Some(2));
        assert_eq!(map.get(Field::Ref), Some(3));
        assert_eq!(map.get(Field::Alt), Some(4));
        assert_eq!(map.get(Field::Stat), Some(5));
        assert_eq!(map.get(Field::Se), Some(6));
        assert_eq!(map.get(Field::P), Some(7));
        assert_eq!(map.max_index(), 7);
        assert!(map.has_header());
        assert!(diag.warnings.is_empty());
    }

    #[test]
    fn missing_optional_columns_only_warn() {
        let mut diag = CollectedDiagnostics::new();
        let map = header_spec()
            .resolve_line("SNP A1 OR P", Path::new("base"), &mut diag)
            .unwrap();

        assert_eq!(map.get(Field::Chr), None);
        assert_eq!(map.get(Field::Bp), None);
        assert_eq!(map.get(Field::Alt), None);
        assert_eq!(map.get(Field::Se), None);
        assert_eq!(diag.warnings.len(), 4);
        assert!(diag.warned_about("No CHR column"));
    }

    #[test]
    fn missing_mandatory_column_is_fatal() {
        let mut diag = CollectedDiagnostics::new();
        let err = header_spec()
            .resolve_line("SNP CHR BP A1 A2 OR SE", Path::new("base"), &mut diag)
            .unwrap_err();

        match err {
            ColumnError::MissingColumn { field, name } => {
                assert_eq!(field, Field::P);
                assert_eq!(name, "P");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(diag.failures.len(), 1);
        assert!(diag.failures[0].contains("No P column"));
    }

    #[test]
    fn duplicated_headers_warn_and_keep_the_first() {
        let mut diag = CollectedDiagnostics::new();
        let map = header_spec()
            .resolve_line("SNP A1 OR P P", Path::new("base"), &mut diag)
            .unwrap();

        assert_eq!(map.get(Field::P), Some(3));
        assert!(diag.warned_about("duplicated"));
    }

    #[test]
    fn empty_header_is_unreadable() {
        let mut diag = CollectedDiagnostics::new();
        let err = header_spec()
            .resolve_line("   ", Path::new("base"), &mut diag)
            .unwrap_err();
        assert!(matches!(err, ColumnError::UnreadableInput { .. }));
    }

    #[test]
    fn missing_file_is_unreadable_and_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut diag = CollectedDiagnostics::new();

        let err = header_spec()
            .resolve(&dir.path().join("absent.txt"), &mut diag)
            .unwrap_err();

        assert!(matches!(err, ColumnError::UnreadableInput { .. }));
        assert_eq!(diag.failures.len(), 1);
        assert!(diag.failures[0].contains("absent.txt"));
    }

    #[test]
    fn explicit_indices_are_checked_against_the_first_row() {
        let mut diag = CollectedDiagnostics::new();
        let spec = index_spec("0", "2", "3", "1", "4");
        let map = spec
            .resolve_line("1 rs1 A 0.3 0.01", Path::new("base"), &mut diag)
            .unwrap();
        assert_eq!(map.get(Field::P), Some(4));
        assert_eq!(map.get(Field::Alt), None);
        assert!(!map.has_header());

        let err = spec
            .resolve_line("1 rs1 A 0.3", Path::new("base"), &mut diag)
            .unwrap_err();
        assert!(matches!(
            err,
            ColumnError::ColumnCountMismatch {
                found: 4,
                max_index: 4,
                ..
            }
        ));
    }

    #[test]
    fn negative_or_garbage_indices_are_invalid() {
        let mut diag = CollectedDiagnostics::new();
        for bad in ["-1", "two"] {
            let spec = index_spec("0", bad, "3", "1", "4");
            let err = spec
                .resolve_line("1 rs1 A 0.3 0.01", Path::new("base"), &mut diag)
                .unwrap_err();
            assert!(matches!(
                err,
                ColumnError::InvalidIndex {
                    field: Field::Ref,
                    ..
                }
            ));
        }
    }

    #[test]
    fn separators_parse_from_text() {
        assert_eq!(
            "tab".parse::<FieldSeparator>().unwrap(),
            FieldSeparator::Char('\t')
        );
        assert_eq!(
            ",".parse::<FieldSeparator>().unwrap(),
            FieldSeparator::Char(',')
        );
        assert_eq!(
            "whitespace".parse::<FieldSeparator>().unwrap(),
            FieldSeparator::Whitespace
        );
        assert!("::".parse::<FieldSeparator>().is_err());

        let fields = FieldSeparator::Char(',').split("rs1, 1,,0.5");
        assert_eq!(fields, vec!["rs1", "1", "", "0.5"]);
    }
}
