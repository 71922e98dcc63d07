//! Ingestion normalizer.
//!
//! Turns uploaded tables with loosely named headers into batches keyed by
//! [`CanonicalField`], then consolidates the batches into a typed
//! [`ConsolidatedTable`]. A file that cannot be read or that lacks required
//! columns produces a [`FileWarning`] and never stops its sibling files.

use lazy_static::lazy_static;
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::ColumnPolicy;
use crate::error::{MadiError, Result};
use crate::loader;
use crate::schema::{CanonicalField, CellValue, ConsolidatedTable, EnrollmentRecord, RawTable};

/// Rows shown back to the administrator after an upload
pub const PREVIEW_ROWS: usize = 5;

lazy_static! {
    // Both the workbook header and the canonical name map to the field, so an
    // already normalized table normalizes to itself.
    static ref HEADER_ALIASES: HashMap<String, CanonicalField> = {
        let mut aliases = HashMap::new();
        for field in CanonicalField::ALL {
            aliases.insert(field.source_header().to_string(), field);
            aliases.insert(field.name().to_uppercase(), field);
        }
        aliases
    };
}

/// One row of a batch. A field absent from the map is missing, which is
/// distinct from a present but empty cell.
pub type NormalizedRow = BTreeMap<CanonicalField, CellValue>;

/// The normalized output of one uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub source: String,
    /// Fields present in this batch, in canonical order
    pub schema: Vec<CanonicalField>,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedBatch {
    /// Render the batch back into a raw table with canonical headers
    pub fn to_raw_table(&self) -> RawTable {
        let headers = self.schema.iter().map(|f| f.name().to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                self.schema
                    .iter()
                    .map(|f| row.get(f).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        RawTable::new(self.source.clone(), headers, rows)
    }
}

/// A file that was uploaded as raw bytes
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Why one file of an upload was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The file could not be read or parsed
    Read,
    /// Too few of the required columns were found
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub file: String,
    pub kind: WarningKind,
    pub message: String,
}

/// A file whose batch made it into the consolidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedFile {
    pub file: String,
    pub columns: Vec<CanonicalField>,
    pub rows: usize,
}

/// What happened to each file of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct IngestionReport {
    pub accepted: Vec<AcceptedFile>,
    pub warnings: Vec<FileWarning>,
    /// Records that passed validation
    pub rows_loaded: usize,
    /// Rows dropped for lacking a required value
    pub rows_dropped: usize,
    pub preview: Vec<EnrollmentRecord>,
}

impl IngestionReport {
    /// One line per file, for display and for the total-failure error
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .accepted
            .iter()
            .map(|a| format!("'{}': {} rows accepted", a.file, a.rows))
            .collect();
        lines.extend(self.warnings.iter().map(|w| w.message.clone()));
        if self.rows_dropped > 0 {
            lines.push(format!(
                "{} rows dropped for missing required values",
                self.rows_dropped
            ));
        }
        lines.join("; ")
    }
}

/// Result of a successful ingestion: the table to merge plus the report
#[derive(Debug, Clone, PartialEq)]
pub struct Ingestion {
    pub table: ConsolidatedTable,
    pub report: IngestionReport,
}

/// Canonicalize a header for matching: trimmed and uppercased
pub fn canonical_header(header: &str) -> String {
    header.trim().to_uppercase()
}

/// Locate each canonical field among `headers`; the first matching header wins
pub fn match_columns(headers: &[String]) -> BTreeMap<CanonicalField, usize> {
    let mut matched = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some(field) = HEADER_ALIASES.get(&canonical_header(header)) {
            matched.entry(*field).or_insert(idx);
        }
    }
    matched
}

/// Normalize one raw table into a batch
///
/// Headers are matched case- and whitespace-insensitively against the
/// required columns, the matched columns are projected and renamed to their
/// canonical names. Values are carried over untouched.
///
/// # Errors
/// * `MadiError::SchemaMismatch` naming the missing columns when the policy
///   is not satisfied
pub fn normalize(raw: &RawTable, policy: ColumnPolicy) -> Result<NormalizedBatch> {
    let matched = match_columns(&raw.headers);
    let required = CanonicalField::ALL.len();

    let accepted = match policy {
        ColumnPolicy::Strict => matched.len() == required,
        ColumnPolicy::Lenient { min_columns } => matched.len() >= min_columns,
    };

    if !accepted {
        let missing = CanonicalField::ALL
            .iter()
            .filter(|f| !matched.contains_key(*f))
            .map(|f| f.source_header().to_string())
            .collect();
        return Err(MadiError::SchemaMismatch {
            file: raw.name.clone(),
            missing,
            found: matched.len(),
            required,
        });
    }

    let rows = raw
        .rows
        .iter()
        .map(|row| {
            matched
                .iter()
                .map(|(field, idx)| (*field, row.get(*idx).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    Ok(NormalizedBatch {
        source: raw.name.clone(),
        schema: matched.keys().copied().collect(),
        rows,
    })
}

/// Concatenation of several batches under the union of their schemas
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Consolidation {
    pub schema: Vec<CanonicalField>,
    pub rows: Vec<NormalizedRow>,
}

impl Consolidation {
    /// Convert to typed records, returning the table and the number of rows dropped
    pub fn into_table(self) -> (ConsolidatedTable, usize) {
        let mut table = ConsolidatedTable::new();
        let mut dropped = 0;
        for row in &self.rows {
            match EnrollmentRecord::from_fields(|f| row.get(&f).cloned()) {
                Some(record) => table.push(record),
                None => dropped += 1,
            }
        }
        (table, dropped)
    }
}

/// Concatenate batches in order; fields missing from a batch stay missing
pub fn consolidate(batches: &[NormalizedBatch]) -> Consolidation {
    let schema: BTreeSet<CanonicalField> = batches
        .iter()
        .flat_map(|b| b.schema.iter().copied())
        .collect();

    Consolidation {
        schema: schema.into_iter().collect(),
        rows: batches.iter().flat_map(|b| b.rows.iter().cloned()).collect(),
    }
}

/// Normalize uploaded files and consolidate the ones that pass
///
/// Each file is loaded and normalized on its own; failures become warnings.
///
/// # Errors
/// * `MadiError::NoBatches` with a per-file summary when every file was
///   rejected. Accepted files without usable rows give an empty table instead.
pub fn ingest(uploads: &[Upload], policy: ColumnPolicy) -> Result<Ingestion> {
    ingest_tables(
        uploads.iter().map(|u| loader::load_upload(&u.name, &u.bytes)),
        policy,
    )
}

/// Same as [`ingest`] for tables that were already loaded (or failed to)
pub fn ingest_tables(
    tables: impl IntoIterator<Item = Result<RawTable>>,
    policy: ColumnPolicy,
) -> Result<Ingestion> {
    let mut report = IngestionReport::default();
    let mut batches = Vec::new();

    for table in tables {
        let outcome = table.and_then(|raw| normalize(&raw, policy));
        match outcome {
            Ok(batch) => {
                info!(
                    "accepted '{}' with {} rows and columns {:?}",
                    batch.source,
                    batch.rows.len(),
                    batch.schema
                );
                report.accepted.push(AcceptedFile {
                    file: batch.source.clone(),
                    columns: batch.schema.clone(),
                    rows: batch.rows.len(),
                });
                batches.push(batch);
            }
            Err(err) => {
                let warning = file_warning(err);
                warn!("{}", warning.message);
                report.warnings.push(warning);
            }
        }
    }

    let (table, dropped) = consolidate(&batches).into_table();
    report.rows_loaded = table.len();
    report.rows_dropped = dropped;
    report.preview = table.preview(PREVIEW_ROWS).to_vec();

    if report.accepted.is_empty() {
        return Err(MadiError::NoBatches(report.summary()));
    }

    info!(
        "consolidated {} rows from {} files ({} dropped, {} files rejected)",
        report.rows_loaded,
        report.accepted.len(),
        report.rows_dropped,
        report.warnings.len()
    );
    Ok(Ingestion { table, report })
}

fn file_warning(err: MadiError) -> FileWarning {
    match err {
        MadiError::Read { ref file, .. } => FileWarning {
            file: file.clone(),
            kind: WarningKind::Read,
            message: err.to_string(),
        },
        MadiError::SchemaMismatch { ref file, .. } => FileWarning {
            file: file.clone(),
            kind: WarningKind::Schema,
            message: err.to_string(),
        },
        other => FileWarning {
            file: String::new(),
            kind: WarningKind::Read,
            message: other.to_string(),
        },
    }
}
