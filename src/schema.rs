use serde::{Deserialize, Serialize};
use std::fmt;

/// A field of the canonical enrollment schema.
///
/// Declaration order is the column order used everywhere a table is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Year,
    Institution,
    Program,
    Semester,
    Sex,
    Enrolled,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::Year,
        CanonicalField::Institution,
        CanonicalField::Program,
        CanonicalField::Semester,
        CanonicalField::Sex,
        CanonicalField::Enrolled,
    ];

    /// Column header used by the published enrollment workbooks (already uppercased)
    pub fn source_header(self) -> &'static str {
        match self {
            CanonicalField::Year => "AÑO",
            CanonicalField::Institution => "INSTITUCIÓN DE EDUCACIÓN SUPERIOR (IES)",
            CanonicalField::Program => "PROGRAMA ACADÉMICO",
            CanonicalField::Semester => "SEMESTRE",
            CanonicalField::Sex => "SEXO",
            CanonicalField::Enrolled => "MATRICULADOS",
        }
    }

    /// Canonical field name after renaming
    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Year => "year",
            CanonicalField::Institution => "institution",
            CanonicalField::Program => "program",
            CanonicalField::Semester => "semester",
            CanonicalField::Sex => "sex",
            CanonicalField::Enrolled => "enrolled",
        }
    }

    /// Whether a stored record must carry a value for this field
    pub fn required_in_record(self) -> bool {
        !matches!(self, CanonicalField::Sex)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// Empty cells and blank text count as missing
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Integer view: integers, integral floats and numeric text
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) => float_to_integer(*f),
            CellValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_integer))
            }
            CellValue::Empty | CellValue::Bool(_) => None,
        }
    }

    /// Text view, trimmed; integral floats render without a fraction
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) => {
                if f.is_nan() {
                    None
                } else {
                    Some(float_to_integer(*f).map_or_else(|| f.to_string(), |i| i.to_string()))
                }
            }
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }
}

fn float_to_integer(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

/// One uploaded file as read from disk or from a form: a header row plus data rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    /// Source file name, used in warnings
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }
}

/// One row of the consolidated table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub year: i64,
    pub institution: String,
    pub program: String,
    pub semester: String,
    pub sex: Option<String>,
    pub enrolled: u64,
}

impl EnrollmentRecord {
    /// Build a record from a normalized row.
    ///
    /// Returns `None` when any field other than `sex` is missing or does not
    /// convert (non-integer year, negative headcount).
    pub fn from_fields(get: impl Fn(CanonicalField) -> Option<CellValue>) -> Option<Self> {
        let year = get(CanonicalField::Year)?.as_integer()?;
        let institution = get(CanonicalField::Institution)?.as_text()?;
        let program = get(CanonicalField::Program)?.as_text()?;
        let semester = get(CanonicalField::Semester)?.as_text()?;
        let sex = get(CanonicalField::Sex).and_then(|v| v.as_text());
        let enrolled = u64::try_from(get(CanonicalField::Enrolled)?.as_integer()?).ok()?;

        Some(Self {
            year,
            institution,
            program,
            semester,
            sex,
            enrolled,
        })
    }

    /// Value of a field as a cell, for rendering and exporting
    pub fn field(&self, field: CanonicalField) -> CellValue {
        match field {
            CanonicalField::Year => CellValue::Int(self.year),
            CanonicalField::Institution => CellValue::Text(self.institution.clone()),
            CanonicalField::Program => CellValue::Text(self.program.clone()),
            CanonicalField::Semester => CellValue::Text(self.semester.clone()),
            CanonicalField::Sex => self.sex.clone().map_or(CellValue::Empty, CellValue::Text),
            CanonicalField::Enrolled => CellValue::Int(self.enrolled as i64),
        }
    }
}

/// All enrollment records accumulated so far, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsolidatedTable {
    records: Vec<EnrollmentRecord>,
}

impl ConsolidatedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<EnrollmentRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EnrollmentRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnrollmentRecord> {
        self.records.iter()
    }

    pub fn push(&mut self, record: EnrollmentRecord) {
        self.records.push(record);
    }

    /// Append every record of `other`, keeping order
    pub fn extend_from(&mut self, other: &ConsolidatedTable) {
        self.records.extend(other.records.iter().cloned());
    }

    /// First `n` records
    pub fn preview(&self, n: usize) -> &[EnrollmentRecord] {
        &self.records[..n.min(self.records.len())]
    }

    pub fn into_records(self) -> Vec<EnrollmentRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a ConsolidatedTable {
    type Item = &'a EnrollmentRecord;
    type IntoIter = std::slice::Iter<'a, EnrollmentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
