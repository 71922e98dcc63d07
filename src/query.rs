//! Filter-query engine over the consolidated table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::schema::{ConsolidatedTable, EnrollmentRecord};

/// The four values a user picks before querying
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters {
    pub year: i64,
    pub institution: String,
    pub program: String,
    pub semester: String,
}

impl Filters {
    pub fn new(
        year: i64,
        institution: impl Into<String>,
        program: impl Into<String>,
        semester: impl Into<String>,
    ) -> Self {
        Self {
            year,
            institution: institution.into(),
            program: program.into(),
            semester: semester.into(),
        }
    }

    /// Exact, case-sensitive equality on all four fields
    pub fn matches(&self, record: &EnrollmentRecord) -> bool {
        record.year == self.year
            && record.institution == self.institution
            && record.program == self.program
            && record.semester == self.semester
    }
}

/// Candidate values offered for each selector
///
/// Distinct and ascending. Built from the table on every call so a new upload
/// is reflected immediately.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i64>,
    pub institutions: Vec<String>,
    pub programs: Vec<String>,
    pub semesters: Vec<String>,
}

impl FilterOptions {
    pub fn from_table(table: &ConsolidatedTable) -> Self {
        let mut years = BTreeSet::new();
        let mut institutions = BTreeSet::new();
        let mut programs = BTreeSet::new();
        let mut semesters = BTreeSet::new();

        for record in table {
            years.insert(record.year);
            institutions.insert(record.institution.as_str());
            programs.insert(record.program.as_str());
            semesters.insert(record.semester.as_str());
        }

        Self {
            years: years.into_iter().collect(),
            institutions: institutions.into_iter().map(str::to_string).collect(),
            programs: programs.into_iter().map(str::to_string).collect(),
            semesters: semesters.into_iter().map(str::to_string).collect(),
        }
    }

    /// First value of every selector, used before the user has picked anything
    pub fn first_choice(&self) -> Option<Filters> {
        Some(Filters {
            year: *self.years.first()?,
            institution: self.institutions.first()?.clone(),
            program: self.programs.first()?.clone(),
            semester: self.semesters.first()?.clone(),
        })
    }
}

/// Matching rows and their summed headcount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub filters: Filters,
    /// In their original table order
    pub rows: Vec<EnrollmentRecord>,
    pub total_enrolled: u64,
}

impl QueryResult {
    /// True when no row matched the filters
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Nothing has been uploaded yet
    NoData,
    Matches(QueryResult),
}

/// Run a conjunctive equality filter and sum the headcount of the matches
///
/// The total saturates at `u64::MAX`.
///
/// # Examples
/// ```
/// use madi::query::{query, Filters, QueryOutcome};
/// use madi::schema::ConsolidatedTable;
///
/// let outcome = query(&ConsolidatedTable::new(), &Filters::new(2024, "U1", "P1", "1"));
/// assert_eq!(outcome, QueryOutcome::NoData);
/// ```
pub fn query(table: &ConsolidatedTable, filters: &Filters) -> QueryOutcome {
    if table.is_empty() {
        return QueryOutcome::NoData;
    }

    let rows: Vec<EnrollmentRecord> = table
        .iter()
        .filter(|record| filters.matches(record))
        .cloned()
        .collect();
    // Saturates instead of wrapping on absurdly large headcounts
    let total_enrolled = rows.iter().fold(0u64, |acc, r| acc.saturating_add(r.enrolled));

    QueryOutcome::Matches(QueryResult {
        filters: filters.clone(),
        rows,
        total_enrolled,
    })
}

/// Render a headcount with thousands separators, e.g. `12,345`
pub fn format_total(total: u64) -> String {
    let digits = total.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
