use rust_xlsxwriter::{Format, Workbook};

use crate::error::Result;
use crate::query::QueryResult;
use crate::schema::{CanonicalField, CellValue};

/// Convert query results to CSV format
///
/// The header row holds the canonical field names; values containing commas,
/// quotes or newlines are quoted.
///
/// # Examples
/// ```
/// use madi::downloader::to_csv;
/// use madi::query::{query, Filters, QueryOutcome};
/// use madi::schema::{ConsolidatedTable, EnrollmentRecord};
///
/// let table = ConsolidatedTable::from_records(vec![EnrollmentRecord {
///     year: 2024,
///     institution: "U1".into(),
///     program: "P1".into(),
///     semester: "1".into(),
///     sex: None,
///     enrolled: 10,
/// }]);
/// if let QueryOutcome::Matches(result) = query(&table, &Filters::new(2024, "U1", "P1", "1")) {
///     assert_eq!(to_csv(&result), "year,institution,program,semester,sex,enrolled\n2024,U1,P1,1,,10\n");
/// }
/// ```
pub fn to_csv(result: &QueryResult) -> String {
    let mut csv_content = CanonicalField::ALL
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(",");
    csv_content.push('\n');

    for record in &result.rows {
        let line = CanonicalField::ALL
            .iter()
            .map(|f| escape_csv(&record.field(*f).to_string()))
            .collect::<Vec<_>>()
            .join(",");
        csv_content.push_str(&line);
        csv_content.push('\n');
    }

    csv_content
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert query results to XLSX format
///
/// One worksheet, bold header row, numbers written as numbers.
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
pub fn to_xlsx(result: &QueryResult) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, field) in CanonicalField::ALL.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, field.name(), &bold)?;
    }

    for (r, record) in result.rows.iter().enumerate() {
        let row = (r + 1) as u32;
        for (col, field) in CanonicalField::ALL.iter().enumerate() {
            match record.field(*field) {
                CellValue::Int(i) => {
                    worksheet.write_number(row, col as u16, i as f64)?;
                }
                CellValue::Empty => {}
                other => {
                    worksheet.write_string(row, col as u16, &other.to_string())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
