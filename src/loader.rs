use calamine::{Data, Reader, open_workbook_auto_from_rs};
use csv::ReaderBuilder;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::error::{MadiError, Result};
use crate::schema::{CellValue, RawTable};

/// Load an uploaded file from its name and contents
///
/// The extension of `name` picks the reader: spreadsheet workbooks go
/// through calamine (first sheet only), `.csv` through the csv reader.
/// In both cases the first row is the header row.
///
/// # Arguments
/// * `name` - Original file name, used for dispatch and in error messages
/// * `bytes` - File contents
///
/// # Returns
/// * `Result<RawTable>` - The parsed table or a `MadiError::Read` naming the file
///
/// # Examples
/// ```no_run
/// use madi::loader::load_upload;
///
/// let bytes = std::fs::read("matriculados_2023.xlsx").unwrap();
/// match load_upload("matriculados_2023.xlsx", &bytes) {
///     Ok(table) => println!("{} rows", table.rows.len()),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
pub fn load_upload(name: &str, bytes: &[u8]) -> Result<RawTable> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(name, bytes),
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => from_workbook(name, bytes),
        Some(ext) => Err(read_error(name, format!("unsupported file extension: {}", ext))),
        None => Err(read_error(name, "file has no extension")),
    }
}

/// Load a file from disk, see [`load_upload`]
pub fn load_path(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path).map_err(|e| read_error(&name, e.to_string()))?;
    load_upload(&name, &bytes)
}

fn read_error(file: &str, reason: impl Into<String>) -> MadiError {
    MadiError::Read {
        file: file.to_string(),
        reason: reason.into(),
    }
}

fn from_workbook(name: &str, bytes: &[u8]) -> Result<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| read_error(name, e.to_string()))?;

    // Get the first worksheet
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| read_error(name, "no sheets found in workbook"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| read_error(name, e.to_string()))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header) => header.iter().map(|cell| cell_from_data(cell).to_string()).collect(),
        None => return Err(read_error(name, "sheet is empty")),
    };

    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    Ok(RawTable::new(name, headers, rows))
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        // Dates, durations and error cells are kept as their display text
        other => CellValue::Text(other.to_string()),
    }
}

fn from_csv(name: &str, bytes: &[u8]) -> Result<RawTable> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);

    // Quoted fields may span lines, so records are split by the reader
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| read_error(name, e.to_string()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        records.push(record);
    }

    let mut records = records.into_iter();
    let headers = match records.next() {
        Some(record) => record.iter().map(str::to_string).collect(),
        None => return Err(read_error(name, "CSV file is empty")),
    };

    let rows = records
        .map(|record| record.iter().map(cell_from_text).collect())
        .collect();

    Ok(RawTable::new(name, headers, rows))
}

// Numbers are typed the way a workbook would have typed them
fn cell_from_text(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        CellValue::Empty
    } else if let Ok(i) = trimmed.parse::<i64>() {
        CellValue::Int(i)
    } else if let Ok(f) = trimmed.parse::<f64>() {
        CellValue::Float(f)
    } else {
        CellValue::Text(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_handles_quoted_commas_and_quotes() {
        let raw = from_csv("a.csv", "A,B,C,D\n2024,\"UNIVERSIDAD, SEDE NORTE\",\"dice \"\"hola\"\"\",1\n".as_bytes()).unwrap();
        assert_eq!(raw.headers, vec!["A", "B", "C", "D"]);
        assert_eq!(
            raw.rows[0],
            vec![
                CellValue::Int(2024),
                CellValue::Text("UNIVERSIDAD, SEDE NORTE".into()),
                CellValue::Text(r#"dice "hola""#.into()),
                CellValue::Int(1),
            ]
        );
    }

    #[test]
    fn csv_quoted_field_may_span_lines() {
        let text = "A,B,C\n2020,\"Universidad\nde los Andes\",30\n\n2021,UNAL,12\n";
        let raw = from_csv("multi.csv", text.as_bytes()).unwrap();
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.rows[0][1], CellValue::Text("Universidad\nde los Andes".into()));
        assert_eq!(raw.rows[1][2], CellValue::Int(12));
    }

    #[test]
    fn csv_with_byte_order_mark_keeps_clean_headers() {
        let raw = from_csv("bom.csv", "\u{feff}AÑO,SEXO\n2024,F\n".as_bytes()).unwrap();
        assert_eq!(raw.headers, vec!["AÑO", "SEXO"]);
    }

    #[test]
    fn empty_csv_is_a_read_error() {
        assert!(matches!(from_csv("vacio.csv", b"\n\n"), Err(MadiError::Read { .. })));
    }

    #[test]
    fn csv_cells_are_typed() {
        assert_eq!(cell_from_text("12"), CellValue::Int(12));
        assert_eq!(cell_from_text("1.5"), CellValue::Float(1.5));
        assert_eq!(cell_from_text("  "), CellValue::Empty);
        assert_eq!(cell_from_text("UNAL"), CellValue::Text("UNAL".into()));
    }

    #[test]
    fn unknown_extension_is_a_read_error() {
        let err = load_upload("notas.txt", b"a,b").unwrap_err();
        assert!(matches!(err, MadiError::Read { ref file, .. } if file == "notas.txt"));
    }
}
