//! Helpers shared by the integration tests

#![allow(dead_code)]

use madi::config::{Config, CredentialMode};
use madi::database::SqliteStore;
use madi::normalize::Upload;
use madi::schema::{CellValue, EnrollmentRecord};
use madi::session::Session;
use madi::{Workspace, login::Role};
use rust_xlsxwriter::Workbook;
use std::time::Duration;

pub const SOURCE_HEADERS: [&str; 6] = [
    "AÑO",
    "INSTITUCIÓN DE EDUCACIÓN SUPERIOR (IES)",
    "PROGRAMA ACADÉMICO",
    "SEMESTRE",
    "SEXO",
    "MATRICULADOS",
];

/// Build an .xlsx workbook in memory with one sheet
pub fn workbook(headers: &[&str], rows: &[Vec<CellValue>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Int(i) => {
                    worksheet.write_number(r, col, *i as f64).unwrap();
                }
                CellValue::Float(f) => {
                    worksheet.write_number(r, col, *f).unwrap();
                }
                CellValue::Text(s) => {
                    worksheet.write_string(r, col, s.as_str()).unwrap();
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(r, col, *b).unwrap();
                }
                CellValue::Empty => {}
            }
        }
    }

    workbook.save_to_buffer().unwrap()
}

/// A full-schema row in workbook column order
pub fn source_row(year: i64, ies: &str, program: &str, semester: &str, sex: &str, enrolled: i64) -> Vec<CellValue> {
    vec![
        CellValue::Int(year),
        CellValue::from(ies),
        CellValue::from(program),
        CellValue::from(semester),
        CellValue::from(sex),
        CellValue::Int(enrolled),
    ]
}

pub fn record(year: i64, institution: &str, program: &str, semester: &str, enrolled: u64) -> EnrollmentRecord {
    EnrollmentRecord {
        year,
        institution: institution.to_string(),
        program: program.to_string(),
        semester: semester.to_string(),
        sex: None,
        enrolled,
    }
}

/// Workspace over an in-memory SQLite database with plaintext credentials
pub fn workspace(config: Config) -> Workspace {
    let config = Config {
        credentials: CredentialMode::Plaintext,
        ..config
    };
    Workspace::with_store(config, Box::new(SqliteStore::open_in_memory().unwrap())).unwrap()
}

pub fn session() -> Session {
    Session::new(Duration::from_secs(60))
}

pub fn signed_in(role: Role) -> Session {
    let mut session = session();
    session.sign_in(format!("{:?}@madi.test", role).to_lowercase(), role);
    session
}

pub fn full_upload(name: &str, rows: &[Vec<CellValue>]) -> Upload {
    Upload::new(name, workbook(&SOURCE_HEADERS, rows))
}
