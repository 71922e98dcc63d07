//! Ingestion of uploaded workbooks and CSV files

mod common;

use common::{SOURCE_HEADERS, full_upload, source_row, workbook};
use madi::MadiError;
use madi::config::ColumnPolicy;
use madi::loader;
use madi::normalize::{self, Upload, WarningKind};
use madi::schema::{CanonicalField, CellValue, RawTable};

#[test]
fn lenient_upload_accepts_partial_file_and_rejects_the_other() {
    // Five of six columns, sex missing
    let partial = Upload::new(
        "partial.xlsx",
        workbook(
            &SOURCE_HEADERS[..4]
                .iter()
                .chain(std::iter::once(&SOURCE_HEADERS[5]))
                .copied()
                .collect::<Vec<_>>(),
            &[
                vec![
                    CellValue::Int(2023),
                    "Universidad de Antioquia".into(),
                    "Medicina".into(),
                    "1".into(),
                    CellValue::Int(120),
                ],
                vec![
                    CellValue::Int(2023),
                    "Universidad de Antioquia".into(),
                    "Derecho".into(),
                    "2".into(),
                    CellValue::Int(80),
                ],
            ],
        ),
    );
    // Only year and sex
    let sparse = Upload::new(
        "sparse.xlsx",
        workbook(&["AÑO", "SEXO"], &[vec![CellValue::Int(2023), "F".into()]]),
    );

    let ingestion = normalize::ingest(&[partial, sparse], ColumnPolicy::default()).unwrap();

    assert_eq!(ingestion.table.len(), 2);
    assert!(ingestion.table.iter().all(|r| r.sex.is_none()));
    assert_eq!(ingestion.report.accepted.len(), 1);
    assert_eq!(ingestion.report.accepted[0].file, "partial.xlsx");
    assert_eq!(ingestion.report.accepted[0].columns.len(), 5);

    assert_eq!(ingestion.report.warnings.len(), 1);
    let warning = &ingestion.report.warnings[0];
    assert_eq!(warning.file, "sparse.xlsx");
    assert_eq!(warning.kind, WarningKind::Schema);
    assert!(warning.message.contains("sparse.xlsx"));
}

#[test]
fn strict_policy_names_missing_columns() {
    let raw = RawTable::new(
        "faltante.csv",
        SOURCE_HEADERS[..5].iter().map(|h| h.to_string()).collect(),
        vec![],
    );

    let err = normalize::normalize(&raw, ColumnPolicy::Strict).unwrap_err();
    match err {
        MadiError::SchemaMismatch { file, missing, found, required } => {
            assert_eq!(file, "faltante.csv");
            assert_eq!(missing, vec!["MATRICULADOS".to_string()]);
            assert_eq!(found, 5);
            assert_eq!(required, 6);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn projection_keeps_values_and_drops_extra_columns() {
    let raw = RawTable::new(
        "extra.csv",
        vec![
            "CÓDIGO".to_string(),
            " año ".to_string(),
            "Institución de Educación Superior (IES)".to_string(),
            "PROGRAMA ACADÉMICO".to_string(),
            "SEMESTRE".to_string(),
            "MATRICULADOS".to_string(),
        ],
        vec![vec![
            "X-1".into(),
            CellValue::Int(2022),
            "Universidad Nacional".into(),
            "Física".into(),
            CellValue::Int(2),
            CellValue::Int(45),
        ]],
    );

    let batch = normalize::normalize(&raw, ColumnPolicy::default()).unwrap();

    assert_eq!(
        batch.schema,
        vec![
            CanonicalField::Year,
            CanonicalField::Institution,
            CanonicalField::Program,
            CanonicalField::Semester,
            CanonicalField::Enrolled,
        ]
    );
    let row = &batch.rows[0];
    assert_eq!(row.len(), 5);
    assert_eq!(row[&CanonicalField::Year], CellValue::Int(2022));
    assert_eq!(row[&CanonicalField::Institution], CellValue::from("Universidad Nacional"));
    assert_eq!(row[&CanonicalField::Semester], CellValue::Int(2));
    assert_eq!(row[&CanonicalField::Enrolled], CellValue::Int(45));
}

#[test]
fn normalizing_a_normalized_table_changes_nothing() {
    let raw = RawTable::new(
        "datos.csv",
        SOURCE_HEADERS.iter().map(|h| h.to_string()).collect(),
        vec![source_row(2024, "U1", "P1", "1", "M", 10)],
    );

    let once = normalize::normalize(&raw, ColumnPolicy::Strict).unwrap();
    let twice = normalize::normalize(&once.to_raw_table(), ColumnPolicy::Strict).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn unreadable_file_does_not_stop_its_siblings() {
    let broken = Upload::new("roto.xlsx", b"definitely not a zip archive".to_vec());
    let good = full_upload("bueno.xlsx", &[source_row(2024, "U1", "P1", "1", "F", 7)]);

    let ingestion = normalize::ingest(&[broken, good], ColumnPolicy::Strict).unwrap();

    assert_eq!(ingestion.table.len(), 1);
    assert_eq!(ingestion.report.warnings.len(), 1);
    assert_eq!(ingestion.report.warnings[0].kind, WarningKind::Read);
    assert_eq!(ingestion.report.warnings[0].file, "roto.xlsx");
}

#[test]
fn nothing_usable_is_reported_as_no_batches() {
    let sparse = Upload::new(
        "sparse.xlsx",
        workbook(&["AÑO"], &[vec![CellValue::Int(2024)]]),
    );
    let text = Upload::new("notas.txt", b"hola".to_vec());

    let err = normalize::ingest(&[sparse, text], ColumnPolicy::default()).unwrap_err();
    match err {
        MadiError::NoBatches(summary) => {
            assert!(summary.contains("sparse.xlsx"));
            assert!(summary.contains("notas.txt"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn accepted_file_without_rows_is_not_a_failure() {
    let empty = Upload::new("vacio.xlsx", workbook(&SOURCE_HEADERS, &[]));

    let ingestion = normalize::ingest(&[empty], ColumnPolicy::Strict).unwrap();

    assert!(ingestion.table.is_empty());
    assert_eq!(ingestion.report.accepted.len(), 1);
    assert_eq!(ingestion.report.accepted[0].rows, 0);
    assert_eq!(ingestion.report.rows_loaded, 0);
    assert!(ingestion.report.warnings.is_empty());
}

#[test]
fn accepted_file_whose_rows_all_drop_reports_the_count() {
    let upload = full_upload(
        "huecos.xlsx",
        &[vec![
            CellValue::Int(2024),
            "U1".into(),
            CellValue::Empty,
            "1".into(),
            "F".into(),
            CellValue::Int(3),
        ]],
    );

    let ingestion = normalize::ingest(&[upload], ColumnPolicy::Strict).unwrap();

    assert_eq!(ingestion.report.rows_loaded, 0);
    assert_eq!(ingestion.report.rows_dropped, 1);
}

#[test]
fn rows_missing_required_values_are_dropped_and_counted() {
    let upload = full_upload(
        "huecos.xlsx",
        &[
            source_row(2024, "U1", "P1", "1", "F", 10),
            vec![
                CellValue::Int(2024),
                "U1".into(),
                "P1".into(),
                "1".into(),
                "M".into(),
                CellValue::Empty,
            ],
            source_row(2024, "U1", "P2", "2", "M", 5),
        ],
    );

    let ingestion = normalize::ingest(&[upload], ColumnPolicy::Strict).unwrap();

    assert_eq!(ingestion.report.rows_loaded, 2);
    assert_eq!(ingestion.report.rows_dropped, 1);
    assert_eq!(ingestion.report.preview.len(), 2);
    assert_eq!(ingestion.table.records()[1].program, "P2");
}

#[test]
fn workbook_numbers_become_typed_fields() {
    let bytes = workbook(
        &SOURCE_HEADERS,
        &[vec![
            CellValue::Int(2021),
            "Universidad del Valle".into(),
            "Química".into(),
            CellValue::Int(1),
            "F".into(),
            CellValue::Int(1500),
        ]],
    );

    let raw = loader::load_upload("valle.xlsx", &bytes).unwrap();
    assert_eq!(raw.headers, SOURCE_HEADERS.map(String::from).to_vec());

    let ingestion = normalize::ingest_tables([Ok(raw)], ColumnPolicy::Strict).unwrap();
    let record = &ingestion.table.records()[0];
    assert_eq!(record.year, 2021);
    assert_eq!(record.semester, "1");
    assert_eq!(record.sex.as_deref(), Some("F"));
    assert_eq!(record.enrolled, 1500);
}

#[test]
fn csv_and_workbook_uploads_consolidate_in_order() {
    let csv = "AÑO,INSTITUCIÓN DE EDUCACIÓN SUPERIOR (IES),PROGRAMA ACADÉMICO,SEMESTRE,SEXO,MATRICULADOS\n\
               2020,\"Universidad de los Andes, Bogotá\",Economía,1,M,30\n";
    let uploads = [
        full_upload("primero.xlsx", &[source_row(2019, "U1", "P1", "2", "F", 3)]),
        Upload::new("segundo.csv", csv.as_bytes().to_vec()),
    ];

    let ingestion = normalize::ingest(&uploads, ColumnPolicy::Strict).unwrap();

    let years: Vec<i64> = ingestion.table.iter().map(|r| r.year).collect();
    assert_eq!(years, vec![2019, 2020]);
    assert_eq!(
        ingestion.table.records()[1].institution,
        "Universidad de los Andes, Bogotá"
    );
}
