//! End-to-end actions through the workspace

mod common;

use common::{SOURCE_HEADERS, full_upload, session, signed_in, source_row, workbook, workspace};
use madi::config::{ColumnPolicy, Config, CredentialMode, MergePolicy, Persistence};
use madi::login::{DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD, RegisterOutcome, Role};
use madi::normalize::{Upload, WarningKind};
use madi::schema::CellValue;
use madi::query::{Filters, QueryOutcome};
use madi::{MadiError, Workspace};
use tempfile::TempDir;

fn uploads() -> Vec<Upload> {
    vec![full_upload(
        "matriculados.xlsx",
        &[
            source_row(2024, "U1", "P1", "1", "F", 10),
            source_row(2024, "U1", "P1", "1", "M", 5),
            source_row(2024, "U1", "P2", "1", "F", 7),
        ],
    )]
}

#[test]
fn admin_uploads_and_user_queries() {
    let ws = workspace(Config::default());

    let mut admin = session();
    assert_eq!(ws.login(&mut admin, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).unwrap(), Role::Administrator);
    let report = ws.upload(&mut admin, &uploads()).unwrap();
    assert_eq!(report.rows_loaded, 3);

    assert_eq!(ws.register("ana@uni.edu.co", "secreto", Role::User).unwrap(), RegisterOutcome::Accepted);
    let mut user = session();
    ws.login(&mut user, "ana@uni.edu.co", "secreto").unwrap();

    let options = ws.filter_options(&user).unwrap().unwrap();
    assert_eq!(options.programs, vec!["P1", "P2"]);

    match ws.query(&user, &Filters::new(2024, "U1", "P1", "1")).unwrap() {
        QueryOutcome::Matches(result) => {
            assert_eq!(result.rows.len(), 2);
            assert_eq!(result.total_enrolled, 15);
        }
        QueryOutcome::NoData => panic!("expected matches"),
    }
}

#[test]
fn actions_are_gated_by_role() {
    let ws = workspace(Config::default());
    let filters = Filters::new(2024, "U1", "P1", "1");

    let mut anonymous = session();
    assert!(matches!(ws.upload(&mut anonymous, &uploads()), Err(MadiError::NotAuthenticated)));
    assert!(matches!(ws.query(&anonymous, &filters), Err(MadiError::NotAuthenticated)));

    let mut user = signed_in(Role::User);
    assert!(matches!(
        ws.upload(&mut user, &uploads()),
        Err(MadiError::Forbidden(Role::User))
    ));

    let admin = signed_in(Role::Administrator);
    assert!(matches!(
        ws.query(&admin, &filters),
        Err(MadiError::Forbidden(Role::Administrator))
    ));
    assert!(matches!(
        ws.filter_options(&admin),
        Err(MadiError::Forbidden(Role::Administrator))
    ));
}

#[test]
fn failed_login_leaves_session_signed_out() {
    let ws = workspace(Config::default());
    let mut s = session();

    assert!(ws.login(&mut s, DEFAULT_ADMIN_EMAIL, "wrong").is_err());
    assert!(s.identity().is_none());

    ws.login(&mut s, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).unwrap();
    ws.logout(&mut s);
    assert!(s.identity().is_none());
}

#[test]
fn query_before_any_upload_reports_no_data() {
    let ws = workspace(Config::default());
    let user = signed_in(Role::User);

    assert_eq!(ws.filter_options(&user).unwrap(), None);
    assert_eq!(
        ws.query(&user, &Filters::new(2024, "U1", "P1", "1")).unwrap(),
        QueryOutcome::NoData
    );
}

#[test]
fn append_accumulates_and_replace_discards() {
    let append = workspace(Config::default());
    let mut admin = signed_in(Role::Administrator);
    append.upload(&mut admin, &uploads()).unwrap();
    append.upload(&mut admin, &uploads()).unwrap();
    assert_eq!(append.table(&admin).unwrap().len(), 6);

    let replace = workspace(Config {
        merge: MergePolicy::Replace,
        ..Config::default()
    });
    replace.upload(&mut admin, &uploads()).unwrap();
    replace
        .upload(
            &mut admin,
            &[full_upload("nuevo.xlsx", &[source_row(2025, "U9", "P9", "2", "M", 1)])],
        )
        .unwrap();
    let table = replace.table(&admin).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0].year, 2025);
}

#[test]
fn rejected_upload_leaves_stored_table_alone() {
    let ws = workspace(Config {
        columns: ColumnPolicy::Strict,
        merge: MergePolicy::Replace,
        ..Config::default()
    });
    let mut admin = signed_in(Role::Administrator);
    ws.upload(&mut admin, &uploads()).unwrap();

    let bad = Upload::new("incompleto.csv", b"A\xc3\x91O,SEXO\n2024,F\n".to_vec());
    let err = ws.upload(&mut admin, &[bad]).unwrap_err();

    assert!(matches!(err, MadiError::NoBatches(_)));
    assert_eq!(ws.table(&admin).unwrap().len(), 3);
}

#[test]
fn filter_options_follow_new_uploads() {
    let ws = workspace(Config::default());
    let mut admin = signed_in(Role::Administrator);
    let user = signed_in(Role::User);

    ws.upload(&mut admin, &uploads()).unwrap();
    let before = ws.filter_options(&user).unwrap().unwrap();
    assert_eq!(before.years, vec![2024]);
    assert_eq!(before.institutions, vec!["U1"]);

    ws.upload(
        &mut admin,
        &[full_upload("nuevo.xlsx", &[source_row(2025, "U2", "P1", "1", "F", 4)])],
    )
    .unwrap();
    let after = ws.filter_options(&user).unwrap().unwrap();
    assert_eq!(after.years, vec![2024, 2025]);
    assert_eq!(after.institutions, vec!["U1", "U2"]);
}

#[test]
fn upload_stores_only_rows_of_accepted_files() {
    let ws = workspace(Config::default());
    let mut admin = signed_in(Role::Administrator);

    let partial_headers = [
        SOURCE_HEADERS[0],
        SOURCE_HEADERS[1],
        SOURCE_HEADERS[2],
        SOURCE_HEADERS[3],
        SOURCE_HEADERS[5],
    ];
    let partial = Upload::new(
        "parcial.xlsx",
        workbook(
            &partial_headers,
            &[vec![
                CellValue::Int(2023),
                "U1".into(),
                "P1".into(),
                "1".into(),
                CellValue::Int(9),
            ]],
        ),
    );
    let sparse = Upload::new(
        "escaso.xlsx",
        workbook(&["AÑO", "SEXO"], &[vec![CellValue::Int(2023), "M".into()]]),
    );

    let report = ws.upload(&mut admin, &[partial, sparse]).unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::Schema);
    assert_eq!(report.warnings[0].file, "escaso.xlsx");

    let table = ws.table(&admin).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0].enrolled, 9);
    assert_eq!(table.records()[0].sex, None);
}

#[test]
fn empty_accepted_upload_keeps_replaced_table() {
    let ws = workspace(Config {
        merge: MergePolicy::Replace,
        ..Config::default()
    });
    let mut admin = signed_in(Role::Administrator);
    ws.upload(&mut admin, &uploads()).unwrap();

    let empty = Upload::new("vacio.xlsx", workbook(&SOURCE_HEADERS, &[]));
    let report = ws.upload(&mut admin, &[empty]).unwrap();

    assert_eq!(report.rows_loaded, 0);
    assert_eq!(ws.table(&admin).unwrap().len(), 3);
}

#[test]
fn durable_table_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        db_path: dir.path().join("madi.db"),
        credentials: CredentialMode::Plaintext,
        ..Config::default()
    };

    {
        let ws = Workspace::open(config.clone()).unwrap();
        let mut admin = session();
        ws.login(&mut admin, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).unwrap();
        ws.upload(&mut admin, &uploads()).unwrap();
    }

    let ws = Workspace::open(config).unwrap();
    let user = signed_in(Role::User);
    assert_eq!(ws.table(&user).unwrap().len(), 3);
    assert_eq!(ws.table(&user).unwrap().records()[2].program, "P2");
}

#[test]
fn session_table_is_private_and_survives_logout() {
    let ws = workspace(Config {
        persistence: Persistence::Session,
        ..Config::default()
    });

    let mut browser = session();
    ws.login(&mut browser, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).unwrap();
    ws.upload(&mut browser, &uploads()).unwrap();
    ws.logout(&mut browser);

    ws.register("ana@uni.edu.co", "secreto", Role::User).unwrap();
    ws.login(&mut browser, "ana@uni.edu.co", "secreto").unwrap();
    assert!(ws.filter_options(&browser).unwrap().is_some());

    let other = signed_in(Role::User);
    assert_eq!(
        ws.query(&other, &Filters::new(2024, "U1", "P1", "1")).unwrap(),
        QueryOutcome::NoData
    );
}

#[test]
fn invalid_configuration_is_refused() {
    let config = Config {
        columns: ColumnPolicy::Lenient { min_columns: 0 },
        persistence: Persistence::Session,
        ..Config::default()
    };
    assert!(matches!(Workspace::open(config), Err(MadiError::Config(_))));
}
