#![cfg(not(tarpaulin_include))]

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::info;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::downloader;
use crate::error::{MadiError, Result};
use crate::login::{RegisterOutcome, RejectReason, Role};
use crate::normalize::{IngestionReport, Upload};
use crate::query::{FilterOptions, Filters, QueryOutcome, QueryResult, format_total};
use crate::schema::{CanonicalField, EnrollmentRecord};
use crate::session::{Session, SessionRegistry, SharedSession};
use crate::workspace::{Workspace, require_role};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "madi_session";

/// Shared state behind every handler
pub struct AppState {
    pub workspace: Workspace,
    sessions: Mutex<SessionRegistry>,
}

impl AppState {
    pub fn new(workspace: Workspace) -> Self {
        let ttl = workspace.config().session_ttl;
        Self {
            workspace,
            sessions: Mutex::new(SessionRegistry::new(ttl)),
        }
    }

    /// The caller's session, starting one if the cookie is missing or stale
    fn session_for(&self, jar: CookieJar) -> Result<(CookieJar, SharedSession)> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| MadiError::Internal("session registry lock poisoned".into()))?;

        if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
            if let Some(session) = sessions.get(&id) {
                return Ok((jar, session));
            }
        }

        let id = sessions.create();
        let session = sessions
            .get(&id)
            .ok_or_else(|| MadiError::Internal("session vanished".into()))?;
        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true);
        Ok((jar.add(cookie), session))
    }
}

/// Run `f` on the caller's session on the blocking pool
///
/// Password hashing and workbook parsing stay off the async workers. Only the
/// caller's own session is locked while `f` runs.
async fn with_session<R, F>(state: &Arc<AppState>, jar: CookieJar, f: F) -> Result<(CookieJar, R)>
where
    F: FnOnce(&AppState, &mut Session) -> R + Send + 'static,
    R: Send + 'static,
{
    let (jar, session) = state.session_for(jar)?;
    let state = Arc::clone(state);

    let output = tokio::task::spawn_blocking(move || -> Result<R> {
        let mut session = session
            .lock()
            .map_err(|_| MadiError::Internal("session lock poisoned".into()))?;
        Ok(f(&*state, &mut *session))
    })
    .await
    .map_err(|e| MadiError::Internal(format!("session task failed: {}", e)))??;

    Ok((jar, output))
}

/// Start the web server with the given configuration
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let workspace = Workspace::open(config)?;
    let state = Arc::new(AppState::new(workspace));

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.workspace.config().upload_limit;

    Router::new()
        .route("/", get(serve_login_page))
        .route("/login", post(handle_login))
        .route("/register", post(handle_register))
        .route("/logout", get(handle_logout))
        .route("/admin", get(serve_admin_page))
        .route("/admin/upload", post(handle_upload))
        .route("/api/upload", post(handle_api_upload))
        .route("/query", get(serve_query_page))
        .route("/query/export.csv", get(export_csv))
        .route("/query/export.xlsx", get(export_xlsx))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .with_state(state)
}

impl IntoResponse for MadiError {
    fn into_response(self) -> Response {
        let status = match &self {
            MadiError::NotAuthenticated => return Redirect::to("/").into_response(),
            MadiError::Auth(_) => StatusCode::UNAUTHORIZED,
            MadiError::Forbidden(_) => StatusCode::FORBIDDEN,
            MadiError::Read { .. }
            | MadiError::SchemaMismatch { .. }
            | MadiError::NoBatches(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageMessage {
    error: Option<String>,
    success: Option<String>,
}

impl PageMessage {
    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(error) = &self.error {
            out.push_str(&format!("<p class=\"error\">{}</p>", escape_html(error)));
        }
        if let Some(success) = &self.success {
            out.push_str(&format!("<p class=\"success\">{}</p>", escape_html(success)));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterForm {
    email: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    year: Option<i64>,
    institution: Option<String>,
    program: Option<String>,
    semester: Option<String>,
}

impl FilterQuery {
    /// The chosen filters, falling back to the first option of each selector
    fn resolve(self, options: &FilterOptions) -> Option<Filters> {
        match (self.year, self.institution, self.program, self.semester) {
            (Some(year), Some(institution), Some(program), Some(semester)) => {
                Some(Filters::new(year, institution, program, semester))
            }
            _ => options.first_choice(),
        }
    }
}

fn redirect_with(path: &str, key: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", path, key, urlencoding::encode(message)))
}

async fn serve_login_page(Query(message): Query<PageMessage>) -> Html<String> {
    Html(include_str!("./static/login.html").replace("{{MESSAGE}}", &message.render()))
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let outcome = with_session(&state, jar, move |state: &AppState, session: &mut Session| {
        state.workspace.login(session, &form.email, &form.password)
    })
    .await;

    match outcome {
        Ok((jar, Ok(Role::Administrator))) => (jar, Redirect::to("/admin")).into_response(),
        Ok((jar, Ok(Role::User))) => (jar, Redirect::to("/query")).into_response(),
        Ok((jar, Err(e))) => (jar, redirect_with("/", "error", &e.to_string())).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Response {
    let role = match form.role.as_deref().map(str::parse::<Role>).transpose() {
        Ok(role) => role.unwrap_or(Role::User),
        Err(e) => return redirect_with("/", "error", &e.to_string()).into_response(),
    };

    match state.workspace.register(&form.email, &form.password, role) {
        Ok(RegisterOutcome::Accepted) => {
            redirect_with("/", "success", "Registration complete. You can sign in now.")
                .into_response()
        }
        Ok(RegisterOutcome::DuplicateEmail) => {
            redirect_with("/", "error", "This email is already registered.").into_response()
        }
        Ok(RegisterOutcome::Rejected(RejectReason::EmptyFields)) => {
            redirect_with("/", "error", "Please fill in every field.").into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let outcome = with_session(&state, jar, |state: &AppState, session: &mut Session| {
        state.workspace.logout(session)
    })
    .await;

    match outcome {
        Ok((jar, ())) => (jar, Redirect::to("/")).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn serve_admin_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(message): Query<PageMessage>,
) -> Response {
    let outcome = with_session(&state, jar, |_: &AppState, session: &mut Session| {
        require_role(session, Role::Administrator).map(|identity| identity.email.clone())
    })
    .await;

    match outcome {
        Ok((jar, Ok(email))) => (jar, render_admin(&email, &message.render(), "")).into_response(),
        Ok((jar, Err(e))) => (jar, e).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MadiError::Internal(format!("malformed upload: {}", e)))?
    {
        let name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        let bytes = field.bytes().await.map_err(|e| MadiError::Read {
            file: name.clone(),
            reason: e.to_string(),
        })?;
        uploads.push(Upload::new(name, bytes.to_vec()));
    }

    Ok(uploads)
}

/// The administrator's email and the upload outcome
type UploadPage = (String, Result<IngestionReport>);

async fn upload_for_session(
    state: &Arc<AppState>,
    jar: CookieJar,
    uploads: Vec<Upload>,
) -> Result<(CookieJar, Result<UploadPage>)> {
    let run = move |state: &AppState, session: &mut Session| -> Result<UploadPage> {
        let email = require_role(session, Role::Administrator)?.email.clone();
        Ok((email, state.workspace.upload(session, &uploads)))
    };
    with_session(state, jar, run).await
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let uploads = match read_uploads(multipart).await {
        Ok(uploads) => uploads,
        Err(e) => return e.into_response(),
    };

    if uploads.is_empty() {
        return redirect_with("/admin", "error", "Choose at least one file to upload.")
            .into_response();
    }

    match upload_for_session(&state, jar, uploads).await {
        Ok((jar, Ok((email, Ok(report))))) => {
            let message = if report.rows_loaded == 0 {
                "<p class=\"warning\">The files were accepted but held no usable rows.</p>"
            } else {
                "<p class=\"success\">Data loaded successfully.</p>"
            };
            (jar, render_admin(&email, message, &render_report(&report))).into_response()
        }
        Ok((jar, Ok((email, Err(e))))) => {
            let message = format!("<p class=\"error\">{}</p>", escape_html(&e.to_string()));
            (jar, render_admin(&email, &message, "")).into_response()
        }
        Ok((jar, Err(e))) => (jar, e).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_api_upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let uploads = match read_uploads(multipart).await {
        Ok(uploads) => uploads,
        Err(e) => return e.into_response(),
    };

    match upload_for_session(&state, jar, uploads).await {
        Ok((jar, Ok((_, Ok(report))))) => (jar, Json(report)).into_response(),
        Ok((jar, Ok((_, Err(e))))) | Ok((jar, Err(e))) => (jar, e).into_response(),
        Err(e) => e.into_response(),
    }
}

/// The user's email with the selector options and query outcome, `None` when no data is loaded
type QueryPage = (String, Option<(FilterOptions, QueryOutcome)>);

async fn query_for_session(
    state: &Arc<AppState>,
    jar: CookieJar,
    params: FilterQuery,
) -> Result<(CookieJar, Result<QueryPage>)> {
    let run = move |state: &AppState, session: &mut Session| -> Result<QueryPage> {
        let email = require_role(session, Role::User)?.email.clone();
        let Some(options) = state.workspace.filter_options(session)? else {
            return Ok((email, None));
        };
        let outcome = match params.resolve(&options) {
            Some(filters) => state.workspace.query(session, &filters)?,
            None => QueryOutcome::NoData,
        };
        Ok((email, Some((options, outcome))))
    };
    with_session(state, jar, run).await
}

async fn serve_query_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<FilterQuery>,
) -> Response {
    match query_for_session(&state, jar, params).await {
        Ok((jar, Ok((email, data)))) => {
            let (filters, results) = match data {
                None => (
                    String::new(),
                    "<p class=\"info\">No data available yet.</p>".to_string(),
                ),
                Some((options, QueryOutcome::Matches(result))) => {
                    (render_filters(&options, Some(&result.filters)), render_results(&result))
                }
                Some((options, QueryOutcome::NoData)) => (
                    render_filters(&options, None),
                    "<p class=\"info\">No data available yet.</p>".to_string(),
                ),
            };
            let page = include_str!("./static/query.html")
                .replace("{{USER}}", &escape_html(&email))
                .replace("{{FILTERS}}", &filters)
                .replace("{{RESULTS}}", &results);
            (jar, Html(page)).into_response()
        }
        Ok((jar, Err(e))) => (jar, e).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn export_result(
    state: &Arc<AppState>,
    jar: CookieJar,
    params: FilterQuery,
) -> Result<(CookieJar, QueryResult)> {
    let (jar, outcome) = query_for_session(state, jar, params).await?;
    match outcome? {
        (_, Some((_, QueryOutcome::Matches(result)))) => Ok((jar, result)),
        _ => Err(MadiError::NoBatches("no data available yet".into())),
    }
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<FilterQuery>,
) -> Response {
    match export_result(&state, jar, params).await {
        Ok((jar, result)) => (
            jar,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"enrollment.csv\""),
            ],
            downloader::to_csv(&result),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<FilterQuery>,
) -> Response {
    let bytes = export_result(&state, jar, params)
        .await
        .and_then(|(jar, result)| Ok((jar, downloader::to_xlsx(&result)?)));

    match bytes {
        Ok((jar, bytes)) => (
            jar,
            [
                (
                    header::CONTENT_TYPE,
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"enrollment.xlsx\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn render_admin(email: &str, message: &str, report: &str) -> Html<String> {
    Html(
        include_str!("./static/admin.html")
            .replace("{{USER}}", &escape_html(email))
            .replace("{{MESSAGE}}", message)
            .replace("{{REPORT}}", report),
    )
}

fn render_report(report: &IngestionReport) -> String {
    let mut out = String::new();
    for warning in &report.warnings {
        out.push_str(&format!(
            "<p class=\"warning\">{}</p>",
            escape_html(&warning.message)
        ));
    }
    if report.rows_dropped > 0 {
        out.push_str(&format!(
            "<p class=\"warning\">{} rows were skipped for missing required values.</p>",
            report.rows_dropped
        ));
    }
    out.push_str(&format!(
        "<p>{} rows loaded from {} file(s).</p>",
        report.rows_loaded,
        report.accepted.len()
    ));
    out.push_str(&render_records(&report.preview));
    out
}

fn render_filters(options: &FilterOptions, chosen: Option<&Filters>) -> String {
    let years: Vec<String> = options.years.iter().map(i64::to_string).collect();
    let chosen_year = chosen.map(|f| f.year.to_string());

    format!(
        "<form method=\"get\" action=\"/query\">{}{}{}{}<div><button type=\"submit\">Search</button></div></form>",
        render_select("year", "Year", &years, chosen_year.as_deref()),
        render_select(
            "institution",
            "Institution",
            &options.institutions,
            chosen.map(|f| f.institution.as_str())
        ),
        render_select("program", "Program", &options.programs, chosen.map(|f| f.program.as_str())),
        render_select(
            "semester",
            "Semester",
            &options.semesters,
            chosen.map(|f| f.semester.as_str())
        ),
    )
}

fn render_select(name: &str, label: &str, values: &[String], selected: Option<&str>) -> String {
    let options: String = values
        .iter()
        .map(|value| {
            let marker = if Some(value.as_str()) == selected { " selected" } else { "" };
            let value = escape_html(value);
            format!("<option value=\"{}\"{}>{}</option>", value, marker, value)
        })
        .collect();
    format!(
        "<div><label for=\"{name}\">{label}</label><select id=\"{name}\" name=\"{name}\">{options}</select></div>"
    )
}

fn render_results(result: &QueryResult) -> String {
    if result.is_empty() {
        return "<p class=\"warning\">No results found for the selected filters.</p>".to_string();
    }

    let f = &result.filters;
    let query = format!(
        "year={}&institution={}&program={}&semester={}",
        f.year,
        urlencoding::encode(&f.institution),
        urlencoding::encode(&f.program),
        urlencoding::encode(&f.semester)
    );
    format!(
        "<h4 class=\"total\">Total enrolled: <strong>{}</strong></h4>{}<p><a href=\"/query/export.csv?{q}\">CSV</a> · <a href=\"/query/export.xlsx?{q}\">XLSX</a></p>",
        format_total(result.total_enrolled),
        render_records(&result.rows),
        q = escape_html(&query)
    )
}

fn render_records(records: &[EnrollmentRecord]) -> String {
    let header: String = CanonicalField::ALL
        .iter()
        .map(|f| format!("<th>{}</th>", f.name()))
        .collect();
    let rows: String = records
        .iter()
        .map(|record| {
            let cells: String = CanonicalField::ALL
                .iter()
                .map(|f| format!("<td>{}</td>", escape_html(&record.field(*f).to_string())))
                .collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();
    format!("<table><thead><tr>{}</tr></thead><tbody>{}</tbody></table>", header, rows)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
