//! Study web server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Prolific gate, or the search page once an ID is set |
//! | `POST` | `/set_prolific` | Store the Prolific ID cookie |
//! | `GET`  | `/results?q=` | Results page with the AI overview |
//! | `POST` | `/api/overview` | Overview and citations as HTML fragments (JSON) |
//! | `GET`  | `/submit?q=` | Conclusion form |
//! | `POST` | `/submit` | Record a conclusion (word-count gated) |
//! | `GET`  | `/thanks` | Confirmation page |
//! | `GET`  | `/local/{*path}` | Corpus files (prefix from `corpus.url_prefix`) |
//! | `GET`/`POST` | `/admin/login` | Admin password form |
//! | `GET`  | `/admin/logout` | Drop admin access |
//! | `GET`  | `/admin/logs`, `/admin/events` | Log tables |
//! | `GET`  | `/admin/{logs,events}/download` | Raw CSV |
//! | `POST` | `/admin/{logs,events}/clear` | Reset a log to its header |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Cookies
//!
//! - `session_id`: random UUID, HttpOnly, issued on first page view.
//! - `prolific_id`: participant ID, 30 days, readable by page scripts.
//! - `admin_access`: per-process random token, HttpOnly, 1 day. Restarting
//!   the server logs every admin out.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use anyhow::Context;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::generation::{create_backend, GenerationBackend};
use crate::models::{Citation, Overview};
use crate::overview::generate_overview;
use crate::pages;
use crate::score::word_count;
use crate::study_log::{EventType, LogKind, StudyLog};

const SESSION_COOKIE: &str = "session_id";
const PROLIFIC_COOKIE: &str = "prolific_id";
const ADMIN_COOKIE: &str = "admin_access";

const DEFAULT_ADMIN_NEXT: &str = "/admin/logs";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    backend: Arc<dyn GenerationBackend>,
    log: Arc<StudyLog>,
    /// Value of the `admin_access` cookie for this process.
    admin_token: Arc<str>,
}

impl AppState {
    /// Opens the study logs and wires in `backend`.
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>) -> anyhow::Result<Self> {
        let log = StudyLog::new(&config.logs.dir)?;
        Ok(Self {
            config: Arc::new(config),
            backend,
            log: Arc::new(log),
            admin_token: Uuid::new_v4().simple().to_string().into(),
        })
    }

    pub fn log(&self) -> &StudyLog {
        &self.log
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let backend = create_backend(&config.generation)?;
    let state = AppState::new(config.clone(), backend)?;
    let app = build_router(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(
        bind = %bind_addr,
        corpus = %config.corpus.dir.display(),
        logs = %config.logs.dir.display(),
        "study server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router. Exposed separately from [`run_server`] so tests can
/// drive it without a socket.
pub fn build_router(state: AppState) -> Router {
    let corpus_prefix = state
        .config
        .corpus
        .url_prefix
        .trim_end_matches('/')
        .to_string();
    let corpus_files = ServeDir::new(&state.config.corpus.dir);

    Router::new()
        .route("/", get(handle_index))
        .route("/set_prolific", post(handle_set_prolific))
        .route("/results", get(handle_results))
        .route("/api/overview", post(handle_api_overview))
        .route("/submit", get(handle_submit_form).post(handle_submit))
        .route("/thanks", get(handle_thanks))
        .route("/admin/login", get(handle_admin_login_form).post(handle_admin_login))
        .route("/admin/logout", get(handle_admin_logout))
        .route("/admin/logs", get(handle_admin_submissions))
        .route("/admin/events", get(handle_admin_events))
        .route("/admin/logs/download", get(handle_download_submissions))
        .route("/admin/events/download", get(handle_download_events))
        .route("/admin/logs/clear", post(handle_clear_submissions))
        .route("/admin/events/clear", post(handle_clear_events))
        .route("/health", get(handle_health))
        .nest_service(&corpus_prefix, corpus_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Cookie helpers ============

fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prolific_id(jar: &CookieJar) -> Option<String> {
    cookie_value(jar, PROLIFIC_COOKIE)
}

/// Returns the session id, issuing a new cookie if there isn't one.
fn ensure_session(jar: CookieJar) -> (CookieJar, String) {
    if let Some(sid) = cookie_value(&jar, SESSION_COOKIE) {
        return (jar, sid);
    }
    let sid = Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, sid.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), sid)
}

/// Who a log row is attributed to: Prolific ID, then session, then a fresh id.
fn participant_id(jar: &CookieJar) -> String {
    prolific_id(jar)
        .or_else(|| cookie_value(jar, SESSION_COOKIE))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn is_admin(state: &AppState, jar: &CookieJar) -> bool {
    jar.get(ADMIN_COOKIE)
        .map(|c| c.value() == &*state.admin_token)
        .unwrap_or(false)
}

fn grant_admin(state: &AppState, jar: CookieJar) -> CookieJar {
    let cookie = Cookie::build((ADMIN_COOKIE, state.admin_token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(1));
    jar.add(cookie)
}

/// Only same-site absolute paths are accepted as post-login targets.
fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_string(),
        _ => DEFAULT_ADMIN_NEXT.to_string(),
    }
}

fn login_redirect(next: &str) -> Response {
    Redirect::to(&format!("/admin/login?next={}", next)).into_response()
}

// ============ Participant pages ============

async fn handle_index(jar: CookieJar) -> Response {
    if prolific_id(&jar).is_none() {
        return Html(pages::prolific_gate(None)).into_response();
    }
    let (jar, _) = ensure_session(jar);
    (jar, Html(pages::index())).into_response()
}

#[derive(Deserialize)]
struct ProlificForm {
    #[serde(default)]
    prolific_id: String,
}

async fn handle_set_prolific(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ProlificForm>,
) -> Result<Response, AppError> {
    let pid = form.prolific_id.trim().to_string();
    if pid.is_empty() {
        return Ok(Html(pages::prolific_gate(Some("Prolific ID is required."))).into_response());
    }

    let cookie = Cookie::build((PROLIFIC_COOKIE, pid.clone()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30));
    let (jar, _) = ensure_session(jar.add(cookie));

    let who = pid.clone();
    with_log(&state, move |log| log.log_event(&who, EventType::ProlificSet, "", &who)).await?;
    tracing::info!(prolific_id = %pid, "participant registered");

    Ok((jar, Redirect::to("/")).into_response())
}

#[derive(Deserialize, Default)]
struct QueryParams {
    #[serde(default)]
    q: String,
}

/// Runs `f` against the study log on the blocking pool. Log access is file
/// I/O under a mutex and must stay off the async workers.
async fn with_log<T, F>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&StudyLog) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let log = Arc::clone(&state.log);
    tokio::task::spawn_blocking(move || f(&log))
        .await
        .context("study log task panicked")?
}

/// Loads the corpus and generates the overview for `query`.
///
/// The directory scan and HTML parsing run on the blocking pool; only the
/// backend call runs on the async worker.
async fn overview_for(state: &AppState, query: &str) -> Result<Overview, AppError> {
    let config = Arc::clone(&state.config);
    let documents = tokio::task::spawn_blocking(move || load_corpus(&config.corpus))
        .await
        .context("corpus loader task panicked")??;
    tracing::debug!(documents = documents.len(), query, "corpus loaded");
    Ok(generate_overview(query, &documents, state.backend.as_ref(), &state.config.overview).await)
}

/// `['title|href', ...]`, the search event's target column.
fn citation_target(citations: &[Citation]) -> String {
    let items: Vec<String> = citations
        .iter()
        .map(|c| format!("'{}|{}'", c.title, c.href))
        .collect();
    format!("[{}]", items.join(", "))
}

async fn log_search(
    state: &AppState,
    who: String,
    query: &str,
    citations: &[Citation],
) -> anyhow::Result<()> {
    let query = query.to_string();
    let target = citation_target(citations);
    with_log(state, move |log| log.log_event(&who, EventType::Search, &query, &target)).await
}

async fn handle_results(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<QueryParams>,
) -> Result<Response, AppError> {
    let query = params.q.trim();
    let overview = overview_for(&state, query).await?;

    let (jar, _) = ensure_session(jar);
    log_search(&state, participant_id(&jar), query, &overview.citations).await?;

    let page = pages::results(query, &overview.text, &overview.citations);
    Ok((jar, Html(page)).into_response())
}

#[derive(Deserialize, Default)]
struct OverviewRequest {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct OverviewFragments {
    overview_html: String,
    citations_html: String,
}

/// Handler for `POST /api/overview`.
///
/// A body that isn't valid JSON is treated as an empty query.
async fn handle_api_overview(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<OverviewRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Some(pid) = prolific_id(&jar) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "prolific_id_required" })),
        )
            .into_response());
    };

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let query = request.q.trim();
    let overview = overview_for(&state, query).await?;

    log_search(&state, pid, query, &overview.citations).await?;

    Ok(Json(OverviewFragments {
        overview_html: pages::overview_fragment(&overview.text),
        citations_html: pages::citations_fragment(&overview.citations, query),
    })
    .into_response())
}

async fn handle_submit_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<QueryParams>,
) -> Response {
    let (jar, _) = ensure_session(jar);
    let page = pages::submit(&params.q, "", state.config.study.min_words, None);
    (jar, Html(page)).into_response()
}

#[derive(Deserialize)]
struct SubmitForm {
    #[serde(default)]
    q: String,
    #[serde(default)]
    conclusion: String,
}

async fn handle_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SubmitForm>,
) -> Result<Response, AppError> {
    let text = form.conclusion.trim();
    let words = word_count(text);
    let min_words = state.config.study.min_words;

    if words < min_words {
        let error = format!("Please write at least {} words.", min_words);
        let page = pages::submit(&form.q, text, min_words, Some(&error));
        return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
    }

    let who = participant_id(&jar);
    let (participant, query, text) = (who.clone(), form.q.clone(), text.to_string());
    with_log(&state, move |log| {
        log.log_submission(&participant, &query, words, &text)?;
        log.log_event(&participant, EventType::Submit, &query, &words.to_string())
    })
    .await?;
    tracing::info!(participant = %who, words, "conclusion submitted");

    Ok(Redirect::to("/thanks").into_response())
}

async fn handle_thanks(jar: CookieJar) -> Response {
    let (jar, _) = ensure_session(jar);
    (jar, Html(pages::thanks())).into_response()
}

// ============ Admin ============

#[derive(Deserialize)]
struct LoginParams {
    next: Option<String>,
}

async fn handle_admin_login_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<LoginParams>,
) -> Response {
    let next = safe_next(params.next.as_deref());
    if is_admin(&state, &jar) {
        return Redirect::to(&next).into_response();
    }
    Html(pages::admin_login(&next, None)).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    password: String,
    next: Option<String>,
}

async fn handle_admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref());
    if form.password.trim() == state.config.admin.password {
        tracing::info!("admin login");
        return (grant_admin(&state, jar), Redirect::to(&next)).into_response();
    }
    tracing::warn!("admin login rejected");
    (
        StatusCode::UNAUTHORIZED,
        Html(pages::admin_login(&next, Some("Wrong password."))),
    )
        .into_response()
}

async fn handle_admin_logout(jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build(ADMIN_COOKIE).path("/"));
    (jar, Redirect::to("/")).into_response()
}

#[derive(Deserialize)]
struct AdminParams {
    pwd: Option<String>,
}

/// Admin URL prefix and page title for a log.
fn admin_paths(kind: LogKind) -> (&'static str, &'static str) {
    match kind {
        LogKind::Submissions => ("/admin/logs", "Submissions Log"),
        LogKind::Events => ("/admin/events", "Events Log"),
    }
}

async fn admin_view(
    state: &AppState,
    jar: CookieJar,
    params: AdminParams,
    kind: LogKind,
) -> Result<Response, AppError> {
    let (base, title) = admin_paths(kind);

    // `?pwd=` grants access, then redirects so the password leaves the URL.
    if params.pwd.as_deref() == Some(state.config.admin.password.as_str()) {
        return Ok((grant_admin(state, jar), Redirect::to(base)).into_response());
    }
    if !is_admin(state, &jar) {
        return Ok(login_redirect(base));
    }

    let rows = with_log(state, move |log| {
        log.ensure_header(kind)?;
        log.read_rows(kind)
    })
    .await?;
    Ok(Html(pages::admin_table(title, &rows, base)).into_response())
}

async fn admin_download(state: &AppState, jar: &CookieJar, kind: LogKind) -> Result<Response, AppError> {
    let (base, _) = admin_paths(kind);
    if !is_admin(state, jar) {
        return Ok(login_redirect(base));
    }

    with_log(state, move |log| log.ensure_header(kind)).await?;
    let path = state.log.path(kind);
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let disposition = format!("attachment; filename=\"{}\"", kind.file_name());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn admin_clear(state: &AppState, jar: &CookieJar, kind: LogKind) -> Result<Response, AppError> {
    let (base, _) = admin_paths(kind);
    if !is_admin(state, jar) {
        return Ok(login_redirect(base));
    }
    with_log(state, move |log| log.clear(kind)).await?;
    tracing::info!(log = kind.file_name(), "log cleared");
    Ok(Redirect::to(base).into_response())
}

async fn handle_admin_submissions(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AdminParams>,
) -> Result<Response, AppError> {
    admin_view(&state, jar, params, LogKind::Submissions).await
}

async fn handle_admin_events(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AdminParams>,
) -> Result<Response, AppError> {
    admin_view(&state, jar, params, LogKind::Events).await
}

async fn handle_download_submissions(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    admin_download(&state, &jar, LogKind::Submissions).await
}

async fn handle_download_events(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    admin_download(&state, &jar, LogKind::Events).await
}

async fn handle_clear_submissions(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    admin_clear(&state, &jar, LogKind::Submissions).await
}

async fn handle_clear_events(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    admin_clear(&state, &jar, LogKind::Events).await
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
