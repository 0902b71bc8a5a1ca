//!
//! practicum HTTP server
//! ---------------------
//! Axum router over the identity and practice layers.
//!
//! Responsibilities:
//! - Resolve a principal for every request (middleware). Resolution never rejects; each
//!   handler decides whether it needs an authenticated caller.
//! - Account and token lifecycle endpoints: signup, login, refresh, logout, withdraw.
//! - Practice session endpoints, each gated by the permission policy before any write.
//! - Background sweeper that drops expired revocation entries.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Settings;
use crate::directory::{MemoryDirectory, OwnershipDirectory};
use crate::error::{AppError, AppResult};
use crate::identity::{
    Action, AuthProvider, LocalAuthProvider, LoginRequest, PermissionPolicy, PrincipalResolver, RequestContext,
    ResourceType, RevocationStore, SignupRequest, TokenPair, TokenService,
};
use crate::practice::{AttemptTracker, MemoryPracticeStore, PracticeStore, SelectedAnswer, Session, SessionMachine};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<LocalAuthProvider>,
    pub resolver: PrincipalResolver,
    pub revocations: RevocationStore,
    pub policy: Arc<PermissionPolicy>,
    pub sessions: SessionMachine,
    pub attempts: AttemptTracker,
    pub ownership: Arc<dyn OwnershipDirectory>,
}

impl AppState {
    pub fn new(settings: &Settings, directory: Arc<MemoryDirectory>, store: Arc<dyn PracticeStore>) -> Self {
        let tokens = Arc::new(TokenService::new(&settings.jwt_secret));
        let revocations = RevocationStore::in_memory();
        let auth = LocalAuthProvider::new(
            tokens.clone(),
            revocations.clone(),
            directory.clone(),
            settings.access_ttl(),
            settings.refresh_ttl(),
        );
        Self {
            auth: Arc::new(auth),
            resolver: PrincipalResolver::new(tokens, revocations.clone(), directory.clone()),
            revocations,
            policy: Arc::new(PermissionPolicy::default()),
            sessions: SessionMachine::new(store.clone(), directory.clone()),
            attempts: AttemptTracker::new(store, settings.audio_threshold),
            ownership: directory,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/users/withdraw", post(withdraw))
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/complete", post(complete_session))
        .route("/sessions/{id}/abort", post(abort_session))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_principal))
        .with_state(state)
}

/// Build the directory, spawn the revocation sweeper and serve until the listener fails.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let directory = Arc::new(MemoryDirectory::new());
    if let Some(path) = settings.seed_file.as_deref() {
        directory.load_seed(path)?;
    }
    if let Some(pw) = settings.admin_password.as_deref() {
        directory.ensure_default_admin(pw).context("seeding default admin")?;
    }
    let store: Arc<dyn PracticeStore> = Arc::new(MemoryPracticeStore::new());
    let state = AppState::new(&settings, directory, store);

    {
        let revocations = state.revocations.clone();
        let interval = settings.sweep_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = revocations.sweep();
                if removed > 0 {
                    debug!(target: "practicum::revocation", removed, "revocation_sweep");
                }
            }
        });
    }

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn new_request_id() -> String {
    let mut bytes = [0u8; 8];
    let _ = getrandom::getrandom(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Attach a `RequestContext` to every request. Never rejects.
async fn resolve_principal(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = state.resolver.resolve_context(req.headers(), new_request_id());
    debug!(
        target: "practicum::resolver",
        request_id = %ctx.request_id,
        subject = ctx.principal.as_ref().map(|p| p.subject_id),
        path = %req.uri().path(),
        "request"
    );
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

/// Body that may be empty; an empty body means all defaults.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::invalid(format!("malformed body: {}", e)))
}

#[derive(Debug, Default, Deserialize)]
struct RevokePayload {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    student_id: i64,
    scenario_id: i64,
}

#[derive(Debug, Deserialize)]
struct AnswerPayload {
    question_id: i64,
    answer: SelectedAnswer,
}

async fn signup(State(state): State<AppState>, Json(payload): Json<SignupRequest>) -> AppResult<Response> {
    let user = state.auth.signup(&payload)?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Json<TokenPair>> {
    Ok(Json(state.auth.login(&payload)?))
}

async fn refresh(State(state): State<AppState>, Json(payload): Json<RefreshPayload>) -> AppResult<Json<TokenPair>> {
    Ok(Json(state.auth.refresh(&payload.refresh_token)?))
}

async fn logout(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>, body: Bytes) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    let payload: RevokePayload = optional_body(&body)?;
    state.auth.logout(principal, ctx.bearer.as_deref(), payload.refresh_token.as_deref());
    Ok(Json(json!({"status": "ok"})).into_response())
}

async fn withdraw(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>, body: Bytes) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    let payload: RevokePayload = optional_body(&body)?;
    state.auth.withdraw(principal, ctx.bearer.as_deref(), payload.refresh_token.as_deref())?;
    Ok(Json(json!({"status": "ok"})).into_response())
}

/// Load a session and check `action` on it for the caller. Runs before any write.
/// Non-admin callers get 403 for a session that does not exist.
fn gate_session(state: &AppState, ctx: &RequestContext, id: i64, action: Action) -> AppResult<Session> {
    let principal = ctx.require_principal()?;
    let session = match state.sessions.get(id) {
        Ok(session) => session,
        Err(AppError::ResourceNotFound(what)) => {
            state.policy.authorize_unknown(Some(principal), ResourceType::Session, id, action)?;
            return Err(AppError::ResourceNotFound(what));
        }
        Err(e) => return Err(e),
    };
    let Some(student) = state.ownership.ownership(ResourceType::Student, session.student_id) else {
        state.policy.authorize_unknown(Some(principal), ResourceType::Session, id, action)?;
        return Err(AppError::not_found(format!("student {}", session.student_id)));
    };
    state.policy.authorize(Some(principal), &session.ownership(&student), action)?;
    Ok(session)
}

async fn start_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<StartPayload>,
) -> AppResult<Response> {
    let principal = ctx.require_principal()?;
    let student = state
        .ownership
        .ownership(ResourceType::Student, payload.student_id)
        .ok_or_else(|| AppError::not_found(format!("student {}", payload.student_id)))?;
    state.policy.authorize(Some(principal), &student, Action::Update)?;
    let session = state.sessions.start(payload.student_id, payload.scenario_id)?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

async fn submit_answer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
    Json(payload): Json<AnswerPayload>,
) -> AppResult<Response> {
    gate_session(&state, &ctx, id, Action::Update)?;
    let attempt = state.attempts.submit_answer(id, payload.question_id, &payload.answer)?;
    let stats = state.attempts.question_stats(id, payload.question_id)?;
    Ok((StatusCode::CREATED, Json(json!({"attempt": attempt, "question": stats}))).into_response())
}

async fn complete_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    gate_session(&state, &ctx, id, Action::Update)?;
    let session = state.sessions.complete(id)?;
    let summary = state.sessions.summary(id)?;
    Ok(Json(json!({"session": session, "summary": summary})).into_response())
}

async fn abort_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    gate_session(&state, &ctx, id, Action::Update)?;
    let session = state.sessions.abort(id)?;
    Ok(Json(session).into_response())
}

async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let session = gate_session(&state, &ctx, id, Action::View)?;
    let summary = state.sessions.summary(id)?;
    Ok(Json(json!({"session": session, "summary": summary})).into_response())
}
