//! Access-controlled request dispatcher.
//!
//! Maps (method, endpoint, optional id, optional token) onto store and
//! index operations. Every mutation and read passes the capability check
//! first; POST is the only self-authorizing method. A presented token that
//! fails verification denies the request outright; it is never downgraded
//! to anonymous access.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use ofactory_auth::{AuthError, TokenCodec};
use ofactory_schema::{DocumentValidator, SchemaSource, ValidationError};
use ofactory_storage::{EndpointIndex, ObjectStore, StoreError};
use ofactory_types::{
    canonical_bytes, Claims, Endpoint, Fingerprint, Operation, PermissionFlags, ProtocolError,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub index: Arc<dyn EndpointIndex>,
    pub codec: Arc<TokenCodec>,
    pub schemas: Arc<dyn SchemaSource>,
    pub validator: Arc<dyn DocumentValidator>,
    pub node_id: String,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    req_total: u64,
    version: &'static str,
}

/// Body of a successful POST or PUT: the content-derived identity of the
/// stored document and an owner token over it.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub token: String,
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::unauthorized(err.to_string())
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownMethod(_) => {
                ApiError::new(StatusCode::METHOD_NOT_ALLOWED, err.to_string())
            }
            ProtocolError::MalformedPath(_) => ApiError::not_found(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("object not found"),
            other => ApiError::internal(format!("backend failure: {other}")),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let ValidationError::SchemaViolation(violations) = err;
        ApiError::bad_request(format!("document rejected: {}", violations.join("; ")))
    }
}

/// Query parameters carried by object-store requests: the bearer token and
/// the optional re-mint request with its permission flags.
#[derive(Debug, Default, Deserialize)]
struct AccessQuery {
    token: Option<String>,
    new_token: Option<bool>,
    #[serde(rename = "POST")]
    post: Option<bool>,
    #[serde(rename = "GET")]
    get: Option<bool>,
    #[serde(rename = "PUT")]
    put: Option<bool>,
    #[serde(rename = "DELETE")]
    delete: Option<bool>,
}

impl AccessQuery {
    fn requested_flags(&self) -> PermissionFlags {
        PermissionFlags {
            post: self.post.unwrap_or(false),
            get: self.get.unwrap_or(false),
            put: self.put.unwrap_or(false),
            delete: self.delete.unwrap_or(false),
        }
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    axum::serve(listener, app)
        .await
        .context("object store server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    info!(node_id = %state.node_id, "building object store router");
    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/:endpoint",
            axum::routing::post(handle_create)
                .get(handle_list)
                .options(handle_preflight)
                .fallback(handle_method_not_allowed),
        )
        .route(
            "/:endpoint/",
            get(handle_list)
                .options(handle_preflight)
                .fallback(handle_method_not_allowed),
        )
        .route(
            "/:endpoint/:id",
            get(handle_get_by_id)
                .put(handle_replace)
                .delete(handle_remove)
                .options(handle_preflight)
                .fallback(handle_method_not_allowed),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.clone(),
        uptime_secs: state.uptime_seconds(),
        req_total,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Every entered state reaches a terminal response: a method the route
/// does not serve answers 405 instead of falling through.
async fn handle_method_not_allowed(method: axum::http::Method) -> ApiError {
    debug!(%method, "method not served on this path");
    ProtocolError::UnknownMethod(method.to_string()).into()
}

// -------------------------
// Authorization plumbing
// -------------------------

fn parse_endpoint(raw: &str) -> Result<Endpoint, ApiError> {
    Endpoint::parse(raw).map_err(|err| {
        debug!(endpoint = raw, error = %err, "rejected endpoint name");
        err.into()
    })
}

/// Decode the token parameter if present. A token that fails verification
/// is an error, never "no token".
fn presented_claims(state: &AppState, query: &AccessQuery) -> Result<Option<Claims>, ApiError> {
    match &query.token {
        None => Ok(None),
        Some(token) => state
            .codec
            .verify(token)
            .map(Some)
            .map_err(|err| {
                warn!(error = %err, "presented token rejected");
                err.into()
            }),
    }
}

/// Require verified claims that scope-match the endpoint and grant the
/// requested operation.
fn require_authorized(
    claims: Option<Claims>,
    op: Operation,
    endpoint: &Endpoint,
) -> Result<Claims, ApiError> {
    let Some(claims) = claims else {
        warn!(endpoint = %endpoint, ?op, "request without a token");
        return Err(AuthError::Unauthorized.into());
    };
    if !claims.scopes_endpoint(endpoint) {
        warn!(endpoint = %endpoint, "token scoped to a different endpoint");
        return Err(AuthError::Unauthorized.into());
    }
    if !claims.allows(op) {
        warn!(endpoint = %endpoint, ?op, "token lacks the requested method");
        return Err(AuthError::Unauthorized.into());
    }
    Ok(claims)
}

// -------------------------
// Method flows
// -------------------------

async fn handle_create(
    State(state): State<SharedState>,
    AxumPath(endpoint): AxumPath<String>,
    Query(query): Query<AccessQuery>,
    Json(document): Json<Value>,
) -> Result<Json<CreateResponse>, ApiError> {
    state.record_request();
    let endpoint = parse_endpoint(&endpoint)?;

    // POST itself is self-authorizing, but a presented-and-invalid token
    // still denies the request.
    presented_claims(&state, &query)?;

    let schema = state
        .schemas
        .schema_for(&endpoint)
        .ok_or_else(|| ApiError::not_found(format!("no schema registered for '{endpoint}'")))?;
    state.validator.validate(&schema, &document)?;

    let bytes = canonical_bytes(&document);
    let fingerprint = Fingerprint::of_canonical(&bytes);
    debug!(%endpoint, %fingerprint, "storing document");

    state.store.put(&endpoint, &fingerprint, &bytes)?;
    if let Err(err) = state.index.add_member(&endpoint, &fingerprint) {
        // Record landed but membership did not: honest failure, the
        // orphaned record is left for a reconciliation sweep.
        warn!(%endpoint, %fingerprint, error = %err, "index diverged from store after put");
        return Err(ApiError::internal("object stored but not indexed"));
    }

    let claims = Claims::owner_of(
        &endpoint,
        &fingerprint,
        TokenCodec::now_secs(),
        state.codec.ttl_secs(),
    );
    Ok(Json(CreateResponse {
        token: state.codec.mint(&claims),
        fingerprint: fingerprint.to_hex(),
    }))
}

async fn handle_list(
    State(state): State<SharedState>,
    AxumPath(endpoint): AxumPath<String>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, ApiError> {
    state.record_request();
    let endpoint = parse_endpoint(&endpoint)?;
    let claims = presented_claims(&state, &query)?;
    let claims = require_authorized(claims, Operation::Get, &endpoint)?;

    if query.new_token.unwrap_or(false) {
        return Ok(remint_token(&state, &claims, &query).into_response());
    }

    let documents = collect_endpoint_documents(&state, &endpoint)?;
    Ok(Json(documents).into_response())
}

async fn handle_get_by_id(
    State(state): State<SharedState>,
    AxumPath((endpoint, id)): AxumPath<(String, String)>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, ApiError> {
    state.record_request();
    let endpoint = parse_endpoint(&endpoint)?;
    let claims = presented_claims(&state, &query)?;
    let claims = require_authorized(claims, Operation::Get, &endpoint)?;

    if query.new_token.unwrap_or(false) {
        return Ok(remint_token(&state, &claims, &query).into_response());
    }

    // Deliberate O(collection) scan: id is a field inside the document,
    // not the fingerprint, so membership gives no shortcut.
    let documents = collect_endpoint_documents(&state, &endpoint)?;
    let matches: Vec<Value> = documents
        .into_iter()
        .filter(|doc| document_id_matches(doc, &id))
        .collect();

    // An object-scoped token that matched a document outside its scope is
    // an authorization failure, not an empty result.
    if let Some(scope) = &claims.object_id {
        if matches
            .iter()
            .any(|doc| Fingerprint::of_value(doc).to_hex() != *scope)
        {
            warn!(%endpoint, id, "token object scope does not cover the requested document");
            return Err(AuthError::Unauthorized.into());
        }
    }

    Ok(Json(matches).into_response())
}

async fn handle_replace(
    State(state): State<SharedState>,
    AxumPath((endpoint, id)): AxumPath<(String, String)>,
    Query(query): Query<AccessQuery>,
    Json(document): Json<Value>,
) -> Result<Json<CreateResponse>, ApiError> {
    state.record_request();
    let endpoint = parse_endpoint(&endpoint)?;
    let claims = presented_claims(&state, &query)?;
    let claims = require_authorized(claims, Operation::Put, &endpoint)?;

    let target = parse_object_id(&id)?;
    if !claims.scopes_object(&target) {
        warn!(%endpoint, %target, "PUT token not scoped to target object");
        return Err(AuthError::Unauthorized.into());
    }
    if !state.index.is_member(&endpoint, &target)? {
        return Err(ApiError::not_found("object not found"));
    }

    let schema = state
        .schemas
        .schema_for(&endpoint)
        .ok_or_else(|| ApiError::not_found(format!("no schema registered for '{endpoint}'")))?;
    state.validator.validate(&schema, &document)?;

    // Content addressing: the replacement lives under its own fingerprint.
    // The prior fingerprint coexists until explicitly deleted.
    let bytes = canonical_bytes(&document);
    let fingerprint = Fingerprint::of_canonical(&bytes);
    debug!(%endpoint, old = %target, new = %fingerprint, "replacing document content");

    state.store.put(&endpoint, &fingerprint, &bytes)?;
    if let Err(err) = state.index.add_member(&endpoint, &fingerprint) {
        warn!(%endpoint, %fingerprint, error = %err, "index diverged from store after put");
        return Err(ApiError::internal("object stored but not indexed"));
    }

    let claims = Claims::owner_of(
        &endpoint,
        &fingerprint,
        TokenCodec::now_secs(),
        state.codec.ttl_secs(),
    );
    Ok(Json(CreateResponse {
        token: state.codec.mint(&claims),
        fingerprint: fingerprint.to_hex(),
    }))
}

async fn handle_remove(
    State(state): State<SharedState>,
    AxumPath((endpoint, id)): AxumPath<(String, String)>,
    Query(query): Query<AccessQuery>,
) -> Result<StatusCode, ApiError> {
    state.record_request();
    let endpoint = parse_endpoint(&endpoint)?;
    let claims = presented_claims(&state, &query)?;
    let claims = require_authorized(claims, Operation::Delete, &endpoint)?;
    if !claims.owner {
        warn!(%endpoint, "DELETE without owner claim");
        return Err(AuthError::Unauthorized.into());
    }

    let target = parse_object_id(&id)?;
    if !claims.scopes_object(&target) {
        warn!(%endpoint, %target, "DELETE token not scoped to target object");
        return Err(AuthError::Unauthorized.into());
    }

    state.store.delete(&endpoint, &target)?;
    if let Err(err) = state.index.remove_member(&endpoint, &target) {
        warn!(%endpoint, %target, error = %err, "index diverged from store after delete");
        return Err(ApiError::internal("object deleted but index not updated"));
    }

    Ok(StatusCode::OK)
}

// -------------------------
// Helpers
// -------------------------

/// Mint a narrower token derived from verified claims. Requested flags are
/// clamped to the parent's rights; ownership never derives.
fn remint_token(state: &AppState, claims: &Claims, query: &AccessQuery) -> Json<TokenResponse> {
    let derived = claims.derive(
        query.requested_flags(),
        TokenCodec::now_secs(),
        state.codec.ttl_secs(),
    );
    debug!(endpoint = %derived.endpoint, "minting derived token");
    Json(TokenResponse {
        token: state.codec.mint(&derived),
    })
}

/// Gather every stored document of an endpoint. All member lookups resolve
/// before any response is produced; a member deleted mid-scan is skipped,
/// a backend failure fails the whole request rather than truncating it.
fn collect_endpoint_documents(
    state: &AppState,
    endpoint: &Endpoint,
) -> Result<Vec<Value>, ApiError> {
    let members = state.index.list_members(endpoint)?;
    let mut documents = Vec::with_capacity(members.len());
    let mut hard_failure: Option<StoreError> = None;

    for fingerprint in &members {
        match state.store.get(endpoint, fingerprint) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    warn!(%endpoint, %fingerprint, error = %err, "stored bytes are not valid JSON");
                    hard_failure
                        .get_or_insert(StoreError::Unavailable("corrupt stored document".into()));
                }
            },
            Err(StoreError::NotFound) => {
                // Deleted between the membership scan and this read.
                debug!(%endpoint, %fingerprint, "indexed member vanished mid-scan");
            }
            Err(err) => {
                warn!(%endpoint, %fingerprint, error = %err, "member lookup failed");
                hard_failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = hard_failure {
        return Err(err.into());
    }
    Ok(documents)
}

fn parse_object_id(id: &str) -> Result<Fingerprint, ApiError> {
    Fingerprint::from_hex(id).map_err(|_| ApiError::not_found("object not found"))
}

/// Match the declared `id` field of a document against a path segment.
/// String ids compare directly; numeric ids compare by decimal text.
fn document_id_matches(document: &Value, id: &str) -> bool {
    match document.get("id") {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}
