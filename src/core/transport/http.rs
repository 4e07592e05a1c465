//! HTTP transport implementation.
//!
//! Streamable HTTP gateway: `POST`, `GET` and `DELETE` on the MCP endpoint
//! are routed to per-client sessions, everything else is discovery, health
//! and the OAuth relay. A bearer token is required on every path outside
//! the public allowlist.

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use super::config::HttpConfig;
use super::jsonrpc::{
    AUTH_ERROR, INTERNAL_ERROR, INVALID_REQUEST, JsonRpcResponse, PARSE_ERROR, SESSION_ERROR,
};
use super::oauth::{self, OAuthProxy};
use super::session::{Inbound, Resolved, SessionError, SessionManager};
use super::{TransportError, TransportResult};
use crate::core::auth::{AuthError, AuthGate, AuthenticatedIdentity};
use crate::domains::tools::ToolRegistry;

/// Session id header, lowercase as stored by `http`.
pub const MCP_SESSION_ID: &str = "mcp-session-id";

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub manager: Arc<SessionManager>,
    /// Bearer token verification.
    pub gate: AuthGate,
    /// Tool catalog, for the public manifest.
    pub registry: Arc<ToolRegistry>,
    /// Identity provider relay; absent when no provider is configured.
    pub oauth: Option<OAuthProxy>,
}

/// A request the gateway refuses, rendered as a JSON-RPC error envelope.
#[derive(Debug)]
pub enum GatewayError {
    Session(SessionError),
    Auth {
        error: AuthError,
        resource_metadata: Option<String>,
    },
}

impl From<SessionError> for GatewayError {
    fn from(error: SessionError) -> Self {
        Self::Session(error)
    }
}

impl GatewayError {
    fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            Self::Auth { .. } => (StatusCode::UNAUTHORIZED, AUTH_ERROR),
            Self::Session(error) => match error {
                SessionError::NotFound(_) | SessionError::Closed(_) => {
                    (StatusCode::NOT_FOUND, SESSION_ERROR)
                }
                SessionError::MissingSessionId => (StatusCode::BAD_REQUEST, SESSION_ERROR),
                SessionError::StreamConflict => (StatusCode::CONFLICT, SESSION_ERROR),
                SessionError::NotAcceptable(_) => (StatusCode::NOT_ACCEPTABLE, SESSION_ERROR),
                SessionError::Parse(_) => (StatusCode::BAD_REQUEST, PARSE_ERROR),
                SessionError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, INVALID_REQUEST),
                SessionError::AlreadyConnected | SessionError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
                }
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Session(error) => error.to_string(),
            Self::Auth { error, .. } => error.to_string(),
        };
        let body = JsonRpcResponse::error(serde_json::Value::Null, code, message);
        let mut response = (status, Json(body)).into_response();

        if let Self::Auth {
            error,
            resource_metadata,
        } = &self
        {
            let mut challenge = String::from("Bearer");
            if *error != AuthError::MissingToken {
                challenge.push_str(" error=\"invalid_token\",");
            }
            if let Some(url) = resource_metadata {
                challenge.push_str(&format!(" resource_metadata=\"{url}\""));
            }
            if let Ok(value) = HeaderValue::from_str(challenge.trim_end_matches(',')) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

/// Session id named by the request, if any.
///
/// A header that is not valid UTF-8 cannot name a live session.
fn requested_session(headers: &HeaderMap) -> Result<Option<String>, SessionError> {
    match headers.get(MCP_SESSION_ID) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|id| Some(id.to_string()))
            .map_err(|_| SessionError::not_found("<invalid>")),
    }
}

fn with_session_id(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_ID), value);
    }
    response
}

/// Reject requests without a valid bearer token on non-public paths.
async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match state.gate.check(&path, request.headers()).await {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(error) => {
            warn!(%path, %error, "Rejected unauthenticated request");
            GatewayError::Auth {
                error,
                resource_metadata: state.oauth.as_ref().map(OAuthProxy::resource_metadata_url),
            }
            .into_response()
        }
    }
}

/// POST: submit a JSON-RPC message or batch, creating a session if none is named.
#[instrument(skip_all, fields(session_id = tracing::field::Empty))]
async fn handle_post(
    State(state): State<AppState>,
    identity: Option<Extension<AuthenticatedIdentity>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let requested = requested_session(&headers)?;
    let Resolved { session, created } = state.manager.resolve_or_create(requested.as_deref())?;
    tracing::Span::current().record("session_id", session.id());
    if let Some(Extension(identity)) = &identity {
        debug!(client_id = %identity.client_id, "Authenticated request");
    }

    match state
        .manager
        .dispatch(&session, Inbound::Post { headers, body })
        .await
    {
        Ok(response) => Ok(with_session_id(response, session.id())),
        Err(error) => {
            // A session created for a body that never got through is dropped again.
            if created {
                if let Err(e) = state.manager.terminate(session.id()) {
                    debug!(error = %e, "Session already gone after failed first request");
                }
                return Err(error.into());
            }
            Ok(with_session_id(
                GatewayError::from(error).into_response(),
                session.id(),
            ))
        }
    }
}

/// GET: open the standalone server-to-client stream.
#[instrument(skip_all)]
async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let id = requested_session(&headers)?.ok_or(SessionError::MissingSessionId)?;
    let session = state.manager.get(&id)?;
    let response = state
        .manager
        .dispatch(&session, Inbound::OpenStream { headers })
        .await?;
    Ok(with_session_id(response, session.id()))
}

/// DELETE: terminate the session.
#[instrument(skip_all)]
async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let id = requested_session(&headers)?.ok_or(SessionError::MissingSessionId)?;
    state.manager.terminate(&id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "sessions": state.manager.len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Static tool manifest.
async fn tool_manifest(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "tools": state.registry.manifest() }))
}

fn oauth_routes(proxy: OAuthProxy) -> Router<AppState> {
    Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth::protected_resource),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::authorization_server),
        )
        .route(
            "/.well-known/openid-configuration",
            get(oauth::openid_configuration),
        )
        .route("/authorize", get(oauth::authorize))
        .route("/token", post(oauth::token))
        .route("/register", post(oauth::register))
        .route("/logout", get(oauth::logout))
        .with_state(proxy)
}

/// Build the gateway router.
pub fn router(state: AppState, config: &HttpConfig) -> Router {
    let mut app = Router::new()
        .route(
            &config.rpc_path,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .route("/health", get(health_check))
        .route("/tools", get(tool_manifest));

    if let Some(proxy) = state.oauth.clone() {
        app = app.merge(oauth_routes(proxy));
    }

    let mut app = app
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Outermost, so preflight requests never reach the auth check.
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([HeaderName::from_static(MCP_SESSION_ID)]);
        app = app.layer(cors);
    }
    app
}

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Serve until `shutdown` fires, then close every session.
    pub async fn run(self, state: AppState, shutdown: CancellationToken) -> TransportResult<()> {
        let addr = self.address();
        let app = router(state.clone(), &self.config);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let sweeper = state.manager.spawn_sweeper();

        info!(
            auth = state.gate.is_enabled(),
            cors = self.config.enable_cors,
            sse_responses = self.config.sse_responses,
            "Ready - listening on {}",
            addr
        );
        info!("  → MCP:      POST|GET|DELETE {}", self.config.rpc_path);
        info!("  → Health:   GET /health");
        info!("  → Manifest: GET /tools");

        // Open streams only end once their session closes, so sessions are
        // closed as soon as shutdown starts rather than after the drain.
        let manager = state.manager.clone();
        let signal = async move {
            shutdown.cancelled().await;
            info!("Shutdown requested, closing sessions");
            manager.shutdown();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        state.manager.shutdown();
        let _ = sweeper.await;
        info!("HTTP transport finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::RemoteKeySet;
    use crate::core::transport::SessionConfig;
    use crate::core::transport::session::{EngineFactory, ProtocolEngine, ServerIdentity};
    use crate::domains::tools::RegistryEngineFactory;
    use crate::domains::tools::definitions::common::tests::fake_context;
    use crate::test_support::{
        FakeServer, TEST_AUDIENCE, TEST_ISSUER, exploding_entry, sign_token, spawn_server,
        test_jwks, valid_claims,
    };
    use axum::body::Body;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use jsonwebtoken::Algorithm;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        _upstream: FakeServer,
    }

    /// Gateway whose weather provider always answers 503 and whose JWKS is local.
    async fn harness(secured: bool) -> Harness {
        let upstream = spawn_server(
            Router::new()
                .route("/jwks", get(|| async { Json(test_jwks()) }))
                .fallback(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .await;

        let gate = if secured {
            let keys = RemoteKeySet::new(
                upstream.url("/jwks"),
                Duration::from_secs(30),
                Duration::from_secs(600),
            );
            AuthGate::new(Arc::new(keys), TEST_ISSUER, TEST_AUDIENCE, Algorithm::RS256)
        } else {
            AuthGate::disabled()
        };

        let registry = Arc::new(ToolRegistry::new(fake_context(&upstream)));
        let factory = RegistryEngineFactory::new(
            registry.clone(),
            ServerIdentity {
                name: "weather-test".to_string(),
                version: "0.0.0".to_string(),
                instructions: None,
            },
        );
        let manager = Arc::new(SessionManager::new(
            Arc::new(factory),
            SessionConfig::default(),
            false,
        ));
        let oauth = OAuthProxy::new(
            upstream.base_url.clone(),
            Some(TEST_AUDIENCE.to_string()),
            TEST_ISSUER,
            upstream.url("/jwks"),
            "http://localhost:8080",
            "http://localhost:8080/mcp",
        );
        let state = AppState {
            manager,
            gate,
            registry,
            oauth: Some(oauth),
        };
        let config = HttpConfig::default();
        Harness {
            app: router(state.clone(), &config),
            state,
            _upstream: upstream,
        }
    }

    async fn open_harness() -> Harness {
        harness(false).await
    }

    fn rpc(session: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");
        if let Some(id) = session {
            builder = builder.header(MCP_SESSION_ID, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn initialize() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        })
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session_of(response: &Response) -> String {
        response
            .headers()
            .get(MCP_SESSION_ID)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn initialized_session(h: &Harness) -> String {
        let response = h.app.clone().oneshot(rpc(None, initialize())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        session_of(&response)
    }

    #[tokio::test]
    async fn test_initialize_then_list_tools_on_same_session() {
        let h = open_harness().await;

        let response = h.app.clone().oneshot(rpc(None, initialize())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session = session_of(&response);
        let body = json_body(response).await;
        assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

        let response = h
            .app
            .clone()
            .oneshot(rpc(
                Some(&session),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session_of(&response), session);

        let body = json_body(response).await;
        let tools = body["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 7);
        assert_eq!(h.state.manager.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_then_post_is_not_found() {
        let h = open_harness().await;
        let session = initialized_session(&h).await;

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri("/mcp")
            .header(MCP_SESSION_ID, &session)
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = h
            .app
            .clone()
            .oneshot(rpc(
                Some(&session),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], SESSION_ERROR);
        assert!(h.state.manager.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_a_failed_tool_result() {
        let h = open_harness().await;
        let session = initialized_session(&h).await;

        let call = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {
                "name": "get_current_weather",
                "arguments": {"latitude": 51.5, "longitude": -0.12}
            }
        });
        let response = h.app.clone().oneshot(rpc(Some(&session), call)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert!(body.get("error").is_none());
        assert_eq!(body["result"]["isError"], true);
        let text = body["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("503"), "unexpected message: {text}");
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments_are_invalid_params() {
        let h = open_harness().await;
        let session = initialized_session(&h).await;

        let call = json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "get_current_weather", "arguments": {"latitude": 120.0, "longitude": 0.0}}
        });
        let response = h.app.clone().oneshot(rpc(Some(&session), call)).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_get_and_delete_require_session_header() {
        let h = open_harness().await;
        for method in [Method::GET, Method::DELETE] {
            let request = Request::builder()
                .method(method)
                .uri("/mcp")
                .header(header::ACCEPT, "text/event-stream")
                .body(Body::empty())
                .unwrap();
            let response = h.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_second_stream_conflicts() {
        let h = open_harness().await;
        let session = initialized_session(&h).await;
        let open = || {
            Request::builder()
                .method(Method::GET)
                .uri("/mcp")
                .header(MCP_SESSION_ID, &session)
                .header(header::ACCEPT, "text/event-stream")
                .body(Body::empty())
                .unwrap()
        };

        let first = h.app.clone().oneshot(open()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = h.app.clone().oneshot(open()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        drop(first);
    }

    #[tokio::test]
    async fn test_unparsable_body_creates_no_session() {
        let h = open_harness().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], PARSE_ERROR);
        assert!(h.state.manager.is_empty());
    }

    struct ExplodingFactory;

    impl EngineFactory for ExplodingFactory {
        fn create_engine(&self, _session_id: &str) -> ProtocolEngine {
            let mut engine = ProtocolEngine::new(ServerIdentity {
                name: "weather-test".to_string(),
                version: "0.0.0".to_string(),
                instructions: None,
            });
            engine.register_tool(exploding_entry());
            engine
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_internal_error() {
        let h = open_harness().await;
        let mut state = h.state.clone();
        state.manager = Arc::new(SessionManager::new(
            Arc::new(ExplodingFactory),
            SessionConfig::default(),
            false,
        ));
        let app = router(state.clone(), &HttpConfig::default());

        let batch = json!([
            initialize(),
            {
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "explode", "arguments": {}}
            }
        ]);
        let response = app.oneshot(rpc(None, batch)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"]["code"], INTERNAL_ERROR);
        assert!(state.manager.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_is_public() {
        let h = open_harness().await;
        let request = Request::builder().uri("/tools").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["tools"].as_array().unwrap().len(), 7);
        assert_eq!(body["tools"][0]["category"], "location");
    }

    async fn secured_harness() -> Harness {
        harness(true).await
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected_with_challenge() {
        let h = secured_harness().await;

        let response = h.app.clone().oneshot(rpc(None, initialize())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(
            challenge,
            "Bearer resource_metadata=\"http://localhost:8080/.well-known/oauth-protected-resource\""
        );
        assert_eq!(json_body(response).await["error"]["code"], AUTH_ERROR);
        assert!(h.state.manager.is_empty());
    }

    #[tokio::test]
    async fn test_public_paths_skip_authentication() {
        let h = secured_harness().await;
        for path in ["/health", "/tools", "/.well-known/oauth-protected-resource"] {
            let request = Request::builder().uri(path).body(Body::empty()).unwrap();
            let response = h.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn test_valid_token_reaches_the_session() {
        let h = secured_harness().await;
        let token = sign_token(&valid_claims());

        let mut request = rpc(None, initialize());
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.state.manager.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let h = secured_harness().await;
        let mut claims = valid_claims();
        claims["aud"] = "https://someone-else.example".into();

        let mut request = rpc(None, initialize());
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", sign_token(&claims))).unwrap(),
        );
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer error=\"invalid_token\""));
    }

    #[tokio::test]
    async fn test_authorize_redirects_with_audience() {
        let h = open_harness().await;
        let request = Request::builder()
            .uri("/authorize?response_type=code&client_id=abc")
            .body(Body::empty())
            .unwrap();

        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.ends_with("/authorize?response_type=code&client_id=abc&audience=https%3A%2F%2Fweather.test.local"));
    }

    #[tokio::test]
    async fn test_health_reports_sessions() {
        let h = open_harness().await;
        initialized_session(&h).await;

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let body = json_body(h.app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 1);
    }
}
