//! OAuth discovery documents and identity provider proxy.
//!
//! MCP clients discover the authorization server through the gateway. The
//! gateway advertises itself as that server and forwards the interactive
//! and token endpoints to the configured identity provider.

use axum::{
    Json,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::config::AuthConfig;
use crate::core::transport::HttpConfig;

/// Provider response headers passed through to the client.
const RELAYED_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::LOCATION,
    header::CACHE_CONTROL,
    header::PRAGMA,
    header::WWW_AUTHENTICATE,
];

/// Failure while relaying a request to the identity provider.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The client's request could not be interpreted.
    #[error("{0}")]
    InvalidRequest(String),

    /// The identity provider could not be reached.
    #[error("Identity provider unavailable: {0}")]
    Upstream(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "temporarily_unavailable"),
        };
        warn!(error = %self, "OAuth proxy request failed");
        (
            status,
            Json(json!({"error": code, "error_description": self.to_string()})),
        )
            .into_response()
    }
}

/// Discovery metadata plus the identity provider relay.
#[derive(Clone)]
pub struct OAuthProxy {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    /// Identity provider base URL, no trailing slash.
    provider: String,
    audience: Option<String>,
    issuer: String,
    jwks_uri: String,
    /// Gateway base URL as seen by clients.
    public_url: String,
    /// The protected MCP endpoint.
    resource: String,
}

const SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

impl OAuthProxy {
    /// Proxy towards `provider`, advertising endpoints under `public_url`.
    pub fn new(
        provider: impl Into<String>,
        audience: Option<String>,
        issuer: impl Into<String>,
        jwks_uri: impl Into<String>,
        public_url: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        // Redirects from the provider are passed back to the client, not followed.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                http,
                provider: provider.into().trim_end_matches('/').to_string(),
                audience,
                issuer: issuer.into(),
                jwks_uri: jwks_uri.into(),
                public_url: public_url.into().trim_end_matches('/').to_string(),
                resource: resource.into(),
            }),
        }
    }

    /// Build from configuration; `None` when no identity provider is configured.
    pub fn from_config(auth: &AuthConfig, http: &HttpConfig) -> Option<Self> {
        let provider = auth.authorization_server_url()?;
        Some(Self::new(
            provider,
            auth.audience.clone(),
            auth.effective_issuer()?,
            auth.effective_jwks_url()?,
            http.public_url.clone(),
            http.resource_url(),
        ))
    }

    /// Location of the protected resource metadata document.
    pub fn resource_metadata_url(&self) -> String {
        format!(
            "{}/.well-known/oauth-protected-resource",
            self.inner.public_url
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.public_url)
    }

    /// RFC 9728 protected resource metadata.
    pub fn protected_resource_metadata(&self) -> Value {
        json!({
            "resource": self.inner.resource,
            "authorization_servers": [self.inner.public_url],
            "bearer_methods_supported": ["header"],
            "scopes_supported": SCOPES,
        })
    }

    /// RFC 8414 authorization server metadata.
    pub fn authorization_server_metadata(&self) -> Value {
        json!({
            "issuer": self.inner.issuer,
            "authorization_endpoint": self.endpoint("/authorize"),
            "token_endpoint": self.endpoint("/token"),
            "registration_endpoint": self.endpoint("/register"),
            "jwks_uri": self.inner.jwks_uri,
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "code_challenge_methods_supported": ["S256"],
            "token_endpoint_auth_methods_supported": [
                "client_secret_basic",
                "client_secret_post",
                "none"
            ],
            "scopes_supported": SCOPES,
        })
    }

    /// OpenID Connect discovery document.
    pub fn openid_configuration(&self) -> Value {
        let mut doc = self.authorization_server_metadata();
        if let Some(map) = doc.as_object_mut() {
            map.insert("end_session_endpoint".into(), json!(self.endpoint("/logout")));
            map.insert("subject_types_supported".into(), json!(["public"]));
            map.insert(
                "id_token_signing_alg_values_supported".into(),
                json!(["RS256"]),
            );
        }
        doc
    }

    /// Provider authorize URL for the client's query, with the audience added.
    pub fn authorize_redirect(&self, query: Option<&str>) -> Result<String, ProxyError> {
        let mut params = parse_form(query.unwrap_or_default().as_bytes())?;
        if let Some(audience) = &self.inner.audience {
            if !params.iter().any(|(k, _)| k == "audience") {
                params.push(("audience".to_string(), audience.clone()));
            }
        }
        with_query(&format!("{}/authorize", self.inner.provider), &params)
    }

    /// Provider logout URL for the client's query.
    pub fn logout_redirect(&self, query: Option<&str>) -> Result<String, ProxyError> {
        let params = parse_form(query.unwrap_or_default().as_bytes())?;
        with_query(&format!("{}/v2/logout", self.inner.provider), &params)
    }

    /// Relay a token request, moving Basic client credentials into the form.
    #[instrument(skip_all)]
    pub async fn token(&self, headers: &HeaderMap, body: &[u8]) -> Result<Response, ProxyError> {
        let mut form = parse_form(body)?;
        if let Some((client_id, client_secret)) = basic_credentials(headers)? {
            if !form.iter().any(|(k, _)| k == "client_id") {
                form.push(("client_id".to_string(), client_id));
            }
            if !form.iter().any(|(k, _)| k == "client_secret") {
                form.push(("client_secret".to_string(), client_secret));
            }
        }
        let encoded = serde_urlencoded::to_string(&form)
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        debug!("Forwarding token request");
        let request = self
            .inner
            .http
            .post(format!("{}/oauth/token", self.inner.provider))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encoded);
        self.relay(request).await
    }

    /// Relay a dynamic client registration request.
    #[instrument(skip_all)]
    pub async fn register(&self, body: Bytes) -> Result<Response, ProxyError> {
        debug!("Forwarding client registration");
        let request = self
            .inner
            .http
            .post(format!("{}/oidc/register", self.inner.provider))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        self.relay(request).await
    }

    async fn relay(&self, request: reqwest::RequestBuilder) -> Result<Response, ProxyError> {
        let upstream = request
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = upstream.status();
        let mut headers = HeaderMap::new();
        for name in &RELAYED_HEADERS {
            for value in upstream.headers().get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let body = upstream
            .bytes()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        Ok((status, headers, body).into_response())
    }
}

fn parse_form(bytes: &[u8]) -> Result<Vec<(String, String)>, ProxyError> {
    serde_urlencoded::from_bytes(bytes).map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}

fn with_query(base: &str, params: &[(String, String)]) -> Result<String, ProxyError> {
    if params.is_empty() {
        return Ok(base.to_string());
    }
    let query = serde_urlencoded::to_string(params)
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
    Ok(format!("{base}?{query}"))
}

/// Client credentials from `Authorization: Basic`, if present.
fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, ProxyError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let Some(encoded) = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return Ok(None);
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| ProxyError::InvalidRequest("Malformed Basic credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| ProxyError::InvalidRequest("Malformed Basic credentials".to_string()))?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| ProxyError::InvalidRequest("Malformed Basic credentials".to_string()))?;
    Ok(Some((id.to_string(), secret.to_string())))
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// Route handlers. Each takes the proxy as router state.

pub async fn protected_resource(State(proxy): State<OAuthProxy>) -> Json<Value> {
    Json(proxy.protected_resource_metadata())
}

pub async fn authorization_server(State(proxy): State<OAuthProxy>) -> Json<Value> {
    Json(proxy.authorization_server_metadata())
}

pub async fn openid_configuration(State(proxy): State<OAuthProxy>) -> Json<Value> {
    Json(proxy.openid_configuration())
}

pub async fn authorize(
    State(proxy): State<OAuthProxy>,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    proxy.authorize_redirect(query.as_deref()).map(found)
}

pub async fn logout(
    State(proxy): State<OAuthProxy>,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    proxy.logout_redirect(query.as_deref()).map(found)
}

pub async fn token(
    State(proxy): State<OAuthProxy>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    proxy.token(&headers, &body).await
}

pub async fn register(
    State(proxy): State<OAuthProxy>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    proxy.register(body).await
}
