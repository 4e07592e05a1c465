//! Shared helpers for in-process HTTP fakes used by unit tests.

use axum::Router;
use tokio::net::TcpListener;

use crate::core::transport::session::AbortOnDrop;

/// A fake HTTP server listening on an ephemeral local port.
pub struct FakeServer {
    pub base_url: String,
    _task: AbortOnDrop<()>,
}

impl FakeServer {
    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Serve `router` on `127.0.0.1:0`.
pub async fn spawn_server(router: Router) -> FakeServer {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    FakeServer {
        base_url: format!("http://127.0.0.1:{port}"),
        _task: AbortOnDrop(task),
    }
}

/// Key id of the fixed RSA test key.
pub const TEST_KID: &str = "test-key-1";

/// Issuer and audience the test tokens are minted for.
pub const TEST_ISSUER: &str = "https://auth.test.local/";
pub const TEST_AUDIENCE: &str = "https://weather.test.local";

const TEST_KEY_PEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/testdata/jwt_signing_key.pem"
));

const TEST_KEY_MODULUS: &str = "uFdBLo4oka5SvZ7aJM3MkTPYopkZcISIlSQ0aMquD2-WSzL-rtJGNQGek8o2xxvn6dEtJHDy_GfjWA-55dp45yiOpKwdD_katwS1BsvyAq-KESzbrvatFPlfd6ygla7g1rWBl_jUMlBlFi6rjsT6hPZx0M7Q0ko63bzEpj4aOaezS1zVUgA_yovTGQfVoZea9gZTLvbDj0l3R9VP-0UWoyEcjOu6Ggb8gYzAooND_MAJ0HB0Jyv8NT58TooTzgce0Hqb5obeLyeSS9ACtaCh7TUgAkAc_SbZOn8TWniijcKQh49cNbQaSIOsUWsbVSlUErr7ADtJKVDuA_nVa6c1Ww";

/// JWKS document holding the public half of the test key.
pub fn test_jwks() -> serde_json::Value {
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "use": "sig",
            "alg": "RS256",
            "n": TEST_KEY_MODULUS,
            "e": "AQAB"
        }]
    })
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims for a valid token: right issuer and audience, one hour left.
pub fn valid_claims() -> serde_json::Value {
    let now = now_secs();
    serde_json::json!({
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "sub": "user|42",
        "azp": "test-client",
        "scope": "read:weather read:marine",
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` with the RSA test key.
pub fn sign_token(claims: &serde_json::Value) -> String {
    use jsonwebtoken::{Algorithm, EncodingKey, Header};

    let header = Header {
        alg: Algorithm::RS256,
        kid: Some(TEST_KID.to_string()),
        ..Header::default()
    };
    let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Tool handler that panics on every call.
struct Exploding;

#[async_trait::async_trait]
impl crate::domains::tools::ToolHandler for Exploding {
    async fn call(
        &self,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<rmcp::model::CallToolResult, crate::domains::tools::ToolError> {
        panic!("tool handler exploded")
    }
}

/// Entry for an `explode` tool whose handler panics.
pub fn exploding_entry() -> crate::domains::tools::ToolEntry {
    let tool = rmcp::model::Tool {
        name: "explode".into(),
        description: Some("Always panics".into()),
        input_schema: std::sync::Arc::new(serde_json::Map::new()),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    };
    crate::domains::tools::ToolEntry::new(tool, "test", &[], std::sync::Arc::new(Exploding))
}
