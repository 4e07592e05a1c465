//! Verified caller identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel client id used when a token carries neither `azp` nor `sub`.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The caller behind a verified bearer token.
///
/// Inserted into the request's extensions by the authentication middleware
/// and read by handlers through `Option<Extension<AuthenticatedIdentity>>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    /// Authorized party, falling back to the subject.
    pub client_id: String,

    /// The `sub` claim, if any.
    pub subject: Option<String>,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

/// Claims read from an access token.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub exp: i64,
}

impl From<AccessClaims> for AuthenticatedIdentity {
    fn from(claims: AccessClaims) -> Self {
        let client_id = claims
            .azp
            .clone()
            .or_else(|| claims.sub.clone())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

        let scopes = claims
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            client_id,
            subject: claims.sub,
            scopes,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: Option<&str>, azp: Option<&str>, scope: Option<&str>) -> AccessClaims {
        AccessClaims {
            sub: sub.map(str::to_string),
            azp: azp.map(str::to_string),
            scope: scope.map(str::to_string),
            exp: 1_900_000_000,
        }
    }

    #[test]
    fn test_client_id_prefers_authorized_party() {
        let identity = AuthenticatedIdentity::from(claims(Some("user|1"), Some("app-1"), None));
        assert_eq!(identity.client_id, "app-1");
        assert_eq!(identity.subject.as_deref(), Some("user|1"));
    }

    #[test]
    fn test_client_id_falls_back_to_subject_then_sentinel() {
        let identity = AuthenticatedIdentity::from(claims(Some("user|1"), None, None));
        assert_eq!(identity.client_id, "user|1");

        let identity = AuthenticatedIdentity::from(claims(None, None, None));
        assert_eq!(identity.client_id, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let identity =
            AuthenticatedIdentity::from(claims(None, None, Some("read:weather  read:marine")));
        assert_eq!(identity.scopes, vec!["read:weather", "read:marine"]);

        let identity = AuthenticatedIdentity::from(claims(None, None, None));
        assert!(identity.scopes.is_empty());
    }

    #[test]
    fn test_expiry_from_exp_claim() {
        let identity = AuthenticatedIdentity::from(claims(None, None, None));
        assert_eq!(identity.expires_at.timestamp(), 1_900_000_000);
    }
}
