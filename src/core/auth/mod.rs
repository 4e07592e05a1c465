//! Bearer token authentication for the HTTP gateway.
//!
//! - `gate.rs` - per-request decision: public path, or verified identity
//! - `jwks.rs` - signing keys fetched from the identity provider and cached
//! - `identity.rs` - the verified caller, attached as a request extension
//! - `error.rs` - authentication failures

mod error;
mod gate;
mod identity;
mod jwks;

pub use error::AuthError;
pub use gate::{AuthGate, PUBLIC_PATHS, bearer_token};
pub use identity::AuthenticatedIdentity;
pub use jwks::{KeySource, RemoteKeySet};
