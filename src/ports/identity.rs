use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Authenticated caller, attached to the request extensions by the auth
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Custom error type for identity lookups
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IdentityError {
    /// The credential is unknown or revoked
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The identity backend could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

/// IdentityProvider defines the port for turning a bearer credential into a
/// [`Principal`].
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Authenticate a raw credential (the header value after the scheme).
    async fn authenticate(&self, credential: &str) -> IdentityResult<Principal>;
}
