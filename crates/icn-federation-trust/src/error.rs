use thiserror::Error;

/// Errors that abort a single trust evaluation call.
///
/// Everything else (unresolved signers, dangling references, unmatched root
/// hashes) is reported as a diagnostic on the returned value instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("No federation manifest available for federation: {0}")]
    MissingManifest(String),

    #[error("Credential set is empty")]
    EmptyCredentialSet,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for TrustError {
    fn from(err: serde_json::Error) -> Self {
        TrustError::SerializationError(err.to_string())
    }
}

/// Result type for trust evaluation operations
pub type TrustResult<T> = Result<T, TrustError>;
