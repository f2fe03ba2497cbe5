//! Error taxonomy for the MediLink core.
//!
//! Variants are grouped by how the API surface reports them: validation
//! failures, the two authentication/authorization classes, missing rows,
//! conflicts, and persistence failures. Validation and authorization errors
//! are raised at the service boundary before any state is mutated;
//! persistence errors abort the surrounding transaction.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("email already registered for this role")]
    EmailTaken,
    #[error("unknown doctor: {0}")]
    InvalidDoctor(String),
    #[error("registration failed")]
    RegistrationFailed,
    #[error("prescription could not be created")]
    CreationFailed,
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
