use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Provider credential unavailable")]
    CredentialUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidSignature,
    ValidationError,
    InvalidInput,
    Unauthorized,
    NotFound,
    CryptoError,
    CredentialUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::CryptoError => "CRYPTO_ERROR",
            ErrorCode::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Determines if an error should trigger a provider retry (5xx response).
///
/// Retryable errors are transient infrastructure failures: the transaction is
/// rolled back and the provider redelivers.
/// Non-retryable errors are data problems that will fail the same way on every
/// delivery, so retrying would only loop.
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::Database(_)
        | AppError::Internal(_)
        | AppError::Crypto(_)
        | AppError::CredentialUnavailable => true,
        AppError::NotFound
        | AppError::InvalidInput(_)
        | AppError::ValidationError(_)
        | AppError::InvalidSignature(_)
        | AppError::Unauthorized => false,
    }
}
