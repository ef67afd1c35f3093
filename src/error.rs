/// Unified error types for Keystead
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the credential service
#[derive(Error, Debug)]
pub enum CredError {
    /// Name missing or outside 1..=256 characters
    #[error("invalid name")]
    InvalidName,

    /// Email missing, too long or not shaped like an address
    #[error("invalid email address")]
    InvalidEmail,

    /// Password outside 8..=256 characters
    #[error("invalid password")]
    InvalidPassword,

    /// Candidate password does not match the stored hash
    #[error("password mismatch")]
    PasswordMismatch,

    #[error("account not found")]
    AccountNotFound,

    #[error("email not found")]
    EmailNotFound,

    #[error("key not found")]
    KeyNotFound,

    #[error("token not found")]
    TokenNotFound,

    /// Another live account already uses this email
    #[error("email exists in store")]
    DuplicateEmail,

    /// The account already owns a key pair
    #[error("key exists in store")]
    KeyAlreadyExists,

    /// A required argument was empty
    #[error("{0} cannot be empty")]
    NilArgument(&'static str),

    #[error("store cannot be nil")]
    NilStore,

    #[error("provider {0} already registered")]
    AlreadyRegistered(String),

    #[error("store {0} not registered")]
    NotRegistered(String),

    /// Store used before dial or after close
    #[error("store not connected")]
    NotConnected,

    /// Token is not signed with an RSA algorithm
    #[error("unexpected signing method")]
    WrongSigningMethod,

    /// Token could not be parsed
    #[error("malformed token")]
    Malformed,

    /// Token expired or not active yet
    #[error("token expired or not valid yet")]
    Expired,

    #[error("unauthorized")]
    Unauthorized,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("token signing failed: {0}")]
    SigningFailed(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    /// Bad or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CredError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CredError::AccountNotFound
                | CredError::EmailNotFound
                | CredError::KeyNotFound
                | CredError::TokenNotFound
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CredError::DuplicateEmail | CredError::KeyAlreadyExists)
    }

    /// Failures that must reach external callers only as "forbidden"
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            CredError::WrongSigningMethod
                | CredError::Malformed
                | CredError::Expired
                | CredError::Unauthorized
                | CredError::PasswordMismatch
        )
    }

    fn code(&self) -> &'static str {
        match self {
            CredError::InvalidName => "InvalidName",
            CredError::InvalidEmail => "InvalidEmail",
            CredError::InvalidPassword => "InvalidPassword",
            CredError::NilArgument(_) => "InvalidRequest",
            CredError::AccountNotFound => "AccountNotFound",
            CredError::EmailNotFound => "EmailNotFound",
            CredError::KeyNotFound => "KeyNotFound",
            CredError::TokenNotFound => "TokenNotFound",
            CredError::DuplicateEmail => "DuplicateEmail",
            CredError::KeyAlreadyExists => "KeyAlreadyExists",
            _ => "InternalServerError",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
    pub message: String,
}

/// Convert CredError to HTTP response
impl IntoResponse for CredError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = if self.is_security() {
            (StatusCode::FORBIDDEN, "Forbidden", "forbidden".to_string())
        } else if self.is_not_found() {
            (StatusCode::NOT_FOUND, self.code(), self.to_string())
        } else if self.is_conflict() {
            (StatusCode::CONFLICT, self.code(), self.to_string())
        } else {
            match self {
                CredError::InvalidName
                | CredError::InvalidEmail
                | CredError::InvalidPassword
                | CredError::NilArgument(_) => {
                    (StatusCode::BAD_REQUEST, self.code(), self.to_string())
                }
                _ => {
                    tracing::error!(error = %self, "internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "InternalServerError",
                        "Internal server error".to_string(), // Don't leak details
                    )
                }
            }
        };

        let body = Json(ErrorResponse {
            status: "error".to_string(),
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for credential operations
pub type CredResult<T> = Result<T, CredError>;
