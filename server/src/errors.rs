use serde::Serialize;
use thiserror::Error;
use warp::reject;

/// A single schema constraint violation, reported by field.
#[derive(Clone, Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("database error")]
    Sqlx { source: sqlx::Error },

    /// Represents an error with the request.
    #[error("bad request")]
    BadRequest,

    /// Represents one or more schema constraint violations.
    #[error("validation failed")]
    Validation { errors: Vec<FieldError> },

    /// Represents a unique constraint violation.
    #[error("duplicate value for {field}")]
    DuplicateKey { field: String },

    /// Represents a missing document.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Represents a mutation attempted by someone other than the owner.
    #[error("not authorized to modify this recipe")]
    Forbidden,

    /// Represents a recipe already present in the caller's favorites.
    #[error("recipe is already in favorites")]
    DuplicateFavorite,

    /// Represents a malformed document ID in the request path.
    #[error("invalid ID: {0}")]
    InvalidId(String),

    /// Represents a request without usable credentials.
    #[error("missing credentials")]
    MissingCredentials,

    /// Represents a credential that matches no active session.
    #[error("invalid or expired session")]
    InvalidSession,

    /// Represents an error caused by missing parts in a form submission.
    #[error("missing parts")]
    PartsMissing,

    /// Represents an error parsing a form submission.
    #[error("malformed form submission")]
    MalformedFormSubmission,

    /// Represents malformed JSON in the recipe metadata part.
    #[error("malformed recipe metadata: {source}")]
    MalformedRecipeMetadata { source: serde_json::Error },

    /// Represents a failure in the media store.
    #[error("media store error")]
    MediaStore { source: StoreError },
}

impl BackendError {
    /// Returns the field-level messages for validation failures, if any.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            BackendError::Validation { errors } => Some(errors),
            _ => None,
        }
    }
}

/// Enumerates errors returned by the media store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Represents a filesystem error while saving or deleting media.
    #[error("I/O error")]
    Io { source: std::io::Error },
}

impl reject::Reject for BackendError {}

impl From<StoreError> for BackendError {
    fn from(source: StoreError) -> Self {
        BackendError::MediaStore { source }
    }
}
