//! Error taxonomy for the LERS core.
//!
//! Every fallible core operation returns a [`CoreResult`]. The variants map
//! one-to-one onto the HTTP statuses the API layer renders, which keeps the
//! translation at the REST boundary mechanical.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request was well-formed HTTP but semantically invalid
    /// (empty exam type, unknown patient, bad pagination bounds).
    #[error("invalid input: {0}")]
    Validation(String),

    /// The caller could not be identified (missing, unknown or expired token,
    /// or bad credentials at token issue time).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The caller is identified but not permitted to perform the operation.
    #[error("not authorised: {0}")]
    Authorization(String),

    /// The referenced record does not exist or is soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state (duplicate identifier,
    /// finalising an already finalized result).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The database was unavailable or a query failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A payload could not be serialised or deserialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl From<lers_types::TextError> for CoreError {
    fn from(e: lers_types::TextError) -> Self {
        CoreError::Validation(e.to_string())
    }
}
