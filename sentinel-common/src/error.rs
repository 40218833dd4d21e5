use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type. Component-local errors (judge, pairing, control
/// channel) carry their own richer enums and convert into this one at the
/// orchestrator boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("classifier error: {message}")]
    Classifier { message: String, fatal: bool },

    #[error("pairing error: {0}")]
    Pairing(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("mqtt error: {0}")]
    Mqtt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True only for a [`Error::Classifier`] that originated from an
    /// auth/quota failure the operator must fix, never from a transient
    /// output-parse glitch. Every other variant is not a classifier error
    /// at all, so it is not fatal in this sense.
    pub fn is_classifier_fatal(&self) -> bool {
        matches!(self, Error::Classifier { fatal: true, .. })
    }
}
