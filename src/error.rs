//! Error types for the matrix builder.
//!
//! Configuration errors are fatal and raised before any job is dispatched.
//! Everything else is a per-day error: the batch runner records it against
//! the day and keeps going.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures produced by the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or inconsistent configuration (fatal, detected before dispatch).
    #[error("configuration error: {0}")]
    Config(String),

    /// A duration string could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    Duration { input: String, reason: String },

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A value in an input file could not be parsed.
    #[error("parse error in {path} (row {row}): {reason}")]
    Parse {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    /// A column the run needs is absent from the series.
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// The native sampling period of a series could not be inferred.
    #[error("irregular series: {0}")]
    IrregularSeries(String),

    /// A series violates its structural invariants.
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// Writing an output artifact failed.
    #[error("export error: {0}")]
    Export(String),

    /// Anything else.
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Build a generic error.
    pub fn generic(msg: impl Into<String>) -> Self {
        Error::Generic(msg.into())
    }

    /// Whether this error must abort the run before dispatch.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Duration { .. })
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Generic(msg)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Export(format!("JSON: {e}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(format!("TOML: {e}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Export(format!("TOML: {e}"))
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::InvalidSeries(format!("shape mismatch: {e}"))
    }
}

impl From<ndarray_npy::WriteNpyError> for Error {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        Error::Export(format!("npy: {e}"))
    }
}
