//! Collection of all error types.
//!
//! All errors derive [`thiserror::Error`], making them composable when allowed
//! and compatible with application code using [`anyhow`][anyhow].
//!
//! [anyhow]: https://crates.io/crates/anyhow

use std::{ io, path::PathBuf };
use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Returned when the parameter file or a segment descriptor is unusable.
///
/// Every variant is fatal to a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required named parameter is absent.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// An indexed-vector parameter is shorter than required.
    #[error("parameter '{name}' has no entry at index {index}")]
    MissingIndex { name: String, index: usize },

    /// A parameter is present but has the wrong shape or value.
    #[error("invalid value for '{name}': {reason}")]
    BadValue { name: String, reason: String },

    /// A segment names a propagator that was never registered.
    #[error("invalid sequence name '{0}'")]
    UnknownSequence(String),

    /// One of the fixed-point kinetic propagators is not registered.
    #[error("fixed-point propagator '{0}' is not registered")]
    MissingPropagator(&'static str),

    /// The field carries a different number of components than configured.
    #[error("field has {found} components but {expected} internal states are configured")]
    StateCount { expected: usize, found: usize },

    /// Error reading the parameter file.
    #[error("cannot read parameter file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Error parsing the parameter file.
    #[error("cannot parse parameter file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn bad_value<S>(name: &str, reason: S) -> Self
    where S: Into<String>
    {
        Self::BadValue { name: name.to_string(), reason: reason.into() }
    }
}

/// Returned when a formula fails to compile.
///
/// Carries the full diagnostic context of the failure.
#[derive(Clone, Debug, Error, PartialEq)]
#[error(
    "Message:  {message}\nFormula:  {expr}\nToken:    {token}\nPosition: {pos}\nErrc:     {code}"
)]
pub struct FormulaError {
    /// Human-readable description.
    pub message: String,
    /// The full expression text.
    pub expr: String,
    /// The offending token, or an empty string at end of input.
    pub token: String,
    /// Character offset of the offending token.
    pub pos: usize,
    /// Numeric error code; see [`formula::ErrorCode`][crate::formula::ErrorCode].
    pub code: u32,
}

/// Returned from snapshot reads and writes.
///
/// These are recoverable: a controller abandons the current segment and moves
/// on.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Underlying I/O failure.
    #[error("snapshot i/o error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The binary header could not be encoded or decoded.
    #[error("snapshot header error on {path}: {source}")]
    Header { path: PathBuf, source: bincode::Error },

    /// The file's grid does not match the live field. Shapes list the point
    /// count along each active axis.
    #[error("snapshot {path} has grid shape {found:?}; expected {expected:?}")]
    Grid { path: PathBuf, expected: Vec<usize>, found: Vec<usize> },

    /// The requested component index is out of range.
    #[error("no field component {0}")]
    Component(usize),
}

/// Returned from propagators.
#[derive(Debug, Error)]
pub enum PropError {
    /// A propagator variant cannot act on the configured number of states.
    #[error("propagator '{name}' cannot act on {found} internal states")]
    StateCount { name: &'static str, found: usize },

    /// [`LinalgError`].
    #[error("linalg error: {0}")]
    Linalg(#[from] LinalgError),
}

/// Returned from the sequence controller.
#[derive(Debug, Error)]
pub enum RunError {
    /// [`ConfigError`]
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// [`FormulaError`]
    #[error("formula error:\n{0}")]
    Formula(#[from] FormulaError),

    /// [`SnapshotError`]
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// [`PropError`]
    #[error("propagation error: {0}")]
    Prop(#[from] PropError),

    /// Failure writing a diagnostic text file.
    #[error("cannot write diagnostics to {path}: {source}")]
    Output { path: PathBuf, source: io::Error },

    /// Failure building the worker pool.
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl RunError {
    /// Return `true` if the error should terminate the whole run rather than
    /// only the current segment.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Snapshot(_) | Self::Output { .. })
    }
}
