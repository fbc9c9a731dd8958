//! Error types for the velocity inference pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline errors. Every variant ends the current request.
#[derive(Debug, Error)]
pub enum VelocityError {
    #[error("dataset metadata unavailable at {path}: {reason}")]
    MetadataUnavailable { path: PathBuf, reason: String },

    #[error("{tool} conversion failed: {reason}")]
    ConversionFailed { tool: String, reason: String },

    #[error("{tool} did not finish within {seconds}s")]
    ConversionTimeout { tool: String, seconds: u64 },

    #[error("feature table has no notes")]
    EmptyInput,

    #[error("degenerate normalization range for '{feature}' (min == max == {value})")]
    DegenerateNormalizationRange { feature: String, value: f32 },

    #[error("unknown feature column '{0}'")]
    UnknownColumn(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("inference engine error: {0}")]
    InferenceEngineError(String),

    #[error("MIDI assembly failed: {0}")]
    MidiAssemblyFailed(String),
}

impl From<ort::Error> for VelocityError {
    fn from(err: ort::Error) -> Self {
        VelocityError::InferenceEngineError(err.to_string())
    }
}

/// Failures while accepting an uploaded file, before any processing starts.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("uploaded file '{0}' is empty")]
    Empty(String),

    #[error("upload I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("uploaded file '{name}' is not a standard MIDI file: {reason}")]
    NotMidi { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, VelocityError>;
