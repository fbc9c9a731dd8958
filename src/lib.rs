//! MIDI velocity inference.
//!
//! Converts an uploaded performance to per-note features, runs a pretrained
//! sequence model over fixed-length windows of those features and writes a new
//! MIDI file carrying the predicted velocities.

pub mod config;
pub mod constants;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod tools;
pub mod upload;
pub mod preprocessing {
    pub mod feature_table;
    pub mod metadata;
    pub mod windowed_features;
}
pub mod postprocessing {
    pub mod midi;
    pub mod result_csv;
}

pub use config::Config;
pub use error::{Result, UploadError, VelocityError};
pub use pipeline::{InferenceReport, VelocityInfer};
