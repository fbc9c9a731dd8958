use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    COLUMN_LENGTH, COLUMN_NOTE_NUM, COLUMN_NOTE_NUM_DIFF, COLUMN_TIME_DIFF, COLUMN_VELOCITY,
};
use crate::error::{Result, VelocityError};

/// Min/max bounds recorded when the training dataset was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub train_time_diff_min: i32,
    pub train_time_diff_max: i32,
    pub note_num_min: i32,
    pub note_num_max: i32,
    pub note_num_diff_min: i32,
    pub note_num_diff_max: i32,
    pub length_min: i32,
    pub length_max: i32,
    pub velocity_min: i32,
    pub velocity_max: i32,
}

/// A `(min, max)` pair used to rescale one feature into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
}

impl Bounds {
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            min: min as f32,
            max: max as f32,
        }
    }

    /// Width of the range, rejecting `min == max` instead of dividing by zero.
    pub fn range(&self, feature: &str) -> Result<f32> {
        let range = self.max - self.min;
        if range == 0.0 {
            return Err(VelocityError::DegenerateNormalizationRange {
                feature: feature.to_string(),
                value: self.min,
            });
        }
        Ok(range)
    }

    pub fn normalize(&self, feature: &str, value: f32) -> Result<f32> {
        Ok((value - self.min) / self.range(feature)?)
    }

    /// Inverse of [`Bounds::normalize`].
    pub fn denormalize(&self, value: f32) -> f32 {
        value * (self.max - self.min) + self.min
    }
}

impl DatasetMetadata {
    /// Read the metadata record from a JSON file.
    ///
    /// Any failure (missing file, bad JSON, missing field) is fatal for the request.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| {
            warn!(path = %path.display(), %reason, "failed to read dataset metadata");
            VelocityError::MetadataUnavailable {
                path: path.to_path_buf(),
                reason,
            }
        };

        let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let metadata: DatasetMetadata =
            serde_json::from_str(&content).map_err(|e| unavailable(e.to_string()))?;

        info!(path = %path.display(), velocity_max = metadata.velocity_max, "loaded dataset metadata");
        Ok(metadata)
    }

    /// Normalization bounds for a feature column.
    ///
    /// Returns `None` for columns that are fed to the model as-is (`low_octave`).
    pub fn bounds_for(&self, column: &str) -> Option<Bounds> {
        match column {
            COLUMN_TIME_DIFF => Some(Bounds::new(self.train_time_diff_min, self.train_time_diff_max)),
            COLUMN_NOTE_NUM => Some(Bounds::new(self.note_num_min, self.note_num_max)),
            COLUMN_LENGTH => Some(Bounds::new(self.length_min, self.length_max)),
            COLUMN_NOTE_NUM_DIFF => Some(Bounds::new(self.note_num_diff_min, self.note_num_diff_max)),
            COLUMN_VELOCITY => Some(self.velocity_bounds()),
            _ => None,
        }
    }

    pub fn velocity_bounds(&self) -> Bounds {
        Bounds::new(self.velocity_min, self.velocity_max)
    }
}
