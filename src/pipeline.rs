//! The five-step velocity inference pipeline.
//!
//! MIDI → feature CSV → normalized windows → model → predicted CSV → MIDI.
//! Each step finishes before the next starts and any error ends the request.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::constants::{COLUMNS_LABEL, COLUMNS_TRAIN};
use crate::error::{Result, VelocityError};
use crate::inference::{predict_velocities, VelocityModel};
use crate::postprocessing::midi::assemble_midi;
use crate::postprocessing::result_csv::write_predicted_csv;
use crate::preprocessing::feature_table::{build_feature_table, FeatureTable};
use crate::preprocessing::metadata::DatasetMetadata;
use crate::preprocessing::windowed_features::make_dataset;
use crate::tools::ToolRunner;

pub struct VelocityInfer<R, M> {
    config: Config,
    runner: R,
    model: M,
}

impl<R: ToolRunner, M: VelocityModel> VelocityInfer<R, M> {
    pub fn new(config: Config, runner: R, model: M) -> Self {
        Self {
            config,
            runner,
            model,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Predict velocities for one MIDI file and return the path of the new file.
    pub fn infer(&self, midi_path: &Path) -> Result<PathBuf> {
        let _span = info_span!("infer", midi = %midi_path.display()).entered();

        let (metadata, table) = self.preprocess(midi_path)?;
        let velocities = self.predict(&metadata, &table)?;

        let predicted_csv = write_predicted_csv(&table, &velocities, midi_path)?;
        let output = assemble_midi(
            &self.runner,
            &self.config.csv2midi_path(),
            &predicted_csv,
            midi_path,
        )?;

        info!(output = %output.display(), "inference finished");
        Ok(output)
    }

    fn preprocess(&self, midi_path: &Path) -> Result<(DatasetMetadata, FeatureTable)> {
        let table = build_feature_table(&self.runner, &self.config.midi2csv_path(), midi_path)?;
        let metadata = DatasetMetadata::load(&self.config.metadata_path)?;
        Ok((metadata, table))
    }

    fn predict(&self, metadata: &DatasetMetadata, table: &FeatureTable) -> Result<Vec<i32>> {
        let dataset = make_dataset(table, &COLUMNS_TRAIN, &COLUMNS_LABEL, metadata)?;
        predict_velocities(
            &self.model,
            &dataset.inputs,
            metadata.velocity_max,
            dataset.note_count,
        )
    }
}

/// What the caller sees: upload status, pipeline status, a message, and the result location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceReport {
    pub uploaded: bool,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InferenceReport {
    pub fn upload_failed(reason: impl std::fmt::Display) -> Self {
        Self {
            uploaded: false,
            success: false,
            message: format!("File Upload Failed: {reason}"),
            output_path: None,
            url: None,
        }
    }

    pub fn from_result(result: &Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Self {
                uploaded: true,
                success: true,
                message: "Inference Finished!".to_string(),
                output_path: Some(path.clone()),
                url: None,
            },
            Err(err) => {
                warn!(error = %err, "inference failed");
                Self::inference_failed(err)
            }
        }
    }

    fn inference_failed(err: &VelocityError) -> Self {
        Self {
            uploaded: true,
            success: false,
            message: format!("Inference Failed: {err}"),
            output_path: None,
            url: None,
        }
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = Some(url);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_success() {
        let report = InferenceReport::from_result(&Ok(PathBuf::from("/u/a/song_predicted.mid")));
        assert!(report.uploaded && report.success);
        assert_eq!(report.output_path, Some(PathBuf::from("/u/a/song_predicted.mid")));
    }

    #[test]
    fn test_report_from_failure_has_no_path() {
        let report = InferenceReport::from_result(&Err(VelocityError::EmptyInput));
        assert!(report.uploaded);
        assert!(!report.success);
        assert!(report.output_path.is_none());
        assert!(report.message.contains("no notes"));
    }

    #[test]
    fn test_upload_failure_is_distinct() {
        let report = InferenceReport::upload_failed("disk full");
        assert!(!report.uploaded);
        assert!(!report.success);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["uploaded"], false);
        assert!(json.get("output_path").is_none());
    }
}
