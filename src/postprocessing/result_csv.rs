use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::constants::PREDICTED_SUFFIX;
use crate::error::{Result, VelocityError};
use crate::preprocessing::feature_table::FeatureTable;

/// Output row: original features coerced to integers plus the predicted velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredictedRow {
    pub time: i32,
    pub time_diff: i32,
    pub note_num: i32,
    pub note_num_diff: i32,
    pub length: i32,
    pub low_octave: i32,
    pub velocity: i32,
}

/// `<dir>/<stem>_predicted<.ext>` next to `path`, with `extension` replacing the original one.
pub fn predicted_path(path: &Path, extension: Option<&str>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match extension {
        Some(ext) if !ext.is_empty() => format!("{stem}{PREDICTED_SUFFIX}.{ext}"),
        _ => format!("{stem}{PREDICTED_SUFFIX}"),
    };
    path.with_file_name(file_name)
}

pub fn predicted_csv_path(midi_path: &Path) -> PathBuf {
    predicted_path(midi_path, Some("csv"))
}

/// Merge predicted velocities back into the feature rows, in row order.
pub fn merge_predictions(table: &FeatureTable, velocities: &[i32]) -> Result<Vec<PredictedRow>> {
    if table.len() != velocities.len() {
        return Err(VelocityError::ShapeMismatch {
            expected: vec![table.len()],
            actual: vec![velocities.len()],
        });
    }

    Ok(table
        .rows()
        .iter()
        .zip(velocities)
        .map(|(row, &velocity)| PredictedRow {
            time: row.time as i32,
            time_diff: row.time_diff as i32,
            note_num: row.note_num as i32,
            note_num_diff: row.note_num_diff as i32,
            length: row.length as i32,
            low_octave: row.low_octave as i32,
            velocity,
        })
        .collect())
}

pub fn write_rows<W: Write>(writer: W, rows: &[PredictedRow]) -> std::result::Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write `<stem>_predicted.csv` next to the input MIDI file and return its path.
pub fn write_predicted_csv(
    table: &FeatureTable,
    velocities: &[i32],
    midi_path: &Path,
) -> Result<PathBuf> {
    let rows = merge_predictions(table, velocities)?;
    let output_path = predicted_csv_path(midi_path);

    let file = std::fs::File::create(&output_path).map_err(|e| {
        VelocityError::MidiAssemblyFailed(format!("cannot create {}: {}", output_path.display(), e))
    })?;
    write_rows(file, &rows).map_err(|e| {
        VelocityError::MidiAssemblyFailed(format!("cannot write {}: {}", output_path.display(), e))
    })?;

    info!(rows = rows.len(), csv = %output_path.display(), "wrote predicted csv");
    Ok(output_path)
}
