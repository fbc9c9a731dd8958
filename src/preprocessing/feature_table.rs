use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::constants::{
    COLUMN_LENGTH, COLUMN_LOW_OCTAVE, COLUMN_NOTE_NUM, COLUMN_NOTE_NUM_DIFF, COLUMN_TIME,
    COLUMN_TIME_DIFF, COLUMN_VELOCITY,
};
use crate::error::{Result, VelocityError};
use crate::tools::{tool_label, ToolRunner};

const REQUIRED_COLUMNS: [&str; 7] = [
    COLUMN_TIME,
    COLUMN_TIME_DIFF,
    COLUMN_NOTE_NUM,
    COLUMN_LENGTH,
    COLUMN_NOTE_NUM_DIFF,
    COLUMN_LOW_OCTAVE,
    COLUMN_VELOCITY,
];

/// One note of the performance, as emitted by the MIDI→CSV converter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NoteRow {
    pub time: f32,
    pub time_diff: f32,
    pub note_num: f32,
    pub length: f32,
    pub note_num_diff: f32,
    pub low_octave: f32,
    pub velocity: f32,
}

impl NoteRow {
    pub fn get(&self, column: &str) -> Option<f32> {
        match column {
            COLUMN_TIME => Some(self.time),
            COLUMN_TIME_DIFF => Some(self.time_diff),
            COLUMN_NOTE_NUM => Some(self.note_num),
            COLUMN_LENGTH => Some(self.length),
            COLUMN_NOTE_NUM_DIFF => Some(self.note_num_diff),
            COLUMN_LOW_OCTAVE => Some(self.low_octave),
            COLUMN_VELOCITY => Some(self.velocity),
            _ => None,
        }
    }
}

/// Notes in onset order. Row order is the only link between predictions and notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<NoteRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<NoteRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[NoteRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<f32>> {
        self.rows
            .iter()
            .map(|row| row.get(name).ok_or_else(|| VelocityError::UnknownColumn(name.to_string())))
            .collect()
    }

    /// Parse CSV text with a header row. Every required column must be present;
    /// extra columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        // A header-only file never reaches row deserialization, so check names up front.
        let headers = csv_reader.headers()?.clone();
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|&&name| !headers.iter().any(|h| h == name))
        {
            return Err(csv::Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("missing required column '{missing}'"),
            )));
        }

        let rows = csv_reader
            .deserialize::<NoteRow>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn load_csv<P: AsRef<Path>>(path: P) -> std::result::Result<Self, csv::Error> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }
}

/// Sibling CSV the converter writes next to the MIDI file (`<stem>.csv`).
pub fn feature_csv_path(midi_path: &Path) -> PathBuf {
    midi_path.with_extension("csv")
}

/// Convert a MIDI file to its feature table with the external converter.
///
/// # Arguments
///
/// * `runner` - Process abstraction used to launch the converter.
/// * `tool` - Path of the MIDI→CSV executable.
/// * `midi_path` - The uploaded MIDI file; passed as the converter's only argument.
///
/// # Returns
///
/// * The feature table loaded from `<stem>.csv`, or `ConversionFailed`.
pub fn build_feature_table<T: ToolRunner + ?Sized>(
    runner: &T,
    tool: &Path,
    midi_path: &Path,
) -> Result<FeatureTable> {
    let label = tool_label(tool);
    let output = runner.run(tool, &[OsString::from(midi_path)])?;
    debug!(tool = %label, stdout = %output.stdout, "converter output");
    info!(tool = %label, exit_code = output.exit_code, "midi to csv conversion finished");

    if !output.success() {
        warn!(tool = %label, exit_code = output.exit_code, "converter did not execute correctly");
        return Err(VelocityError::ConversionFailed {
            tool: label,
            reason: format!("exit code {}", output.exit_code),
        });
    }

    let csv_path = feature_csv_path(midi_path);
    let table = FeatureTable::load_csv(&csv_path).map_err(|e| VelocityError::ConversionFailed {
        tool: label,
        reason: format!("unreadable output {}: {}", csv_path.display(), e),
    })?;

    info!(notes = table.len(), csv = %csv_path.display(), "loaded feature table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;

    const CSV: &str = "time,time_diff,note_num,length,note_num_diff,low_octave,velocity
0,0,60,2,0,0,80
3,3,64,1,4,0,72
4,1,43,3,-21,1,90
";

    struct FixedRunner {
        exit_code: i32,
        write_csv: Option<&'static str>,
    }

    impl ToolRunner for FixedRunner {
        fn run(&self, _tool: &Path, args: &[OsString]) -> Result<ToolOutput> {
            if let Some(csv) = self.write_csv {
                std::fs::write(feature_csv_path(Path::new(&args[0])), csv).unwrap();
            }
            Ok(ToolOutput {
                exit_code: self.exit_code,
                stdout: "done".to_string(),
            })
        }
    }

    #[test]
    fn test_parse_preserves_row_order() {
        let table = FeatureTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column("note_num").unwrap(), vec![60.0, 64.0, 43.0]);
        assert_eq!(table.column("note_num_diff").unwrap(), vec![0.0, 4.0, -21.0]);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let csv = "time,time_diff,note_num,length,note_num_diff,velocity\n0,0,60,2,0,80\n";
        assert!(FeatureTable::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_header_only_csv_missing_columns_is_an_error() {
        assert!(FeatureTable::from_reader("time,note_num\n".as_bytes()).is_err());

        let complete = "time,time_diff,note_num,length,note_num_diff,low_octave,velocity\n";
        assert!(FeatureTable::from_reader(complete.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_header_only_converter_output_is_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let midi = dir.path().join("etude.mid");
        let runner = FixedRunner { exit_code: 0, write_csv: Some("time,note_num\n") };

        let result = build_feature_table(&runner, Path::new("midi2csv"), &midi);
        assert!(matches!(result, Err(VelocityError::ConversionFailed { .. })));
    }

    #[test]
    fn test_unknown_column_name() {
        let table = FeatureTable::from_reader(CSV.as_bytes()).unwrap();
        assert!(matches!(table.column("pedal"), Err(VelocityError::UnknownColumn(_))));
    }

    #[test]
    fn test_build_feature_table_reads_sibling_csv() {
        let dir = tempfile::tempdir().unwrap();
        let midi = dir.path().join("etude.mid");
        let runner = FixedRunner { exit_code: 0, write_csv: Some(CSV) };

        let table = build_feature_table(&runner, Path::new("midi2csv"), &midi).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_nonzero_exit_is_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let midi = dir.path().join("etude.mid");
        let runner = FixedRunner { exit_code: 1, write_csv: Some(CSV) };

        let result = build_feature_table(&runner, Path::new("midi2csv"), &midi);
        assert!(matches!(result, Err(VelocityError::ConversionFailed { .. })));
    }

    #[test]
    fn test_missing_output_is_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let midi = dir.path().join("etude.mid");
        let runner = FixedRunner { exit_code: 0, write_csv: None };

        let result = build_feature_table(&runner, Path::new("midi2csv"), &midi);
        assert!(matches!(result, Err(VelocityError::ConversionFailed { .. })));
    }
}
