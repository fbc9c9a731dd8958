use std::ffi::OsString;
use std::path::{Path, PathBuf};

use midly::{MidiMessage, Smf, TrackEventKind};
use tracing::{debug, info, warn};

use crate::error::{Result, VelocityError};
use crate::postprocessing::result_csv::predicted_path;
use crate::tools::{tool_label, ToolRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiSummary {
    pub tracks: usize,
    /// NoteOn events with a non-zero velocity.
    pub notes: usize,
}

/// Parse a Standard MIDI File and count its tracks and sounding notes.
pub fn summarize_midi(bytes: &[u8]) -> std::result::Result<MidiSummary, midly::Error> {
    let smf = Smf::parse(bytes)?;
    let notes = smf
        .tracks
        .iter()
        .flatten()
        .filter(|event| {
            matches!(
                event.kind,
                TrackEventKind::Midi { message: MidiMessage::NoteOn { vel, .. }, .. } if vel.as_int() > 0
            )
        })
        .count();

    Ok(MidiSummary {
        tracks: smf.tracks.len(),
        notes,
    })
}

/// `<stem>_predicted.<ext>` for the original MIDI file.
pub fn predicted_midi_path(midi_path: &Path) -> PathBuf {
    let extension = midi_path.extension().map(|e| e.to_string_lossy().into_owned());
    predicted_path(midi_path, extension.as_deref())
}

/// Turn the predicted CSV back into a MIDI file with the external converter.
///
/// # Arguments
///
/// * `runner` - Process abstraction used to launch the converter.
/// * `tool` - Path of the CSV→MIDI executable.
/// * `predicted_csv` - CSV written by [`crate::postprocessing::result_csv::write_predicted_csv`].
/// * `midi_path` - The original MIDI file.
///
/// # Returns
///
/// * Path of the predicted MIDI file, once the converter exited with 0 and the file parses.
pub fn assemble_midi<T: ToolRunner + ?Sized>(
    runner: &T,
    tool: &Path,
    predicted_csv: &Path,
    midi_path: &Path,
) -> Result<PathBuf> {
    let label = tool_label(tool);
    let args = [OsString::from(predicted_csv), OsString::from(midi_path)];
    let output = runner.run(tool, &args)?;
    debug!(tool = %label, stdout = %output.stdout, "converter output");
    info!(tool = %label, exit_code = output.exit_code, "csv to midi conversion finished");

    if !output.success() {
        warn!(tool = %label, exit_code = output.exit_code, "converter did not execute correctly");
        return Err(VelocityError::MidiAssemblyFailed(format!(
            "{} exited with code {}",
            label, output.exit_code
        )));
    }

    let output_path = predicted_midi_path(midi_path);
    let bytes = std::fs::read(&output_path).map_err(|e| {
        VelocityError::MidiAssemblyFailed(format!("missing output {}: {}", output_path.display(), e))
    })?;
    let summary = summarize_midi(&bytes).map_err(|e| {
        VelocityError::MidiAssemblyFailed(format!("invalid output {}: {}", output_path.display(), e))
    })?;

    info!(
        midi = %output_path.display(),
        tracks = summary.tracks,
        notes = summary.notes,
        "assembled predicted midi"
    );
    Ok(output_path)
}
