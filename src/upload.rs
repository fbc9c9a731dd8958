use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::constants::WEB_OUTPUT_DIR;
use crate::error::UploadError;
use crate::postprocessing::midi::summarize_midi;

/// Stores each upload in its own `<root>/<uuid>/` directory so concurrent
/// requests never share intermediate files.
#[derive(Debug, Clone)]
pub struct UploadService {
    root: PathBuf,
}

impl UploadService {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Save an uploaded MIDI file and return its path inside a fresh request directory.
    pub fn store(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, UploadError> {
        if contents.is_empty() {
            return Err(UploadError::Empty(file_name.to_string()));
        }

        let summary = summarize_midi(contents).map_err(|e| UploadError::NotMidi {
            name: file_name.to_string(),
            reason: e.to_string(),
        })?;

        // Only the final component is kept; client-side directories are dropped.
        let safe_name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| UploadError::NotMidi {
                name: file_name.to_string(),
                reason: "no file name".to_string(),
            })?;

        let folder = self.root.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&folder)?;
        let path = std::path::absolute(folder.join(safe_name))?;
        std::fs::write(&path, contents)?;

        info!(
            path = %path.display(),
            tracks = summary.tracks,
            notes = summary.notes,
            "stored upload"
        );
        Ok(path)
    }

    /// Read a local file and store it as an upload.
    pub fn store_file(&self, source: &Path) -> Result<PathBuf, UploadError> {
        let contents = std::fs::read(source)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.store(&name, &contents)
    }
}

/// Copy a result into `<web_root>/output/<request-folder>/` and return its public URL.
pub fn publish(output_path: &Path, web_root: &Path, base_url: &str) -> std::io::Result<String> {
    let folder = output_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let web_dir = web_root.join(WEB_OUTPUT_DIR).join(&folder);
    std::fs::create_dir_all(&web_dir)?;
    let web_path = web_dir.join(&file_name);
    std::fs::copy(output_path, &web_path)?;
    info!(from = %output_path.display(), to = %web_path.display(), "published result");

    Ok(format!(
        "{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        WEB_OUTPUT_DIR,
        folder,
        file_name
    ))
}
