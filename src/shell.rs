//! Upload handling and per-user state for the command-line front end.
//!
//! The shell decides which files may be uploaded and remembers the current one. It never
//! looks inside the image: bytes go to the analyzer exactly as they were read from disk.

use crate::error::{AutosageError, Result};
use crate::llm::analyzer::VehicleAnalyzer;
use crate::llm::models::{AnalysisResult, ImagePayload};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions the uploader accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Shown when analysis is requested before any image was uploaded.
pub const UPLOAD_FIRST_MESSAGE: &str = "Please upload an image first!";

/// Map a file name to the media type declared for it, if the extension is accepted.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Read an image file into a payload without touching its bytes.
pub fn load_image(path: &Path) -> Result<ImagePayload> {
    let mime_type = mime_type_for(path).ok_or_else(|| {
        AutosageError::UnsupportedImage(format!(
            "{} (accepted: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        ))
    })?;

    let data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(AutosageError::UnsupportedImage(format!("{} is empty", path.display())));
    }

    debug!(path = %path.display(), mime_type, bytes = data.len(), "Image loaded");
    Ok(ImagePayload::new(mime_type, data))
}

/// What happened when the user asked for an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing uploaded yet; no call was made.
    NeedsUpload,
    Completed(AnalysisResult),
}

impl SessionOutcome {
    pub fn message(&self) -> String {
        match self {
            SessionOutcome::NeedsUpload => UPLOAD_FIRST_MESSAGE.to_string(),
            SessionOutcome::Completed(result) => result.message(),
        }
    }
}

/// The currently uploaded image, if any.
#[derive(Debug, Default)]
pub struct AnalysisSession {
    uploaded: Option<(PathBuf, ImagePayload)>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current upload. On error the previous upload is kept.
    pub fn upload(&mut self, path: impl AsRef<Path>) -> Result<&ImagePayload> {
        let path = path.as_ref();
        let payload = load_image(path)?;
        info!(path = %path.display(), "Image uploaded");
        let (_, payload) = self.uploaded.insert((path.to_path_buf(), payload));
        Ok(payload)
    }

    pub fn clear(&mut self) {
        self.uploaded = None;
    }

    pub fn has_upload(&self) -> bool {
        self.uploaded.is_some()
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.uploaded.as_ref().map(|(path, _)| path.as_path())
    }

    /// Analyze the uploaded image, or report that there is nothing to analyze.
    pub async fn analyze(&self, analyzer: &VehicleAnalyzer) -> SessionOutcome {
        match &self.uploaded {
            None => SessionOutcome::NeedsUpload,
            Some((_, payload)) => {
                SessionOutcome::Completed(analyzer.analyze_vehicle(payload.clone()).await)
            }
        }
    }
}
