use std::fmt;

/// Advisory shown when the hosted service reports that the usage allowance is used up.
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Error: API Quota Exceeded. Please try again later or use a different API key.";

/// Raw image bytes plus the media type declared by whoever supplied them.
///
/// The bytes are never decoded or re-encoded locally, and the media type is not
/// checked here; the hosted service is the one that rejects types it cannot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// One instruction paired with one image, alive for a single call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub instruction: String,
    pub payload: ImagePayload,
}

impl AnalysisRequest {
    pub fn new(instruction: impl Into<String>, payload: ImagePayload) -> Self {
        Self {
            instruction: instruction.into(),
            payload,
        }
    }
}

/// Outcome of one analysis.
///
/// Callers branch on the variant; [`AnalysisResult::message`] renders the text the
/// user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    /// The model's answer, exactly as returned.
    Success(String),
    /// The hosted service refused the call because the quota is exhausted.
    QuotaExceeded,
    /// Anything else went wrong; carries the failure description.
    Failed(String),
}

impl AnalysisResult {
    pub fn message(&self) -> String {
        match self {
            AnalysisResult::Success(text) => text.clone(),
            AnalysisResult::QuotaExceeded => QUOTA_EXCEEDED_MESSAGE.to_string(),
            AnalysisResult::Failed(description) => format!("An error occurred: {}", description),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success(_))
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
