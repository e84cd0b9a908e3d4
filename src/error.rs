//! Error types and result aliases for the AutoSage library.
//!
//! This module defines the core error type [`AutosageError`] and the [`Result`] type alias
//! used throughout the library. Gateways return `Result<T>`; the analyzer is the only
//! place where errors are folded into a displayable [`AnalysisResult`](crate::llm::AnalysisResult).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutosageError {
    #[error("LLM gateway error: {0}")]
    GatewayError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {}", with_causes(.0))]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timeout error: {0}")]
    TimeoutError(String),
}

impl AutosageError {
    /// True when the remote service reported that the usage allowance is exhausted.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, AutosageError::QuotaExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, AutosageError>;

/// Render an error followed by each of its sources, so the root cause survives display.
fn with_causes(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
