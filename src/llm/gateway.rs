use crate::error::Result;
use crate::llm::models::AnalysisRequest;
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound on how long one analysis may wait for the hosted model.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstract interface for hosted multimodal model providers
///
/// An implementation issues exactly one outbound call per `generate`, bounds it by
/// `timeout`, and never retries. Quota exhaustion must surface as
/// [`AutosageError::QuotaExceeded`](crate::error::AutosageError::QuotaExceeded) so the
/// analyzer can tell it apart from every other failure. An `Ok` answer should carry
/// text; the analyzer reports an empty one as a failure.
#[async_trait]
pub trait VisionGateway: Send + Sync {
    /// Send the instruction and image, returning the model's text answer
    async fn generate(&self, request: &AnalysisRequest, timeout: Duration) -> Result<String>;
}
