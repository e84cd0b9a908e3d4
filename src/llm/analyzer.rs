use crate::error::AutosageError;
use crate::llm::gateway::{VisionGateway, DEFAULT_TIMEOUT};
use crate::llm::models::{AnalysisRequest, AnalysisResult, ImagePayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed instruction sent alongside every vehicle photo.
pub const VEHICLE_EXPERT_PROMPT: &str = "
You are a professional automobile expert AI.

Analyze the uploaded vehicle image and give:

1. Brand
2. Model Name (guess if unsure)
3. Vehicle Type (Bike/Car/Scooter/SUV)
4. Engine Capacity (approx CC)
5. Mileage (approx km/l)
6. Price Range in India
7. Launch Year (approx)
8. Top 5 Key Features
9. Suitable For (city/highway/family/offroad)
10. Short Review

Give answer in clean bullet points.
";

/// Turns one instruction and one image into one displayable result
pub struct VehicleAnalyzer {
    gateway: Arc<dyn VisionGateway>,
    timeout: Duration,
}

impl VehicleAnalyzer {
    /// Create a new analyzer with the default timeout
    pub fn new(gateway: Arc<dyn VisionGateway>) -> Self {
        Self {
            gateway,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Analyze a vehicle photo with the built-in expert prompt
    pub async fn analyze_vehicle(&self, payload: ImagePayload) -> AnalysisResult {
        self.analyze(VEHICLE_EXPERT_PROMPT, payload).await
    }

    /// Run one analysis.
    ///
    /// Every failure is folded into the returned [`AnalysisResult`]; nothing propagates
    /// to the caller. The gateway is called at most once and a failed call is never
    /// re-attempted.
    pub async fn analyze(&self, instruction: &str, payload: ImagePayload) -> AnalysisResult {
        self.analyze_with_timeout(instruction, payload, self.timeout).await
    }

    /// Same as [`analyze`](Self::analyze) with an explicit bound on the wait.
    pub async fn analyze_with_timeout(
        &self,
        instruction: &str,
        payload: ImagePayload,
        timeout: Duration,
    ) -> AnalysisResult {
        if instruction.trim().is_empty() {
            return Self::fold(AutosageError::InvalidRequest(
                "instruction must not be empty".to_string(),
            ));
        }
        if payload.is_empty() {
            return Self::fold(AutosageError::InvalidRequest(
                "image data must not be empty".to_string(),
            ));
        }

        let request = AnalysisRequest::new(instruction, payload);
        info!(
            mime_type = %request.payload.mime_type,
            image_bytes = request.payload.len(),
            timeout_secs = timeout.as_secs(),
            "Starting analysis"
        );

        let outcome =
            tokio::time::timeout(timeout, self.gateway.generate(&request, timeout)).await;

        match outcome {
            Ok(Ok(text)) if text.is_empty() => Self::fold(AutosageError::GatewayError(
                "model returned no text".to_string(),
            )),
            Ok(Ok(text)) => {
                info!("Analysis completed");
                AnalysisResult::Success(text)
            }
            Ok(Err(err)) => Self::fold(err),
            Err(_) => Self::fold(AutosageError::TimeoutError(format!(
                "no answer within {:?}",
                timeout
            ))),
        }
    }

    fn fold(err: AutosageError) -> AnalysisResult {
        if err.is_quota_exceeded() {
            warn!("Analysis refused: {}", err);
            AnalysisResult::QuotaExceeded
        } else {
            warn!("Analysis failed: {}", err);
            AnalysisResult::Failed(err.to_string())
        }
    }
}
