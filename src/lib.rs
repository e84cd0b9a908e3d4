pub mod error;
pub mod llm;
pub mod shell;

pub use error::{AutosageError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{AutosageError, Result};
    pub use crate::llm::gateways::{GeminiConfig, GeminiGateway};
    pub use crate::llm::{
        AnalysisRequest, AnalysisResult, ImagePayload, VehicleAnalyzer, VisionGateway,
        VEHICLE_EXPERT_PROMPT,
    };
    pub use crate::shell::{AnalysisSession, SessionOutcome};
}
