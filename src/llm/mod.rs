pub mod analyzer;
pub mod gateway;
pub mod gateways;
pub mod models;

pub use analyzer::{VehicleAnalyzer, VEHICLE_EXPERT_PROMPT};
pub use gateway::{VisionGateway, DEFAULT_TIMEOUT};
pub use models::{AnalysisRequest, AnalysisResult, ImagePayload, QUOTA_EXCEEDED_MESSAGE};
