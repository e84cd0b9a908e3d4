//! Gemini Gateway for vision requests.
//!
//! This module talks to the `generateContent` endpoint of the Gemini API, sending one
//! text part and one inline image part, and reads back the text of the first candidate.

use crate::error::{AutosageError, Result};
use crate::llm::gateway::{VisionGateway, DEFAULT_TIMEOUT};
use crate::llm::models::AnalysisRequest;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";

/// Configuration for connecting to the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Bound on establishing the connection. The whole-request bound is the `timeout`
    /// passed to each `generate` call.
    pub connect_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GOOGLE_API_KEY").unwrap_or_default(),
            base_url: std::env::var("GEMINI_API_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GeminiConfig {
    /// Read the configuration from the environment, requiring an API key.
    pub fn from_env() -> Result<Self> {
        let config = Self::default();
        if config.api_key.trim().is_empty() {
            return Err(AutosageError::ConfigError(
                "GOOGLE_API_KEY is not set".to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Gateway for the hosted Gemini service.
pub struct GeminiGateway {
    client: Client,
    config: GeminiConfig,
}

impl GeminiGateway {
    /// Create a new Gemini gateway with configuration read from the environment.
    pub fn new() -> Self {
        Self::with_config(GeminiConfig::default())
    }

    /// Create a new Gemini gateway with custom configuration.
    pub fn with_config(config: GeminiConfig) -> Self {
        let client = Client::builder().connect_timeout(config.connect_timeout).build().unwrap();

        Self { client, config }
    }

    /// Create gateway with custom API key and base URL.
    pub fn with_api_key_and_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self::with_config(GeminiConfig {
            api_key: api_key.into(),
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl Default for GeminiGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn build_request_body(request: &AnalysisRequest) -> GenerateContentRequest<'_> {
    let encoded = general_purpose::STANDARD.encode(&request.payload.data);

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Text {
                    text: &request.instruction,
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: &request.payload.mime_type,
                        data: encoded,
                    },
                },
            ],
        }],
    }
}

/// Turn a non-success HTTP response into the matching error.
fn classify_error_response(status: StatusCode, body: &str) -> AutosageError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let remote_status = envelope.as_ref().and_then(|e| e.error.status.clone());
    let message = envelope
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || remote_status.as_deref() == Some(QUOTA_STATUS) {
        return AutosageError::QuotaExceeded(if message.is_empty() {
            QUOTA_STATUS.to_string()
        } else {
            message
        });
    }

    if message.is_empty() {
        AutosageError::ApiError(status.to_string())
    } else {
        AutosageError::ApiError(format!("{} - {}", status, message))
    }
}

/// Pull the answer text out of a decoded response.
fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!(" (block reason: {})", r))
            .unwrap_or_default();
        return Err(AutosageError::GatewayError(format!(
            "Response contained no candidates{}",
            reason
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .map(|r| format!(" (finish reason: {})", r))
            .unwrap_or_default();
        return Err(AutosageError::GatewayError(format!(
            "Response contained no text{}",
            reason
        )));
    }

    Ok(text)
}

fn classify_transport_error(err: reqwest::Error, timeout: Duration) -> AutosageError {
    // Connection-level timeouts also report `is_timeout`.
    if err.is_timeout() {
        AutosageError::TimeoutError(format!("request exceeded {:?}", timeout))
    } else {
        AutosageError::HttpError(err)
    }
}

#[async_trait]
impl VisionGateway for GeminiGateway {
    async fn generate(&self, request: &AnalysisRequest, timeout: Duration) -> Result<String> {
        info!("Delegating to Gemini for image analysis");
        debug!(
            model = %self.config.model,
            mime_type = %request.payload.mime_type,
            image_bytes = request.payload.len(),
            "Building generateContent request"
        );

        if self.config.api_key.trim().is_empty() {
            return Err(AutosageError::ConfigError("GOOGLE_API_KEY is not set".to_string()));
        }

        let body = build_request_body(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport_error(e, timeout))?;

        if !status.is_success() {
            let err = classify_error_response(status, &text);
            warn!(status = %status, "Gemini request failed: {}", err);
            return Err(err);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;
        let answer = extract_text(parsed)?;
        debug!(chars = answer.len(), "Gemini answer received");

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ImagePayload;

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest::new(
            "Identify this vehicle",
            ImagePayload::new("image/jpeg", b"fake_jpeg_bytes".to_vec()),
        )
    }

    fn gateway_for(server: &mockito::Server) -> GeminiGateway {
        GeminiGateway::with_config(GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: server.url(),
            model: "gemini-2.5-flash".to_string(),
            connect_timeout: DEFAULT_TIMEOUT,
        })
    }

    const PATH: &str = "/models/gemini-2.5-flash:generateContent";

    #[test]
    fn test_gemini_config_custom() {
        let config = GeminiConfig {
            api_key: "key".to_string(),
            base_url: "http://localhost:9999".to_string(),
            model: "gemini-pro-vision".to_string(),
            connect_timeout: Duration::from_secs(5),
        };
        let gateway = GeminiGateway::with_config(config);

        assert_eq!(gateway.config().model, "gemini-pro-vision");
        assert_eq!(gateway.config().connect_timeout, Duration::from_secs(5));
        assert_eq!(
            gateway.endpoint(),
            "http://localhost:9999/models/gemini-pro-vision:generateContent"
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let gateway = GeminiGateway::with_api_key_and_base_url("key", "http://host/v1beta/");
        assert!(gateway.endpoint().starts_with("http://host/v1beta/models/"));
    }

    #[test]
    fn test_request_body_orders_text_before_image() {
        let request = sample_request();
        let body = serde_json::to_value(build_request_body(&request)).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "Identify this vehicle");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(
            parts[1]["inline_data"]["data"],
            general_purpose::STANDARD.encode(b"fake_jpeg_bytes")
        );
    }

    #[test]
    fn test_classify_429_as_quota() {
        let err = classify_error_response(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_classify_resource_exhausted_status_as_quota() {
        let body = r#"{"error":{"code":400,"message":"Quota exceeded for metric","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_error_response(StatusCode::BAD_REQUEST, body);
        match err {
            AutosageError::QuotaExceeded(msg) => assert_eq!(msg, "Quota exceeded for metric"),
            other => panic!("Expected QuotaExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_other_status_as_api_error() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        let err = classify_error_response(StatusCode::FORBIDDEN, body);
        match err {
            AutosageError::ApiError(msg) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("API key not valid"));
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_plain_text_body() {
        let err = classify_error_response(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_extract_text_concatenates_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"- Brand: "},{"text":"Toyota"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "- Brand: Toyota");
    }

    #[test]
    fn test_extract_text_reports_block_reason() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_reports_finish_reason() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"RECITATION"}]}"#,
        )
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("RECITATION"));
    }

    #[tokio::test]
    async fn test_generate_success_returns_text_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#""text":"Identify this vehicle""#.to_string()),
                mockito::Matcher::Regex(r#""mime_type":"image/jpeg""#.to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"- Brand: Toyota\n- Model: Corolla\n"}]},"finishReason":"STOP"}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let result = gateway.generate(&sample_request(), DEFAULT_TIMEOUT).await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), "- Brand: Toyota\n- Model: Corolla\n");
    }

    #[tokio::test]
    async fn test_generate_quota_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(
                r#"{"error":{"code":429,"message":"You exceeded your current quota","status":"RESOURCE_EXHAUSTED"}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let result = gateway.generate(&sample_request(), DEFAULT_TIMEOUT).await;

        mock.assert_async().await;
        assert!(result.unwrap_err().is_quota_exceeded());
    }

    #[tokio::test]
    async fn test_generate_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(503)
            .with_body(r#"{"error":{"code":503,"message":"The model is overloaded","status":"UNAVAILABLE"}}"#)
            .expect(1)
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let result = gateway.generate(&sample_request(), DEFAULT_TIMEOUT).await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(!err.is_quota_exceeded());
        assert!(err.to_string().contains("The model is overloaded"));
    }

    #[tokio::test]
    async fn test_generate_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        let result = gateway.generate(&sample_request(), DEFAULT_TIMEOUT).await;

        mock.assert_async().await;
        match result {
            Err(AutosageError::SerializationError(_)) => {}
            other => panic!("Expected SerializationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_connection_refused() {
        let gateway = GeminiGateway::with_api_key_and_base_url("key", "http://127.0.0.1:1");
        let result = gateway.generate(&sample_request(), Duration::from_secs(5)).await;

        match result {
            Err(AutosageError::HttpError(err)) => {
                assert!(err.is_connect());
                let msg = AutosageError::HttpError(err).to_string();
                assert!(msg.to_lowercase().contains("connect"), "cause missing from: {}", msg);
            }
            other => panic!("Expected HttpError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_times_out_against_silent_server() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = connections.clone();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                // Keep the socket open without ever answering.
                held.push(stream);
            }
        });

        let gateway = GeminiGateway::with_api_key_and_base_url("key", format!("http://{}", addr));
        let result = gateway.generate(&sample_request(), Duration::from_millis(200)).await;

        match result {
            Err(AutosageError::TimeoutError(msg)) => assert!(msg.contains("200ms")),
            other => panic!("Expected TimeoutError, got {:?}", other),
        }
        assert_eq!(connections.load(Ordering::SeqCst), 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_generate_without_api_key_makes_no_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", PATH).expect(0).create_async().await;

        let gateway = GeminiGateway::with_api_key_and_base_url("", server.url());
        let result = gateway.generate(&sample_request(), DEFAULT_TIMEOUT).await;

        mock.assert_async().await;
        match result {
            Err(AutosageError::ConfigError(msg)) => assert!(msg.contains("GOOGLE_API_KEY")),
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }
}
