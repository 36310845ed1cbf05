//! Vision-language model oracle client.
//!
//! Talks to an OpenAI-compatible `chat/completions` endpoint (vLLM and
//! friends). Each call sends the frame sequence as base64 data URLs with a
//! yes/no question and asks for one output token with its top log-probs:
//!
//! - `confidence` is the total probability mass on "yes" tokens
//! - `is_detected` is `confidence > threshold`
//! - `probability` is `confidence` passed through a logistic centred on the
//!   threshold, so it is monotonic in `confidence`

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use orbit_models::{DetectedObject, RawImage};

use crate::error::{OracleError, OracleResult};
use crate::oracle::DetectionOracle;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, ModelList,
};

/// Configuration for the VLM client.
#[derive(Debug, Clone)]
pub struct VlmClientConfig {
    /// Base URL of the OpenAI-compatible API, including `/v1`
    pub api_base: String,
    /// Served model name
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for retryable failures
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay: Duration,
    /// Number of alternatives requested per output token
    pub top_logprobs: u32,
    /// Slope of the confidence-to-probability logistic
    pub calibration_steepness: f64,
}

impl Default for VlmClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".to_string(),
            model: "OpenGVLab/InternVL2-8B".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            top_logprobs: 20,
            calibration_steepness: 10.0,
        }
    }
}

impl VlmClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("ORBIT_VLM_API_BASE").unwrap_or(defaults.api_base),
            model: std::env::var("ORBIT_VLM_MODEL").unwrap_or(defaults.model),
            timeout: Duration::from_secs(
                std::env::var("ORBIT_VLM_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("ORBIT_VLM_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
            top_logprobs: std::env::var("ORBIT_VLM_TOP_LOGPROBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.top_logprobs),
            calibration_steepness: defaults.calibration_steepness,
        }
    }

    /// Point the client at the local server for GPU `device`
    /// (`http://localhost:800<device>/v1`).
    pub fn with_device(mut self, device: u32) -> Self {
        self.api_base = format!("http://localhost:800{}/v1", device);
        self
    }
}

/// Map raw confidence to a calibrated probability.
///
/// Logistic centred on `threshold`: equals 0.5 at the threshold and is
/// strictly increasing in `confidence`.
pub fn calibrate(confidence: f64, threshold: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * (confidence - threshold)).exp())
}

/// Client for a vision-language model server.
pub struct VlmClient {
    http: Client,
    config: VlmClientConfig,
    completions_url: String,
}

impl VlmClient {
    /// Create a new VLM client.
    pub fn new(config: VlmClientConfig) -> OracleResult<Self> {
        let base = url::Url::parse(&config.api_base)
            .map_err(|e| OracleError::InvalidConfig(format!("api_base {}: {}", config.api_base, e)))?;
        let completions_url = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(OracleError::Network)?;

        Ok(Self {
            http,
            config,
            completions_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> OracleResult<Self> {
        Self::new(VlmClientConfig::from_env())
    }

    pub fn config(&self) -> &VlmClientConfig {
        &self.config
    }

    /// Check that the server is up and serves the configured model.
    pub async fn health_check(&self) -> OracleResult<bool> {
        let url = format!("{}/models", self.config.api_base.trim_end_matches('/'));

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let models: ModelList = response.json().await?;
                Ok(models.data.iter().any(|m| m.id == self.config.model))
            }
            Ok(response) => {
                warn!("VLM health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("VLM health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn build_request(&self, frames: &[RawImage], description: &str) -> ChatRequest {
        let mut content = Vec::with_capacity(frames.len() + 1);
        content.push(ContentPart::Text {
            text: prompt_for(description),
        });
        content.extend(frames.iter().map(|frame| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{}", BASE64.encode(frame.as_bytes())),
            },
        }));

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens: 1,
            temperature: 0.0,
            logprobs: true,
            top_logprobs: self.config.top_logprobs,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> OracleResult<ChatResponse> {
        let response = self
            .http
            .post(&self.completions_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::ServiceUnavailable(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed(format!(
                "VLM server returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> OracleResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = OracleResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        "VLM request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    metrics::counter!("orbit_oracle_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl DetectionOracle for VlmClient {
    async fn detect(
        &self,
        frames: &[RawImage],
        description: &str,
        threshold: f64,
    ) -> OracleResult<DetectedObject> {
        if frames.is_empty() {
            return Err(OracleError::NoFrames);
        }

        let request = self.build_request(frames, description);
        let response = self.with_retry(|| self.complete(&request)).await?;
        let confidence = yes_confidence(&response)?;
        let probability = calibrate(confidence, threshold, self.config.calibration_steepness);

        debug!(
            proposition = description,
            frames = frames.len(),
            confidence,
            probability,
            "VLM detection"
        );

        Ok(DetectedObject::new(
            description,
            confidence > threshold,
            confidence,
            probability,
        ))
    }

    fn name(&self) -> &'static str {
        "vlm"
    }
}

fn prompt_for(description: &str) -> String {
    format!(
        "The images are consecutive frames from one video. \
         Does this sequence of frames show the following: {}? \
         Answer with only Yes or No.",
        description
    )
}

fn is_yes(token: &str) -> bool {
    token.trim().eq_ignore_ascii_case("yes")
}

/// Probability mass on "yes" in the first output token.
fn yes_confidence(response: &ChatResponse) -> OracleResult<f64> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| OracleError::InvalidResponse("response has no choices".to_string()))?;

    if let Some(first) = choice.logprobs.as_ref().and_then(|lp| lp.content.first()) {
        let mass: f64 = if first.top_logprobs.is_empty() {
            if is_yes(&first.token) {
                first.logprob.exp()
            } else {
                0.0
            }
        } else {
            first
                .top_logprobs
                .iter()
                .filter(|t| is_yes(&t.token))
                .map(|t| t.logprob.exp())
                .sum()
        };
        return Ok(mass.clamp(0.0, 1.0));
    }

    // Server ignored the logprobs request; fall back to the answer text.
    let answer = choice
        .message
        .as_ref()
        .and_then(|m| m.content.as_deref())
        .ok_or_else(|| OracleError::InvalidResponse("choice has no content".to_string()))?;
    Ok(if is_yes(answer) { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> VlmClientConfig {
        VlmClientConfig {
            api_base: format!("{}/v1", server.uri()),
            model: "test-model".to_string(),
            retry_base_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn logprob_body(yes: f64, no: f64) -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": {"content": "Yes"},
                "logprobs": {"content": [{
                    "token": "Yes",
                    "logprob": yes.ln(),
                    "top_logprobs": [
                        {"token": "Yes", "logprob": yes.ln()},
                        {"token": " yes", "logprob": 0.05f64.ln()},
                        {"token": "No", "logprob": no.ln()}
                    ]
                }]}
            }]
        })
    }

    fn frames() -> Vec<RawImage> {
        vec![RawImage::from_bytes(vec![1, 2, 3]), RawImage::from_bytes(vec![4, 5])]
    }

    #[test]
    fn test_config_defaults() {
        let config = VlmClientConfig::default();
        assert_eq!(config.api_base, "http://localhost:8000/v1");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.with_device(3).api_base, "http://localhost:8003/v1");
    }

    #[test]
    fn test_calibration_is_monotonic_and_centred() {
        assert!((calibrate(0.349, 0.349, 10.0) - 0.5).abs() < 1e-12);
        let mut last = 0.0;
        for i in 0..=100 {
            let p = calibrate(i as f64 / 100.0, 0.349, 10.0);
            assert!(p > last);
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
    }

    #[test]
    fn test_request_shape() {
        let client = VlmClient::new(VlmClientConfig::default()).unwrap();
        let request = client.build_request(&frames(), "man holds lantern");
        let json = serde_json::to_value(&request).unwrap();

        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("man holds lantern"));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AQID");
        assert_eq!(json["max_tokens"], 1);
        assert_eq!(json["logprobs"], true);
    }

    #[test]
    fn test_invalid_api_base() {
        let config = VlmClientConfig {
            api_base: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(VlmClient::new(config), Err(OracleError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_detect_sums_yes_mass() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(logprob_body(0.7, 0.25)))
            .mount(&server)
            .await;

        let client = VlmClient::new(test_config(&server)).unwrap();
        let detected = client.detect(&frames(), "child falls", 0.349).await.unwrap();

        assert_eq!(detected.name, "child falls");
        assert!((detected.confidence - 0.75).abs() < 1e-9);
        assert!(detected.is_detected);
        assert!(detected.probability > 0.5);
    }

    #[tokio::test]
    async fn test_detect_retries_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(logprob_body(0.1, 0.85)))
            .mount(&server)
            .await;

        let client = VlmClient::new(test_config(&server)).unwrap();
        let detected = client.detect(&frames(), "child falls", 0.349).await.unwrap();
        assert!(!detected.is_detected);
        assert!(detected.probability < 0.5);
    }

    #[tokio::test]
    async fn test_detect_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let client = VlmClient::new(test_config(&server)).unwrap();
        let err = client.detect(&frames(), "child falls", 0.349).await.unwrap_err();
        assert!(matches!(err, OracleError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_detect_without_logprobs_uses_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "No"}}]
            })))
            .mount(&server)
            .await;

        let client = VlmClient::new(test_config(&server)).unwrap();
        let detected = client.detect(&frames(), "child falls", 0.349).await.unwrap();
        assert_eq!(detected.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_detect_rejects_empty_frames() {
        let client = VlmClient::new(VlmClientConfig::default()).unwrap();
        let err = client.detect(&[], "child falls", 0.349).await.unwrap_err();
        assert!(matches!(err, OracleError::NoFrames));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "test-model"}]
            })))
            .mount(&server)
            .await;

        let client = VlmClient::new(test_config(&server)).unwrap();
        assert!(client.health_check().await.unwrap());
    }
}
