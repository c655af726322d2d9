//! Remote danger analysis against a vision-language model endpoint.
//!
//! One [`AnalysisClient`] is built per loop start with the active API key;
//! every call is stateless beyond that key. All transport, status, and
//! parse failures fold into a fail-safe verdict: the client never claims
//! danger on a broken response and never propagates an error that would
//! kill the detection loop.

pub mod dns;

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, error, info};
use vigil_types::{config::AnalysisConfig, verdict::AnalysisVerdict, Result, VigilError};

use dns::{DnsChain, FallbackResolver, StaticTableResolver, SystemResolver};

const DANGER_PROMPT: &str = "You are a safety assistant. Look at this image from a first-person \
perspective. Is there any IMMEDIATE physical danger (e.g., approaching cars, deep holes, \
aggressive dogs, fire)? Answer with only 'YES' or 'NO'.";

const MAX_ANSWER_TOKENS: u32 = 10;

/// Danger-judgment seam consumed by the orchestrator.
#[async_trait]
pub trait DangerAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> Result<AnalysisVerdict>;
}

/// Builds a fresh analyzer for each loop start; key changes require a new
/// instance.
pub trait AnalyzerFactory: Send + Sync {
    type Analyzer: DangerAnalyzer + 'static;

    fn create(&self, api_key: &str) -> Result<Self::Analyzer>;
}

/// HTTP client for the chat-completions inference endpoint.
pub struct AnalysisClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl AnalysisClient {
    pub fn new(api_key: impl Into<String>, config: &AnalysisConfig) -> Result<Self> {
        let url = Url::parse(&config.endpoint_url).map_err(|err| {
            VigilError::Configuration(format!(
                "invalid endpoint url {}: {err}",
                config.endpoint_url
            ))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                VigilError::Configuration(format!(
                    "endpoint url {} has no host",
                    config.endpoint_url
                ))
            })?
            .to_string();

        let resolver = FallbackResolver::new(
            SystemResolver,
            StaticTableResolver::pinned(host, &config.fallback_addrs),
        );
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .dns_resolver(Arc::new(DnsChain::new(resolver)))
            .build()
            .map_err(|err| VigilError::Analysis(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: config.endpoint_url.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, image: &[u8]) -> ChatRequest {
        let encoded = BASE64.encode(image);
        debug!("Image encoded to base64 ({} chars)", encoded.len());
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".into(),
                content: vec![
                    ContentPart {
                        kind: "text".into(),
                        text: Some(DANGER_PROMPT.into()),
                        image_url: None,
                    },
                    ContentPart {
                        kind: "image_url".into(),
                        text: None,
                        image_url: Some(ImageUrl {
                            url: format!("data:image/jpeg;base64,{encoded}"),
                        }),
                    },
                ],
            }],
            max_tokens: MAX_ANSWER_TOKENS,
        }
    }
}

#[async_trait]
impl DangerAnalyzer for AnalysisClient {
    async fn analyze(&self, image: &[u8]) -> Result<AnalysisVerdict> {
        let body = self.request_body(image);
        debug!("Sending analysis request to {}", self.endpoint);

        let response = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("Analysis request failed: {err}");
                return Ok(AnalysisVerdict::from_error(err.to_string()));
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                error!("Failed to read analysis response body: {err}");
                return Ok(AnalysisVerdict::from_error(err.to_string()));
            }
        };

        let verdict = verdict_from_response(status, &text);
        if let Some(answer) = &verdict.raw_answer {
            info!("VLM response: {answer}");
        }
        Ok(verdict)
    }
}

/// Turn an HTTP status and body into a verdict.
///
/// Non-success statuses and unparseable bodies both yield the fail-safe
/// non-danger verdict with an error message; this function never panics.
pub fn verdict_from_response(status: u16, body: &str) -> AnalysisVerdict {
    if !(200..300).contains(&status) {
        error!("API request failed: {status} - {body}");
        return AnalysisVerdict::from_error(format!("API error: {status}"));
    }

    match serde_json::from_str::<ChatResponse>(body) {
        Ok(parsed) => {
            let answer = parsed
                .choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.message)
                .and_then(|message| message.content)
                .unwrap_or_default();
            AnalysisVerdict::from_answer(&answer)
        }
        Err(err) => AnalysisVerdict::from_error(format!("response parse failed: {err}")),
    }
}

/// Factory wiring [`AnalysisClient`] construction into the orchestrator.
pub struct ClientFactory {
    config: AnalysisConfig,
}

impl ClientFactory {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }
}

impl AnalyzerFactory for ClientFactory {
    type Analyzer = AnalysisClient;

    fn create(&self, api_key: &str) -> Result<AnalysisClient> {
        AnalysisClient::new(api_key, &self.config)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<ImageUrl>,
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
