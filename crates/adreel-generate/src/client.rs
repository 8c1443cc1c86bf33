//! HTTP generation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GenerateError, GenerateResult};
use crate::types::{GeneratedAsset, GenerationKind, GenerationRequest, Generator};

/// Configuration for the HTTP generation client.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Base URL of the generation gateway
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(600), // video generation is slow
        }
    }
}

impl GeneratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GENERATION_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            api_key: std::env::var("GENERATION_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("GENERATION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Error body returned by the generation gateway on failure.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    policy_refusal: bool,
}

/// HTTP client for the generation gateway.
///
/// Each [`GenerationKind`] maps to a fixed endpoint; the response body is the
/// generated payload, with cost reported in the `x-generation-cost` header.
pub struct HttpGenerator {
    http: Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    /// Create a new client.
    pub fn new(config: GeneratorConfig) -> GenerateResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GenerateError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GenerateResult<Self> {
        Self::new(GeneratorConfig::from_env())
    }

    /// Endpoint for a generation kind.
    fn endpoint(&self, kind: GenerationKind) -> String {
        let path = match kind {
            GenerationKind::Script => "/v1/script",
            GenerationKind::Voiceover => "/v1/voiceover",
            GenerationKind::SceneClip => "/v1/scene-clip",
            GenerationKind::CtaImage => "/v1/cta-image",
        };
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerateResult<GeneratedAsset> {
        let url = self.endpoint(request.kind);
        debug!(kind = %request.kind, url = %url, "Sending generation request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request.params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout(format!("{} generation timed out", request.kind))
                } else {
                    GenerateError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or(ApiErrorBody {
                error: body.clone(),
                policy_refusal: false,
            });
            if parsed.policy_refusal {
                return Err(GenerateError::policy_refusal(status.as_u16(), parsed.error));
            }
            return Err(GenerateError::api(status.as_u16(), parsed.error));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let cost = response
            .headers()
            .get("x-generation-cost")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        let bytes = response
            .bytes()
            .await
            .map_err(GenerateError::Network)?
            .to_vec();

        if bytes.is_empty() {
            return Err(GenerateError::Decode(format!(
                "{} generation returned an empty payload",
                request.kind
            )));
        }

        debug!(
            kind = %request.kind,
            bytes = bytes.len(),
            cost = cost,
            "Generation complete"
        );

        Ok(GeneratedAsset {
            bytes,
            content_type,
            cost,
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Generation service health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Generation service health check error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpGenerator {
        HttpGenerator::new(GeneratorConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_bytes_and_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/voiceover"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"fake mp3".to_vec())
                    .insert_header("content-type", "audio/mpeg")
                    .insert_header("x-generation-cost", "0.05"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let asset = client
            .generate(&GenerationRequest::new(
                GenerationKind::Voiceover,
                json!({"text": "Meet the Solar Kettle."}),
            ))
            .await
            .unwrap();

        assert_eq!(asset.bytes, b"fake mp3");
        assert_eq!(asset.content_type, "audio/mpeg");
        assert!((asset.cost - 0.05).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scene-clip"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate(&GenerationRequest::new(GenerationKind::SceneClip, json!({})))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_policy_refusal_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/script"))
            .respond_with(ResponseTemplate::new(422).set_body_string(
                r#"{"error": "prompt rejected", "policy_refusal": true}"#,
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate(&GenerationRequest::new(GenerationKind::Script, json!({})))
            .await
            .unwrap_err();

        assert!(err.is_permanent());
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn test_empty_payload_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/cta-image"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate(&GenerationRequest::new(GenerationKind::CtaImage, json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::Decode(_)));
    }
}
