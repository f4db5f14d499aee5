//! HTTP-backed generation service.
//!
//! Posts the generation request to a configured AI endpoint and expects a
//! JSON reply carrying the candidate test source. The synthesis itself is
//! opaque to the pipeline; this client only enforces the timeout and the
//! shape of the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, GenerationService};
use crate::domain::error::{Result, TestgenError};

/// Configuration for [`HttpGenerationService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGenerationConfig {
    /// Endpoint URL accepting the generation request as JSON.
    pub endpoint: String,
    /// Optional model identifier forwarded to the service.
    pub model: Option<String>,
    /// Bearer token (optional for unauthenticated endpoints).
    pub token: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpGenerationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: None,
            token: std::env::var("TESTGEN_API_TOKEN").ok(),
            timeout_secs: 60,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    request: &'a GenerationRequest,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    candidate: String,
}

/// Generation service speaking JSON over HTTP.
pub struct HttpGenerationService {
    config: HttpGenerationConfig,
    client: reqwest::Client,
}

impl HttpGenerationService {
    pub fn new(config: HttpGenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("testgen/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| TestgenError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let wire = WireRequest {
            model: self.config.model.as_deref(),
            request,
        };

        let mut call = self.client.post(&self.config.endpoint).json(&wire);
        if let Some(token) = &self.config.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {} seconds", self.config.timeout_secs)
            } else {
                e.to_string()
            };
            TestgenError::Generation {
                attempt: request.attempt,
                reason,
            }
        })?;

        if !response.status().is_success() {
            return Err(TestgenError::Generation {
                attempt: request.attempt,
                reason: format!("service returned {}", response.status()),
            });
        }

        let reply: WireReply = response.json().await.map_err(|e| TestgenError::Generation {
            attempt: request.attempt,
            reason: format!("malformed reply: {e}"),
        })?;

        if reply.candidate.trim().is_empty() {
            return Err(TestgenError::Generation {
                attempt: request.attempt,
                reason: "empty candidate".to_string(),
            });
        }

        debug!(
            module = %request.module.display(),
            attempt = request.attempt,
            bytes = reply.candidate.len(),
            "generation service returned candidate"
        );
        Ok(reply.candidate)
    }
}
