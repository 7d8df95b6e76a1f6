#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::OllamaConfig;

/// Errors returned by calls to the Ollama HTTP API
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not reach {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Server responded with HTTP {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Whether a second attempt could plausibly succeed
    #[inline]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport { .. } => true,
            Self::Status(status) => *status >= 500,
            Self::InvalidResponse(_) | Self::Task(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    temperature: f32,
    batch_size: u32,
    agent: ureq::Agent,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;
        let timeout = Duration::from_secs(config.timeout_seconds);

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            temperature: config.temperature,
            batch_size: config.batch_size,
            agent: build_agent(timeout),
            timeout,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_secs(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    #[inline]
    pub const fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Test connection to the Ollama server and verify both models are installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Failed to list models")?;

        for model in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| model_matches(&m.name, model)) {
                let available_models: Vec<&str> =
                    models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available_models
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Run `ollama pull {}`. Available models: {:?}",
                    model,
                    model,
                    available_models
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response_text = self.make_request_with_retry(&url, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed `texts` in a single request, one vector per input in order
    ///
    /// Splitting into batches of [`OllamaClient::batch_size`] is up to the caller.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let url = self.endpoint("/api/embed")?;
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        let response_text = self.make_request_with_retry(&url, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(ServiceError::InvalidResponse(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }

    /// Run a single non-streaming completion
    #[inline]
    pub fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = self.endpoint("/api/generate")?;
        debug!(
            "Generating completion with {} (prompt length: {})",
            self.generation_model,
            prompt.len()
        );

        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        let response_text = self.make_request_with_retry(&url, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        debug!("Received completion of {} characters", response.response.len());
        Ok(response.response)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
    }

    fn make_request_with_retry<F>(&self, url: &Url, mut request_fn: F) -> Result<String, ServiceError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let error = self.classify(url, error);
                    if !error.is_transient() {
                        warn!("Non-retryable error from {}: {}", url, error);
                        return Err(error);
                    }

                    warn!(
                        "Transient error from {}: {}, attempt {}/{}",
                        url, error, attempt, self.retry_attempts
                    );
                    last_error = Some(error);

                    if attempt < self.retry_attempts {
                        debug!("Waiting {:?} before retry", self.retry_delay);
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);
        Err(last_error.unwrap_or_else(|| ServiceError::Transport {
            url: url.to_string(),
            message: "no request attempts were made".to_string(),
        }))
    }

    fn classify(&self, url: &Url, error: ureq::Error) -> ServiceError {
        match error {
            ureq::Error::StatusCode(status) => ServiceError::Status(status),
            ureq::Error::Timeout(_) => ServiceError::Timeout(self.timeout),
            ureq::Error::ConnectionFailed | ureq::Error::HostNotFound | ureq::Error::Io(_) => {
                ServiceError::Transport {
                    url: url.to_string(),
                    message: error.to_string(),
                }
            }
            other => ServiceError::InvalidResponse(other.to_string()),
        }
    }
}

/// Run a blocking HTTP call on the blocking thread pool
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Ollama reports untagged models with an implicit `:latest` tag
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_suffix(":latest")
            .is_some_and(|base| base == wanted)
        || wanted
            .strip_suffix(":latest")
            .is_some_and(|base| base == installed)
}
