// Completion module
// The text-generation service seam

use async_trait::async_trait;

use crate::ollama::{OllamaClient, ServiceError, run_blocking};

/// Turns a prompt into a response string
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl CompletionService for OllamaClient {
    #[inline]
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let client = self.clone();
        let prompt = prompt.to_string();
        run_blocking(move || client.generate(&prompt)).await
    }
}
