use std::sync::Arc;
use std::time::Instant;

use log::debug;
use thiserror::Error;

use crate::llm::chat::{ ChatClient, GenerationOptions };

/// Sampling temperature shared by every stage.
pub const STAGE_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// One generation call per stage. Failures are returned as-is; nothing is retried here.
#[derive(Clone)]
pub struct StageClient {
    client: Arc<dyn ChatClient>,
}

impl StageClient {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    pub fn compose(system_prompt: &str, user_payload: &str) -> String {
        format!("{}\n\nUser Question: {}", system_prompt, user_payload)
    }

    pub async fn invoke(
        &self,
        system_prompt: &str,
        user_payload: &str,
        max_output_tokens: u32
    ) -> Result<String, GenerationError> {
        let prompt = Self::compose(system_prompt, user_payload);
        let options = GenerationOptions {
            max_tokens: max_output_tokens,
            temperature: STAGE_TEMPERATURE,
        };
        let started = Instant::now();
        let response = self.client
            .complete(&prompt, &options).await
            .map_err(|e| GenerationError::new(e.to_string()))?;
        debug!(
            "stage call on {} finished in {:?} ({} chars)",
            self.client.get_model(),
            started.elapsed(),
            response.response.len()
        );
        Ok(response.response)
    }
}
