use async_trait::async_trait;
use std::error::Error as StdError;
use log::{ debug, info };

use super::{ ChatClient, CompletionResponse, GenerationOptions };
use crate::llm::LlmConfig;
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::LLMProvider;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiChatClient {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if api_key.trim().is_empty() {
            return Err("Google API key is required for GeminiChatClient".into());
        }
        let chat_model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Self {
            api_key,
            model: chat_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;
        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    /// The token cap and temperature are builder settings in rllm, so each call gets its own provider.
    fn provider(
        &self,
        options: &GenerationOptions
    ) -> Result<Box<dyn LLMProvider + Send + Sync>, Box<dyn StdError + Send + Sync>> {
        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Google)
            .api_key(self.api_key.clone())
            .model(&self.model)
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let llm = self.provider(options)?;
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: prompt.to_string(),
            message_type: MessageType::Text,
        }];
        info!(
            "GeminiChatClient::complete() → model={} max_tokens={} base_url={:?}",
            self.model,
            options.max_tokens,
            self.base_url
        );
        let resp = llm.chat(&messages).await?;
        let text = resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string());
        debug!("Gemini returned {} chars", text.len());
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}
