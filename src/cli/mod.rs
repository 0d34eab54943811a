use clap::{ ArgAction, Parser };

use crate::llm::{ LlmConfig, LlmType };
use crate::reasoning::StageLimits;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Generation Service Args ---
    /// Type of LLM provider for the reasoning stages (gemini, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the LLM provider (required for Gemini and OpenAI)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name (e.g., gemini-2.5-flash, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Pipeline Args ---
    /// Output-token ceiling for the Thinker stage.
    #[arg(long, env = "THINKER_MAX_TOKENS", default_value = "20000")]
    pub thinker_max_tokens: u32,

    /// Output-token ceiling for the Critic stage.
    #[arg(long, env = "CRITIC_MAX_TOKENS", default_value = "20000")]
    pub critic_max_tokens: u32,

    /// Output-token ceiling for the Judge stage.
    #[arg(long, env = "JUDGE_MAX_TOKENS", default_value = "20000")]
    pub judge_max_tokens: u32,

    /// Prepend earlier turns of the conversation to the Thinker payload.
    #[arg(long, env = "INCLUDE_HISTORY", default_value = "true", action = ArgAction::Set)]
    pub include_history: bool,

    /// Optional JSON file overriding the thinker/critic/judge system prompts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- History Store Args ---
    /// Session store type (file, redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "file")]
    pub history_type: String,

    /// Directory holding session.json for the file store.
    #[arg(long, env = "DATA_DIR", default_value = "chat-data")]
    pub data_dir: String,

    /// Redis endpoint for the redis store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub history_redis_url: String,

    /// Prefix for Redis session keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "reasoning:")]
    pub history_redis_prefix: String,

    // --- General App Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API. The API is disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Run a single query, print the answer and exit.
    #[arg(long)]
    pub query: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn llm_config(&self) -> Result<LlmConfig, String> {
        let llm_type: LlmType = self.chat_llm_type
            .parse()
            .map_err(|e| format!("Invalid chat LLM type: {}", e))?;
        let api_key = if !self.chat_api_key.is_empty() {
            Some(self.chat_api_key.clone())
        } else {
            None
        };
        Ok(LlmConfig {
            llm_type,
            api_key,
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
        })
    }

    pub fn stage_limits(&self) -> StageLimits {
        StageLimits {
            thinker: self.thinker_max_tokens,
            critic: self.critic_max_tokens,
            judge: self.judge_max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hosted_setup() {
        let args = Args::try_parse_from(["reasoning-agent"]).unwrap();
        assert_eq!(args.chat_llm_type, "gemini");
        assert_eq!(args.stage_limits(), StageLimits::default());
        assert!(args.include_history);
        assert_eq!(args.history_type, "file");
        assert_eq!(args.data_dir, "chat-data");
        assert_eq!(args.server_addr, "127.0.0.1:4000");
        assert!(args.http_port.is_none());
    }

    #[test]
    fn history_can_be_switched_off() {
        let args = Args::try_parse_from(["reasoning-agent", "--include-history", "false"]).unwrap();
        assert!(!args.include_history);
    }

    #[test]
    fn llm_config_rejects_unknown_provider() {
        let args = Args::try_parse_from(["reasoning-agent", "--chat-llm-type", "groq"]).unwrap();
        assert!(args.llm_config().is_err());

        let args = Args::try_parse_from([
            "reasoning-agent",
            "--chat-llm-type",
            "ollama",
            "--chat-model",
            "llama3",
        ]).unwrap();
        let config = args.llm_config().unwrap();
        assert_eq!(config.llm_type, LlmType::Ollama);
        assert_eq!(config.api_key, None);
        assert_eq!(config.completion_model.as_deref(), Some("llama3"));
    }
}
