use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use log::{ info, warn };
use tokio::sync::RwLock;

use super::parser::{
    generate_query_id,
    parse_critic_response,
    parse_judge_response,
    parse_thinker_response,
};
use super::stage::{ GenerationError, StageClient };
use crate::config::prompt::PromptConfig;
use crate::history::format_history_for_prompt;
use crate::models::chat::{
    CriticRecord,
    JudgeRecord,
    Message,
    ResponseMetadata,
    StructuredResponse,
    ThinkerRecord,
    DEFAULT_REASONING_TYPE,
};

/// Output-token ceilings per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLimits {
    pub thinker: u32,
    pub critic: u32,
    pub judge: u32,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            thinker: 20000,
            critic: 20000,
            judge: 20000,
        }
    }
}

/// One turn handed over by the session: the query, the assistant message it fills in and
/// the earlier messages of the same conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub query: String,
    pub message_id: String,
    pub history: Vec<Message>,
    pub include_history: bool,
}

/// Emitted at each status transition of the assistant message, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    Thinking,
    Critiquing {
        thinker: ThinkerRecord,
    },
    Judging {
        critic: CriticRecord,
    },
    Complete {
        judge: JudgeRecord,
        response: StructuredResponse,
    },
    Failed {
        thinker: ThinkerRecord,
    },
}

#[async_trait]
pub trait TurnObserver: Send + Sync {
    /// Awaited before the next stage starts.
    async fn on_update(&self, message_id: &str, update: TurnUpdate);
}

pub struct Orchestrator {
    stage: StageClient,
    prompts: Arc<RwLock<Arc<PromptConfig>>>,
    limits: StageLimits,
}

impl Orchestrator {
    pub fn new(
        stage: StageClient,
        prompts: Arc<RwLock<Arc<PromptConfig>>>,
        limits: StageLimits
    ) -> Self {
        Self { stage, prompts, limits }
    }

    pub fn prompts(&self) -> Arc<RwLock<Arc<PromptConfig>>> {
        Arc::clone(&self.prompts)
    }

    /// Runs thinker, critic and judge in sequence. Only a thinker failure ends the turn early,
    /// in which case `None` is returned after a `Failed` update.
    pub async fn run(
        &self,
        request: &TurnRequest,
        observer: &dyn TurnObserver
    ) -> Option<StructuredResponse> {
        let prompts = self.prompts.read().await.clone();
        let started = Instant::now();
        let id = request.message_id.as_str();

        observer.on_update(id, TurnUpdate::Thinking).await;
        let payload = thinker_payload(request);
        let thinker_raw = match
            self.call_stage("thinker", &prompts.thinker, &payload, self.limits.thinker).await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Thinker failed for {}: {}", id, e);
                let thinker = ThinkerRecord {
                    internal: true,
                    reasoning_type: DEFAULT_REASONING_TYPE,
                    raw: format!("Thinker failed: {}", e),
                    error: Some(e.message),
                };
                observer.on_update(id, TurnUpdate::Failed { thinker }).await;
                return None;
            }
        };
        let thinker = parse_thinker_response(&thinker_raw);
        observer.on_update(id, TurnUpdate::Critiquing { thinker: thinker.clone() }).await;

        let payload = format!(
            "Original question: {}\n\nThinker's response:\n{}",
            request.query,
            thinker.raw
        );
        let critic = match
            self.call_stage("critic", &prompts.critic, &payload, self.limits.critic).await
        {
            Ok(raw) => parse_critic_response(&raw),
            Err(e) => {
                warn!("Critic failed for {}, continuing to judge: {}", id, e);
                CriticRecord {
                    internal: true,
                    raw: format!("Critic failed: {}", e),
                    error: Some(e.message),
                }
            }
        };
        observer.on_update(id, TurnUpdate::Judging { critic: critic.clone() }).await;

        let payload = format!(
            "Original question: {}\n\nThinker's response:\n{}\n\nCritic's evaluation:\n{}",
            request.query,
            thinker.raw,
            critic.raw
        );
        let judge = match
            self.call_stage("judge", &prompts.judge, &payload, self.limits.judge).await
        {
            Ok(raw) => parse_judge_response(&raw),
            Err(e) => {
                warn!("Judge failed for {}: {}", id, e);
                JudgeRecord {
                    final_answer: format!("Error generating final answer: {}", e),
                    judge_reasoning: format!("The judge stage failed: {}", e),
                    error: Some(e.message),
                }
            }
        };

        let response = StructuredResponse {
            id: generate_query_id(),
            prompt: request.query.clone(),
            metadata: ResponseMetadata {
                timestamp: Utc::now().to_rfc3339(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            thinker: parse_thinker_response(&thinker_raw),
            critic,
            judge: judge.clone(),
        };
        info!("Turn {} complete in {} ms", id, response.metadata.elapsed_ms);
        observer.on_update(id, TurnUpdate::Complete {
            judge,
            response: response.clone(),
        }).await;
        Some(response)
    }

    async fn call_stage(
        &self,
        name: &str,
        system_prompt: &str,
        payload: &str,
        max_tokens: u32
    ) -> Result<String, GenerationError> {
        info!("Starting {} stage", name);
        let started = Instant::now();
        let result = self.stage.invoke(system_prompt, payload, max_tokens).await;
        info!("{} stage finished in {:?} (ok={})", name, started.elapsed(), result.is_ok());
        result
    }
}

fn thinker_payload(request: &TurnRequest) -> String {
    if !request.include_history {
        return request.query.clone();
    }
    let history = format_history_for_prompt(&request.history);
    if history.is_empty() {
        request.query.clone()
    } else {
        format!("{}\n{}", history, request.query)
    }
}
