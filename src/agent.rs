use async_trait::async_trait;
use chrono::Utc;
use log::{ debug, info, warn };
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{ broadcast, Mutex, RwLock };

use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::history::{ initialize_snapshot_store, PersistenceError, SnapshotStore };
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::models::chat::{ Message, SessionSnapshot, SessionView, StructuredResponse };
use crate::models::websocket::ServerMessage;
use crate::reasoning::{
    Orchestrator,
    StageClient,
    StageLimits,
    TurnObserver,
    TurnRequest,
    TurnUpdate,
};
use crate::session::{ PersistencePolicy, SessionError, SessionStore };

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub limits: StageLimits,
    pub include_history: bool,
    pub prompts_path: Option<String>,
}

/// Owns the session and wires it to the pipeline, the snapshot store and the event channel.
pub struct ReasoningAgent {
    session: Mutex<SessionStore>,
    orchestrator: Orchestrator,
    persistence: PersistencePolicy,
    events: broadcast::Sender<ServerMessage>,
    prompts_path: Option<String>,
}

impl ReasoningAgent {
    fn initialize_llm_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let config = args.llm_config()?;
        let client = new_chat_client(&config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}",
            config.llm_type,
            client.get_model(),
            config.base_url.as_deref().unwrap_or("adapter default")
        );
        Ok(client)
    }

    /// Builds every collaborator from the command line and loads the last saved session.
    pub async fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = Self::initialize_llm_client(args)?;
        let store = initialize_snapshot_store(args)?;
        let prompts = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;
        let options = AgentOptions {
            limits: args.stage_limits(),
            include_history: args.include_history,
            prompts_path: args.prompts_path.clone(),
        };

        let agent = Self::with_parts(chat_client, store, prompts, options);
        if let Err(e) = agent.reload().await {
            warn!("Starting with an empty session, autosave stays off until a reload succeeds: {}", e);
        }
        Ok(agent)
    }

    /// Assembles an agent without loading anything; call `reload` to enable autosave.
    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        store: Arc<dyn SnapshotStore>,
        prompts: Arc<PromptConfig>,
        options: AgentOptions
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let orchestrator = Orchestrator::new(
            StageClient::new(chat_client),
            Arc::new(RwLock::new(prompts)),
            options.limits
        );
        Self {
            session: Mutex::new(SessionStore::new(options.include_history)),
            orchestrator,
            persistence: PersistencePolicy::new(store),
            events,
            prompts_path: options.prompts_path,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> SessionView {
        self.session.lock().await.view()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn message(&self, id: &str) -> Option<Message> {
        self.session.lock().await.message(id).cloned()
    }

    /// Re-reads the stored snapshot and replaces the in-memory session with it.
    pub async fn reload(&self) -> Result<SessionView, PersistenceError> {
        let snapshot = self.persistence.load().await?;
        let view = {
            let mut session = self.session.lock().await;
            session.replace(snapshot);
            session.view()
        };
        self.broadcast(ServerMessage::Session { view: view.clone() });
        Ok(view)
    }

    pub async fn reload_prompts(&self) -> Result<bool, PromptError> {
        let Some(path) = &self.prompts_path else {
            return Ok(false);
        };
        let prompts = self.orchestrator.prompts();
        let current = prompts.read().await.clone();
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *prompts.write().await = new_config;
                info!("Prompts successfully reloaded from {}", path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Records the turn in the session. The returned request is handed to `run_turn`.
    pub async fn submit(&self, query: &str) -> Result<TurnRequest, SessionError> {
        self.mutate(true, |session| session.submit_query(query, Utc::now())).await
    }

    pub async fn run_turn(&self, request: &TurnRequest) -> Option<StructuredResponse> {
        self.orchestrator.run(request, self).await
    }

    /// Submits and runs one turn, returning the finished assistant message.
    pub async fn submit_and_run(&self, query: &str) -> Result<Message, SessionError> {
        let request = self.submit(query).await?;
        self.run_turn(&request).await;
        self.message(&request.message_id).await
            .ok_or_else(|| SessionError::UnknownMessage(request.message_id.clone()))
    }

    pub async fn start_new(&self) {
        let _ = self.mutate(true, |session| {
            session.start_new();
            Ok(())
        }).await;
    }

    pub async fn switch(&self, conversation_id: &str) -> Result<(), SessionError> {
        self.mutate(true, |session| session.switch(conversation_id)).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), SessionError> {
        self.mutate(true, |session| session.delete(conversation_id)).await
    }

    pub async fn toggle_reasoning(&self, message_id: Option<&str>) -> Result<bool, SessionError> {
        // The global flag is display state only.
        let persist = message_id.is_some();
        self.mutate(persist, |session| session.toggle_reasoning(message_id)).await
    }

    pub async fn set_include_history(&self, enabled: bool) {
        let _ = self.mutate(false, |session| {
            session.set_include_history(enabled);
            Ok(())
        }).await;
    }

    async fn mutate<T>(
        &self,
        persist: bool,
        f: impl FnOnce(&mut SessionStore) -> Result<T, SessionError>
    ) -> Result<T, SessionError> {
        let (result, pending, view) = {
            let mut session = self.session.lock().await;
            let result = f(&mut *session)?;
            let pending = if persist {
                Some((self.persistence.next_revision(), session.snapshot()))
            } else {
                None
            };
            (result, pending, session.view())
        };
        if let Some((revision, snapshot)) = pending {
            self.persistence.save(revision, &snapshot).await;
        }
        self.broadcast(ServerMessage::Session { view });
        Ok(result)
    }

    fn broadcast(&self, message: ServerMessage) {
        if self.events.send(message).is_err() {
            debug!("No subscribers for session event");
        }
    }
}

#[async_trait]
impl TurnObserver for ReasoningAgent {
    async fn on_update(&self, message_id: &str, update: TurnUpdate) {
        let applied = {
            let mut session = self.session.lock().await;
            session
                .apply_update(message_id, &update)
                .map(|message| (message, self.persistence.next_revision(), session.snapshot()))
        };
        match applied {
            Ok((message, revision, snapshot)) => {
                debug!("Message {} is now {:?}", message_id, message.status);
                self.persistence.save(revision, &snapshot).await;
                self.broadcast(ServerMessage::Message { message });
            }
            Err(e) => warn!("Dropping pipeline update for {}: {}", message_id, e),
        }
    }
}
