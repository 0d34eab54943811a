use chrono::{ DateTime, Utc };
use log::debug;
use thiserror::Error;
use uuid::Uuid;

use crate::models::chat::{
    Conversation,
    CriticRecord,
    InternalStages,
    JudgeRecord,
    Message,
    MessageStatus,
    SessionSnapshot,
    SessionView,
    ThinkerRecord,
    DEFAULT_REASONING_TYPE,
    USER_MESSAGE_SUFFIX,
};
use crate::reasoning::orchestrator::{ TurnRequest, TurnUpdate };
use crate::reasoning::parser::generate_query_id;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("a turn is already in progress")]
    TurnInProgress,
    #[error("unknown conversation: {0}")] UnknownConversation(String),
    #[error("unknown message: {0}")] UnknownMessage(String),
    #[error("invalid status transition for {id}: {from} -> {to}")] InvalidTransition {
        id: String,
        from: MessageStatus,
        to: MessageStatus,
    },
}

/// In-memory conversations and messages plus the display state around them.
#[derive(Debug)]
pub struct SessionStore {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    current_conversation_id: Option<String>,
    next_seq: u64,
    in_flight: Option<String>,
    show_internal: bool,
    include_history: bool,
}

impl SessionStore {
    pub fn new(include_history: bool) -> Self {
        Self {
            conversations: Vec::new(),
            messages: Vec::new(),
            current_conversation_id: None,
            next_seq: 0,
            in_flight: None,
            show_internal: false,
            include_history,
        }
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn show_internal(&self) -> bool {
        self.show_internal
    }

    pub fn include_history(&self) -> bool {
        self.include_history
    }

    pub fn set_include_history(&mut self, enabled: bool) {
        self.include_history = enabled;
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// True while the turn started by the last `submit_query` has not reached a terminal status.
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .as_deref()
            .and_then(|id| self.message(id))
            .map(Message::is_in_flight)
            .unwrap_or(false)
    }

    /// Newest first.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut conversations = self.conversations.clone();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        conversations
    }

    /// Messages of one conversation ordered by `(timestamp, seq)`; nothing when no id is given.
    pub fn visible_messages(&self, conversation_id: Option<&str>) -> Vec<Message> {
        let Some(conversation_id) = conversation_id else {
            return Vec::new();
        };
        let mut visible: Vec<Message> = self.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        visible
    }

    pub fn start_new(&mut self) {
        self.current_conversation_id = None;
    }

    /// Appends the user message and a `thinking` placeholder, creating and activating a
    /// conversation first when none is active.
    pub fn submit_query(
        &mut self,
        query: &str,
        now: DateTime<Utc>
    ) -> Result<TurnRequest, SessionError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if self.is_busy() {
            return Err(SessionError::TurnInProgress);
        }

        let conversation_id = match self.current_conversation_id.clone() {
            Some(id) => id,
            None => {
                let conversation = Conversation::new(Uuid::new_v4().to_string(), trimmed, now);
                let id = conversation.id.clone();
                debug!("Created conversation {} ({})", id, conversation.title);
                self.conversations.push(conversation);
                self.current_conversation_id = Some(id.clone());
                id
            }
        };

        let history = self.visible_messages(Some(&conversation_id));
        let query_id = generate_query_id();
        let user_seq = self.take_seq();
        let assistant_seq = self.take_seq();
        self.messages.push(Message::user(&query_id, &conversation_id, query, now, user_seq));
        self.messages.push(
            Message::assistant_placeholder(&query_id, &conversation_id, now, assistant_seq)
        );
        self.in_flight = Some(query_id.clone());

        Ok(TurnRequest {
            query: query.to_string(),
            message_id: query_id,
            history,
            include_history: self.include_history,
        })
    }

    pub fn switch(&mut self, conversation_id: &str) -> Result<(), SessionError> {
        if !self.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(SessionError::UnknownConversation(conversation_id.to_string()));
        }
        self.current_conversation_id = Some(conversation_id.to_string());
        Ok(())
    }

    /// Removes the conversation and all of its messages.
    pub fn delete(&mut self, conversation_id: &str) -> Result<(), SessionError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != conversation_id);
        if self.conversations.len() == before {
            return Err(SessionError::UnknownConversation(conversation_id.to_string()));
        }
        self.messages.retain(|m| m.conversation_id != conversation_id);
        if self.current_conversation_id.as_deref() == Some(conversation_id) {
            self.start_new();
        }
        Ok(())
    }

    /// Flips one message's reasoning visibility, or the global flag when no id is given.
    pub fn toggle_reasoning(&mut self, message_id: Option<&str>) -> Result<bool, SessionError> {
        match message_id {
            Some(id) => {
                let message = self.messages
                    .iter_mut()
                    .find(|m| m.id == id)
                    .ok_or_else(|| SessionError::UnknownMessage(id.to_string()))?;
                message.show_internal = !message.show_internal;
                Ok(message.show_internal)
            }
            None => {
                self.show_internal = !self.show_internal;
                Ok(self.show_internal)
            }
        }
    }

    pub fn apply_update(
        &mut self,
        message_id: &str,
        update: &TurnUpdate
    ) -> Result<Message, SessionError> {
        let message = self.messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| SessionError::UnknownMessage(message_id.to_string()))?;
        let current = message.status.ok_or_else(||
            SessionError::UnknownMessage(message_id.to_string())
        )?;

        let next = match update {
            TurnUpdate::Thinking => MessageStatus::Thinking,
            TurnUpdate::Critiquing { .. } => MessageStatus::Critiquing,
            TurnUpdate::Judging { .. } => MessageStatus::Judging,
            TurnUpdate::Complete { .. } => MessageStatus::Complete,
            TurnUpdate::Failed { .. } => MessageStatus::Error,
        };
        let entering_thinking = current == MessageStatus::Thinking && next == MessageStatus::Thinking;
        if !entering_thinking && !current.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                id: message_id.to_string(),
                from: current,
                to: next,
            });
        }

        let internal = message.internal.get_or_insert_with(InternalStages::default);
        match update {
            TurnUpdate::Thinking => {}
            TurnUpdate::Critiquing { thinker } | TurnUpdate::Failed { thinker } => {
                internal.thinker = Some(thinker.clone());
            }
            TurnUpdate::Judging { critic } => {
                internal.critic = Some(critic.clone());
            }
            TurnUpdate::Complete { judge, response } => {
                internal.judge = Some(judge.clone());
                message.content = judge.final_answer.clone();
                message.structured_response = Some(response.clone());
            }
        }
        message.status = Some(next);
        Ok(message.clone())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversations: self.conversations.clone(),
            messages: self.messages.clone(),
            current_conversation_id: self.current_conversation_id.clone(),
        }
    }

    /// Replaces all persisted state. An active id without a matching conversation is dropped.
    ///
    /// A turn that is still running keeps its in-memory messages and conversation, so its
    /// remaining stage updates still apply. Any other message loaded mid-pipeline is settled:
    /// nothing will ever advance it.
    pub fn replace(&mut self, snapshot: SessionSnapshot) {
        let SessionSnapshot { mut conversations, mut messages, current_conversation_id } = snapshot;

        let running = self.running_turn();
        match &running {
            Some((conversation, turn)) => {
                messages.retain(|m| !turn.iter().any(|t| t.id == m.id));
                if !conversations.iter().any(|c| c.id == conversation.id) {
                    conversations.push(conversation.clone());
                }
                messages.extend(turn.iter().cloned());
            }
            None => {
                self.in_flight = None;
            }
        }
        for message in messages.iter_mut() {
            if message.is_in_flight() && Some(&message.id) != self.in_flight.as_ref() {
                settle_interrupted(message);
            }
        }

        self.current_conversation_id = current_conversation_id.filter(|id|
            conversations.iter().any(|c| &c.id == id)
        );
        self.next_seq = messages
            .iter()
            .map(|m| m.seq + 1)
            .max()
            .unwrap_or(0);
        self.conversations = conversations;
        self.messages = messages;
    }

    /// The conversation and both messages of the turn that is still running, if any.
    fn running_turn(&self) -> Option<(Conversation, Vec<Message>)> {
        let id = self.in_flight.as_deref()?;
        let assistant = self.message(id).filter(|m| m.is_in_flight())?;
        let conversation = self.conversations
            .iter()
            .find(|c| c.id == assistant.conversation_id)?
            .clone();
        let user_id = format!("{}{}", id, USER_MESSAGE_SUFFIX);
        let turn = self.messages
            .iter()
            .filter(|m| m.id == id || m.id == user_id)
            .cloned()
            .collect();
        Some((conversation, turn))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            conversations: self.conversations(),
            current_conversation_id: self.current_conversation_id.clone(),
            messages: self.visible_messages(self.current_conversation_id.as_deref()),
            show_internal: self.show_internal,
            include_history: self.include_history,
            busy: self.is_busy(),
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

const INTERRUPTED: &str = "turn was interrupted before the pipeline finished";

/// Moves a message that was saved mid-pipeline to the terminal status its stage allows:
/// `error` while thinking, otherwise `complete` with synthesized critic and judge records.
fn settle_interrupted(message: &mut Message) {
    let internal = message.internal.get_or_insert_with(InternalStages::default);
    match message.status {
        Some(MessageStatus::Thinking) => {
            internal.thinker = Some(ThinkerRecord {
                internal: true,
                reasoning_type: DEFAULT_REASONING_TYPE,
                raw: format!("Thinker failed: {}", INTERRUPTED),
                error: Some(INTERRUPTED.to_string()),
            });
            message.status = Some(MessageStatus::Error);
        }
        Some(MessageStatus::Critiquing) | Some(MessageStatus::Judging) => {
            internal.critic.get_or_insert_with(|| CriticRecord {
                internal: true,
                raw: format!("Critic failed: {}", INTERRUPTED),
                error: Some(INTERRUPTED.to_string()),
            });
            let judge = JudgeRecord {
                final_answer: format!("Error generating final answer: {}", INTERRUPTED),
                judge_reasoning: format!("The judge stage failed: {}", INTERRUPTED),
                error: Some(INTERRUPTED.to_string()),
            };
            message.content = judge.final_answer.clone();
            internal.judge = Some(judge);
            message.status = Some(MessageStatus::Complete);
        }
        _ => {}
    }
    debug!("Settled interrupted message {} as {:?}", message.id, message.status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ReasoningType, ResponseMetadata, Role, StructuredResponse };

    fn thinker(raw: &str) -> ThinkerRecord {
        ThinkerRecord {
            internal: true,
            reasoning_type: ReasoningType::Mathematical,
            raw: raw.to_string(),
            error: None,
        }
    }

    fn critic() -> CriticRecord {
        CriticRecord { internal: true, raw: "ok".into(), error: None }
    }

    fn judge(answer: &str) -> JudgeRecord {
        JudgeRecord {
            final_answer: answer.to_string(),
            judge_reasoning: "fine".into(),
            error: None,
        }
    }

    fn complete(answer: &str) -> TurnUpdate {
        TurnUpdate::Complete {
            judge: judge(answer),
            response: StructuredResponse {
                id: "r-1".into(),
                prompt: "q".into(),
                metadata: ResponseMetadata { timestamp: Utc::now().to_rfc3339(), elapsed_ms: 5 },
                thinker: thinker("t"),
                critic: critic(),
                judge: judge(answer),
            },
        }
    }

    fn finish(store: &mut SessionStore, id: &str, answer: &str) {
        store.apply_update(id, &TurnUpdate::Thinking).unwrap();
        store.apply_update(id, &TurnUpdate::Critiquing { thinker: thinker("t") }).unwrap();
        store.apply_update(id, &TurnUpdate::Judging { critic: critic() }).unwrap();
        store.apply_update(id, &complete(answer)).unwrap();
    }

    #[test]
    fn first_submit_creates_and_activates_conversation() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("  What is 2+2?  ", Utc::now()).unwrap();

        let conversation_id = store.current_conversation_id().unwrap().to_string();
        let conversations = store.conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].title, "What is 2+2?");

        let visible = store.visible_messages(Some(&conversation_id));
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].role, Role::User);
        assert_eq!(visible[0].id, format!("{}-user", request.message_id));
        assert_eq!(visible[0].content, "  What is 2+2?  ");
        assert_eq!(request.query, "  What is 2+2?  ");
        assert_eq!(visible[1].id, request.message_id);
        assert_eq!(visible[1].status, Some(MessageStatus::Thinking));
        assert!(store.is_busy());
    }

    #[test]
    fn empty_and_concurrent_submissions_are_rejected() {
        let mut store = SessionStore::new(true);
        assert_eq!(store.submit_query("   ", Utc::now()), Err(SessionError::EmptyQuery));

        store.submit_query("first", Utc::now()).unwrap();
        assert_eq!(store.submit_query("second", Utc::now()), Err(SessionError::TurnInProgress));
    }

    #[test]
    fn completed_turn_fills_content_and_frees_the_session() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("2+2?", Utc::now()).unwrap();
        finish(&mut store, &request.message_id, "4");

        let message = store.message(&request.message_id).unwrap();
        assert_eq!(message.status, Some(MessageStatus::Complete));
        assert_eq!(message.content, "4");
        assert!(message.structured_response.is_some());
        let internal = message.internal.as_ref().unwrap();
        assert!(internal.thinker.is_some() && internal.critic.is_some() && internal.judge.is_some());
        assert!(!store.is_busy());
    }

    #[test]
    fn failed_thinker_leaves_later_slots_empty() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();
        let id = request.message_id.as_str();
        store.apply_update(id, &TurnUpdate::Thinking).unwrap();
        let message = store.apply_update(id, &TurnUpdate::Failed { thinker: thinker("boom") }).unwrap();

        assert_eq!(message.status, Some(MessageStatus::Error));
        let internal = message.internal.unwrap();
        assert!(internal.thinker.is_some());
        assert!(internal.critic.is_none());
        assert!(internal.judge.is_none());
        assert!(!store.is_busy());
    }

    #[test]
    fn out_of_order_update_is_rejected() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();
        let err = store.apply_update(&request.message_id, &complete("x")).unwrap_err();
        assert_eq!(err, SessionError::InvalidTransition {
            id: request.message_id.clone(),
            from: MessageStatus::Thinking,
            to: MessageStatus::Complete,
        });

        let err = store.apply_update("q-missing", &TurnUpdate::Thinking).unwrap_err();
        assert_eq!(err, SessionError::UnknownMessage("q-missing".into()));
    }

    #[test]
    fn second_turn_carries_first_turn_as_history() {
        let mut store = SessionStore::new(true);
        let first = store.submit_query("first", Utc::now()).unwrap();
        assert!(first.history.is_empty());
        finish(&mut store, &first.message_id, "one");

        let second = store.submit_query("second", Utc::now()).unwrap();
        assert_eq!(second.history.len(), 2);
        assert_eq!(second.history[1].history_text(), "one");
        assert!(second.include_history);
    }

    #[test]
    fn no_active_conversation_shows_nothing() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();
        finish(&mut store, &request.message_id, "a");

        store.start_new();
        assert!(store.visible_messages(None).is_empty());
        assert!(store.view().messages.is_empty());
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn same_instant_messages_keep_insertion_order() {
        let mut store = SessionStore::new(true);
        let now = Utc::now();
        let first = store.submit_query("a", now).unwrap();
        finish(&mut store, &first.message_id, "1");
        store.submit_query("b", now).unwrap();

        let id = store.current_conversation_id().unwrap().to_string();
        let contents: Vec<String> = store
            .visible_messages(Some(&id))
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "1", "b", ""]);
    }

    #[test]
    fn delete_removes_messages_and_resets_active() {
        let mut store = SessionStore::new(true);
        let first = store.submit_query("keep me", Utc::now()).unwrap();
        finish(&mut store, &first.message_id, "kept");
        let keep_id = store.current_conversation_id().unwrap().to_string();

        store.start_new();
        let second = store.submit_query("drop me", Utc::now()).unwrap();
        finish(&mut store, &second.message_id, "dropped");
        let drop_id = store.current_conversation_id().unwrap().to_string();

        store.delete(&drop_id).unwrap();
        assert!(store.snapshot().messages.iter().all(|m| m.conversation_id != drop_id));
        assert_eq!(store.current_conversation_id(), None);
        assert_eq!(store.visible_messages(Some(&keep_id)).len(), 2);
        assert_eq!(store.delete(&drop_id), Err(SessionError::UnknownConversation(drop_id.clone())));
    }

    #[test]
    fn switch_requires_known_conversation() {
        let mut store = SessionStore::new(true);
        assert!(matches!(store.switch("nope"), Err(SessionError::UnknownConversation(_))));
    }

    #[test]
    fn toggles_are_independent() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();

        assert_eq!(store.toggle_reasoning(None), Ok(true));
        assert_eq!(store.toggle_reasoning(Some(&request.message_id)), Ok(true));
        assert_eq!(store.toggle_reasoning(None), Ok(false));
        assert!(store.message(&request.message_id).unwrap().show_internal);
        assert!(store.toggle_reasoning(Some("missing")).is_err());
    }

    #[test]
    fn replace_drops_dangling_active_id_and_resumes_seq() {
        let mut source = SessionStore::new(true);
        let request = source.submit_query("q", Utc::now()).unwrap();
        finish(&mut source, &request.message_id, "a");
        let mut snapshot = source.snapshot();
        snapshot.current_conversation_id = Some("gone".into());

        let mut store = SessionStore::new(true);
        store.replace(snapshot);
        assert_eq!(store.current_conversation_id(), None);
        assert_eq!(store.next_seq, 2);
        assert!(!store.is_busy());
    }

    #[test]
    fn replace_keeps_the_running_turn() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();
        let id = request.message_id.as_str();
        store.apply_update(id, &TurnUpdate::Thinking).unwrap();
        let older = store.snapshot();
        store.apply_update(id, &TurnUpdate::Critiquing { thinker: thinker("t") }).unwrap();

        store.replace(older);
        assert_eq!(store.message(id).unwrap().status, Some(MessageStatus::Critiquing));
        assert!(store.is_busy());

        store.apply_update(id, &TurnUpdate::Judging { critic: critic() }).unwrap();
        store.apply_update(id, &complete("done")).unwrap();
        assert_eq!(store.message(id).unwrap().content, "done");
        assert!(!store.is_busy());
    }

    #[test]
    fn replace_with_nothing_saved_keeps_the_running_turn_conversation() {
        let mut store = SessionStore::new(true);
        let request = store.submit_query("q", Utc::now()).unwrap();
        let conversation_id = store.current_conversation_id().unwrap().to_string();

        store.replace(SessionSnapshot::default());
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.visible_messages(Some(&conversation_id)).len(), 2);
        assert!(store.is_busy());
        assert!(store.apply_update(&request.message_id, &TurnUpdate::Thinking).is_ok());
    }

    #[test]
    fn replace_settles_messages_saved_mid_pipeline() {
        let now = Utc::now();
        let thinking = Message::assistant_placeholder("q-a", "c1", now, 1);
        let mut judging = Message::assistant_placeholder("q-b", "c1", now, 3);
        judging.status = Some(MessageStatus::Judging);
        judging.internal = Some(InternalStages {
            thinker: Some(thinker("t")),
            critic: Some(critic()),
            judge: None,
        });
        let snapshot = SessionSnapshot {
            conversations: vec![Conversation::new("c1".into(), "a", now)],
            messages: vec![
                Message::user("q-a", "c1", "a", now, 0),
                thinking,
                Message::user("q-b", "c1", "b", now, 2),
                judging
            ],
            current_conversation_id: Some("c1".into()),
        };

        let mut store = SessionStore::new(true);
        store.replace(snapshot);

        let failed = store.message("q-a").unwrap();
        assert_eq!(failed.status, Some(MessageStatus::Error));
        let internal = failed.internal.as_ref().unwrap();
        assert!(internal.thinker.as_ref().unwrap().error.is_some());
        assert!(internal.critic.is_none() && internal.judge.is_none());

        let settled = store.message("q-b").unwrap();
        assert_eq!(settled.status, Some(MessageStatus::Complete));
        assert!(settled.content.starts_with("Error generating final answer"));
        let internal = settled.internal.as_ref().unwrap();
        assert_eq!(internal.critic.as_ref().unwrap().raw, "ok");
        assert!(internal.judge.as_ref().unwrap().error.is_some());

        assert!(!store.is_busy());
        assert!(store.submit_query("next", Utc::now()).is_ok());
    }

    #[test]
    fn conversations_are_listed_newest_first() {
        let mut store = SessionStore::new(false);
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let first = store.submit_query("older", earlier).unwrap();
        finish(&mut store, &first.message_id, "x");
        store.start_new();
        store.submit_query("newer", Utc::now()).unwrap();

        let titles: Vec<String> = store.conversations().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["newer", "older"]);
    }
}
