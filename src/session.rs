use std::collections::HashMap;

use uuid::Uuid;

use crate::events::{ChatMessage, ChatRole, Route, ThreadConfig};
use crate::runs::FeedbackReceipt;
use crate::turn::TurnOutcome;

/// Per-tab conversation state. Lives only as long as the tab.
#[derive(Debug, Clone)]
pub struct Session {
    pub thread_id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub query: String,
    pub route: Route,
    pub last_generation: Option<String>,
    pub last_run_id: Option<Uuid>,
    pub feedback: Option<FeedbackReceipt>,
}

/// Everything the turn driver needs to run one turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub query: String,
    pub history: Vec<ChatMessage>,
    /// Answer from the previous turn of this conversation
    pub prev_generation: Option<String>,
    pub config: ThreadConfig,
}

impl Session {
    pub fn new() -> Self {
        Self {
            thread_id: Uuid::new_v4(),
            messages: Vec::new(),
            query: String::new(),
            route: Route::Auto,
            last_generation: None,
            last_run_id: None,
            feedback: None,
        }
    }

    pub fn append_message(&mut self, role: ChatRole, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, text));
    }

    pub fn set_last_generation(&mut self, text: impl Into<String>) {
        self.last_generation = Some(text.into());
    }

    /// A new run means any feedback shown so far belongs to an older answer
    pub fn set_last_run(&mut self, run_id: Option<Uuid>) {
        if self.last_run_id != run_id {
            self.feedback = None;
        }
        self.last_run_id = run_id;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.route = Route::Auto;
    }

    /// Queue a query that must go to the database sub-agent
    pub fn set_database_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.route = Route::Database;
    }

    /// Take the pending query, leaving the slot empty
    pub fn take_query(&mut self) -> String {
        std::mem::take(&mut self.query)
    }

    /// Start a turn from the pending query.
    ///
    /// Returns `None` for an empty query; nothing is appended in that case.
    pub fn begin_turn(&mut self) -> Option<TurnRequest> {
        let route = std::mem::take(&mut self.route);
        let query = self.take_query();
        if query.trim().is_empty() {
            return None;
        }

        self.append_message(ChatRole::User, query.clone());
        Some(TurnRequest {
            query,
            history: self.messages.clone(),
            prev_generation: self.last_generation.clone(),
            config: self.thread_config().with_route(route),
        })
    }

    /// Record the assistant side of a finished turn
    pub fn complete_turn(&mut self, outcome: &TurnOutcome) {
        self.append_message(ChatRole::Assistant, outcome.answer.clone());
        self.set_last_generation(outcome.answer.clone());
        self.set_last_run(outcome.run_id);
    }

    pub fn record_feedback(&mut self, receipt: FeedbackReceipt) {
        self.feedback = Some(receipt);
    }

    /// Feedback can be given once per run
    pub fn awaiting_feedback(&self) -> Option<Uuid> {
        let run_id = self.last_run_id?;
        match &self.feedback {
            Some(receipt) if receipt.run_id == run_id => None,
            _ => Some(run_id),
        }
    }

    pub fn thread_config(&self) -> ThreadConfig {
        ThreadConfig::new(self.thread_id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions keyed by connection; owned by whoever serves the connection.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session for `key` if it does not exist yet
    pub fn initialize(&mut self, key: &str) -> &mut Session {
        self.sessions.entry(key.to_string()).or_insert_with(|| {
            let session = Session::new();
            tracing::debug!(key, thread_id = %session.thread_id, "session created");
            session
        })
    }

    pub fn get(&self, key: &str) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    /// Drop the session and start a new conversation with a fresh thread id
    pub fn reset(&mut self, key: &str) -> &mut Session {
        self.sessions.remove(key);
        self.initialize(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(answer: &str, run_id: Option<Uuid>) -> TurnOutcome {
        TurnOutcome {
            answer: answer.to_string(),
            run_id,
            failed: false,
        }
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut manager = SessionManager::new();
        let first = manager.initialize("tab").thread_id;
        manager.initialize("tab").set_query("pending");
        let again = manager.initialize("tab");

        assert_eq!(again.thread_id, first);
        assert_eq!(again.query, "pending");
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn reset_starts_new_thread() {
        let mut manager = SessionManager::new();
        let first = manager.initialize("tab").thread_id;
        manager.get_mut("tab").unwrap().append_message(ChatRole::User, "hi");

        let fresh = manager.reset("tab");

        assert_ne!(fresh.thread_id, first);
        assert!(fresh.messages.is_empty());
    }

    #[test]
    fn empty_query_does_not_start_turn() {
        let mut session = Session::new();
        session.set_query("   ");

        assert!(session.begin_turn().is_none());
        assert!(session.messages.is_empty());
        assert!(session.query.is_empty());
    }

    #[test]
    fn human_message_precedes_assistant_message() {
        let mut session = Session::new();
        session.set_query("Which modalities exist?");

        let request = session.begin_turn().unwrap();
        assert_eq!(request.history.last().unwrap().content, "Which modalities exist?");
        assert_eq!(request.config.thread_id, session.thread_id);
        assert_eq!(request.config.route, Route::Auto);

        let run_id = Uuid::new_v4();
        session.complete_turn(&outcome("SPIM and ecephys", Some(run_id)));

        let roles: Vec<ChatRole> = session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
        assert_eq!(session.last_generation.as_deref(), Some("SPIM and ecephys"));
        assert_eq!(session.last_run_id, Some(run_id));

        session.set_query("Which is least common?");
        let next = session.begin_turn().unwrap();
        assert_eq!(next.prev_generation.as_deref(), Some("SPIM and ecephys"));
    }

    #[test]
    fn database_route_is_used_once() {
        let mut session = Session::new();
        session.set_database_query("count records");
        assert_eq!(session.begin_turn().unwrap().config.route, Route::Database);

        session.set_query("follow up");
        assert_eq!(session.begin_turn().unwrap().config.route, Route::Auto);
    }

    #[test]
    fn feedback_offered_once_per_run() {
        let mut session = Session::new();
        let run_id = Uuid::new_v4();
        session.complete_turn(&outcome("answer", Some(run_id)));
        assert_eq!(session.awaiting_feedback(), Some(run_id));

        session.record_feedback(FeedbackReceipt {
            feedback_id: Uuid::new_v4(),
            run_id,
            key: "FACES: 😀".into(),
            score: 1.0,
            comment: None,
        });
        assert_eq!(session.awaiting_feedback(), None);

        let next = Uuid::new_v4();
        session.complete_turn(&outcome("another", Some(next)));
        assert_eq!(session.awaiting_feedback(), Some(next));
        assert!(session.feedback.is_none());
    }
}
