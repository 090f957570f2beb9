//! Process-wide, memory-only workflow state keyed by thread id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::ChatMessage;

/// Snapshot of one thread as the workflow last saw it
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadState {
    pub messages: Vec<ChatMessage>,
    pub generation: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Cheap to clone; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointer {
    threads: Arc<RwLock<HashMap<Uuid, ThreadState>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, thread_id: Uuid) -> Option<ThreadState> {
        self.threads.read().await.get(&thread_id).cloned()
    }

    /// Replace the thread's messages, keeping the last generation
    pub async fn put_messages(&self, thread_id: Uuid, messages: Vec<ChatMessage>) {
        let mut threads = self.threads.write().await;
        let state = threads.entry(thread_id).or_insert_with(|| ThreadState {
            messages: Vec::new(),
            generation: None,
            updated_at: Utc::now(),
        });
        state.messages = messages;
        state.updated_at = Utc::now();
    }

    /// Record the answer produced for the thread's latest turn
    pub async fn put_generation(&self, thread_id: Uuid, generation: String) {
        let mut threads = self.threads.write().await;
        if let Some(state) = threads.get_mut(&thread_id) {
            state.messages.push(ChatMessage::assistant(generation.clone()));
            state.generation = Some(generation);
            state.updated_at = Utc::now();
        }
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}
