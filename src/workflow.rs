//! Agent workflow and query sub-agent contracts, plus the implementations this
//! crate ships: a direct-answer workflow over the model client and an HTTP
//! client for a remote database query agent.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::checkpoint::MemoryCheckpointer;
use crate::error::{ProviderError, RetrievalError, TurnError};
use crate::events::{
    ChatMessage, ChatRole, NodePayload, NodeUpdate, Route, SubAgentEvent, ThreadConfig,
};
use crate::llm::{ChatModel, LlmEvent, LlmRequest, SseLineBuffer};
use crate::prompts::direct_answer_prompt;

/// Node key that hands the turn to the database query sub-agent
pub const DATABASE_QUERY_NODE: &str = "database_query";
/// Node key of the direct model answer
pub const GENERATE_NODE: &str = "generate";

pub type NodeStream = mpsc::Receiver<Result<NodeUpdate, TurnError>>;
pub type SubAgentStream = mpsc::Receiver<Result<SubAgentEvent, RetrievalError>>;

/// Inputs for one workflow run
#[derive(Debug, Clone, Default)]
pub struct WorkflowInput {
    pub messages: Vec<ChatMessage>,
    /// Answer produced by the previous turn, if any
    pub prev_generation: Option<String>,
}

impl WorkflowInput {
    /// Most recent human message, which is the query being answered
    pub fn latest_query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Graph-structured agent workflow, consumed as a stream of node updates
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn astream(&self, input: WorkflowInput, config: ThreadConfig) -> Result<NodeStream, TurnError>;
}

/// Database query sub-agent
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn astream_input(&self, query: &str) -> Result<SubAgentStream, RetrievalError>;
}

/// Answers with the model unless the thread config asks for the database route.
#[derive(Clone)]
pub struct DirectAnswerWorkflow {
    model: Arc<dyn ChatModel>,
    checkpointer: MemoryCheckpointer,
}

impl DirectAnswerWorkflow {
    pub fn new(model: Arc<dyn ChatModel>, checkpointer: MemoryCheckpointer) -> Self {
        Self { model, checkpointer }
    }
}

#[async_trait]
impl Workflow for DirectAnswerWorkflow {
    async fn astream(&self, input: WorkflowInput, config: ThreadConfig) -> Result<NodeStream, TurnError> {
        // the checkpoint remembers the thread's last answer when the caller does not
        let prev_generation = match input.prev_generation.clone() {
            Some(generation) => Some(generation),
            None => self
                .checkpointer
                .get(config.thread_id)
                .await
                .and_then(|state| state.generation),
        };
        self.checkpointer
            .put_messages(config.thread_id, input.messages.clone())
            .await;
        let (tx, rx) = mpsc::channel(64);

        if config.route == Route::Database {
            let query = input.latest_query().unwrap_or_default();
            let update = NodeUpdate::new(DATABASE_QUERY_NODE, NodePayload::from_text(ChatRole::User, query));
            // fresh channel, so there is room for the single update
            let _ = tx.try_send(Ok(update));
            return Ok(rx);
        }

        let system = direct_answer_prompt(prev_generation.as_deref());
        let request = LlmRequest::from_history(Some(&system), &input.messages);
        let mut llm_rx = self.model.stream(request).await?;
        let checkpointer = self.checkpointer.clone();
        let thread_id = config.thread_id;

        tokio::spawn(async move {
            while let Some(event) = llm_rx.recv().await {
                match event {
                    LlmEvent::TextDelta(chunk) => {
                        let update =
                            NodeUpdate::new(GENERATE_NODE, NodePayload::from_text(ChatRole::Assistant, chunk));
                        if tx.send(Ok(update)).await.is_err() {
                            return;
                        }
                    }
                    LlmEvent::ResponseComplete(full) => {
                        checkpointer.put_generation(thread_id, full).await;
                    }
                    LlmEvent::StreamComplete => break,
                    LlmEvent::Error(message) => {
                        let _ = tx.send(Err(ProviderError::Stream(message).into())).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Query agent reached over HTTP.
///
/// POSTs `{"query": ...}` and reads newline-delimited JSON events of the form
/// `{"type": "agg_pipeline", "content": "..."}`. `data:` prefixes are accepted
/// so an SSE endpoint works too.
#[derive(Clone)]
pub struct HttpQueryAgent {
    client: reqwest::Client,
    url: String,
}

impl HttpQueryAgent {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl QueryAgent for HttpQueryAgent {
    async fn astream_input(&self, query: &str) -> Result<SubAgentStream, RetrievalError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::SubAgent(format!(
                "query agent returned {}: {}",
                status, body
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    if tx.send(parse_agent_line(&line)).await.is_err() {
                        return;
                    }
                }
            }
            if let Some(line) = lines.finish() {
                let _ = tx.send(parse_agent_line(&line)).await;
            }
        });

        Ok(rx)
    }
}

/// Stand-in used when no query agent URL is configured
pub struct UnconfiguredQueryAgent;

#[async_trait]
impl QueryAgent for UnconfiguredQueryAgent {
    async fn astream_input(&self, _query: &str) -> Result<SubAgentStream, RetrievalError> {
        Err(RetrievalError::NotConfigured)
    }
}

/// Decode one line of the query agent's event stream
pub fn parse_agent_line(line: &str) -> Result<SubAgentEvent, RetrievalError> {
    let data = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(RetrievalError::SubAgent(message.to_string()));
        }
    }
    serde_json::from_str(data).map_err(|e| RetrievalError::InvalidEvent(format!("{}: {}", e, data)))
}
