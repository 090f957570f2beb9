use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role in conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    /// Role name as the chat-completions wire format spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// Individual conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

/// Typed unit of output produced while a turn streams.
///
/// A turn yields any number of non-final events followed by exactly one
/// `FinalResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental chunk from a non-database workflow node
    ToolOutput(String),
    /// Reasoning step reported by the query sub-agent
    IntermediateStep(String),
    /// Aggregation pipeline the sub-agent is about to run
    PipelineDescription(String),
    /// Raw database result, fenced for display
    ToolResponse(String),
    /// The answer that ends the turn
    FinalResponse(String),
}

impl StreamEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::FinalResponse(_))
    }

    pub fn content(&self) -> &str {
        match self {
            StreamEvent::ToolOutput(text)
            | StreamEvent::IntermediateStep(text)
            | StreamEvent::PipelineDescription(text)
            | StreamEvent::ToolResponse(text)
            | StreamEvent::FinalResponse(text) => text,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ToolOutput(_) => "tool_output",
            StreamEvent::IntermediateStep(_) => "intermediate_step",
            StreamEvent::PipelineDescription(_) => "pipeline_description",
            StreamEvent::ToolResponse(_) => "tool_response",
            StreamEvent::FinalResponse(_) => "final_response",
        }
    }
}

/// Event kinds emitted by the database query sub-agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentEventKind {
    IntermediateSteps,
    AggPipeline,
    ToolResponse,
    FinalAnswer,
}

/// One event from the query sub-agent stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentEvent {
    #[serde(rename = "type")]
    pub kind: SubAgentEventKind,
    pub content: String,
}

impl SubAgentEvent {
    pub fn new(kind: SubAgentEventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Routing hint carried with a thread config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Let the workflow decide
    #[default]
    Auto,
    /// Send the query to the database sub-agent
    Database,
}

/// Thread-scoped configuration handed to the workflow for every turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    pub thread_id: Uuid,
    pub route: Route,
}

impl ThreadConfig {
    pub fn new(thread_id: Uuid) -> Self {
        Self {
            thread_id,
            route: Route::Auto,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Wire form: `{"configurable": {"thread_id": ...}}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "configurable": {
                "thread_id": self.thread_id.to_string(),
            }
        })
    }
}

/// Payload of a workflow node update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub messages: Vec<ChatMessage>,
}

impl NodePayload {
    pub fn from_text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::new(role, text)],
        }
    }

    /// Content of the first message, if any
    pub fn first_content(&self) -> Option<&str> {
        self.messages.first().map(|m| m.content.as_str())
    }
}

/// `{node_key -> payload}` item yielded by the agent workflow
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub key: String,
    pub payload: NodePayload,
}

impl NodeUpdate {
    pub fn new(key: impl Into<String>, payload: NodePayload) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}
