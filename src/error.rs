//! Error types for the model client, retrieval sub-agent, tracing and turns.

use std::time::Duration;

use uuid::Uuid;

/// Failures talking to the hosted language model.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(String),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("{provider} rejected the credentials: {message}")]
    Auth { provider: String, message: String },
    #[error("{provider} quota exceeded: {message}")]
    Quota { provider: String, message: String },
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// Failures while running the database query sub-agent.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("{0}")]
    SubAgent(String),
    #[error("query agent is not configured")]
    NotConfigured,
    #[error("query agent returned an invalid event: {0}")]
    InvalidEvent(String),
    #[error("query agent stream ended without a final answer")]
    MissingFinalAnswer,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures recording feedback against a traced run.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("invalid feedback score: {0}")]
    UnmappedScore(String),
    #[error("run not found: {0}")]
    UnknownRun(Uuid),
    #[error("tracing backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures recording runs with the tracing backend.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("tracing backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Anything that can end a chat turn early.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("workflow error: {0}")]
    Workflow(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}
