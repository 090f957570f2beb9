//! Run tracing and feedback against a LangSmith-style backend.
//!
//! Every chat turn is recorded as a root run with optional child runs. Feedback
//! scores are attached to a run id afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::TracingConfig;
use crate::error::{FeedbackError, TraceError};
use crate::feedback::FaceScore;

/// One traced unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub trace_id: Uuid,
    pub dotted_order: String,
    pub name: String,
    pub run_type: String,
    pub session_name: String,
    pub tags: Vec<String>,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn is_root(&self) -> bool {
        self.parent_run_id.is_none()
    }
}

/// Stored feedback, as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub feedback_id: Uuid,
    pub run_id: Uuid,
    pub key: String,
    pub score: f64,
    pub comment: Option<String>,
}

/// Ordering key the backend uses to sort runs within a trace
pub fn dotted_order_segment(start_time: DateTime<Utc>, id: Uuid) -> String {
    format!("{}{}", start_time.format("%Y%m%dT%H%M%S%6fZ"), id)
}

/// The run feedback should be attached to: the last completed root run
pub fn feedback_run_id(runs: &[RunRecord]) -> Option<Uuid> {
    runs.iter().rev().find(|run| run.is_root()).map(|run| run.id)
}

#[async_trait]
pub trait TraceBackend: Send + Sync {
    async fn create_run(&self, run: &RunRecord) -> Result<(), TraceError>;
    async fn update_run(&self, run: &RunRecord) -> Result<(), TraceError>;
    async fn create_feedback(&self, receipt: &FeedbackReceipt) -> Result<(), FeedbackError>;
}

/// Keeps runs and feedback in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTraceBackend {
    runs: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
    feedback: Arc<RwLock<HashMap<Uuid, FeedbackReceipt>>>,
}

impl InMemoryTraceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run(&self, id: Uuid) -> Option<RunRecord> {
        self.runs.read().await.get(&id).cloned()
    }

    /// Feedback currently stored for a run
    pub async fn feedback_for(&self, run_id: Uuid) -> Option<FeedbackReceipt> {
        self.feedback.read().await.get(&run_id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn runs_named(&self, name: &str) -> Vec<RunRecord> {
        self.runs
            .read()
            .await
            .values()
            .filter(|run| run.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TraceBackend for InMemoryTraceBackend {
    async fn create_run(&self, run: &RunRecord) -> Result<(), TraceError> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &RunRecord) -> Result<(), TraceError> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn create_feedback(&self, receipt: &FeedbackReceipt) -> Result<(), FeedbackError> {
        if !self.runs.read().await.contains_key(&receipt.run_id) {
            return Err(FeedbackError::UnknownRun(receipt.run_id));
        }
        // one score per run, last write wins
        self.feedback
            .write()
            .await
            .insert(receipt.run_id, receipt.clone());
        Ok(())
    }
}

/// REST client for a LangSmith-compatible endpoint
#[derive(Clone)]
pub struct LangSmithBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl LangSmithBackend {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, TraceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn check(response: reqwest::Response) -> Result<(), TraceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(TraceError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TraceBackend for LangSmithBackend {
    async fn create_run(&self, run: &RunRecord) -> Result<(), TraceError> {
        let response = self
            .client
            .post(self.url("runs"))
            .header("x-api-key", &self.api_key)
            .json(run)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn update_run(&self, run: &RunRecord) -> Result<(), TraceError> {
        let body = json!({
            "outputs": run.outputs,
            "error": run.error,
            "end_time": run.end_time,
            "trace_id": run.trace_id,
            "dotted_order": run.dotted_order,
            "parent_run_id": run.parent_run_id,
        });
        let response = self
            .client
            .patch(self.url(&format!("runs/{}", run.id)))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn create_feedback(&self, receipt: &FeedbackReceipt) -> Result<(), FeedbackError> {
        let body = json!({
            "id": receipt.feedback_id,
            "run_id": receipt.run_id,
            "key": receipt.key,
            "score": receipt.score,
            "comment": receipt.comment,
        });
        let response = self
            .client
            .post(self.url("feedback"))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FeedbackError::UnknownRun(receipt.run_id));
        }
        let message = response.text().await.unwrap_or_default();
        Err(FeedbackError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

/// Opens runs for a project and attaches feedback to them.
#[derive(Clone)]
pub struct RunTracer {
    backend: Arc<dyn TraceBackend>,
    project: String,
}

impl RunTracer {
    pub fn new(backend: Arc<dyn TraceBackend>, project: impl Into<String>) -> Self {
        Self {
            backend,
            project: project.into(),
        }
    }

    /// LangSmith when an API key is configured, memory otherwise
    pub fn from_config(config: &TracingConfig) -> Result<Self, TraceError> {
        let backend: Arc<dyn TraceBackend> = match config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                tracing::info!(endpoint = %config.endpoint, project = %config.project, "tracing runs to LangSmith");
                Arc::new(LangSmithBackend::new(&config.endpoint, key)?)
            }
            _ => {
                tracing::debug!("no tracing API key, keeping runs in memory");
                Arc::new(InMemoryTraceBackend::new())
            }
        };
        Ok(Self::new(backend, &config.project))
    }

    pub async fn begin_run(&self, name: &str, tags: Vec<String>, inputs: Value) -> RunScope {
        let id = Uuid::new_v4();
        let start_time = Utc::now();
        let root = RunRecord {
            id,
            parent_run_id: None,
            trace_id: id,
            dotted_order: dotted_order_segment(start_time, id),
            name: name.to_string(),
            run_type: "chain".to_string(),
            session_name: self.project.clone(),
            tags,
            inputs,
            outputs: None,
            error: None,
            start_time,
            end_time: None,
        };
        self.post(&root).await;

        RunScope {
            tracer: self.clone(),
            root,
            open: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Attach a face score to a completed run
    pub async fn record_feedback(
        &self,
        run_id: Uuid,
        face: FaceScore,
        comment: Option<String>,
    ) -> Result<FeedbackReceipt, FeedbackError> {
        let receipt = FeedbackReceipt {
            feedback_id: Uuid::new_v4(),
            run_id,
            key: face.label(),
            score: face.score(),
            comment: comment.filter(|c| !c.trim().is_empty()),
        };
        self.backend.create_feedback(&receipt).await?;
        tracing::info!(%run_id, key = %receipt.key, score = receipt.score, "feedback recorded");
        Ok(receipt)
    }

    async fn post(&self, run: &RunRecord) {
        if let Err(e) = self.backend.create_run(run).await {
            tracing::warn!(run_id = %run.id, name = %run.name, error = %e, "failed to create run");
        }
    }

    async fn patch(&self, run: &RunRecord) {
        if let Err(e) = self.backend.update_run(run).await {
            tracing::warn!(run_id = %run.id, name = %run.name, error = %e, "failed to update run");
        }
    }
}

/// An open root run and the children started beneath it.
pub struct RunScope {
    tracer: RunTracer,
    root: RunRecord,
    open: Vec<RunRecord>,
    completed: Vec<RunRecord>,
}

impl RunScope {
    pub fn id(&self) -> Uuid {
        self.root.id
    }

    pub async fn start_child(&mut self, name: &str, inputs: Value) -> Uuid {
        let id = Uuid::new_v4();
        let start_time = Utc::now();
        let child = RunRecord {
            id,
            parent_run_id: Some(self.root.id),
            trace_id: self.root.trace_id,
            dotted_order: format!("{}.{}", self.root.dotted_order, dotted_order_segment(start_time, id)),
            name: name.to_string(),
            run_type: "chain".to_string(),
            session_name: self.root.session_name.clone(),
            tags: self.root.tags.clone(),
            inputs,
            outputs: None,
            error: None,
            start_time,
            end_time: None,
        };
        self.tracer.post(&child).await;
        self.open.push(child);
        id
    }

    /// Close a child run. Unknown ids are ignored.
    pub async fn end_child(&mut self, id: Uuid, outputs: Option<Value>, error: Option<String>) {
        let Some(index) = self.open.iter().position(|run| run.id == id) else {
            return;
        };
        let mut child = self.open.remove(index);
        child.outputs = outputs;
        child.error = error;
        child.end_time = Some(Utc::now());
        self.tracer.patch(&child).await;
        self.completed.push(child);
    }

    /// Close any children still open, then the root. Returns every run in
    /// completion order, root last.
    pub async fn finish(mut self, outputs: Option<Value>, error: Option<String>) -> Vec<RunRecord> {
        let dangling: Vec<Uuid> = self.open.iter().map(|run| run.id).collect();
        for id in dangling {
            self.end_child(id, None, error.clone()).await;
        }

        self.root.outputs = outputs;
        self.root.error = error;
        self.root.end_time = Some(Utc::now());
        self.tracer.patch(&self.root).await;

        let mut runs = self.completed;
        runs.push(self.root);
        runs
    }
}
