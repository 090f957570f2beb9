use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::error::{RetrievalError, TurnError};
use crate::events::{StreamEvent, SubAgentEvent, SubAgentEventKind, ThreadConfig};
use crate::workflow::{QueryAgent, Workflow, WorkflowInput, DATABASE_QUERY_NODE};

/// Text shown ahead of an aggregation pipeline
pub const PIPELINE_PREFIX: &str = "The MongoDB pipeline being used to retrieve relevant data is:";
/// Text shown ahead of raw database output
pub const TOOL_RESPONSE_PREFIX: &str = "Retrieved output from the database:";

pub type TurnStream = mpsc::Receiver<Result<StreamEvent, TurnError>>;

/// Drives the agent workflow for one turn and turns node updates into typed
/// stream events
#[derive(Clone)]
pub struct StreamingOrchestrator {
    workflow: Arc<dyn Workflow>,
    query_agent: Arc<dyn QueryAgent>,
    event_timeout: Duration,
}

enum Relay {
    /// Sub-agent produced its final answer
    Finished,
    /// Consumer went away
    Abandoned,
}

impl StreamingOrchestrator {
    pub fn new(workflow: Arc<dyn Workflow>, query_agent: Arc<dyn QueryAgent>, event_timeout: Duration) -> Self {
        Self {
            workflow,
            query_agent,
            event_timeout,
        }
    }

    /// Start a turn.
    ///
    /// The returned stream yields zero or more non-final events and then either
    /// exactly one `FinalResponse` or one error, after which it ends.
    pub fn stream_turn(&self, input: WorkflowInput, config: ThreadConfig) -> TurnStream {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = this.drive(input, config, &tx).await {
                tracing::warn!(thread_id = %config.thread_id, error = %e, "turn failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn drive(
        &self,
        input: WorkflowInput,
        config: ThreadConfig,
        tx: &mpsc::Sender<Result<StreamEvent, TurnError>>,
    ) -> Result<(), TurnError> {
        let fallback_query = input.latest_query().unwrap_or_default().to_string();

        let mut updates = self.within_timeout(self.workflow.astream(input, config)).await??;
        let mut answer = String::new();

        while let Some(update) = self.within_timeout(updates.recv()).await? {
            let update = update?;

            if update.key == DATABASE_QUERY_NODE {
                let query = update
                    .payload
                    .first_content()
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or(fallback_query.as_str())
                    .to_string();
                tracing::info!(thread_id = %config.thread_id, "delegating turn to query agent");
                // The sub-agent's final answer ends the turn
                match self.relay_query_agent(&query, tx).await? {
                    Relay::Finished => tracing::debug!(thread_id = %config.thread_id, "query agent answered"),
                    Relay::Abandoned => tracing::debug!(thread_id = %config.thread_id, "turn abandoned during relay"),
                }
                return Ok(());
            }

            if let Some(chunk) = update.payload.first_content() {
                answer.push_str(chunk);
                if tx.send(Ok(StreamEvent::ToolOutput(chunk.to_string()))).await.is_err() {
                    tracing::debug!(thread_id = %config.thread_id, "turn abandoned");
                    return Ok(());
                }
            }
        }

        let _ = tx.send(Ok(StreamEvent::FinalResponse(answer))).await;
        Ok(())
    }

    async fn relay_query_agent(
        &self,
        query: &str,
        tx: &mpsc::Sender<Result<StreamEvent, TurnError>>,
    ) -> Result<Relay, TurnError> {
        let mut events = self
            .within_timeout(self.query_agent.astream_input(query))
            .await?
            .map_err(TurnError::Retrieval)?;

        while let Some(event) = self.within_timeout(events.recv()).await? {
            let event = present_sub_agent_event(event?);
            let is_final = event.is_final();
            if tx.send(Ok(event)).await.is_err() {
                return Ok(Relay::Abandoned);
            }
            if is_final {
                return Ok(Relay::Finished);
            }
        }

        Err(RetrievalError::MissingFinalAnswer.into())
    }

    async fn within_timeout<F: std::future::Future>(&self, future: F) -> Result<F::Output, TurnError> {
        timeout(self.event_timeout, future)
            .await
            .map_err(|_| TurnError::Timeout(self.event_timeout))
    }
}

/// Wrap a sub-agent event for display
pub fn present_sub_agent_event(event: SubAgentEvent) -> StreamEvent {
    match event.kind {
        SubAgentEventKind::IntermediateSteps => StreamEvent::IntermediateStep(event.content),
        SubAgentEventKind::AggPipeline => {
            StreamEvent::PipelineDescription(format!("{}\n{}", PIPELINE_PREFIX, event.content))
        }
        SubAgentEventKind::ToolResponse => StreamEvent::ToolResponse(format!(
            "{}\n```json\n{}\n```",
            TOOL_RESPONSE_PREFIX, event.content
        )),
        SubAgentEventKind::FinalAnswer => StreamEvent::FinalResponse(event.content),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by orchestrator and turn tests.

    use super::*;
    use crate::events::{ChatRole, NodePayload, NodeUpdate};
    use crate::workflow::{NodeStream, SubAgentStream};
    use async_trait::async_trait;

    pub enum Step<T, E> {
        Item(T),
        Fail(E),
        /// Never sends anything else and never closes
        Hang,
    }

    fn spawn_script<T, E>(steps: Vec<Step<T, E>>) -> mpsc::Receiver<Result<T, E>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Item(item) => {
                        if tx.send(Ok(item)).await.is_err() {
                            return;
                        }
                    }
                    Step::Fail(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                    Step::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return;
                    }
                }
            }
        });
        rx
    }

    pub struct ScriptedWorkflow {
        pub script: std::sync::Mutex<Option<Vec<Step<NodeUpdate, TurnError>>>>,
        /// Every input the workflow was started with
        pub inputs: std::sync::Mutex<Vec<WorkflowInput>>,
    }

    impl ScriptedWorkflow {
        pub fn new(steps: Vec<Step<NodeUpdate, TurnError>>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(Some(steps)),
                inputs: std::sync::Mutex::new(Vec::new()),
            })
        }

        /// Script for the next run
        pub fn reload(&self, steps: Vec<Step<NodeUpdate, TurnError>>) {
            *self.script.lock().unwrap() = Some(steps);
        }

        pub fn chunks(key: &str, chunks: &[&str]) -> Arc<Self> {
            Self::new(
                chunks
                    .iter()
                    .map(|c| Step::Item(NodeUpdate::new(key, NodePayload::from_text(ChatRole::Assistant, *c))))
                    .collect(),
            )
        }

        pub fn database(query: &str) -> Arc<Self> {
            Self::new(vec![Step::Item(NodeUpdate::new(
                DATABASE_QUERY_NODE,
                NodePayload::from_text(ChatRole::User, query),
            ))])
        }
    }

    #[async_trait]
    impl Workflow for ScriptedWorkflow {
        async fn astream(&self, input: WorkflowInput, _config: ThreadConfig) -> Result<NodeStream, TurnError> {
            self.inputs.lock().unwrap().push(input);
            let steps = self.script.lock().unwrap().take().unwrap_or_default();
            Ok(spawn_script(steps))
        }
    }

    pub struct ScriptedAgent {
        pub script: std::sync::Mutex<Option<Vec<Step<SubAgentEvent, RetrievalError>>>>,
        pub queries: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        pub fn new(steps: Vec<Step<SubAgentEvent, RetrievalError>>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(Some(steps)),
                queries: std::sync::Mutex::new(Vec::new()),
            })
        }

        pub fn idle() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl QueryAgent for ScriptedAgent {
        async fn astream_input(&self, query: &str) -> Result<SubAgentStream, RetrievalError> {
            self.queries.lock().unwrap().push(query.to_string());
            let steps = self.script.lock().unwrap().take().unwrap_or_default();
            Ok(spawn_script(steps))
        }
    }

    pub fn event(kind: SubAgentEventKind, content: &str) -> Step<SubAgentEvent, RetrievalError> {
        Step::Item(SubAgentEvent::new(kind, content))
    }
}
