//! One chat turn from query to stored answer: runs the orchestrator inside a
//! traced run, forwards events for display, and turns failures into an answer
//! the user can read.

use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TurnError;
use crate::events::StreamEvent;
use crate::orchestrator::StreamingOrchestrator;
use crate::runs::{feedback_run_id, RunTracer};
use crate::session::TurnRequest;
use crate::workflow::WorkflowInput;

pub const TURN_RUN_NAME: &str = "chat_turn";
pub const DATABASE_RUN_NAME: &str = "database_query";

/// Progress of a running turn, as seen by the UI
#[derive(Debug, Clone)]
pub enum TurnUpdate {
    /// Non-final output to reveal while the turn continues
    Event(StreamEvent),
    Completed(TurnOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Final response text, or the rendered error that replaced it
    pub answer: String,
    /// Run that feedback for this answer attaches to
    pub run_id: Option<Uuid>,
    pub failed: bool,
}

/// Chat-visible message for a failed turn
pub fn render_turn_error(error: &TurnError) -> String {
    match error {
        TurnError::Retrieval(e) => format!(
            "An error has occurred with the retrieval from the metadata database: {}. Try structuring your query another way.",
            e
        ),
        TurnError::Provider(e) => format!(
            "The language model could not answer: {}. Try again, or structure your query another way.",
            e
        ),
        TurnError::Workflow(message) => format!(
            "The agent workflow failed: {}. Try structuring your query another way.",
            message
        ),
        TurnError::Timeout(limit) => format!(
            "No response arrived within {} seconds. Try a narrower query.",
            limit.as_secs()
        ),
    }
}

#[derive(Clone)]
pub struct TurnDriver {
    orchestrator: StreamingOrchestrator,
    tracer: RunTracer,
}

impl TurnDriver {
    pub fn new(orchestrator: StreamingOrchestrator, tracer: RunTracer) -> Self {
        Self { orchestrator, tracer }
    }

    /// Run a turn in the background. The last update is always `Completed`.
    pub fn start(&self, request: TurnRequest) -> mpsc::Receiver<TurnUpdate> {
        let (tx, rx) = mpsc::channel(64);
        let driver = self.clone();
        tokio::spawn(async move {
            let outcome = driver.run(request, &tx).await;
            let _ = tx.send(TurnUpdate::Completed(outcome)).await;
        });
        rx
    }

    /// Run a turn to completion, sending each non-final event to `updates`.
    pub async fn run(&self, request: TurnRequest, updates: &mpsc::Sender<TurnUpdate>) -> TurnOutcome {
        let thread_id = request.config.thread_id;
        let mut scope = self
            .tracer
            .begin_run(
                TURN_RUN_NAME,
                vec!["metachat".to_string()],
                json!({ "query": request.query, "thread_id": thread_id }),
            )
            .await;
        tracing::info!(%thread_id, run_id = %scope.id(), "turn started");

        let input = WorkflowInput {
            messages: request.history,
            prev_generation: request.prev_generation,
        };
        let mut stream = self.orchestrator.stream_turn(input, request.config);
        let mut database_run = None;

        let result: Result<String, TurnError> = loop {
            let Some(item) = stream.recv().await else {
                break Err(TurnError::Workflow("stream ended without a final response".to_string()));
            };
            let event = match item {
                Ok(event) => event,
                Err(e) => break Err(e),
            };

            // only the query sub-agent reports steps, pipelines and raw results
            let from_sub_agent = matches!(
                event,
                StreamEvent::IntermediateStep(_) | StreamEvent::PipelineDescription(_) | StreamEvent::ToolResponse(_)
            );
            if from_sub_agent && database_run.is_none() {
                let child = scope
                    .start_child(DATABASE_RUN_NAME, json!({ "query": request.query }))
                    .await;
                database_run = Some(child);
            }

            let event = match event {
                StreamEvent::FinalResponse(answer) => break Ok(answer),
                other => other,
            };
            let _ = updates.send(TurnUpdate::Event(event)).await;
        };

        let (answer, failed, error) = match result {
            Ok(answer) => (answer, false, None),
            Err(e) => {
                tracing::warn!(%thread_id, error = %e, "turn ended with an error");
                (render_turn_error(&e), true, Some(e.to_string()))
            }
        };

        if let Some(child) = database_run {
            scope
                .end_child(child, Some(json!({ "answer": answer })), error.clone())
                .await;
        }
        let runs = scope.finish(Some(json!({ "answer": answer })), error).await;
        let run_id = feedback_run_id(&runs);
        tracing::info!(%thread_id, run_id = ?run_id, failed, "turn finished");

        TurnOutcome { answer, run_id, failed }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Duration;

    use super::*;
    use crate::error::RetrievalError;
    use crate::events::{ChatRole, SubAgentEventKind};
    use crate::orchestrator::testing::*;
    use crate::runs::InMemoryTraceBackend;
    use crate::session::Session;
    use crate::workflow::{QueryAgent, Workflow};

    fn driver(
        workflow: Arc<dyn Workflow>,
        agent: Arc<dyn QueryAgent>,
    ) -> (TurnDriver, InMemoryTraceBackend) {
        let backend = InMemoryTraceBackend::new();
        let tracer = RunTracer::new(Arc::new(backend.clone()), "test");
        let orchestrator = StreamingOrchestrator::new(workflow, agent, Duration::from_secs(5));
        (TurnDriver::new(orchestrator, tracer), backend)
    }

    async fn run_turn(driver: &TurnDriver, session: &mut Session) -> (TurnOutcome, Vec<StreamEvent>) {
        let request = session.begin_turn().unwrap();
        let mut rx = driver.start(request);
        let mut streamed = Vec::new();
        let outcome = loop {
            match rx.recv().await.unwrap() {
                TurnUpdate::Event(event) => streamed.push(event),
                TurnUpdate::Completed(outcome) => break outcome,
            }
        };
        session.complete_turn(&outcome);
        (outcome, streamed)
    }

    #[tokio::test]
    async fn direct_answer_is_stored_and_traced() {
        let (driver, backend) = driver(
            ScriptedWorkflow::chunks("generate", &["Hello", " there"]),
            ScriptedAgent::idle(),
        );
        let mut session = Session::new();
        session.set_query("hi");

        let (outcome, streamed) = run_turn(&driver, &mut session).await;

        assert_eq!(outcome.answer, "Hello there");
        assert!(!outcome.failed);
        assert_eq!(streamed.len(), 2);
        assert_eq!(session.messages[1].content, "Hello there");

        let run_id = outcome.run_id.unwrap();
        let run = backend.run(run_id).await.unwrap();
        assert_eq!(run.name, TURN_RUN_NAME);
        assert!(run.is_root());
    }

    #[tokio::test]
    async fn retrieval_failure_becomes_single_assistant_message() {
        let agent = ScriptedAgent::new(vec![
            event(SubAgentEventKind::AggPipeline, "[]"),
            Step::Fail(RetrievalError::SubAgent("bad $match stage".into())),
        ]);
        let (driver, backend) = driver(ScriptedWorkflow::database("q"), agent);
        let mut session = Session::new();
        session.set_query("find stuff");

        let (outcome, _) = run_turn(&driver, &mut session).await;

        assert!(outcome.failed);
        assert!(outcome.answer.contains("bad $match stage"));
        assert!(outcome.answer.contains("Try structuring your query another way."));
        let assistant: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);

        let run = backend.run(outcome.run_id.unwrap()).await.unwrap();
        assert!(run.error.unwrap().contains("bad $match stage"));
    }

    #[tokio::test]
    async fn database_turn_gets_child_run_and_root_feedback_id() {
        let agent = ScriptedAgent::new(vec![
            event(SubAgentEventKind::AggPipeline, "[]"),
            event(SubAgentEventKind::ToolResponse, "[]"),
            event(SubAgentEventKind::FinalAnswer, "nothing found"),
        ]);
        let (driver, backend) = driver(ScriptedWorkflow::database("q"), agent);
        let mut session = Session::new();
        session.set_query("find stuff");

        let (outcome, streamed) = run_turn(&driver, &mut session).await;

        assert_eq!(outcome.answer, "nothing found");
        assert_eq!(streamed.len(), 2);
        let root = backend.run(outcome.run_id.unwrap()).await.unwrap();
        assert!(root.is_root());
        assert_eq!(root.name, TURN_RUN_NAME);
        assert_eq!(backend.runs_named(DATABASE_RUN_NAME).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_direct_answer_records_no_database_run() {
        let (driver, backend) = driver(ScriptedWorkflow::chunks("generate", &[]), ScriptedAgent::idle());
        let mut session = Session::new();
        session.set_query("say nothing");

        let (outcome, streamed) = run_turn(&driver, &mut session).await;

        assert_eq!(outcome.answer, "");
        assert!(!outcome.failed);
        assert!(streamed.is_empty());
        assert!(backend.runs_named(DATABASE_RUN_NAME).await.is_empty());
        assert_eq!(backend.runs_named(TURN_RUN_NAME).await.len(), 1);
    }

    #[tokio::test]
    async fn previous_answer_reaches_the_workflow() {
        let workflow = ScriptedWorkflow::chunks("generate", &["first"]);
        let (driver, _) = driver(workflow.clone(), ScriptedAgent::idle());
        let mut session = Session::new();
        session.set_query("one");
        run_turn(&driver, &mut session).await;

        workflow.reload(vec![]);
        session.set_query("two");
        run_turn(&driver, &mut session).await;

        let inputs = workflow.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].prev_generation, None);
        assert_eq!(inputs[1].prev_generation.as_deref(), Some("first"));
    }

    #[test]
    fn timeout_message_mentions_limit() {
        let text = render_turn_error(&TurnError::Timeout(Duration::from_secs(120)));
        assert!(text.contains("120 seconds"));
    }
}
