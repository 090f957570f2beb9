use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;

use crate::checkpoint::MemoryCheckpointer;
use crate::config::Config;
use crate::llm::{ChatModel, LlmClient};
use crate::orchestrator::StreamingOrchestrator;
use crate::prompts::PromptChain;
use crate::runs::RunTracer;
use crate::turn::TurnDriver;
use crate::workflow::{DirectAnswerWorkflow, HttpQueryAgent, QueryAgent, UnconfiguredQueryAgent};

/// Shared services built once per process and handed to every front end.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub model: Arc<dyn ChatModel>,
    pub checkpointer: MemoryCheckpointer,
    pub tracer: RunTracer,
    pub driver: TurnDriver,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let model: Arc<dyn ChatModel> =
            Arc::new(LlmClient::from_config(&config).context("Failed to initialize the model client")?);

        let query_agent: Arc<dyn QueryAgent> = match config.query_agent.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Arc::new(
                HttpQueryAgent::new(url, Duration::from_secs(config.query_agent.timeout_secs))
                    .context("Failed to build the query agent client")?,
            ),
            _ => {
                tracing::info!("no query agent configured; database lookups are unavailable");
                Arc::new(UnconfiguredQueryAgent)
            }
        };

        let tracer = RunTracer::from_config(&config.tracing).context("Failed to build the tracing client")?;
        Ok(Self::with_parts(config, model, query_agent, tracer))
    }

    /// Wire the workflow and turn driver around already-built collaborators
    pub fn with_parts(
        config: Config,
        model: Arc<dyn ChatModel>,
        query_agent: Arc<dyn QueryAgent>,
        tracer: RunTracer,
    ) -> Self {
        let checkpointer = MemoryCheckpointer::new();
        let workflow = Arc::new(DirectAnswerWorkflow::new(model.clone(), checkpointer.clone()));
        let orchestrator = StreamingOrchestrator::new(
            workflow,
            query_agent,
            Duration::from_secs(config.ui.turn_timeout_secs),
        );
        let driver = TurnDriver::new(orchestrator, tracer.clone());

        tracing::debug!(model = model.model_name(), provider = %config.default_provider, "app context ready");
        Self {
            config,
            model,
            checkpointer,
            tracer,
            driver,
        }
    }

    pub fn prompt_chain(&self) -> PromptChain {
        PromptChain::human_input(self.model.clone())
    }

    pub fn typewriter_delay(&self) -> Duration {
        Duration::from_millis(self.config.ui.typewriter_delay_ms.max(1))
    }
}
