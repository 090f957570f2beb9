use std::sync::Arc;

use crate::error::ProviderError;
use crate::events::ChatRole;
use crate::llm::{ChatModel, LlmMessage, LlmRequest};

/// System prompt for the direct-answer workflow node.
pub const DIRECT_ANSWER_PROMPT: &str = r#"You are a metadata assistant for a neuroscience data archive.

Answer questions about the archive's metadata records, schemas and acquisition
procedures. Be concise and factual. When a question needs specific records from
the database, say so and suggest the user ask for a database lookup with `/db`.
If you do not know the answer, say that you do not know."#;

/// System prompt for a turn, carrying the thread's previous answer when there is one
pub fn direct_answer_prompt(prev_generation: Option<&str>) -> String {
    match prev_generation {
        Some(previous) if !previous.trim().is_empty() => format!(
            "{}\n\nYour previous answer in this conversation was:\n{}",
            DIRECT_ANSWER_PROMPT, previous
        ),
        _ => DIRECT_ANSWER_PROMPT.to_string(),
    }
}

/// Fixed message template with a single `{input}` field.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    messages: Vec<(ChatRole, String)>,
}

impl PromptTemplate {
    /// Single human turn, e.g. `PromptTemplate::human("{input}")`
    pub fn human(template: &str) -> Self {
        Self {
            messages: vec![(ChatRole::User, template.to_string())],
        }
    }

    /// Substitute `{input}` in every message
    pub fn format(&self, input: &str) -> Vec<LlmMessage> {
        self.messages
            .iter()
            .map(|(role, template)| LlmMessage {
                role: role.as_str().to_string(),
                content: template.replace("{input}", input),
            })
            .collect()
    }
}

/// Template piped into a model: one input in, one response out.
#[derive(Clone)]
pub struct PromptChain {
    template: PromptTemplate,
    model: Arc<dyn ChatModel>,
}

impl PromptChain {
    pub fn new(template: PromptTemplate, model: Arc<dyn ChatModel>) -> Self {
        Self { template, model }
    }

    /// The default `human: {input}` chain
    pub fn human_input(model: Arc<dyn ChatModel>) -> Self {
        Self::new(PromptTemplate::human("{input}"), model)
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn run(&self, input: &str) -> Result<String, ProviderError> {
        let request = LlmRequest::new(self.template.format(input));
        self.model.invoke(request).await
    }
}
