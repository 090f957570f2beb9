//! Conversation UI components for chat interface

pub mod commands;
pub mod composer;
pub mod examples;
pub mod feedback;
pub mod history;
pub mod manager;
pub mod streaming;

pub use commands::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand};
pub use composer::ConversationComposer;
pub use examples::ExampleBar;
pub use feedback::{FeedbackSubmission, FeedbackWidget};
pub use history::ConversationHistory;
pub use manager::{ConversationAction, ConversationManager};
pub use streaming::StreamingResponse;
