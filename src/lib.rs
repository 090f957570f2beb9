//! Terminal chat front end for a metadata retrieval agent.
//!
//! A turn runs the agent workflow for the session's thread, streams typed
//! events into the UI, records the turn as a traced run and lets the user rate
//! the answer.

pub mod app;
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod feedback;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod runs;
pub mod session;
pub mod turn;
pub mod typewriter;
pub mod ui;
pub mod workflow;
