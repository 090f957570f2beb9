//! Line-mode front ends: a plain chat loop, a one-shot traced prompt, and
//! feedback submission for an existing run.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::app::AppContext;
use crate::feedback::FaceScore;
use crate::session::{Session, SessionManager};
use crate::turn::TurnUpdate;
use crate::ui::conversation::{get_help_text, parse_slash_command, SlashCommand};

const PLAIN_SESSION: &str = "plain";

/// Chat over stdin/stdout without the full-screen UI
pub async fn run_plain_chat(ctx: &AppContext) -> Result<()> {
    let mut sessions = SessionManager::new();
    sessions.initialize(PLAIN_SESSION);

    println!("Ask a question about the metadata, or pick one of these suggestions:");
    for (i, example) in ctx.config.ui.examples.iter().enumerate() {
        println!("  [{}] {}", i + 1, example);
    }
    println!("Type /help for commands.\n");
    println!("🤖 Hello! How can I help you?");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read user input")? else {
            break;
        };
        let line = line.trim();
        let session = sessions.initialize(PLAIN_SESSION);

        if let Some(parsed) = parse_slash_command(line) {
            match parsed.command {
                SlashCommand::Quit => break,
                SlashCommand::Help => println!("{}", get_help_text()),
                SlashCommand::New => {
                    let fresh = sessions.reset(PLAIN_SESSION);
                    println!("🆕 New conversation ({})", fresh.thread_id);
                }
                SlashCommand::Rate => rate_last_answer(ctx, session, &parsed).await,
                SlashCommand::Db => match parsed.argument() {
                    Some(query) => {
                        session.set_database_query(query);
                        run_plain_turn(ctx, session).await;
                    }
                    None => println!("Usage: /db <query>"),
                },
            }
            continue;
        }

        // a bare 1-3 picks an example query
        let query = match line.parse::<usize>() {
            Ok(n) if n >= 1 && n <= ctx.config.ui.examples.len() => ctx.config.ui.examples[n - 1].clone(),
            _ => line.to_string(),
        };
        session.set_query(query);
        run_plain_turn(ctx, session).await;
    }

    println!("👋 Bye!");
    Ok(())
}

async fn run_plain_turn(ctx: &AppContext, session: &mut Session) {
    let Some(request) = session.begin_turn() else {
        return;
    };

    println!("⏳ Generating answer...");
    let mut updates = ctx.driver.start(request);
    while let Some(update) = updates.recv().await {
        match update {
            TurnUpdate::Event(event) => {
                // model chunks arrive word by word; everything else is a block
                if event.kind() == "tool_output" {
                    print!("{}", event.content());
                    let _ = std::io::stdout().flush();
                } else {
                    println!("\n{}", event.content());
                }
            }
            TurnUpdate::Completed(outcome) => {
                println!("\n\n🤖 {}", outcome.answer);
                if let Some(run_id) = outcome.run_id {
                    println!("   (run {} - rate it with /rate <1-5> [comment])", run_id);
                }
                session.complete_turn(&outcome);
                break;
            }
        }
    }
}

async fn rate_last_answer(
    ctx: &AppContext,
    session: &mut Session,
    parsed: &crate::ui::conversation::ParsedCommand,
) {
    let Some(run_id) = session.awaiting_feedback() else {
        println!("Nothing to rate yet.");
        return;
    };
    let (face, comment) = match parsed.rating() {
        Ok(rating) => rating,
        Err(e) => {
            println!("⚠️  {}", e);
            return;
        }
    };
    match ctx.tracer.record_feedback(run_id, face, comment).await {
        Ok(receipt) => {
            println!("Thanks! Recorded {} ({})", receipt.key, receipt.score);
            session.record_feedback(receipt);
        }
        Err(e) => println!("⚠️  Could not record feedback: {}", e),
    }
}

/// Run the prompt chain once inside a traced run and print the response
pub async fn ask(ctx: &AppContext, input: &str) -> Result<()> {
    let chain = ctx.prompt_chain();
    let tags = vec!["metachat".to_string(), chain.model_name().to_string()];
    let mut scope = ctx
        .tracer
        .begin_run("prompt_chain", tags, json!({ "input": input }))
        .await;
    let llm_run = scope.start_child("llm", json!({ "input": input })).await;

    let result = chain.run(input).await;
    let error = result.as_ref().err().map(|e| e.to_string());
    scope
        .end_child(llm_run, result.as_ref().ok().map(|text| json!({ "output": text })), error.clone())
        .await;
    let run_id = scope.id();
    scope
        .finish(result.as_ref().ok().map(|text| json!({ "output": text })), error)
        .await;

    let response = result.context("Pipeline execution failed")?;
    println!("Response: {}", response);
    println!("Run: {}", run_id);
    Ok(())
}

/// Attach a face score to a run recorded earlier
pub async fn submit_feedback(ctx: &AppContext, run_id: &str, score: &str, comment: Option<String>) -> Result<()> {
    let run_id = Uuid::parse_str(run_id.trim()).with_context(|| format!("Invalid run id '{}'", run_id))?;
    let face = FaceScore::parse(score)?;

    let receipt = ctx
        .tracer
        .record_feedback(run_id, face, comment)
        .await
        .map_err(|e| anyhow!("Could not record feedback for {}: {}", run_id, e))?;

    println!("✅ Recorded {} (score {}) for run {}", receipt.key, receipt.score, receipt.run_id);
    println!("   feedback id: {}", receipt.feedback_id);
    Ok(())
}
