use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use metachat::app::AppContext;
use metachat::commands;
use metachat::config::Config;
use metachat::logging::{init_logging, LogTarget};

#[derive(Parser)]
#[command(name = "metachat")]
#[command(version)]
#[command(about = "Chat with a metadata retrieval agent", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.metachat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Line-oriented chat instead of the full-screen UI
        #[arg(long)]
        plain: bool,
    },
    /// Run one prompt through the model inside a traced run
    Ask {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Rate a traced run
    Feedback {
        run_id: String,
        /// 1 (best) to 5 (worst), or one of 😀 🙂 😐 🙁 😞
        score: String,
        #[arg(long)]
        comment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let full_screen = match &cli.command {
        None => true,
        Some(Commands::Chat { plain }) => !plain,
        Some(_) => false,
    } && std::io::stdout().is_terminal();

    let target = if full_screen {
        LogTarget::File(config.log_dir().join("metachat.log"))
    } else {
        LogTarget::Stderr
    };
    init_logging(target, &config.ui.log_level)?;

    let ctx = AppContext::from_config(config)?;

    match cli.command {
        None | Some(Commands::Chat { .. }) if full_screen => metachat::ui::run_tui(ctx).await,
        None | Some(Commands::Chat { .. }) => commands::run_plain_chat(&ctx).await,
        Some(Commands::Ask { text }) => commands::ask(&ctx, &text.join(" ")).await,
        Some(Commands::Feedback { run_id, score, comment }) => {
            commands::submit_feedback(&ctx, &run_id, &score, comment).await
        }
    }
}
