use std::io;

use anyhow::Context;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, MouseEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::time;

use crate::app::AppContext;
use crate::ui::conversation::{ConversationAction, ConversationManager};

/// Restores the terminal however the loop exits
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn enter() -> anyhow::Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture).context("enter alt screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("create terminal")?;
        terminal.clear().context("clear terminal")?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Full-screen chat until the user quits
pub async fn run_tui(ctx: AppContext) -> anyhow::Result<()> {
    let tick_every = ctx.typewriter_delay();
    let mut manager = ConversationManager::new(ctx);
    let mut guard = TerminalGuard::enter()?;
    let mut events = EventStream::new();
    let mut ticker = time::interval(tick_every);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    tracing::info!("terminal UI started");
    loop {
        manager.process_turn_updates();
        guard
            .terminal
            .draw(|frame| manager.draw(frame))
            .context("draw frame")?;

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if manager.handle_key(key) == ConversationAction::Exit {
                            break;
                        }
                    }
                    Some(Ok(Event::Mouse(mouse))) => match mouse.kind {
                        MouseEventKind::ScrollUp => manager.scroll_up(),
                        MouseEventKind::ScrollDown => manager.scroll_down(),
                        _ => {}
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("read terminal event"),
                    None => break,
                }
            }
            _ = ticker.tick() => manager.tick(),
        }
    }

    tracing::info!("terminal UI stopped");
    Ok(())
}
