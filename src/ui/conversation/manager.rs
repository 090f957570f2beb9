use crate::app::AppContext;
use crate::error::FeedbackError;
use crate::events::Route;
use crate::feedback::FaceScore;
use crate::runs::FeedbackReceipt;
use crate::session::{Session, SessionManager};
use crate::turn::{TurnOutcome, TurnUpdate};
use crate::ui::conversation::composer::ConversationResult;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ExampleBar, FeedbackSubmission, FeedbackWidget,
    ParsedCommand, SlashCommand, StreamingResponse,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

/// Session key for the single terminal tab
const TAB_SESSION: &str = "terminal";
const GREETING: &str = "Hello! How can I help you?";

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Result of a feedback submission running in the background
struct FeedbackReport {
    run_id: Uuid,
    face: FaceScore,
    result: Result<FeedbackReceipt, FeedbackError>,
}

/// Owns the session store and every conversation widget for one terminal tab
pub struct ConversationManager {
    ctx: AppContext,
    sessions: SessionManager,
    history: ConversationHistory,
    composer: ConversationComposer,
    streaming: StreamingResponse,
    examples: ExampleBar,
    feedback: FeedbackWidget,
    turn_receiver: Option<mpsc::Receiver<TurnUpdate>>,
    feedback_tx: mpsc::Sender<FeedbackReport>,
    feedback_rx: mpsc::Receiver<FeedbackReport>,
    /// Run whose feedback is being sent
    feedback_in_flight: Option<Uuid>,
}

impl ConversationManager {
    pub fn new(ctx: AppContext) -> Self {
        let mut sessions = SessionManager::new();
        sessions.initialize(TAB_SESSION);
        let examples = ExampleBar::new(&ctx.config.ui.examples);
        let (feedback_tx, feedback_rx) = mpsc::channel(8);

        Self {
            ctx,
            sessions,
            history: ConversationHistory::new(200, GREETING),
            composer: ConversationComposer::new("Type a query, pick an example with F1-F3, or /help"),
            streaming: StreamingResponse::new(),
            examples,
            feedback: FeedbackWidget::new(),
            turn_receiver: None,
            feedback_tx,
            feedback_rx,
            feedback_in_flight: None,
        }
    }

    fn session(&mut self) -> &mut Session {
        self.sessions.initialize(TAB_SESSION)
    }

    pub fn is_busy(&self) -> bool {
        self.turn_receiver.is_some() || self.streaming.is_busy()
    }

    /// Queue a query and start its turn. Ignored while another turn is running.
    pub fn submit_query(&mut self, query: String, route: Route) {
        if self.is_busy() {
            return;
        }

        let session = self.session();
        match route {
            Route::Database => session.set_database_query(query),
            Route::Auto => session.set_query(query),
        }
        let Some(request) = session.begin_turn() else {
            return;
        };

        self.history.add_user_message(request.query.clone());
        self.streaming.start_streaming();
        self.composer.set_blocked(true);
        self.examples.set_enabled(false);
        self.feedback.withdraw();
        self.turn_receiver = Some(self.ctx.driver.start(request));
    }

    /// Drain whatever the running turn and feedback submissions have produced
    /// (called from main loop)
    pub fn process_turn_updates(&mut self) {
        self.process_feedback_reports();

        let Some(receiver) = self.turn_receiver.as_mut() else {
            return;
        };

        let mut completed = None;
        loop {
            match receiver.try_recv() {
                Ok(TurnUpdate::Event(event)) => self.streaming.push_event(event),
                Ok(TurnUpdate::Completed(outcome)) => {
                    completed = Some(outcome);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("turn task ended without an outcome");
                    completed = Some(TurnOutcome {
                        answer: "The answer could not be completed. Try structuring your query another way."
                            .to_string(),
                        run_id: None,
                        failed: true,
                    });
                    break;
                }
            }
        }

        if let Some(outcome) = completed {
            self.turn_receiver = None;
            self.session().complete_turn(&outcome);
            self.streaming.complete(outcome);
        }
        self.history.set_streaming(self.streaming.entries());
    }

    /// One typewriter step
    pub fn tick(&mut self) {
        if let Some(outcome) = self.streaming.tick() {
            self.finish_reveal(outcome);
        }
        self.history.set_streaming(self.streaming.entries());
    }

    fn finish_reveal(&mut self, outcome: TurnOutcome) {
        self.history.clear_streaming();
        self.history.add_assistant_message(outcome.answer);
        self.composer.set_blocked(false);
        self.examples.set_enabled(true);
        if let Some(run_id) = self.session().awaiting_feedback() {
            self.feedback.offer(run_id);
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        if ctrl && key.code == KeyCode::Char('c') {
            return ConversationAction::Exit;
        }

        if self.feedback.is_editing_comment() {
            match key.code {
                KeyCode::Enter => self.submit_feedback_widget(),
                KeyCode::Esc => {
                    self.feedback.withdraw_comment();
                    self.composer.set_focus(true);
                }
                KeyCode::Backspace => self.feedback.pop_comment_char(),
                KeyCode::Char(c) => self.feedback.push_comment_char(c),
                _ => {}
            }
            return ConversationAction::None;
        }

        match key.code {
            KeyCode::Esc if self.streaming.is_busy() => {
                if let Some(outcome) = self.streaming.skip() {
                    self.finish_reveal(outcome);
                }
                self.history.set_streaming(self.streaming.entries());
                return ConversationAction::None;
            }
            KeyCode::F(n) if (1..=3).contains(&n) => {
                if let Some(query) = self.examples.query_for_key(n).map(str::to_string) {
                    self.submit_query(query, Route::Auto);
                }
                return ConversationAction::None;
            }
            KeyCode::PageUp => {
                self.history.scroll_up(5);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.history.scroll_down(5);
                return ConversationAction::None;
            }
            KeyCode::Char(c) if alt && self.feedback.is_active() => {
                if let Some(n) = c.to_digit(10) {
                    self.feedback.select_index(n as usize);
                }
                return ConversationAction::None;
            }
            KeyCode::Left if alt && self.feedback.is_active() => {
                self.feedback.select_previous();
                return ConversationAction::None;
            }
            KeyCode::Right if alt && self.feedback.is_active() => {
                self.feedback.select_next();
                return ConversationAction::None;
            }
            KeyCode::Char('r') if ctrl => {
                self.submit_feedback_widget();
                return ConversationAction::None;
            }
            KeyCode::Char('e') if ctrl => {
                self.feedback.start_comment();
                self.composer.set_focus(!self.feedback.is_editing_comment());
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(input) => {
                // queries wait for the current answer
                if !self.is_busy() {
                    self.submit_query(input, Route::Auto);
                }
                ConversationAction::None
            }
            ConversationResult::Command(command) => self.run_command(command),
            ConversationResult::None => ConversationAction::None,
        }
    }

    pub fn scroll_up(&mut self) {
        self.history.scroll_up(3);
    }

    pub fn scroll_down(&mut self) {
        self.history.scroll_down(3);
    }

    /// Run a slash command, unless it has to wait for the current answer
    fn run_command(&mut self, command: ParsedCommand) -> ConversationAction {
        if self.is_busy() && !command.command.available_during_streaming() {
            self.history.add_system_message(format!(
                "/{} is unavailable while an answer is generating",
                command.command.command()
            ));
            return ConversationAction::None;
        }
        self.handle_slash_command(command)
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::Quit => return ConversationAction::Exit,
            SlashCommand::Help => self.history.add_system_message(get_help_text()),
            SlashCommand::New => self.start_new_conversation(),
            SlashCommand::Db => match command.argument() {
                Some(query) => self.submit_query(query.to_string(), Route::Database),
                None => self.history.add_system_message("Usage: /db <query>".to_string()),
            },
            SlashCommand::Rate => match command.rating() {
                Ok((face, comment)) => match self.session().awaiting_feedback() {
                    Some(run_id) => self.submit_feedback(run_id, face, comment),
                    None => self
                        .history
                        .add_system_message("There is no new answer to rate.".to_string()),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "rejected feedback");
                    self.feedback.set_warning("Invalid feedback score.");
                    self.history.add_system_message(format!("⚠️  {}", e));
                }
            },
        }
        ConversationAction::None
    }

    fn start_new_conversation(&mut self) {
        let thread_id = self.sessions.reset(TAB_SESSION).thread_id;
        tracing::info!(%thread_id, "new conversation");
        self.history.clear();
        self.streaming.reset();
        self.feedback.withdraw();
        self.history
            .add_system_message("Started a new conversation.".to_string());
    }

    fn submit_feedback_widget(&mut self) {
        if let Some(FeedbackSubmission { run_id, face, comment }) = self.feedback.submit() {
            self.composer.set_focus(true);
            self.submit_feedback(run_id, face, comment);
        }
    }

    /// Send a score in the background; the outcome arrives through
    /// `process_feedback_reports`
    fn submit_feedback(&mut self, run_id: Uuid, face: FaceScore, comment: Option<String>) {
        if self.session().awaiting_feedback() != Some(run_id) {
            self.history
                .add_system_message("There is no new answer to rate.".to_string());
            return;
        }
        if self.feedback_in_flight == Some(run_id) {
            self.history
                .add_system_message("Feedback for this answer is already being sent.".to_string());
            return;
        }

        self.feedback_in_flight = Some(run_id);
        let tracer = self.ctx.tracer.clone();
        let reports = self.feedback_tx.clone();
        tokio::spawn(async move {
            let result = tracer.record_feedback(run_id, face, comment).await;
            let _ = reports.send(FeedbackReport { run_id, face, result }).await;
        });
    }

    fn process_feedback_reports(&mut self) {
        while let Ok(report) = self.feedback_rx.try_recv() {
            if self.feedback_in_flight == Some(report.run_id) {
                self.feedback_in_flight = None;
            }
            // a reset conversation no longer has this run
            let current = self.session().last_run_id == Some(report.run_id);
            match report.result {
                Ok(receipt) if current => {
                    self.session().record_feedback(receipt);
                    self.feedback.offer(report.run_id);
                    self.feedback.mark_submitted(report.run_id, report.face);
                }
                Ok(_) => tracing::debug!(run_id = %report.run_id, "feedback recorded for an earlier conversation"),
                Err(e) => {
                    tracing::warn!(run_id = %report.run_id, error = %e, "feedback not recorded");
                    self.feedback.set_warning(e.to_string());
                }
            }
        }
    }

    /// Render the conversation UI components
    pub fn draw(&self, frame: &mut Frame) {
        let mut constraints = Vec::new();
        if !self.examples.is_empty() {
            constraints.push(Constraint::Length(4));
        }
        constraints.push(Constraint::Min(5));
        if self.feedback.is_visible() {
            constraints.push(Constraint::Length(4));
        }
        constraints.push(Constraint::Length(1));
        constraints.push(Constraint::Length(3));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(frame.size());

        let mut index = 0;
        if !self.examples.is_empty() {
            frame.render_widget(&self.examples, chunks[index]);
            index += 1;
        }
        frame.render_widget(&self.history, chunks[index]);
        index += 1;
        if self.feedback.is_visible() {
            frame.render_widget(&self.feedback, chunks[index]);
            index += 1;
        }
        frame.render_widget(&self.streaming, chunks[index]);
        frame.render_widget(&self.composer, chunks[index + 1]);
    }
}
