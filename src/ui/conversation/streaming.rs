use crate::events::StreamEvent;
use crate::turn::TurnOutcome;
use crate::typewriter::RevealQueue;
use crate::ui::conversation::history::StreamingEntry;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    /// Turn running; events are revealed as they arrive
    Generating,
    /// Turn finished; the answer is still being typed out
    Revealing,
    Finished { failed: bool },
}

/// Reveal state for the turn in flight, plus the status line above the composer
pub struct StreamingResponse {
    queue: RevealQueue,
    phase: StreamPhase,
    outcome: Option<TurnOutcome>,
    /// Raw model chunks received this turn
    streamed_output: String,
    frame: usize,
}

impl StreamingResponse {
    pub fn new() -> Self {
        Self {
            queue: RevealQueue::new(),
            phase: StreamPhase::Idle,
            outcome: None,
            streamed_output: String::new(),
            frame: 0,
        }
    }

    /// Start streaming a new response
    pub fn start_streaming(&mut self) {
        self.queue.clear();
        self.outcome = None;
        self.streamed_output.clear();
        self.phase = StreamPhase::Generating;
    }

    pub fn push_event(&mut self, event: StreamEvent) {
        if let StreamEvent::ToolOutput(chunk) = &event {
            self.streamed_output.push_str(chunk);
        }
        self.queue.push(event);
    }

    /// The turn is over; its answer is revealed last unless the model chunks
    /// already spelled it out
    pub fn complete(&mut self, outcome: TurnOutcome) {
        let already_shown =
            !outcome.failed && !self.streamed_output.is_empty() && self.streamed_output == outcome.answer;
        if !already_shown {
            self.queue.push(StreamEvent::FinalResponse(outcome.answer.clone()));
        }
        self.outcome = Some(outcome);
        self.phase = StreamPhase::Revealing;
    }

    /// Advance the typewriter one step. Returns the outcome once its answer
    /// has been fully revealed.
    pub fn tick(&mut self) -> Option<TurnOutcome> {
        self.frame = self.frame.wrapping_add(1);
        self.queue.tick();
        self.take_if_revealed()
    }

    /// Skip the typewriter to the end of everything received so far
    pub fn skip(&mut self) -> Option<TurnOutcome> {
        self.queue.flush();
        self.take_if_revealed()
    }

    fn take_if_revealed(&mut self) -> Option<TurnOutcome> {
        if self.phase != StreamPhase::Revealing || !self.queue.is_idle() {
            return None;
        }
        let outcome = self.outcome.take()?;
        self.phase = StreamPhase::Finished { failed: outcome.failed };
        self.queue.clear();
        Some(outcome)
    }

    /// A turn is running or its answer is still being revealed
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, StreamPhase::Generating | StreamPhase::Revealing)
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn entries(&self) -> Vec<StreamingEntry> {
        self.queue
            .entries()
            .map(|entry| StreamingEntry {
                kind: entry.kind,
                text: entry.typewriter.display().to_string(),
                in_progress: !entry.typewriter.is_complete(),
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.outcome = None;
        self.streamed_output.clear();
        self.phase = StreamPhase::Idle;
    }
}

impl Default for StreamingResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for &StreamingResponse {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = match self.phase {
            StreamPhase::Idle => return,
            StreamPhase::Generating | StreamPhase::Revealing => {
                let dots = match (self.frame / 6) % 4 {
                    0 => ".",
                    1 => "..",
                    2 => "...",
                    _ => "   ",
                };
                Line::from(vec![
                    Span::styled("⏳ Generating answer", Style::default().fg(Color::Green)),
                    Span::styled(dots, Style::default().fg(Color::Yellow)),
                    Span::styled("  (Esc to skip)", Style::default().fg(Color::DarkGray)),
                ])
            }
            StreamPhase::Finished { failed: false } => Line::from(Span::styled(
                "✅ Answer generation successful.",
                Style::default().fg(Color::Green),
            )),
            StreamPhase::Finished { failed: true } => Line::from(Span::styled(
                "❌ Answer generation failed.",
                Style::default().fg(Color::Red),
            )),
        };
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(answer: &str) -> TurnOutcome {
        TurnOutcome {
            answer: answer.into(),
            run_id: None,
            failed: false,
        }
    }

    #[test]
    fn outcome_released_only_after_reveal() {
        let mut streaming = StreamingResponse::new();
        streaming.start_streaming();
        streaming.push_event(StreamEvent::IntermediateStep("step".into()));
        streaming.complete(outcome("three word answer"));

        let mut released = None;
        for _ in 0..10 {
            if let Some(outcome) = streaming.tick() {
                released = Some(outcome);
                break;
            }
            assert!(streaming.is_busy());
        }

        assert_eq!(released.unwrap().answer, "three word answer");
        assert_eq!(streaming.phase(), StreamPhase::Finished { failed: false });
        assert!(!streaming.is_busy());
    }

    #[test]
    fn skip_releases_immediately_once_complete() {
        let mut streaming = StreamingResponse::new();
        streaming.start_streaming();
        streaming.push_event(StreamEvent::ToolOutput("partial words here".into()));
        assert!(streaming.skip().is_none());

        streaming.complete(outcome("done"));
        assert_eq!(streaming.skip().unwrap().answer, "done");
    }

    #[test]
    fn entries_mark_progress() {
        let mut streaming = StreamingResponse::new();
        streaming.start_streaming();
        streaming.push_event(StreamEvent::ToolOutput("a b".into()));
        streaming.tick();

        let entries = streaming.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "a ");
        assert!(entries[0].in_progress);
    }

    #[test]
    fn direct_answer_is_not_typed_twice() {
        let mut streaming = StreamingResponse::new();
        streaming.start_streaming();
        streaming.push_event(StreamEvent::ToolOutput("SPIM and ".into()));
        streaming.push_event(StreamEvent::ToolOutput("ecephys".into()));
        streaming.complete(outcome("SPIM and ecephys"));
        streaming.queue.flush();

        let entries = streaming.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "tool_output");
        assert_eq!(entries[0].text, "SPIM and ecephys");
        assert_eq!(streaming.skip().unwrap().answer, "SPIM and ecephys");
    }

    #[test]
    fn database_answer_follows_intermediate_output() {
        let mut streaming = StreamingResponse::new();
        streaming.start_streaming();
        streaming.push_event(StreamEvent::PipelineDescription("pipeline".into()));
        streaming.complete(outcome("Found 3 records"));
        streaming.queue.flush();

        let kinds: Vec<&str> = streaming.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["pipeline_description", "final_response"]);
    }
}
