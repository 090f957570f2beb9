use std::collections::VecDeque;

use crate::events::StreamEvent;

/// How a piece of streamed output should be shown
#[derive(Debug, Clone, PartialEq)]
pub enum Reveal {
    /// Shown whole, e.g. structured JSON
    Atomic(String),
    /// Revealed one word per tick
    Progressive(String),
}

impl Reveal {
    /// Tool output is tried as JSON first. Structured values render whole and
    /// pretty-printed; a JSON string is unwrapped and revealed like any text.
    pub fn for_event(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::ToolOutput(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(serde_json::Value::String(text)) => Reveal::Progressive(text),
                Ok(value) if value.is_object() || value.is_array() => {
                    Reveal::Atomic(serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.clone()))
                }
                _ => Reveal::Progressive(raw.clone()),
            },
            other => Reveal::Progressive(other.content().to_string()),
        }
    }
}

/// Word-by-word reveal of a single text.
///
/// While in progress the display is the words so far, each followed by a space.
/// Once complete the display is exactly the original text.
#[derive(Debug, Clone)]
pub struct Typewriter {
    text: String,
    words: Vec<String>,
    shown: usize,
    partial: String,
}

impl Typewriter {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let words = text.split_whitespace().map(str::to_string).collect();
        Self {
            text,
            words,
            shown: 0,
            partial: String::new(),
        }
    }

    pub fn from_reveal(reveal: Reveal) -> Self {
        match reveal {
            Reveal::Atomic(text) => {
                let mut typewriter = Self::new(text);
                typewriter.finish();
                typewriter
            }
            Reveal::Progressive(text) => Self::new(text),
        }
    }

    /// Reveal the next word. Returns the display text, or `None` if already done.
    pub fn advance(&mut self) -> Option<&str> {
        if self.is_complete() {
            return None;
        }
        self.partial.push_str(&self.words[self.shown]);
        self.partial.push(' ');
        self.shown += 1;
        Some(self.display())
    }

    /// Append streamed text; words already shown stay shown
    pub fn extend(&mut self, more: &str) {
        self.text.push_str(more);
        self.words = self.text.split_whitespace().map(str::to_string).collect();
        self.shown = self.shown.min(self.words.len());
        self.partial = self.words[..self.shown].iter().map(|w| format!("{} ", w)).collect();
    }

    /// Skip to the end
    pub fn finish(&mut self) {
        self.shown = self.words.len();
    }

    pub fn is_complete(&self) -> bool {
        self.shown >= self.words.len()
    }

    pub fn display(&self) -> &str {
        if self.is_complete() {
            &self.text
        } else {
            &self.partial
        }
    }

    pub fn full_text(&self) -> &str {
        &self.text
    }
}

/// A finished or in-progress reveal tied to the event it came from
#[derive(Debug, Clone)]
pub struct RevealedEvent {
    pub kind: &'static str,
    pub typewriter: Typewriter,
    /// Plain model text that later chunks may extend
    progressive_output: bool,
}

/// Event waiting its turn, already decided how to reveal
#[derive(Debug, Clone)]
struct PendingReveal {
    kind: &'static str,
    reveal: Reveal,
    progressive_output: bool,
}

/// Events waiting to be revealed, one at a time, in arrival order.
#[derive(Debug, Default)]
pub struct RevealQueue {
    pending: VecDeque<PendingReveal>,
    current: Option<RevealedEvent>,
    shown: Vec<RevealedEvent>,
}

impl RevealQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        let reveal = Reveal::for_event(&event);
        let progressive_output =
            matches!(event, StreamEvent::ToolOutput(_)) && matches!(reveal, Reveal::Progressive(_));
        if let (true, Reveal::Progressive(text)) = (progressive_output, &reveal) {
            if self.extend_output(text) {
                return;
            }
        }
        self.pending.push_back(PendingReveal {
            kind: event.kind(),
            reveal,
            progressive_output,
        });
        if self.current.is_none() {
            self.start_next();
        }
    }

    /// One typewriter step
    pub fn tick(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.typewriter.advance();
        if current.typewriter.is_complete() {
            self.retire_current();
        }
    }

    /// Skip every pending reveal to its final text
    pub fn flush(&mut self) {
        while self.current.is_some() {
            if let Some(current) = self.current.as_mut() {
                current.typewriter.finish();
            }
            self.retire_current();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Completed reveals followed by the one in progress
    pub fn entries(&self) -> impl Iterator<Item = &RevealedEvent> {
        self.shown.iter().chain(self.current.iter())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
        self.shown.clear();
    }

    /// Model chunks continue the text before them instead of opening a new
    /// entry. `text` is the chunk as it will be displayed.
    fn extend_output(&mut self, text: &str) -> bool {
        if let Some(back) = self.pending.back_mut() {
            return match (&mut back.reveal, back.progressive_output) {
                (Reveal::Progressive(previous), true) => {
                    previous.push_str(text);
                    true
                }
                _ => false,
            };
        }

        if let Some(current) = self.current.as_mut() {
            if !current.progressive_output {
                return false;
            }
            current.typewriter.extend(text);
            return true;
        }

        match self.shown.last() {
            Some(last) if last.progressive_output => {}
            _ => return false,
        }
        if let Some(mut entry) = self.shown.pop() {
            entry.typewriter.extend(text);
            if entry.typewriter.is_complete() {
                self.shown.push(entry);
            } else {
                self.current = Some(entry);
            }
        }
        true
    }

    fn retire_current(&mut self) {
        if let Some(done) = self.current.take() {
            self.shown.push(done);
        }
        self.start_next();
    }

    fn start_next(&mut self) {
        while let Some(next) = self.pending.pop_front() {
            let entry = RevealedEvent {
                kind: next.kind,
                typewriter: Typewriter::from_reveal(next.reveal),
                progressive_output: next.progressive_output,
            };
            if entry.typewriter.is_complete() {
                self.shown.push(entry);
                continue;
            }
            self.current = Some(entry);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveals_word_by_word_then_exact_text() {
        let text = "The  modalities are\nSPIM and ecephys.";
        let mut tw = Typewriter::new(text);

        assert_eq!(tw.advance(), Some("The "));
        assert_eq!(tw.advance(), Some("The modalities "));
        while tw.advance().is_some() {}

        assert!(tw.is_complete());
        assert_eq!(tw.display(), text);
        assert_eq!(tw.advance(), None);
    }

    #[test]
    fn interruption_still_ends_on_full_text() {
        let text = "one two three four";
        let mut tw = Typewriter::new(text);
        tw.advance();
        tw.finish();
        assert_eq!(tw.display(), text);
    }

    #[test]
    fn whitespace_only_text_is_complete_immediately() {
        let tw = Typewriter::new("   ");
        assert!(tw.is_complete());
        assert_eq!(tw.display(), "   ");
    }

    #[test]
    fn tool_output_json_decides_reveal() {
        let structured = StreamEvent::ToolOutput(r#"{"modality": ["SPIM"]}"#.into());
        match Reveal::for_event(&structured) {
            Reveal::Atomic(text) => assert!(text.contains("\"modality\": [")),
            other => panic!("expected atomic reveal, got {:?}", other),
        }

        let quoted = StreamEvent::ToolOutput(r#""hello there""#.into());
        assert_eq!(Reveal::for_event(&quoted), Reveal::Progressive("hello there".into()));

        let plain = StreamEvent::ToolOutput("The answer".into());
        assert_eq!(Reveal::for_event(&plain), Reveal::Progressive("The answer".into()));

        let number = StreamEvent::ToolOutput("42".into());
        assert_eq!(Reveal::for_event(&number), Reveal::Progressive("42".into()));
    }

    #[test]
    fn queue_reveals_events_in_order() {
        let mut queue = RevealQueue::new();
        queue.push(StreamEvent::IntermediateStep("looking up".into()));
        queue.push(StreamEvent::ToolOutput("[1, 2]".into()));
        queue.push(StreamEvent::ToolResponse("rows".into()));

        for _ in 0..10 {
            queue.tick();
        }

        assert!(queue.is_idle());
        let shown: Vec<(&str, &str)> = queue
            .entries()
            .map(|e| (e.kind, e.typewriter.display()))
            .collect();
        assert_eq!(shown[0], ("intermediate_step", "looking up"));
        assert_eq!(shown[1].0, "tool_output");
        assert_eq!(shown[2], ("tool_response", "rows"));
    }

    #[test]
    fn flush_completes_everything() {
        let mut queue = RevealQueue::new();
        queue.push(StreamEvent::IntermediateStep("a b c".into()));
        queue.push(StreamEvent::ToolResponse("d e f".into()));
        queue.tick();

        queue.flush();

        assert!(queue.is_idle());
        let texts: Vec<&str> = queue.entries().map(|e| e.typewriter.display()).collect();
        assert_eq!(texts, vec!["a b c", "d e f"]);
    }

    #[test]
    fn model_chunks_merge_into_one_entry() {
        let mut queue = RevealQueue::new();
        queue.push(StreamEvent::ToolOutput("The moda".into()));
        queue.tick();
        queue.push(StreamEvent::ToolOutput("lities are ".into()));
        queue.push(StreamEvent::ToolOutput("SPIM.".into()));
        queue.flush();

        let texts: Vec<&str> = queue.entries().map(|e| e.typewriter.display()).collect();
        assert_eq!(texts, vec!["The modalities are SPIM."]);
    }

    #[test]
    fn quoted_chunks_unwrap_the_same_whether_queued_or_not() {
        let mut busy = RevealQueue::new();
        busy.push(StreamEvent::IntermediateStep("a b c d".into()));
        busy.push(StreamEvent::ToolOutput(r#""hello""#.into()));
        busy.push(StreamEvent::ToolOutput(r#""world""#.into()));
        busy.flush();

        let mut idle = RevealQueue::new();
        idle.push(StreamEvent::ToolOutput(r#""hello""#.into()));
        idle.push(StreamEvent::ToolOutput(r#""world""#.into()));
        idle.flush();

        let busy_texts: Vec<&str> = busy.entries().map(|e| e.typewriter.display()).collect();
        let idle_texts: Vec<&str> = idle.entries().map(|e| e.typewriter.display()).collect();
        assert_eq!(busy_texts, vec!["a b c d", "helloworld"]);
        assert_eq!(idle_texts, vec!["helloworld"]);
    }
}
