//! Conversation history display component

use crate::events::ChatRole;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use std::collections::VecDeque;

/// A single message in the conversation history
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output of the turn in flight, shown below the settled messages
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingEntry {
    pub kind: &'static str,
    pub text: String,
    pub in_progress: bool,
}

/// Conversation history display component
#[derive(Clone)]
pub struct ConversationHistory {
    messages: VecDeque<ConversationMessage>,
    max_messages: usize,
    greeting: String,
    streaming: Vec<StreamingEntry>,
    /// Lines scrolled up from the bottom
    scroll_offset: usize,
}

impl ConversationHistory {
    pub fn new(max_messages: usize, greeting: impl Into<String>) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages,
            greeting: greeting.into(),
            streaming: Vec::new(),
            scroll_offset: 0,
        }
    }

    /// Add a new message to the history
    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);

        if self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }

        self.scroll_to_bottom();
    }

    fn push_role(&mut self, role: ChatRole, content: String) {
        self.add_message(ConversationMessage {
            role,
            content,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn add_user_message(&mut self, content: String) {
        self.push_role(ChatRole::User, content);
    }

    pub fn add_assistant_message(&mut self, content: String) {
        self.push_role(ChatRole::Assistant, content);
    }

    pub fn add_system_message(&mut self, content: String) {
        self.push_role(ChatRole::System, content);
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming.clear();
        self.scroll_offset = 0;
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn set_streaming(&mut self, entries: Vec<StreamingEntry>) {
        self.streaming = entries;
    }

    pub fn clear_streaming(&mut self) {
        self.streaming.clear();
    }

    #[cfg(test)]
    pub(crate) fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.back()
    }
}

impl Widget for &ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("💬 Conversation");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let width = inner_area.width.saturating_sub(2) as usize;
        let mut all_lines: Vec<Line> = Vec::new();

        // the greeting is always the first assistant line
        all_lines.extend(self.render_block("🤖", None, &self.greeting, role_style(ChatRole::Assistant), width, false));
        all_lines.push(Line::from(""));

        for message in self.messages.iter() {
            let timestamp = message.timestamp.format("%H:%M:%S").to_string();
            all_lines.extend(self.render_block(
                role_icon(message.role),
                Some(timestamp),
                &message.content,
                role_style(message.role),
                width,
                false,
            ));
            all_lines.push(Line::from(""));
        }

        for entry in &self.streaming {
            let (icon, style) = entry_look(entry.kind);
            all_lines.extend(self.render_block(icon, None, &entry.text, style, width, entry.in_progress));
        }

        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        let end = total - self.scroll_offset.min(max_offset);
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }

        if self.scroll_offset > 0 && inner_area.width > 0 {
            let marker = Line::from(Span::styled("↓ more", Style::default().fg(Color::DarkGray)));
            let x = inner_area.x + inner_area.width.saturating_sub(6);
            buf.set_line(x, inner_area.y + inner_area.height.saturating_sub(1), &marker, 6);
        }
    }
}

impl ConversationHistory {
    fn render_block<'a>(
        &self,
        icon: &'a str,
        timestamp: Option<String>,
        text: &str,
        style: Style,
        width: usize,
        cursor: bool,
    ) -> Vec<Line<'a>> {
        let mut lines = Vec::new();

        let header = match timestamp {
            Some(ts) => format!("{} {} {}", icon, ts, "─".repeat(20)),
            None => format!("{} {}", icon, "─".repeat(29)),
        };
        lines.push(Line::from(Span::styled(header, Style::default().fg(Color::DarkGray))));

        let content_lines = wrap_text(text, width);
        let last = content_lines.len().saturating_sub(1);
        for (i, content_line) in content_lines.into_iter().enumerate() {
            let mut spans = vec![Span::raw("  "), Span::styled(content_line, style)];
            if cursor && i == last {
                spans.push(Span::styled("▋", Style::default().fg(Color::Yellow)));
            }
            lines.push(Line::from(spans));
        }

        lines
    }
}

fn role_icon(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "👤",
        ChatRole::Assistant => "🤖",
        ChatRole::System => "⚙️",
    }
}

fn role_style(role: ChatRole) -> Style {
    match role {
        ChatRole::User => Style::default().fg(Color::Blue),
        ChatRole::Assistant => Style::default().fg(Color::Green),
        ChatRole::System => Style::default().fg(Color::Yellow),
    }
}

fn entry_look(kind: &str) -> (&'static str, Style) {
    match kind {
        "intermediate_step" => ("🔎", Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)),
        "pipeline_description" => ("🧮", Style::default().fg(Color::Cyan)),
        "tool_response" => ("📄", Style::default().fg(Color::Magenta)),
        _ => ("🤖", role_style(ChatRole::Assistant)),
    }
}

/// Wrap each line of `text` to `width` columns, keeping explicit line breaks.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in raw_line.split_whitespace() {
            let word_width = word.chars().count();
            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }
            current_line.push_str(word);
            current_width += word_width;
        }

        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}
