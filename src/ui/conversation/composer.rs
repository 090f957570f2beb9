use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer.
///
/// `cursor_position` is a byte offset that always sits on a char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor_position: usize,
}

/// Conversation composer for user input
#[derive(Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    blocked: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            blocked: false,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if self.show_command_palette {
                    self.apply_selected_command();
                } else if !self.state.content.trim().is_empty() {
                    let content = std::mem::take(&mut self.state.content);
                    self.state.cursor_position = 0;
                    self.close_command_palette();
                    return match parse_slash_command(&content) {
                        Some(command) => ConversationResult::Command(command),
                        None => ConversationResult::Submitted(content),
                    };
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => self.apply_selected_command(),
            KeyCode::Char(c) => {
                self.insert_char(c);
                if self.show_command_palette {
                    if self.state.content.starts_with('/') && !c.is_whitespace() {
                        self.refresh_command_palette();
                    } else {
                        self.close_command_palette();
                    }
                } else if self.state.content == "/" {
                    self.open_command_palette();
                }
            }
            KeyCode::Backspace => {
                if self.backspace() {
                    self.sync_palette();
                }
            }
            KeyCode::Delete => {
                if self.delete() {
                    self.sync_palette();
                }
            }
            KeyCode::Left => {
                if let Some((index, _)) = self.state.content[..self.state.cursor_position].char_indices().last() {
                    self.state.cursor_position = index;
                }
            }
            KeyCode::Right => {
                if let Some(c) = self.state.content[self.state.cursor_position..].chars().next() {
                    self.state.cursor_position += c.len_utf8();
                }
            }
            KeyCode::Home => self.state.cursor_position = 0,
            KeyCode::End => self.state.cursor_position = self.state.content.len(),
            _ => {}
        }

        ConversationResult::None
    }

    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        let Some((index, _)) = self.state.content[..self.state.cursor_position].char_indices().last() else {
            return false;
        };
        self.state.content.remove(index);
        self.state.cursor_position = index;
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position < self.state.content.len() {
            self.state.content.remove(self.state.cursor_position);
            true
        } else {
            false
        }
    }

    fn sync_palette(&mut self) {
        if !self.show_command_palette {
            return;
        }
        if self.state.content.starts_with('/') {
            self.refresh_command_palette();
        } else {
            self.close_command_palette();
        }
    }

    fn open_command_palette(&mut self) {
        self.show_command_palette = true;
        self.refresh_command_palette();
        self.selected_command = Some(0);
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = if self.filtered_commands.is_empty() {
            None
        } else {
            let index = self.selected_command.unwrap_or(0);
            Some(index.min(self.filtered_commands.len() - 1))
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) {
        let Some(entry) = self.selected_command.and_then(|i| self.filtered_commands.get(i)).copied() else {
            return;
        };
        self.state.content = format!("/{} ", entry.keyword);
        self.state.cursor_position = self.state.content.len();
        self.close_command_palette();
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Block input while an answer is being generated
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
        self.close_command_palette();
    }

    fn title(&self) -> &'static str {
        if self.blocked {
            "⏳ Generating answer..."
        } else {
            "✏️  Message the assistant"
        }
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let active = self.has_focus && !self.blocked;
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(if active {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content = self.state.content.clone();
            if active {
                content.insert(self.state.cursor_position.min(content.len()), '▌');
            }

            for (i, line_text) in content.split('\n').enumerate() {
                if i < inner_area.height as usize {
                    let line = Line::from(vec![Span::raw(line_text)]);
                    buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
                }
            }
        }

        if self.show_command_palette {
            let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: inner_area.x,
                y: area.y.saturating_sub(palette_height),
                width: inner_area.width,
                height: palette_height,
            };

            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled("  ", Style::default()),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}
