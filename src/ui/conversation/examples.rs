//! Example-query shortcut bar

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

/// Up to three suggested queries, bound to F1..F3
#[derive(Debug, Clone)]
pub struct ExampleBar {
    examples: Vec<String>,
    enabled: bool,
}

impl ExampleBar {
    pub const MAX_EXAMPLES: usize = 3;

    pub fn new(examples: &[String]) -> Self {
        Self {
            examples: examples.iter().take(Self::MAX_EXAMPLES).cloned().collect(),
            enabled: true,
        }
    }

    /// Query bound to function key `n` (1-based)
    pub fn query_for_key(&self, n: u8) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        (n as usize)
            .checked_sub(1)
            .and_then(|i| self.examples.get(i))
            .map(String::as_str)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

impl Widget for &ExampleBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.examples.is_empty() {
            return;
        }

        let constraints: Vec<Constraint> = self
            .examples
            .iter()
            .map(|_| Constraint::Ratio(1, self.examples.len() as u32))
            .collect();
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        let border_style = if self.enabled {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        for (i, (example, column)) in self.examples.iter().zip(columns.iter()).enumerate() {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(format!("F{}", i + 1));
            Paragraph::new(Line::from(Span::raw(example.as_str())))
                .block(block)
                .wrap(Wrap { trim: true })
                .render(*column, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_examples() {
        let bar = ExampleBar::new(&["first".to_string(), "second".to_string()]);
        assert_eq!(bar.query_for_key(1), Some("first"));
        assert_eq!(bar.query_for_key(2), Some("second"));
        assert_eq!(bar.query_for_key(3), None);
        assert_eq!(bar.query_for_key(0), None);
    }

    #[test]
    fn disabled_bar_yields_nothing() {
        let mut bar = ExampleBar::new(&["first".to_string()]);
        bar.set_enabled(false);
        assert_eq!(bar.query_for_key(1), None);
    }
}
