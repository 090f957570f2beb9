//! Five-face rating control for the latest answer

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::feedback::FaceScore;

/// Score the user chose for a run
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSubmission {
    pub run_id: Uuid,
    pub face: FaceScore,
    pub comment: Option<String>,
}

/// Rating control bound to a single run. Once submitted it is not offered again.
#[derive(Debug, Clone, Default)]
pub struct FeedbackWidget {
    run_id: Option<Uuid>,
    selected: usize,
    comment: String,
    editing_comment: bool,
    submitted: Option<(Uuid, FaceScore)>,
    warning: Option<String>,
}

impl FeedbackWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer the control for `run_id`, unless that run was already rated
    pub fn offer(&mut self, run_id: Uuid) {
        if self.run_id == Some(run_id) {
            return;
        }
        self.run_id = Some(run_id);
        self.selected = 0;
        self.comment.clear();
        self.editing_comment = false;
        self.warning = None;
    }

    pub fn withdraw(&mut self) {
        self.run_id = None;
        self.editing_comment = false;
        self.warning = None;
    }

    /// Run the control is currently asking about
    pub fn pending_run(&self) -> Option<Uuid> {
        let run_id = self.run_id?;
        match self.submitted {
            Some((rated, _)) if rated == run_id => None,
            _ => Some(run_id),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pending_run().is_some()
    }

    /// Shown while asking, and afterwards to thank the user
    pub fn is_visible(&self) -> bool {
        self.run_id.is_some()
    }

    /// Leave comment editing, keeping the text typed so far
    pub fn withdraw_comment(&mut self) {
        self.editing_comment = false;
    }

    pub fn is_editing_comment(&self) -> bool {
        self.editing_comment
    }

    pub fn select_next(&mut self) {
        self.selected = (self.selected + 1) % FaceScore::iter().count();
    }

    pub fn select_previous(&mut self) {
        let count = FaceScore::iter().count();
        self.selected = (self.selected + count - 1) % count;
    }

    /// Jump to face `n` (1-based)
    pub fn select_index(&mut self, n: usize) {
        if FaceScore::from_index(n).is_some() {
            self.selected = n - 1;
        }
    }

    pub fn selected_face(&self) -> Option<FaceScore> {
        FaceScore::from_index(self.selected + 1)
    }

    pub fn start_comment(&mut self) {
        if self.is_active() {
            self.editing_comment = true;
        }
    }

    pub fn push_comment_char(&mut self, c: char) {
        if self.editing_comment {
            self.comment.push(c);
        }
    }

    pub fn pop_comment_char(&mut self) {
        if self.editing_comment {
            self.comment.pop();
        }
    }

    /// Build the submission for the selected face
    pub fn submit(&mut self) -> Option<FeedbackSubmission> {
        let run_id = self.pending_run()?;
        let face = self.selected_face()?;
        let comment = Some(self.comment.trim().to_string()).filter(|c| !c.is_empty());
        self.editing_comment = false;
        Some(FeedbackSubmission { run_id, face, comment })
    }

    /// The backend accepted the score
    pub fn mark_submitted(&mut self, run_id: Uuid, face: FaceScore) {
        self.submitted = Some((run_id, face));
        self.warning = None;
    }

    pub fn set_warning(&mut self, warning: impl Into<String>) {
        self.warning = Some(warning.into());
    }

    pub fn submitted_face(&self) -> Option<FaceScore> {
        match (self.run_id, self.submitted) {
            (Some(run_id), Some((rated, face))) if rated == run_id => Some(face),
            _ => None,
        }
    }
}

impl Widget for &FeedbackWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.run_id.is_none() {
            return;
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Rate this answer");
        let inner = block.inner(area);
        block.render(area, buf);

        if let Some(face) = self.submitted_face() {
            let line = Line::from(Span::styled(
                format!("Thanks for your feedback {}", face.symbol()),
                Style::default().fg(Color::Green),
            ));
            buf.set_line(inner.x, inner.y, &line, inner.width);
            return;
        }

        let mut spans = Vec::new();
        for (i, face) in FaceScore::iter().enumerate() {
            let style = if i == self.selected {
                Style::default().bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            spans.push(Span::styled(format!(" {} ", face.symbol()), style));
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            "Alt+1-5 pick  Ctrl+R send  Ctrl+E comment",
            Style::default().fg(Color::DarkGray),
        ));
        buf.set_line(inner.x, inner.y, &Line::from(spans), inner.width);

        if inner.height > 1 {
            let second = if let Some(warning) = &self.warning {
                Line::from(Span::styled(format!("⚠️  {}", warning), Style::default().fg(Color::Yellow)))
            } else if self.editing_comment {
                Line::from(vec![
                    Span::styled("[Optional] Please provide an explanation: ", Style::default().fg(Color::Gray)),
                    Span::raw(self.comment.as_str()),
                    Span::styled("▌", Style::default().fg(Color::Yellow)),
                ])
            } else if !self.comment.is_empty() {
                Line::from(Span::styled(self.comment.as_str(), Style::default().fg(Color::Gray)))
            } else {
                Line::from("")
            };
            buf.set_line(inner.x, inner.y + 1, &second, inner.width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_carries_run_face_and_comment() {
        let run_id = Uuid::new_v4();
        let mut widget = FeedbackWidget::new();
        widget.offer(run_id);
        widget.select_index(4);
        widget.start_comment();
        for c in "wrong dates".chars() {
            widget.push_comment_char(c);
        }

        let submission = widget.submit().unwrap();

        assert_eq!(
            submission,
            FeedbackSubmission {
                run_id,
                face: FaceScore::Unhappy,
                comment: Some("wrong dates".into()),
            }
        );
    }

    #[test]
    fn rated_run_is_not_offered_again() {
        let run_id = Uuid::new_v4();
        let mut widget = FeedbackWidget::new();
        widget.offer(run_id);
        widget.mark_submitted(run_id, FaceScore::Delighted);

        assert!(!widget.is_active());
        assert!(widget.submit().is_none());

        widget.offer(run_id);
        assert!(!widget.is_active());

        let next = Uuid::new_v4();
        widget.offer(next);
        assert_eq!(widget.pending_run(), Some(next));
    }

    #[test]
    fn selection_wraps() {
        let mut widget = FeedbackWidget::new();
        widget.select_previous();
        assert_eq!(widget.selected_face(), Some(FaceScore::Upset));
        widget.select_next();
        assert_eq!(widget.selected_face(), Some(FaceScore::Delighted));
    }
}
