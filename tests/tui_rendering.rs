// Rendering tests for the conversation widgets using ratatui's TestBackend.

use ratatui::backend::TestBackend;
use ratatui::Terminal;
use uuid::Uuid;

use metachat::events::StreamEvent;
use metachat::feedback::FaceScore;
use metachat::turn::TurnOutcome;
use metachat::ui::conversation::composer::ConversationComposer;
use metachat::ui::conversation::history::{ConversationHistory, StreamingEntry};
use metachat::ui::conversation::{ExampleBar, FeedbackWidget, StreamingResponse};

fn all_text(terminal: &Terminal<TestBackend>) -> String {
    let buf = terminal.backend().buffer();
    (0..buf.area.height)
        .map(|y| {
            (0..buf.area.width)
                .map(|x| buf.get(x, y).symbol().to_string())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn terminal(width: u16, height: u16) -> Terminal<TestBackend> {
    Terminal::new(TestBackend::new(width, height)).unwrap()
}

#[test]
fn history_shows_greeting_and_messages_by_role() {
    let mut history = ConversationHistory::new(50, "Hello! How can I help you?");
    history.add_user_message("What are the modalities that exist in the database?".into());
    history.add_assistant_message("SPIM and ecephys are the most common.".into());

    let mut terminal = terminal(100, 20);
    terminal
        .draw(|frame| frame.render_widget(&history, frame.size()))
        .unwrap();
    let text = all_text(&terminal);

    assert!(text.contains("Conversation"), "got:\n{}", text);
    assert!(text.contains("Hello! How can I help you?"), "got:\n{}", text);
    assert!(text.contains("What are the modalities"), "got:\n{}", text);
    assert!(text.contains("SPIM and ecephys"), "got:\n{}", text);
    let user_at = text.find("What are the modalities").unwrap();
    let answer_at = text.find("SPIM and ecephys").unwrap();
    assert!(user_at < answer_at);
}

#[test]
fn history_shows_streaming_entries_below_messages() {
    let mut history = ConversationHistory::new(50, "Hello!");
    history.add_user_message("count the records".into());
    history.set_streaming(vec![StreamingEntry {
        kind: "pipeline_description",
        text: "The MongoDB pipeline being used".into(),
        in_progress: true,
    }]);

    let mut terminal = terminal(100, 20);
    terminal
        .draw(|frame| frame.render_widget(&history, frame.size()))
        .unwrap();
    let text = all_text(&terminal);

    assert!(text.contains("The MongoDB pipeline being used"), "got:\n{}", text);
}

#[test]
fn blocked_composer_says_it_is_generating() {
    let mut composer = ConversationComposer::new("Type a query");
    composer.set_blocked(true);

    let mut terminal = terminal(60, 3);
    terminal
        .draw(|frame| frame.render_widget(&composer, frame.size()))
        .unwrap();
    let text = all_text(&terminal);

    assert!(text.contains("Generating answer"), "got:\n{}", text);
    assert!(text.contains("Type a query"), "got:\n{}", text);
}

#[test]
fn example_bar_labels_function_keys() {
    let examples = vec![
        "Which modalities exist?".to_string(),
        "Find injections".to_string(),
        "List procedures".to_string(),
    ];
    let bar = ExampleBar::new(&examples);

    let mut terminal = terminal(120, 4);
    terminal
        .draw(|frame| frame.render_widget(&bar, frame.size()))
        .unwrap();
    let text = all_text(&terminal);

    for label in ["F1", "F2", "F3", "Find injections", "List procedures"] {
        assert!(text.contains(label), "missing {:?} in:\n{}", label, text);
    }
}

#[test]
fn feedback_widget_thanks_after_submission() {
    let run_id = Uuid::new_v4();
    let mut widget = FeedbackWidget::new();
    widget.offer(run_id);

    let mut terminal = terminal(80, 4);
    terminal
        .draw(|frame| frame.render_widget(&widget, frame.size()))
        .unwrap();
    let text = all_text(&terminal);
    assert!(text.contains("Rate this answer"), "got:\n{}", text);
    assert!(text.contains("Ctrl+R send"), "got:\n{}", text);

    widget.mark_submitted(run_id, FaceScore::Happy);
    terminal
        .draw(|frame| frame.render_widget(&widget, frame.size()))
        .unwrap();
    let text = all_text(&terminal);
    assert!(text.contains("Thanks for your feedback"), "got:\n{}", text);
}

#[test]
fn status_line_follows_turn_phase() {
    let mut streaming = StreamingResponse::new();
    streaming.start_streaming();

    let mut terminal = terminal(60, 1);
    terminal
        .draw(|frame| frame.render_widget(&streaming, frame.size()))
        .unwrap();
    assert!(all_text(&terminal).contains("Generating answer"));

    streaming.push_event(StreamEvent::ToolOutput("hi".into()));
    streaming.complete(TurnOutcome {
        answer: "hi".into(),
        run_id: None,
        failed: false,
    });
    assert!(streaming.skip().is_some());

    terminal
        .draw(|frame| frame.render_widget(&streaming, frame.size()))
        .unwrap();
    assert!(all_text(&terminal).contains("Answer generation successful."));
}
