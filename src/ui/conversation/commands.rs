use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::FeedbackError;
use crate::feedback::FaceScore;

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Rate the last answer
    Rate,
    /// Send a query straight to the database agent
    Db,
    /// Start a new conversation
    New,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// `/rate <1-5|face> [comment]`
    pub fn rating(&self) -> Result<(FaceScore, Option<String>), FeedbackError> {
        let argument = self.argument().unwrap_or_default().trim();
        let (score, comment) = match argument.split_once(char::is_whitespace) {
            Some((score, comment)) => (score, Some(comment.trim().to_string())),
            None => (argument, None),
        };
        let face = FaceScore::parse(score)?;
        Ok((face, comment.filter(|c| !c.is_empty())))
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Rate => "rate the last answer: /rate <1-5|face> [comment]",
            SlashCommand::Db => "ask the metadata database directly: /db <query>",
            SlashCommand::New => "start a new conversation",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while an answer is streaming.
    pub fn available_during_streaming(self) -> bool {
        matches!(self, SlashCommand::Help | SlashCommand::Quit)
    }
}

/// Return all built-in commands in a Vec paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter().map(|c| (c.command(), c)).collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    let body = input.strip_prefix('/')?;

    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(head).ok().or_else(|| match head.to_lowercase().as_str() {
        "q" | "bye" | "exit" => Some(SlashCommand::Quit),
        "r" | "feedback" => Some(SlashCommand::Rate),
        "query" | "database" => Some(SlashCommand::Db),
        "reset" | "clear" => Some(SlashCommand::New),
        "h" | "?" => Some(SlashCommand::Help),
        _ => None,
    })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    let faces: Vec<String> = FaceScore::iter()
        .enumerate()
        .map(|(i, face)| format!("{}={}", i + 1, face.symbol()))
        .collect();
    help.push_str(&format!("\nFaces: {}", faces.join(" ")));
    help.push_str("\nAliases: /q for /quit, /r for /rate, /clear for /new. F1-F3 send the example queries.");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        let parsed = parse_slash_command("/db find injections for 675387").unwrap();
        assert_eq!(parsed.command, SlashCommand::Db);
        assert_eq!(parsed.argument(), Some("find injections for 675387"));

        assert_eq!(parse_slash_command("/q").unwrap().command, SlashCommand::Quit);
        assert_eq!(parse_slash_command("/clear").unwrap().command, SlashCommand::New);
        assert!(parse_slash_command("plain text").is_none());
        assert!(parse_slash_command("/unknown").is_none());
    }

    #[test]
    fn rate_argument_accepts_digit_or_face_with_comment() {
        let parsed = parse_slash_command("/rate 2 mostly right").unwrap();
        let (face, comment) = parsed.rating().unwrap();
        assert_eq!(face, FaceScore::Happy);
        assert_eq!(comment.as_deref(), Some("mostly right"));

        let parsed = parse_slash_command("/rate 😞").unwrap();
        assert_eq!(parsed.rating().unwrap(), (FaceScore::Upset, None));

        let parsed = parse_slash_command("/rate").unwrap();
        assert!(matches!(parsed.rating(), Err(FeedbackError::UnmappedScore(_))));
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for (name, _) in built_in_slash_commands() {
            assert!(help.contains(&format!("/{}", name)));
        }
    }
}
