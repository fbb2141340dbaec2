//! REPL Commands
//!
//! Parses one line of user input and produces the text printed for it.
//! Lines starting with `:` are session commands; anything else is a question
//! for the pipeline.

use crate::models::session::Turn;
use crate::state::AppState;

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Every turn with timestamp, role and tokens
    History,
    /// Reference context retrievable without a question
    Context,
    Tokens,
    Help,
    Quit,
    /// A question for the model
    Ask(String),
    Empty,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands:
  :history   show every turn of this session
  :context   show the current reference context
  :tokens    show tokens used so far
  :help      show this help
  :quit      exit
Anything else is sent as a question.";

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = line.strip_prefix(':') else {
            return ReplCommand::Ask(line.to_string());
        };
        match command.trim().to_lowercase().as_str() {
            "history" | "h" => ReplCommand::History,
            "context" | "c" => ReplCommand::Context,
            "tokens" | "t" => ReplCommand::Tokens,
            "help" | "?" => ReplCommand::Help,
            "quit" | "q" | "exit" => ReplCommand::Quit,
            other => ReplCommand::Unknown(other.to_string()),
        }
    }
}

/// Render the session history, one turn per line.
pub fn format_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "No messages yet.".to_string();
    }
    turns
        .iter()
        .map(Turn::display_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run `command` against the session. Returns the text to print, or `None`
/// when the session should end.
pub async fn run_command(state: &mut AppState, command: ReplCommand) -> Option<String> {
    let output = match command {
        ReplCommand::Quit => return None,
        ReplCommand::Empty => String::new(),
        ReplCommand::History => format_history(state.session().history()),
        ReplCommand::Context => {
            let context = state.context_snapshot().await;
            if context.is_empty() {
                "No reference context loaded.".to_string()
            } else {
                context
            }
        }
        ReplCommand::Tokens => format!("Tokens used: {}", state.session().total_tokens()),
        ReplCommand::Help => HELP_TEXT.to_string(),
        ReplCommand::Unknown(name) => format!("Unknown command :{} (try :help)", name),
        ReplCommand::Ask(question) => {
            let outcome = state.ask(&question).await;
            tracing::debug!(
                stage = ?outcome.stage,
                tokens = outcome.tokens_used,
                statements = outcome.outcomes.len(),
                "turn finished"
            );
            outcome.answer
        }
    };
    Some(output)
}
