//! Slash commands for interactive mode

mod conversation;
mod model;
mod toggle;

pub use conversation::resolve_conversation;
pub use model::ModelCommand;
pub use toggle::ToggleCommand;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Create and switch to a new conversation
    NewConversation,
    /// List conversations
    ListConversations,
    /// Switch to a conversation (id or list index)
    Switch(String),
    /// Delete a conversation (id or list index)
    Delete(String),
    /// Print the active conversation
    History,
    /// List models offered by the backend
    ListModels,
    /// Change the model (query matched against available models)
    ChangeModel(String),
    /// Turn deep thinking on or off
    SetThinking(bool),
    /// Turn web search on or off
    SetWebSearch(bool),
    /// Stop the reply streaming into the active conversation
    Cancel,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command
pub fn execute_command(input: &str, deep_thinking: bool, web_search: bool) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewConversation,

        "list" | "l" => CommandResult::ListConversations,

        "switch" | "s" => {
            if args.is_empty() {
                CommandResult::ListConversations
            } else {
                CommandResult::Switch(args.to_string())
            }
        }

        "delete" | "d" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /delete <id|index>".to_string())
            } else {
                CommandResult::Delete(args.to_string())
            }
        }

        "history" => CommandResult::History,

        "model" | "m" => ModelCommand::execute(args),

        "thinking" | "t" => ToggleCommand::execute("thinking", args, deep_thinking)
            .map_or_else(CommandResult::Message, CommandResult::SetThinking),

        "search" => ToggleCommand::execute("search", args, web_search)
            .map_or_else(CommandResult::Message, CommandResult::SetWebSearch),

        "cancel" | "stop" => CommandResult::Cancel,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /new, /n               Start a new conversation
  /list, /l              List conversations
  /switch, /s <id|n>     Switch conversation (stops a reply still streaming)
  /delete, /d <id|n>     Delete a conversation
  /history               Show the current conversation
  /model, /m [name]      List models or switch to a model
  /thinking, /t [on|off] Show or set deep thinking
  /search [on|off]       Show or set web search
  /cancel, /stop         Stop the reply currently streaming
  /quit, /exit, /q       Exit ponder

Examples:
  /switch 2              Switch to the second conversation in /list
  /model plus            Switch to the first model matching "plus"
  /thinking off          Answer without streaming reasoning"#
        .to_string()
}
