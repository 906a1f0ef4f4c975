//! Terminal rendering of conversations
//!
//! The renderer prints only what is new since the last call, so it can be
//! driven by every store notification while a reply streams in.

use std::io::{self, Write};

use ponder_stream::{Conversation, ConversationId, Message};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// How far into the streaming message we have printed
#[derive(Debug, Default)]
struct Cursor {
    reasoning_chars: usize,
    content_chars: usize,
}

/// Incremental printer for the active conversation
#[derive(Debug)]
pub struct Renderer {
    conversation: Option<ConversationId>,
    /// Messages before this index are fully printed
    printed: usize,
    cursor: Cursor,
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            conversation: None,
            printed: 0,
            cursor: Cursor::default(),
            color,
        }
    }

    pub fn conversation(&self) -> Option<&str> {
        self.conversation.as_deref()
    }

    /// Follow another conversation, treating its first `already_printed` messages as shown
    pub fn reset(&mut self, conversation: Option<ConversationId>, already_printed: usize) {
        self.conversation = conversation;
        self.printed = already_printed;
        self.cursor = Cursor::default();
    }

    /// Print whatever arrived since the last call.
    ///
    /// User messages are skipped (the user just typed them). A message still
    /// streaming is printed up to its current length and picked up again on
    /// the next call.
    pub fn render(
        &mut self,
        messages: &[Message],
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> io::Result<()> {
        // A reconciliation can shorten the list
        if self.printed > messages.len() {
            self.printed = messages.len();
            self.cursor = Cursor::default();
        }

        while let Some(message) = messages.get(self.printed) {
            if message.is_user() {
                self.advance();
                continue;
            }
            if message.is_error {
                writeln!(err, "Error: {}", message.content)?;
                self.advance();
                continue;
            }

            self.write_delta(message, out)?;
            // Only the trailing message can still be written to; an earlier
            // one left mid-stream was abandoned
            if message.phase.is_streaming() && self.printed + 1 == messages.len() {
                break;
            }
            if self.cursor.reasoning_chars > 0 || self.cursor.content_chars > 0 {
                writeln!(out)?;
            }
            self.advance();
        }

        out.flush()
    }

    /// Close off a reply that will not progress any further
    pub fn finish(
        &mut self,
        messages: &[Message],
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> io::Result<()> {
        self.render(messages, out, err)?;
        if self.printed < messages.len() {
            if self.cursor.reasoning_chars > 0 || self.cursor.content_chars > 0 {
                writeln!(out)?;
            }
            self.printed = messages.len();
            self.cursor = Cursor::default();
        }
        out.flush()
    }

    fn advance(&mut self) {
        self.printed += 1;
        self.cursor = Cursor::default();
    }

    fn write_delta(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        let reasoning = suffix(&message.reasoning, self.cursor.reasoning_chars);
        if !reasoning.is_empty() {
            // Reasoning only streams before the answer starts
            if self.cursor.content_chars == 0 {
                self.write_dim(out, reasoning)?;
            }
            self.cursor.reasoning_chars = message.reasoning.chars().count();
        }

        let content = suffix(&message.content, self.cursor.content_chars);
        if !content.is_empty() {
            if self.cursor.content_chars == 0 && self.cursor.reasoning_chars > 0 {
                writeln!(out)?;
                writeln!(out)?;
            }
            write!(out, "{}", content)?;
            self.cursor.content_chars = message.content.chars().count();
        }
        Ok(())
    }

    fn write_dim(&self, out: &mut impl Write, text: &str) -> io::Result<()> {
        if self.color {
            write!(out, "{}{}{}", DIM, text, RESET)
        } else {
            write!(out, "{}", text)
        }
    }

    /// Print a whole conversation and start following it.
    ///
    /// When `live` is set the trailing message is still streaming; it is left
    /// for [`Renderer::render`] to print as it grows.
    pub fn print_history(
        &mut self,
        conversation: &Conversation,
        live: bool,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> io::Result<()> {
        let title = display_title(&conversation.title);
        writeln!(out, "--- {} ---", title)?;

        let mut settled = conversation.messages.len();
        if live && conversation.messages.last().is_some_and(|m| m.phase.is_streaming()) {
            settled -= 1;
        }

        for message in &conversation.messages[..settled] {
            if message.is_user() {
                writeln!(out, "> {}", message.content)?;
            } else if message.is_error {
                writeln!(err, "Error: {}", message.content)?;
            } else {
                if !message.reasoning.is_empty() {
                    self.write_dim(out, &message.reasoning)?;
                    writeln!(out)?;
                    writeln!(out)?;
                }
                writeln!(out, "{}", message.content)?;
            }
        }
        out.flush()?;

        self.reset(Some(conversation.id.clone()), settled);
        Ok(())
    }
}

/// Characters of `s` after the first `skip`
fn suffix(s: &str, skip: usize) -> &str {
    match s.char_indices().nth(skip) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        "(untitled)"
    } else {
        title
    }
}

/// Numbered conversation list, marking the active one
pub fn format_conversation_list(conversations: &[Conversation], active: Option<&str>) -> String {
    if conversations.is_empty() {
        return "No conversations yet. Type a message to start one.".to_string();
    }

    let mut output = String::from("Conversations:\n");
    for (i, conv) in conversations.iter().enumerate() {
        let marker = if active == Some(conv.id.as_str()) { " *" } else { "" };
        output.push_str(&format!(
            "  {:>2}. {} [{}]{}\n",
            i + 1,
            crate::utils::truncate_chars(display_title(&conv.title), 60),
            conv.id,
            marker
        ));
    }
    output.push_str("\nSwitch with: /switch <n>");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ponder_stream::Phase;

    fn streaming(reasoning: &str, content: &str) -> Message {
        let mut msg = Message::placeholder();
        msg.reasoning = reasoning.to_string();
        msg.content = content.to_string();
        if !content.is_empty() {
            msg.phase = Phase::Answering;
            msg.loading = false;
        }
        msg
    }

    fn render(renderer: &mut Renderer, messages: &[Message]) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        renderer.render(messages, &mut out, &mut err).unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_prints_only_new_text() {
        let mut renderer = Renderer::new(false);
        let user = Message::user("hi");

        let (out, _) = render(&mut renderer, &[user.clone(), streaming("Let me", "")]);
        assert_eq!(out, "Let me");

        let (out, _) = render(&mut renderer, &[user.clone(), streaming("Let me think", "")]);
        assert_eq!(out, " think");

        let (out, _) = render(&mut renderer, &[user.clone(), streaming("Let me think", "Héllo")]);
        assert_eq!(out, "\n\nHéllo");

        let mut done = streaming("Let me think", "Héllo there");
        done.phase = Phase::Complete;
        let (out, _) = render(&mut renderer, &[user.clone(), done.clone()]);
        assert_eq!(out, " there\n");

        // Nothing left to print
        let (out, _) = render(&mut renderer, &[user, done]);
        assert_eq!(out, "");
    }

    #[test]
    fn test_loading_placeholder_prints_nothing() {
        let mut renderer = Renderer::new(false);
        let (out, err) = render(&mut renderer, &[Message::user("hi"), Message::placeholder()]);
        assert_eq!(out, "");
        assert_eq!(err, "");
    }

    #[test]
    fn test_errors_go_to_stderr() {
        let mut renderer = Renderer::new(false);
        let mut partial = streaming("", "Hel");
        partial.phase = Phase::Errored;
        let messages = [
            Message::user("hi"),
            partial,
            Message::error("server exploded"),
        ];

        let (out, err) = render(&mut renderer, &messages);
        assert_eq!(out, "Hel\n");
        assert_eq!(err, "Error: server exploded\n");
    }

    #[test]
    fn test_reasoning_is_dimmed_with_color() {
        let mut renderer = Renderer::new(true);
        let (out, _) = render(&mut renderer, &[streaming("hmm", "")]);
        assert_eq!(out, "\x1b[2mhmm\x1b[0m");
    }

    #[test]
    fn test_reset_skips_existing_messages() {
        let mut renderer = Renderer::new(false);
        let mut done = streaming("", "old answer");
        done.phase = Phase::Complete;
        renderer.reset(Some("c1".into()), 2);

        let (out, _) = render(&mut renderer, &[Message::user("old"), done]);
        assert_eq!(out, "");
        assert_eq!(renderer.conversation(), Some("c1"));
    }

    #[test]
    fn test_finish_closes_abandoned_reply() {
        let mut renderer = Renderer::new(false);
        let messages = [Message::user("hi"), streaming("", "partial")];
        let mut out = Vec::new();
        let mut err = Vec::new();
        renderer.finish(&messages, &mut out, &mut err).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "partial\n");

        // A later reply is printed from the start
        let mut next = streaming("", "next");
        next.phase = Phase::Complete;
        let more = [messages[0].clone(), messages[1].clone(), Message::user("again"), next];
        let (out, _) = render(&mut renderer, &more);
        assert_eq!(out, "next\n");
    }

    #[test]
    fn test_print_history() {
        let mut renderer = Renderer::new(false);
        let mut conv = Conversation::new("c1", "");
        let mut answer = streaming("because", "42");
        answer.phase = Phase::Complete;
        conv.messages = vec![Message::user("why?"), answer];

        let mut out = Vec::new();
        let mut err = Vec::new();
        renderer.print_history(&conv, false, &mut out, &mut err).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--- (untitled) ---\n> why?\nbecause\n\n42\n"
        );
        assert_eq!(renderer.conversation(), Some("c1"));
    }

    #[test]
    fn test_history_leaves_live_reply_to_render() {
        let mut renderer = Renderer::new(false);
        let mut conv = Conversation::new("c1", "Live");
        conv.messages = vec![Message::user("go"), streaming("", "Hal")];

        let mut out = Vec::new();
        let mut err = Vec::new();
        renderer.print_history(&conv, true, &mut out, &mut err).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "--- Live ---\n> go\n");

        conv.messages[1].content.push_str("lo");
        let (out, _) = render(&mut renderer, &conv.messages);
        assert_eq!(out, "Hallo");
    }

    #[test]
    fn test_abandoned_reply_does_not_block_later_messages() {
        let mut renderer = Renderer::new(false);
        let mut done = streaming("", "fresh");
        done.phase = Phase::Complete;
        let messages = [
            Message::user("first"),
            streaming("", "cut"),
            Message::user("second"),
            done,
        ];

        let (out, _) = render(&mut renderer, &messages);
        assert_eq!(out, "cut\nfresh\n");
    }

    #[test]
    fn test_conversation_list() {
        let conversations = vec![Conversation::new("a1", "Rust"), Conversation::new("b2", "")];
        let text = format_conversation_list(&conversations, Some("b2"));
        assert!(text.contains("   1. Rust [a1]\n"));
        assert!(text.contains("   2. (untitled) [b2] *\n"));

        assert!(format_conversation_list(&[], None).starts_with("No conversations"));
    }
}
