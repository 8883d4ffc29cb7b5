//! # Prompt
//!
//! Builds chat messages for a persona's free-text reply and parses the model's answer.
//!
//! ## Format
//!
//! - **System**: the persona's character prompt, then a `Quest state:` section naming the
//!   current state and, when the state has a goal, the instruction to append the advance marker
//!   once the goal is met.
//! - **Conversation**: recent turns as alternating user / assistant messages.
//! - **Current message**: last, as a user message.
//!
//! ## Advance marker
//!
//! The model appends [`ADVANCE_MARKER`] (`[[NEXT]]`) or `[[NEXT:<state>]]` to its reply when the
//! goal is satisfied. [`parse_reply`] strips every marker from the text shown to the player.

/// Role of a message, one-to-one with OpenAI Chat Completions API `role` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message, one element of the OpenAI `messages` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Marker requesting the state's default successor.
pub const ADVANCE_MARKER: &str = "[[NEXT]]";

const MARKER_OPEN: &str = "[[NEXT";
const MARKER_CLOSE: &str = "]]";

/// Section title for the state block of the system message.
pub const SECTION_STATE: &str = "Quest state:";

/// Everything needed to prompt one free-text reply.
#[derive(Debug, Clone)]
pub struct QuestContext<'a> {
    pub system_prompt: &'a str,
    pub state: &'a str,
    pub goal: Option<&'a str>,
    /// Successor states; the first is the default.
    pub successors: &'a [&'a str],
    /// Recent turns, oldest first, as user / assistant messages.
    pub history: Vec<ChatMessage>,
    pub text: &'a str,
}

impl QuestContext<'_> {
    /// System message text.
    pub fn system_message(&self) -> String {
        let mut out = String::new();
        if !self.system_prompt.trim().is_empty() {
            out.push_str(self.system_prompt.trim());
            out.push_str("\n\n");
        }
        out.push_str(SECTION_STATE);
        out.push('\n');
        out.push_str("Current state: ");
        out.push_str(self.state);
        out.push('\n');

        match (self.goal, self.successors.split_first()) {
            (Some(goal), Some((_, alternatives))) => {
                out.push_str("Goal: ");
                out.push_str(goal);
                out.push('\n');
                out.push_str("Reply in character. Only when the player's message meets the goal, end your reply with ");
                out.push_str(ADVANCE_MARKER);
                out.push_str(".\n");
                if !alternatives.is_empty() {
                    out.push_str("To move to a specific next state instead, end with [[NEXT:<state>]] using one of: ");
                    out.push_str(&self.successors.join(", "));
                    out.push_str(".\n");
                }
                out.push_str("Never mention the marker otherwise.\n");
            }
            _ => {
                out.push_str("Reply in character. Do not add any markers.\n");
            }
        }
        out
    }

    /// Full message list: system, history, current message.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_message()));
        let text = self.text;
        messages.extend(self.history);
        messages.push(ChatMessage::user(text));
        messages
    }
}

/// Advance request found in a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Default,
    To(String),
}

/// A model reply with markers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub text: String,
    /// The last marker in the reply wins.
    pub advance: Option<Advance>,
}

/// Splits the reply text from any advance markers.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut text = String::with_capacity(raw.len());
    let mut advance = None;
    let mut rest = raw;

    while let Some(start) = rest.find(MARKER_OPEN) {
        let after_open = &rest[start + MARKER_OPEN.len()..];
        let Some(close) = after_open.find(MARKER_CLOSE) else {
            break;
        };
        let inner = &after_open[..close];
        let parsed = if inner.is_empty() {
            Some(Advance::Default)
        } else {
            inner
                .strip_prefix(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Advance::To(s.to_string()))
        };
        match parsed {
            Some(a) => {
                text.push_str(&rest[..start]);
                advance = Some(a);
            }
            // Not a marker, keep it verbatim.
            None => text.push_str(&rest[..start + MARKER_OPEN.len() + close + MARKER_CLOSE.len()]),
        }
        rest = &after_open[close + MARKER_CLOSE.len()..];
    }
    text.push_str(rest);

    ParsedReply {
        text: text.trim().to_string(),
        advance,
    }
}
