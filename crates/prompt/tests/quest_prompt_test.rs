//! Tests for quest prompt building and advance marker parsing.

use prompt::{
    parse_reply, Advance, ChatMessage, MessageRole, QuestContext, ADVANCE_MARKER, SECTION_STATE,
};

fn context<'a>(goal: Option<&'a str>, successors: &'a [&'a str]) -> QuestContext<'a> {
    QuestContext {
        system_prompt: "You are Liza, a nurse.",
        state: "search",
        goal,
        successors,
        history: vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("Hello, who is this?"),
        ],
        text: "are you at the hospital?",
    }
}

#[test]
fn system_message_includes_goal_and_marker() {
    let system = context(Some("The player names the hospital"), &["finish"]).system_message();
    assert!(system.starts_with("You are Liza, a nurse."));
    assert!(system.contains(SECTION_STATE));
    assert!(system.contains("Current state: search"));
    assert!(system.contains("Goal: The player names the hospital"));
    assert!(system.contains(ADVANCE_MARKER));
    assert!(!system.contains("[[NEXT:<state>]]"));
}

#[test]
fn system_message_lists_alternatives() {
    let system = context(Some("Any answer"), &["finish", "detour"]).system_message();
    assert!(system.contains("[[NEXT:<state>]]"));
    assert!(system.contains("finish, detour"));
}

#[test]
fn system_message_without_goal_forbids_markers() {
    let system = context(None, &["finish"]).system_message();
    assert!(!system.contains("Goal:"));
    assert!(!system.contains(ADVANCE_MARKER));
}

#[test]
fn messages_are_system_history_then_current() {
    let messages = context(None, &[]).into_messages();
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
    assert_eq!(messages[3].content, "are you at the hospital?");
}

#[test]
fn parse_plain_reply() {
    let parsed = parse_reply("  Who is asking?  ");
    assert_eq!(parsed.text, "Who is asking?");
    assert_eq!(parsed.advance, None);
}

#[test]
fn parse_default_marker() {
    let parsed = parse_reply("Yes, the city hospital! [[NEXT]]");
    assert_eq!(parsed.text, "Yes, the city hospital!");
    assert_eq!(parsed.advance, Some(Advance::Default));
}

#[test]
fn parse_named_marker() {
    let parsed = parse_reply("Follow me. [[NEXT: finish ]]");
    assert_eq!(parsed.text, "Follow me.");
    assert_eq!(parsed.advance, Some(Advance::To("finish".to_string())));
}

#[test]
fn parse_keeps_non_markers() {
    let parsed = parse_reply("Look at [[NEXTDOOR]] and [[NEXT");
    assert_eq!(parsed.text, "Look at [[NEXTDOOR]] and [[NEXT");
    assert_eq!(parsed.advance, None);
}

#[test]
fn parse_marker_only_reply_is_empty() {
    let parsed = parse_reply("[[NEXT]]");
    assert!(parsed.text.is_empty());
    assert_eq!(parsed.advance, Some(Advance::Default));
}
