//! Adapters from Telegram (teloxide) types to quest_core types.

use chrono::Utc;
use quest_core::{ChatId, InboundEvent, PersonaId, User};
use teloxide::types::{Update, UpdateKind};

/// Wraps a teloxide User for conversion to core [`User`].
pub struct TelegramUserWrapper<'a>(pub &'a teloxide::types::User);

impl TelegramUserWrapper<'_> {
    pub fn to_core(&self) -> User {
        User {
            id: self.0.id.0 as i64,
            username: self.0.username.clone(),
            first_name: Some(self.0.first_name.clone()),
            last_name: self.0.last_name.clone(),
        }
    }
}

/// Wraps a teloxide Message for conversion to an [`InboundEvent`] of `persona`.
pub struct TelegramMessageWrapper<'a>(pub &'a teloxide::types::Message);

impl TelegramMessageWrapper<'_> {
    /// `None` for messages without text (stickers, photos, service messages).
    pub fn to_event(&self, persona: &PersonaId) -> Option<InboundEvent> {
        let text = self.0.text()?;
        let user = self
            .0
            .from
            .as_ref()
            .map(|u| TelegramUserWrapper(u).to_core())
            .unwrap_or_default();
        Some(InboundEvent {
            persona: persona.clone(),
            chat: ChatId(self.0.chat.id.0),
            text: text.to_string(),
            user,
            received_at: Utc::now(),
        })
    }
}

/// Converts a polled update; only new text messages become events.
pub fn event_from_update(persona: &PersonaId, update: &Update) -> Option<InboundEvent> {
    match &update.kind {
        UpdateKind::Message(msg) => TelegramMessageWrapper(msg).to_event(persona),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_telegram_user_wrapper_to_core() {
        let user = teloxide::types::User {
            id: teloxide::types::UserId(123),
            is_bot: false,
            first_name: "Anna".to_string(),
            last_name: Some("K".to_string()),
            username: Some("anna".to_string()),
            language_code: Some("ru".to_string()),
            is_premium: false,
            added_to_attachment_menu: false,
        };

        let core_user = TelegramUserWrapper(&user).to_core();

        assert_eq!(core_user.id, 123);
        assert_eq!(core_user.username, Some("anna".to_string()));
        assert_eq!(core_user.first_name, Some("Anna".to_string()));
        assert_eq!(core_user.last_name, Some("K".to_string()));
    }

    #[test]
    fn test_text_update_becomes_event() {
        let u = update(
            r#"{"update_id": 10, "message": {"message_id": 1, "date": 1700000000,
                "chat": {"id": 42, "type": "private", "first_name": "Anna"},
                "from": {"id": 42, "is_bot": false, "first_name": "Anna", "username": "anna"},
                "text": "/start"}}"#,
        );

        let event = event_from_update(&PersonaId::new("main"), &u).unwrap();

        assert_eq!(event.persona, PersonaId::new("main"));
        assert_eq!(event.chat, ChatId(42));
        assert_eq!(event.text, "/start");
        assert_eq!(event.user.username.as_deref(), Some("anna"));
    }

    #[test]
    fn test_non_text_update_is_skipped() {
        let u = update(
            r#"{"update_id": 11, "message": {"message_id": 2, "date": 1700000000,
                "chat": {"id": 42, "type": "private", "first_name": "Anna"},
                "from": {"id": 42, "is_bot": false, "first_name": "Anna"},
                "location": {"latitude": 55.75, "longitude": 37.61}}}"#,
        );

        assert!(event_from_update(&PersonaId::new("main"), &u).is_none());
    }
}
