//! Long-polling loop for one persona's bot.

use std::time::Duration;

use quest_core::{InboundEvent, PersonaId};
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::event_from_update;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Polls `getUpdates` until `cancel` fires or the receiver is dropped. Dropping `tx` on return
/// ends the persona's event stream.
pub(crate) async fn poll_updates(
    persona: PersonaId,
    bot: Bot,
    tx: mpsc::Sender<InboundEvent>,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) {
    info!(persona = %persona, "long polling started");
    let mut offset: i32 = 0;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message]);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = request.send() => result,
        };

        let updates = match result {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                updates
            }
            Err(e) => {
                warn!(persona = %persona, error = %e, retry_in = ?backoff, "getUpdates failed");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for update in updates {
            match next_offset(update.id.0) {
                Some(next) => offset = next,
                None => warn!(
                    persona = %persona,
                    update_id = update.id.0,
                    "update id exceeds the getUpdates offset range; offset not advanced"
                ),
            }
            let Some(event) = event_from_update(&persona, &update) else {
                debug!(persona = %persona, update_id = update.id.0, "skipping non-text update");
                continue;
            };
            info!(
                persona = %persona,
                chat_id = %event.chat,
                user_id = event.user.id,
                "Received message"
            );
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                result = tx.send(event) => result.is_ok(),
            };
            if !sent {
                info!(persona = %persona, "long polling stopped");
                return;
            }
        }
    }
    info!(persona = %persona, "long polling stopped");
}

/// `getUpdates` offset acknowledging `update_id`, or `None` when it does not fit the Bot API's i32.
fn next_offset(update_id: u32) -> Option<i32> {
    i32::try_from(update_id).ok()?.checked_add(1)
}
