use std::collections::HashSet;

use crate::db::GuildConfig;

use super::model::{MessageSnapshot, ReactionEmoji};

/// First reaction, in platform order, whose effective count reaches the threshold.
///
/// `authored` holds the emoji keys the message author reacted with. Unless self-pins are
/// allowed, the author's own reaction does not count toward the threshold.
pub fn qualifying_emoji<'a>(
    config: &GuildConfig,
    message: &'a MessageSnapshot,
    authored: &HashSet<String>,
) -> Option<&'a ReactionEmoji> {
    let threshold = u64::from(config.threshold.max(1));

    message.reactions.iter().find_map(|reaction| {
        let key = reaction.emoji.key();
        if !config.allows(&key) {
            return None;
        }

        let mut effective = reaction.count;
        if !config.selfpin && authored.contains(&key) {
            effective = effective.saturating_sub(1);
        }

        (effective >= threshold).then_some(&reaction.emoji)
    })
}
