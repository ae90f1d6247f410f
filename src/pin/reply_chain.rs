use tracing::{debug, warn};

use super::PinEngine;
use super::error::PinError;
use super::model::{MessageSnapshot, PinLocation};

impl PinEngine {
    /// Pins the replied-to message and posts a back-reference to its copy.
    /// Failures are logged and never block the reply itself.
    pub(super) async fn pin_reply_chain(&self, message: &MessageSnapshot, guild_id: u64, depth: u32) {
        let Some(reference) = message.reference else {
            return;
        };

        match self.pin_parent(message, guild_id, depth).await {
            Ok(location) => debug!(
                "posted reply preface guild_id={} message_id={} parent_id={} preface_id={}",
                guild_id, message.id, reference.message_id, location.message_id
            ),
            Err(err) => warn!(
                "reply chain skipped guild_id={} message_id={} parent_id={} error={}",
                guild_id, message.id, reference.message_id, err
            ),
        }
    }

    async fn pin_parent(
        &self,
        message: &MessageSnapshot,
        guild_id: u64,
        depth: u32,
    ) -> Result<PinLocation, PinError> {
        let parent = match (&message.parent, message.reference) {
            (Some(parent), _) => parent.as_ref().clone(),
            (None, Some(reference)) => self
                .platform
                .fetch_message(reference.channel_id, reference.message_id)
                .await
                .map_err(PinError::Platform)?,
            (None, None) => return Err(PinError::not_pinnable("message is not a reply")),
        };

        let parent_copy = self
            .pin_with_depth(&parent, guild_id, depth.saturating_sub(1))
            .await?
            .location();

        let config = self.guild_config(guild_id).await?;
        let channel_id = config
            .channel_id
            .ok_or(PinError::ChannelNotConfigured(guild_id))?;
        let identity = self.identities.acquire(guild_id, channel_id).await?;

        self.replicator
            .send_preface(guild_id, message, &identity, parent_copy)
            .await
    }
}
