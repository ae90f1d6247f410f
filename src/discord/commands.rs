use anyhow::{Result, anyhow};
use serenity::all::{
    CommandInteraction, CommandType, Context as SerenityContext, CreateCommand,
    CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    ResolvedTarget,
};
use tracing::{debug, info};

use crate::pin::{CommandTicket, EventRouter, PinError, PinOutcome};

use super::convert::message_snapshot;

pub const PIN_MESSAGE_COMMAND: &str = "Pin Message";

pub fn pin_message_command() -> CreateCommand {
    CreateCommand::new(PIN_MESSAGE_COMMAND).kind(CommandType::Message)
}

/// Queues the targeted message and answers ephemerally once the worker is done.
pub async fn handle_pin_command(
    ctx: &SerenityContext,
    command: &CommandInteraction,
    router: &EventRouter,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, command, "Messages can only be pinned inside a server.").await;
    };
    let Some(ResolvedTarget::Message(target)) = command.data.target() else {
        return Err(anyhow!("pin command invoked without a target message"));
    };

    command
        .defer_ephemeral(&ctx.http)
        .await
        .map_err(|e| anyhow!("failed to defer pin command: {}", e))?;

    info!(
        "pin command guild_id={} user_id={} message_id={}",
        guild_id, command.user.id, target.id
    );

    let mut snapshot = message_snapshot(target);
    snapshot.guild_id = Some(guild_id.get());

    let reply = match router.pin_command(guild_id.get(), command.user.id.get(), snapshot) {
        CommandTicket::Pending(receiver) => match receiver.await {
            Ok(result) => outcome_reply(guild_id.get(), &result),
            Err(_) => outcome_reply(guild_id.get(), &Err(PinError::QueueClosed)),
        },
        CommandTicket::Duplicate => "Message is already being pinned.".to_string(),
        CommandTicket::Unavailable => outcome_reply(guild_id.get(), &Err(PinError::QueueClosed)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await
        .map_err(|e| anyhow!("failed to answer pin command: {}", e))?;
    debug!("answered pin command interaction_id={}", command.id);
    Ok(())
}

async fn respond(ctx: &SerenityContext, command: &CommandInteraction, content: &str) -> Result<()> {
    let message = CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true);
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
        .map_err(|e| anyhow!("failed to answer pin command: {}", e))
}

pub fn outcome_reply(guild_id: u64, result: &Result<PinOutcome, PinError>) -> String {
    match result {
        Ok(PinOutcome::Pinned(location)) => {
            format!("Message pinned. {}", location.link(guild_id))
        }
        Ok(PinOutcome::AlreadyPinned(location)) => {
            format!("Message already pinned. {}", location.link(guild_id))
        }
        Err(err) => format!("Message not pinned.\n```{}```", err),
    }
}
