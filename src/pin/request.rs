use tokio::sync::oneshot;

use super::error::PinError;
use super::model::{MessageSnapshot, PinOutcome};

pub type PinResponder = oneshot::Sender<Result<PinOutcome, PinError>>;

/// What caused a pin attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinTrigger {
    /// `emoji` is the key of the first reaction that crossed the threshold.
    Reaction { emoji: String },
    Command { user_id: u64 },
    NativePin,
}

impl PinTrigger {
    pub fn emoji(&self) -> Option<String> {
        match self {
            PinTrigger::Reaction { emoji } => Some(emoji.clone()),
            PinTrigger::Command { .. } | PinTrigger::NativePin => None,
        }
    }
}

/// A snapshot of everything needed to replicate a message, taken when the trigger fired.
/// A reply parent delivered with the message travels inside `message.parent`.
#[derive(Debug)]
pub struct PinRequest {
    pub guild_id: u64,
    pub message: MessageSnapshot,
    pub trigger: PinTrigger,
    pub responder: Option<PinResponder>,
}

impl PinRequest {
    pub fn new(guild_id: u64, message: MessageSnapshot, trigger: PinTrigger) -> Self {
        Self {
            guild_id,
            message,
            trigger,
            responder: None,
        }
    }

    /// Attaches a channel that receives the outcome once the worker is done.
    pub fn with_responder(
        mut self,
    ) -> (Self, oneshot::Receiver<Result<PinOutcome, PinError>>) {
        let (sender, receiver) = oneshot::channel();
        self.responder = Some(sender);
        (self, receiver)
    }

    pub fn message_id(&self) -> u64 {
        self.message.id
    }
}
