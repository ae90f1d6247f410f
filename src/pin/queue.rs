use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PinEngine;
use super::model::PinOutcome;
use super::request::PinRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The message is already queued or executing; the request was dropped.
    Duplicate,
    /// The worker has stopped.
    Closed,
}

/// Producer side of the pin queue. Cheap to clone, never blocks.
#[derive(Clone)]
pub struct PinQueue {
    sender: mpsc::UnboundedSender<PinRequest>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
}

/// The single consumer. Requests are executed one at a time in arrival order.
pub struct PinWorker {
    receiver: mpsc::UnboundedReceiver<PinRequest>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
}

impl PinQueue {
    pub fn new() -> (PinQueue, PinWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        (
            PinQueue {
                sender,
                in_flight: in_flight.clone(),
            },
            PinWorker {
                receiver,
                in_flight,
            },
        )
    }

    pub fn submit(&self, request: PinRequest) -> Submission {
        let message_id = request.message_id();
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(message_id) {
            debug!("pin request already in flight message_id={}", message_id);
            return Submission::Duplicate;
        }

        if self.sender.send(request).is_err() {
            in_flight.remove(&message_id);
            warn!("pin queue closed, dropping request message_id={}", message_id);
            return Submission::Closed;
        }

        Submission::Queued
    }

    pub fn is_in_flight(&self, message_id: u64) -> bool {
        self.in_flight.lock().contains(&message_id)
    }
}

impl PinWorker {
    /// Runs until every `PinQueue` handle is dropped and the queue is drained.
    pub async fn run(mut self, engine: Arc<PinEngine>) {
        info!("pin worker started");

        while let Some(mut request) = self.receiver.recv().await {
            let message_id = request.message_id();
            let result = engine.pin_request(&request).await;

            match &result {
                Ok(PinOutcome::Pinned(location)) => info!(
                    "pinned message guild_id={} message_id={} copy_id={}",
                    request.guild_id, message_id, location.message_id
                ),
                Ok(PinOutcome::AlreadyPinned(location)) => debug!(
                    "message already pinned guild_id={} message_id={} copy_id={}",
                    request.guild_id, message_id, location.message_id
                ),
                Err(err) => warn!(
                    "pin failed guild_id={} message_id={} trigger={:?} error={}",
                    request.guild_id, message_id, request.trigger, err
                ),
            }

            self.in_flight.lock().remove(&message_id);

            if let Some(responder) = request.responder.take() {
                if responder.send(result).is_err() {
                    debug!("pin requester went away message_id={}", message_id);
                }
            }
        }

        info!("pin worker stopped");
    }
}
