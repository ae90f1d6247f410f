use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCountChange {
    Added,
    Removed,
}

/// Channel facts learned from the gateway: NSFW flags and native pin counts.
#[derive(Debug, Default)]
pub struct ChannelCache {
    nsfw: Mutex<HashMap<u64, bool>>,
    pin_counts: Mutex<HashMap<u64, usize>>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nsfw(&self, channel_id: u64) -> Option<bool> {
        self.nsfw.lock().get(&channel_id).copied()
    }

    pub fn set_nsfw(&self, channel_id: u64, nsfw: bool) {
        self.nsfw.lock().insert(channel_id, nsfw);
    }

    pub fn forget(&self, channel_id: u64) {
        self.nsfw.lock().remove(&channel_id);
        self.pin_counts.lock().remove(&channel_id);
    }

    /// A shrinking count means a pin was removed. An unseen channel counts as an addition.
    pub fn update_pin_count(&self, channel_id: u64, count: usize) -> PinCountChange {
        let previous = self.pin_counts.lock().insert(channel_id, count);
        match previous {
            Some(previous) if count < previous => PinCountChange::Removed,
            _ => PinCountChange::Added,
        }
    }
}
