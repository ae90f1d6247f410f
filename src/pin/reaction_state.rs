use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

#[derive(Debug)]
struct AuthorReactions {
    author_id: u64,
    emojis: HashSet<String>,
}

/// Tracks which emoji a message's own author reacted with. Memory only.
#[derive(Debug, Default)]
pub struct ReactionStateCache {
    messages: Mutex<HashMap<u64, AuthorReactions>>,
}

impl ReactionStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the reaction was placed by the author and got recorded.
    pub fn record_add(&self, message_id: u64, author_id: u64, user_id: u64, emoji: &str) -> bool {
        if user_id != author_id {
            return false;
        }

        let mut messages = self.messages.lock();
        let entry = messages.entry(message_id).or_insert_with(|| AuthorReactions {
            author_id,
            emojis: HashSet::new(),
        });
        entry.author_id = author_id;
        entry.emojis.insert(emoji.to_string());
        true
    }

    pub fn record_remove(&self, message_id: u64, user_id: u64, emoji: &str) {
        let mut messages = self.messages.lock();
        let Some(entry) = messages.get_mut(&message_id) else {
            return;
        };
        if entry.author_id != user_id {
            return;
        }

        entry.emojis.remove(emoji);
        if entry.emojis.is_empty() {
            messages.remove(&message_id);
        }
    }

    pub fn purge(&self, message_id: u64) {
        self.messages.lock().remove(&message_id);
    }

    pub fn authored(&self, message_id: u64) -> HashSet<String> {
        self.messages
            .lock()
            .get(&message_id)
            .map(|entry| entry.emojis.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }
}
