//! Per-conversation tag state.
//!
//! Holds the active character's known tags, the tags already acted upon for
//! each message, and the issue/apply sequence used to order avatar swaps.
//! The lock is only taken for short synchronous sections, never across an await.

use parking_lot::Mutex;
use shared::assets::{normalize_tag, CHARACTER_TAG_PREFIX};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Default)]
struct SessionState {
    character_id: Option<String>,
    character_tags: HashSet<String>,
    processed: HashMap<String, HashSet<String>>,
    issued: HashMap<String, u64>,
    applied: HashMap<String, u64>,
}

#[derive(Default)]
pub struct TagSession {
    state: Mutex<SessionState>,
}

impl TagSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the tag set of a newly active character. Never merges.
    pub fn replace_character_tags(
        &self,
        character_id: Option<String>,
        tags: impl IntoIterator<Item = String>,
    ) {
        let tags: HashSet<String> = tags.into_iter().map(|t| normalize_tag(&t)).collect();
        let mut state = self.state.lock();
        tracing::debug!(
            "Tag cache replaced for {:?}: {} tags",
            character_id,
            tags.len()
        );
        state.character_id = character_id;
        state.character_tags = tags;
    }

    pub fn active_character(&self) -> Option<String> {
        self.state.lock().character_id.clone()
    }

    /// Sorted copy of the cached tags
    pub fn character_tags(&self) -> BTreeSet<String> {
        self.state.lock().character_tags.iter().cloned().collect()
    }

    /// `char_{value}` when the cache knows it, else the value itself
    pub fn map_value(&self, value: &str) -> String {
        let value = normalize_tag(value);
        let namespaced = format!("{CHARACTER_TAG_PREFIX}{value}");
        if self.state.lock().character_tags.contains(&namespaced) {
            namespaced
        } else {
            value
        }
    }

    pub fn is_processed(&self, message_id: &str, full_match_text: &str) -> bool {
        self.state
            .lock()
            .processed
            .get(message_id)
            .is_some_and(|set| set.contains(full_match_text))
    }

    /// Record a tag as handled. Returns false if it already was.
    pub fn mark_processed(&self, message_id: &str, full_match_text: &str) -> bool {
        self.state
            .lock()
            .processed
            .entry(message_id.to_string())
            .or_default()
            .insert(full_match_text.to_string())
    }

    pub fn processed_count(&self, message_id: &str) -> usize {
        self.state
            .lock()
            .processed
            .get(message_id)
            .map_or(0, HashSet::len)
    }

    /// Start a message over (restart, replay or regenerate). Processed tags
    /// are forgotten. Sequence numbers keep counting and every swap issued
    /// so far is treated as applied, so jobs still in flight from the old
    /// reveal can never land.
    pub fn clear_message(&self, message_id: &str) {
        let mut state = self.state.lock();
        state.processed.remove(message_id);
        if let Some(issued) = state.issued.get(message_id).copied() {
            state.applied.insert(message_id.to_string(), issued);
        }
    }

    /// Drop all state for a message that no longer exists
    pub fn forget_message(&self, message_id: &str) {
        let mut state = self.state.lock();
        state.processed.remove(message_id);
        state.issued.remove(message_id);
        state.applied.remove(message_id);
    }

    /// Next issue number for an avatar swap on this message
    pub fn next_sequence(&self, message_id: &str) -> u64 {
        let mut state = self.state.lock();
        let seq = state.issued.entry(message_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Accept a finished swap unless a later-issued one already landed.
    pub fn try_apply(&self, message_id: &str, seq: u64) -> bool {
        let mut state = self.state.lock();
        let applied = state.applied.entry(message_id.to_string()).or_insert(0);
        if seq > *applied {
            *applied = seq;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_character_tags() {
        let session = TagSession::new();
        session.replace_character_tags(Some("c1".into()), vec!["char_happy".to_string()]);
        assert_eq!(session.map_value("happy"), "char_happy");
        assert_eq!(session.map_value(" Happy "), "char_happy");
        assert_eq!(session.map_value("sad"), "sad");
    }

    #[test]
    fn replacing_cache_drops_old_tags() {
        let session = TagSession::new();
        session.replace_character_tags(Some("c1".into()), vec!["char_happy".to_string()]);
        session.replace_character_tags(Some("c2".into()), vec!["char_grumpy".to_string()]);
        assert_eq!(session.map_value("happy"), "happy");
        assert_eq!(session.map_value("grumpy"), "char_grumpy");
        assert_eq!(session.active_character().as_deref(), Some("c2"));
    }

    #[test]
    fn processed_set_is_per_message() {
        let session = TagSession::new();
        assert!(session.mark_processed("m1", "[happy]"));
        assert!(!session.mark_processed("m1", "[happy]"));
        assert!(session.is_processed("m1", "[happy]"));
        assert!(!session.is_processed("m2", "[happy]"));

        session.clear_message("m1");
        assert!(!session.is_processed("m1", "[happy]"));
        assert_eq!(session.processed_count("m1"), 0);
    }

    #[test]
    fn later_issue_wins() {
        let session = TagSession::new();
        let first = session.next_sequence("m1");
        let second = session.next_sequence("m1");
        assert!(second > first);

        assert!(session.try_apply("m1", second));
        assert!(!session.try_apply("m1", first));
        assert_eq!(session.next_sequence("m2"), 1);
    }

    #[test]
    fn sequences_survive_a_restart() {
        let session = TagSession::new();
        let before = session.next_sequence("m1");
        assert!(session.try_apply("m1", before));
        let in_flight = session.next_sequence("m1");

        session.clear_message("m1");
        let after = session.next_sequence("m1");
        assert!(after > in_flight);

        // A swap issued before the restart is stale even if nothing newer landed yet.
        assert!(!session.try_apply("m1", in_flight));
        assert!(session.try_apply("m1", after));
    }

    #[test]
    fn forget_message_drops_everything() {
        let session = TagSession::new();
        session.mark_processed("m1", "[happy]");
        session.next_sequence("m1");
        session.forget_message("m1");
        assert_eq!(session.processed_count("m1"), 0);
        assert_eq!(session.next_sequence("m1"), 1);
    }
}
