//! One-time greeting tracking.
//!
//! Greeting state lives for the process lifetime only: a restart re-greets
//! everyone. Conversation memory, by contrast, is persisted; that asymmetry
//! matches the original relay and is intentional.

use dashmap::DashSet;

/// Set of users who already received the introduction this process
/// lifetime.
#[derive(Debug, Default)]
pub struct GreetingTracker {
    greeted: DashSet<String>,
}

impl GreetingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a user has already been greeted.
    pub fn has_greeted(&self, user_id: &str) -> bool {
        self.greeted.contains(user_id)
    }

    /// Mark a user greeted. Idempotent; returns true only on the first
    /// call for that user.
    pub fn mark_greeted(&self, user_id: &str) -> bool {
        self.greeted.insert(user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_idempotent() {
        let tracker = GreetingTracker::new();

        assert!(!tracker.has_greeted("a"));
        assert!(tracker.mark_greeted("a"));
        assert!(tracker.has_greeted("a"));

        // Marking again reports already-greeted
        assert!(!tracker.mark_greeted("a"));
        assert!(tracker.has_greeted("a"));
    }

    #[test]
    fn greeting_tracks_users_separately() {
        let tracker = GreetingTracker::new();
        tracker.mark_greeted("a");
        assert!(tracker.has_greeted("a"));
        assert!(!tracker.has_greeted("b"));
    }
}
