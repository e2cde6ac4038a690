//! Which users are looking at which conversation.

use std::collections::HashSet;
use std::sync::RwLock;

/// Shared registry of active viewers, fed by focus events.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewing: RwLock<HashSet<(String, String)>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_viewing(&self, user_id: &str, conversation_id: &str, viewing: bool) {
        let mut set = self.viewing.write().unwrap_or_else(|e| e.into_inner());
        let key = (user_id.to_string(), conversation_id.to_string());
        if viewing {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    pub fn is_viewing(&self, user_id: &str, conversation_id: &str) -> bool {
        let set = self.viewing.read().unwrap_or_else(|e| e.into_inner());
        set.contains(&(user_id.to_string(), conversation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_events() {
        let viewers = ViewerRegistry::new();
        assert!(!viewers.is_viewing("alice", "conv-1"));
        viewers.set_viewing("alice", "conv-1", true);
        assert!(viewers.is_viewing("alice", "conv-1"));
        assert!(!viewers.is_viewing("alice", "conv-2"));
        assert!(!viewers.is_viewing("bob", "conv-1"));
        viewers.set_viewing("alice", "conv-1", false);
        assert!(!viewers.is_viewing("alice", "conv-1"));
    }
}
