//! Thread → session identity, and the set of threads the relay listens to.

use dashmap::DashSet;
use uuid::Uuid;

/// Namespace for session IDs. Changing it re-keys every conversation.
const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0xa1b2c3d4_e5f6_7890_abcd_ef1234567890);

/// Map a chat thread ID to its automation session ID.
///
/// Name-based UUID (v5, SHA-1 over namespace + thread ID): the same thread
/// yields the same session across calls and restarts.
pub fn thread_to_session(thread_id: &str) -> String {
    Uuid::new_v5(&SESSION_NAMESPACE, thread_id.as_bytes()).to_string()
}

/// Threads where every message is treated as addressed to the relay.
///
/// In-memory only; a restart forgets them.
#[derive(Debug, Default)]
pub struct ActiveThreads {
    threads: DashSet<String>,
}

impl ActiveThreads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the thread was not active before.
    pub fn mark_active(&self, thread_id: &str) -> bool {
        let inserted = self.threads.insert(thread_id.to_string());
        if inserted {
            tracing::debug!("🧵 Thread {} is now active", thread_id);
        }
        inserted
    }

    pub fn is_active(&self, thread_id: &str) -> bool {
        self.threads.contains(thread_id)
    }

    /// Returns `true` if the thread was active.
    pub fn unmark(&self, thread_id: &str) -> bool {
        self.threads.remove(thread_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_session_id_is_deterministic() {
        let thread = "1234567890123456789";
        assert_eq!(thread_to_session(thread), thread_to_session(thread));
    }

    #[test]
    fn test_distinct_threads_get_distinct_sessions() {
        assert_ne!(
            thread_to_session("1234567890123456789"),
            thread_to_session("9876543210987654321")
        );
    }

    #[test]
    fn test_session_id_shape() {
        let id = thread_to_session("42");
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn test_mark_and_unmark() {
        let threads = ActiveThreads::new();
        assert!(!threads.is_active("t1"));
        assert!(threads.mark_active("t1"));
        assert!(!threads.mark_active("t1"));
        assert!(threads.is_active("t1"));
        assert!(threads.unmark("t1"));
        assert!(!threads.is_active("t1"));
        assert!(!threads.unmark("t1"));
    }

    #[test]
    fn test_concurrent_marking() {
        let threads = Arc::new(ActiveThreads::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let threads = threads.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        threads.mark_active(&format!("t{}", (i * 100 + j) % 250));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(threads.len(), 250);
    }
}
