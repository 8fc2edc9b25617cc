use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::oneshot;

use kiosk_core::CallbackId;

/// One outstanding request awaiting a correlated reply.
struct Pending {
    tx: oneshot::Sender<serde_json::Value>,
    created_at: Instant,
}

/// Correlation table for request/callback round trips.
///
/// Ids are unique for the coordinator's lifetime: a monotonic counter plus
/// a random hex suffix. An entry resolves at most once; expiry drops the
/// resolver, so the awaiting caller observes "no response" instead of
/// hanging, and a late reply after expiry is ignored.
pub struct CallbackTable {
    pending: HashMap<CallbackId, Pending>,
    counter: u64,
    ttl: Duration,
}

impl CallbackTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            counter: 0,
            ttl,
        }
    }

    /// Register a new pending callback; the receiver completes on a matching
    /// reply and errs (sender dropped) when the entry expires.
    pub fn begin(&mut self) -> (CallbackId, oneshot::Receiver<serde_json::Value>) {
        self.counter += 1;
        let suffix: u16 = rand::thread_rng().gen();
        let id = CallbackId::from_raw(format!("cb_{}_{:04x}", self.counter, suffix));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            Pending {
                tx,
                created_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Resolve a reply. Returns false for unknown or already-expired ids.
    pub fn resolve(&mut self, id: &CallbackId, data: serde_json::Value) -> bool {
        match self.pending.remove(id) {
            Some(pending) => pending.tx.send(data).is_ok(),
            None => false,
        }
    }

    /// Drop entries older than the configured timeout. Returns how many.
    pub fn sweep(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.pending.len();
        self.pending.retain(|_, p| p.created_at.elapsed() < ttl);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic_prefixed() {
        let mut table = CallbackTable::new(Duration::from_secs(10));
        let (a, _rx_a) = table.begin();
        let (b, _rx_b) = table.begin();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("cb_1_"), "got: {a}");
        assert!(b.as_str().starts_with("cb_2_"), "got: {b}");
    }

    #[test]
    fn resolve_delivers_to_waiter() {
        let mut table = CallbackTable::new(Duration::from_secs(10));
        let (id, mut rx) = table.begin();

        assert!(table.resolve(&id, serde_json::json!({"success": true})));
        assert_eq!(rx.try_recv().unwrap()["success"], true);
        assert!(table.is_empty());
    }

    #[test]
    fn resolve_unknown_id_is_false() {
        let mut table = CallbackTable::new(Duration::from_secs(10));
        assert!(!table.resolve(&CallbackId::from_raw("cb_0_dead"), serde_json::json!({})));
    }

    #[test]
    fn sweep_expires_stale_entries_and_blocks_late_reply() {
        let mut table = CallbackTable::new(Duration::ZERO);
        let (id, mut rx) = table.begin();

        assert_eq!(table.sweep(), 1);
        assert!(table.is_empty());
        // Awaiting caller sees "no response", not a hang.
        assert!(rx.try_recv().is_err());
        // Late reply after expiry does not resolve a second time.
        assert!(!table.resolve(&id, serde_json::json!({"late": true})));
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let mut table = CallbackTable::new(Duration::from_secs(60));
        let (_id, _rx) = table.begin();
        assert_eq!(table.sweep(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_resolves_at_most_once() {
        let mut table = CallbackTable::new(Duration::from_secs(10));
        let (id, mut rx) = table.begin();

        assert!(table.resolve(&id, serde_json::json!(1)));
        assert!(!table.resolve(&id, serde_json::json!(2)));
        assert_eq!(rx.try_recv().unwrap(), serde_json::json!(1));
    }
}
