use std::{collections::HashMap, sync::Arc};

use serde_json::{Map, Value};

/// Data fields handed to a callback.
pub type Payload = Map<String, Value>;

/// A registered callback.
pub type Callback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Lifecycle event kinds. Every other kind is matched against the `type`
/// of inbound envelopes.
pub mod events {
    /// Fired after a connection is established. Empty payload.
    pub const CONNECT: &str = "connect";
    /// Fired when an established connection ends. Empty payload.
    pub const DISCONNECT: &str = "disconnect";
    /// Connection failures and inbound `{"type": "error"}` envelopes.
    /// Payload carries a `message` field.
    pub const ERROR: &str = "error";
    /// Every well-formed inbound envelope, `type` included.
    pub const MESSAGE: &str = "message";

    /// Kinds the server is not allowed to trigger through an envelope `type`.
    pub(crate) fn is_reserved(kind: &str) -> bool {
        matches!(kind, CONNECT | DISCONNECT | MESSAGE)
    }
}

/// Token returned by [`crate::RealtimeChannel::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Event kind → ordered callbacks.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    by_kind: HashMap<String, Vec<(HandlerId, Callback)>>,
}

impl HandlerRegistry {
    pub(crate) fn add(&mut self, kind: &str, callback: Callback) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.by_kind
            .entry(kind.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove one registration. Returns `false` when `id` is not registered
    /// under `kind`.
    pub(crate) fn remove(&mut self, kind: &str, id: HandlerId) -> bool {
        let Some(list) = self.by_kind.get_mut(kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|(h, _)| *h == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.by_kind.remove(kind);
        }
        true
    }

    /// Clone the callbacks for `kind` so they can run without the lock held.
    pub(crate) fn snapshot(&self, kind: &str) -> Vec<Callback> {
        self.by_kind
            .get(kind)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.by_kind.get(kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn same_callback_twice_then_off_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cb: Callback = {
            let hits = Arc::clone(&hits);
            Arc::new(move |_: &Payload| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let mut reg = HandlerRegistry::default();
        let first = reg.add("price_update", Arc::clone(&cb));
        let _second = reg.add("price_update", Arc::clone(&cb));
        assert_eq!(reg.count("price_update"), 2);

        assert!(reg.remove("price_update", first));
        assert_eq!(reg.count("price_update"), 1);

        // Removing the same id again changes nothing.
        assert!(!reg.remove("price_update", first));
        assert_eq!(reg.count("price_update"), 1);

        for cb in reg.snapshot("price_update") {
            cb(&Payload::new());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_under_wrong_kind_is_ignored() {
        let mut reg = HandlerRegistry::default();
        let id = reg.add("status_update", Arc::new(|_: &Payload| {}));
        assert!(!reg.remove("location_update", id));
        assert_eq!(reg.count("status_update"), 1);
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        for n in 0..3 {
            let order = Arc::clone(&order);
            reg.add(
                "x",
                Arc::new(move |_: &Payload| {
                    order.lock().unwrap_or_else(|e| e.into_inner()).push(n);
                }),
            );
        }
        for cb in reg.snapshot("x") {
            cb(&Payload::new());
        }
        assert_eq!(*order.lock().unwrap_or_else(|e| e.into_inner()), vec![0, 1, 2]);
    }

    #[test]
    fn reserved_kinds() {
        assert!(events::is_reserved("connect"));
        assert!(events::is_reserved("message"));
        assert!(!events::is_reserved("error"));
        assert!(!events::is_reserved("price_update"));
    }
}
