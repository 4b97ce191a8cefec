//! Active-session registry.
//!
//! Maps peer addresses to session ids. Ids are monotonic for the lifetime
//! of the server and never reused, so logs and events from different
//! sessions at the same address stay distinguishable.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Registry of live sessions, keyed by peer address.
pub struct SessionRegistry {
    inner: Mutex<HashMap<SocketAddr, u64>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a session for `peer`, returning its id.
    ///
    /// A peer that already had a session gets a fresh id; the old entry is
    /// superseded.
    pub fn register(&self, peer: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).insert(peer, id);
        id
    }

    /// Remove `peer`'s session if `id` still owns the slot.
    ///
    /// The id check stops a finished session from evicting the replacement
    /// that took over its address.
    pub fn remove(&self, peer: SocketAddr, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get(&peer) {
            Some(current) if *current == id => {
                inner.remove(&peer);
                true
            }
            _ => false,
        }
    }

    /// The session id registered for `peer`, if any.
    pub fn id_for(&self, peer: SocketAddr) -> Option<u64> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).get(&peer).copied()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
