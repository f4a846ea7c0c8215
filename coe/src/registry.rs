//! Concurrent table of connected peers.
//!
//! The registry is the only state shared between connection tasks and the
//! operator loop. Every operation takes the lock, does a bounded amount of
//! work on the map and releases it before returning; nothing here holds the
//! lock across an `.await`, and callers never see the map itself.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::peer::{PeerHandle, PeerId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("peer {0} is already connected")]
    AlreadyRegistered(PeerId),
}

/// Maps peer ids to connection handles.
///
/// Lookups, snapshots and counts share a read lock; register and deregister
/// take the write lock, so a snapshot never observes a half-applied change.
#[derive(Debug)]
pub struct PeerRegistry<H = PeerHandle> {
    peers: RwLock<HashMap<PeerId, H>>,
}

impl<H> Default for PeerRegistry<H> {
    fn default() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: Clone> PeerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. An id that is already present is rejected and the
    /// existing entry is left untouched.
    pub fn register(&self, id: PeerId, handle: H) -> Result<(), RegistryError> {
        let mut peers = self.peers.write();
        if peers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        peers.insert(id, handle);
        Ok(())
    }

    /// Removes a peer, returning its handle. Absent ids are a no-op.
    pub fn deregister(&self, id: &PeerId) -> Option<H> {
        self.peers.write().remove(id)
    }

    pub fn lookup(&self, id: &PeerId) -> Option<H> {
        self.peers.read().get(id).cloned()
    }

    /// Point-in-time copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<(PeerId, H)> {
        let mut entries: Vec<(PeerId, H)> = self
            .peers
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl PeerRegistry<PeerHandle> {
    /// Signals every registered connection to close. Sessions deregister
    /// themselves as they wind down.
    pub fn close_all(&self) -> usize {
        let peers = self.peers.read();
        for handle in peers.values() {
            handle.close();
        }
        peers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn duplicate_registration_keeps_the_original_handle() {
        let registry = PeerRegistry::new();
        registry.register(PeerId::from("P1"), 1).expect("first registration");

        let err = registry
            .register(PeerId::from("P1"), 2)
            .expect_err("duplicate should be rejected");
        assert_eq!(err, RegistryError::AlreadyRegistered(PeerId::from("P1")));

        assert_eq!(registry.snapshot(), vec![(PeerId::from("P1"), 1)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = PeerRegistry::new();
        registry.register(PeerId::from("P1"), "a").expect("register");

        assert_eq!(registry.deregister(&PeerId::from("P1")), Some("a"));
        assert_eq!(registry.deregister(&PeerId::from("P1")), None);
        assert_eq!(registry.deregister(&PeerId::from("never")), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_misses_do_not_mutate() {
        let registry = PeerRegistry::new();
        registry.register(PeerId::from("10.0.0.1:5000"), 7).expect("register");

        assert_eq!(registry.lookup(&PeerId::from("9.9.9.9:1")), None);
        assert_eq!(registry.lookup(&PeerId::from("10.0.0.1:5000")), Some(7));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_detached() {
        let registry = PeerRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register(PeerId::from(id), id.to_string()).expect("register");
        }

        let snapshot = registry.snapshot();
        registry.deregister(&PeerId::from("a"));

        let ids: Vec<&str> = snapshot.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(registry.ids(), vec![PeerId::from("b"), PeerId::from("c")]);
    }

    #[test]
    fn concurrent_register_and_snapshot_stay_consistent() {
        let registry = Arc::new(PeerRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for n in 0..250 {
                        let id = PeerId::from(format!("{worker}-{n}"));
                        registry.register(id.clone(), n).expect("unique id");
                        if n % 2 == 0 {
                            registry.deregister(&id);
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = registry.snapshot();
                    let mut ids: Vec<_> = snapshot.iter().map(|(id, _)| id.clone()).collect();
                    ids.dedup();
                    assert_eq!(ids.len(), snapshot.len());
                }
            })
        };

        for writer in writers {
            writer.join().expect("writer thread");
        }
        reader.join().expect("reader thread");

        assert_eq!(registry.len(), 4 * 125);
    }

    #[tokio::test]
    async fn close_all_signals_every_handle() {
        let registry = PeerRegistry::new();
        let (a, _a_remote) = tokio::io::duplex(8);
        let (b, _b_remote) = tokio::io::duplex(8);
        let first = PeerHandle::new(a);
        let second = PeerHandle::new(b);
        registry.register(PeerId::from("a"), first.clone()).expect("register");
        registry.register(PeerId::from("b"), second.clone()).expect("register");

        assert_eq!(registry.close_all(), 2);
        assert!(first.is_closed());
        assert!(second.is_closed());
    }
}
