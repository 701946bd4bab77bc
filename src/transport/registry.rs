//! One active channel per agent instance.
//!
//! Registering a channel for an instance that already has one signals the
//! older channel to close. Each registration carries an id so that the
//! teardown of a superseded channel can tell it no longer owns the slot.
//! Opening and tearing down a channel for one instance are serialised by
//! a per-instance lifecycle lock.

use crate::agent::domain::{InstanceUid, OrgId};
use crate::opamp::Principal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as LifecycleLock, OwnedMutexGuard, oneshot};
use tracing::info;

type ChannelKey = (OrgId, InstanceUid);

struct Slot {
    id: u64,
    supersede: oneshot::Sender<()>,
}

/// Registered channel, held by the connection task.
#[derive(Debug)]
pub struct ChannelHandle {
    id: u64,
    superseded: oneshot::Receiver<()>,
}

impl ChannelHandle {
    /// Registration id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once a newer channel has taken the slot.
    pub async fn superseded(&mut self) {
        // A dropped sender means the slot was replaced too.
        let _signal = (&mut self.superseded).await;
    }
}

/// Tracks the live channel of every connected agent instance.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    slots: Arc<Mutex<HashMap<ChannelKey, Slot>>>,
    lifecycles: Arc<Mutex<HashMap<ChannelKey, Arc<LifecycleLock<()>>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the instance's lifecycle lock.
    ///
    /// Hold the guard across `open_session` and [`Self::register`], and
    /// across [`Self::unregister`] and `close_session`, so a closing channel
    /// never records a disconnect after a newer channel connected.
    pub async fn lock_lifecycle(&self, principal: &Principal) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .lifecycles
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key(principal)).or_default())
        };
        lock.lock_owned().await
    }

    /// Registers a channel, superseding any existing one for the same
    /// instance.
    #[must_use]
    pub fn register(&self, principal: &Principal) -> ChannelHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (supersede, superseded) = oneshot::channel();
        let previous = self
            .slots()
            .insert(key(principal), Slot { id, supersede });
        if let Some(old) = previous {
            info!(
                org_id = %principal.org_id,
                instance_uid = %principal.instance_uid,
                superseded = old.id,
                "newer connection supersedes the existing channel"
            );
            // The old task may already be gone.
            let _delivered = old.supersede.send(());
        }
        ChannelHandle { id, superseded }
    }

    /// Removes the channel if it still owns the slot.
    ///
    /// Returns `true` when it did, meaning the agent now has no channel.
    #[must_use]
    pub fn unregister(&self, principal: &Principal, handle: &ChannelHandle) -> bool {
        let mut slots = self.slots();
        let owner = key(principal);
        if slots.get(&owner).is_some_and(|slot| slot.id == handle.id) {
            slots.remove(&owner);
            true
        } else {
            false
        }
    }

    /// Returns `true` when the instance has a live channel.
    #[must_use]
    pub fn is_connected(&self, principal: &Principal) -> bool {
        self.slots().contains_key(&key(principal))
    }

    /// Number of live channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Returns `true` when no channel is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ChannelKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(principal: &Principal) -> ChannelKey {
    (principal.org_id, principal.instance_uid.clone())
}
