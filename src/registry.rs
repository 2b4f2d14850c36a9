//! Extension registry for plugin-contributed capabilities.
//!
//! Plugins register capabilities under a lookup key, tagged with their owner
//! id. When a plugin unloads, every capability it owns is removed in one step
//! and the removal observers fire before the call returns.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RegistrationError;
use crate::owner_index::{CapabilityOwnerIndex, OwnerId};

/// Receives removal notifications from an [`ExtensionRegistry`].
pub trait RemovalObserver<K, C: ?Sized>: Send + Sync {
    /// Called once per removed capability while the registry is still locked
    /// for writing. Must not call back into the registry.
    fn removed(&self, key: &K, capability: &Arc<C>);

    /// Called once per removing call, after the lock is released and before
    /// the call returns.
    fn settled(&self) {}
}

impl<K, C, F> RemovalObserver<K, C> for F
where
    C: ?Sized,
    F: Fn(&K, &Arc<C>) + Send + Sync,
{
    fn removed(&self, key: &K, capability: &Arc<C>) {
        self(key, capability)
    }
}

/// Handle for detaching an observer with [`ExtensionRegistry::remove_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observers<K, C> = Vec<(ObserverId, Arc<dyn RemovalObserver<K, C>>)>;

/// Thread-safe capability registry.
pub struct ExtensionRegistry<K, C: ?Sized> {
    inner: RwLock<Inner<K, C>>,
    observers: RwLock<Observers<K, C>>,
    next_observer: AtomicU64,
}

struct Inner<K, C: ?Sized> {
    entries: HashMap<K, RegisteredCapability<C>>,
    owners: CapabilityOwnerIndex<K>,
    next_seq: u64,
}

struct RegisteredCapability<C: ?Sized> {
    capability: Arc<C>,
    /// Registration order
    seq: u64,
}

impl<K, C> ExtensionRegistry<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: ?Sized,
{
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                owners: CapabilityOwnerIndex::new(),
                next_seq: 0,
            }),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(0),
        }
    }

    // The maps are only mutated through complete operations, so a panic in
    // another thread cannot leave them half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Inner<K, C>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, C>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a removal observer closure, called under the write lock for each
    /// removed capability. It must not call back into the registry.
    pub fn on_removed<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&K, &Arc<C>) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(observer))
    }

    /// Add a two-phase removal observer.
    pub fn add_observer(&self, observer: Arc<dyn RemovalObserver<K, C>>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Detach an observer. Unknown ids are ignored.
    pub fn remove_observer(&self, id: ObserverId) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer_id, _)| *observer_id != id);
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Observers are called from a copy of the list so that one of them may be
    // detached (e.g. by a dropped selector) while notifications run.
    fn observers_snapshot(&self) -> Vec<Arc<dyn RemovalObserver<K, C>>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    /// Register a capability.
    /// Returns error if the key is already registered.
    pub fn register(
        &self,
        key: K,
        capability: Arc<C>,
        owner: Option<OwnerId>,
    ) -> Result<(), RegistrationError> {
        let mut inner = self.write();

        if inner.entries.contains_key(&key) {
            tracing::debug!("Capability {:?} already registered, rejecting", key);
            return Err(RegistrationError::AlreadyRegistered(format!("{:?}", key)));
        }

        inner.owners.record(owner.as_ref(), key.clone(), false)?;

        match &owner {
            Some(owner) => tracing::info!("Registered capability: {:?} from {}", key, owner),
            None => tracing::info!("Registered builtin capability: {:?}", key),
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .entries
            .insert(key, RegisteredCapability { capability, seq });
        Ok(())
    }

    /// Unregister a capability, returning it if it was present.
    pub fn unregister(&self, key: &K) -> Option<Arc<C>> {
        let observers = self.observers_snapshot();

        let removed = {
            let mut inner = self.write();
            let removed = inner.entries.remove(key)?.capability;
            inner.owners.forget(key);

            tracing::info!("Unregistered capability: {:?}", key);
            for observer in &observers {
                observer.removed(key, &removed);
            }
            removed
        };

        for observer in &observers {
            observer.settled();
        }
        Some(removed)
    }

    /// Unregister every capability owned by `owner`.
    ///
    /// The owner's key set is snapshotted and removed under one write lock.
    /// Unknown owners are a no-op.
    pub fn unregister_all(&self, owner: &OwnerId) -> Vec<(K, Arc<C>)> {
        let observers = self.observers_snapshot();

        let removed = {
            let mut inner = self.write();
            let keys = inner.owners.keys_of(owner);

            let mut removed = Vec::with_capacity(keys.len());
            for key in keys {
                inner.owners.forget(&key);
                if let Some(entry) = inner.entries.remove(&key) {
                    tracing::info!("Unregistered capability: {:?} from {}", key, owner);
                    removed.push((key, entry.capability));
                }
            }

            for (key, capability) in &removed {
                for observer in &observers {
                    observer.removed(key, capability);
                }
            }
            removed
        };

        if !removed.is_empty() {
            for observer in &observers {
                observer.settled();
            }
        }
        removed
    }

    /// Lookup a capability by key.
    pub fn lookup(&self, key: &K) -> Option<Arc<C>> {
        self.read()
            .entries
            .get(key)
            .map(|entry| entry.capability.clone())
    }

    /// Run `f` with the lookup result while holding the read lock.
    ///
    /// No removal can complete while `f` runs.
    pub fn with_lookup<R>(&self, key: &K, f: impl FnOnce(Option<&Arc<C>>) -> R) -> R {
        let inner = self.read();
        f(inner.entries.get(key).map(|entry| &entry.capability))
    }

    /// Check if a key is registered.
    pub fn contains(&self, key: &K) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Snapshot of the capabilities matching `predicate`, oldest
    /// registration first.
    ///
    /// Later mutations are not reflected in the returned iterator.
    pub fn all<P>(&self, predicate: P) -> impl Iterator<Item = (K, Arc<C>)>
    where
        P: Fn(&K, &C) -> bool,
    {
        let mut snapshot: Vec<(u64, K, Arc<C>)> = self
            .read()
            .entries
            .iter()
            .filter(|&(k, entry)| predicate(k, &*entry.capability))
            .map(|(k, entry)| (entry.seq, k.clone(), entry.capability.clone()))
            .collect();
        snapshot.sort_by_key(|(seq, _, _)| *seq);
        snapshot.into_iter().map(|(_, k, c)| (k, c))
    }

    /// List all registered keys.
    pub fn keys(&self) -> Vec<K> {
        self.read().entries.keys().cloned().collect()
    }

    /// Owner of a registered key.
    pub fn owner_of(&self, key: &K) -> Option<OwnerId> {
        self.read().owners.owner_of(key).cloned()
    }

    /// Keys registered by `owner`.
    pub fn keys_of(&self, owner: &OwnerId) -> HashSet<K> {
        self.read().owners.keys_of(owner)
    }

    /// Get the number of registered capabilities.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, C> Default for ExtensionRegistry<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}
