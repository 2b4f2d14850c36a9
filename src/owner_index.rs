//! Bookkeeping of which plugin registered which capability.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::error::RegistrationError;

/// Identity of the plugin that registered a capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new owner id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Bidirectional key <-> owner mapping.
///
/// Not synchronized; the owning registry guards it with the same lock as its
/// entry map.
#[derive(Debug)]
pub struct CapabilityOwnerIndex<K> {
    owner_by_key: HashMap<K, OwnerId>,
    keys_by_owner: HashMap<OwnerId, HashSet<K>>,
}

impl<K> CapabilityOwnerIndex<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            owner_by_key: HashMap::new(),
            keys_by_owner: HashMap::new(),
        }
    }

    /// Associate `key` with `owner`.
    ///
    /// Fails with [`RegistrationError::DuplicateKey`] if the key belongs to a
    /// different owner, unless `replace` is set. A `None` owner marks the key
    /// as host-builtin: on a key that already has an owner this is a conflict
    /// like any other, and with `replace` it drops the previous association.
    pub fn record(
        &mut self,
        owner: Option<&OwnerId>,
        key: K,
        replace: bool,
    ) -> Result<(), RegistrationError> {
        if let Some(current) = self.owner_by_key.get(&key) {
            if Some(current) == owner {
                return Ok(());
            }
            if !replace {
                return Err(RegistrationError::DuplicateKey {
                    key: format!("{:?}", key),
                    owner: current.to_string(),
                });
            }
        }

        self.forget(&key);

        if let Some(owner) = owner {
            self.keys_by_owner
                .entry(owner.clone())
                .or_default()
                .insert(key.clone());
            self.owner_by_key.insert(key, owner.clone());
        }
        Ok(())
    }

    /// Keys currently recorded for `owner` (empty for unknown owners).
    pub fn keys_of(&self, owner: &OwnerId) -> HashSet<K> {
        self.keys_by_owner.get(owner).cloned().unwrap_or_default()
    }

    /// Owner of `key`, if any.
    pub fn owner_of(&self, key: &K) -> Option<&OwnerId> {
        self.owner_by_key.get(key)
    }

    /// Remove `key` from both directions.
    pub fn forget(&mut self, key: &K) {
        let Some(owner) = self.owner_by_key.remove(key) else {
            return;
        };
        if let Some(keys) = self.keys_by_owner.get_mut(&owner) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_owner.remove(&owner);
            }
        }
    }

    /// Owners with at least one recorded key.
    pub fn owners(&self) -> impl Iterator<Item = &OwnerId> {
        self.keys_by_owner.keys()
    }

    /// Number of owned keys.
    pub fn len(&self) -> usize {
        self.owner_by_key.len()
    }

    /// Check if no key has an owner.
    pub fn is_empty(&self) -> bool {
        self.owner_by_key.is_empty()
    }
}

impl<K> Default for CapabilityOwnerIndex<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut index = CapabilityOwnerIndex::new();
        let owner = OwnerId::new("plugin.a");

        index.record(Some(&owner), "one", false).unwrap();
        index.record(Some(&owner), "two", false).unwrap();

        assert_eq!(index.owner_of(&"one"), Some(&owner));
        assert_eq!(index.keys_of(&owner), HashSet::from(["one", "two"]));
        assert!(index.keys_of(&OwnerId::new("unknown")).is_empty());
    }

    #[test]
    fn test_duplicate_key_other_owner() {
        let mut index = CapabilityOwnerIndex::new();
        let a = OwnerId::new("plugin.a");
        let b = OwnerId::new("plugin.b");

        index.record(Some(&a), 1u32, false).unwrap();
        let err = index.record(Some(&b), 1u32, false).unwrap_err();

        assert!(matches!(err, RegistrationError::DuplicateKey { .. }));
        assert_eq!(index.owner_of(&1), Some(&a));

        // Same owner again is fine
        index.record(Some(&a), 1u32, false).unwrap();
    }

    #[test]
    fn test_replace_moves_key() {
        let mut index = CapabilityOwnerIndex::new();
        let a = OwnerId::new("plugin.a");
        let b = OwnerId::new("plugin.b");

        index.record(Some(&a), "k", false).unwrap();
        index.record(Some(&b), "k", true).unwrap();

        assert_eq!(index.owner_of(&"k"), Some(&b));
        assert!(index.keys_of(&a).is_empty());
        assert_eq!(index.owners().count(), 1);
    }

    #[test]
    fn test_forget() {
        let mut index = CapabilityOwnerIndex::new();
        let a = OwnerId::new("plugin.a");

        index.record(Some(&a), "k", false).unwrap();
        index.forget(&"k");
        index.forget(&"missing");

        assert!(index.owner_of(&"k").is_none());
        assert!(index.keys_of(&a).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_builtin_has_no_owner() {
        let mut index = CapabilityOwnerIndex::new();
        index.record(None, "builtin", false).unwrap();

        assert!(index.owner_of(&"builtin").is_none());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_builtin_record_on_owned_key_conflicts() {
        let mut index = CapabilityOwnerIndex::new();
        let a = OwnerId::new("plugin.a");
        index.record(Some(&a), "k", false).unwrap();

        let err = index.record(None, "k", false).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateKey {
                key: "\"k\"".into(),
                owner: "plugin.a".into(),
            }
        );
        assert_eq!(index.owner_of(&"k"), Some(&a));

        index.record(None, "k", true).unwrap();
        assert!(index.owner_of(&"k").is_none());
        assert!(index.keys_of(&a).is_empty());
    }
}
