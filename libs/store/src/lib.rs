//! Transactional named keyed mappings.
//!
//! This library provides the durable-store primitives the fleet controller
//! runs on: a [`StateManager`] owning named maps, typed [`ReliableMap`]
//! handles, and [`Tx`] transactions with staged writes. Key concepts:
//!
//! - **Named maps**: `get_or_create` binds a name to a key/value type once;
//!   later lookups with a different type are rejected.
//! - **Staged writes**: mutations inside a transaction land in an overlay and
//!   only reach the map on commit. Dropping a transaction discards them.
//! - **Serializable isolation**: a transaction takes the map's lock on first
//!   touch and holds it until commit or abort, so transactions over the same
//!   map never interleave.
//!
//! # Invariants
//!
//! - Reads inside a transaction observe that transaction's own writes.
//! - An aborted transaction leaves the map exactly as it found it.
//! - Enumeration order is the key order, with the overlay applied.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An `add` hit a key that already exists.
    #[error("key already exists in map '{map}'")]
    DuplicateKey { map: String },

    /// A map name is bound to a different key/value type.
    #[error("map '{map}' exists with a different key/value type")]
    TypeMismatch { map: String },
}

/// Lock intent for reads.
///
/// The in-memory implementation serializes whole transactions per map, which
/// subsumes update locking; the mode is accepted so callers can state intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Default,
    Update,
}

/// Bounds required of map keys.
pub trait MapKey: Ord + Clone + Send + Sync + 'static {}
impl<T: Ord + Clone + Send + Sync + 'static> MapKey for T {}

/// Bounds required of map values.
pub trait MapValue: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> MapValue for T {}

// =============================================================================
// State manager
// =============================================================================

/// Owner of all named maps. One per process.
#[derive(Default)]
pub struct StateManager {
    maps: std::sync::Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a named map, creating it on first use.
    ///
    /// The first call binds the name to `(K, V)`; a later call with different
    /// types returns [`StoreError::TypeMismatch`].
    pub fn get_or_create<K: MapKey, V: MapValue>(
        &self,
        name: &str,
    ) -> Result<ReliableMap<K, V>, StoreError> {
        let mut maps = self.maps.lock().expect("state manager registry poisoned");
        let slot = maps
            .entry(name.to_string())
            .or_insert_with(|| Box::new(ReliableMap::<K, V>::new(name)));
        slot.downcast_ref::<ReliableMap<K, V>>()
            .cloned()
            .ok_or_else(|| StoreError::TypeMismatch {
                map: name.to_string(),
            })
    }

    /// Start a transaction. Maps are locked lazily as the transaction touches
    /// them; commit applies all staged writes, drop discards them.
    pub fn begin_transaction(&self) -> Tx {
        Tx {
            scopes: HashMap::new(),
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

trait TxScopeApply: Send {
    fn apply(&mut self) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TxScope<K: MapKey, V: MapValue> {
    guard: OwnedMutexGuard<BTreeMap<K, V>>,
    /// Staged operations: `Some` is an upsert, `None` a removal.
    staged: BTreeMap<K, Option<V>>,
}

impl<K: MapKey, V: MapValue> TxScopeApply for TxScope<K, V> {
    fn apply(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for (key, op) in staged {
            match op {
                Some(value) => {
                    self.guard.insert(key, value);
                }
                None => {
                    self.guard.remove(&key);
                }
            }
        }
        count
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A transaction over one or more maps.
///
/// Holds each touched map's lock until it is committed or dropped.
pub struct Tx {
    scopes: HashMap<String, Box<dyn TxScopeApply>>,
}

impl Tx {
    /// Apply all staged writes and release the locks.
    pub fn commit(mut self) -> Result<(), StoreError> {
        let mut written = 0;
        for scope in self.scopes.values_mut() {
            written += scope.apply();
        }
        debug!(maps = self.scopes.len(), written, "Transaction committed");
        Ok(())
    }

    /// Discard all staged writes and release the locks.
    ///
    /// Dropping the transaction has the same effect; this exists so call
    /// sites can abort explicitly.
    pub fn abort(self) {}
}

// =============================================================================
// Reliable map
// =============================================================================

/// Handle to a named map. Cheap to clone; all operations are scoped to a
/// [`Tx`] borrowed from the owning [`StateManager`].
#[derive(Debug)]
pub struct ReliableMap<K: MapKey, V: MapValue> {
    name: Arc<str>,
    inner: Arc<Mutex<BTreeMap<K, V>>>,
}

impl<K: MapKey, V: MapValue> Clone for ReliableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<K: MapKey, V: MapValue> ReliableMap<K, V> {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get or create this map's scope inside the transaction, taking the map
    /// lock on first touch.
    async fn scope<'t>(&self, tx: &'t mut Tx) -> Result<&'t mut TxScope<K, V>, StoreError> {
        let slot = match tx.scopes.entry(self.name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let guard = self.inner.clone().lock_owned().await;
                entry.insert(Box::new(TxScope {
                    guard,
                    staged: BTreeMap::new(),
                }))
            }
        };
        slot.as_any_mut()
            .downcast_mut::<TxScope<K, V>>()
            .ok_or_else(|| StoreError::TypeMismatch {
                map: self.name.to_string(),
            })
    }

    /// Read a value, observing the transaction's own staged writes.
    pub async fn try_get(
        &self,
        tx: &mut Tx,
        key: &K,
        _mode: LockMode,
    ) -> Result<Option<V>, StoreError> {
        let scope = self.scope(tx).await?;
        Ok(match scope.staged.get(key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => scope.guard.get(key).cloned(),
        })
    }

    /// Insert a new key; fails if the key is already present.
    pub async fn add(&self, tx: &mut Tx, key: K, value: V) -> Result<(), StoreError> {
        let name = self.name.clone();
        let scope = self.scope(tx).await?;
        let exists = match scope.staged.get(&key) {
            Some(Some(_)) => true,
            Some(None) => false,
            None => scope.guard.contains_key(&key),
        };
        if exists {
            return Err(StoreError::DuplicateKey {
                map: name.to_string(),
            });
        }
        scope.staged.insert(key, Some(value));
        Ok(())
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, tx: &mut Tx, key: K, value: V) -> Result<(), StoreError> {
        let scope = self.scope(tx).await?;
        scope.staged.insert(key, Some(value));
        Ok(())
    }

    /// Remove a key, returning its value if it was present.
    pub async fn try_remove(&self, tx: &mut Tx, key: &K) -> Result<Option<V>, StoreError> {
        let scope = self.scope(tx).await?;
        let existing = match scope.staged.get(key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => scope.guard.get(key).cloned(),
        };
        if existing.is_some() {
            scope.staged.insert(key.clone(), None);
        }
        Ok(existing)
    }

    /// Snapshot the map in key order, with the overlay applied.
    pub async fn enumerate(&self, tx: &mut Tx) -> Result<Vec<(K, V)>, StoreError> {
        let scope = self.scope(tx).await?;
        let mut merged: BTreeMap<K, V> = scope
            .guard
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, op) in &scope.staged {
            match op {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Number of entries visible to the transaction.
    pub async fn count(&self, tx: &mut Tx) -> Result<usize, StoreError> {
        Ok(self.enumerate(tx).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_map(manager: &StateManager) -> ReliableMap<u64, String> {
        let map = manager.get_or_create::<u64, String>("test").unwrap();
        let mut tx = manager.begin_transaction();
        map.add(&mut tx, 2, "two".to_string()).await.unwrap();
        map.add(&mut tx, 1, "one".to_string()).await.unwrap();
        tx.commit().unwrap();
        map
    }

    #[tokio::test]
    async fn test_commit_persists_and_abort_discards() {
        let manager = StateManager::new();
        let map = seeded_map(&manager).await;

        let mut tx = manager.begin_transaction();
        map.set(&mut tx, 3, "three".to_string()).await.unwrap();
        map.try_remove(&mut tx, &1).await.unwrap();
        tx.abort();

        let mut tx = manager.begin_transaction();
        assert_eq!(map.count(&mut tx).await.unwrap(), 2);
        assert_eq!(
            map.try_get(&mut tx, &1, LockMode::Default).await.unwrap(),
            Some("one".to_string())
        );
        map.set(&mut tx, 3, "three".to_string()).await.unwrap();
        tx.commit().unwrap();

        let mut tx = manager.begin_transaction();
        assert_eq!(map.count(&mut tx).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let manager = StateManager::new();
        let map = seeded_map(&manager).await;

        let mut tx = manager.begin_transaction();
        map.set(&mut tx, 9, "nine".to_string()).await.unwrap();
        assert_eq!(
            map.try_get(&mut tx, &9, LockMode::Update).await.unwrap(),
            Some("nine".to_string())
        );
        map.try_remove(&mut tx, &2).await.unwrap();
        assert_eq!(
            map.try_get(&mut tx, &2, LockMode::Default).await.unwrap(),
            None
        );
        tx.abort();
    }

    #[tokio::test]
    async fn test_add_duplicate_rejected() {
        let manager = StateManager::new();
        let map = seeded_map(&manager).await;

        let mut tx = manager.begin_transaction();
        let err = map.add(&mut tx, 1, "again".to_string()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        // Removing the key inside the same transaction frees it for add.
        map.try_remove(&mut tx, &1).await.unwrap();
        map.add(&mut tx, 1, "fresh".to_string()).await.unwrap();
        tx.commit().unwrap();
    }

    #[tokio::test]
    async fn test_enumerate_is_key_ordered_with_overlay() {
        let manager = StateManager::new();
        let map = seeded_map(&manager).await;

        let mut tx = manager.begin_transaction();
        map.add(&mut tx, 0, "zero".to_string()).await.unwrap();
        map.try_remove(&mut tx, &2).await.unwrap();
        let entries = map.enumerate(&mut tx).await.unwrap();
        let keys: Vec<u64> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1]);
        tx.abort();
    }

    #[tokio::test]
    async fn test_transactions_serialize() {
        let manager = Arc::new(StateManager::new());
        let map = seeded_map(&manager).await;

        let mut tx1 = manager.begin_transaction();
        map.set(&mut tx1, 10, "ten".to_string()).await.unwrap();

        // A second transaction must not observe tx1's staged write, and must
        // wait for tx1 to finish before touching the map.
        let map2 = map.clone();
        let manager2 = manager.clone();
        let reader = tokio::spawn(async move {
            let mut tx2 = manager2.begin_transaction();
            let value = map2.try_get(&mut tx2, &10, LockMode::Default).await.unwrap();
            tx2.abort();
            value
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx1.commit().unwrap();

        assert_eq!(reader.await.unwrap(), Some("ten".to_string()));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let manager = StateManager::new();
        manager.get_or_create::<u64, String>("typed").unwrap();
        let err = manager.get_or_create::<String, u64>("typed").unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }
}
