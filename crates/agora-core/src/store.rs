//! TTL key-value capability backing the idempotency set and the lock table.
//!
//! The in-memory implementation stands in for a distributed cache
//! (`SET NX PX`) or a unique-constrained table. Reads always check expiry,
//! so an expired entry is invisible even before a sweep removes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;

/// Atomic TTL operations over string keys.
///
/// Every method is atomic with respect to the others, which is what makes
/// `put_if_absent` usable as an allocation lock across shards.
pub trait KeyValueStore: Send + Sync {
    /// Insertion time of a live entry, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn get_if_present(&self, key: &str, now: DateTime<Utc>)
    -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Insert or refresh an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn put(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Result<(), StoreError>;

    /// Insert only when no live entry exists. Returns `true` on insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn put_if_absent(&self, key: &str, now: DateTime<Utc>, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Remove an entry immediately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn expire(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every entry that has expired by `now`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Number of stored entries, including expired ones not yet swept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn len(&self) -> Result<usize, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get_if_present(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).get_if_present(key, now)
    }

    fn put(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Result<(), StoreError> {
        (**self).put(key, now, ttl)
    }

    fn put_if_absent(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).put_if_absent(key, now, ttl)
    }

    fn expire(&self, key: &str) -> Result<(), StoreError> {
        (**self).expire(key)
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).sweep(now)
    }

    fn len(&self) -> Result<usize, StoreError> {
        (**self).len()
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    inserted_at: DateTime<Utc>,
    /// `None` when the TTL overflows the calendar; such entries never expire.
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            inserted_at: now,
            expires_at: now.checked_add_signed(ttl),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now <= expires_at)
    }
}

/// Process-local store guarded by a mutex.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the guard cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryStore {
    fn get_if_present(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.inserted_at))
    }

    fn put(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), Entry::new(now, ttl));
        Ok(())
    }

    fn put_if_absent(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(now, ttl));
        Ok(true)
    }

    fn expire(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries().len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries().clear();
        Ok(())
    }
}
