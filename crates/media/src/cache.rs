//! Derived-value slots keyed by the byte generation they were computed from.
//!
//! A resource bumps its generation whenever its raw bytes change. Values
//! stored under an older generation are treated as absent and dropped on the
//! next read, so a reader can never observe pixels from bytes that no longer
//! exist.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Entry<T> {
    generation: u64,
    value: T,
}

pub struct CacheSlot<T> {
    inner: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> CacheSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Entry<T>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `generation`, if one is present and fresh.
    pub fn get(&self, generation: u64) -> Option<T> {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(entry) if entry.generation == generation => Some(entry.value.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn store(&self, generation: u64, value: T) {
        *self.lock() = Some(Entry { generation, value });
    }

    /// Return the fresh value or compute, store and return a new one.
    ///
    /// The slot stays locked while `compute` runs, so concurrent readers of the
    /// same resource wait for one computation instead of racing.
    pub fn get_or_try_insert_with<E, F>(&self, generation: u64, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut slot = self.lock();
        if let Some(entry) = slot.as_ref()
            && entry.generation == generation
        {
            return Ok(entry.value.clone());
        }

        let value = compute()?;
        *slot = Some(Entry {
            generation,
            value: value.clone(),
        });
        Ok(value)
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_fresh(&self, generation: u64) -> bool {
        matches!(self.lock().as_ref(), Some(entry) if entry.generation == generation)
    }
}

impl<T: Clone> Default for CacheSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies the current entry into an independent slot.
impl<T: Clone> Clone for CacheSlot<T> {
    fn clone(&self) -> Self {
        let copy = self.lock().as_ref().map(|entry| Entry {
            generation: entry.generation,
            value: entry.value.clone(),
        });
        Self {
            inner: Mutex::new(copy),
        }
    }
}

impl<T> fmt::Debug for CacheSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|entry| entry.generation);
        f.debug_struct("CacheSlot")
            .field("generation", &generation)
            .finish()
    }
}
