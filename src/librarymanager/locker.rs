//! Sharded per-key lock.
//!
//! [`Locker`] serializes operations on the same library while letting
//! unrelated libraries proceed in parallel.  Entries are reference counted
//! and removed once the last holder releases its guard, so the internal map
//! does not grow with the set of keys ever seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    refs: usize,
}

/// A sharded mutex keyed by string, cheap to clone.
#[derive(Clone, Default)]
pub struct Locker {
    entries: Arc<StdMutex<HashMap<String, LockEntry>>>,
}

/// Guard returned by [`Locker::lock`].  Dropping it releases the key.
pub struct KeyGuard {
    entries: Arc<StdMutex<HashMap<String, LockEntry>>>,
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Locker {
    /// Initialize a new locker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for the given key, waiting for any current holder.
    ///
    /// The map bookkeeping takes a short internal mutex that is never held
    /// while waiting on the keyed lock itself.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut entries = self.entries.lock().expect("locker mutex poisoned");
            let entry = entries.entry(key.to_owned()).or_insert_with(|| LockEntry {
                mutex: Arc::new(AsyncMutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.mutex)
        };

        let permit = mutex.lock_owned().await;
        KeyGuard {
            entries: Arc::clone(&self.entries),
            key: key.to_owned(),
            permit: Some(permit),
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().expect("locker mutex poisoned").len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release the keyed mutex before touching the bookkeeping so a
        // waiter is never blocked on the map lock.
        drop(self.permit.take());

        let mut entries = self.entries.lock().expect("locker mutex poisoned");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
            }
        }
    }
}
