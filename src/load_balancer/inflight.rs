use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key lock so concurrent identical requests run one at a time.
///
/// The first caller for a key proceeds; later callers wait until it
/// finishes, then re-check the cache before doing any work themselves.
#[derive(Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, FlightSlot>>,
}

struct FlightSlot {
    lock: Arc<AsyncMutex<()>>,
    /// Holder plus waiters, counted under the map lock
    users: usize,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`
    ///
    /// Dropping the returned future before it resolves gives up the place
    /// in line and releases the key if nobody else is using it.
    pub async fn acquire(&self, key: &str) -> FlightGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = locks.entry(key.to_string()).or_insert_with(|| FlightSlot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            slot.lock.clone()
        };
        let ticket = Ticket {
            owner: self,
            key: key.to_string(),
        };
        let guard = lock.lock_owned().await;
        FlightGuard { _guard: guard, _ticket: ticket }
    }

    /// Keys with a holder or waiters
    pub fn in_flight(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = locks.get_mut(key) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(key);
            }
        }
    }
}

/// One caller's claim on a key, held while waiting and while running
struct Ticket<'a> {
    owner: &'a SingleFlight,
    key: String,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.owner.release(&self.key);
    }
}

/// Exclusive use of a key. Fields drop in order, so the lock is released before the key.
pub struct FlightGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<'a>,
}
