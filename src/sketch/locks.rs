use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes uploads per serial port. Two requests flashing the same board
/// queue up; different ports proceed in parallel.
///
/// Entries are never evicted; the map grows with the number of distinct
/// ports ever flashed.
#[derive(Debug, Default, Clone)]
pub struct PortLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl PortLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `port`. Released when the guard drops.
    pub async fn acquire(&self, port: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(port.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
