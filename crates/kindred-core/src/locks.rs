use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-entity async mutexes keyed by id. The lifecycle service takes the
/// post lock before touching status or claims; the ledger takes the user
/// lock inside `award_points`. Post locks are always acquired before user
/// locks, and multiple user locks in ascending id order, so the two maps
/// cannot deadlock against each other.
#[derive(Default)]
pub struct EntityLocks {
    inner: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("lock map poisoned");
        map.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_id_yields_same_mutex() {
        let locks = EntityLocks::new();
        let id = Uuid::new_v4();
        let first = locks.lock_for(id);
        let second = locks.lock_for(id);
        assert!(Arc::ptr_eq(&first, &second));

        let other = locks.lock_for(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn guard_serializes_access() {
        let locks = Arc::new(EntityLocks::new());
        let id = Uuid::new_v4();
        let counter = Arc::new(StdMutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.lock_for(id);
                let _guard = lock.lock().await;
                let mut value = counter.lock().unwrap();
                *value += 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}
