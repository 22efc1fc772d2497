use crate::client::CacheClient;
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-process stand-in for a redis server.
///
/// Cursors are positions in the sorted key space, and `count` bounds the keys
/// examined per round the way redis does. Only `prefix*` and exact patterns
/// are understood. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryCacheClient {
    inner: Arc<InMemoryCacheInner>,
}

#[derive(Default)]
struct InMemoryCacheInner {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryCacheClient {
    pub fn new() -> InMemoryCacheClient {
        InMemoryCacheClient::default()
    }

    /// Makes every following command fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.lock().is_empty()
    }

    /// The stored payload under an encoded key.
    pub fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.data.lock().get(key).cloned()
    }

    /// Stores a payload under an arbitrary key, bypassing the store.
    pub fn raw_set(&self, key: &str, value: &[u8]) {
        self.inner.data.lock().insert(key.to_string(), value.to_vec());
    }

    fn check(&self) -> KdbResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(KdbError::new("redis connection is closed", ErrorKind::StoreClosed));
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(KdbError::new("redis is unavailable", ErrorKind::Backend));
        }
        Ok(())
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl CacheClient for InMemoryCacheClient {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.inner.data.lock().get(key).cloned())
    }

    fn mget(&self, keys: &[String]) -> KdbResult<Vec<Option<Vec<u8>>>> {
        self.check()?;
        let data = self.inner.data.lock();
        Ok(keys.iter().map(|key| data.get(key).cloned()).collect())
    }

    fn set_all(&self, entries: &[(String, Vec<u8>)]) -> KdbResult<()> {
        self.check()?;
        let mut data = self.inner.data.lock();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn del(&self, keys: &[String]) -> KdbResult<()> {
        self.check()?;
        let mut data = self.inner.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KdbResult<(u64, Vec<String>)> {
        self.check()?;
        let data = self.inner.data.lock();
        let start = cursor as usize;
        let examined: Vec<&String> = data.keys().skip(start).take(count.max(1)).collect();
        let next = start + examined.len();
        let keys = examined
            .into_iter()
            .filter(|key| matches(pattern, key))
            .cloned()
            .collect();
        let next = if next >= data.len() { 0 } else { next as u64 };
        Ok((next, keys))
    }

    fn close(&self) -> KdbResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
