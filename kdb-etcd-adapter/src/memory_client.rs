use crate::client::{CoordinationClient, RangeRequest};
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-process stand-in for an etcd cluster. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryCoordinationClient {
    inner: Arc<InMemoryCoordinationInner>,
}

#[derive(Default)]
struct InMemoryCoordinationInner {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: AtomicBool,
    // puts accepted before failing kicks in, when set
    puts_before_failure: Mutex<Option<usize>>,
    range_requests: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryCoordinationClient {
    pub fn new() -> InMemoryCoordinationClient {
        InMemoryCoordinationClient::default()
    }

    /// Makes every following request fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepts `puts` more puts, then fails every request.
    pub fn fail_after_puts(&self, puts: usize) {
        *self.inner.puts_before_failure.lock() = Some(puts);
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

    /// Number of range requests served so far.
    pub fn range_requests(&self) -> usize {
        self.inner.range_requests.load(Ordering::SeqCst)
    }

    pub fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.data.lock().get(key).cloned()
    }

    fn check(&self) -> KdbResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(KdbError::new("etcd client is closed", ErrorKind::StoreClosed));
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(KdbError::new("etcd is unavailable", ErrorKind::Backend));
        }
        Ok(())
    }
}

impl CoordinationClient for InMemoryCoordinationClient {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.inner.data.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> KdbResult<()> {
        self.check()?;
        {
            let mut remaining = self.inner.puts_before_failure.lock();
            match remaining.as_mut() {
                Some(0) => {
                    *remaining = None;
                    self.set_failing(true);
                    return Err(KdbError::new("etcd is unavailable", ErrorKind::Backend));
                }
                Some(left) => *left -= 1,
                None => {}
            }
        }
        self.inner
            .data
            .lock()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> KdbResult<()> {
        self.check()?;
        let mut data = self.inner.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn range(&self, request: &RangeRequest) -> KdbResult<Vec<(String, Vec<u8>)>> {
        self.check()?;
        self.inner.range_requests.fetch_add(1, Ordering::SeqCst);
        let data = self.inner.data.lock();
        let upper = match &request.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        if let Some(end) = &request.end {
            if end <= &request.start {
                return Ok(Vec::new());
            }
        }
        let page = data
            .range((Bound::Included(request.start.clone()), upper))
            .take(request.limit.max(1) as usize)
            .map(|(key, value)| {
                let value = if request.keys_only {
                    Vec::new()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect();
        Ok(page)
    }

    fn close(&self) -> KdbResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
