use super::MemoryConfig;
use crate::common::{Context, HexKey, Kv, Limit, ReadOption, ReadOptions};
use crate::errors::{ErrorKind, KdbError, KdbResult};
use crate::store::{
    spawn_producer, BatchWriter, KvIterator, StagedWrites, StoreProvider, WriteBatch,
};
use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MEMORY_SCHEME: &str = "memory";

type OrderedMap = Arc<SkipMap<Vec<u8>, Vec<u8>>>;

/// In-process reference store over an ordered concurrent skip list.
///
/// Follows the same write discipline as the persistent adapters (staged puts
/// become visible on flush) and yields keys in byte order. Data lives as long
/// as the store is open.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> MemoryStore {
        MemoryStore {
            inner: Arc::new(MemoryStoreInner::new(config)),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Number of flushed entries.
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }
}

impl StoreProvider for MemoryStore {
    fn put(&self, ctx: &Context, key: &[u8], value: &[u8]) -> KdbResult<()> {
        self.inner.put(ctx, key, value)
    }

    fn get(&self, ctx: &Context, key: &[u8]) -> KdbResult<Vec<u8>> {
        self.inner.get(ctx, key)
    }

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()> {
        self.inner.delete(ctx, key)
    }

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()> {
        self.inner.batch_delete(ctx, keys)
    }

    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator {
        self.inner.batch_get(ctx, keys)
    }

    fn scan(
        &self,
        ctx: &Context,
        start: &[u8],
        exclusive_end: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator {
        self.inner.scan(ctx, start, exclusive_end, limit, options)
    }

    fn prefix(
        &self,
        ctx: &Context,
        prefix: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator {
        self.inner.prefix(ctx, prefix, limit, options)
    }

    fn flush_puts(&self, ctx: &Context) -> KdbResult<()> {
        self.inner.flush_puts(ctx)
    }

    fn close(&self) -> KdbResult<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        MEMORY_SCHEME
    }
}

struct MemoryStoreInner {
    data: OrderedMap,
    staged: StagedWrites,
    config: MemoryConfig,
    closed: AtomicBool,
}

impl MemoryStoreInner {
    fn new(config: MemoryConfig) -> MemoryStoreInner {
        MemoryStoreInner {
            data: Arc::new(SkipMap::new()),
            staged: StagedWrites::new(config.batch_limits()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self, ctx: &Context) -> KdbResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(KdbError::new("memory store is closed", ErrorKind::StoreClosed));
        }
        ctx.check()
    }

    fn put(&self, ctx: &Context, key: &[u8], value: &[u8]) -> KdbResult<()> {
        self.ensure_open(ctx)?;
        self.staged.stage(Kv::new(key, value), self)
    }

    fn get(&self, ctx: &Context, key: &[u8]) -> KdbResult<Vec<u8>> {
        self.ensure_open(ctx)?;
        match self.data.get(key) {
            Some(entry) => Ok(entry.value().clone()),
            None => Err(KdbError::not_found(key)),
        }
    }

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()> {
        self.ensure_open(ctx)?;
        log::debug!("deleting key {}", HexKey(key));
        self.data.remove(key);
        Ok(())
    }

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()> {
        self.ensure_open(ctx)?;
        for key in keys {
            ctx.check()?;
            self.data.remove(key);
        }
        Ok(())
    }

    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator {
        if let Err(err) = self.ensure_open(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let data = self.data.clone();
        let keys = keys.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-memory-batch-get", move |producer| {
            for key in keys {
                let value = match data.get(&key) {
                    Some(entry) => entry.value().clone(),
                    None => return Err(KdbError::not_found(&key)),
                };
                if !producer.push_item(Kv::new(key, value)) {
                    break;
                }
            }
            Ok(())
        })
    }

    fn scan(
        &self,
        ctx: &Context,
        start: &[u8],
        exclusive_end: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator {
        if let Err(err) = self.ensure_open(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let options = ReadOptions::from_options(options);
        log::debug!(
            "scanning [{}, {}) limit {} {}",
            HexKey(start),
            HexKey(exclusive_end),
            limit,
            options
        );

        let data = self.data.clone();
        let start = start.to_vec();
        let end = exclusive_end.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-memory-scan", move |producer| {
            if end <= start {
                return Ok(());
            }
            let mut count = 0u64;
            for entry in data.range(start..end) {
                if !producer.push_item(to_kv(entry.key(), entry.value(), &options)) {
                    break;
                }
                count += 1;
                if limit.reached(count) {
                    break;
                }
            }
            Ok(())
        })
    }

    fn prefix(
        &self,
        ctx: &Context,
        prefix: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator {
        if let Err(err) = self.ensure_open(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let options = ReadOptions::from_options(options);
        log::debug!("prefix scan {} limit {} {}", HexKey(prefix), limit, options);

        let data = self.data.clone();
        let prefix = prefix.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-memory-prefix", move |producer| {
            let mut count = 0u64;
            for entry in data.range(prefix.clone()..) {
                if !entry.key().starts_with(&prefix) {
                    break;
                }
                if !producer.push_item(to_kv(entry.key(), entry.value(), &options)) {
                    break;
                }
                count += 1;
                if limit.reached(count) {
                    break;
                }
            }
            Ok(())
        })
    }

    fn flush_puts(&self, ctx: &Context) -> KdbResult<()> {
        self.ensure_open(ctx)?;
        self.staged.flush(self)
    }

    fn close(&self) -> KdbResult<()> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        let flushed = self.staged.close(self);
        if let Err(err) = &flushed {
            log::error!("Failed to flush staged writes while closing memory store: {}", err);
        }
        self.data.clear();
        flushed
    }
}

impl BatchWriter for MemoryStoreInner {
    fn write_batch(&self, batch: &mut WriteBatch) -> KdbResult<()> {
        batch
            .commit_all(|entries| {
                for kv in entries {
                    self.data.insert(kv.key.clone(), kv.value.clone());
                }
                Ok(())
            })
            .map(|_| ())
    }
}

fn to_kv(key: &[u8], value: &[u8], options: &ReadOptions) -> Kv {
    if options.key_only {
        Kv::key_only(key)
    } else {
        Kv::new(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BatchLimits, IteratorState, DEFAULT_MAX_BATCH_BYTES};

    fn create_store() -> MemoryStore {
        MemoryStore::new(MemoryConfig::new())
    }

    fn load(store: &MemoryStore, ctx: &Context, keys: &[&str]) {
        for key in keys {
            store
                .put(ctx, key.as_bytes(), format!("v-{}", key).as_bytes())
                .unwrap();
        }
        store.flush_puts(ctx).unwrap();
    }

    fn keys_of(items: &[Kv]) -> Vec<String> {
        items
            .iter()
            .map(|kv| String::from_utf8(kv.key.clone()).unwrap())
            .collect()
    }

    #[test]
    fn put_is_invisible_until_flush() {
        let store = create_store();
        let ctx = Context::background();
        store.put(&ctx, b"key1", b"value1").unwrap();
        assert!(store.get(&ctx, b"key1").unwrap_err().is_not_found());

        store.flush_puts(&ctx).unwrap();
        assert_eq!(store.get(&ctx, b"key1").unwrap(), b"value1".to_vec());
    }

    #[test]
    fn empty_value_round_trips() {
        let store = create_store();
        let ctx = Context::background();
        store.put(&ctx, b"key", b"").unwrap();
        store.flush_puts(&ctx).unwrap();
        assert!(store.get(&ctx, b"key").unwrap().is_empty());
    }

    #[test]
    fn auto_flush_at_batch_size() {
        let mut config = MemoryConfig::new();
        config.set_batch_limits(BatchLimits::new(3, DEFAULT_MAX_BATCH_BYTES));
        let store = MemoryStore::new(config);
        let ctx = Context::background();
        for key in ["a", "b"] {
            store.put(&ctx, key.as_bytes(), b"v").unwrap();
        }
        assert!(store.is_empty());
        store.put(&ctx, b"c", b"v").unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn delete_removes_key() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2"]);
        store.delete(&ctx, b"key1").unwrap();
        assert!(store.get(&ctx, b"key1").unwrap_err().is_not_found());
        assert!(store.get(&ctx, b"key2").is_ok());
        // deleting a missing key is not an error
        store.delete(&ctx, b"missing").unwrap();
    }

    #[test]
    fn batch_delete_removes_keys() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2", "key3"]);
        store
            .batch_delete(&ctx, &[b"key1".to_vec(), b"key3".to_vec()])
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_get_yields_in_request_order() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2", "key3"]);
        let items = store
            .batch_get(&ctx, &[b"key3".to_vec(), b"key1".to_vec()])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["key3", "key1"]);
        assert_eq!(items[0].value, b"v-key3".to_vec());
    }

    #[test]
    fn batch_get_fails_on_missing_key() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["key1"]);
        let mut iter = store.batch_get(&ctx, &[b"key1".to_vec(), b"nope".to_vec()]);
        while iter.next() {}
        assert_eq!(iter.state(), IteratorState::Failed);
        assert!(iter.err().unwrap().is_not_found());
    }

    #[test]
    fn scan_is_half_open_and_ordered() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["c", "a", "d", "b"]);
        let items = store
            .scan(&ctx, b"a", b"d", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn scan_with_inverted_range_is_empty() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["a", "b"]);
        let items = store
            .scan(&ctx, b"b", b"a", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn scan_honours_limit_and_key_only() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["a", "b", "c", "d"]);
        let items = store
            .scan(&ctx, b"a", b"z", Limit::new(2), &[ReadOption::KeyOnly])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["a", "b"]);
        assert!(items.iter().all(|kv| kv.value.is_empty()));
    }

    #[test]
    fn prefix_stops_at_prefix_boundary() {
        let store = create_store();
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2", "key3", "kez", "other"]);
        let items = store
            .prefix(&ctx, b"key", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["key1", "key2", "key3"]);
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = create_store();
        let ctx = Context::background();
        store.put(&ctx, b"key", b"value").unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert_eq!(
            store.put(&ctx, b"k", b"v").unwrap_err().kind(),
            &ErrorKind::StoreClosed
        );
        let err = store
            .prefix(&ctx, b"k", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreClosed);
        // closing twice is a no-op
        store.close().unwrap();
    }

    #[test]
    fn cancelled_context_fails_point_operations() {
        let store = create_store();
        let ctx = Context::background();
        ctx.cancel();
        assert_eq!(
            store.get(&ctx, b"key").unwrap_err().kind(),
            &ErrorKind::Cancelled
        );
    }
}
