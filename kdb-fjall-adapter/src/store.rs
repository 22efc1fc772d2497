use crate::config::{FjallConfig, FJALL_SCHEME};
use crate::wrapper::to_kdb_error;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use kdb::common::{Context, HexKey, Kv, Limit, ReadOption, ReadOptions};
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use kdb::store::{
    spawn_producer, BatchWriter, KvIterator, StagedWrites, StoreProvider, WriteBatch,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A persistent key-value store over a single fjall partition.
///
/// Keys are stored as-is, so scans and prefix reads come back in byte order.
/// Staged puts are committed through one atomic fjall batch per flush, and
/// the journal is synced to disk on close.
#[derive(Clone)]
pub struct FjallStore {
    inner: Arc<FjallStoreInner>,
}

impl FjallStore {
    /// Opens (or creates) the keyspace at the configured path.
    pub fn open(config: FjallConfig) -> KdbResult<FjallStore> {
        Ok(FjallStore {
            inner: Arc::new(FjallStoreInner::open(config)?),
        })
    }

    #[inline]
    pub fn config(&self) -> &FjallConfig {
        &self.inner.config
    }

    /// Number of staged puts not yet flushed.
    #[inline]
    pub fn pending_puts(&self) -> usize {
        self.inner.staged.len()
    }
}

impl StoreProvider for FjallStore {
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
        FJALL_SCHEME
    }
}

struct FjallStoreInner {
    config: FjallConfig,
    keyspace: Keyspace,
    partition: PartitionHandle,
    staged: StagedWrites,
    closed: AtomicBool,
}

impl FjallStoreInner {
    fn open(config: FjallConfig) -> KdbResult<FjallStoreInner> {
        let keyspace = match Keyspace::open(config.keyspace_config()) {
            Ok(keyspace) => keyspace,
            Err(err) => {
                log::error!("Failed to open fjall keyspace at {}: {}", config.db_path(), err);
                return Err(to_kdb_error("open keyspace", err));
            }
        };
        let partition = match keyspace.open_partition(config.partition(), config.partition_config())
        {
            Ok(partition) => partition,
            Err(err) => {
                log::error!("Failed to open fjall partition {}: {}", config.partition(), err);
                return Err(to_kdb_error("open partition", err));
            }
        };
        log::debug!(
            "opened fjall store at {} (partition {})",
            config.db_path(),
            config.partition()
        );

        Ok(FjallStoreInner {
            staged: StagedWrites::new(config.batch_limits()),
            config,
            keyspace,
            partition,
            closed: AtomicBool::new(false),
        })
    }

    fn check_opened(&self, ctx: &Context) -> KdbResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(KdbError::new("fjall store is closed", ErrorKind::StoreClosed));
        }
        ctx.check()
    }

    fn put(&self, ctx: &Context, key: &[u8], value: &[u8]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        self.staged.stage(Kv::new(key, value), self)
    }

    fn get(&self, ctx: &Context, key: &[u8]) -> KdbResult<Vec<u8>> {
        self.check_opened(ctx)?;
        match self.partition.get(key) {
            Ok(Some(value)) => Ok(value.to_vec()),
            Ok(None) => Err(KdbError::not_found(key)),
            Err(err) => {
                log::error!("Failed to get key {} from fjall: {}", HexKey(key), err);
                Err(to_kdb_error("get", err))
            }
        }
    }

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        if let Err(err) = self.partition.remove(key) {
            log::error!("Failed to delete key {} from fjall: {}", HexKey(key), err);
            return Err(to_kdb_error("delete", err));
        }
        Ok(())
    }

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = self.keyspace.batch();
        for key in keys {
            batch.remove(&self.partition, key.as_slice());
        }
        batch.commit().map_err(|err| {
            log::error!("Failed to delete {} keys from fjall: {}", keys.len(), err);
            to_kdb_error("batch delete", err)
        })
    }

    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator {
        if let Err(err) = self.check_opened(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let partition = self.partition.clone();
        let keys = keys.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-fjall-batch-get", move |producer| {
            for key in keys {
                let value = match partition.get(&key) {
                    Ok(Some(value)) => value.to_vec(),
                    Ok(None) => return Err(KdbError::not_found(&key)),
                    Err(err) => return Err(to_kdb_error("batch get", err)),
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
        if let Err(err) = self.check_opened(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let options = ReadOptions::from_options(options);
        log::debug!(
            "fjall scan [{}, {}) limit {} {}",
            HexKey(start),
            HexKey(exclusive_end),
            limit,
            options
        );

        let partition = self.partition.clone();
        let start = start.to_vec();
        let end = exclusive_end.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-fjall-scan", move |producer| {
            if end <= start {
                return Ok(());
            }
            let mut count = 0u64;
            for item in partition.range(start..end) {
                let (key, value) = item.map_err(|err| to_kdb_error("scan", err))?;
                if !producer.push_item(to_kv(&key, &value, &options)) {
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
        if let Err(err) = self.check_opened(ctx) {
            return KvIterator::failed(ctx, err);
        }
        let options = ReadOptions::from_options(options);
        log::debug!("fjall prefix {} limit {} {}", HexKey(prefix), limit, options);

        let partition = self.partition.clone();
        let prefix = prefix.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-fjall-prefix", move |producer| {
            let mut count = 0u64;
            for item in partition.prefix(&prefix) {
                let (key, value) = item.map_err(|err| to_kdb_error("prefix scan", err))?;
                if !producer.push_item(to_kv(&key, &value, &options)) {
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
        self.check_opened(ctx)?;
        self.staged.flush(self)
    }

    fn close(&self) -> KdbResult<()> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        let flushed = self.staged.close(self);
        if let Err(err) = &flushed {
            log::error!("Failed to flush staged puts while closing fjall store: {}", err);
        }
        if let Err(err) = self.keyspace.persist(PersistMode::SyncAll) {
            log::error!("Failed to persist fjall keyspace: {}", err);
            return flushed.and(Err(to_kdb_error("persist", err)));
        }
        log::debug!("closed fjall store at {}", self.config.db_path());
        flushed
    }
}

impl BatchWriter for FjallStoreInner {
    fn write_batch(&self, batch: &mut WriteBatch) -> KdbResult<()> {
        batch
            .commit_all(|entries| {
                let mut fjall_batch = self.keyspace.batch();
                for kv in entries {
                    fjall_batch.insert(&self.partition, kv.key.as_slice(), kv.value.as_slice());
                }
                fjall_batch.commit().map_err(|err| {
                    log::error!("Failed to commit {} staged puts to fjall: {}", entries.len(), err);
                    to_kdb_error("commit batch", err)
                })
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
    use kdb::store::{BatchLimits, IteratorState, DEFAULT_MAX_BATCH_BYTES};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> FjallStore {
        let mut config = FjallConfig::new();
        config.set_db_path(&dir.path().to_string_lossy());
        FjallStore::open(config).unwrap()
    }

    fn load(store: &FjallStore, ctx: &Context, keys: &[&str]) {
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
    fn put_flush_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();

        store.put(&ctx, b"key1", b"value1").unwrap();
        assert!(store.get(&ctx, b"key1").unwrap_err().is_not_found());
        assert_eq!(store.pending_puts(), 1);

        store.flush_puts(&ctx).unwrap();
        assert_eq!(store.pending_puts(), 0);
        assert_eq!(store.get(&ctx, b"key1").unwrap(), b"value1".to_vec());
        store.close().unwrap();
    }

    #[test]
    fn empty_values_are_stored() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        store.put(&ctx, b"empty", b"").unwrap();
        store.flush_puts(&ctx).unwrap();
        assert!(store.get(&ctx, b"empty").unwrap().is_empty());
        store.close().unwrap();
    }

    #[test]
    fn auto_flush_at_batch_size() {
        let dir = TempDir::new().unwrap();
        let mut config = FjallConfig::new();
        config.set_db_path(&dir.path().to_string_lossy());
        config.set_batch_limits(BatchLimits::new(2, DEFAULT_MAX_BATCH_BYTES));
        let store = FjallStore::open(config).unwrap();
        let ctx = Context::background();

        store.put(&ctx, b"a", b"1").unwrap();
        assert!(store.get(&ctx, b"a").is_err());
        store.put(&ctx, b"b", b"2").unwrap();
        assert_eq!(store.get(&ctx, b"a").unwrap(), b"1".to_vec());
        store.close().unwrap();
    }

    #[test]
    fn delete_and_batch_delete() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2", "key3"]);

        store.delete(&ctx, b"key2").unwrap();
        assert!(store.get(&ctx, b"key2").unwrap_err().is_not_found());

        store
            .batch_delete(&ctx, &[b"key1".to_vec(), b"key3".to_vec()])
            .unwrap();
        assert!(store.get(&ctx, b"key1").unwrap_err().is_not_found());
        assert!(store.get(&ctx, b"key3").unwrap_err().is_not_found());
        store.close().unwrap();
    }

    #[test]
    fn batch_get_streams_values_and_fails_on_missing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2"]);

        let items = store
            .batch_get(&ctx, &[b"key2".to_vec(), b"key1".to_vec()])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["key2", "key1"]);

        let mut iter = store.batch_get(&ctx, &[b"key1".to_vec(), b"missing".to_vec()]);
        while iter.next() {}
        assert_eq!(iter.state(), IteratorState::Failed);
        assert!(iter.err().unwrap().is_not_found());
        store.close().unwrap();
    }

    #[test]
    fn scan_is_ordered_and_half_open() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        load(&store, &ctx, &["d", "b", "a", "c", "e"]);

        let items = store
            .scan(&ctx, b"b", b"e", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["b", "c", "d"]);
        assert_eq!(items[0].value, b"v-b".to_vec());

        let empty = store
            .scan(&ctx, b"e", b"b", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap();
        assert!(empty.is_empty());
        store.close().unwrap();
    }

    #[test]
    fn scan_with_limit_and_key_only() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        load(&store, &ctx, &["a", "b", "c", "d"]);

        let items = store
            .scan(&ctx, b"a", b"z", Limit::new(3), &[ReadOption::KeyOnly])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["a", "b", "c"]);
        assert!(items.iter().all(|kv| kv.value.is_empty()));
        store.close().unwrap();
    }

    #[test]
    fn prefix_yields_matching_keys() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        load(&store, &ctx, &["key1", "key2", "key3", "other"]);

        let items = store
            .prefix(&ctx, b"key", Limit::new(3), &[])
            .drain()
            .unwrap();
        assert_eq!(keys_of(&items), vec!["key1", "key2", "key3"]);

        let limited = store
            .prefix(&ctx, b"key", Limit::new(1), &[])
            .drain()
            .unwrap();
        assert_eq!(limited.len(), 1);
        store.close().unwrap();
    }

    #[test]
    fn cancelled_scan_stops() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ctx = Context::background();
        let keys: Vec<String> = (0..200).map(|i| format!("key{:04}", i)).collect();
        let refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        load(&store, &ctx, &refs);

        let scan_ctx = Context::background();
        let mut iter = store.prefix(&scan_ctx, b"key", Limit::UNBOUNDED, &[]);
        assert!(iter.next());
        scan_ctx.cancel();
        assert!(!iter.next());
        assert!(iter.is_cancelled());
        assert!(iter.err().is_none());
        store.close().unwrap();
    }

    #[test]
    fn close_flushes_and_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::background();
        {
            let store = open_store(&dir);
            store.put(&ctx, b"durable", b"yes").unwrap();
            store.close().unwrap();
            assert!(store.is_closed());
            assert_eq!(
                store.get(&ctx, b"durable").unwrap_err().kind(),
                &ErrorKind::StoreClosed
            );
        }
        let store = open_store(&dir);
        assert_eq!(store.get(&ctx, b"durable").unwrap(), b"yes".to_vec());
        store.close().unwrap();
    }
}
