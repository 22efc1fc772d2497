use crate::client::CacheClient;
use crate::config::{RedisConfig, REDIS_SCHEME};
use kdb::common::{
    decode_key, encode_key, Capability, Context, HexKey, Kv, Limit, ReadOption, ReadOptions,
    StoreOption,
};
use kdb::compression::{new_compressor, Compressor};
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use kdb::store::{
    spawn_producer, BatchWriter, KvIterator, KvProducer, StagedWrites, StoreProvider, WriteBatch,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CAPABILITIES: [Capability; 1] = [Capability::EmptyValue];

/// A key-value store over a redis server.
///
/// Keys are stored hex encoded and values go through the configured
/// compressor. Staged puts are written with one `MULTI`/`EXEC` pipeline per
/// flush. Scans walk the keyspace with `SCAN`, so they come back in the
/// server's order rather than key order. `SCAN` may also return a key more
/// than once across rounds (during a rehash, for one); such repeats are
/// delivered as they come and count toward the scan limit.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<RedisStoreInner>,
}

impl RedisStore {
    pub fn new(config: RedisConfig, client: Arc<dyn CacheClient>) -> KdbResult<RedisStore> {
        Ok(RedisStore {
            inner: Arc::new(RedisStoreInner::new(config, client)?),
        })
    }

    #[inline]
    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }

    #[inline]
    pub fn pending_puts(&self) -> usize {
        self.inner.staged.len()
    }
}

impl StoreProvider for RedisStore {
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
        REDIS_SCHEME
    }

    fn capabilities(&self) -> &[Capability] {
        &CAPABILITIES
    }

    fn configure(&self, option: &StoreOption) -> KdbResult<()> {
        match option {
            StoreOption::EmptyValue => {
                self.inner.empty_value.store(true, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}

struct RedisStoreInner {
    config: RedisConfig,
    client: Arc<dyn CacheClient>,
    compressor: Arc<dyn Compressor>,
    staged: StagedWrites,
    empty_value: AtomicBool,
    closed: AtomicBool,
}

impl RedisStoreInner {
    fn new(config: RedisConfig, client: Arc<dyn CacheClient>) -> KdbResult<RedisStoreInner> {
        let compressor = new_compressor(config.compression(), config.threshold())?;
        Ok(RedisStoreInner {
            staged: StagedWrites::new(config.batch_limits()),
            config,
            client,
            compressor,
            empty_value: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    fn check_opened(&self, ctx: &Context) -> KdbResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(KdbError::new("redis store is closed", ErrorKind::StoreClosed));
        }
        ctx.check()
    }

    fn put(&self, ctx: &Context, key: &[u8], value: &[u8]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        if value.is_empty() && !self.empty_value.load(Ordering::Relaxed) {
            return Err(KdbError::new(
                &format!("empty value for key {} requires the EmptyValue option", HexKey(key)),
                ErrorKind::InvalidArgument,
            ));
        }
        log::debug!("putting key {}", HexKey(key));
        let value = self.compressor.compress(value);
        self.staged.stage(Kv::new(key, value), self)
    }

    fn get(&self, ctx: &Context, key: &[u8]) -> KdbResult<Vec<u8>> {
        self.check_opened(ctx)?;
        log::debug!("getting key {}", HexKey(key));
        match self.client.get(&encode_key(key))? {
            Some(value) => self.compressor.decompress(&value),
            None => Err(KdbError::not_found(key)),
        }
    }

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        log::debug!("deleting key {}", HexKey(key));
        self.client.del(&[encode_key(key)])
    }

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        log::debug!("batch deleting {} keys", keys.len());
        let encoded: Vec<String> = keys.iter().map(|key| encode_key(key)).collect();
        self.client.del(&encoded)
    }

    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator {
        if let Err(err) = self.check_opened(ctx) {
            return KvIterator::failed(ctx, err);
        }
        log::debug!("batch getting {} keys", keys.len());
        let client = self.client.clone();
        let compressor = self.compressor.clone();
        let keys = keys.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-redis-batch-get", move |producer| {
            let encoded: Vec<String> = keys.iter().map(|key| encode_key(key)).collect();
            let values = client.mget(&encoded)?;
            for (key, value) in keys.into_iter().zip(values) {
                let value = match value {
                    Some(value) => compressor.decompress(&value)?,
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
        if let Err(err) = self.check_opened(ctx) {
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

        let start = encode_key(start);
        let end = encode_key(exclusive_end);
        let pattern = format!("{}*", common_prefix(&start, &end));
        let job = self.scan_job(pattern, Some((start, end)), limit, options);
        spawn_producer(ctx, self.config.buffer(), "kdb-redis-scan", move |producer| {
            job.run(producer)
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
        log::debug!("prefix {} limit {} {}", HexKey(prefix), limit, options);

        let pattern = format!("{}*", encode_key(prefix));
        let job = self.scan_job(pattern, None, limit, options);
        spawn_producer(ctx, self.config.buffer(), "kdb-redis-prefix", move |producer| {
            job.run(producer)
        })
    }

    fn scan_job(
        &self,
        pattern: String,
        range: Option<(String, String)>,
        limit: Limit,
        options: ReadOptions,
    ) -> ScanJob {
        ScanJob {
            client: self.client.clone(),
            compressor: self.compressor.clone(),
            pattern,
            range,
            limit,
            options,
            page_size: self.config.scan_count(),
        }
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
            log::error!("Failed to flush staged puts while closing redis store: {}", err);
        }
        if let Err(err) = self.client.close() {
            log::error!("Failed to close redis client: {}", err);
            return flushed.and(Err(err));
        }
        flushed
    }
}

impl BatchWriter for RedisStoreInner {
    fn write_batch(&self, batch: &mut WriteBatch) -> KdbResult<()> {
        batch
            .commit_all(|entries| {
                let encoded: Vec<(String, Vec<u8>)> = entries
                    .iter()
                    .map(|kv| (encode_key(&kv.key), kv.value.clone()))
                    .collect();
                self.client.set_all(&encoded)
            })
            .map(|_| ())
    }
}

/// A `SCAN` walk feeding one iterator.
struct ScanJob {
    client: Arc<dyn CacheClient>,
    compressor: Arc<dyn Compressor>,
    pattern: String,
    range: Option<(String, String)>,
    limit: Limit,
    options: ReadOptions,
    page_size: usize,
}

impl ScanJob {
    fn run(self, producer: &KvProducer) -> KdbResult<()> {
        if let Some((start, end)) = &self.range {
            if end <= start {
                return Ok(());
            }
        }

        let mut cursor = 0u64;
        let mut count = 0u64;
        loop {
            if producer.context().is_done() {
                return Ok(());
            }
            let (next, keys) = self.client.scan(cursor, &self.pattern, self.page_size)?;
            let keys: Vec<String> = keys.into_iter().filter(|key| self.in_range(key)).collect();
            let values = if self.options.key_only || keys.is_empty() {
                vec![None; keys.len()]
            } else {
                self.client.mget(&keys)?
            };

            for (encoded, value) in keys.into_iter().zip(values) {
                let key = match decode_key(&encoded) {
                    Ok(key) => key,
                    Err(_) => {
                        log::debug!("skipping key {:?} not written by kdb", encoded);
                        continue;
                    }
                };
                let kv = if self.options.key_only {
                    Kv::key_only(key)
                } else {
                    match value {
                        Some(value) => Kv::new(key, self.compressor.decompress(&value)?),
                        // deleted between SCAN and MGET
                        None => continue,
                    }
                };
                if !producer.push_item(kv) {
                    return Ok(());
                }
                count += 1;
                if self.limit.reached(count) {
                    return Ok(());
                }
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }

    fn in_range(&self, key: &str) -> bool {
        match &self.range {
            Some((start, end)) => key >= start.as_str() && key < end.as_str(),
            None => true,
        }
    }
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}
