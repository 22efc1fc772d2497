use crate::client::{prefix_end, successor, CoordinationClient, RangeRequest};
use crate::config::{EtcdConfig, ETCD_SCHEME};
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

/// A key-value store over an etcd cluster.
///
/// Keys are stored hex encoded, which keeps etcd's ascending key order equal
/// to byte order, so `scan` maps onto a native `[start, end)` range read.
/// Staged puts are written one request per entry on flush; an entry that
/// fails stays staged together with everything after it.
#[derive(Clone)]
pub struct EtcdStore {
    inner: Arc<EtcdStoreInner>,
}

impl EtcdStore {
    pub fn new(config: EtcdConfig, client: Arc<dyn CoordinationClient>) -> KdbResult<EtcdStore> {
        Ok(EtcdStore {
            inner: Arc::new(EtcdStoreInner::new(config, client)?),
        })
    }

    #[inline]
    pub fn config(&self) -> &EtcdConfig {
        &self.inner.config
    }

    #[inline]
    pub fn pending_puts(&self) -> usize {
        self.inner.staged.len()
    }
}

impl StoreProvider for EtcdStore {
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
        ETCD_SCHEME
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

struct EtcdStoreInner {
    config: EtcdConfig,
    client: Arc<dyn CoordinationClient>,
    compressor: Arc<dyn Compressor>,
    staged: StagedWrites,
    empty_value: AtomicBool,
    closed: AtomicBool,
}

impl EtcdStoreInner {
    fn new(config: EtcdConfig, client: Arc<dyn CoordinationClient>) -> KdbResult<EtcdStoreInner> {
        let compressor = new_compressor(config.compression(), config.threshold())?;
        Ok(EtcdStoreInner {
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
            return Err(KdbError::new("etcd store is closed", ErrorKind::StoreClosed));
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
        fetch(self.client.as_ref(), self.compressor.as_ref(), key)
    }

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        log::debug!("deleting key {}", HexKey(key));
        self.client.delete(&[encode_key(key)])
    }

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()> {
        self.check_opened(ctx)?;
        log::debug!("batch deleting {} keys", keys.len());
        let encoded: Vec<String> = keys.iter().map(|key| encode_key(key)).collect();
        self.client.delete(&encoded)
    }

    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator {
        if let Err(err) = self.check_opened(ctx) {
            return KvIterator::failed(ctx, err);
        }
        log::debug!("batch getting {} keys", keys.len());
        let client = self.client.clone();
        let compressor = self.compressor.clone();
        let keys = keys.to_vec();
        spawn_producer(ctx, self.config.buffer(), "kdb-etcd-batch-get", move |producer| {
            for key in keys {
                if producer.context().is_done() {
                    break;
                }
                let value = fetch(client.as_ref(), compressor.as_ref(), &key)?;
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

        let job = self.range_job(
            encode_key(start),
            Some(encode_key(exclusive_end)),
            limit,
            options,
        );
        spawn_producer(ctx, self.config.buffer(), "kdb-etcd-scan", move |producer| {
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

        let start = encode_key(prefix);
        let end = prefix_end(&start);
        let job = self.range_job(start, end, limit, options);
        spawn_producer(ctx, self.config.buffer(), "kdb-etcd-prefix", move |producer| {
            job.run(producer)
        })
    }

    fn range_job(
        &self,
        start: String,
        end: Option<String>,
        limit: Limit,
        options: ReadOptions,
    ) -> RangeJob {
        RangeJob {
            client: self.client.clone(),
            compressor: self.compressor.clone(),
            start,
            end,
            limit,
            options,
            page_size: self.config.page_size(),
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
            log::error!("Failed to flush staged puts while closing etcd store: {}", err);
        }
        if let Err(err) = self.client.close() {
            log::error!("Failed to close etcd client: {}", err);
            return flushed.and(Err(err));
        }
        flushed
    }
}

impl BatchWriter for EtcdStoreInner {
    fn write_batch(&self, batch: &mut WriteBatch) -> KdbResult<()> {
        batch
            .commit_each(|kv| self.client.put(&encode_key(&kv.key), &kv.value))
            .map(|_| ())
    }
}

fn fetch(
    client: &dyn CoordinationClient,
    compressor: &dyn Compressor,
    key: &[u8],
) -> KdbResult<Vec<u8>> {
    match client.get(&encode_key(key))? {
        Some(value) => compressor.decompress(&value),
        None => Err(KdbError::not_found(key)),
    }
}

/// A paged range read feeding one iterator.
struct RangeJob {
    client: Arc<dyn CoordinationClient>,
    compressor: Arc<dyn Compressor>,
    start: String,
    end: Option<String>,
    limit: Limit,
    options: ReadOptions,
    page_size: i64,
}

impl RangeJob {
    fn run(self, producer: &KvProducer) -> KdbResult<()> {
        if let Some(end) = &self.end {
            if end <= &self.start {
                return Ok(());
            }
        }

        let mut next_start = self.start.clone();
        let mut count = 0u64;
        loop {
            if producer.context().is_done() {
                return Ok(());
            }
            let page_limit = if self.limit.is_bounded() {
                self.page_size.min(self.limit.value() - count as i64)
            } else {
                self.page_size
            };
            let request = RangeRequest {
                start: next_start.clone(),
                end: self.end.clone(),
                limit: page_limit,
                keys_only: self.options.key_only,
            };
            let page = self.client.range(&request)?;
            let full_page = page.len() as i64 >= page_limit;

            for (encoded, value) in page {
                next_start = successor(&encoded);
                let key = decode_key(&encoded).map_err(|err| {
                    log::error!("Key {:?} in etcd is not hex encoded", encoded);
                    err
                })?;
                let kv = if self.options.key_only {
                    Kv::key_only(key)
                } else {
                    Kv::new(key, self.compressor.decompress(&value)?)
                };
                if !producer.push_item(kv) {
                    return Ok(());
                }
                count += 1;
                if self.limit.reached(count) {
                    return Ok(());
                }
            }

            if !full_page {
                return Ok(());
            }
        }
    }
}
