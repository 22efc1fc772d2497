use crate::client::{CacheClient, RedisClient};
use crate::config::{RedisConfig, REDIS_SCHEME};
use crate::store::RedisStore;
use kdb::errors::KdbResult;
use kdb::registry::Registration;
use kdb::store::{BatchLimits, Store, StoreModule};
use std::sync::Arc;

/// kdb storage module backed by redis.
///
/// ```rust,ignore
/// let store = RedisModule::with_config()
///     .url("redis://localhost:6379/0")
///     .compression("zstd", 1024)
///     .build()?
///     .get_store()?;
/// ```
///
/// Without an explicit [`client`](RedisModuleBuilder::client) every
/// `get_store` opens a new connection to the configured URL.
pub struct RedisModule {
    store_config: RedisConfig,
    client: Option<Arc<dyn CacheClient>>,
}

impl RedisModule {
    pub fn new(store_config: RedisConfig) -> RedisModule {
        RedisModule {
            store_config,
            client: None,
        }
    }

    #[inline]
    pub fn with_config() -> RedisModuleBuilder {
        RedisModuleBuilder::new()
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<RedisModule> {
        Ok(RedisModule::new(RedisConfig::from_dsn(dsn)?))
    }

    pub fn config(&self) -> &RedisConfig {
        &self.store_config
    }

    /// Uses `client` instead of connecting, keeping the rest of the
    /// configuration.
    pub fn with_client(mut self, client: Arc<dyn CacheClient>) -> RedisModule {
        self.client = Some(client);
        self
    }
}

impl StoreModule for RedisModule {
    fn get_store(&self) -> KdbResult<Store> {
        let client: Arc<dyn CacheClient> = match &self.client {
            Some(client) => client.clone(),
            None => Arc::new(RedisClient::connect(self.store_config.url())?),
        };
        let store = RedisStore::new(self.store_config.clone(), client)?;
        Ok(Store::new(store))
    }
}

pub struct RedisModuleBuilder {
    store_config: RedisConfig,
    compression: Option<(String, i64)>,
    scan_count: Option<usize>,
    client: Option<Arc<dyn CacheClient>>,
}

impl RedisModuleBuilder {
    #[inline]
    pub fn new() -> RedisModuleBuilder {
        RedisModuleBuilder {
            store_config: RedisConfig::new(),
            compression: None,
            scan_count: None,
            client: None,
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.store_config.set_url(url);
        self
    }

    /// Value codec: `none` or `zstd` with a size threshold in bytes.
    pub fn compression(mut self, mode: &str, threshold: i64) -> Self {
        self.compression = Some((mode.to_string(), threshold));
        self
    }

    pub fn batch_limits(mut self, batch_limits: BatchLimits) -> Self {
        self.store_config.set_batch_limits(batch_limits);
        self
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.store_config.set_buffer(buffer);
        self
    }

    pub fn scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = Some(scan_count);
        self
    }

    /// Uses `client` instead of connecting to the URL.
    pub fn client(mut self, client: Arc<dyn CacheClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(mut self) -> KdbResult<RedisModule> {
        if let Some((mode, threshold)) = self.compression.take() {
            self.store_config.set_compression(&mode, threshold)?;
        }
        if let Some(scan_count) = self.scan_count.take() {
            self.store_config.set_scan_count(scan_count)?;
        }
        Ok(RedisModule {
            store_config: self.store_config,
            client: self.client,
        })
    }
}

impl Default for RedisModuleBuilder {
    fn default() -> Self {
        RedisModuleBuilder::new()
    }
}

/// Registration of the `redis` scheme.
pub fn registration() -> Registration {
    Registration::new(REDIS_SCHEME, |dsn| RedisModule::from_dsn(dsn)?.get_store())
}
