use crate::config::{FjallConfig, FJALL_SCHEME};
use crate::store::FjallStore;
use fjall::CompressionType;
use kdb::errors::KdbResult;
use kdb::registry::Registration;
use kdb::store::{BatchLimits, Store, StoreModule};

/// kdb storage module backed by a fjall keyspace.
///
/// # Examples
///
/// ```rust,ignore
/// use kdb::store::StoreModule;
/// use kdb_fjall_adapter::FjallModule;
///
/// let store = FjallModule::with_config()
///     .db_path("/var/lib/kv")
///     .compression(CompressionType::Lz4)
///     .build()
///     .get_store()?;
/// ```
///
/// Each call to `get_store` opens the keyspace at the configured path, so a
/// module should be asked for its store once per process.
pub struct FjallModule {
    store_config: FjallConfig,
}

impl FjallModule {
    pub fn new(store_config: FjallConfig) -> FjallModule {
        FjallModule { store_config }
    }

    #[inline]
    pub fn with_config() -> FjallModuleBuilder {
        FjallModuleBuilder::new()
    }

    /// Builds a module from a `fjall://` connection string.
    pub fn from_dsn(dsn: &str) -> KdbResult<FjallModule> {
        Ok(FjallModule::new(FjallConfig::from_dsn(dsn)?))
    }

    pub fn config(&self) -> &FjallConfig {
        &self.store_config
    }
}

impl StoreModule for FjallModule {
    fn get_store(&self) -> KdbResult<Store> {
        let store = FjallStore::open(self.store_config.clone())?;
        Ok(Store::new(store))
    }
}

/// Fluent configuration of a [`FjallModule`].
pub struct FjallModuleBuilder {
    store_config: FjallConfig,
    partition: Option<String>,
}

impl FjallModuleBuilder {
    #[inline]
    pub fn new() -> FjallModuleBuilder {
        FjallModuleBuilder {
            store_config: FjallConfig::new(),
            partition: None,
        }
    }

    pub fn db_path(mut self, db_path: &str) -> Self {
        self.store_config.set_db_path(db_path);
        self
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.store_config.set_compression(compression);
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

    /// Block cache size in bytes.
    pub fn cache_size(mut self, cache_size: u64) -> Self {
        self.store_config.set_cache_size(cache_size);
        self
    }

    pub fn max_write_buffer_size(mut self, size: u64) -> Self {
        self.store_config.set_max_write_buffer_size(size);
        self
    }

    /// Syncs the journal every `ms` milliseconds in the background.
    pub fn fsync_ms(mut self, ms: u16) -> Self {
        self.store_config.set_fsync_ms(Some(ms));
        self
    }

    /// Validates the partition name and builds the module.
    pub fn build(mut self) -> KdbResult<FjallModule> {
        if let Some(partition) = self.partition.take() {
            self.store_config.set_partition(&partition)?;
        }
        Ok(FjallModule::new(self.store_config))
    }
}

impl Default for FjallModuleBuilder {
    fn default() -> Self {
        FjallModuleBuilder::new()
    }
}

/// Registration of the `fjall` scheme.
pub fn registration() -> Registration {
    Registration::new(FJALL_SCHEME, |dsn| FjallModule::from_dsn(dsn)?.get_store())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb::common::Context;
    use kdb::errors::ErrorKind;
    use kdb::registry::Registry;
    use tempfile::TempDir;

    #[test]
    fn builder_applies_settings() {
        let module = FjallModule::with_config()
            .db_path("/tmp/kdb-builder")
            .partition("events")
            .compression(CompressionType::Lz4)
            .batch_limits(BatchLimits::new(10, 2048))
            .buffer(4)
            .cache_size(1024)
            .max_write_buffer_size(4096)
            .fsync_ms(50)
            .build()
            .unwrap();
        let config = module.config();
        assert_eq!(config.db_path(), "/tmp/kdb-builder");
        assert_eq!(config.partition(), "events");
        assert_eq!(config.compression(), CompressionType::Lz4);
        assert_eq!(config.batch_limits(), BatchLimits::new(10, 2048));
        assert_eq!(config.buffer(), 4);
        assert_eq!(config.cache_size(), 1024);
        assert_eq!(config.max_write_buffer_size(), 4096);
        assert_eq!(config.fsync_ms(), Some(50));
    }

    #[test]
    fn builder_rejects_bad_partition() {
        let result = FjallModule::with_config()
            .db_path("/tmp/kdb-builder")
            .partition("no/slashes")
            .build();
        let err = result.err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn module_opens_store() {
        let dir = TempDir::new().unwrap();
        let store = FjallModule::with_config()
            .db_path(&dir.path().to_string_lossy())
            .build()
            .unwrap()
            .get_store()
            .unwrap();
        assert_eq!(store.name(), "fjall");

        let ctx = Context::background();
        store.put(&ctx, b"k", b"v").unwrap();
        store.flush_puts(&ctx).unwrap();
        assert_eq!(store.get(&ctx, b"k").unwrap(), b"v".to_vec());
        store.close().unwrap();
    }

    #[test]
    fn registry_opens_fjall_dsn() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        registry.register(registration());

        let dsn = format!("fjall://{}?compression=lz4&batch_size=1", dir.path().display());
        let store = registry.open(&dsn, &[]).unwrap();
        let ctx = Context::background();
        store.put(&ctx, b"k", b"v").unwrap();
        assert_eq!(store.get(&ctx, b"k").unwrap(), b"v".to_vec());
        store.close().unwrap();
    }

    #[test]
    fn registry_reports_bad_dsn() {
        let registry = Registry::new();
        registry.register(registration());
        let err = registry.open("fjall://", &[]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConnectionString);
    }
}
