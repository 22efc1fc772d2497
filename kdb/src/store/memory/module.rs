use super::{MemoryConfig, MemoryStore, MEMORY_SCHEME};
use crate::errors::KdbResult;
use crate::registry::Registration;
use crate::store::{BatchLimits, Store, StoreModule};

/// Builds in-memory stores.
///
/// ```rust,ignore
/// let store = MemoryModule::with_config()
///     .batch_limits(BatchLimits::new(100, 1 << 20))
///     .build()
///     .get_store()?;
/// ```
pub struct MemoryModule {
    config: MemoryConfig,
}

impl MemoryModule {
    pub fn new(config: MemoryConfig) -> MemoryModule {
        MemoryModule { config }
    }

    pub fn with_config() -> MemoryModuleBuilder {
        MemoryModuleBuilder::new()
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<MemoryModule> {
        Ok(MemoryModule::new(MemoryConfig::from_dsn(dsn)?))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

impl StoreModule for MemoryModule {
    fn get_store(&self) -> KdbResult<Store> {
        Ok(Store::new(MemoryStore::new(self.config.clone())))
    }
}

pub struct MemoryModuleBuilder {
    config: MemoryConfig,
}

impl MemoryModuleBuilder {
    fn new() -> MemoryModuleBuilder {
        MemoryModuleBuilder {
            config: MemoryConfig::new(),
        }
    }

    pub fn batch_limits(mut self, batch_limits: BatchLimits) -> Self {
        self.config.set_batch_limits(batch_limits);
        self
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.config.set_buffer(buffer);
        self
    }

    pub fn build(self) -> MemoryModule {
        MemoryModule::new(self.config)
    }
}

/// Registration of the `memory` scheme.
pub fn registration() -> Registration {
    Registration::new(MEMORY_SCHEME, |dsn| MemoryModule::from_dsn(dsn)?.get_store())
}
