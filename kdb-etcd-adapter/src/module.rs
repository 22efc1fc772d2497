use crate::client::CoordinationClient;
use crate::config::{EtcdConfig, ETCD_SCHEME};
use crate::store::EtcdStore;
use kdb::errors::KdbResult;
use kdb::registry::Registration;
use kdb::store::{BatchLimits, Store, StoreModule};
use std::sync::Arc;

/// kdb storage module backed by etcd.
///
/// ```rust,ignore
/// let store = EtcdModule::with_config()
///     .endpoints(&["localhost:2379"])
///     .compression("zstd", 1024)
///     .build()?
///     .get_store()?;
/// ```
///
/// Connecting to a cluster needs the `client` feature; without it a
/// [`client`](EtcdModuleBuilder::client) must be supplied.
pub struct EtcdModule {
    store_config: EtcdConfig,
    client: Option<Arc<dyn CoordinationClient>>,
}

impl EtcdModule {
    pub fn new(store_config: EtcdConfig) -> EtcdModule {
        EtcdModule {
            store_config,
            client: None,
        }
    }

    #[inline]
    pub fn with_config() -> EtcdModuleBuilder {
        EtcdModuleBuilder::new()
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<EtcdModule> {
        Ok(EtcdModule::new(EtcdConfig::from_dsn(dsn)?))
    }

    pub fn config(&self) -> &EtcdConfig {
        &self.store_config
    }

    /// Uses `client` instead of connecting, keeping the rest of the
    /// configuration.
    pub fn with_client(mut self, client: Arc<dyn CoordinationClient>) -> EtcdModule {
        self.client = Some(client);
        self
    }

    fn client(&self) -> KdbResult<Arc<dyn CoordinationClient>> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => connect(&self.store_config),
        }
    }
}

#[cfg(feature = "client")]
fn connect(config: &EtcdConfig) -> KdbResult<Arc<dyn CoordinationClient>> {
    Ok(Arc::new(crate::remote::EtcdClient::connect(config)?))
}

#[cfg(not(feature = "client"))]
fn connect(config: &EtcdConfig) -> KdbResult<Arc<dyn CoordinationClient>> {
    use kdb::errors::{ErrorKind, KdbError};

    log::error!(
        "Cannot connect to etcd {:?}: kdb_etcd_adapter was built without the client feature",
        config.endpoints()
    );
    Err(KdbError::new(
        "etcd support requires the `client` feature of kdb_etcd_adapter",
        ErrorKind::InvalidConfiguration,
    ))
}

impl StoreModule for EtcdModule {
    fn get_store(&self) -> KdbResult<Store> {
        let store = EtcdStore::new(self.store_config.clone(), self.client()?)?;
        Ok(Store::new(store))
    }
}

pub struct EtcdModuleBuilder {
    store_config: EtcdConfig,
    compression: Option<(String, i64)>,
    page_size: Option<i64>,
    client: Option<Arc<dyn CoordinationClient>>,
}

impl EtcdModuleBuilder {
    #[inline]
    pub fn new() -> EtcdModuleBuilder {
        EtcdModuleBuilder {
            store_config: EtcdConfig::new(),
            compression: None,
            page_size: None,
            client: None,
        }
    }

    pub fn endpoints(mut self, endpoints: &[&str]) -> Self {
        self.store_config
            .set_endpoints(endpoints.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.store_config.set_credentials(username, password);
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

    /// Keys fetched per range request.
    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Uses `client` instead of connecting to the endpoints.
    pub fn client(mut self, client: Arc<dyn CoordinationClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(mut self) -> KdbResult<EtcdModule> {
        if let Some((mode, threshold)) = self.compression.take() {
            self.store_config.set_compression(&mode, threshold)?;
        }
        if let Some(page_size) = self.page_size.take() {
            self.store_config.set_page_size(page_size)?;
        }
        Ok(EtcdModule {
            store_config: self.store_config,
            client: self.client,
        })
    }
}

impl Default for EtcdModuleBuilder {
    fn default() -> Self {
        EtcdModuleBuilder::new()
    }
}

/// Registration of the `etcd` scheme.
pub fn registration() -> Registration {
    Registration::new(ETCD_SCHEME, |dsn| EtcdModule::from_dsn(dsn)?.get_store())
}
