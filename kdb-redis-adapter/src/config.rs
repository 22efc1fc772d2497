use kdb::compression::new_compressor;
use kdb::dsn::ConnectionString;
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use kdb::store::{BatchLimits, DEFAULT_ITERATOR_BUFFER};
use thiserror::Error;

pub const REDIS_SCHEME: &str = "redis";

/// Query parameter controlling how many keys one `SCAN` round examines.
pub const PARAM_SCAN_COUNT: &str = "scan_count";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedisConfigError {
    #[error("redis connection string {0:?} has no host")]
    MissingHost(String),
    #[error("redis scan count must be positive")]
    ZeroScanCount,
}

impl From<RedisConfigError> for KdbError {
    fn from(err: RedisConfigError) -> Self {
        let kind = match err {
            RedisConfigError::MissingHost(_) => ErrorKind::InvalidConnectionString,
            RedisConfigError::ZeroScanCount => ErrorKind::InvalidConfiguration,
        };
        KdbError::new_with_cause(&err.to_string(), kind, err)
    }
}

/// Configuration of a redis-backed store.
///
/// Built from
/// `redis://[user:pass@]host:port[/db][?compression=zstd&threshold=N&batch_size=N&...]`.
/// The parameters kdb consumes are removed and the remaining URL is handed
/// to the redis client untouched.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    url: String,
    compression: String,
    threshold: i64,
    batch_limits: BatchLimits,
    buffer: usize,
    scan_count: usize,
}

impl RedisConfig {
    pub const DEFAULT_SCAN_COUNT: usize = 100;

    pub fn new() -> RedisConfig {
        RedisConfig {
            url: String::new(),
            compression: String::new(),
            threshold: 0,
            batch_limits: BatchLimits::default(),
            buffer: DEFAULT_ITERATOR_BUFFER,
            scan_count: Self::DEFAULT_SCAN_COUNT,
        }
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<RedisConfig> {
        let mut parsed = ConnectionString::parse(dsn)?;
        if parsed.hosts().is_empty() {
            return Err(RedisConfigError::MissingHost(dsn.to_string()).into());
        }

        let mut config = RedisConfig::new();
        config.set_compression(parsed.compression(), parsed.threshold()?)?;
        config.set_batch_limits(parsed.batch_limits()?);
        config.set_buffer(parsed.buffer()?);
        if let Some(scan_count) = parsed.parse_param::<usize>(PARAM_SCAN_COUNT)? {
            config.set_scan_count(scan_count)?;
        }

        parsed.strip_store_params();
        parsed.take_param(PARAM_SCAN_COUNT);
        config.set_url(&parsed.to_string());
        log::debug!(
            "redis config: compression {:?}, threshold {}, {}",
            config.compression,
            config.threshold,
            config.batch_limits
        );
        Ok(config)
    }

    /// Client URL, stripped of kdb's own parameters.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub(crate) fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    #[inline]
    pub fn compression(&self) -> &str {
        &self.compression
    }

    #[inline]
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Sets the value codec, validating the pair up front.
    pub(crate) fn set_compression(&mut self, mode: &str, threshold: i64) -> KdbResult<()> {
        new_compressor(mode, threshold)?;
        self.compression = mode.to_string();
        self.threshold = threshold;
        Ok(())
    }

    #[inline]
    pub fn batch_limits(&self) -> BatchLimits {
        self.batch_limits
    }

    #[inline]
    pub(crate) fn set_batch_limits(&mut self, batch_limits: BatchLimits) {
        self.batch_limits = batch_limits;
    }

    #[inline]
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    #[inline]
    pub(crate) fn set_buffer(&mut self, buffer: usize) {
        self.buffer = buffer;
    }

    #[inline]
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }

    pub(crate) fn set_scan_count(&mut self, scan_count: usize) -> KdbResult<()> {
        if scan_count == 0 {
            return Err(RedisConfigError::ZeroScanCount.into());
        }
        self.scan_count = scan_count;
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig::new()
    }
}
