use fjall::{CompressionType, Config, PartitionCreateOptions};
use kdb::dsn::ConnectionString;
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use kdb::store::{BatchLimits, DEFAULT_ITERATOR_BUFFER};
use thiserror::Error;

pub const FJALL_SCHEME: &str = "fjall";

/// Name of the partition kdb keeps its keys in.
pub const DEFAULT_PARTITION: &str = "kdb";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FjallConfigError {
    #[error("fjall connection string {0:?} has no database path")]
    MissingPath(String),
    #[error("unsupported fjall compression {0:?}, expected none or lz4")]
    UnsupportedCompression(String),
    #[error("invalid fjall partition name {0:?}")]
    InvalidPartition(String),
}

impl From<FjallConfigError> for KdbError {
    fn from(err: FjallConfigError) -> Self {
        let kind = match err {
            FjallConfigError::MissingPath(_) => ErrorKind::InvalidConnectionString,
            _ => ErrorKind::InvalidConfiguration,
        };
        KdbError::new_with_cause(&err.to_string(), kind, err)
    }
}

/// Configuration of a fjall-backed store.
///
/// Built from `fjall://<path>[?compression=none|lz4&partition=name&batch_size=N&batch_bytes=N]`
/// or through [`FjallModule`](crate::FjallModule).
#[derive(Debug, Clone)]
pub struct FjallConfig {
    db_path: String,
    partition: String,
    compression: CompressionType,
    batch_limits: BatchLimits,
    buffer: usize,
    cache_size: u64,
    max_write_buffer_size: u64,
    fsync_ms: Option<u16>,
}

impl FjallConfig {
    pub const DEFAULT_CACHE_MB: u64 = 64;

    pub const DEFAULT_WRITE_BUFFER_MB: u64 = 128;

    #[inline]
    pub fn new() -> FjallConfig {
        FjallConfig {
            db_path: String::new(),
            partition: DEFAULT_PARTITION.to_string(),
            compression: CompressionType::None,
            batch_limits: BatchLimits::default(),
            buffer: DEFAULT_ITERATOR_BUFFER,
            cache_size: Self::DEFAULT_CACHE_MB * 1024 * 1024,
            max_write_buffer_size: Self::DEFAULT_WRITE_BUFFER_MB * 1024 * 1024,
            fsync_ms: None,
        }
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<FjallConfig> {
        let parsed = ConnectionString::parse(dsn)?;
        let db_path = parsed.location();
        if db_path.is_empty() {
            return Err(FjallConfigError::MissingPath(dsn.to_string()).into());
        }

        let mut config = FjallConfig::new();
        config.set_db_path(&db_path);
        config.set_compression(parse_compression(parsed.compression())?);
        if let Some(partition) = parsed.param("partition") {
            config.set_partition(partition)?;
        }
        config.set_batch_limits(parsed.batch_limits()?);
        config.set_buffer(parsed.buffer()?);
        log::debug!(
            "fjall config: path {}, partition {}, compression {:?}",
            config.db_path,
            config.partition,
            config.compression
        );
        Ok(config)
    }

    #[inline]
    pub(crate) fn keyspace_config(&self) -> Config {
        let mut config = Config::new(&self.db_path)
            .cache_size(self.cache_size)
            .max_write_buffer_size(self.max_write_buffer_size);
        if self.fsync_ms.is_some() {
            config = config.fsync_ms(self.fsync_ms);
        }
        config
    }

    #[inline]
    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        PartitionCreateOptions::default().compression(self.compression)
    }

    #[inline]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    #[inline]
    pub(crate) fn set_db_path(&mut self, db_path: &str) {
        self.db_path = db_path.to_string();
    }

    #[inline]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub(crate) fn set_partition(&mut self, partition: &str) -> KdbResult<()> {
        // fjall partition names are limited to a safe character set
        let valid = !partition.is_empty()
            && partition
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '#' | '$'));
        if !valid {
            return Err(FjallConfigError::InvalidPartition(partition.to_string()).into());
        }
        self.partition = partition.to_string();
        Ok(())
    }

    #[inline]
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    #[inline]
    pub(crate) fn set_compression(&mut self, compression: CompressionType) {
        self.compression = compression;
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
    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    #[inline]
    pub(crate) fn set_cache_size(&mut self, cache_size: u64) {
        self.cache_size = cache_size;
    }

    #[inline]
    pub fn max_write_buffer_size(&self) -> u64 {
        self.max_write_buffer_size
    }

    #[inline]
    pub(crate) fn set_max_write_buffer_size(&mut self, size: u64) {
        self.max_write_buffer_size = size;
    }

    #[inline]
    pub fn fsync_ms(&self) -> Option<u16> {
        self.fsync_ms
    }

    #[inline]
    pub(crate) fn set_fsync_ms(&mut self, fsync_ms: Option<u16>) {
        self.fsync_ms = fsync_ms;
    }
}

impl Default for FjallConfig {
    fn default() -> Self {
        FjallConfig::new()
    }
}

fn parse_compression(mode: &str) -> KdbResult<CompressionType> {
    match mode {
        "" | "none" => Ok(CompressionType::None),
        "lz4" => Ok(CompressionType::Lz4),
        other => Err(FjallConfigError::UnsupportedCompression(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dsn_joins_host_and_path() {
        let config = FjallConfig::from_dsn("fjall://data/kv?compression=lz4").unwrap();
        assert_eq!(config.db_path(), "data/kv");
        assert_eq!(config.compression(), CompressionType::Lz4);
        assert_eq!(config.partition(), DEFAULT_PARTITION);
    }

    #[test]
    fn from_dsn_accepts_absolute_path() {
        let config = FjallConfig::from_dsn("fjall:///var/lib/kdb").unwrap();
        assert_eq!(config.db_path(), "/var/lib/kdb");
        assert_eq!(config.compression(), CompressionType::None);
    }

    #[test]
    fn from_dsn_reads_store_params() {
        let config = FjallConfig::from_dsn(
            "fjall:///tmp/kv?compression=none&partition=events&batch_size=10&batch_bytes=4096&buffer=2",
        )
        .unwrap();
        assert_eq!(config.partition(), "events");
        assert_eq!(config.batch_limits(), BatchLimits::new(10, 4096));
        assert_eq!(config.buffer(), 2);
    }

    #[test]
    fn from_dsn_rejects_unknown_compression() {
        let err = FjallConfig::from_dsn("fjall:///tmp/kv?compression=snappy").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration);
        assert!(err.message().contains("snappy"));
    }

    #[test]
    fn from_dsn_requires_path() {
        let err = FjallConfig::from_dsn("fjall://").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConnectionString);
    }

    #[test]
    fn from_dsn_rejects_bad_partition() {
        let err = FjallConfig::from_dsn("fjall:///tmp/kv?partition=a%2Fb").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn from_dsn_rejects_bad_batch_size() {
        let err = FjallConfig::from_dsn("fjall:///tmp/kv?batch_size=-1").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConnectionString);
    }
}
