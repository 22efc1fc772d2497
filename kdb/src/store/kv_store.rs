use crate::common::{Capability, Context, Limit, ReadOption, StoreOption};
use crate::errors::KdbResult;
use crate::store::KvIterator;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// The key-value store contract every backend adapter implements.
///
/// All operations take a [`Context`]; an operation started on a context that
/// is already done fails with `Cancelled` or `DeadlineExceeded` before
/// touching the backend.
///
/// # Write path
///
/// `put` stages the entry in the store's write batch. Staged entries are
/// invisible to `get` and the streaming reads until the batch is flushed,
/// either explicitly through `flush_puts`, automatically once the batch
/// reaches its entry limit, or when the store is closed. `delete` and
/// `batch_delete` are applied immediately.
///
/// # Streaming reads
///
/// `scan`, `prefix` and `batch_get` return a [`KvIterator`] fed by a producer
/// thread. A bounded `limit` truncates the stream cleanly; `ReadOption::KeyOnly`
/// yields keys with empty values.
pub trait StoreProvider: Send + Sync {
    /// Stages a put. Values are compressed by stores that compress.
    fn put(&self, ctx: &Context, key: &[u8], value: &[u8]) -> KdbResult<()>;

    /// Reads a flushed value, failing with `NotFound` when the key is absent.
    fn get(&self, ctx: &Context, key: &[u8]) -> KdbResult<Vec<u8>>;

    fn delete(&self, ctx: &Context, key: &[u8]) -> KdbResult<()>;

    fn batch_delete(&self, ctx: &Context, keys: &[Vec<u8>]) -> KdbResult<()>;

    /// Streams the values of `keys` in order. The stream fails with
    /// `NotFound` at the first missing key.
    fn batch_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> KvIterator;

    /// Streams the keys in `[start, exclusive_end)`.
    fn scan(
        &self,
        ctx: &Context,
        start: &[u8],
        exclusive_end: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator;

    /// Streams the keys starting with `prefix`.
    fn prefix(
        &self,
        ctx: &Context,
        prefix: &[u8],
        limit: Limit,
        options: &[ReadOption],
    ) -> KvIterator;

    /// Writes every staged put to the backend.
    fn flush_puts(&self, ctx: &Context) -> KdbResult<()>;

    /// Flushes staged puts and releases the backend. Operations on a closed
    /// store fail with `StoreClosed`.
    fn close(&self) -> KdbResult<()>;

    fn is_closed(&self) -> bool;

    /// Backend name, the scheme it is registered under.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Applies an option whose capability this store advertises.
    fn configure(&self, _option: &StoreOption) -> KdbResult<()> {
        Ok(())
    }
}

/// Shared handle to an opened store.
///
/// Cloning is cheap and every clone talks to the same backend instance.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn StoreProvider>,
}

impl Store {
    pub fn new<T: StoreProvider + 'static>(inner: T) -> Self {
        Store {
            inner: Arc::new(inner),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.inner.capabilities().contains(&capability)
    }

    /// Applies `option` if the store supports it, otherwise ignores it.
    pub fn apply_option(&self, option: &StoreOption) -> KdbResult<()> {
        if self.supports(option.capability()) {
            log::debug!("applying {:?} to {} store", option, self.inner.name());
            self.inner.configure(option)
        } else {
            log::debug!(
                "{} store does not support {:?}, option ignored",
                self.inner.name(),
                option
            );
            Ok(())
        }
    }
}

impl Deref for Store {
    type Target = Arc<dyn StoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Display for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.name())
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.inner.name())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

/// Programmatic constructor of a store, the counterpart of opening one from
/// a connection string.
pub trait StoreModule {
    fn get_store(&self) -> KdbResult<Store>;
}
