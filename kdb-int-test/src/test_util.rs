use kdb::common::{Context, Kv};
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use kdb::registry::{Registration, Registry};
use kdb::store::memory::MemoryModule;
use kdb::store::{Store, StoreModule};
use kdb_etcd_adapter::{EtcdModule, InMemoryCoordinationClient, ETCD_SCHEME};
use kdb_fjall_adapter::FjallModule;
use kdb_redis_adapter::{InMemoryCacheClient, RedisModule, REDIS_SCHEME};
use std::fmt::{Display, Formatter};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Backends exercised by the integration tests.
///
/// The remote backends run against their in-process fake clients so the
/// suite needs no servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Fjall,
    Redis,
    Etcd,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Memory,
        Backend::Fjall,
        Backend::Redis,
        Backend::Etcd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Fjall => "fjall",
            Backend::Redis => "redis",
            Backend::Etcd => "etcd",
        }
    }

    /// Whether scans yield keys in ascending byte order. Redis scans follow
    /// the server's hash-table order.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, Backend::Redis)
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone)]
pub struct TestContext {
    backend: Backend,
    store: Store,
    dir: Option<Arc<TempDir>>,
}

impl TestContext {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Directory backing an embedded store.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|dir| dir.path())
    }
}

/// The backend the demo binary runs against, picked by crate feature.
pub fn default_backend() -> Backend {
    if cfg!(feature = "memory") {
        Backend::Memory
    } else {
        Backend::Fjall
    }
}

pub fn create_test_context(backend: Backend) -> KdbResult<TestContext> {
    let (store, dir) = match backend {
        Backend::Memory => (MemoryModule::with_config().build().get_store()?, None),
        Backend::Fjall => {
            let dir = temp_dir()?;
            let store = FjallModule::with_config()
                .db_path(&dir.path().to_string_lossy())
                .build()?
                .get_store()?;
            (store, Some(Arc::new(dir)))
        }
        Backend::Redis => {
            let store = RedisModule::with_config()
                .client(Arc::new(InMemoryCacheClient::new()))
                .build()?
                .get_store()?;
            (store, None)
        }
        Backend::Etcd => {
            let store = EtcdModule::with_config()
                .endpoints(&["localhost:2379"])
                .client(Arc::new(InMemoryCoordinationClient::new()))
                .build()?
                .get_store()?;
            (store, None)
        }
    };
    log::debug!("created {} test store", backend);
    Ok(TestContext {
        backend,
        store,
        dir,
    })
}

pub fn cleanup(ctx: TestContext) -> KdbResult<()> {
    if !ctx.store.is_closed() {
        ctx.store.close()?;
    }
    Ok(())
}

/// Runs `test` once per backend on a fresh store, closing the store
/// afterwards.
///
/// Every backend runs even when an earlier one fails; the test panics at the
/// end naming each failing backend.
pub fn run_on_all_backends<T>(test: T)
where
    T: Fn(TestContext) -> KdbResult<()>,
{
    let mut failures = Vec::new();
    for backend in Backend::ALL {
        let start = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let ctx = create_test_context(backend)
                .map_err(|err| format!("before run failed: {}", err))?;
            let outcome = test(ctx.clone());
            let closed = cleanup(ctx);
            outcome.map_err(|err| format!("test failed: {}", err))?;
            closed.map_err(|err| format!("after run failed: {}", err))
        }));

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(message),
            Err(panic) => Some(match panic.downcast_ref::<&str>() {
                Some(message) => format!("panic: {}", message),
                None => match panic.downcast_ref::<String>() {
                    Some(message) => format!("panic: {}", message),
                    None => "panic: unknown payload".to_string(),
                },
            }),
        };
        if let Some(message) = failure {
            eprintln!(
                "========== {} failed (took {:?}) ==========\n{}",
                backend,
                start.elapsed(),
                message
            );
            failures.push(format!("{}: {}", backend, message));
        }
    }

    if !failures.is_empty() {
        panic!("{} backend(s) failed:\n{}", failures.len(), failures.join("\n"));
    }
}

/// A registry wired the way an application would at startup.
///
/// `redis` and `etcd` open against a fresh fake server per store, so their
/// connection strings are parsed and validated for real.
pub fn wire_registry() -> Registry {
    let registry = Registry::new();
    registry.register(kdb::store::memory::registration());
    registry.register(kdb_fjall_adapter::registration());
    registry.register(Registration::new(REDIS_SCHEME, |dsn| {
        RedisModule::from_dsn(dsn)?
            .with_client(Arc::new(InMemoryCacheClient::new()))
            .get_store()
    }));
    registry.register(Registration::new(ETCD_SCHEME, |dsn| {
        EtcdModule::from_dsn(dsn)?
            .with_client(Arc::new(InMemoryCoordinationClient::new()))
            .get_store()
    }));
    registry
}

/// Puts `key -> value-of-key` for each key and flushes.
pub fn load(store: &Store, ctx: &Context, keys: &[&str]) -> KdbResult<()> {
    for key in keys {
        store.put(ctx, key.as_bytes(), value_of(key).as_bytes())?;
    }
    store.flush_puts(ctx)
}

pub fn value_of(key: &str) -> String {
    format!("value-of-{}", key)
}

/// Keys of `items` as strings, sorted.
pub fn sorted_keys(items: &[Kv]) -> Vec<String> {
    let mut keys: Vec<String> = items
        .iter()
        .map(|kv| String::from_utf8_lossy(&kv.key).to_string())
        .collect();
    keys.sort();
    keys
}

fn temp_dir() -> KdbResult<TempDir> {
    tempfile::Builder::new()
        .prefix("kdb-it-")
        .tempdir()
        .map_err(|err| {
            log::error!("Failed to create test directory: {}", err);
            KdbError::new_with_cause("failed to create test directory", ErrorKind::IOError, err)
        })
}
