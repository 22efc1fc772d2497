use crate::common::StoreOption;
use crate::errors::{ErrorKind, KdbError, KdbResult};
use crate::store::Store;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Opens a store from a full connection string.
pub type StoreFactory = Arc<dyn Fn(&str) -> KdbResult<Store> + Send + Sync>;

/// A backend name bound to the factory that opens it.
#[derive(Clone)]
pub struct Registration {
    name: String,
    factory: StoreFactory,
}

impl Registration {
    pub fn new<F>(name: &str, factory: F) -> Registration
    where
        F: Fn(&str) -> KdbResult<Store> + Send + Sync + 'static,
    {
        Registration {
            name: name.to_string(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the factory. Option decorators are not applied here.
    pub fn open(&self, dsn: &str) -> KdbResult<Store> {
        (self.factory)(dsn)
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .finish()
    }
}

/// Maps backend names to their factories.
///
/// A process wires its registry once at startup, registering each adapter it
/// links, and then opens stores by connection string. The scheme of the
/// connection string (the text before the first `:`) selects the backend.
///
/// ```rust,ignore
/// let registry = Registry::new();
/// registry.register(kdb::store::memory::registration());
/// registry.register(kdb_fjall_adapter::registration());
///
/// let store = registry.open("fjall:///var/lib/kv", &[])?;
/// ```
///
/// Registration is append-only. Registering a blank or duplicate name is a
/// wiring defect and panics.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    registrations: DashMap<String, Registration>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Adds a backend.
    ///
    /// # Panics
    ///
    /// If the name is blank or already registered.
    pub fn register(&self, registration: Registration) {
        let name = registration.name().to_string();
        if name.trim().is_empty() {
            log::error!("Cannot register a kv store without a name");
            panic!("kv store name must not be blank");
        }

        let duplicate = match self.inner.registrations.entry(name.clone()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(entry) => {
                entry.insert(registration);
                false
            }
        };
        if duplicate {
            log::error!("Kv store {} is already registered", name);
            panic!("kv store {:?} registered twice", name);
        }
        log::debug!("registered kv store {}", name);
    }

    pub fn lookup(&self, name: &str) -> Option<Registration> {
        self.inner
            .registrations
            .get(name)
            .map(|registration| registration.value().clone())
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .registrations
            .iter()
            .map(|registration| registration.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Opens the backend selected by the connection string's scheme and
    /// applies `options` in order.
    ///
    /// Options the store does not support are ignored. If applying an option
    /// fails the store is closed and the error returned.
    pub fn open(&self, dsn: &str, options: &[StoreOption]) -> KdbResult<Store> {
        let scheme = dsn.split(':').next().unwrap_or_default();
        let registration = self.lookup(scheme).ok_or_else(|| {
            KdbError::new(
                &format!("no such kv store registered: {:?}", scheme),
                ErrorKind::BackendNotRegistered,
            )
        })?;

        log::debug!("opening {} kv store", scheme);
        let store = registration.open(dsn)?;
        for option in options {
            if let Err(err) = store.apply_option(option) {
                log::error!("Failed to apply {:?} to {} store: {}", option, scheme, err);
                if let Err(close_err) = store.close() {
                    log::error!("Failed to close {} store: {}", scheme, close_err);
                }
                return Err(err);
            }
        }
        Ok(store)
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}
