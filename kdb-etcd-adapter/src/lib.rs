//! etcd backend for kdb.
//!
//! Register it with `registry.register(kdb_etcd_adapter::registration())`
//! and open stores with
//! `etcd://[user:pass@]host1:port[,host2:port]?compression=zstd&threshold=N`.
//!
//! The network client is behind the `client` feature. Without it the
//! adapter still works against any [`CoordinationClient`], such as
//! [`InMemoryCoordinationClient`].

mod client;
mod config;
mod memory_client;
mod module;
#[cfg(feature = "client")]
mod remote;
mod store;
#[cfg(feature = "client")]
mod wrapper;

pub use client::*;
pub use config::*;
pub use memory_client::*;
pub use module::*;
#[cfg(feature = "client")]
pub use remote::*;
pub use store::*;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
