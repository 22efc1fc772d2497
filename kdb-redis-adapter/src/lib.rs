//! Redis backend for kdb.
//!
//! Register it with `registry.register(kdb_redis_adapter::registration())`
//! and open stores with `redis://[user:pass@]host:port[/db]?compression=zstd&threshold=N`.
//! [`InMemoryCacheClient`] stands in for a server in tests.

mod client;
mod config;
mod memory_client;
mod module;
mod store;
mod wrapper;

pub use client::*;
pub use config::*;
pub use memory_client::*;
pub use module::*;
pub use store::*;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
