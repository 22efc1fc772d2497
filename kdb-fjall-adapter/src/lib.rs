//! Fjall (LSM-tree) backend for kdb.
//!
//! Register it with `registry.register(kdb_fjall_adapter::registration())`
//! and open stores with `fjall://<path>?compression=none|lz4`.

mod config;
mod module;
mod store;
mod wrapper;

pub use config::*;
pub use module::*;
pub use store::*;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
