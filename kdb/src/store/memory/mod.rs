//! In-process `memory://` store, used as the reference implementation of the
//! store contract and in tests.

mod config;
mod module;
mod store;

pub use config::*;
pub use module::*;
pub use store::*;
