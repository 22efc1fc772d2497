//! Shared fixtures for the kdb integration tests and the load demo.

pub mod test_util;
