//! Shared test fixtures: temporary stores, linked chains and broken ones.

pub mod test_utils;

pub use test_utils::*;
