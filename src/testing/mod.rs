//! Test fixtures: mock backends and registry helpers.

pub mod mocks;

pub use mocks::{doubling_backend, registry_lock, FlakyBackend, MockBackend, UnhealthyBackend};
