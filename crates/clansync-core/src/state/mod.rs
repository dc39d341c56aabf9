// # Storage Implementations
//
// This module provides the in-memory implementation of the storage traits.
// The SQLite backend lives in the `clansync-store-sqlite` crate.

pub mod memory;

pub use memory::MemoryStorage;
