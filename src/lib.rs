//! amortkv - Concurrent in-memory key-value backends for benchmarking
//!
//! This crate provides interchangeable key-value stores for a YCSB style
//! benchmark harness. Every store implements the same [backend::Backend]
//! operations (read, insert, update, delete and an unsupported scan) so the
//! harness can drive them from many worker threads and compare them.
//!
//! The interesting store is the [amortmap::AmortizedMap]. It is built for
//! workloads where nearly every operation is a read or an overwrite of an
//! existing key. Those operations never take a lock: they go through an
//! immutable read-only view of the map, published through an epoch protected
//! pointer. New keys go to a locked dirty view, which is promoted to become
//! the read-only view once enough operations have had to search it.
//!
//! The other stores exist to compare against:
//!
//! * [backend::SegmentedBackend] - a hash map split into independently locked segments
//! * [backend::RwLockBackend] - a hash map behind one global read-write lock
//!
//! Backends are selected by name through the [registry::Registry].
//!
//! # Features
//!
//! * `foldhash` - hash keys with the foldhash crate (default)
//! * `ahash` - hash keys with the ahash crate
//!
//! With neither enabled the std `RandomState` is used.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]

pub mod amortmap;
pub mod backend;
mod error;
pub mod registry;
mod utils;

pub use amortmap::AmortizedMap;
pub use error::BackendError;
