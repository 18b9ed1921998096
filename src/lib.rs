//! yield-table: a chained `{key, yield}` multimap for fixed-width typed
//! objects, with pluggable hash functions.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one table engine that stores any registered object type as key
//!   or yield and hashes it through an interchangeable byte-level hash.
//! - Layers:
//!   - `object`: the registry of storable types. Every type implements
//!     `HashObject` (compare, copy, marshal to a fixed number of bytes).
//!   - `strategy`: hash functions over marshalled bytes (LCG, Zobrist,
//!     keyed MD5 digest), selected per table.
//!   - `keyed_digest`: the process-wide secret behind the keyed digest.
//!   - `hash_table`: `HashTable<K, Y, S>` with chained buckets, cursor
//!     iteration and automatic doubling.
//!   - `connection`: network-flow adapters (`Connection`,
//!     `OneSidedConnection`, `ConnectionInfo`).
//!
//! Constraints
//! - Multimap: one key may map to many yields; a `{key, yield}` pair is
//!   stored at most once and duplicate inserts fail.
//! - Bucket counts are powers of two, never below 16; the bucket of an
//!   item is `hash(marshal(key)) & (buckets - 1)`.
//! - New items are prepended to their chain.
//! - Equality is `compare == Equal`; types keep `compare` consistent with
//!   their marshalled bytes so equal keys always share a bucket.
//! - Stable, generational `ItemHandle`s: they survive rebuilds and never
//!   resolve once their item is removed.
//!
//! Ownership
//! - A table either copies keys/yields on insert or stores references to
//!   caller-owned values (`copy_keys` / `copy_yields`). Referenced values
//!   must outlive the table's lifetime parameter and are never dropped by
//!   it.
//!
//! Concurrency
//! - A table is not internally synchronized; mutation takes `&mut self`.
//!   A hash strategy may be shared between tables (`Rc`/`Arc`/`&S`).
//! - The keyed digest secret is generated exactly once per process, even
//!   under concurrent first use.

pub mod config;
pub mod connection;
pub mod error;
pub mod hash_table;
mod hash_table_proptest;
pub mod keyed_digest;
pub mod object;
pub mod strategy;

// Public surface
pub use config::{
    TableOptions, DEFAULT_MAX_BUCKET_OCCUPANCY_RATIO, MAX_BUCKETS, MIN_BUCKETS,
};
pub use connection::{Connection, ConnectionInfo, OneSidedConnection};
pub use error::{HashTableError, Result};
pub use hash_table::{HashTable, ItemHandle, Iter};
pub use object::{Double, HashObject, Marshalled, ObjectDescriptor, ObjectType, UnsignedInt};
pub use strategy::{HashFunction, HashFunctionType, HashStrategy, KeyedDigest, Lcg, Zobrist};
