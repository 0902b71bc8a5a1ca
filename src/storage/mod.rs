//!
//! practicum storage module
//! ------------------------
//! In-process storage primitives shared by the identity and practice layers.
//! `kv` is a TTL key/value map used as the revocation backing store; durable
//! persistence of sessions and attempts lives behind `practice::store::PracticeStore`.

pub mod kv;

pub use kv::KvStore;
