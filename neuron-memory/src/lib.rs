//! Persistent memory store and embedding recall for the gateway (§4.D/§4.E).
//!
//! [`store`] is the SQLite-backed record store; [`cache`] layers an
//! in-process embedding cache and cosine-similarity recall on top of it.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{EmbeddingCache, RecallHit, RecallScope};
pub use error::MemoryError;
pub use store::{MemoryRecord, MemoryScope, MemoryStore};
