//! Storage adapters.
//!
//! The embedded sled store is the local knowledge base; the hosted index adapter
//! lives with the other HTTP clients in `http_client`.

pub mod sled_store;

pub use sled_store::SledVectorStore;
