//! Stale-while-revalidate and stale-if-error caching for the edge.
//!
//! This crate provides:
//! - `DirectiveSet` - Cache-Control parsing and generation
//! - `Timestamp` / `Expirations` - Freshness and staleness windows
//! - `project` / `HeaderMutations` - Pure header rewriting
//! - `CacheEntry` / `CacheStatus` - The persisted entry and its label
//! - `CacheStore` / `Origin` - Host-supplied collaborators
//! - `SwrCache` - The decision engine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_cache::{FnOrigin, InMemoryStore, SwrCache, SwrRequest};
//! use edge_core::EdgeResponse;
//! use edge_executor::TokioWaitUntil;
//!
//! let cache = SwrCache::new(InMemoryStore::new());
//! let background = TokioWaitUntil::new();
//! let origin = Arc::new(FnOrigin(|| async { Ok(EdgeResponse::ok("hello")) }));
//!
//! let response = cache
//!     .handle(&SwrRequest::get("GET /hello"), origin, &background)
//!     .await?;
//! background.join_all().await;
//! ```

mod directives;
mod entry;
mod error;
mod expiry;
mod headers;
mod key;
mod store;
mod swr;

pub use directives::*;
pub use entry::*;
pub use error::*;
pub use expiry::*;
pub use headers::*;
pub use key::*;
pub use store::*;
pub use swr::SwrCache;
