//! Core types shared by the edge stale-while-revalidate cache.
//!
//! This crate provides the fundamental building blocks:
//! - `EdgeResponse` - Response value exchanged with the origin and the store
//! - `Clock` - Millisecond wall clock (`SystemClock`, `ManualClock`)
//! - `SwrConfig` - Engine switches (debug headers, disable caching)

mod clock;
mod config;
mod response;

pub use clock::*;
pub use config::*;
pub use response::*;
