//! Wire types and provider traits for the node graph.
//!
//! The graph crate is written against the [`DataProvider`] and
//! [`AssetLoader`] traits so that metadata and asset transport can be
//! swapped out without touching caching logic.

pub mod provider;
pub mod types;

pub use provider::*;
pub use types::*;
