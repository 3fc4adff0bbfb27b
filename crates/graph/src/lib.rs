//! Lazily populated graph of captured images.
//!
//! The [`Graph`] pulls node metadata, spatial cells and sequences from a
//! [`api::DataProvider`] on demand, deduplicating concurrent requests and
//! indexing nodes for spatial queries. Each [`Node`] owns a [`NodeCache`]
//! holding its binary assets and derived navigation edges.

pub mod edge;
pub mod error;
pub mod flight;
pub mod graph;
pub mod mesh;
pub mod node;
pub mod node_cache;
pub mod sequence;
pub mod spatial;

pub use edge::{Edge, EdgeDirection, EdgeStatus};
pub use error::GraphError;
pub use flight::Flight;
pub use graph::{Graph, GraphOptions};
pub use mesh::{Mesh, MeshDecodeError};
pub use node::Node;
pub use node_cache::{AssetFlight, NodeCache};
pub use sequence::Sequence;
pub use spatial::NodeIndex;
