pub mod cells;
pub mod geo;
pub mod geometry;

// Foundation crate: small, well-tested primitives only.
pub use cells::*;
pub use geo::*;
pub use geometry::*;
