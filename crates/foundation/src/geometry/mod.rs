//! Tag geometries in basic image coordinates.
//!
//! Basic coordinates are normalized to the [0, 1] x [0, 1] image plane.
//! Construction and explicit mutation validate; interactive mutation (adding
//! or dragging vertices) clamps instead, so a drag can never corrupt a
//! geometry.

mod point;
mod polygon;

pub use point::PointGeometry;
pub use polygon::PolygonGeometry;

use thiserror::Error;

/// A position on the normalized image plane.
pub type Basic = [f64; 2];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("basic coordinate out of range: ({0}, {1})")]
    OutOfRange(f64, f64),
    #[error("ring must hold at least three positions")]
    TooFewVertices,
    #[error("ring must be closed (first and last positions equal)")]
    RingNotClosed,
    #[error("vertex index {0} out of range")]
    IndexOutOfRange(usize),
}

/// Shared capabilities of the geometry kinds.
pub trait Geometry {
    /// Axis-aligned extent as (min, max) corners in basic coordinates.
    fn extent(&self) -> (Basic, Basic);

    /// Center of the geometry in basic coordinates.
    fn centroid(&self) -> Basic;

    /// Move the geometry so its centroid lands on `value`, limiting the
    /// translation so every vertex stays in range.
    fn set_centroid(&mut self, value: Basic);
}

pub(crate) fn validate_basic(position: Basic) -> Result<(), GeometryError> {
    let [x, y] = position;
    if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
        return Err(GeometryError::OutOfRange(x, y));
    }
    Ok(())
}

pub(crate) fn clamp_basic(position: Basic) -> Basic {
    [position[0].clamp(0.0, 1.0), position[1].clamp(0.0, 1.0)]
}
