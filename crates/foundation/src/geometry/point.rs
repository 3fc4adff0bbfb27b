use super::{Basic, Geometry, GeometryError, clamp_basic, validate_basic};

/// A single tagged point on the image plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGeometry {
    point: Basic,
}

impl PointGeometry {
    pub fn new(point: Basic) -> Result<Self, GeometryError> {
        validate_basic(point)?;
        Ok(Self { point })
    }

    pub fn point(&self) -> Basic {
        self.point
    }
}

impl Geometry for PointGeometry {
    fn extent(&self) -> (Basic, Basic) {
        (self.point, self.point)
    }

    fn centroid(&self) -> Basic {
        self.point
    }

    fn set_centroid(&mut self, value: Basic) {
        self.point = clamp_basic(value);
    }
}
