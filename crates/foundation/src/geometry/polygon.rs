use super::{Basic, Geometry, GeometryError, clamp_basic, validate_basic};

/// A closed polygon on the image plane, with optional holes.
///
/// Rings carry an explicit closing position: the first and last entries are
/// equal, and a valid ring holds at least three positions including the
/// closing one.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonGeometry {
    polygon: Vec<Basic>,
    holes: Vec<Vec<Basic>>,
}

impl PolygonGeometry {
    pub fn new(polygon: Vec<Basic>) -> Result<Self, GeometryError> {
        Self::with_holes(polygon, Vec::new())
    }

    pub fn with_holes(polygon: Vec<Basic>, holes: Vec<Vec<Basic>>) -> Result<Self, GeometryError> {
        validate_ring(&polygon)?;
        for hole in &holes {
            validate_ring(hole)?;
        }
        Ok(Self { polygon, holes })
    }

    pub fn polygon(&self) -> &[Basic] {
        &self.polygon
    }

    pub fn holes(&self) -> &[Vec<Basic>] {
        &self.holes
    }

    /// Insert a vertex right before the closing position, clamped into range.
    pub fn add_vertex(&mut self, vertex: Basic) {
        let closing = self.polygon.len() - 1;
        self.polygon.insert(closing, clamp_basic(vertex));
    }

    /// Remove the vertex at `index`.
    ///
    /// Removing the first or closing position re-closes the ring on the new
    /// first vertex. Errors if the index is out of range or the ring would
    /// drop below three positions.
    pub fn remove_vertex(&mut self, index: usize) -> Result<(), GeometryError> {
        if index >= self.polygon.len() {
            return Err(GeometryError::IndexOutOfRange(index));
        }
        if self.polygon.len() <= 3 {
            return Err(GeometryError::TooFewVertices);
        }

        let closing = self.polygon.len() - 1;
        if index == 0 || index == closing {
            self.polygon.pop();
            self.polygon.remove(0);
            let first = self.polygon[0];
            self.polygon.push(first);
        } else {
            self.polygon.remove(index);
        }

        Ok(())
    }

    /// Move the vertex at `index`, clamped into range.
    ///
    /// The first and closing positions move together.
    pub fn set_vertex(&mut self, index: usize, vertex: Basic) -> Result<(), GeometryError> {
        if index >= self.polygon.len() {
            return Err(GeometryError::IndexOutOfRange(index));
        }

        let vertex = clamp_basic(vertex);
        let closing = self.polygon.len() - 1;
        if index == 0 || index == closing {
            self.polygon[0] = vertex;
            self.polygon[closing] = vertex;
        } else {
            self.polygon[index] = vertex;
        }

        Ok(())
    }
}

impl Geometry for PolygonGeometry {
    fn extent(&self) -> (Basic, Basic) {
        let mut min = [f64::INFINITY, f64::INFINITY];
        let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        for vertex in &self.polygon {
            for axis in 0..2 {
                min[axis] = min[axis].min(vertex[axis]);
                max[axis] = max[axis].max(vertex[axis]);
            }
        }
        (min, max)
    }

    fn centroid(&self) -> Basic {
        let open = &self.polygon[..self.polygon.len() - 1];
        let mut sum = [0.0, 0.0];
        for vertex in open {
            sum[0] += vertex[0];
            sum[1] += vertex[1];
        }
        let count = open.len() as f64;
        [sum[0] / count, sum[1] / count]
    }

    fn set_centroid(&mut self, value: Basic) {
        let centroid = self.centroid();
        let (min, max) = self.extent();

        let mut translation = [0.0, 0.0];
        for axis in 0..2 {
            let wanted = value[axis] - centroid[axis];
            translation[axis] = wanted.clamp(-min[axis], 1.0 - max[axis]);
        }

        for vertex in &mut self.polygon {
            vertex[0] += translation[0];
            vertex[1] += translation[1];
        }
    }
}

fn validate_ring(ring: &[Basic]) -> Result<(), GeometryError> {
    if ring.len() < 3 {
        return Err(GeometryError::TooFewVertices);
    }
    if ring[0] != ring[ring.len() - 1] {
        return Err(GeometryError::RingNotClosed);
    }
    for &vertex in ring {
        validate_basic(vertex)?;
    }
    Ok(())
}
