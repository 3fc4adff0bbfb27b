//! Spatial bucket ("cell") coding.
//!
//! Cells are geohash-style base-32 codes at a fixed precision. They are pure
//! functions of location; callers that need per-entity memoization do it on
//! their side.

use thiserror::Error;

use crate::geo::LatLon;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Cell precision used for tile fetches (roughly 150 m x 150 m at the
/// equator).
pub const CELL_PRECISION: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell code is empty")]
    Empty,
    #[error("invalid cell character '{0}'")]
    InvalidChar(char),
}

/// Encode a position into its cell code at [`CELL_PRECISION`].
pub fn encode_cell(position: LatLon) -> String {
    encode_cell_at(position, CELL_PRECISION)
}

/// Encode a position into a cell code of the given length.
pub fn encode_cell_at(position: LatLon, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even = true;
    let mut index = 0usize;
    let mut bit = 0u8;
    let mut out = String::with_capacity(precision);

    while out.len() < precision {
        if even {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if position.lon >= mid {
                index = index * 2 + 1;
                lon_range.0 = mid;
            } else {
                index *= 2;
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if position.lat >= mid {
                index = index * 2 + 1;
                lat_range.0 = mid;
            } else {
                index *= 2;
                lat_range.1 = mid;
            }
        }

        even = !even;
        bit += 1;
        if bit == 5 {
            out.push(BASE32[index] as char);
            bit = 0;
            index = 0;
        }
    }

    out
}

/// Geographic bounds of a cell as (south-west, north-east) corners.
pub fn cell_bounds(cell: &str) -> Result<(LatLon, LatLon), CellError> {
    if cell.is_empty() {
        return Err(CellError::Empty);
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for ch in cell.chars() {
        let index = BASE32
            .iter()
            .position(|&b| b as char == ch)
            .ok_or(CellError::InvalidChar(ch))?;

        for shift in (0..5).rev() {
            let high = (index >> shift) & 1 == 1;
            if even {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if high {
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if high {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even = !even;
        }
    }

    Ok((
        LatLon::new(lat_range.0, lon_range.0),
        LatLon::new(lat_range.1, lon_range.1),
    ))
}

/// The eight cells surrounding `cell`, clockwise from north.
///
/// Near the poles some offsets collapse onto the same cell; duplicates are
/// removed, so fewer than eight codes may come back.
pub fn neighbors(cell: &str) -> Result<Vec<String>, CellError> {
    let (sw, ne) = cell_bounds(cell)?;
    let center = LatLon::new((sw.lat + ne.lat) / 2.0, (sw.lon + ne.lon) / 2.0);
    let lat_step = ne.lat - sw.lat;
    let lon_step = ne.lon - sw.lon;

    let offsets: [(f64, f64); 8] = [
        (1.0, 0.0),
        (1.0, 1.0),
        (0.0, 1.0),
        (-1.0, 1.0),
        (-1.0, 0.0),
        (-1.0, -1.0),
        (0.0, -1.0),
        (1.0, -1.0),
    ];

    let mut out = Vec::with_capacity(8);
    for (dy, dx) in offsets {
        let lat = (center.lat + dy * lat_step).clamp(-90.0, 90.0);
        let mut lon = center.lon + dx * lon_step;
        if lon < -180.0 {
            lon += 360.0;
        } else if lon >= 180.0 {
            lon -= 360.0;
        }

        let code = encode_cell_at(LatLon::new(lat, lon), cell.len());
        if !out.contains(&code) {
            out.push(code);
        }
    }

    Ok(out)
}

/// The covering cell set for a position: its own cell first, then the
/// surrounding neighbors.
pub fn encode_cells(position: LatLon) -> Vec<String> {
    let own = encode_cell(position);
    let mut cells = vec![own.clone()];
    if let Ok(surrounding) = neighbors(&own) {
        for code in surrounding {
            if !cells.contains(&code) {
                cells.push(code);
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{CellError, cell_bounds, encode_cell, encode_cell_at, encode_cells, neighbors};
    use crate::geo::LatLon;

    #[test]
    fn encodes_known_vectors() {
        assert_eq!(
            encode_cell_at(LatLon::new(57.64911, 10.40744), 11),
            "u4pruydqqvj"
        );
        assert_eq!(encode_cell_at(LatLon::new(42.6, -5.6), 5), "ezs42");
        assert_eq!(encode_cell(LatLon::new(57.64911, 10.40744)), "u4pruyd");
    }

    #[test]
    fn bounds_round_trip_through_center() {
        let cell = encode_cell(LatLon::new(48.8584, 2.2945));
        let (sw, ne) = cell_bounds(&cell).unwrap();
        let center = LatLon::new((sw.lat + ne.lat) / 2.0, (sw.lon + ne.lon) / 2.0);
        assert_eq!(encode_cell(center), cell);
    }

    #[test]
    fn rejects_invalid_codes() {
        assert_eq!(cell_bounds(""), Err(CellError::Empty));
        assert_eq!(cell_bounds("u4a"), Err(CellError::InvalidChar('a')));
    }

    #[test]
    fn mid_latitude_cell_has_eight_distinct_neighbors() {
        let cell = encode_cell(LatLon::new(48.8584, 2.2945));
        let surrounding = neighbors(&cell).unwrap();
        assert_eq!(surrounding.len(), 8);
        assert!(!surrounding.contains(&cell));
    }

    #[test]
    fn covering_set_leads_with_own_cell() {
        let position = LatLon::new(48.8584, 2.2945);
        let cells = encode_cells(position);
        assert_eq!(cells[0], encode_cell(position));
        assert_eq!(cells.len(), 9);
    }

    #[test]
    fn covering_set_is_pure() {
        let position = LatLon::new(57.64911, 10.40744);
        assert_eq!(encode_cells(position), encode_cells(position));
    }
}
