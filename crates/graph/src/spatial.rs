use std::collections::HashSet;

use foundation::LatLon;
use rstar::{AABB, RTree, RTreeObject};

/// Node entry in the spatial index. Position is `[lon, lat]` so the tree
/// axes match conventional x and y.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedNode {
    pub key: String,
    pub position: [f64; 2],
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// R-tree over node positions with insert-once semantics per key.
#[derive(Debug, Default)]
pub struct NodeIndex {
    tree: RTree<IndexedNode>,
    keys: HashSet<String>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a node. Later inserts for the same key are ignored, so a node
    /// reported by several cell responses is indexed exactly once.
    pub fn insert(&mut self, key: &str, position: LatLon) {
        if self.keys.insert(key.to_string()) {
            self.tree.insert(IndexedNode {
                key: key.to_string(),
                position: [position.lon, position.lat],
            });
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Keys of all indexed nodes inside the box spanned by `sw` and `ne`.
    ///
    /// A box whose west edge lies east of its east edge crosses the
    /// antimeridian and is searched as two envelopes.
    pub fn search(&self, sw: LatLon, ne: LatLon) -> Vec<&str> {
        if sw.lon <= ne.lon {
            self.search_envelope(AABB::from_corners([sw.lon, sw.lat], [ne.lon, ne.lat]))
        } else {
            let mut found =
                self.search_envelope(AABB::from_corners([sw.lon, sw.lat], [180.0, ne.lat]));
            found.extend(
                self.search_envelope(AABB::from_corners([-180.0, sw.lat], [ne.lon, ne.lat])),
            );
            found
        }
    }

    fn search_envelope(&self, envelope: AABB<[f64; 2]>) -> Vec<&str> {
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|node| node.key.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn search_returns_nodes_in_box() {
        let mut index = NodeIndex::new();
        index.insert("inside", LatLon::new(55.0, 12.0));
        index.insert("outside", LatLon::new(56.0, 13.0));

        let mut found = index.search(LatLon::new(54.9, 11.9), LatLon::new(55.1, 12.1));
        found.sort_unstable();
        assert_eq!(found, vec!["inside"]);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut index = NodeIndex::new();
        index.insert("a", LatLon::new(10.0, 10.0));
        index.insert("a", LatLon::new(20.0, 20.0));

        assert_eq!(index.len(), 1);
        let found = index.search(LatLon::new(9.0, 9.0), LatLon::new(11.0, 11.0));
        assert_eq!(found, vec!["a"]);
    }

    #[test]
    fn wrapped_box_searches_both_sides_of_antimeridian() {
        let mut index = NodeIndex::new();
        index.insert("east", LatLon::new(0.0, 179.9999));
        index.insert("west", LatLon::new(0.0, -179.9999));
        index.insert("greenwich", LatLon::new(0.0, 0.0));

        let mut found = index.search(LatLon::new(-0.1, 179.99), LatLon::new(0.1, -179.99));
        found.sort_unstable();
        assert_eq!(found, vec!["east", "west"]);
    }

    #[test]
    fn clear_empties_index() {
        let mut index = NodeIndex::new();
        index.insert("a", LatLon::new(0.0, 0.0));
        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains("a"));
    }
}
