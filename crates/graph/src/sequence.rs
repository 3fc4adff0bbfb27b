use api::SequenceData;

use crate::edge::{Edge, EdgeDirection};

/// Ordered capture sequence of node keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    key: String,
    keys: Vec<String>,
}

impl Sequence {
    pub fn new(data: SequenceData) -> Self {
        Self {
            key: data.key,
            keys: data.keys,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn find_prev(&self, key: &str) -> Option<&str> {
        let index = self.keys.iter().position(|k| k == key)?;
        if index == 0 {
            None
        } else {
            Some(&self.keys[index - 1])
        }
    }

    pub fn find_next(&self, key: &str) -> Option<&str> {
        let index = self.keys.iter().position(|k| k == key)?;
        self.keys.get(index + 1).map(String::as_str)
    }

    /// Sequence edges for `key`: a prev edge and a next edge where neighbors
    /// exist. A key absent from the sequence, or alone in it, has none.
    pub fn edges_for(&self, key: &str) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(2);
        if let Some(prev) = self.find_prev(key) {
            edges.push(Edge {
                from: key.to_string(),
                to: prev.to_string(),
                direction: EdgeDirection::Prev,
            });
        }
        if let Some(next) = self.find_next(key) {
            edges.push(Edge {
                from: key.to_string(),
                to: next.to_string(),
                direction: EdgeDirection::Next,
            });
        }
        edges
    }
}
