/// Navigation direction from one node to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Previous node in the capture sequence.
    Prev,
    /// Next node in the capture sequence.
    Next,
    /// Spatially close node outside the sequence ordering.
    Neighbor,
}

/// Directed navigation edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub direction: EdgeDirection,
}

/// Edges of one kind for a node, with a flag telling whether derivation has
/// run yet. An empty edge list only means "no edges" once `cached` is true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeStatus {
    pub cached: bool,
    pub edges: Vec<Edge>,
}
