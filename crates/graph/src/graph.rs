use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use api::{DataProvider, FullNodeData};
use foundation::{LatLon, bounding_box, encode_cells};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::flight::{self, Flight};
use crate::node::Node;
use crate::sequence::Sequence;
use crate::spatial::NodeIndex;

/// Tuning knobs for the graph.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Radius around a node used when checking spatial coverage, in meters.
    pub spatial_radius_m: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            spatial_radius_m: 25.0,
        }
    }
}

/// The node graph: nodes, sequences and a spatial index, filled lazily by
/// caching operations against a [`DataProvider`].
///
/// Every caching operation validates its preconditions synchronously and
/// returns a [`Flight`] for the asynchronous part. Concurrent requests for
/// the same resource share one upstream call. Work always runs to
/// completion once started; dropping a flight only stops observing it.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

struct GraphInner {
    provider: Arc<dyn DataProvider>,
    options: GraphOptions,
    state: Mutex<GraphState>,
    changed_tx: watch::Sender<u64>,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    sequences: HashMap<String, Sequence>,
    index: NodeIndex,
    /// Covering cells per node, encoded at most once.
    node_cells: HashMap<String, Vec<String>>,
    cached_cells: HashSet<String>,
    caching_cells: HashMap<String, Flight>,
    caching_full: HashMap<String, Flight>,
    caching_fill: HashMap<String, Flight>,
    caching_sequences: HashMap<String, Flight>,
    caching_node_sequences: HashMap<String, NodeSequenceFetch>,
    /// Bumped on reset; fetches apply their results only in the epoch they
    /// started in.
    epoch: u64,
}

/// In-flight sequence fetch serving one or more nodes of that sequence.
struct NodeSequenceFetch {
    flight: Flight,
    node_keys: Vec<String>,
}

impl GraphInner {
    fn bump(&self) {
        self.changed_tx.send_modify(|version| *version += 1);
    }
}

impl Graph {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self::with_options(provider, GraphOptions::default())
    }

    pub fn with_options(provider: Arc<dyn DataProvider>, options: GraphOptions) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                provider,
                options,
                state: Mutex::new(GraphState::default()),
                changed_tx: watch::Sender::new(0),
            }),
        }
    }

    /// Counter bumped whenever the graph gains or loses nodes or metadata.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changed_tx.subscribe()
    }

    /// Fetch full metadata for a node, creating it if unknown.
    ///
    /// Errors synchronously if the node is already full. A node known only
    /// from its core data is completed in place and keeps its index entry.
    pub fn cache_full(&self, key: &str) -> Result<Flight, GraphError> {
        let mut st = self.inner.state.lock();
        if let Some(existing) = st.caching_full.get(key) {
            return Ok(existing.clone());
        }
        if let Some(node) = st.nodes.get(key) {
            if node.is_full() {
                return Err(GraphError::AlreadyFull(key.to_string()));
            }
        }

        let (resolver, fl) = flight::flight();
        st.caching_full.insert(key.to_string(), fl.clone());
        let epoch = st.epoch;
        drop(st);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = run_full_fetch(&inner, &key, epoch).await;
            {
                let mut st = inner.state.lock();
                if st.epoch == epoch {
                    st.caching_full.remove(&key);
                }
            }
            if outcome.is_ok() {
                inner.bump();
            }
            resolver.resolve(outcome);
        });
        Ok(fl)
    }

    /// Complete an already known core node with fill metadata.
    pub fn cache_fill(&self, key: &str) -> Result<Flight, GraphError> {
        let mut st = self.inner.state.lock();
        if let Some(existing) = st.caching_fill.get(key) {
            return Ok(existing.clone());
        }
        if st.caching_full.contains_key(key) {
            return Err(GraphError::CachingFull(key.to_string()));
        }
        let node = st
            .nodes
            .get(key)
            .ok_or_else(|| GraphError::NodeMissing(key.to_string()))?;
        if node.is_full() {
            return Err(GraphError::AlreadyFull(key.to_string()));
        }

        let (resolver, fl) = flight::flight();
        st.caching_fill.insert(key.to_string(), fl.clone());
        let epoch = st.epoch;
        drop(st);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = run_fill_fetch(&inner, &key, epoch).await;
            {
                let mut st = inner.state.lock();
                if st.epoch == epoch {
                    st.caching_fill.remove(&key);
                }
            }
            if outcome.is_ok() {
                inner.bump();
            }
            resolver.resolve(outcome);
        });
        Ok(fl)
    }

    /// Fetch the spatial cells covering a node, indexing every node they
    /// contain. Returns one flight per cell still being fetched; an empty
    /// vector means all covering cells are already cached.
    pub fn cache_tiles(&self, key: &str) -> Result<Vec<Flight>, GraphError> {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        let node = st
            .nodes
            .get(key)
            .ok_or_else(|| GraphError::NodeMissing(key.to_string()))?;
        let position = node.position()?;
        let cells = st
            .node_cells
            .entry(key.to_string())
            .or_insert_with(|| encode_cells(position))
            .clone();

        let mut flights = Vec::new();
        for cell in cells {
            if st.cached_cells.contains(&cell) {
                continue;
            }
            if let Some(existing) = st.caching_cells.get(&cell) {
                flights.push(existing.clone());
                continue;
            }

            let (resolver, fl) = flight::flight();
            st.caching_cells.insert(cell.clone(), fl.clone());
            flights.push(fl);
            let epoch = st.epoch;

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let outcome = run_cell_fetch(&inner, &cell, epoch).await;
                {
                    let mut st = inner.state.lock();
                    if st.epoch == epoch {
                        st.caching_cells.remove(&cell);
                    }
                }
                if outcome.is_ok() {
                    inner.bump();
                }
                resolver.resolve(outcome);
            });
        }
        Ok(flights)
    }

    /// Fetch the sequence a node belongs to and derive its sequence edges.
    pub fn cache_node_sequence(&self, key: &str) -> Result<Flight, GraphError> {
        let mut st = self.inner.state.lock();
        let node = st
            .nodes
            .get(key)
            .ok_or_else(|| GraphError::NodeMissing(key.to_string()))?;
        if !node.is_full() {
            return Err(GraphError::NotFull(key.to_string()));
        }
        let sequence_key = node
            .sequence_key()?
            .ok_or_else(|| GraphError::MissingSequenceKey(key.to_string()))?;
        if st.sequences.contains_key(&sequence_key) {
            return Err(GraphError::NodeSequenceCached(key.to_string()));
        }
        if let Some(existing) = st.caching_node_sequences.get_mut(&sequence_key) {
            // Joining nodes get their edges derived at completion too.
            if !existing.node_keys.iter().any(|k| k == key) {
                existing.node_keys.push(key.to_string());
            }
            return Ok(existing.flight.clone());
        }

        let (resolver, fl) = flight::flight();
        st.caching_node_sequences.insert(
            sequence_key.clone(),
            NodeSequenceFetch {
                flight: fl.clone(),
                node_keys: vec![key.to_string()],
            },
        );
        let epoch = st.epoch;
        drop(st);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = fetch_sequence(&inner, &sequence_key, epoch).await;
            let entry = {
                let mut st = inner.state.lock();
                if st.epoch == epoch {
                    st.caching_node_sequences.remove(&sequence_key)
                } else {
                    None
                }
            };
            if outcome.is_ok() {
                if let Some(entry) = entry {
                    derive_sequence_edges(&inner, &sequence_key, &entry.node_keys);
                }
                inner.bump();
            }
            resolver.resolve(outcome);
        });
        Ok(fl)
    }

    /// Fetch a sequence by its own key. Has no preconditions; an already
    /// cached sequence yields an immediately resolved flight.
    pub fn cache_sequence(&self, sequence_key: &str) -> Flight {
        let mut st = self.inner.state.lock();
        if st.sequences.contains_key(sequence_key) {
            return flight::resolved(Ok(()));
        }
        if let Some(existing) = st.caching_sequences.get(sequence_key) {
            return existing.clone();
        }

        let (resolver, fl) = flight::flight();
        st.caching_sequences
            .insert(sequence_key.to_string(), fl.clone());
        let epoch = st.epoch;
        drop(st);

        let inner = Arc::clone(&self.inner);
        let sequence_key = sequence_key.to_string();
        tokio::spawn(async move {
            let outcome = fetch_sequence(&inner, &sequence_key, epoch).await;
            {
                let mut st = inner.state.lock();
                if st.epoch == epoch {
                    st.caching_sequences.remove(&sequence_key);
                }
            }
            if outcome.is_ok() {
                inner.bump();
            }
            resolver.resolve(outcome);
        });
        fl
    }

    /// Re-derive sequence edges for a node from its already cached
    /// sequence.
    pub fn cache_sequence_edges(&self, key: &str) -> Result<(), GraphError> {
        let st = self.inner.state.lock();
        let node = st
            .nodes
            .get(key)
            .ok_or_else(|| GraphError::NodeMissing(key.to_string()))?;
        let sequence_key = node
            .sequence_key()?
            .ok_or_else(|| GraphError::MissingSequenceKey(key.to_string()))?;
        let sequence = st
            .sequences
            .get(&sequence_key)
            .ok_or(GraphError::SequenceMissing(sequence_key))?;
        let edges = sequence.edges_for(key);
        node.ensure_cache()?.cache_sequence_edges(edges);
        Ok(())
    }

    pub fn has_node(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .nodes
            .get(key)
            .is_some_and(|node| !node.is_disposed())
    }

    pub fn get_node(&self, key: &str) -> Option<Node> {
        self.inner.state.lock().nodes.get(key).cloned()
    }

    pub fn is_caching_full(&self, key: &str) -> bool {
        self.inner.state.lock().caching_full.contains_key(key)
    }

    pub fn is_caching_fill(&self, key: &str) -> bool {
        self.inner.state.lock().caching_fill.contains_key(key)
    }

    pub fn is_caching_node_sequence(&self, key: &str) -> bool {
        let st = self.inner.state.lock();
        let Some(Ok(Some(sequence_key))) = st.nodes.get(key).map(|n| n.sequence_key()) else {
            return false;
        };
        st.caching_node_sequences.contains_key(&sequence_key)
    }

    pub fn is_caching_sequence(&self, sequence_key: &str) -> bool {
        self.inner
            .state
            .lock()
            .caching_sequences
            .contains_key(sequence_key)
    }

    /// Whether all cells covering the node are cached.
    pub fn has_tiles(&self, key: &str) -> bool {
        let mut guard = self.inner.state.lock();
        let st = &mut *guard;
        let Some(node) = st.nodes.get(key) else {
            return false;
        };
        let Ok(position) = node.position() else {
            return false;
        };
        st.node_cells
            .entry(key.to_string())
            .or_insert_with(|| encode_cells(position))
            .iter()
            .all(|cell| st.cached_cells.contains(cell))
    }

    /// Whether any cell covering the node is currently being fetched.
    pub fn is_caching_tiles(&self, key: &str) -> bool {
        let st = self.inner.state.lock();
        st.node_cells.get(key).is_some_and(|cells| {
            cells.iter().any(|cell| st.caching_cells.contains_key(cell))
        })
    }

    pub fn has_sequence(&self, sequence_key: &str) -> bool {
        self.inner.state.lock().sequences.contains_key(sequence_key)
    }

    pub fn get_sequence(&self, sequence_key: &str) -> Option<Sequence> {
        self.inner.state.lock().sequences.get(sequence_key).cloned()
    }

    /// Whether the sequence of the given node is cached.
    pub fn has_node_sequence(&self, key: &str) -> bool {
        let st = self.inner.state.lock();
        let Some(Ok(Some(sequence_key))) = st.nodes.get(key).map(|n| n.sequence_key()) else {
            return false;
        };
        st.sequences.contains_key(&sequence_key)
    }

    /// Whether every indexed node within the spatial radius of the given
    /// node is full. Only then can spatial edges be derived for it.
    pub fn has_spatial_area(&self, key: &str) -> Result<bool, GraphError> {
        let st = self.inner.state.lock();
        let node = st
            .nodes
            .get(key)
            .ok_or_else(|| GraphError::NodeMissing(key.to_string()))?;
        let position = node.position()?;
        let (sw, ne) = bounding_box(position, self.inner.options.spatial_radius_m);
        let all_full = st
            .index
            .search(sw, ne)
            .into_iter()
            .all(|found| st.nodes.get(found).is_some_and(|n| n.is_full()));
        Ok(all_full)
    }

    /// Tell the provider which nodes and sequences are being viewed. Best
    /// effort.
    pub fn report_viewed(&self, image_keys: Vec<String>, sequence_keys: Vec<String>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(err) = inner
                .provider
                .report_viewed(&image_keys, &sequence_keys)
                .await
            {
                warn!(%err, "view report failed");
            }
        });
    }

    /// Drop everything except the given nodes, disposing the rest. Kept
    /// nodes lose their derived spatial edges since their surroundings are
    /// gone.
    pub fn reset(&self, keep_keys: &[String]) {
        let keep: HashSet<&str> = keep_keys.iter().map(String::as_str).collect();
        let mut st = self.inner.state.lock();

        let removed: Vec<String> = st
            .nodes
            .keys()
            .filter(|key| !keep.contains(key.as_str()))
            .cloned()
            .collect();
        for key in &removed {
            if let Some(node) = st.nodes.remove(key) {
                node.dispose();
            }
        }
        for node in st.nodes.values() {
            if let Some(cache) = node.cache() {
                cache.reset_spatial_edges();
            }
        }

        st.sequences.clear();
        st.index.clear();
        st.node_cells.clear();
        st.cached_cells.clear();
        // In-flight fetches keep running but apply nothing once the epoch
        // moves on; dropping their markers lets new calls start fresh.
        st.caching_cells.clear();
        st.caching_full.clear();
        st.caching_fill.clear();
        st.caching_sequences.clear();
        st.caching_node_sequences.clear();
        st.epoch += 1;
        drop(st);

        debug!(kept = keep_keys.len(), removed = removed.len(), "graph reset");
        self.inner.bump();
    }
}

async fn run_full_fetch(
    inner: &Arc<GraphInner>,
    key: &str,
    epoch: u64,
) -> Result<(), GraphError> {
    let keys = vec![key.to_string()];
    let outcome = match inner.provider.nodes_full(&keys).await {
        Ok(mut result) => apply_full(inner, key, result.remove(key), epoch),
        Err(err) => Err(err.into()),
    };
    if outcome.is_err() {
        inner.provider.invalidate_full(&keys).await;
    }
    outcome
}

fn apply_full(
    inner: &Arc<GraphInner>,
    key: &str,
    data: Option<FullNodeData>,
    epoch: u64,
) -> Result<(), GraphError> {
    let Some(full) = data else {
        return Err(GraphError::NoData(key.to_string()));
    };
    if full.core.sequence_key.as_deref().unwrap_or("").is_empty() {
        return Err(GraphError::MissingSequenceKey(key.to_string()));
    }

    let mut st = inner.state.lock();
    if st.epoch != epoch {
        // Graph was reset while the fetch was in flight.
        return Ok(());
    }
    match st.nodes.get(key).cloned() {
        Some(node) if !node.is_full() => node.make_full(full.fill)?,
        Some(_) => {}
        None => {
            st.nodes.insert(key.to_string(), Node::from_full(full));
        }
    }
    Ok(())
}

async fn run_fill_fetch(
    inner: &Arc<GraphInner>,
    key: &str,
    epoch: u64,
) -> Result<(), GraphError> {
    let keys = vec![key.to_string()];
    let outcome = match inner.provider.nodes_fill(&keys).await {
        Ok(mut result) => match result.remove(key) {
            Some(fill) => {
                let st = inner.state.lock();
                if st.epoch != epoch {
                    Ok(())
                } else {
                    match st.nodes.get(key) {
                        Some(node) if !node.is_full() => node.make_full(fill),
                        Some(_) => Ok(()),
                        None => Err(GraphError::NodeMissing(key.to_string())),
                    }
                }
            }
            None => Err(GraphError::NoData(key.to_string())),
        },
        Err(err) => Err(err.into()),
    };
    if outcome.is_err() {
        inner.provider.invalidate_full(&keys).await;
    }
    outcome
}

async fn run_cell_fetch(
    inner: &Arc<GraphInner>,
    cell: &str,
    epoch: u64,
) -> Result<(), GraphError> {
    let cells = vec![cell.to_string()];
    match inner.provider.cells(&cells).await {
        Ok(mut result) => {
            let nodes = result.remove(cell).unwrap_or_default();
            let mut guard = inner.state.lock();
            let st = &mut *guard;
            if st.epoch != epoch {
                return Ok(());
            }
            for core in nodes {
                let position = LatLon::new(core.lat, core.lon);
                st.index.insert(&core.key, position);
                if !st.nodes.contains_key(&core.key) {
                    st.nodes.insert(core.key.clone(), Node::from_core(core));
                }
            }
            st.cached_cells.insert(cell.to_string());
            Ok(())
        }
        Err(err) => {
            inner.provider.invalidate_cells(&cells).await;
            Err(err.into())
        }
    }
}

async fn fetch_sequence(
    inner: &Arc<GraphInner>,
    sequence_key: &str,
    epoch: u64,
) -> Result<(), GraphError> {
    let keys = vec![sequence_key.to_string()];
    let outcome = match inner.provider.sequences(&keys).await {
        Ok(mut result) => match result.remove(sequence_key) {
            Some(data) => {
                let mut st = inner.state.lock();
                if st.epoch == epoch {
                    st.sequences
                        .insert(sequence_key.to_string(), Sequence::new(data));
                }
                Ok(())
            }
            None => Err(GraphError::NoData(sequence_key.to_string())),
        },
        Err(err) => Err(err.into()),
    };
    if outcome.is_err() {
        inner.provider.invalidate_sequences(&keys).await;
    }
    outcome
}

/// Store derived sequence edges on every node that requested them.
fn derive_sequence_edges(inner: &Arc<GraphInner>, sequence_key: &str, node_keys: &[String]) {
    let st = inner.state.lock();
    let Some(sequence) = st.sequences.get(sequence_key) else {
        return;
    };
    for key in node_keys {
        if let Some(node) = st.nodes.get(key) {
            let edges = sequence.edges_for(key);
            if let Ok(cache) = node.ensure_cache() {
                cache.cache_sequence_edges(edges);
            }
        }
    }
}
