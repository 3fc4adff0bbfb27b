use std::sync::Arc;

use api::{AssetLoader, CoreNodeData, FillNodeData, FullNodeData};
use foundation::LatLon;
use parking_lot::Mutex;

use crate::error::GraphError;
use crate::node_cache::{AssetFlight, NodeCache};

/// A node in the graph: one captured image with its metadata.
///
/// Nodes start from core data and become full when fill metadata arrives.
/// Cloning shares the node. A disposed node keeps only its key; accessors
/// on it return [`GraphError::Disposed`].
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<Mutex<NodeState>>,
}

#[derive(Debug)]
enum NodeState {
    Active {
        core: CoreNodeData,
        fill: Option<FillNodeData>,
        cache: Option<NodeCache>,
    },
    Disposed {
        key: String,
    },
}

impl Node {
    pub fn from_core(core: CoreNodeData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NodeState::Active {
                core,
                fill: None,
                cache: None,
            })),
        }
    }

    pub fn from_full(full: FullNodeData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NodeState::Active {
                core: full.core,
                fill: Some(full.fill),
                cache: None,
            })),
        }
    }

    pub fn key(&self) -> String {
        match &*self.inner.lock() {
            NodeState::Active { core, .. } => core.key.clone(),
            NodeState::Disposed { key } => key.clone(),
        }
    }

    pub fn core(&self) -> Result<CoreNodeData, GraphError> {
        match &*self.inner.lock() {
            NodeState::Active { core, .. } => Ok(core.clone()),
            NodeState::Disposed { key } => Err(GraphError::Disposed(key.clone())),
        }
    }

    pub fn fill(&self) -> Result<Option<FillNodeData>, GraphError> {
        match &*self.inner.lock() {
            NodeState::Active { fill, .. } => Ok(fill.clone()),
            NodeState::Disposed { key } => Err(GraphError::Disposed(key.clone())),
        }
    }

    pub fn sequence_key(&self) -> Result<Option<String>, GraphError> {
        Ok(self.core()?.sequence_key)
    }

    pub fn captured_at(&self) -> Result<Option<i64>, GraphError> {
        Ok(self.fill()?.map(|fill| fill.captured_at))
    }

    pub fn position(&self) -> Result<LatLon, GraphError> {
        let core = self.core()?;
        Ok(LatLon::new(core.lat, core.lon))
    }

    pub fn is_full(&self) -> bool {
        match &*self.inner.lock() {
            NodeState::Active { fill, .. } => fill.is_some(),
            NodeState::Disposed { .. } => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(&*self.inner.lock(), NodeState::Disposed { .. })
    }

    /// Whether the node is a panorama of any kind.
    pub fn pano(&self) -> Result<bool, GraphError> {
        Ok(self.fill()?.is_some_and(|fill| fill.pano.is_some()))
    }

    /// Whether the node is a full 360 panorama.
    pub fn full_pano(&self) -> Result<bool, GraphError> {
        Ok(self
            .fill()?
            .and_then(|fill| fill.pano)
            .is_some_and(|crop| crop.is_full()))
    }

    /// Whether the node entered a 3D reconstruction merge.
    pub fn merged(&self) -> Result<bool, GraphError> {
        Ok(self
            .fill()?
            .and_then(|fill| fill.merge_version)
            .is_some_and(|version| version > 0))
    }

    /// Complete the node with fill metadata. Errors if already full.
    pub fn make_full(&self, data: FillNodeData) -> Result<(), GraphError> {
        let mut state = self.inner.lock();
        match &mut *state {
            NodeState::Active { core, fill, .. } => {
                if fill.is_some() {
                    return Err(GraphError::AlreadyFull(core.key.clone()));
                }
                *fill = Some(data);
                Ok(())
            }
            NodeState::Disposed { key } => Err(GraphError::Disposed(key.clone())),
        }
    }

    /// Attach a cache to the node. A node holds at most one cache over its
    /// lifetime.
    pub fn initialize_cache(&self, new_cache: NodeCache) -> Result<(), GraphError> {
        let mut state = self.inner.lock();
        match &mut *state {
            NodeState::Active { core, cache, .. } => {
                if cache.is_some() {
                    return Err(GraphError::CacheInitialized(core.key.clone()));
                }
                *cache = Some(new_cache);
                Ok(())
            }
            NodeState::Disposed { key } => Err(GraphError::Disposed(key.clone())),
        }
    }

    /// The node's cache, creating one on first use.
    pub fn ensure_cache(&self) -> Result<NodeCache, GraphError> {
        let mut state = self.inner.lock();
        match &mut *state {
            NodeState::Active { cache, .. } => {
                Ok(cache.get_or_insert_with(NodeCache::new).clone())
            }
            NodeState::Disposed { key } => Err(GraphError::Disposed(key.clone())),
        }
    }

    pub fn cache(&self) -> Option<NodeCache> {
        match &*self.inner.lock() {
            NodeState::Active { cache, .. } => cache.clone(),
            NodeState::Disposed { .. } => None,
        }
    }

    pub fn assets_cached(&self) -> bool {
        self.is_full() && self.cache().is_some_and(|cache| cache.assets_cached())
    }

    /// Download the node's assets. Requires a full node since image size and
    /// mesh handling depend on fill metadata.
    pub fn cache_assets(&self, loader: Arc<dyn AssetLoader>) -> Result<AssetFlight, GraphError> {
        let key = self.key();
        if !self.is_full() {
            return Err(GraphError::NotFull(key));
        }
        let pano = self.pano()?;
        let merged = self.merged()?;
        let cache = self.ensure_cache()?;
        Ok(cache.cache_assets(&key, pano, merged, loader))
    }

    /// Release the node. Its cache is disposed and only the key remains.
    pub fn dispose(&self) {
        let mut state = self.inner.lock();
        if let NodeState::Active { core, cache, .. } = &*state {
            if let Some(cache) = cache {
                cache.dispose();
            }
            let key = core.key.clone();
            *state = NodeState::Disposed { key };
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn core(key: &str) -> CoreNodeData {
        CoreNodeData {
            key: key.into(),
            sequence_key: Some("s0".into()),
            lat: 55.6,
            lon: 12.5,
            alt: None,
        }
    }

    fn fill() -> FillNodeData {
        FillNodeData {
            captured_at: 0,
            compass_angle: 0.0,
            orientation: 1,
            focal: 0.85,
            atomic_scale: 1.0,
            camera_rotation: [0.0, 0.0, 0.0],
            width: 640,
            height: 480,
            merge_version: None,
            merge_cc: None,
            pano: None,
            user: None,
        }
    }

    #[test]
    fn core_node_becomes_full() {
        let node = Node::from_core(core("n0"));
        assert!(!node.is_full());

        node.make_full(fill()).unwrap();
        assert!(node.is_full());
        assert_eq!(
            node.make_full(fill()),
            Err(GraphError::AlreadyFull("n0".into()))
        );
    }

    #[test]
    fn merged_requires_positive_merge_version() {
        let node = Node::from_core(core("n0"));
        let mut data = fill();
        data.merge_version = Some(0);
        node.make_full(data).unwrap();
        assert_eq!(node.merged(), Ok(false));

        let merged = Node::from_full(FullNodeData {
            core: core("n1"),
            fill: FillNodeData {
                merge_version: Some(3),
                ..fill()
            },
        });
        assert_eq!(merged.merged(), Ok(true));
    }

    #[test]
    fn cache_initializes_once() {
        let node = Node::from_core(core("n0"));
        assert!(node.cache().is_none());

        node.initialize_cache(NodeCache::new()).unwrap();
        assert!(node.cache().is_some());
        assert_eq!(
            node.initialize_cache(NodeCache::new()),
            Err(GraphError::CacheInitialized("n0".into()))
        );
    }

    #[test]
    fn ensure_cache_reuses_existing() {
        let node = Node::from_core(core("n0"));
        let first = node.ensure_cache().unwrap();
        first.cache_sequence_edges(Vec::new());

        let second = node.ensure_cache().unwrap();
        assert!(second.sequence_edges().cached);
    }

    #[test]
    fn disposed_node_keeps_only_key() {
        let node = Node::from_core(core("n0"));
        node.ensure_cache().unwrap();
        node.dispose();

        assert!(node.is_disposed());
        assert!(!node.is_full());
        assert_eq!(node.key(), "n0");
        assert_eq!(node.core(), Err(GraphError::Disposed("n0".into())));
        assert_eq!(
            node.make_full(fill()),
            Err(GraphError::Disposed("n0".into()))
        );
        assert!(node.cache().is_none());
    }
}
