use std::sync::Arc;

use api::{AssetLoader, AssetStream, ImageSize, LoadStatus, ProviderError};
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::error;

use crate::edge::{Edge, EdgeStatus};
use crate::error::GraphError;
use crate::flight::{self, Flight};
use crate::mesh::{self, Mesh};

/// Per-node cache of binary assets and derived navigation edges.
///
/// Cloning shares the same cache. Edge statuses and download progress are
/// held in watch channels so observers can both read the current value and
/// subscribe to changes.
#[derive(Debug, Clone)]
pub struct NodeCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    state: Mutex<CacheState>,
    sequence_edges_tx: watch::Sender<EdgeStatus>,
    spatial_edges_tx: watch::Sender<EdgeStatus>,
    load_tx: watch::Sender<LoadStatus>,
}

#[derive(Debug, Default)]
struct CacheState {
    image: Option<Bytes>,
    mesh: Option<Mesh>,
    caching_assets: Option<AssetFlight>,
    /// Bumped on dispose so a download finishing afterwards cannot store
    /// into the cleared cache.
    generation: u64,
}

/// Handle to an in-flight or finished asset download.
#[derive(Debug, Clone)]
pub struct AssetFlight {
    flight: Flight,
    progress: watch::Receiver<LoadStatus>,
}

impl AssetFlight {
    pub async fn complete(&self) -> Result<(), GraphError> {
        self.flight.complete().await
    }

    pub fn progress(&self) -> watch::Receiver<LoadStatus> {
        self.progress.clone()
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                sequence_edges_tx: watch::Sender::new(EdgeStatus::default()),
                spatial_edges_tx: watch::Sender::new(EdgeStatus::default()),
                load_tx: watch::Sender::new(LoadStatus::default()),
            }),
        }
    }

    pub fn image(&self) -> Option<Bytes> {
        self.inner.state.lock().image.clone()
    }

    pub fn mesh(&self) -> Option<Mesh> {
        self.inner.state.lock().mesh.clone()
    }

    pub fn assets_cached(&self) -> bool {
        let state = self.inner.state.lock();
        state.image.is_some() && state.mesh.is_some()
    }

    pub fn load_status(&self) -> LoadStatus {
        *self.inner.load_tx.borrow()
    }

    pub fn load_watch(&self) -> watch::Receiver<LoadStatus> {
        self.inner.load_tx.subscribe()
    }

    pub fn sequence_edges(&self) -> EdgeStatus {
        self.inner.sequence_edges_tx.borrow().clone()
    }

    pub fn spatial_edges(&self) -> EdgeStatus {
        self.inner.spatial_edges_tx.borrow().clone()
    }

    pub fn sequence_edges_watch(&self) -> watch::Receiver<EdgeStatus> {
        self.inner.sequence_edges_tx.subscribe()
    }

    pub fn spatial_edges_watch(&self) -> watch::Receiver<EdgeStatus> {
        self.inner.spatial_edges_tx.subscribe()
    }

    pub fn cache_sequence_edges(&self, edges: Vec<Edge>) {
        self.inner.sequence_edges_tx.send_replace(EdgeStatus {
            cached: true,
            edges,
        });
    }

    pub fn cache_spatial_edges(&self, edges: Vec<Edge>) {
        self.inner.spatial_edges_tx.send_replace(EdgeStatus {
            cached: true,
            edges,
        });
    }

    /// Drop derived spatial edges so they get recomputed after the graph
    /// around the node changed.
    pub fn reset_spatial_edges(&self) {
        self.inner.spatial_edges_tx.send_replace(EdgeStatus::default());
    }

    /// Start downloading the node's image and, for merged nodes, its mesh.
    ///
    /// Idempotent: while a download runs or once it has succeeded, the same
    /// handle is returned and the loader is not called again. A failed
    /// download clears the handle so the next call retries.
    pub fn cache_assets(
        &self,
        key: &str,
        pano: bool,
        merged: bool,
        loader: Arc<dyn AssetLoader>,
    ) -> AssetFlight {
        let mut state = self.inner.state.lock();
        if let Some(existing) = &state.caching_assets {
            return existing.clone();
        }
        if state.image.is_some() && state.mesh.is_some() {
            return AssetFlight {
                flight: flight::resolved(Ok(())),
                progress: self.inner.load_tx.subscribe(),
            };
        }

        let size = if pano {
            ImageSize::base_panorama()
        } else {
            ImageSize::base_image()
        };

        let (resolver, fl) = flight::flight();
        let handle = AssetFlight {
            flight: fl,
            progress: self.inner.load_tx.subscribe(),
        };
        state.caching_assets = Some(handle.clone());
        let generation = state.generation;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = run_asset_fetch(&inner, &key, size, merged, loader).await;
            {
                let mut state = inner.state.lock();
                if state.generation == generation {
                    match &outcome {
                        Ok((image, mesh)) => {
                            state.image = Some(image.clone());
                            state.mesh = Some(mesh.clone());
                            // Keep the handle so later calls replay success.
                        }
                        Err(_) => {
                            state.caching_assets = None;
                        }
                    }
                }
            }
            resolver.resolve(outcome.map(|_| ()));
        });

        handle
    }

    /// Drop everything held for the node. Edge subscribers see empty
    /// statuses.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            state.image = None;
            state.mesh = None;
            state.caching_assets = None;
            state.generation += 1;
        }
        self.inner.sequence_edges_tx.send_replace(EdgeStatus::default());
        self.inner.spatial_edges_tx.send_replace(EdgeStatus::default());
        self.inner.load_tx.send_replace(LoadStatus::default());
    }
}

async fn run_asset_fetch(
    inner: &Arc<CacheInner>,
    key: &str,
    size: ImageSize,
    merged: bool,
    loader: Arc<dyn AssetLoader>,
) -> Result<(Bytes, Mesh), GraphError> {
    // Image and mesh progress are combined into one load status.
    let parts = Arc::new(Mutex::new([LoadStatus::default(); 2]));

    let report = |slot: usize| {
        let parts = Arc::clone(&parts);
        let load_tx = &inner.load_tx;
        move |status: LoadStatus| {
            // Publish while holding the lock so snapshots stay ordered.
            let mut guard = parts.lock();
            guard[slot] = status;
            load_tx.send_replace(LoadStatus {
                loaded: guard[0].loaded + guard[1].loaded,
                total: guard[0].total + guard[1].total,
            });
        }
    };

    let image_fut = drain_asset(loader.load_image(key, size), report(0));
    let mesh_fut = async {
        if !merged {
            return Mesh::empty();
        }
        match drain_asset(loader.load_mesh(key), report(1)).await {
            Ok(payload) => match mesh::decode(&payload) {
                Ok(mesh) => mesh,
                Err(err) => {
                    error!(key, %err, "mesh payload undecodable, rendering flat");
                    Mesh::empty()
                }
            },
            Err(err) => {
                error!(key, %err, "mesh fetch failed, rendering flat");
                Mesh::empty()
            }
        }
    };

    let (image, mesh) = futures_util::join!(image_fut, mesh_fut);
    match image {
        Ok(image) => Ok((image, mesh)),
        Err(err) => {
            error!(key, %err, "image fetch failed");
            Err(err.into())
        }
    }
}

/// Consume an asset stream, reporting progress, until the payload chunk.
async fn drain_asset(
    mut stream: AssetStream,
    mut report: impl FnMut(LoadStatus),
) -> Result<Bytes, ProviderError> {
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        report(chunk.status);
        if let Some(payload) = chunk.payload {
            return Ok(payload);
        }
    }
    Err(ProviderError::new("asset stream ended without payload"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use api::LoadChunk;
    use futures_util::stream;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;
    use crate::edge::{Edge, EdgeDirection};

    fn chunked(payload: Bytes) -> Vec<Result<LoadChunk<Bytes>, ProviderError>> {
        let total = payload.len() as u64;
        vec![
            Ok(LoadChunk {
                status: LoadStatus { loaded: 1, total },
                payload: None,
            }),
            Ok(LoadChunk {
                status: LoadStatus {
                    loaded: total,
                    total,
                },
                payload: Some(payload),
            }),
        ]
    }

    struct ScriptedLoader {
        image: Mutex<Vec<Vec<Result<LoadChunk<Bytes>, ProviderError>>>>,
        mesh: Mutex<Vec<Vec<Result<LoadChunk<Bytes>, ProviderError>>>>,
        image_calls: AtomicUsize,
        mesh_calls: AtomicUsize,
        hang_image: bool,
    }

    impl ScriptedLoader {
        fn new(
            image: Vec<Vec<Result<LoadChunk<Bytes>, ProviderError>>>,
            mesh: Vec<Vec<Result<LoadChunk<Bytes>, ProviderError>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                image: Mutex::new(image),
                mesh: Mutex::new(mesh),
                image_calls: AtomicUsize::new(0),
                mesh_calls: AtomicUsize::new(0),
                hang_image: false,
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                image: Mutex::new(Vec::new()),
                mesh: Mutex::new(Vec::new()),
                image_calls: AtomicUsize::new(0),
                mesh_calls: AtomicUsize::new(0),
                hang_image: true,
            })
        }
    }

    impl AssetLoader for ScriptedLoader {
        fn load_image(&self, _key: &str, _size: ImageSize) -> AssetStream {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_image {
                return stream::pending().boxed();
            }
            let chunks = self.image.lock().remove(0);
            stream::iter(chunks).boxed()
        }

        fn load_mesh(&self, _key: &str) -> AssetStream {
            self.mesh_calls.fetch_add(1, Ordering::SeqCst);
            let chunks = self.mesh.lock().remove(0);
            stream::iter(chunks).boxed()
        }
    }

    #[tokio::test]
    async fn caches_image_without_mesh_fetch_for_unmerged_node() {
        let image = Bytes::from_static(b"jpeg");
        let loader = ScriptedLoader::new(vec![chunked(image.clone())], vec![]);
        let cache = NodeCache::new();

        let handle = cache.cache_assets("n0", false, false, loader.clone());
        handle.complete().await.unwrap();

        assert_eq!(cache.image(), Some(image));
        assert_eq!(cache.mesh(), Some(Mesh::empty()));
        assert!(cache.assets_cached());
        assert_eq!(loader.mesh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn merged_node_fetches_and_decodes_mesh() {
        let mesh = Mesh {
            vertices: vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]],
            faces: vec![[0, 1, 2]],
        };
        let loader = ScriptedLoader::new(
            vec![chunked(Bytes::from_static(b"jpeg"))],
            vec![chunked(mesh::encode(&mesh))],
        );
        let cache = NodeCache::new();

        cache
            .cache_assets("n0", false, true, loader.clone())
            .complete()
            .await
            .unwrap();

        assert_eq!(cache.mesh(), Some(mesh));
        assert_eq!(loader.mesh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_mesh_degrades_to_empty() {
        let loader = ScriptedLoader::new(
            vec![chunked(Bytes::from_static(b"jpeg"))],
            vec![chunked(Bytes::from_static(b"not a mesh"))],
        );
        let cache = NodeCache::new();

        cache
            .cache_assets("n0", false, true, loader)
            .complete()
            .await
            .unwrap();

        assert!(cache.assets_cached());
        assert_eq!(cache.mesh(), Some(Mesh::empty()));
    }

    #[tokio::test]
    async fn image_failure_fails_flight_and_allows_retry() {
        let image = Bytes::from_static(b"jpeg");
        let loader = ScriptedLoader::new(
            vec![
                vec![Err(ProviderError::new("boom"))],
                chunked(image.clone()),
            ],
            vec![],
        );
        let cache = NodeCache::new();

        let outcome = cache
            .cache_assets("n0", false, false, loader.clone())
            .complete()
            .await;
        assert_eq!(outcome, Err(GraphError::Fetch("boom".into())));
        assert!(!cache.assets_cached());

        cache
            .cache_assets("n0", false, false, loader.clone())
            .complete()
            .await
            .unwrap();
        assert_eq!(cache.image(), Some(image));
        assert_eq!(loader.image_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_download() {
        let loader = ScriptedLoader::hanging();
        let cache = NodeCache::new();

        let first = cache.cache_assets("n0", false, false, loader.clone());
        let second = cache.cache_assets("n0", false, false, loader.clone());
        // Let the spawned download start before counting loader calls.
        tokio::task::yield_now().await;

        assert_eq!(loader.image_calls.load(Ordering::SeqCst), 1);
        assert!(first.flight.try_outcome().is_none());
        assert!(second.flight.try_outcome().is_none());
    }

    #[tokio::test]
    async fn dispose_during_download_drops_late_result() {
        struct GatedLoader {
            gate: Mutex<Option<oneshot::Receiver<Result<LoadChunk<Bytes>, ProviderError>>>>,
        }

        impl AssetLoader for GatedLoader {
            fn load_image(&self, _key: &str, _size: ImageSize) -> AssetStream {
                let gate = self.gate.lock().take().unwrap();
                stream::once(async move {
                    gate.await
                        .unwrap_or_else(|_| Err(ProviderError::new("gate dropped")))
                })
                .boxed()
            }

            fn load_mesh(&self, _key: &str) -> AssetStream {
                stream::pending().boxed()
            }
        }

        let (tx, rx) = oneshot::channel();
        let loader = Arc::new(GatedLoader {
            gate: Mutex::new(Some(rx)),
        });
        let cache = NodeCache::new();

        let handle = cache.cache_assets("n0", false, false, loader);
        tokio::task::yield_now().await;
        cache.dispose();

        tx.send(Ok(LoadChunk {
            status: LoadStatus { loaded: 4, total: 4 },
            payload: Some(Bytes::from_static(b"jpeg")),
        }))
        .unwrap();
        handle.complete().await.unwrap();

        assert!(!cache.assets_cached());
        assert_eq!(cache.image(), None);
    }

    #[tokio::test]
    async fn merged_node_combines_progress_from_both_streams() {
        let mesh_payload = mesh::encode(&Mesh::empty());
        let mesh_len = mesh_payload.len() as u64;
        let loader = ScriptedLoader::new(
            vec![chunked(Bytes::from_static(b"jpeg"))],
            vec![chunked(mesh_payload)],
        );
        let cache = NodeCache::new();

        cache
            .cache_assets("n0", false, true, loader)
            .complete()
            .await
            .unwrap();

        let status = cache.load_status();
        assert_eq!(status.loaded, 4 + mesh_len);
        assert_eq!(status.total, 4 + mesh_len);
    }

    #[tokio::test]
    async fn cached_assets_replay_without_refetch() {
        let loader = ScriptedLoader::new(vec![chunked(Bytes::from_static(b"jpeg"))], vec![]);
        let cache = NodeCache::new();

        cache
            .cache_assets("n0", false, false, loader.clone())
            .complete()
            .await
            .unwrap();
        cache
            .cache_assets("n0", false, false, loader.clone())
            .complete()
            .await
            .unwrap();

        assert_eq!(loader.image_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_combined_progress() {
        let loader = ScriptedLoader::new(vec![chunked(Bytes::from_static(b"abcd"))], vec![]);
        let cache = NodeCache::new();

        cache
            .cache_assets("n0", false, false, loader)
            .complete()
            .await
            .unwrap();

        let status = cache.load_status();
        assert_eq!(status.loaded, 4);
        assert_eq!(status.total, 4);
    }

    #[test]
    fn edge_statuses_start_uncached() {
        let cache = NodeCache::new();
        assert!(!cache.sequence_edges().cached);
        assert!(!cache.spatial_edges().cached);
    }

    #[test]
    fn caches_and_resets_edges() {
        let cache = NodeCache::new();
        let edge = Edge {
            from: "a".into(),
            to: "b".into(),
            direction: EdgeDirection::Next,
        };

        cache.cache_sequence_edges(vec![edge.clone()]);
        cache.cache_spatial_edges(vec![edge.clone()]);
        assert_eq!(cache.sequence_edges().edges, vec![edge.clone()]);
        assert!(cache.spatial_edges().cached);

        cache.reset_spatial_edges();
        assert!(!cache.spatial_edges().cached);
        // Sequence edges survive a spatial reset.
        assert!(cache.sequence_edges().cached);
    }

    #[tokio::test]
    async fn dispose_clears_everything() {
        let loader = ScriptedLoader::new(vec![chunked(Bytes::from_static(b"jpeg"))], vec![]);
        let cache = NodeCache::new();
        cache
            .cache_assets("n0", false, false, loader)
            .complete()
            .await
            .unwrap();
        cache.cache_sequence_edges(Vec::new());

        cache.dispose();

        assert!(!cache.assets_cached());
        assert!(!cache.sequence_edges().cached);
        assert_eq!(cache.load_status(), LoadStatus::default());
    }
}
