use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::types::{CoreNodeData, FillNodeData, FullNodeData, SequenceData};

/// Boxed future alias so provider traits stay dyn compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport failure from a metadata or asset endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error: {message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Longest side of a requested image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Size640,
    Size1024,
    Size2048,
}

impl ImageSize {
    pub fn pixels(self) -> u32 {
        match self {
            ImageSize::Size640 => 640,
            ImageSize::Size1024 => 1024,
            ImageSize::Size2048 => 2048,
        }
    }

    /// Default size for flat images.
    pub fn base_image() -> Self {
        ImageSize::Size640
    }

    /// Default size for panoramas, which need more pixels per view.
    pub fn base_panorama() -> Self {
        ImageSize::Size2048
    }
}

/// Download progress of an asset, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatus {
    pub loaded: u64,
    pub total: u64,
}

/// One emission from an asset stream: updated progress, and the payload on
/// the final chunk.
#[derive(Debug, Clone)]
pub struct LoadChunk<T> {
    pub status: LoadStatus,
    pub payload: Option<T>,
}

/// Progress-reporting byte stream for a single asset download.
pub type AssetStream = BoxStream<'static, Result<LoadChunk<Bytes>, ProviderError>>;

/// Metadata endpoints keyed by node, cell and sequence identifiers.
///
/// Batch methods return maps keyed by the requested identifiers; a missing
/// entry means the identifier does not exist upstream. The `invalidate_*`
/// methods drop any response caching a provider may do for the given keys,
/// and are called after a failed or inconsistent fetch so a retry hits the
/// backend again.
pub trait DataProvider: Send + Sync {
    fn nodes_full(
        &self,
        keys: &[String],
    ) -> BoxFuture<'_, Result<HashMap<String, FullNodeData>, ProviderError>>;

    fn nodes_fill(
        &self,
        keys: &[String],
    ) -> BoxFuture<'_, Result<HashMap<String, FillNodeData>, ProviderError>>;

    fn cells(
        &self,
        cell_ids: &[String],
    ) -> BoxFuture<'_, Result<HashMap<String, Vec<CoreNodeData>>, ProviderError>>;

    fn sequences(
        &self,
        sequence_keys: &[String],
    ) -> BoxFuture<'_, Result<HashMap<String, SequenceData>, ProviderError>>;

    fn invalidate_full(&self, keys: &[String]) -> BoxFuture<'_, ()>;

    fn invalidate_cells(&self, cell_ids: &[String]) -> BoxFuture<'_, ()>;

    fn invalidate_sequences(&self, sequence_keys: &[String]) -> BoxFuture<'_, ()>;

    /// Best-effort view telemetry. Failures are logged and ignored.
    fn report_viewed(
        &self,
        image_keys: &[String],
        sequence_keys: &[String],
    ) -> BoxFuture<'_, Result<(), ProviderError>>;
}

/// Binary asset transport for images and reconstruction meshes.
pub trait AssetLoader: Send + Sync {
    fn load_image(&self, key: &str, size: ImageSize) -> AssetStream;

    fn load_mesh(&self, key: &str) -> AssetStream;
}
