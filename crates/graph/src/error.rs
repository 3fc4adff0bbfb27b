use api::ProviderError;
use thiserror::Error;

/// Failure modes of graph caching operations.
///
/// Precondition violations are returned synchronously from the operation
/// that was misused. Fetch and data errors are delivered through the flight
/// of the request they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} does not exist in the graph")]
    NodeMissing(String),
    #[error("node {0} is already full")]
    AlreadyFull(String),
    #[error("node {0} is being cached full")]
    CachingFull(String),
    #[error("node {0} is not full")]
    NotFull(String),
    #[error("sequence of node {0} is already cached")]
    NodeSequenceCached(String),
    #[error("node {0} already has an initialized cache")]
    CacheInitialized(String),
    #[error("node {0} is disposed")]
    Disposed(String),
    #[error("node {0} has no sequence key")]
    MissingSequenceKey(String),
    #[error("sequence {0} does not exist in the graph")]
    SequenceMissing(String),
    #[error("no data returned for {0}")]
    NoData(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("request was abandoned before completing")]
    Aborted,
}

impl From<ProviderError> for GraphError {
    fn from(err: ProviderError) -> Self {
        GraphError::Fetch(err.message().to_string())
    }
}
