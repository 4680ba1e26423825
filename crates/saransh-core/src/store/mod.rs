//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the contract Saransh consumes for chunk
//! embeddings: batched upsert keyed by id, and nearest-neighbour query by
//! vector. Backends are pluggable; [`memory::InMemoryVectorStore`] ships
//! here for tests and single-process use.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A stored document ranked against a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    /// Cosine distance; smaller is closer.
    pub distance: f32,
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace entries by id |
/// | [`query`](VectorStore::query) | Rank entries by distance to a vector |
/// | [`delete_where`](VectorStore::delete_where) | Drop entries whose metadata field matches |
/// | [`count`](VectorStore::count) | Number of stored entries |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace entries. All four slices are parallel and must
    /// have the same length.
    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Value],
        documents: &[String],
    ) -> Result<()>;

    /// Return up to `k` entries ordered by ascending distance.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>>;

    /// Remove every entry whose metadata `field` equals `value`. Returns
    /// the number removed.
    async fn delete_where(&self, field: &str, value: &Value) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}
