//! Chunk embedding and similarity search.
//!
//! [`EmbeddingIndex`] embeds chunk texts through the [`ResilientClient`]
//! and upserts them into a [`VectorStore`], keyed by the article
//! fingerprint: chunk `i` of article `id` is stored as `"{id}_chunk_{i}"`.
//! Storing an article first drops every vector tagged with its id, so
//! re-processing replaces the earlier set even when the chunk count shrinks.

use std::sync::Arc;

use anyhow::{Context, Result};
use saransh_core::models::Chunk;
use saransh_core::store::VectorStore;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::client::ResilientClient;
use crate::deadline::Deadline;

/// One similarity search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: Value,
    /// `1 - cosine distance`.
    pub similarity: f32,
}

#[derive(Clone)]
pub struct EmbeddingIndex {
    client: ResilientClient,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl EmbeddingIndex {
    pub fn new(client: ResilientClient, store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            client,
            store,
            collection: collection.into(),
        }
    }

    /// A copy whose embedding requests stop retrying once `deadline` passes.
    pub fn within(&self, deadline: Option<Deadline>) -> Self {
        Self {
            client: self.client.within(deadline),
            ..self.clone()
        }
    }

    /// Embed and store `chunks`. Returns the number of vectors written.
    pub async fn store_article_chunks(&self, article_id: &str, chunks: &[Chunk], source: &str) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let documents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .client
            .embed(&documents)
            .await
            .with_context(|| format!("Failed to embed chunks of {}", article_id))?;

        let ids: Vec<String> = chunks
            .iter()
            .map(|c| chunk_key(article_id, c.chunk_index))
            .collect();
        let metadatas: Vec<Value> = chunks
            .iter()
            .map(|c| {
                json!({
                    "article_id": article_id,
                    "chunk_index": c.chunk_index,
                    "word_count": c.word_count,
                    "source": source,
                })
            })
            .collect();

        let replaced = self
            .store
            .delete_where("article_id", &json!(article_id))
            .await
            .with_context(|| format!("Failed to clear earlier vectors of {}", article_id))?;
        self.store
            .upsert(&ids, &vectors, &metadatas, &documents)
            .await
            .with_context(|| format!("Failed to store vectors in '{}'", self.collection))?;

        info!(
            article_id,
            collection = %self.collection,
            vectors = ids.len(),
            replaced,
            "stored chunk embeddings"
        );
        Ok(ids.len())
    }

    /// Return the `n` stored chunks most similar to `query`.
    pub async fn similarity_search(&self, query: &str, n: usize) -> Result<Vec<SearchHit>> {
        let mut vectors = self
            .client
            .embed(&[query.to_string()])
            .await
            .context("Failed to embed query")?;
        let vector = vectors
            .pop()
            .context("Embedding service returned no vector for the query")?;

        let matches = self.store.query(&vector, n).await?;
        Ok(matches
            .into_iter()
            .map(|m| SearchHit {
                content: m.document,
                metadata: m.metadata,
                similarity: 1.0 - m.distance,
            })
            .collect())
    }
}

/// Store key of chunk `index` of `article_id`.
pub fn chunk_key(article_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", article_id, index)
}
