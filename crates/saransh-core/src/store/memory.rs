//! In-memory [`VectorStore`] implementation.
//!
//! Entries live in a `HashMap` behind `std::sync::RwLock`; query is a
//! brute-force cosine scan over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{QueryMatch, VectorStore};
use crate::embedding::cosine_distance;

struct StoredEntry {
    vector: Vec<f32>,
    metadata: Value,
    document: String,
}

/// In-memory store for tests and single-process runs.
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Value],
        documents: &[String],
    ) -> Result<()> {
        let n = ids.len();
        if vectors.len() != n || metadatas.len() != n || documents.len() != n {
            bail!(
                "upsert length mismatch: {} ids, {} vectors, {} metadatas, {} documents",
                n,
                vectors.len(),
                metadatas.len(),
                documents.len()
            );
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        for i in 0..n {
            entries.insert(
                ids[i].clone(),
                StoredEntry {
                    vector: vectors[i].clone(),
                    metadata: metadatas[i].clone(),
                    document: documents[i].clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        let mut matches: Vec<QueryMatch> = entries
            .iter()
            .map(|(id, e)| QueryMatch {
                id: id.clone(),
                document: e.document.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(vector, &e.vector),
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn delete_where(&self, field: &str, value: &Value) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        let before = entries.len();
        entries.retain(|_, e| e.metadata.get(field) != Some(value));
        Ok(before - entries.len())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        Ok(entries.len())
    }
}
