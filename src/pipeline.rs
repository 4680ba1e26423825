//! Article processing pipeline.
//!
//! [`ContentPipeline::process`] turns an [`Article`] into a
//! [`ProcessedArticle`] and never fails:
//!
//! ```text
//! content empty? ── yes ──▶ status = failed, no chunks, zeroed analysis
//!       │ no
//!       ▼
//! chunk (fixed | semantic) ─▶ AI analysis ─▶ embed + store ─▶ status = success
//!                                 │ fatal request failure
//!                                 ▼
//!                  fixed chunks + deterministic analysis ─▶ status = fallback
//! ```
//!
//! Embedding storage is best effort: a failure is logged and reported via
//! `vector_stored = false` without changing the status. Once the deadline
//! passes no further external calls are issued; the remaining work runs on
//! deterministic code and the result is marked `cancelled`.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use saransh_core::analysis;
use saransh_core::chunk::{chunk_fixed, ChunkWindow};
use saransh_core::models::{AnalysisRecord, Article, Chunk, ProcessedArticle, ProcessingStatus};
use saransh_core::store::VectorStore;
use tracing::{error, info, warn};

use crate::analyzer::AiAnalyzer;
use crate::chunk::SemanticChunker;
use crate::client::ResilientClient;
use crate::config::{ChunkStrategy, Config};
use crate::deadline::{expired, Deadline};
use crate::embedding::EmbeddingIndex;

pub struct ContentPipeline {
    strategy: ChunkStrategy,
    window: ChunkWindow,
    chunker: SemanticChunker,
    analyzer: AiAnalyzer,
    index: Option<EmbeddingIndex>,
}

impl ContentPipeline {
    /// Build a pipeline. `store` is used only when `store.enabled` is set.
    ///
    /// # Errors
    ///
    /// Fails on invalid chunking parameters.
    pub fn new(client: ResilientClient, config: &Config, store: Option<Arc<dyn VectorStore>>) -> Result<Self> {
        let window = ChunkWindow::new(config.chunking.max_words, config.chunking.overlap_words)?;
        let index = store
            .filter(|_| config.store.enabled)
            .map(|store| EmbeddingIndex::new(client.clone(), store, config.store.collection.clone()));

        Ok(Self {
            strategy: config.chunking.strategy,
            window,
            chunker: SemanticChunker::new(client.clone(), window),
            analyzer: AiAnalyzer::new(client, config.analysis.clone()),
            index,
        })
    }

    pub fn index(&self) -> Option<&EmbeddingIndex> {
        self.index.as_ref()
    }

    pub async fn process(&self, article: &Article, deadline: Option<Deadline>) -> ProcessedArticle {
        info!(article_id = %article.id, title = %article.title, "processing article");

        if article.content.trim().is_empty() {
            warn!(article_id = %article.id, "article has no content");
            return assemble(
                article,
                Vec::new(),
                analysis::analyze(""),
                ProcessingStatus::Failed,
                Some("article has no content".to_string()),
            );
        }

        if expired(deadline) {
            let mut processed = self.deterministic(article, ProcessingStatus::Success, None);
            processed.cancelled = true;
            return processed;
        }

        let mut cancelled = false;
        let chunks = match self.strategy {
            ChunkStrategy::Fixed => chunk_fixed(&article.content, &self.window),
            ChunkStrategy::Semantic => {
                let outcome = self.chunker.chunk(&article.content, deadline).await;
                cancelled |= outcome.cancelled;
                outcome.chunks
            }
        };

        let enriched = match self.analyzer.analyze_within(&article.content, deadline).await {
            Ok(enriched) => enriched,
            Err(e) => {
                error!(article_id = %article.id, error = %e, "AI path failed, using fallback processing");
                let mut processed =
                    self.deterministic(article, ProcessingStatus::Fallback, Some(e.to_string()));
                processed.cancelled = cancelled;
                return processed;
            }
        };
        cancelled |= enriched.cancelled;

        let mut processed = assemble(
            article,
            chunks,
            enriched.record,
            ProcessingStatus::Success,
            None,
        );

        if let Some(index) = &self.index {
            if expired(deadline) {
                cancelled = true;
            } else {
                match index
                    .within(deadline)
                    .store_article_chunks(&article.id, &processed.chunks, &article.source)
                    .await
                {
                    Ok(stored) => processed.vector_stored = stored > 0,
                    Err(e) => warn!(article_id = %article.id, error = %e, "embedding storage failed"),
                }
            }
        }

        processed.cancelled = cancelled;
        info!(
            article_id = %article.id,
            chunks = processed.chunks.len(),
            words = processed.analysis.word_count,
            cancelled,
            "article processed"
        );
        processed
    }

    /// Process `articles` in order, one at a time.
    pub async fn process_many(&self, articles: &[Article], deadline: Option<Deadline>) -> Vec<ProcessedArticle> {
        let mut out = Vec::with_capacity(articles.len());
        for article in articles {
            out.push(self.process(article, deadline).await);
        }
        out
    }

    fn deterministic(
        &self,
        article: &Article,
        status: ProcessingStatus,
        reason: Option<String>,
    ) -> ProcessedArticle {
        let chunks = chunk_fixed(&article.content, &self.window);
        let record = analysis::analyze(&article.content);
        assemble(article, chunks, record, status, reason)
    }
}

fn assemble(
    article: &Article,
    chunks: Vec<Chunk>,
    record: AnalysisRecord,
    status: ProcessingStatus,
    reason: Option<String>,
) -> ProcessedArticle {
    ProcessedArticle {
        original_article_id: article.id.clone(),
        title: article.title.clone(),
        clean_content: article.content.clone(),
        chunks,
        analysis: record,
        processing_status: status,
        degraded_reason: reason,
        cancelled: false,
        vector_stored: false,
        processed_at: Utc::now(),
    }
}
