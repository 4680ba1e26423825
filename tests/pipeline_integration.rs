mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client_for, rate_limited, ScriptedBackend};
use saransh::client::{RequestFailure, ResilientClient, RetryPolicy};
use saransh::config::{ChunkStrategy, Config, LlmConfig};
use saransh::deadline::Deadline;
use saransh::embedding::EmbeddingIndex;
use saransh::models::{Article, ProcessingStatus};
use saransh::pipeline::ContentPipeline;
use saransh::store::memory::InMemoryVectorStore;
use saransh::store::VectorStore;
use saransh_core::chunk::chunk_text;

const LAUNCH: &str = "ISRO launched Chandrayaan from Sriharikota on Friday.\n\n\
    The mission was a great success according to officials.\n\n\
    Scientists will study the lunar south pole for two weeks.";

fn article(content: &str) -> Article {
    let mut a = Article::new("https://news.example/launch", "Lunar launch", content);
    a.source = "example".to_string();
    a
}

fn pipeline(backend: Arc<ScriptedBackend>, config: &Config) -> (ContentPipeline, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let dyn_store: Arc<dyn VectorStore> = store.clone();
    let pipeline = ContentPipeline::new(client_for(backend), config, Some(dyn_store)).unwrap();
    (pipeline, store)
}

fn small_chunks_config() -> Config {
    let mut config = Config::default();
    config.chunking.max_words = 10;
    config.chunking.overlap_words = 2;
    config
}

fn numbered(prefix: &str, n: usize) -> String {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect::<Vec<_>>().join(" ")
}

fn assert_contiguous_cover(chunks: &[saransh::models::Chunk], total_words: usize) {
    let mut covered = 0;
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.end_position - c.start_position, c.word_count);
        assert!(c.start_position <= covered, "gap before chunk {}", i);
        covered = covered.max(c.end_position);
    }
    assert_eq!(covered, total_words);
}

#[tokio::test]
async fn test_empty_article_is_failed_not_error() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let (pipeline, _) = pipeline(backend.clone(), &Config::default());

    let processed = pipeline.process(&article("   \n\n  "), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Failed);
    assert!(processed.chunks.is_empty());
    assert_eq!(processed.analysis.word_count, 0);
    assert_eq!(processed.analysis.sentence_count, 1);
    assert_eq!(processed.analysis.readability_score, 0.0);
    assert_eq!(processed.analysis.sentiment_score, 0.0);
    assert_eq!(backend.completions(), 0);
}

#[tokio::test]
async fn test_success_path_overlays_ai_fields_and_stores_vectors() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let (pipeline, store) = pipeline(backend.clone(), &Config::default());

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
    assert!(!processed.cancelled);
    assert!(processed.degraded_reason.is_none());

    let a = &processed.analysis;
    assert_eq!(a.word_count, LAUNCH.split_whitespace().count());
    assert!((a.sentiment_score - 0.6).abs() < 1e-9);
    assert_eq!(a.sentiment_label, "positive");
    assert_eq!(a.confidence_score, Some(0.8));
    assert_eq!(a.entities, vec!["ISRO", "Chandrayaan", "Sriharikota"]);
    assert_eq!(a.categories, vec!["science", "technology"]);
    assert_eq!(
        a.summary.as_deref(),
        Some("ISRO launched its lunar mission from Sriharikota.")
    );
    assert_eq!(a.keywords, vec!["isro", "moon", "launch"]);
    assert_eq!(a.language, "English");
    assert_eq!(a.quality_score, Some(0.8));

    // three short paragraphs fit one 300-word segment
    assert_eq!(processed.chunks.len(), 1);
    assert!(processed.vector_stored);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(backend.completions(), 7);
}

#[tokio::test]
async fn test_fatal_failure_switches_to_fallback() {
    let backend = Arc::new(ScriptedBackend::failing(RequestFailure::Fatal("401".into())));
    let config = small_chunks_config();
    let (pipeline, store) = pipeline(backend.clone(), &config);

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Fallback);
    assert!(processed.degraded_reason.as_deref().unwrap_or("").contains("401"));
    assert!(!processed.vector_stored);
    assert_eq!(store.count().await.unwrap(), 0);

    let expected = chunk_text(LAUNCH, 10, 2).unwrap();
    let got: Vec<(usize, usize)> = processed
        .chunks
        .iter()
        .map(|c| (c.start_position, c.end_position))
        .collect();
    let want: Vec<(usize, usize)> = expected.iter().map(|c| (c.start_position, c.end_position)).collect();
    assert_eq!(got, want);
    assert_eq!(processed.analysis, saransh_core::analysis::analyze(LAUNCH));
}

#[tokio::test]
async fn test_malformed_answers_fall_back_to_named_defaults() {
    let backend = Arc::new(ScriptedBackend::constant("{ this is broken"));
    let (pipeline, _) = pipeline(backend, &Config::default());

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
    let a = &processed.analysis;
    assert_eq!(a.sentiment_score, 0.0);
    assert_eq!(a.sentiment_label, "neutral");
    assert!(a.entities.is_empty());
    assert!(a.categories.is_empty());
    assert!(a.keywords.is_empty());
    assert!(a.summary.is_none());
    assert_eq!(a.language, "English");
    assert_eq!(a.quality_score, Some(0.5));
}

#[tokio::test]
async fn test_rate_limited_fields_retry_then_default() {
    let backend = Arc::new(ScriptedBackend::failing(rate_limited()));
    let (pipeline, _) = pipeline(backend.clone(), &Config::default());

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
    assert_eq!(processed.analysis.quality_score, Some(0.5));
    // seven fields, three attempts each
    assert_eq!(backend.completions(), 21);
    assert!(!processed.vector_stored);
    assert_eq!(backend.embeddings(), 3);
}

#[tokio::test]
async fn test_oversized_paragraph_split_by_model() {
    let big = numbered("w", 16);
    let text = format!("intro words here\n\n{}\n\nclosing line", big);
    let first: Vec<&str> = big.split_whitespace().take(8).collect();
    let second: Vec<&str> = big.split_whitespace().skip(8).collect();
    let split = serde_json::to_string(&vec![first.join(" "), second.join(" ")]).unwrap();

    let backend = Arc::new(
        ScriptedBackend::newsroom().with_queue(vec![Ok(split)]),
    );
    let (pipeline, _) = pipeline(backend, &small_chunks_config());

    let processed = pipeline.process(&article(&text), None).await;
    let spans: Vec<(usize, usize)> = processed
        .chunks
        .iter()
        .map(|c| (c.start_position, c.end_position))
        .collect();
    assert_eq!(spans, vec![(0, 3), (3, 11), (11, 19), (19, 21)]);
    assert_contiguous_cover(&processed.chunks, 21);
}

#[tokio::test]
async fn test_rewritten_split_windows_only_that_segment() {
    let big = numbered("w", 16);
    let text = format!("intro words here\n\n{}\n\nclosing line", big);
    let backend = Arc::new(
        ScriptedBackend::newsroom().with_queue(vec![Ok(r#"["a summary instead", "of the text"]"#.into())]),
    );
    let (pipeline, _) = pipeline(backend, &small_chunks_config());

    let processed = pipeline.process(&article(&text), None).await;
    let spans: Vec<(usize, usize)> = processed
        .chunks
        .iter()
        .map(|c| (c.start_position, c.end_position))
        .collect();
    // window 10, step 8 over words 3..19
    assert_eq!(spans, vec![(0, 3), (3, 13), (11, 19), (19, 21)]);
    assert_contiguous_cover(&processed.chunks, 21);
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
}

#[tokio::test]
async fn test_fixed_strategy_skips_split_requests() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let mut config = small_chunks_config();
    config.chunking.strategy = ChunkStrategy::Fixed;
    let (pipeline, _) = pipeline(backend.clone(), &config);

    let text = numbered("w", 25);
    let processed = pipeline.process(&article(&text), None).await;
    // starts 0, 8, 16, 24
    assert_eq!(processed.chunks.len(), 4);
    assert_contiguous_cover(&processed.chunks, 25);
    assert!(backend.prompts().iter().all(|p| !p.contains("Split this text")));
}

#[tokio::test]
async fn test_embedding_failure_keeps_success_status() {
    let backend = Arc::new(
        ScriptedBackend::newsroom().with_embed_failure(RequestFailure::Transient("503".into())),
    );
    let (pipeline, store) = pipeline(backend.clone(), &Config::default());

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
    assert!(!processed.vector_stored);
    assert_eq!(processed.analysis.sentiment_label, "positive");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_disabled_store_writes_nothing() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let mut config = Config::default();
    config.store.enabled = false;
    let (pipeline, store) = pipeline(backend.clone(), &config);

    let processed = pipeline.process(&article(LAUNCH), None).await;
    assert!(pipeline.index().is_none());
    assert!(!processed.vector_stored);
    assert_eq!(backend.embeddings(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_deadline_makes_no_calls_and_is_marked() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let (pipeline, store) = pipeline(backend.clone(), &Config::default());

    let processed = pipeline
        .process(&article(LAUNCH), Some(Deadline::after(Duration::ZERO)))
        .await;
    assert!(processed.cancelled);
    assert_eq!(processed.chunks.len(), 1);
    assert_eq!(processed.analysis.word_count, LAUNCH.split_whitespace().count());
    assert_eq!(backend.completions(), 0);
    assert_eq!(backend.embeddings(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_analysis_keeps_finished_fields() {
    let backend = Arc::new(ScriptedBackend::newsroom().with_latency(Duration::from_millis(100)));
    let (pipeline, store) = pipeline(backend.clone(), &Config::default());

    // sentiment ends at 100ms, entities at 200ms; categories is never asked
    let processed = pipeline
        .process(&article(LAUNCH), Some(Deadline::after(Duration::from_millis(150))))
        .await;
    assert!(processed.cancelled);
    assert_eq!(processed.processing_status, ProcessingStatus::Success);
    assert_eq!(backend.completions(), 2);

    let a = &processed.analysis;
    assert_eq!(a.sentiment_label, "positive");
    assert_eq!(a.confidence_score, Some(0.8));
    assert_eq!(a.entities, vec!["ISRO", "Chandrayaan", "Sriharikota"]);

    let plain = saransh_core::analysis::analyze(LAUNCH);
    assert_eq!(a.categories, plain.categories);
    assert_eq!(a.summary, plain.summary);
    assert_eq!(a.keywords, plain.keywords);
    assert_eq!(a.language, plain.language);
    assert_eq!(a.quality_score, plain.quality_score);

    assert!(!processed.vector_stored);
    assert_eq!(backend.embeddings(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_does_not_outlive_deadline() {
    let backend = Arc::new(ScriptedBackend::failing(RequestFailure::RateLimited {
        retry_after: Some(Duration::from_millis(400)),
        message: "429".into(),
    }));
    let policy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
        rate_limit_delay: Duration::from_millis(10),
    };
    let client = ResilientClient::new(backend.clone(), policy, &LlmConfig::default());
    let pipeline = ContentPipeline::new(client, &Config::default(), None).unwrap();

    let started = tokio::time::Instant::now();
    let processed = pipeline
        .process(&article(LAUNCH), Some(Deadline::after(Duration::from_millis(50))))
        .await;
    assert_eq!(started.elapsed(), Duration::from_millis(50));
    assert!(processed.cancelled);
    assert_eq!(processed.analysis.sentiment_label, "neutral");
    assert_eq!(backend.completions(), 1);
}

#[tokio::test]
async fn test_process_many_preserves_order() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let (pipeline, _) = pipeline(backend, &Config::default());

    let mut second = article("");
    second.id = "https://news.example/empty".to_string();
    let articles = vec![article(LAUNCH), second];
    let processed = pipeline.process_many(&articles, None).await;
    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].original_article_id, "https://news.example/launch");
    assert_eq!(processed[1].processing_status, ProcessingStatus::Failed);
}

#[tokio::test]
async fn test_similarity_search_over_stored_chunks() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let index = EmbeddingIndex::new(client_for(backend), store.clone(), "news_articles");

    let chunks = chunk_text("cricket cricket cricket\n\nmonsoon rain flood", 3, 0).unwrap();
    let stored = index
        .store_article_chunks("https://news.example/x", &chunks, "example")
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let hits = index.similarity_search("cricket", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "cricket cricket cricket");
    assert_eq!(hits[0].metadata["chunk_index"], 0);
    assert_eq!(hits[0].metadata["source"], "example");
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);

    // re-storing the same article replaces, not duplicates
    index
        .store_article_chunks("https://news.example/x", &chunks, "example")
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_restoring_fewer_chunks_drops_stale_vectors() {
    let backend = Arc::new(ScriptedBackend::newsroom());
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let index = EmbeddingIndex::new(client_for(backend), store.clone(), "news_articles");

    let three = chunk_text("alpha beta

gamma delta

epsilon zeta", 2, 0).unwrap();
    assert_eq!(three.len(), 3);
    index.store_article_chunks("https://news.example/a", &three, "example").await.unwrap();
    let other = chunk_text("cricket", 2, 0).unwrap();
    index.store_article_chunks("https://news.example/b", &other, "example").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 4);

    let one = chunk_text("alpha beta", 2, 0).unwrap();
    index.store_article_chunks("https://news.example/a", &one, "example").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let hits = index.similarity_search("zeta epsilon", 10).await.unwrap();
    assert!(hits.iter().all(|h| h.content != "epsilon zeta"));
    assert!(hits.iter().any(|h| h.content == "cricket"));
}
