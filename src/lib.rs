//! # Saransh
//!
//! News article processing over an unreliable completion API.
//!
//! Saransh takes an article body plus metadata and produces ordered
//! chunks, deterministic and AI-derived analysis, stored chunk embeddings,
//! and the output of a sequence of AI agents. Every external call goes
//! through a retrying client, and every stage degrades to a well-formed
//! result instead of failing the run.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────┐
//!   Article ────▶ │  ContentPipeline │──▶ ProcessedArticle
//!                 │ chunk · analyze  │
//!                 │ embed + store    │
//!                 └────────┬─────────┘
//!                          │
//!   Context ────▶ ┌────────┴─────────┐
//!                 │ AgentOrchestrator│──▶ PipelineRun
//!                 └────────┬─────────┘
//!                          ▼
//!                 ┌──────────────────┐
//!                 │ ResilientClient  │──▶ CompletionBackend (OpenAI)
//!                 └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | Tracing subscriber setup, prompt sanitizing |
//! | [`client`] | Retrying completion/embedding client |
//! | [`openai`] | OpenAI-compatible HTTP backend |
//! | [`chunk`] | Natural-boundary chunking with AI splitting |
//! | [`analyzer`] | AI-enriched content analysis |
//! | [`embedding`] | Chunk embedding and similarity search |
//! | [`pipeline`] | Article processing with fallback |
//! | [`agents`] | Sequential multi-stage agents |
//! | [`deadline`] | Caller-supplied time limits |
//!
//! Deterministic building blocks (models, fixed-size chunking, text
//! metrics, model-output parsing, the vector store) live in the
//! `saransh-core` crate.

pub mod agents;
pub mod analyzer;
pub mod chunk;
pub mod client;
pub mod config;
pub mod deadline;
pub mod embedding;
pub mod logging;
pub mod openai;
pub mod pipeline;

pub use saransh_core::{models, store};
