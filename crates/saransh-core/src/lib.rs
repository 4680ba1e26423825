//! # Saransh Core
//!
//! Shared, runtime-free logic for Saransh: article and chunk models,
//! word-window and paragraph-boundary chunking, deterministic text
//! analysis, defensive parsing of model output, and the vector store
//! abstraction.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Anything
//! that talks to a completion API lives in the `saransh` app crate.

pub mod analysis;
pub mod chunk;
pub mod embedding;
pub mod models;
pub mod parse;
pub mod store;
