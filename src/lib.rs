//! # web-rag
//!
//! A Rust web service that ingests web pages and PDFs into category-partitioned
//! vector collections and answers questions grounded on them.
//!
//! ## Architecture
//!
//! Ingestion runs in the background; answering is a straight pipeline:
//!
//! ```text
//!   ┌──────────┐     ┌───────────────┐     ┌──────────────┐
//!   │   URL    │────►│   Extractor   │────►│   Chunker    │
//!   └──────────┘     │ HTML / PDF    │     │ token windows│
//!                    └───────────────┘     └──────┬───────┘
//!                                                 │ chunks
//!                                                 ▼
//!                    ┌───────────────┐     ┌──────────────┐
//!                    │ Source Ledger │◄────│ Vector Store │
//!                    │ sources.json  │     │  Adapter     │
//!                    └───────────────┘     └──────┬───────┘
//!                                                 │
//!   ┌──────────┐                                  │
//!   │  Query   │──► embed ──► fetch_k nearest ────┘
//!   └──────────┘                  │
//!                                 ▼
//!                     ┌───────────────────────┐
//!                     │   MMR selection (k)   │
//!                     │ λ·sim − (1−λ)·redund. │
//!                     └───────────┬───────────┘
//!                                 ▼
//!                     ┌───────────────────────┐
//!                     │   Relevance Filter    │
//!                     │ cosine ≥ threshold    │
//!                     │ keyword overlap > 0   │
//!                     └───────────┬───────────┘
//!                                 ▼
//!                     ┌───────────────────────┐
//!                     │   Answer Composer     │
//!                     │ tagged context block  │
//!                     │ bounded generation    │
//!                     └───────────┬───────────┘
//!                                 ▼
//!                       answer + ranked sources
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for storage, retrieval, and LLM settings
//! - [`error`] - `RagError` taxonomy and its HTTP status mapping
//! - [`models`] - Shared data types: `Chunk`, `CandidateResult`, `SourceEntry`, request/response types
//! - [`chunking`] - Token-window chunker over a pluggable tokenizer
//! - [`extract`] - URL content extraction (HTML via scraper, PDF via pdf-extract)
//! - [`search::vector`] - In-memory vector collection with cosine similarity and disk persistence
//! - [`search::mmr`] - Maximal marginal relevance selection
//! - [`search::adapter`] - Category routing, embedding, insert/search/clear over collections
//! - [`search::filter`] - Similarity threshold plus lexical overlap gate
//! - [`answer`] - Prompt assembly and pooled, time-bounded generation
//! - [`ledger`] - Per-URL ingestion bookkeeping
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::generate`] - Answer generation via Ollama or OpenAI-compatible APIs
//! - [`service`] - `RagService`, the pipeline object with its lifecycle
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state wiring concrete collaborators

pub mod answer;
pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod search;
pub mod service;
pub mod state;
