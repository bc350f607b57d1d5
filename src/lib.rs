//! Streaming multi-provider conversation engine.
//!
//! Parley drives one conversational turn at a time against OpenAI-,
//! Anthropic-, or Gemini-compatible streaming chat APIs and normalizes all
//! three wire dialects into one canonical event stream. The layers, bottom
//! to top:
//!
//! - [`provider::sse`]: incremental SSE frame decoding over raw bytes
//! - [`provider`]: per-provider request envelopes and frame decoders behind
//!   one adapter trait, plus the stream task service
//! - [`api`]: the canonical provider-agnostic payload types
//! - [`core::accumulator`]: reassembly of fragmented tool-call deltas
//! - [`tools`]: the tool trait, registry, and built-in tools
//! - [`core::conversation`]: the per-mode ordered message store
//! - [`core::turn`]: the turn orchestrator and its staleness gate
//!
//! Rendering, persistence, and transport retries are the host's business;
//! this crate ends at finalized messages in the store.

pub mod api;
pub mod core;
pub mod provider;
pub mod tools;
pub mod utils;
