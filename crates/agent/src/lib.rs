//! Field extraction - turning free text into structured project fields
//!
//! This crate supplies the `FieldExtractor` implementations the workflow
//! engine is parameterized over:
//! - `KeywordExtractor` - deterministic lexical extraction, no network,
//!   always available; the default for the CLI and for tests
//! - `LlmExtractor` - prompts a pluggable completion client for a JSON
//!   object of fields and degrades to an empty extraction on bad output
//!
//! # Safety Principle
//!
//! Extraction is strictly a translator. It never decides prices or ranges;
//! those are deterministic decisions made by the estimation core. A wrong
//! or missed extraction only ever costs the user one clarifying question.

pub mod extractor;
pub mod llm;

pub use extractor::{KeywordExtractor, LlmExtractor};
pub use llm::LlmClient;
