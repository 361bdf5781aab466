//! Fair-trade law RAG engine.
//!
//! [`FairTradeRag`] loads the collected statutes, chunks them into retrievable
//! units, keeps a vector index over them, and answers two kinds of request:
//! grounded analysis of a free-text business dispute ([`AnalysisResult`]) and
//! summaries of whole laws.

pub mod cases;
mod composer;
mod error;
mod orchestrator;
pub mod prompts;
mod retriever;

pub use cases::{EXAMPLE_CASES, ExampleCase, example_case};
pub use composer::{AnalysisResult, Composer};
pub use error::EngineError;
pub use orchestrator::{FairTradeRag, SystemStatus};
pub use retriever::Retriever;
