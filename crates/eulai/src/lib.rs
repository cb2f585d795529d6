//! eulai: Local terms-of-service analyzer
//!
//! Extracts readable text from a page tree, splits it into bounded chunks at
//! semantic boundaries, and streams each chunk through a sandboxed LLM session
//! whose output is classified into `[BLOCKER]`, `[BAD]`, `[GOOD]` and
//! `[NEUTRAL]` findings.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod providers;
pub mod session;
pub mod types;

pub use analysis::{AnalysisReport, AnalysisSink, BlockOutcome, Orchestrator, PageSource};
pub use config::EulaiConfig;
pub use error::{Error, ErrorKind, Result};
pub use ingestion::{Extractor, HtmlDocument, Segmenter, StructuredNode};
pub use session::{Completion, SessionManager, SessionState};
pub use types::{Chunk, Extraction, Finding, Severity};
