//! Core types shared across the pipeline

pub mod document;
pub mod finding;

pub use document::{Chunk, Extraction};
pub use finding::{Finding, Severity};
