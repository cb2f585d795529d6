//! Per-chunk analysis: prompting, classification, rendering and the run loop

pub mod classifier;
pub mod orchestrator;
pub mod prompt;
pub mod render;

pub use classifier::{strip_reasoning, Classifier, ParsedBlock, Segment};
pub use orchestrator::{
    AnalysisReport, AnalysisSink, BlockOutcome, HtmlPage, Orchestrator, PageSource,
    NO_DOCUMENT_NOTICE,
};
pub use prompt::PromptBuilder;
pub use render::{BlockRenderer, CommonMark, MarkdownRenderer, RenderedBlock};
