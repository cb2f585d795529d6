//! Sequential per-chunk analysis loop
//!
//! One run segments the text and feeds chunks to the session one at a time:
//! reset, complete, classify the growing buffer after every fragment, finalize.
//! A failing chunk is rendered as an error and the run moves on.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{EulaiConfig, SamplingConfig};
use crate::error::{Error, Result};
use crate::ingestion::{Extractor, HtmlDocument, Segmenter};
use crate::session::{ModelSource, SessionManager, SessionState};
use crate::types::{Chunk, Extraction, Finding};

use super::classifier::{Classifier, ParsedBlock};
use super::prompt::PromptBuilder;
use super::render::{BlockRenderer, RenderedBlock};

/// Notice sent when a page yields nothing to analyze
pub const NO_DOCUMENT_NOTICE: &str = "No document detected on this page.";

/// Receives progress and per-block rendering from a run
pub trait AnalysisSink: Send + Sync {
    /// Overall progress (0-100)
    fn progress(&self, message: &str, percent: u8);

    /// Run-level notice
    fn notice(&self, _message: &str) {}

    /// A chunk is about to be analyzed
    fn block_started(&self, _chunk: &Chunk) {}

    /// Latest rendering of a block; called repeatedly while output streams
    fn block_updated(&self, index: usize, block: &RenderedBlock);

    /// Final outcome of a block
    fn block_finished(&self, _index: usize, _outcome: &BlockOutcome) {}
}

/// Final result of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockOutcome {
    /// Output parsed into narrative and findings
    Findings { parsed: ParsedBlock },
    /// Only the sentinel or whitespace was produced
    Empty,
    /// The chunk could not be analyzed
    Failed { error: String },
}

/// Summary returned at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub total_chunks: usize,
    pub completed: usize,
    pub failed: usize,
    pub findings: Vec<Finding>,
}

impl AnalysisReport {
    fn record(&mut self, outcome: &BlockOutcome) {
        match outcome {
            BlockOutcome::Findings { parsed } => {
                self.completed += 1;
                self.findings.extend(parsed.findings().cloned());
            }
            BlockOutcome::Empty => self.completed += 1,
            BlockOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Host transport delivering a page's extracted text
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn extract(&self) -> Result<Extraction>;
}

/// Extraction already performed by the host
#[async_trait]
impl PageSource for Extraction {
    async fn extract(&self) -> Result<Extraction> {
        Ok(self.clone())
    }
}

/// Page given as HTML markup
pub struct HtmlPage {
    markup: String,
    extractor: Extractor,
}

impl HtmlPage {
    /// Page extracted with the default noise filter
    pub fn new(markup: impl Into<String>) -> Self {
        Self::with_extractor(markup, Extractor::default())
    }

    /// Page extracted with a custom extractor
    pub fn with_extractor(markup: impl Into<String>, extractor: Extractor) -> Self {
        Self {
            markup: markup.into(),
            extractor,
        }
    }
}

#[async_trait]
impl PageSource for HtmlPage {
    async fn extract(&self) -> Result<Extraction> {
        let tree = HtmlDocument::parse(&self.markup).to_tree();
        Ok(self.extractor.extract(&tree))
    }
}

/// Drives analysis runs over one session
pub struct Orchestrator {
    session: Arc<SessionManager>,
    segmenter: Segmenter,
    prompts: PromptBuilder,
    classifier: Classifier,
    renderer: BlockRenderer,
    sampling: SamplingConfig,
    sentinel: String,
    model_source: Mutex<Option<Box<dyn ModelSource>>>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator for the session
    pub fn new(session: Arc<SessionManager>, config: &EulaiConfig) -> Result<Self> {
        Ok(Self {
            session,
            segmenter: Segmenter::from_config(&config.segmentation)?,
            prompts: PromptBuilder::from_config(&config.analysis)?,
            classifier: Classifier::new(),
            renderer: BlockRenderer::default(),
            sampling: config.sampling.clone(),
            sentinel: config.analysis.sentinel.clone(),
            model_source: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Model loaded into the session before the first run
    pub fn with_model_source(self, source: Box<dyn ModelSource>) -> Self {
        *self.model_source.lock() = Some(source);
        self
    }

    /// Replace the block renderer
    pub fn with_renderer(mut self, renderer: BlockRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Analyze the text of a host page
    pub async fn analyze_page(
        &self,
        page: &dyn PageSource,
        sink: &dyn AnalysisSink,
    ) -> Result<AnalysisReport> {
        let extraction = match page.extract().await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!("Page extraction failed: {}", e);
                Extraction::invalid()
            }
        };

        if extraction.is_empty() {
            sink.notice(NO_DOCUMENT_NOTICE);
            return Ok(AnalysisReport::default());
        }
        self.run(&extraction.text, sink).await
    }

    /// Analyze text chunk by chunk
    pub async fn run(&self, text: &str, sink: &dyn AnalysisSink) -> Result<AnalysisReport> {
        let _running = RunGuard::acquire(&self.running)?;

        let chunks = self.segmenter.split(text);
        let total = chunks.len();
        if chunks.is_empty() {
            sink.notice(NO_DOCUMENT_NOTICE);
            return Ok(AnalysisReport::default());
        }

        self.ensure_session(sink).await?;
        tracing::info!(
            "Analyzing {} blocks of up to {} chars",
            total,
            self.segmenter.max_chars()
        );
        sink.progress(&format!("Preparing {} blocks...", total), 1);

        let mut report = AnalysisReport {
            total_chunks: total,
            ..Default::default()
        };

        for chunk in &chunks {
            sink.progress(
                &format!("Analyzing Block {}/{}", chunk.index + 1, total),
                percent(chunk.index as u64, total as u64),
            );
            sink.block_started(chunk);

            let outcome = match self.analyze_chunk(chunk, sink).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("{} failed: {}", chunk.label(), e);
                    let block = self.renderer.render_error(chunk.index, &e.to_string());
                    sink.block_updated(chunk.index, &block);
                    BlockOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            report.record(&outcome);
            sink.block_finished(chunk.index, &outcome);
        }

        sink.progress("Analysis Complete", 100);
        tracing::info!(
            "Analysis complete: {} blocks, {} failed, {} findings",
            report.total_chunks,
            report.failed,
            report.findings.len()
        );
        Ok(report)
    }

    /// Load the configured model when the session is still fresh
    async fn ensure_session(&self, sink: &dyn AnalysisSink) -> Result<()> {
        if self.session.state() != SessionState::Uninitialized {
            return Ok(());
        }

        let source = self.model_source.lock().take();
        let Some(mut source) = source else {
            return Err(Error::NotReady(SessionState::Uninitialized));
        };

        self.session
            .initialize(source.as_mut(), |loaded, total| {
                let pct = percent(loaded, total);
                sink.progress(&format!("Loading model: {}%", pct), pct);
            })
            .await
    }

    async fn analyze_chunk(&self, chunk: &Chunk, sink: &dyn AnalysisSink) -> Result<BlockOutcome> {
        self.session.reset().await?;

        let prompt = self.prompts.build(chunk);
        let mut buffer = String::new();
        let mut streamed = false;

        let completion = self
            .session
            .run_completion(&prompt, &self.sampling, |token| {
                streamed = true;
                buffer.push_str(token);
                let clean = self.strip_sentinel(&buffer);
                if !clean.is_empty() {
                    let block = self.renderer.render(self.classifier.parse(chunk.index, &clean));
                    sink.block_updated(chunk.index, &block);
                }
            })
            .await?;

        if !streamed {
            if completion.degraded {
                tracing::warn!("{} produced no usable result", chunk.label());
            }
            buffer = completion.text;
        }

        Ok(self.finalize(chunk.index, &buffer, sink))
    }

    fn finalize(&self, index: usize, buffer: &str, sink: &dyn AnalysisSink) -> BlockOutcome {
        let clean = self.strip_sentinel(buffer);
        let parsed = self.classifier.parse(index, &clean);

        if parsed.is_empty() {
            sink.block_updated(index, &self.renderer.render_empty(index));
            return BlockOutcome::Empty;
        }

        let block = self.renderer.render(parsed);
        sink.block_updated(index, &block);
        BlockOutcome::Findings {
            parsed: block.parsed,
        }
    }

    fn strip_sentinel(&self, buffer: &str) -> String {
        if self.sentinel.is_empty() {
            return buffer.trim().to_string();
        }
        buffer.replace(&self.sentinel, "").trim().to_string()
    }
}

/// Rejects a second concurrent run
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy("an analysis is already running".into()))?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
