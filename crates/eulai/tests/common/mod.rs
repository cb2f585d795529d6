//! Scripted runtime hosted by the real sandbox

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

use eulai::analysis::{AnalysisSink, BlockOutcome, RenderedBlock};
use eulai::config::SamplingConfig;
use eulai::providers::{LlmRuntime, RuntimeFactory, TokenSink};
use eulai::session::BytesSource;
use eulai::types::Chunk;
use eulai::{Error, Result};

/// What the runtime does for one completion
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these fragments, then settle with their concatenation
    Tokens(Vec<&'static str>),
    /// Fail the completion
    Fail(&'static str),
    /// Settle without a result
    Nothing,
    /// Stream one fragment every few milliseconds until stopped
    Endless,
}

/// Shared script and call log
#[derive(Clone, Default)]
pub struct Script {
    pub log: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    gate: Option<Arc<Notify>>,
    model: Arc<Mutex<Vec<u8>>>,
}

impl Script {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        }
    }

    /// Completions wait for a notification before settling
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn factory(&self) -> Arc<dyn RuntimeFactory> {
        let script = self.clone();
        Arc::new(move || -> Result<Box<dyn LlmRuntime>> {
            Ok(Box::new(ScriptedRuntime {
                script: script.clone(),
            }))
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Bytes the runtime found in the model file at load time
    pub fn loaded_model(&self) -> Vec<u8> {
        self.model.lock().clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.log.lock().push(event.into());
    }
}

struct ScriptedRuntime {
    script: Script,
}

#[async_trait]
impl LlmRuntime for ScriptedRuntime {
    async fn start(&mut self) -> Result<()> {
        self.script.record("start");
        Ok(())
    }

    async fn load(&mut self, model_file: &Path, n_ctx: u32) -> Result<()> {
        *self.script.model.lock() = tokio::fs::read(model_file).await?;
        self.script.record(format!("load:{}", n_ctx));
        Ok(())
    }

    async fn init_sampling(&mut self, _config: &SamplingConfig) -> Result<()> {
        self.script.record("sampling");
        Ok(())
    }

    async fn complete(
        &mut self,
        prompt: &str,
        _max_tokens: u32,
        on_token: TokenSink<'_>,
        stop: watch::Receiver<bool>,
    ) -> Result<Option<String>> {
        self.script.record("complete:begin");
        self.script.record(format!("prompt:{}", prompt));
        let reply = self
            .script
            .replies
            .lock()
            .pop_front()
            .unwrap_or(Reply::Tokens(vec!["NO_CLAUSES_FOUND"]));

        let result = match reply {
            Reply::Tokens(tokens) => {
                let mut text = String::new();
                for token in tokens {
                    on_token(token);
                    text.push_str(token);
                    tokio::task::yield_now().await;
                }
                Ok(Some(text))
            }
            Reply::Fail(message) => Err(Error::inference(message)),
            Reply::Nothing => Ok(None),
            Reply::Endless => {
                let mut text = String::new();
                while !*stop.borrow() {
                    on_token("t");
                    text.push('t');
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                Ok(Some(text))
            }
        };

        if let Some(gate) = &self.script.gate {
            gate.notified().await;
        }
        self.script.record("complete:end");
        result
    }

    async fn reset(&mut self) -> Result<()> {
        self.script.record("reset");
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn model_source() -> BytesSource {
    BytesSource::new((0u8..=255).cycle().take(3000).collect::<Vec<u8>>(), 1024)
}

/// Sink recording everything it receives
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<(String, u8)>>,
    pub notices: Mutex<Vec<String>>,
    pub started: Mutex<Vec<usize>>,
    pub updates: Mutex<Vec<(usize, String)>>,
    pub outcomes: Mutex<Vec<(usize, BlockOutcome)>>,
}

impl RecordingSink {
    /// Progress messages excluding model loading
    pub fn run_progress(&self) -> Vec<(String, u8)> {
        self.progress
            .lock()
            .iter()
            .filter(|(message, _)| !message.starts_with("Loading model"))
            .cloned()
            .collect()
    }

    pub fn last_html(&self, index: usize) -> Option<String> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|(i, _)| *i == index)
            .map(|(_, html)| html.clone())
    }
}

impl AnalysisSink for RecordingSink {
    fn progress(&self, message: &str, percent: u8) {
        self.progress.lock().push((message.to_string(), percent));
    }

    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }

    fn block_started(&self, chunk: &Chunk) {
        self.started.lock().push(chunk.index);
    }

    fn block_updated(&self, index: usize, block: &RenderedBlock) {
        self.updates.lock().push((index, block.html.clone()));
    }

    fn block_finished(&self, index: usize, outcome: &BlockOutcome) {
        self.outcomes.lock().push((index, outcome.clone()));
    }
}

/// Three paragraphs that split into three chunks at `max_chunk_chars = 200`
pub fn three_block_text() -> String {
    (1..=3)
        .map(|n| format!("Section {} applies. {}", n, "x".repeat(130)))
        .collect::<Vec<_>>()
        .join("\n\n")
}
