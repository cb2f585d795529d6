//! Ollama-backed runtime
//!
//! `load` pushes the stored model file to the server as a blob and registers
//! it under the configured model name; completions stream NDJSON from
//! `/api/generate` and carry the conversation context between calls.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use crate::config::{LlmConfig, SamplingConfig};
use crate::error::{Error, Result};

use super::llm::{LlmRuntime, TokenSink};

const DIGEST_READ_SIZE: usize = 1024 * 1024;

#[derive(Serialize)]
struct CreateRequest<'a> {
    model: &'a str,
    files: HashMap<String, String>,
    stream: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a [i64]>,
    options: GenerateOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    context: Option<Vec<i64>>,
    #[serde(default)]
    error: Option<String>,
}

/// Runtime delegating generation to a local Ollama server
pub struct OllamaRuntime {
    client: Client,
    config: LlmConfig,
    sampling: SamplingConfig,
    n_ctx: u32,
    context: Option<Vec<i64>>,
    loaded: bool,
}

impl OllamaRuntime {
    /// Create a new Ollama runtime
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(5);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
            sampling: SamplingConfig::default(),
            n_ctx: 0,
            context: None,
            loaded: false,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn options(&self, max_tokens: u32) -> GenerateOptions {
        GenerateOptions {
            temperature: self.sampling.temperature,
            top_k: self.sampling.top_k,
            top_p: self.sampling.top_p,
            num_predict: max_tokens,
            num_ctx: self.n_ctx,
        }
    }

    /// Upload the model file as a blob unless the server already has it
    async fn push_blob(&self, model_file: &Path, digest: &str) -> Result<()> {
        let url = self.url(&format!("/api/blobs/{}", digest));

        let exists = self.client.head(&url).send().await?;
        if exists.status() == StatusCode::OK {
            tracing::debug!("Blob {} already present", digest);
            return Ok(());
        }

        let file = tokio::fs::File::open(model_file).await?;
        let response = self.client.post(&url).body(file).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::internal(format!(
                "Blob upload failed: HTTP {} - {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LlmRuntime for OllamaRuntime {
    async fn start(&mut self) -> Result<()> {
        let response = self.client.get(self.url("/api/version")).send().await?;
        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "Ollama at {} answered HTTP {}",
                self.config.base_url,
                response.status()
            )));
        }
        tracing::info!("Ollama reachable at {}", self.config.base_url);
        Ok(())
    }

    async fn load(&mut self, model_file: &Path, n_ctx: u32) -> Result<()> {
        let digest = file_digest(model_file).await?;
        self.push_blob(model_file, &digest).await?;

        let file_name = model_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.gguf".to_string());
        let request = CreateRequest {
            model: &self.config.model,
            files: HashMap::from([(file_name, digest.clone())]),
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/create"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::internal(format!(
                "Model registration failed: HTTP {} - {}",
                status, body
            )));
        }

        self.n_ctx = n_ctx;
        self.context = None;
        self.loaded = true;
        tracing::info!(
            "Model {} registered as '{}' (n_ctx {})",
            digest,
            self.config.model,
            n_ctx
        );
        Ok(())
    }

    async fn init_sampling(&mut self, config: &SamplingConfig) -> Result<()> {
        self.sampling = config.clone();
        Ok(())
    }

    async fn complete(
        &mut self,
        prompt: &str,
        max_tokens: u32,
        on_token: TokenSink<'_>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<Option<String>> {
        if !self.loaded {
            return Err(Error::inference("no model loaded"));
        }

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: true,
            context: self.context.as_deref(),
            options: self.options(max_tokens),
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::inference(format!(
                "Generation failed: HTTP {} - {}",
                status, body
            )));
        }

        let mut body = Box::pin(response.bytes_stream());
        let mut lines = LineBuffer::default();
        let mut text = String::new();
        let mut finished = false;

        'stream: while !*stop.borrow() {
            let bytes = tokio::select! {
                next = body.next() => match next {
                    Some(bytes) => bytes?,
                    None => break,
                },
                _ = stop.changed() => break,
            };

            for line in lines.push(&bytes) {
                let chunk: StreamChunk = serde_json::from_str(&line)?;
                if let Some(error) = chunk.error {
                    return Err(Error::inference(error));
                }
                if !chunk.response.is_empty() {
                    on_token(&chunk.response);
                    text.push_str(&chunk.response);
                }
                if chunk.done {
                    if chunk.context.is_some() {
                        self.context = chunk.context;
                    }
                    finished = true;
                    break 'stream;
                }
            }
        }

        if !finished {
            tracing::info!("Generation stopped after {} chars", text.len());
        }
        Ok(Some(text))
    }

    async fn reset(&mut self) -> Result<()> {
        self.context = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Hex sha256 digest in Ollama's `sha256:<hex>` notation
async fn file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; DIGEST_READ_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Reassembles newline-delimited records split across network chunks
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_reassembles_split_records() {
        let mut buffer = LineBuffer::default();

        assert!(buffer.push(b"{\"response\":\"Hel").is_empty());
        let lines = buffer.push(b"lo\"}\n{\"response\":\"!\"}\n\n{\"done\"");
        assert_eq!(lines, vec!["{\"response\":\"Hello\"}", "{\"response\":\"!\"}"]);

        let lines = buffer.push(b":true}\n");
        assert_eq!(lines, vec!["{\"done\":true}"]);
    }

    #[test]
    fn test_stream_chunk_fields() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"response":"","done":true,"context":[1,2,3]}"#).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.context, Some(vec![1, 2, 3]));

        let chunk: StreamChunk = serde_json::from_str(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model not found"));
    }

    #[test]
    fn test_options_follow_sampling() {
        let mut runtime = OllamaRuntime::new(&LlmConfig::default()).unwrap();
        runtime.n_ctx = 2048;
        runtime.sampling.top_k = 10;

        let options = runtime.options(256);
        assert_eq!(options.num_predict, 256);
        assert_eq!(options.num_ctx, 2048);
        assert_eq!(options.top_k, 10);
    }

    #[tokio::test]
    async fn test_file_digest() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"abc").unwrap();

        assert_eq!(
            file_digest(file.path()).await.unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_complete_requires_load() {
        let mut runtime = OllamaRuntime::new(&LlmConfig::default()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut sink = |_: &str| {};

        assert!(runtime.complete("hi", 8, &mut sink, rx).await.is_err());
    }
}
