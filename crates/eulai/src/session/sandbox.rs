//! Isolated worker task hosting the engine runtime
//!
//! The worker exclusively owns the runtime and its storage. It handles one
//! request at a time; while a completion streams it keeps reading its inbox
//! to honour `interrupt` and to answer everything else with a busy error.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::providers::{LlmRuntime, RuntimeFactory};

use super::protocol::{Action, RemoteError, Request, Response};
use super::storage::SandboxStorage;

/// Caller side of a sandbox: request sender and response receiver
pub struct SandboxChannel {
    pub requests: mpsc::UnboundedSender<Request>,
    pub responses: mpsc::UnboundedReceiver<Response>,
}

impl SandboxChannel {
    /// Create a connected pair: the caller side and the sandbox side
    pub fn pair() -> (
        Self,
        (
            mpsc::UnboundedReceiver<Request>,
            mpsc::UnboundedSender<Response>,
        ),
    ) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: request_tx,
                responses: response_rx,
            },
            (request_rx, response_tx),
        )
    }
}

/// Spawns sandbox workers
pub struct Sandbox;

impl Sandbox {
    /// Spawn a worker on the current tokio runtime
    pub fn spawn(factory: Arc<dyn RuntimeFactory>) -> SandboxChannel {
        let (channel, (inbox, outbox)) = SandboxChannel::pair();
        let worker = SandboxWorker {
            factory,
            runtime: None,
            storage: None,
            outbox,
        };
        tokio::spawn(worker.run(inbox));
        channel
    }
}

struct SandboxWorker {
    factory: Arc<dyn RuntimeFactory>,
    runtime: Option<Box<dyn LlmRuntime>>,
    storage: Option<SandboxStorage>,
    outbox: mpsc::UnboundedSender<Response>,
}

impl SandboxWorker {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Request>) {
        tracing::debug!("Sandbox worker started");

        while let Some(request) = inbox.recv().await {
            let id = request.correlation_id;
            let action = request.action.name();
            tracing::debug!("Sandbox <- #{} {}", id, action);

            let outcome = match request.action {
                Action::Completion { prompt, max_tokens } => {
                    self.complete(id, &prompt, max_tokens, &mut inbox).await
                }
                // Nothing is streaming, so there is nothing to stop
                Action::Interrupt => Ok(json!({ "interrupted": false })),
                other => self.handle(other).await,
            };

            if let Err(e) = &outcome {
                tracing::warn!("Sandbox request #{} ({}) failed: {}", id, action, e);
            }

            let reply = Response::Reply {
                correlation_id: id,
                outcome: outcome.map_err(RemoteError::from),
            };
            if self.outbox.send(reply).is_err() {
                break;
            }
        }

        tracing::debug!("Sandbox worker stopped");
    }

    async fn handle(&mut self, action: Action) -> Result<Value> {
        match action {
            Action::ModuleInit(paths) => {
                if self.runtime.is_some() {
                    return Err(Error::internal("module already initialized"));
                }
                let storage = SandboxStorage::open(&paths).await?;
                let runtime = self.factory.create()?;
                let root = storage.root().display().to_string();

                tracing::info!("Sandbox module initialized ({} runtime)", runtime.name());
                self.storage = Some(storage);
                self.runtime = Some(runtime);
                Ok(json!({ "storage_root": root }))
            }
            Action::FsAlloc { name, size } => {
                self.storage_mut()?.alloc(&name, size).await?;
                Ok(json!({ "name": name, "size": size }))
            }
            Action::FsWrite { name, data, offset } => {
                self.storage_mut()?.write(&name, &data, offset).await?;
                Ok(json!({ "written": data.len() }))
            }
            Action::RuntimeStart => {
                self.runtime()?.start().await?;
                Ok(json!({ "started": true }))
            }
            Action::Load(config) => {
                let model_file = self.storage_mut()?.resolve(&config.model_path)?;
                self.runtime()?.load(&model_file, config.n_ctx).await?;
                Ok(json!({ "model_path": config.model_path, "n_ctx": config.n_ctx }))
            }
            Action::SamplingInit(config) => {
                self.runtime()?.init_sampling(&config).await?;
                Ok(Value::Null)
            }
            Action::Reset => {
                self.runtime()?.reset().await?;
                Ok(Value::Null)
            }
            Action::Completion { .. } | Action::Interrupt => Err(Error::Internal(
                "streaming action routed to the plain handler".into(),
            )),
        }
    }

    /// Run one completion while watching the inbox for interrupts
    async fn complete(
        &mut self,
        id: u64,
        prompt: &str,
        max_tokens: u32,
        inbox: &mut mpsc::UnboundedReceiver<Request>,
    ) -> Result<Value> {
        let outbox = self.outbox.clone();
        let tokens = self.outbox.clone();
        let runtime = self.runtime()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut on_token = move |text: &str| {
            let _ = tokens.send(Response::Token {
                correlation_id: id,
                text: text.to_string(),
            });
        };

        let generation = runtime.complete(prompt, max_tokens, &mut on_token, stop_rx);
        tokio::pin!(generation);

        let mut inbox_open = true;
        loop {
            tokio::select! {
                result = &mut generation => {
                    return result.map(|text| text.map(Value::String).unwrap_or(Value::Null));
                }
                next = inbox.recv(), if inbox_open => {
                    let Some(request) = next else {
                        inbox_open = false;
                        continue;
                    };

                    let outcome = match request.action {
                        Action::Interrupt => {
                            tracing::info!("Interrupting completion #{}", id);
                            stop_tx.send_replace(true);
                            Ok(json!({ "interrupted": true }))
                        }
                        other => Err(RemoteError::new(format!(
                            "busy: completion #{} in flight, rejected {}",
                            id,
                            other.name()
                        ))),
                    };
                    let _ = outbox.send(Response::Reply {
                        correlation_id: request.correlation_id,
                        outcome,
                    });
                }
            }
        }
    }

    fn runtime(&mut self) -> Result<&mut Box<dyn LlmRuntime>> {
        self.runtime
            .as_mut()
            .ok_or_else(|| Error::internal("module not initialized"))
    }

    fn storage_mut(&mut self) -> Result<&mut SandboxStorage> {
        self.storage
            .as_mut()
            .ok_or_else(|| Error::internal("module not initialized"))
    }
}
