//! Caller side of the sandbox channel and the session state machine

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{SamplingConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::providers::RuntimeFactory;

use super::protocol::{Action, LoadConfig, PathConfig, RemoteError, Request, Response};
use super::sandbox::{Sandbox, SandboxChannel};
use super::source::ModelSource;
use super::{Completion, SessionState};

type Outcome = std::result::Result<Value, RemoteError>;

/// Handle for a request awaiting its reply
struct PendingRequest {
    reply: oneshot::Sender<Outcome>,
    tokens: Option<mpsc::UnboundedSender<String>>,
}

type PendingMap = Arc<DashMap<u64, PendingRequest>>;

/// Owns the lifecycle of one sandboxed engine
pub struct SessionManager {
    requests: mpsc::UnboundedSender<Request>,
    pending: PendingMap,
    next_id: AtomicU64,
    state: Arc<Mutex<SessionState>>,
    config: SessionConfig,
    dispatcher: JoinHandle<()>,
}

impl SessionManager {
    /// Attach to an existing sandbox channel. Must be called inside a tokio runtime.
    pub fn new(channel: SandboxChannel, config: SessionConfig) -> Self {
        let SandboxChannel {
            requests,
            responses,
        } = channel;
        let pending: PendingMap = Arc::new(DashMap::new());
        let state = Arc::new(Mutex::new(SessionState::Uninitialized));

        let dispatcher = tokio::spawn(dispatch(responses, pending.clone(), state.clone()));

        Self {
            requests,
            pending,
            next_id: AtomicU64::new(1),
            state,
            config,
            dispatcher,
        }
    }

    /// Spawn a fresh sandbox around the given runtime factory
    pub fn spawn(factory: Arc<dyn RuntimeFactory>, config: SessionConfig) -> Self {
        Self::new(Sandbox::spawn(factory), config)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transfer the model into the sandbox and load it.
    ///
    /// `on_progress` receives `(loaded_bytes, total_bytes)` after every frame.
    /// Any failing step leaves the session `Failed`.
    pub async fn initialize<S, P>(&self, source: &mut S, on_progress: P) -> Result<()>
    where
        S: ModelSource + ?Sized,
        P: Fn(u64, u64) + Send,
    {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Uninitialized {
                return Err(Error::NotReady(*state));
            }
            *state = SessionState::Loading;
        }

        tracing::info!(
            "Loading model from {} ({} bytes)",
            source.describe(),
            source.size()
        );

        match self.load_sequence(source, on_progress).await {
            Ok(()) => {
                self.transition(SessionState::Loading, SessionState::Ready);
                tracing::info!("Session ready");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = SessionState::Failed;
                tracing::error!("Session initialization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn load_sequence<S, P>(&self, source: &mut S, on_progress: P) -> Result<()>
    where
        S: ModelSource + ?Sized,
        P: Fn(u64, u64) + Send,
    {
        let name = self.config.model_name.clone();
        let total = source.size();

        self.load_step(Action::ModuleInit(PathConfig {
            storage_root: self.config.storage_root.clone(),
        }))
        .await?;
        self.load_step(Action::FsAlloc {
            name: name.clone(),
            size: total,
        })
        .await?;

        let mut offset = 0u64;
        on_progress(0, total);
        loop {
            let frame = source
                .next_frame()
                .await
                .map_err(|e| Error::load("model source", e.to_string()))?;
            let Some(frame) = frame else { break };

            let len = frame.len() as u64;
            self.load_step(Action::FsWrite {
                name: name.clone(),
                data: frame,
                offset,
            })
            .await?;
            offset += len;
            on_progress(offset, total);
        }

        if offset != total {
            return Err(Error::load(
                "fs.write",
                format!("model source ended after {} of {} bytes", offset, total),
            ));
        }

        self.load_step(Action::RuntimeStart).await?;
        self.load_step(Action::Load(LoadConfig {
            n_ctx: self.config.n_ctx,
            model_path: self.config.model_path(),
        }))
        .await?;
        Ok(())
    }

    async fn load_step(&self, action: Action) -> Result<Value> {
        let stage = action.name();
        match self.call(action).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(remote)) => Err(Error::load(stage, remote.message)),
            Err(e) => Err(Error::load(stage, e.to_string())),
        }
    }

    /// Run one completion; `on_token` sees every fragment in order.
    ///
    /// Rejected with `Busy` while another request is in flight.
    pub async fn run_completion<F>(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        mut on_token: F,
    ) -> Result<Completion>
    where
        F: FnMut(&str) + Send,
    {
        let _guard = self.begin()?;

        match self.call(Action::SamplingInit(sampling.clone())).await? {
            Ok(_) => {}
            Err(remote) => return Err(Error::inference(remote.message)),
        }

        let (reply, mut tokens) = self.send(
            Action::Completion {
                prompt: prompt.to_string(),
                max_tokens: sampling.max_tokens,
            },
            true,
        )?;
        tokio::pin!(reply);

        let settled = loop {
            tokio::select! {
                biased;
                Some(text) = recv_token(&mut tokens) => on_token(&text),
                settled = &mut reply => break settled,
            }
        };
        // Tokens always precede their reply, so whatever is queued belongs here
        if let Some(rx) = tokens.as_mut() {
            while let Ok(text) = rx.try_recv() {
                on_token(&text);
            }
        }

        let outcome = settled.map_err(|_| self.channel_lost())?;
        match outcome.map_err(|remote| Error::inference(remote.message))? {
            Value::String(text) => Ok(Completion::new(text)),
            other => {
                tracing::warn!("Completion resolved without text ({}), degrading", other);
                Ok(Completion::degraded())
            }
        }
    }

    /// Clear conversation context without unloading the model
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.begin()?;
        match self.call(Action::Reset).await? {
            Ok(_) => {
                tracing::debug!("Session context reset");
                Ok(())
            }
            Err(remote) => Err(Error::inference(remote.message)),
        }
    }

    /// Ask the sandbox to stop the in-flight completion.
    ///
    /// Best effort: returns whether a completion was streaming. The caller of
    /// `run_completion` still awaits its settlement.
    pub async fn interrupt(&self) -> Result<bool> {
        match self.call(Action::Interrupt).await? {
            Ok(value) => Ok(value
                .get("interrupted")
                .and_then(Value::as_bool)
                .unwrap_or(false)),
            Err(remote) => Err(Error::inference(remote.message)),
        }
    }

    /// Enter `Busy` from `Ready`
    fn begin(&self) -> Result<BusyGuard<'_>> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Ready => {
                *state = SessionState::Busy;
                Ok(BusyGuard { state: &self.state })
            }
            SessionState::Busy => Err(Error::Busy("a request is already in flight".into())),
            other => Err(Error::NotReady(other)),
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }

    /// Send a request and await its reply without streaming
    async fn call(&self, action: Action) -> Result<Outcome> {
        let (reply, _) = self.send(action, false)?;
        reply.await.map_err(|_| self.channel_lost())
    }

    fn send(
        &self,
        action: Action,
        streaming: bool,
    ) -> Result<(
        oneshot::Receiver<Outcome>,
        Option<mpsc::UnboundedReceiver<String>>,
    )> {
        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let (tokens_tx, tokens_rx) = if streaming {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.pending.insert(
            correlation_id,
            PendingRequest {
                reply: reply_tx,
                tokens: tokens_tx,
            },
        );

        tracing::debug!("Session -> #{} {}", correlation_id, action.name());
        if self
            .requests
            .send(Request {
                correlation_id,
                action,
            })
            .is_err()
        {
            self.pending.remove(&correlation_id);
            return Err(self.channel_lost());
        }

        Ok((reply_rx, tokens_rx))
    }

    fn channel_lost(&self) -> Error {
        *self.state.lock() = SessionState::Failed;
        Error::channel("sandbox channel closed")
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Restores `Ready` when a request settles, unless the session failed meanwhile
struct BusyGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == SessionState::Busy {
            *state = SessionState::Ready;
        }
    }
}

async fn recv_token(tokens: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match tokens {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

/// Route sandbox responses to their pending requests by correlation id
async fn dispatch(
    mut responses: mpsc::UnboundedReceiver<Response>,
    pending: PendingMap,
    state: Arc<Mutex<SessionState>>,
) {
    while let Some(response) = responses.recv().await {
        let correlation_id = response.correlation_id();
        match response {
            Response::Token { text, .. } => match pending.get(&correlation_id) {
                Some(entry) => match &entry.tokens {
                    Some(tokens) => {
                        let _ = tokens.send(text);
                    }
                    None => tracing::warn!(
                        "Protocol error: token for non-streaming request #{}",
                        correlation_id
                    ),
                },
                None => tracing::warn!(
                    "Protocol error: token for unknown request #{}",
                    correlation_id
                ),
            },
            Response::Reply { outcome, .. } => match pending.remove(&correlation_id) {
                Some((_, entry)) => {
                    let _ = entry.reply.send(outcome);
                }
                None => tracing::warn!(
                    "Protocol error: reply for unknown request #{}",
                    correlation_id
                ),
            },
        }
    }

    tracing::error!("Sandbox channel closed, failing {} pending requests", pending.len());
    *state.lock() = SessionState::Failed;
    pending.clear();
}
