//! Runtime lifecycle: one dedicated OS thread hosting the numeric backend.
//!
//! The host talks to that thread only through JSON text over channels. `start` is
//! one-shot; requests submitted while the runtime is still loading are queued and
//! flushed in submission order once `ready` arrives. A failed bootstrap is terminal:
//! the queue is answered with synthesized errors and every later `submit` fails
//! without touching the thread again. A thread that dies after `ready` leaves the
//! runtime in `Error` as well, reported as lost rather than as a failed start.

use std::collections::VecDeque;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::compute_input::InputError;
use crate::config::errors::{ERR_BOOTSTRAP, ERR_PROTOCOL, ERR_RUNTIME_LOST, ERR_TERMINATED};
use crate::numeric::NumericBackend;
use crate::protocol::{CorrelationId, Envelope, ProtocolError, RequestKind, Response};

pub const RUNTIME_THREAD_NAME: &str = "polysolve-runtime";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RuntimeState {
    /// Constructed, `start` not called yet.
    Idle,
    Loading,
    Ready,
    /// Bootstrap failed or the runtime thread died. Terminal.
    Error(String),
    /// `shutdown` was called. Terminal.
    Terminated,
}

impl RuntimeState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, RuntimeState::Idle | RuntimeState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RuntimeState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeState::Idle => "idle",
            RuntimeState::Loading => "loading",
            RuntimeState::Ready => "ready",
            RuntimeState::Error(_) => "error",
            RuntimeState::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{code}: numeric runtime failed to start: {0}", code = ERR_BOOTSTRAP)]
    Bootstrap(String),
    #[error("{code}: numeric runtime stopped: {0}", code = ERR_RUNTIME_LOST)]
    RuntimeLost(String),
    #[error("{code}: numeric runtime has been shut down", code = ERR_TERMINATED)]
    Terminated,
    #[error("numeric runtime has not been started")]
    NotStarted,
    #[error("numeric runtime was already started")]
    AlreadyStarted,
    #[error("a calculation is already in flight")]
    Busy,
    #[error("{kind} requests cannot carry correlation id {id}")]
    InvalidCorrelation { kind: RequestKind, id: CorrelationId },
    #[error("{0} requests need a correlation id")]
    MissingCorrelation(RequestKind),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("failed to spawn runtime thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Outcome of a successful `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the runtime thread.
    Sent,
    /// Held until the bootstrap settles.
    Queued,
}

#[derive(Debug)]
enum WorkerEvent {
    Message(String),
    BootstrapFailed(String),
}

struct Lifecycle {
    state: RuntimeState,
    /// Set once `ready` arrived; tells a lost runtime from a failed bootstrap.
    booted: bool,
    queue: VecDeque<Envelope>,
    to_worker: Option<std_mpsc::Sender<String>>,
    responses: Option<mpsc::UnboundedSender<Response>>,
}

impl Lifecycle {
    fn unavailable(&self) -> Option<DispatchError> {
        match &self.state {
            RuntimeState::Idle => Some(DispatchError::NotStarted),
            RuntimeState::Error(reason) if self.booted => {
                Some(DispatchError::RuntimeLost(reason.clone()))
            }
            RuntimeState::Error(reason) => Some(DispatchError::Bootstrap(reason.clone())),
            RuntimeState::Terminated => Some(DispatchError::Terminated),
            RuntimeState::Loading | RuntimeState::Ready => None,
        }
    }
}

struct Inner {
    runtime_id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<RuntimeState>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the single numeric runtime instance. Cheap to clone; clones share it.
#[derive(Clone)]
pub struct RuntimeManager {
    inner: Arc<Inner>,
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeManager {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(RuntimeState::Idle);
        Self {
            inner: Arc::new(Inner {
                runtime_id: Uuid::new_v4(),
                lifecycle: Mutex::new(Lifecycle {
                    state: RuntimeState::Idle,
                    booted: false,
                    queue: VecDeque::new(),
                    to_worker: None,
                    responses: None,
                }),
                state_tx,
                pump: Mutex::new(None),
            }),
        }
    }

    pub fn runtime_id(&self) -> Uuid {
        self.inner.runtime_id
    }

    /// Spawn the runtime thread and begin its bootstrap.
    ///
    /// Every decoded `result`/`error` from the thread, plus errors synthesized for
    /// queued requests that can never be sent, is delivered on `responses`.
    /// Must be called from within a tokio runtime.
    pub fn start<B: NumericBackend>(
        &self,
        backend: B,
        responses: mpsc::UnboundedSender<Response>,
    ) -> Result<(), DispatchError> {
        let mut lc = self.inner.lifecycle.lock();
        if lc.state != RuntimeState::Idle {
            return Err(DispatchError::AlreadyStarted);
        }

        let (req_tx, req_rx) = std_mpsc::channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runtime_id = self.inner.runtime_id;

        let spawned = thread::Builder::new()
            .name(RUNTIME_THREAD_NAME.into())
            .spawn(move || worker_main(backend, req_rx, event_tx, runtime_id));
        if let Err(err) = spawned {
            tracing::error!(target = "polysolve", %runtime_id, error = %err, "runtime thread spawn failed");
            self.inner
                .set_state(&mut lc, RuntimeState::Error(err.to_string()));
            return Err(DispatchError::Spawn(err));
        }

        lc.to_worker = Some(req_tx);
        lc.responses = Some(responses);
        self.inner.set_state(&mut lc, RuntimeState::Loading);
        drop(lc);

        let pump = tokio::spawn(pump_worker_events(self.inner.clone(), event_rx));
        *self.inner.pump.lock() = Some(pump);
        tracing::info!(target = "polysolve", %runtime_id, "numeric runtime loading");
        Ok(())
    }

    pub fn state(&self) -> RuntimeState {
        self.inner.lifecycle.lock().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lifecycle.lock().state.is_ready()
    }

    /// Why requests cannot be accepted right now, if they cannot.
    pub fn unavailable(&self) -> Option<DispatchError> {
        self.inner.lifecycle.lock().unavailable()
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolve once the runtime has left `Idle`/`Loading`.
    pub async fn settled(&self) -> RuntimeState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(RuntimeState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }

    /// Send a request now, or queue it while the runtime is loading.
    pub fn submit(&self, envelope: Envelope) -> Result<Submission, DispatchError> {
        let raw = envelope.encode()?;
        let mut lc = self.inner.lifecycle.lock();
        if let Some(err) = lc.unavailable() {
            return Err(err);
        }
        match lc.state.clone() {
            RuntimeState::Loading => {
                tracing::debug!(
                    target = "polysolve",
                    kind = %envelope.kind(),
                    queued = lc.queue.len() + 1,
                    "runtime loading, request queued"
                );
                lc.queue.push_back(envelope);
                Ok(Submission::Queued)
            }
            RuntimeState::Ready => {
                let sent = lc
                    .to_worker
                    .as_ref()
                    .map(|tx| tx.send(raw).is_ok())
                    .unwrap_or(false);
                if sent {
                    Ok(Submission::Sent)
                } else {
                    let reason = "runtime thread is gone".to_string();
                    self.inner.lose(&mut lc, reason.clone());
                    Err(DispatchError::RuntimeLost(reason))
                }
            }
            _ => Err(DispatchError::NotStarted),
        }
    }

    /// Release the runtime. Idempotent. Returns the state it was in.
    ///
    /// Queued requests are answered with a synthesized "terminated" error. The
    /// runtime thread exits once it finishes whatever request it is running.
    pub fn shutdown(&self) -> RuntimeState {
        let mut lc = self.inner.lifecycle.lock();
        if lc.state == RuntimeState::Terminated {
            return RuntimeState::Terminated;
        }
        let previous = lc.state.clone();
        self.inner.set_state(&mut lc, RuntimeState::Terminated);
        lc.to_worker = None;
        let message = DispatchError::Terminated.to_string();
        answer_queue(&mut lc, &message);
        lc.responses = None;
        drop(lc);

        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        tracing::info!(
            target = "polysolve",
            runtime_id = %self.inner.runtime_id,
            previous = previous.as_str(),
            "numeric runtime shut down"
        );
        previous
    }
}

impl Inner {
    fn set_state(&self, lc: &mut Lifecycle, next: RuntimeState) {
        lc.state = next.clone();
        self.state_tx.send_replace(next);
    }

    fn mark_ready(&self) {
        let mut lc = self.lifecycle.lock();
        if lc.state != RuntimeState::Loading {
            tracing::warn!(
                target = "polysolve",
                state = lc.state.as_str(),
                "unexpected ready message ignored"
            );
            return;
        }
        self.set_state(&mut lc, RuntimeState::Ready);
        lc.booted = true;
        let queued: Vec<Envelope> = lc.queue.drain(..).collect();
        tracing::info!(
            target = "polysolve",
            runtime_id = %self.runtime_id,
            flushed = queued.len(),
            "numeric runtime ready"
        );
        for envelope in queued {
            let sent = match (envelope.encode(), lc.to_worker.as_ref()) {
                (Ok(raw), Some(tx)) => tx.send(raw).is_ok(),
                _ => false,
            };
            if !sent {
                synthesize_error(&lc, &envelope, "runtime thread is gone");
            }
        }
    }

    fn fail(&self, reason: String) {
        let mut lc = self.lifecycle.lock();
        self.fail_locked(&mut lc, reason);
    }

    fn fail_locked(&self, lc: &mut Lifecycle, reason: String) {
        if lc.state != RuntimeState::Loading {
            return;
        }
        tracing::error!(
            target = "polysolve",
            runtime_id = %self.runtime_id,
            reason = %reason,
            "numeric runtime bootstrap failed"
        );
        let message = DispatchError::Bootstrap(reason.clone()).to_string();
        self.set_state(lc, RuntimeState::Error(reason));
        lc.to_worker = None;
        answer_queue(lc, &message);
    }

    /// The thread is gone after a successful bootstrap.
    fn lose(&self, lc: &mut Lifecycle, reason: String) {
        tracing::error!(
            target = "polysolve",
            runtime_id = %self.runtime_id,
            reason = %reason,
            "numeric runtime lost"
        );
        self.set_state(lc, RuntimeState::Error(reason));
        lc.to_worker = None;
    }

    fn forward(&self, response: Response) {
        let lc = self.lifecycle.lock();
        match lc.state {
            RuntimeState::Ready => {
                if let Some(tx) = lc.responses.as_ref() {
                    if tx.send(response).is_err() {
                        tracing::debug!(target = "polysolve", "response receiver dropped");
                    }
                }
            }
            RuntimeState::Loading => tracing::warn!(
                target = "polysolve",
                code = ERR_PROTOCOL,
                kind = ?response.request_kind(),
                "protocol error: response before ready, dropped"
            ),
            _ => tracing::debug!(
                target = "polysolve",
                state = lc.state.as_str(),
                "response after runtime settled terminally, dropped"
            ),
        }
    }

    fn worker_exited(&self) {
        let mut lc = self.lifecycle.lock();
        match lc.state.clone() {
            RuntimeState::Loading => {
                self.fail_locked(&mut lc, "runtime thread exited before ready".into())
            }
            RuntimeState::Ready => self.lose(&mut lc, "runtime thread exited".into()),
            _ => {}
        }
    }
}

fn synthesize_error(lc: &Lifecycle, envelope: &Envelope, message: &str) {
    let Some(tx) = lc.responses.as_ref() else {
        return;
    };
    let _ = tx.send(Response::Error {
        request_kind: Some(envelope.kind()),
        id: envelope.id,
        message: message.to_string(),
    });
}

fn answer_queue(lc: &mut Lifecycle, message: &str) {
    let queued: Vec<Envelope> = lc.queue.drain(..).collect();
    for envelope in &queued {
        synthesize_error(lc, envelope, message);
    }
}

async fn pump_worker_events(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::BootstrapFailed(reason) => inner.fail(reason),
            WorkerEvent::Message(raw) => match Response::decode(&raw) {
                Ok(Response::Ready) => inner.mark_ready(),
                Ok(response) => inner.forward(response),
                Err(err) => tracing::warn!(
                    target = "polysolve",
                    code = ERR_PROTOCOL,
                    error = %err,
                    "protocol error: undecodable runtime message dropped"
                ),
            },
        }
    }
    inner.worker_exited();
}

fn worker_main<B: NumericBackend>(
    mut backend: B,
    requests: std_mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    runtime_id: Uuid,
) {
    let booted = {
        let _span =
            tracing::info_span!("runtime_bootstrap", runtime_id = %runtime_id).entered();
        backend.bootstrap()
    };
    if let Err(err) = booted {
        let _ = events.send(WorkerEvent::BootstrapFailed(err.to_string()));
        return;
    }
    match Response::Ready.encode() {
        Ok(raw) => {
            if events.send(WorkerEvent::Message(raw)).is_err() {
                return;
            }
        }
        Err(err) => {
            let _ = events.send(WorkerEvent::BootstrapFailed(err.to_string()));
            return;
        }
    }

    while let Ok(raw) = requests.recv() {
        let response = match Envelope::decode(&raw) {
            Ok(envelope) => match backend.execute(&envelope.request) {
                Ok(value) => Response::Result {
                    request_kind: envelope.kind(),
                    id: envelope.id,
                    value,
                },
                Err(err) => Response::Error {
                    request_kind: Some(envelope.kind()),
                    id: envelope.id,
                    message: err.to_string(),
                },
            },
            Err(err) => Response::Error {
                request_kind: None,
                id: None,
                message: err.to_string(),
            },
        };
        match response.encode() {
            Ok(raw) => {
                if events.send(WorkerEvent::Message(raw)).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(target = "polysolve", error = %err, "failed to encode runtime response")
            }
        }
    }
    tracing::debug!(target = "polysolve", %runtime_id, "runtime thread exiting");
}
