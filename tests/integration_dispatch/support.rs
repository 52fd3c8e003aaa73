use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;
use polysolve_host::{
    DisplayState, Dispatcher, EngineError, NumericBackend, PolynomialBackend, Request,
    RequestKind, RuntimeManager, RuntimeState, Slot, SlotSink, Timeouts,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Fail the test instead of hanging when a future never resolves.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("future resolved within the test deadline")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Pending(Slot, RequestKind),
    Result(Slot, String),
    Error(Slot, String),
    Cleared(Slot),
}

/// Sink that keeps a log of every routed event and mirrors it into a `DisplayState`.
#[derive(Default)]
pub struct Recorder {
    log: Mutex<Vec<Routed>>,
    states: Mutex<Vec<RuntimeState>>,
    pub display: DisplayState,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<Routed> {
        self.log.lock().clone()
    }

    pub fn states(&self) -> Vec<RuntimeState> {
        self.states.lock().clone()
    }

    pub fn results(&self, slot: Slot) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Routed::Result(s, v) if s == slot => Some(v),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, slot: Slot) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Routed::Error(s, m) if s == slot => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn pending_count(&self, slot: Slot) -> usize {
        self.log()
            .iter()
            .filter(|e| matches!(e, Routed::Pending(s, _) if *s == slot))
            .count()
    }

    /// Every event that touched `slot`.
    pub fn touching(&self, slot: Slot) -> Vec<Routed> {
        self.log()
            .into_iter()
            .filter(|e| match e {
                Routed::Pending(s, _)
                | Routed::Result(s, _)
                | Routed::Error(s, _)
                | Routed::Cleared(s) => *s == slot,
            })
            .collect()
    }
}

impl SlotSink for Recorder {
    fn on_pending(&self, slot: Slot, request: &Request) {
        self.log.lock().push(Routed::Pending(slot, request.kind()));
        self.display.on_pending(slot, request);
    }

    fn on_result(&self, slot: Slot, kind: RequestKind, value: &str) {
        self.log.lock().push(Routed::Result(slot, value.to_string()));
        self.display.on_result(slot, kind, value);
    }

    fn on_error(&self, slot: Slot, message: &str) {
        self.log.lock().push(Routed::Error(slot, message.to_string()));
        self.display.on_error(slot, message);
    }

    fn clear(&self, slot: Slot) {
        self.log.lock().push(Routed::Cleared(slot));
        self.display.clear(slot);
    }

    fn on_runtime_state(&self, state: &RuntimeState) {
        self.states.lock().push(state.clone());
        self.display.on_runtime_state(state);
    }
}

/// Counters shared between a test and the backend living on the runtime thread.
#[derive(Default)]
pub struct Calls {
    pub bootstraps: AtomicUsize,
    pub executes: AtomicUsize,
    pub kinds: Mutex<Vec<RequestKind>>,
}

impl Calls {
    pub fn bootstraps(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<RequestKind> {
        self.kinds.lock().clone()
    }
}

/// Backend with scripted bootstrap behaviour and optional stalls, delegating the
/// arithmetic to the built-in backend.
pub struct ScriptedBackend {
    inner: PolynomialBackend,
    boot_delay: Duration,
    boot_failure: Option<String>,
    stall_on: Option<(RequestKind, std_mpsc::Receiver<()>)>,
    calls: Arc<Calls>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let backend = Self {
            inner: PolynomialBackend::with_seed(Duration::ZERO, 7),
            boot_delay: Duration::ZERO,
            boot_failure: None,
            stall_on: None,
            calls: Arc::clone(&calls),
        };
        (backend, calls)
    }

    pub fn slow_boot(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn failing_boot(mut self, reason: &str) -> Self {
        self.boot_failure = Some(reason.to_string());
        self
    }

    /// Block every `kind` request until the returned sender is signalled or dropped.
    pub fn stall_on(mut self, kind: RequestKind) -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        self.stall_on = Some((kind, rx));
        (self, tx)
    }
}

impl NumericBackend for ScriptedBackend {
    fn bootstrap(&mut self) -> Result<(), EngineError> {
        self.calls.bootstraps.fetch_add(1, Ordering::SeqCst);
        if !self.boot_delay.is_zero() {
            std::thread::sleep(self.boot_delay);
        }
        match &self.boot_failure {
            Some(reason) => Err(EngineError::Bootstrap(reason.clone())),
            None => Ok(()),
        }
    }

    fn execute(&mut self, request: &Request) -> Result<String, EngineError> {
        self.calls.executes.fetch_add(1, Ordering::SeqCst);
        self.calls.kinds.lock().push(request.kind());
        if let Some((kind, gate)) = &self.stall_on {
            if *kind == request.kind() {
                let _ = gate.recv();
            }
        }
        self.inner.execute(request)
    }
}

pub fn dispatcher(sink: Arc<Recorder>) -> Dispatcher {
    dispatcher_with(sink, Timeouts::default())
}

pub fn dispatcher_with(sink: Arc<Recorder>, timeouts: Timeouts) -> Dispatcher {
    Dispatcher::new(RuntimeManager::new(), sink, timeouts)
}
