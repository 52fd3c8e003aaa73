//! Dispatcher and result router.
//!
//! `Dispatcher::dispatch` turns a UI intent into a protocol request, records it
//! with the correlator, submits it to the runtime and arms a timeout. The router
//! consumes runtime responses, resolves each to its slot and applies only the
//! ones answering the slot's latest sent request. Errors clear the slot before
//! the message is shown, so a failed preview never keeps its last good value.
//! When the runtime thread dies after `ready`, every request still waiting on
//! it is failed at once instead of waiting out its timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::compute_input::validate_request;
use crate::config::errors::{ERR_PROTOCOL, ERR_TIMEOUT};
use crate::config::timeouts::{
    DEFAULT_CALC_TIMEOUT_MS, DEFAULT_FORMAT_TIMEOUT_MS, DEFAULT_SOLVE_TIMEOUT_MS,
};
use crate::correlator::{Correlator, FormatSlot, Resolution, Slot, Ticket};
use crate::numeric::NumericBackend;
use crate::protocol::{CorrelationId, Envelope, Request, RequestKind, Response};
use crate::runtime::{DispatchError, RuntimeManager, RuntimeState, Submission};

/// Where routed results land. Implementations must not call back into the router.
pub trait SlotSink: Send + Sync + 'static {
    /// A request for `slot` has just been issued.
    fn on_pending(&self, slot: Slot, request: &Request);
    fn on_result(&self, slot: Slot, kind: RequestKind, value: &str);
    fn on_error(&self, slot: Slot, message: &str);
    /// Drop any derived display state for `slot`.
    fn clear(&self, slot: Slot);
    fn on_runtime_state(&self, _state: &RuntimeState) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub format: Duration,
    pub calculation: Duration,
    pub solve: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            format: Duration::from_millis(DEFAULT_FORMAT_TIMEOUT_MS),
            calculation: Duration::from_millis(DEFAULT_CALC_TIMEOUT_MS),
            solve: Duration::from_millis(DEFAULT_SOLVE_TIMEOUT_MS),
        }
    }
}

impl Timeouts {
    pub fn for_kind(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Format => self.format,
            RequestKind::Solve => self.solve,
            _ => self.calculation,
        }
    }
}

type GuardKey = (Slot, u64);

pub struct ResultRouter {
    correlator: Mutex<Correlator>,
    sink: Arc<dyn SlotSink>,
    guards: Mutex<HashMap<GuardKey, CancellationToken>>,
    idle: Notify,
}

impl ResultRouter {
    pub fn new(sink: Arc<dyn SlotSink>) -> Self {
        Self {
            correlator: Mutex::new(Correlator::new()),
            sink,
            guards: Mutex::new(HashMap::new()),
            idle: Notify::new(),
        }
    }

    /// Stable correlation id for a format stream.
    pub fn allocate(&self, slot: FormatSlot) -> CorrelationId {
        self.correlator.lock().allocate(slot)
    }

    pub fn outstanding(&self) -> usize {
        self.correlator.lock().outstanding()
    }

    pub fn is_busy(&self) -> bool {
        self.correlator.lock().is_busy()
    }

    pub fn latest_generation(&self, slot: Slot) -> u64 {
        self.correlator.lock().latest_generation(slot)
    }

    fn slot_for(&self, kind: RequestKind, id: Option<CorrelationId>) -> Result<Slot, DispatchError> {
        match (kind, id) {
            (RequestKind::Format, Some(id)) => self
                .correlator
                .lock()
                .slot_for(id)
                .ok_or(DispatchError::InvalidCorrelation { kind, id }),
            (RequestKind::Format, None) => Err(DispatchError::MissingCorrelation(kind)),
            (_, Some(id)) => Err(DispatchError::InvalidCorrelation { kind, id }),
            (_, None) => Ok(Slot::Calculation),
        }
    }

    /// Validate and register a request. On a validation failure the slot is
    /// cleared and shows the error, and the slot's generation still advances.
    fn open(&self, slot: Slot, request: &Request) -> Result<Ticket, DispatchError> {
        let mut corr = self.correlator.lock();
        if slot == Slot::Calculation && corr.is_busy() {
            return Err(DispatchError::Busy);
        }
        if let Err(err) = validate_request(request) {
            let generation = corr.fail_local(slot);
            tracing::debug!(
                target = "polysolve",
                slot = slot.as_str(),
                generation,
                error = %err,
                "request rejected before dispatch"
            );
            self.sink.clear(slot);
            self.sink.on_error(slot, &err.to_string());
            return Err(err.into());
        }
        let ticket = corr.begin(slot, request.kind())?;
        self.sink.on_pending(slot, request);
        Ok(ticket)
    }

    /// Undo `open` for a request the runtime refused.
    fn abandon(&self, ticket: &Ticket, err: &DispatchError) {
        self.disarm(ticket);
        {
            let mut corr = self.correlator.lock();
            corr.abandon(ticket);
            if corr.latest_generation(ticket.slot) == ticket.generation {
                self.sink.clear(ticket.slot);
                self.sink.on_error(ticket.slot, &err.to_string());
            }
        }
        self.idle.notify_waiters();
    }

    fn disarm(&self, ticket: &Ticket) {
        if let Some(token) = self.guards.lock().remove(&(ticket.slot, ticket.generation)) {
            token.cancel();
        }
    }

    /// Route one runtime response to its slot.
    pub fn handle(&self, response: Response) {
        if response == Response::Ready {
            tracing::warn!(target = "polysolve", "protocol error: ready routed as a response");
            return;
        }
        let (kind, id) = (response.request_kind(), response.id());
        {
            let mut corr = self.correlator.lock();
            match corr.resolve(id, kind) {
                Resolution::Current(ticket) => {
                    self.disarm(&ticket);
                    match &response {
                        Response::Result { value, .. } => {
                            self.sink.on_result(ticket.slot, ticket.kind, value)
                        }
                        Response::Error { message, .. } => {
                            self.sink.clear(ticket.slot);
                            self.sink.on_error(ticket.slot, message);
                        }
                        Response::Ready => {}
                    }
                }
                Resolution::Stale(ticket) => {
                    self.disarm(&ticket);
                    tracing::debug!(
                        target = "polysolve",
                        slot = ticket.slot.as_str(),
                        generation = ticket.generation,
                        latest = corr.latest_generation(ticket.slot),
                        "stale response discarded"
                    );
                }
                Resolution::Expired(ticket) => tracing::debug!(
                    target = "polysolve",
                    slot = ticket.slot.as_str(),
                    generation = ticket.generation,
                    "response for timed-out request discarded"
                ),
                Resolution::Unmatched => tracing::warn!(
                    target = "polysolve",
                    code = ERR_PROTOCOL,
                    kind = ?kind,
                    id = ?id,
                    "protocol error: response matches no pending request"
                ),
            }
        }
        self.idle.notify_waiters();
    }

    fn on_timeout(&self, ticket: Ticket, after: Duration) {
        self.guards.lock().remove(&(ticket.slot, ticket.generation));
        {
            let mut corr = self.correlator.lock();
            match corr.expire(ticket.slot, ticket.generation) {
                Some(true) => {
                    let message = format!(
                        "{ERR_TIMEOUT}: {} request timed out after {} ms",
                        ticket.kind,
                        after.as_millis()
                    );
                    tracing::warn!(
                        target = "polysolve",
                        slot = ticket.slot.as_str(),
                        generation = ticket.generation,
                        "request timed out"
                    );
                    self.sink.clear(ticket.slot);
                    self.sink.on_error(ticket.slot, &message);
                }
                Some(false) => tracing::debug!(
                    target = "polysolve",
                    slot = ticket.slot.as_str(),
                    generation = ticket.generation,
                    "superseded request timed out"
                ),
                None => {}
            }
        }
        self.idle.notify_waiters();
    }

    fn arm(&self, ticket: &Ticket) -> CancellationToken {
        let token = CancellationToken::new();
        self.guards
            .lock()
            .insert((ticket.slot, ticket.generation), token.clone());
        token
    }

    /// Fail every request still waiting on the runtime.
    fn abort_outstanding(&self, message: &str) {
        let tokens: Vec<CancellationToken> =
            self.guards.lock().drain().map(|(_, token)| token).collect();
        for token in tokens {
            token.cancel();
        }
        {
            let mut corr = self.correlator.lock();
            for (ticket, is_latest) in corr.drain_in_flight() {
                if is_latest {
                    self.sink.clear(ticket.slot);
                    self.sink.on_error(ticket.slot, message);
                }
            }
        }
        self.idle.notify_waiters();
    }

    /// Wait until no request is outstanding.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn spawn_timeout(
    router: Arc<ResultRouter>,
    runtime: RuntimeManager,
    ticket: Ticket,
    token: CancellationToken,
    submission: Submission,
    after: Duration,
) {
    tokio::spawn(async move {
        if submission == Submission::Queued {
            // The clock starts once the runtime can actually run the request.
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = runtime.settled() => {}
            }
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(after) => router.on_timeout(ticket, after),
        }
    });
}

/// Host-side entry point for every computation.
#[derive(Clone)]
pub struct Dispatcher {
    runtime: RuntimeManager,
    router: Arc<ResultRouter>,
    timeouts: Timeouts,
}

impl Dispatcher {
    pub fn new(runtime: RuntimeManager, sink: Arc<dyn SlotSink>, timeouts: Timeouts) -> Self {
        Self {
            runtime,
            router: Arc::new(ResultRouter::new(sink)),
            timeouts,
        }
    }

    pub fn runtime(&self) -> &RuntimeManager {
        &self.runtime
    }

    pub fn router(&self) -> &Arc<ResultRouter> {
        &self.router
    }

    /// Start the runtime and the tasks that route its responses and state.
    pub fn start<B: NumericBackend>(&self, backend: B) -> Result<(), DispatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.start(backend, tx)?;
        spawn_router_loop(Arc::clone(&self.router), self.runtime.clone(), rx);
        spawn_state_watch(self.runtime.subscribe(), Arc::clone(&self.router.sink));
        Ok(())
    }

    /// Issue `request` for its slot. Fire-and-forget: the outcome reaches the sink.
    ///
    /// `correlation_id` is required for `format` and rejected for everything else.
    pub fn dispatch(
        &self,
        request: Request,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Ticket, DispatchError> {
        let kind = request.kind();
        let span = tracing::info_span!(
            "dispatch",
            kind = %kind,
            slot = tracing::field::Empty,
            generation = tracing::field::Empty
        );
        let _entered = span.enter();

        if let Some(err) = self.runtime.unavailable() {
            return Err(err);
        }

        let slot = self.router.slot_for(kind, correlation_id)?;
        span.record("slot", slot.as_str());

        let ticket = self.router.open(slot, &request)?;
        span.record("generation", ticket.generation);

        let token = self.router.arm(&ticket);
        let submission = match self.runtime.submit(Envelope::new(request, correlation_id)) {
            Ok(submission) => submission,
            Err(err) => {
                self.router.abandon(&ticket, &err);
                return Err(err);
            }
        };
        tracing::debug!(target = "polysolve", ?submission, "request dispatched");

        spawn_timeout(
            Arc::clone(&self.router),
            self.runtime.clone(),
            ticket,
            token,
            submission,
            self.timeouts.for_kind(kind),
        );
        Ok(ticket)
    }

    /// Wait until every dispatched request has resolved, failed or timed out.
    pub async fn drain(&self) {
        self.router.drain().await;
    }

    /// Terminate the runtime and fail whatever it was still working on.
    pub fn shutdown(&self) {
        let previous = self.runtime.shutdown();
        // Queued requests were answered by the runtime itself; sent ones never will be.
        if previous == RuntimeState::Ready {
            self.router
                .abort_outstanding(&DispatchError::Terminated.to_string());
        }
    }
}

fn spawn_router_loop(
    router: Arc<ResultRouter>,
    runtime: RuntimeManager,
    mut responses: mpsc::UnboundedReceiver<Response>,
) {
    let mut states = runtime.subscribe();
    tokio::spawn(async move {
        let mut watching = true;
        loop {
            tokio::select! {
                // Responses the thread managed to send are routed before its death.
                biased;
                response = responses.recv() => match response {
                    Some(response) => router.handle(response),
                    None => break,
                },
                changed = states.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let state = states.borrow_and_update().clone();
                    if !matches!(state, RuntimeState::Error(_) | RuntimeState::Terminated) {
                        continue;
                    }
                    watching = false;
                    if let Some(err @ DispatchError::RuntimeLost(_)) = runtime.unavailable() {
                        router.abort_outstanding(&err.to_string());
                    }
                }
            }
        }
        tracing::debug!(target = "polysolve", "response channel closed");
    });
}

fn spawn_state_watch(mut rx: watch::Receiver<RuntimeState>, sink: Arc<dyn SlotSink>) {
    tokio::spawn(async move {
        loop {
            let state = rx.borrow_and_update().clone();
            sink.on_runtime_state(&state);
            if state == RuntimeState::Terminated {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });
}
