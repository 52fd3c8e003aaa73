//! Page-view wiring: what the playground does on mount, on edit, on click, on unmount.

use std::sync::Arc;

use crate::core::HostConfig;
use crate::correlator::{FormatSlot, Ticket};
use crate::debounce::Debouncer;
use crate::numeric::NumericBackend;
use crate::protocol::Request;
use crate::router::{Dispatcher, SlotSink};
use crate::runtime::{DispatchError, RuntimeManager};

/// Coefficients shown in the two preview fields when the page opens.
pub const DEFAULT_COEFFICIENTS: [&str; 2] = ["2, -3, -5", "1, 1"];

pub struct PlaygroundHost {
    dispatcher: Dispatcher,
    debouncer: Debouncer<FormatSlot>,
    config: HostConfig,
}

impl PlaygroundHost {
    /// Start a runtime for this view and format the default previews.
    ///
    /// The previews are queued until the runtime is ready.
    pub fn mount<B: NumericBackend>(
        backend: B,
        sink: Arc<dyn SlotSink>,
        config: HostConfig,
    ) -> Result<Self, DispatchError> {
        let dispatcher = Dispatcher::new(RuntimeManager::new(), sink, config.timeouts);
        dispatcher.start(backend)?;
        let host = Self {
            dispatcher,
            debouncer: Debouncer::new(),
            config,
        };
        for slot in FormatSlot::ALL {
            let coeffs = DEFAULT_COEFFICIENTS[slot.index()].to_string();
            host.format_now(slot, coeffs)?;
        }
        Ok(host)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Dispatch a format request for `slot` immediately, bypassing the debounce.
    pub fn format_now(&self, slot: FormatSlot, coeffs: String) -> Result<Ticket, DispatchError> {
        let id = self.dispatcher.router().allocate(slot);
        self.dispatcher.dispatch(Request::Format { coeffs }, Some(id))
    }

    /// Record an edit to a coefficient field. Only the last value of a burst is formatted.
    pub fn edit_coefficients(&self, slot: FormatSlot, value: impl Into<String>) {
        let dispatcher = self.dispatcher.clone();
        let id = dispatcher.router().allocate(slot);
        self.debouncer
            .schedule(slot, value.into(), self.config.debounce, move |coeffs| {
                if let Err(err) = dispatcher.dispatch(Request::Format { coeffs }, Some(id)) {
                    tracing::debug!(
                        target = "polysolve",
                        slot = ?slot,
                        error = %err,
                        "debounced format not dispatched"
                    );
                }
            });
    }

    /// Issue a calculation for the output panel. Fails with `Busy` while one is in flight.
    pub fn run_calculation(&self, request: Request) -> Result<Ticket, DispatchError> {
        self.dispatcher.dispatch(request, None)
    }

    pub async fn drain(&self) {
        self.dispatcher.drain().await;
    }

    /// Cancel pending edits and terminate the runtime. Idempotent.
    pub fn unmount(&self) {
        self.debouncer.cancel_all();
        self.dispatcher.shutdown();
    }
}

impl Drop for PlaygroundHost {
    fn drop(&mut self) {
        self.unmount();
    }
}
