//! Playground display model: two formatted previews, one output panel.
//!
//! `DisplayState` is the `SlotSink` the router writes to. Every change publishes a
//! fresh `DisplaySnapshot` on a watch channel, which is what a view renders from.

use serde::Serialize;
use tokio::sync::watch;

use crate::config::limits::FORMAT_SLOT_COUNT;
use crate::correlator::Slot;
use crate::protocol::{Request, RequestKind};
use crate::router::SlotSink;
use crate::runtime::RuntimeState;

pub const INITIAL_OUTPUT: &str = "Result will be displayed here.";
pub const CALCULATING: &str = "Calculating...";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    /// Formatted previews; empty when the last input was invalid.
    pub formatted: [String; FORMAT_SLOT_COUNT],
    pub format_errors: [Option<String>; FORMAT_SLOT_COUNT],
    pub output: String,
    pub is_calculating: bool,
    pub runtime: RuntimeState,
    /// `n` of the nth-derivative request in flight, for its label.
    #[serde(skip)]
    pending_order: Option<u32>,
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        Self {
            formatted: Default::default(),
            format_errors: Default::default(),
            output: INITIAL_OUTPUT.to_string(),
            is_calculating: false,
            runtime: RuntimeState::Idle,
            pending_order: None,
        }
    }
}

impl DisplaySnapshot {
    /// Buttons are usable only with a ready runtime and no calculation in flight.
    pub fn controls_enabled(&self) -> bool {
        self.runtime.is_ready() && !self.is_calculating
    }
}

/// Output-panel prefix for a calculation result.
pub fn result_label(kind: RequestKind, order: Option<u32>) -> String {
    match kind {
        RequestKind::Solve => "Approximate Roots:".into(),
        RequestKind::Evaluate => "Result (y-value):".into(),
        RequestKind::Derivative => "Derivative:".into(),
        RequestKind::NthDerivative => format!("{}th Derivative:", order.unwrap_or_default()),
        RequestKind::Add => "Summed Function:".into(),
        RequestKind::Multiply => "Product Function:".into(),
        RequestKind::Format => "Result:".into(),
    }
}

pub struct DisplayState {
    tx: watch::Sender<DisplaySnapshot>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DisplaySnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.tx.borrow().clone()
    }

    /// Resolve with the first snapshot satisfying `pred` (possibly the current one).
    pub async fn wait_until<F>(&self, mut pred: F) -> DisplaySnapshot
    where
        F: FnMut(&DisplaySnapshot) -> bool,
    {
        let mut rx = self.tx.subscribe();
        let found = match rx.wait_for(|s| pred(s)).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        found
    }
}

impl SlotSink for DisplayState {
    fn on_pending(&self, slot: Slot, request: &Request) {
        if slot != Slot::Calculation {
            return;
        }
        let order = match request {
            Request::NthDerivative { n, .. } => Some(*n),
            _ => None,
        };
        self.tx.send_modify(|s| {
            s.is_calculating = true;
            s.output = CALCULATING.to_string();
            s.pending_order = order;
        });
    }

    fn on_result(&self, slot: Slot, kind: RequestKind, value: &str) {
        self.tx.send_modify(|s| match slot {
            Slot::Format(f) => {
                s.formatted[f.index()] = value.to_string();
                s.format_errors[f.index()] = None;
            }
            Slot::Calculation => {
                s.output = format!("{} {value}", result_label(kind, s.pending_order));
                s.is_calculating = false;
            }
        });
    }

    fn on_error(&self, slot: Slot, message: &str) {
        self.tx.send_modify(|s| match slot {
            Slot::Format(f) => s.format_errors[f.index()] = Some(message.to_string()),
            Slot::Calculation => {
                s.output = format!("Error: {message}");
                s.is_calculating = false;
            }
        });
    }

    fn clear(&self, slot: Slot) {
        self.tx.send_modify(|s| match slot {
            Slot::Format(f) => {
                s.formatted[f.index()].clear();
                s.format_errors[f.index()] = None;
            }
            Slot::Calculation => {
                s.output.clear();
                s.is_calculating = false;
                s.pending_order = None;
            }
        });
    }

    fn on_runtime_state(&self, state: &RuntimeState) {
        self.tx.send_modify(|s| s.runtime = state.clone());
    }
}
