use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::emit_or_log;
use crate::correlator::Slot;
use crate::protocol::{Request, RequestKind};
use crate::router::SlotSink;
use crate::runtime::RuntimeState;

// Event names shared by every surface that observes the dispatcher.
pub const EVENT_RUNTIME_STATE: &str = "runtime-state";
pub const EVENT_SLOT_PENDING: &str = "slot-pending";
pub const EVENT_SLOT_RESULT: &str = "slot-result";
pub const EVENT_SLOT_ERROR: &str = "slot-error";
pub const EVENT_SLOT_CLEARED: &str = "slot-cleared";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotEvent<'a> {
    slot: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a str>,
}

/// `SlotSink` that writes every routed event as a JSON line.
pub struct EventSink<W: Write + Send + 'static> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> EventSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, event: &str, slot: Slot, kind: Option<RequestKind>, payload: Option<&str>) {
        let data = SlotEvent {
            slot: slot.as_str(),
            request_type: kind.map(RequestKind::as_str),
            payload,
        };
        emit_or_log(&mut *self.out.lock(), event, data);
    }
}

impl<W: Write + Send + 'static> SlotSink for EventSink<W> {
    fn on_pending(&self, slot: Slot, request: &Request) {
        self.emit(EVENT_SLOT_PENDING, slot, Some(request.kind()), None);
    }

    fn on_result(&self, slot: Slot, kind: RequestKind, value: &str) {
        self.emit(EVENT_SLOT_RESULT, slot, Some(kind), Some(value));
    }

    fn on_error(&self, slot: Slot, message: &str) {
        self.emit(EVENT_SLOT_ERROR, slot, None, Some(message));
    }

    fn clear(&self, slot: Slot) {
        self.emit(EVENT_SLOT_CLEARED, slot, None, None);
    }

    fn on_runtime_state(&self, state: &RuntimeState) {
        emit_or_log(&mut *self.out.lock(), EVENT_RUNTIME_STATE, state);
    }
}
