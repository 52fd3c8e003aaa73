pub mod config;
pub mod protocol;

pub use protocol::{CorrelationId, Envelope, ProtocolError, Request, RequestKind, Response};

pub mod compute_input;
pub mod ga_options;
pub mod numeric;

pub use compute_input::{parse_coefficients, validate_request, InputError};
pub use ga_options::GaOptions;
pub use numeric::{EngineError, NumericBackend, Polynomial, PolynomialBackend};

pub mod correlator;
pub mod debounce;
pub mod router;
pub mod runtime;

pub use correlator::{Correlator, FormatSlot, Resolution, Slot, Ticket};
pub use debounce::Debouncer;
pub use router::{Dispatcher, ResultRouter, SlotSink, Timeouts};
pub use runtime::{DispatchError, RuntimeManager, RuntimeState, Submission};

pub mod core;
pub mod display;
pub mod events;
pub mod host;

pub use core::{emit_or_log, init_tracing_subsystem, HostConfig, APP_NAME};
pub use display::{DisplaySnapshot, DisplayState};
pub use events::EventSink;
pub use host::{PlaygroundHost, DEFAULT_COEFFICIENTS};
