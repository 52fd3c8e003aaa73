//! Message protocol between the host and the numeric runtime thread.
//!
//! Requests travel as `{ "type", "payload", "id"? }` and responses as
//! `{ "type", "requestType"?, "id"?, "payload"? }`. Both directions are JSON text,
//! so the runtime is reachable only through messages and every message is
//! validated at this boundary before anything else looks at it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ga_options::GaOptions;

/// Identifier tying a request to a persistent UI slot.
pub type CorrelationId = u32;

/// Closed set of computations the runtime understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Format,
    Evaluate,
    Derivative,
    NthDerivative,
    Add,
    Multiply,
    Solve,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Format => "format",
            RequestKind::Evaluate => "evaluate",
            RequestKind::Derivative => "derivative",
            RequestKind::NthDerivative => "nth_derivative",
            RequestKind::Add => "add",
            RequestKind::Multiply => "multiply",
            RequestKind::Solve => "solve",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "format" => Ok(RequestKind::Format),
            "evaluate" => Ok(RequestKind::Evaluate),
            "derivative" => Ok(RequestKind::Derivative),
            "nth_derivative" => Ok(RequestKind::NthDerivative),
            "add" => Ok(RequestKind::Add),
            "multiply" => Ok(RequestKind::Multiply),
            "solve" => Ok(RequestKind::Solve),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Typed request. The payload shape is fixed by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Format { coeffs: String },
    Evaluate { coeffs: String, x_val: f64 },
    Derivative { coeffs: String },
    NthDerivative { coeffs: String, n: u32 },
    Add { coeffs1: String, coeffs2: String },
    Multiply { coeffs1: String, coeffs2: String },
    Solve { coeffs: String, options: GaOptions },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Format { .. } => RequestKind::Format,
            Request::Evaluate { .. } => RequestKind::Evaluate,
            Request::Derivative { .. } => RequestKind::Derivative,
            Request::NthDerivative { .. } => RequestKind::NthDerivative,
            Request::Add { .. } => RequestKind::Add,
            Request::Multiply { .. } => RequestKind::Multiply,
            Request::Solve { .. } => RequestKind::Solve,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized message type '{0}'")]
    UnknownType(String),
    #[error("malformed {kind} message: {reason}")]
    Payload { kind: String, reason: String },
}

impl ProtocolError {
    fn payload(kind: impl Into<String>, reason: impl fmt::Display) -> Self {
        ProtocolError::Payload {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<CorrelationId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoeffsPayload {
    coeffs: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluatePayload {
    coeffs: String,
    x_val: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct NthDerivativePayload {
    coeffs: String,
    n: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PairPayload {
    coeffs1: String,
    coeffs2: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SolvePayload {
    coeffs: String,
    options: GaOptions,
}

/// A request plus its optional correlation id, as it crosses the thread boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub request: Request,
    pub id: Option<CorrelationId>,
}

impl Envelope {
    pub fn new(request: Request, id: Option<CorrelationId>) -> Self {
        Self { request, id }
    }

    pub fn kind(&self) -> RequestKind {
        self.request.kind()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let payload = match &self.request {
            Request::Format { coeffs } => Value::String(coeffs.clone()),
            Request::Evaluate { coeffs, x_val } => serde_json::to_value(EvaluatePayload {
                coeffs: coeffs.clone(),
                x_val: *x_val,
            })?,
            Request::Derivative { coeffs } => serde_json::to_value(CoeffsPayload {
                coeffs: coeffs.clone(),
            })?,
            Request::NthDerivative { coeffs, n } => serde_json::to_value(NthDerivativePayload {
                coeffs: coeffs.clone(),
                n: *n,
            })?,
            Request::Add { coeffs1, coeffs2 } | Request::Multiply { coeffs1, coeffs2 } => {
                serde_json::to_value(PairPayload {
                    coeffs1: coeffs1.clone(),
                    coeffs2: coeffs2.clone(),
                })?
            }
            Request::Solve { coeffs, options } => serde_json::to_value(SolvePayload {
                coeffs: coeffs.clone(),
                options: options.clone(),
            })?,
        };
        let wire = WireRequest {
            kind: self.kind().as_str().to_string(),
            payload,
            id: self.id,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let wire: WireRequest = serde_json::from_str(raw)?;
        let kind: RequestKind = wire.kind.parse()?;
        let payload = wire.payload;
        let request = match kind {
            RequestKind::Format => match payload {
                Value::String(coeffs) => Request::Format { coeffs },
                other => {
                    return Err(ProtocolError::payload(
                        kind.as_str(),
                        format!("expected a coefficient string, found {other}"),
                    ))
                }
            },
            RequestKind::Evaluate => {
                let p: EvaluatePayload = typed_payload(kind, payload)?;
                Request::Evaluate {
                    coeffs: p.coeffs,
                    x_val: p.x_val,
                }
            }
            RequestKind::Derivative => {
                let p: CoeffsPayload = typed_payload(kind, payload)?;
                Request::Derivative { coeffs: p.coeffs }
            }
            RequestKind::NthDerivative => {
                let p: NthDerivativePayload = typed_payload(kind, payload)?;
                Request::NthDerivative {
                    coeffs: p.coeffs,
                    n: p.n,
                }
            }
            RequestKind::Add => {
                let p: PairPayload = typed_payload(kind, payload)?;
                Request::Add {
                    coeffs1: p.coeffs1,
                    coeffs2: p.coeffs2,
                }
            }
            RequestKind::Multiply => {
                let p: PairPayload = typed_payload(kind, payload)?;
                Request::Multiply {
                    coeffs1: p.coeffs1,
                    coeffs2: p.coeffs2,
                }
            }
            RequestKind::Solve => {
                let p: SolvePayload = typed_payload(kind, payload)?;
                Request::Solve {
                    coeffs: p.coeffs,
                    options: p.options,
                }
            }
        };
        Ok(Self {
            request,
            id: wire.id,
        })
    }
}

fn typed_payload<T: for<'de> Deserialize<'de>>(
    kind: RequestKind,
    payload: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|err| ProtocolError::payload(kind.as_str(), err))
}

/// Typed runtime-to-host message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Emitted exactly once, after a successful bootstrap.
    Ready,
    Result {
        request_kind: RequestKind,
        id: Option<CorrelationId>,
        value: String,
    },
    Error {
        request_kind: Option<RequestKind>,
        id: Option<CorrelationId>,
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

impl Response {
    pub fn id(&self) -> Option<CorrelationId> {
        match self {
            Response::Ready => None,
            Response::Result { id, .. } | Response::Error { id, .. } => *id,
        }
    }

    pub fn request_kind(&self) -> Option<RequestKind> {
        match self {
            Response::Ready => None,
            Response::Result { request_kind, .. } => Some(*request_kind),
            Response::Error { request_kind, .. } => *request_kind,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let wire = match self {
            Response::Ready => WireResponse {
                kind: "ready".into(),
                request_type: None,
                id: None,
                payload: None,
            },
            Response::Result {
                request_kind,
                id,
                value,
            } => WireResponse {
                kind: "result".into(),
                request_type: Some(request_kind.as_str().into()),
                id: *id,
                payload: Some(value.clone()),
            },
            Response::Error {
                request_kind,
                id,
                message,
            } => WireResponse {
                kind: "error".into(),
                request_type: request_kind.map(|k| k.as_str().to_string()),
                id: *id,
                payload: Some(message.clone()),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let wire: WireResponse = serde_json::from_str(raw)?;
        match wire.kind.as_str() {
            "ready" => Ok(Response::Ready),
            "result" => {
                let request_kind = wire
                    .request_type
                    .as_deref()
                    .ok_or_else(|| ProtocolError::payload("result", "missing requestType"))?
                    .parse()?;
                let value = wire
                    .payload
                    .ok_or_else(|| ProtocolError::payload("result", "missing payload"))?;
                Ok(Response::Result {
                    request_kind,
                    id: wire.id,
                    value,
                })
            }
            "error" => {
                let request_kind = wire
                    .request_type
                    .as_deref()
                    .map(str::parse::<RequestKind>)
                    .transpose()?;
                let message = wire
                    .payload
                    .ok_or_else(|| ProtocolError::payload("error", "missing payload"))?;
                Ok(Response::Error {
                    request_kind,
                    id: wire.id,
                    message,
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}
