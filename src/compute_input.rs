//! Host-side input validation, run before a request is handed to the runtime.
//!
//! The runtime repeats the same coefficient parsing, so a request that slips past
//! the host still comes back as an `error` response instead of a panic.

use thiserror::Error;

use crate::config::errors::{
    DETAIL_COEFFS_DEGREE, DETAIL_COEFFS_EMPTY, DETAIL_COEFFS_NUMERIC, DETAIL_ORDER, DETAIL_X_VALUE,
};
use crate::config::limits::{MAX_DEGREE, MAX_DERIVATIVE_ORDER};
use crate::protocol::Request;

pub const EMPTY_COEFFICIENTS: &str = "Coefficients cannot be empty.";

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct InputError {
    pub code: &'static str,
    pub message: String,
}

impl InputError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Parse a comma-separated coefficient list, highest degree first.
///
/// INVARIANT: the returned vector is non-empty and every entry is finite.
pub fn parse_coefficients(raw: &str) -> Result<Vec<f64>, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::new(DETAIL_COEFFS_EMPTY, EMPTY_COEFFICIENTS));
    }
    let mut coeffs = Vec::new();
    for (idx, token) in trimmed.split(',').enumerate() {
        let token = token.trim();
        let value = token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                InputError::new(
                    DETAIL_COEFFS_NUMERIC,
                    format!("coefficient {} ('{token}') is not a finite number", idx + 1),
                )
            })?;
        coeffs.push(value);
    }
    if coeffs.len() - 1 > MAX_DEGREE {
        return Err(InputError::new(
            DETAIL_COEFFS_DEGREE,
            format!(
                "polynomial degree {} exceeds the maximum of {MAX_DEGREE}",
                coeffs.len() - 1
            ),
        ));
    }
    Ok(coeffs)
}

/// Check every field of a request the way the runtime will read it.
pub fn validate_request(request: &Request) -> Result<(), InputError> {
    match request {
        Request::Format { coeffs } | Request::Derivative { coeffs } => {
            parse_coefficients(coeffs)?;
        }
        Request::Evaluate { coeffs, x_val } => {
            parse_coefficients(coeffs)?;
            if !x_val.is_finite() {
                return Err(InputError::new(
                    DETAIL_X_VALUE,
                    "x value must be a finite number",
                ));
            }
        }
        Request::NthDerivative { coeffs, n } => {
            parse_coefficients(coeffs)?;
            if *n > MAX_DERIVATIVE_ORDER {
                return Err(InputError::new(
                    DETAIL_ORDER,
                    format!("derivative order {n} exceeds the maximum of {MAX_DERIVATIVE_ORDER}"),
                ));
            }
        }
        Request::Add { coeffs1, coeffs2 } | Request::Multiply { coeffs1, coeffs2 } => {
            parse_coefficients(coeffs1)?;
            parse_coefficients(coeffs2)?;
        }
        Request::Solve { coeffs, options } => {
            parse_coefficients(coeffs)?;
            options.validate()?;
        }
    }
    Ok(())
}
