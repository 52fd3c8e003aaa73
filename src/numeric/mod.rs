//! The numeric runtime that lives on the dedicated runtime thread.
//!
//! The host never calls into a backend directly; `runtime` owns it and feeds it
//! decoded requests one at a time, strictly FIFO.

pub mod polynomial;
pub mod solver;

use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

use crate::compute_input::InputError;
use crate::config::errors::ERR_ENGINE;
use crate::protocol::Request;

pub use polynomial::Polynomial;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("runtime bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("{code}: {0}", code = ERR_ENGINE)]
    Computation(String),
}

/// Contract between the runtime thread and whatever performs the computation.
///
/// `bootstrap` runs exactly once, before any `execute`. A bootstrap error is
/// terminal for the runtime instance.
pub trait NumericBackend: Send + 'static {
    fn bootstrap(&mut self) -> Result<(), EngineError>;
    fn execute(&mut self, request: &Request) -> Result<String, EngineError>;
}

/// Built-in backend: polynomial algebra plus the GA root finder.
pub struct PolynomialBackend {
    warmup: Duration,
    rng: StdRng,
}

impl PolynomialBackend {
    pub fn new(warmup: Duration) -> Self {
        Self {
            warmup,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic solver output, for tests and reproducible harness runs.
    pub fn with_seed(warmup: Duration, seed: u64) -> Self {
        Self {
            warmup,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for PolynomialBackend {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl NumericBackend for PolynomialBackend {
    fn bootstrap(&mut self) -> Result<(), EngineError> {
        if !self.warmup.is_zero() {
            tracing::debug!(
                target = "polysolve",
                warmup_ms = self.warmup.as_millis() as u64,
                "simulating numeric runtime warm-up"
            );
            std::thread::sleep(self.warmup);
        }
        Ok(())
    }

    fn execute(&mut self, request: &Request) -> Result<String, EngineError> {
        let rendered = match request {
            Request::Format { coeffs } => Polynomial::parse(coeffs)?.to_string(),
            Request::Evaluate { coeffs, x_val } => {
                Polynomial::parse(coeffs)?.eval(*x_val).to_string()
            }
            Request::Derivative { coeffs } => Polynomial::parse(coeffs)?.derivative().to_string(),
            Request::NthDerivative { coeffs, n } => {
                Polynomial::parse(coeffs)?.nth_derivative(*n).to_string()
            }
            Request::Add { coeffs1, coeffs2 } => Polynomial::parse(coeffs1)?
                .add(&Polynomial::parse(coeffs2)?)
                .to_string(),
            Request::Multiply { coeffs1, coeffs2 } => Polynomial::parse(coeffs1)?
                .mul(&Polynomial::parse(coeffs2)?)
                .to_string(),
            Request::Solve { coeffs, options } => {
                options.validate()?;
                let poly = Polynomial::parse(coeffs)?;
                let roots = solver::solve(&poly, options, &mut self.rng)?;
                solver::render_roots(&roots)
            }
        };
        Ok(rendered)
    }
}
