use std::fmt;

use crate::compute_input::{parse_coefficients, InputError};

/// Dense polynomial, coefficients stored highest degree first.
///
/// INVARIANT: no leading zero coefficients; the zero polynomial is the empty vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        let first = coeffs
            .iter()
            .position(|c| *c != 0.0)
            .unwrap_or(coeffs.len());
        Self {
            coeffs: coeffs[first..].to_vec(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InputError> {
        parse_coefficients(raw).map(Self::new)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().fold(0.0, |acc, c| acc * x + c)
    }

    pub fn derivative(&self) -> Self {
        let Some(degree) = self.degree() else {
            return self.clone();
        };
        let coeffs = self
            .coeffs
            .iter()
            .take(degree)
            .enumerate()
            .map(|(idx, c)| c * (degree - idx) as f64)
            .collect();
        Self::new(coeffs)
    }

    pub fn nth_derivative(&self, n: u32) -> Self {
        let mut current = self.clone();
        for _ in 0..n {
            if current.is_zero() {
                break;
            }
            current = current.derivative();
        }
        current
    }

    pub fn add(&self, other: &Self) -> Self {
        let len = self.coeffs.len().max(other.coeffs.len());
        let mut sum = vec![0.0; len];
        for (slot, c) in sum.iter_mut().rev().zip(self.coeffs.iter().rev()) {
            *slot += c;
        }
        for (slot, c) in sum.iter_mut().rev().zip(other.coeffs.iter().rev()) {
            *slot += c;
        }
        Self::new(sum)
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::new(Vec::new());
        }
        let mut product = vec![0.0; self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                product[i + j] += a * b;
            }
        }
        Self::new(product)
    }
}

impl fmt::Display for Polynomial {
    /// Deterministic rendering: `2x^2 - 3x - 5`, `1x^2 + 5x - 3`, `0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(degree) = self.degree() else {
            return f.write_str("0");
        };
        let mut first = true;
        for (idx, c) in self.coeffs.iter().enumerate() {
            if *c == 0.0 {
                continue;
            }
            let power = degree - idx;
            let magnitude = c.abs();
            match (first, *c < 0.0) {
                (true, true) => f.write_str("-")?,
                (true, false) => {}
                (false, true) => f.write_str(" - ")?,
                (false, false) => f.write_str(" + ")?,
            }
            match power {
                0 => write!(f, "{magnitude}")?,
                1 => write!(f, "{magnitude}x")?,
                _ => write!(f, "{magnitude}x^{power}")?,
            }
            first = false;
        }
        Ok(())
    }
}
