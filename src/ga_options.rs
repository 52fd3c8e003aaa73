//! Genetic-algorithm tuning record passed through to the numeric runtime.
//!
//! The UI edits these values as free-form strings. [`GaOptions::from_raw`] is lenient
//! (anything missing, non-numeric or non-finite falls back to its default) and
//! [`GaOptions::validate`] is strict, so only a coherent record is ever dispatched.

use serde::{Deserialize, Serialize};

use crate::compute_input::InputError;
use crate::config::errors::DETAIL_GA_OPTIONS;
use crate::config::limits::{
    MAX_BLEND_ALPHA, MAX_DATA_SIZE, MAX_GENERATIONS, MAX_MUTATION_STRENGTH, MAX_ROOT_PRECISION,
    MAX_SAMPLE_SIZE,
};

pub const DEFAULT_MIN_RANGE: f64 = -100.0;
pub const DEFAULT_MAX_RANGE: f64 = 100.0;
pub const DEFAULT_NUM_OF_GENERATIONS: u32 = 10;
pub const DEFAULT_DATA_SIZE: u32 = 10_000;
pub const DEFAULT_SAMPLE_SIZE: u32 = 1_000;
pub const DEFAULT_MUTATION_STRENGTH: f64 = 0.01;
pub const DEFAULT_ELITE_RATIO: f64 = 0.05;
pub const DEFAULT_CROSSOVER_RATIO: f64 = 0.45;
pub const DEFAULT_MUTATION_RATIO: f64 = 0.40;
pub const DEFAULT_SELECTION_PERCENTILE: f64 = 0.66;
pub const DEFAULT_BLEND_ALPHA: f64 = 0.5;
pub const DEFAULT_ROOT_PRECISION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaOptions {
    /// Lower bound of the initial random population.
    pub min_range: f64,
    /// Upper bound of the initial random population.
    pub max_range: f64,
    pub num_of_generations: u32,
    /// Population size per generation.
    pub data_size: u32,
    /// Number of best candidates considered when extracting roots.
    pub sample_size: u32,
    /// Relative amount by which a mutated candidate moves (0.01 = 1%).
    pub mutation_strength: f64,
    pub elite_ratio: f64,
    pub crossover_ratio: f64,
    pub mutation_ratio: f64,
    /// Fraction of the ranked population that forms the parent pool.
    pub selection_percentile: f64,
    /// BLX-alpha expansion factor for crossover.
    pub blend_alpha: f64,
    /// Decimal places used to cluster candidates into distinct roots.
    pub root_precision: u32,
}

impl Default for GaOptions {
    fn default() -> Self {
        Self {
            min_range: DEFAULT_MIN_RANGE,
            max_range: DEFAULT_MAX_RANGE,
            num_of_generations: DEFAULT_NUM_OF_GENERATIONS,
            data_size: DEFAULT_DATA_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            mutation_strength: DEFAULT_MUTATION_STRENGTH,
            elite_ratio: DEFAULT_ELITE_RATIO,
            crossover_ratio: DEFAULT_CROSSOVER_RATIO,
            mutation_ratio: DEFAULT_MUTATION_RATIO,
            selection_percentile: DEFAULT_SELECTION_PERCENTILE,
            blend_alpha: DEFAULT_BLEND_ALPHA,
            root_precision: DEFAULT_ROOT_PRECISION,
        }
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(raw: &str) -> Option<u32> {
    let value = parse_float(raw)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

impl GaOptions {
    /// Build options from raw `(name, value)` pairs as edited in the UI.
    ///
    /// Unknown names are ignored; unparseable values keep the default.
    pub fn from_raw<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = Self::default();
        for (name, raw) in entries {
            let applied = match name {
                "min_range" => parse_float(raw).map(|v| opts.min_range = v),
                "max_range" => parse_float(raw).map(|v| opts.max_range = v),
                "num_of_generations" => parse_count(raw).map(|v| opts.num_of_generations = v),
                "data_size" => parse_count(raw).map(|v| opts.data_size = v),
                "sample_size" => parse_count(raw).map(|v| opts.sample_size = v),
                "mutation_strength" => parse_float(raw).map(|v| opts.mutation_strength = v),
                "elite_ratio" => parse_float(raw).map(|v| opts.elite_ratio = v),
                "crossover_ratio" => parse_float(raw).map(|v| opts.crossover_ratio = v),
                "mutation_ratio" => parse_float(raw).map(|v| opts.mutation_ratio = v),
                "selection_percentile" => parse_float(raw).map(|v| opts.selection_percentile = v),
                "blend_alpha" => parse_float(raw).map(|v| opts.blend_alpha = v),
                "root_precision" => parse_count(raw).map(|v| opts.root_precision = v),
                other => {
                    tracing::debug!(target = "polysolve", option = other, "ignoring unknown GA option");
                    continue;
                }
            };
            if applied.is_none() {
                tracing::debug!(
                    target = "polysolve",
                    option = name,
                    raw = raw,
                    "GA option not numeric, keeping default"
                );
            }
        }
        opts
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let invalid = |msg: String| InputError::new(DETAIL_GA_OPTIONS, msg);

        for (name, value) in [
            ("min_range", self.min_range),
            ("max_range", self.max_range),
            ("mutation_strength", self.mutation_strength),
            ("blend_alpha", self.blend_alpha),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be a finite number")));
            }
        }
        if self.min_range >= self.max_range {
            return Err(invalid(format!(
                "min_range ({}) must be below max_range ({})",
                self.min_range, self.max_range
            )));
        }
        if self.num_of_generations == 0 || self.num_of_generations > MAX_GENERATIONS {
            return Err(invalid(format!(
                "num_of_generations must be between 1 and {MAX_GENERATIONS}"
            )));
        }
        if self.data_size < 2 || self.data_size > MAX_DATA_SIZE {
            return Err(invalid(format!("data_size must be between 2 and {MAX_DATA_SIZE}")));
        }
        if self.sample_size == 0 || self.sample_size > MAX_SAMPLE_SIZE {
            return Err(invalid(format!(
                "sample_size must be between 1 and {MAX_SAMPLE_SIZE}"
            )));
        }
        if self.root_precision > MAX_ROOT_PRECISION {
            return Err(invalid(format!(
                "root_precision must be at most {MAX_ROOT_PRECISION}"
            )));
        }
        if !(self.max_range - self.min_range).is_finite() {
            return Err(invalid(
                "max_range - min_range must be a finite number".to_string(),
            ));
        }
        if self.mutation_strength < 0.0 || self.blend_alpha < 0.0 {
            return Err(invalid(
                "mutation_strength and blend_alpha must not be negative".to_string(),
            ));
        }
        if self.mutation_strength > MAX_MUTATION_STRENGTH {
            return Err(invalid(format!(
                "mutation_strength must be at most {MAX_MUTATION_STRENGTH}"
            )));
        }
        if self.blend_alpha > MAX_BLEND_ALPHA {
            return Err(invalid(format!("blend_alpha must be at most {MAX_BLEND_ALPHA}")));
        }
        for (name, ratio) in [
            ("elite_ratio", self.elite_ratio),
            ("crossover_ratio", self.crossover_ratio),
            ("mutation_ratio", self.mutation_ratio),
            ("selection_percentile", self.selection_percentile),
        ] {
            if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(format!("{name} must be between 0 and 1")));
            }
        }
        if self.selection_percentile == 0.0 {
            return Err(invalid("selection_percentile must be above 0".to_string()));
        }
        let total = self.elite_ratio + self.crossover_ratio + self.mutation_ratio;
        // Tolerate float noise such as 0.05 + 0.45 + 0.5.
        if total > 1.0 + 1e-9 {
            return Err(invalid(format!(
                "elite_ratio + crossover_ratio + mutation_ratio must not exceed 1 (got {total})"
            )));
        }
        Ok(())
    }
}
