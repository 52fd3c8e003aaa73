//! System limits and capacity configuration

/// Polynomial limits.
pub const MAX_DEGREE: usize = 64;
pub const MAX_DERIVATIVE_ORDER: u32 = 1_000;

/// Genetic algorithm limits.
pub const MAX_DATA_SIZE: u32 = 1_000_000;
pub const MAX_GENERATIONS: u32 = 10_000;
pub const MAX_SAMPLE_SIZE: u32 = 1_000_000;
pub const MAX_ROOT_PRECISION: u32 = 12;
pub const MAX_BLEND_ALPHA: f64 = 10.0;
pub const MAX_MUTATION_STRENGTH: f64 = 10.0;

/// Format preview slots. Correlation ids are 1-based.
pub const FORMAT_SLOT_COUNT: usize = 2;
