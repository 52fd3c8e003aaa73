//! Genetic-algorithm real-root finder.
//!
//! Candidates are scored by `|f(x)|`. Each generation keeps an elite, breeds
//! children from the top `selection_percentile` with BLX-alpha crossover, nudges
//! parents by a relative mutation and fills the rest with random immigrants.
//! Roots are extracted from the best `sample_size` candidates by rounding to
//! `root_precision` and merging neighbours.

use rand::Rng;

use super::polynomial::Polynomial;
use super::EngineError;
use crate::ga_options::GaOptions;

pub fn solve<R: Rng>(
    poly: &Polynomial,
    options: &GaOptions,
    rng: &mut R,
) -> Result<Vec<f64>, EngineError> {
    match poly.degree() {
        None => Err(EngineError::Computation(
            "the zero polynomial has infinitely many roots".into(),
        )),
        Some(0) => Ok(Vec::new()),
        Some(1) => {
            let c = poly.coefficients();
            Ok(vec![normalize_zero(round_to(
                -c[1] / c[0],
                options.root_precision,
            ))])
        }
        Some(_) => evolve(poly, options, rng),
    }
}

/// Render roots the way the output panel shows them: `[-2.0, 2.0]`.
pub fn render_roots(roots: &[f64]) -> String {
    let items: Vec<String> = roots.iter().map(|r| format!("{r:?}")).collect();
    format!("[{}]", items.join(", "))
}

fn evolve<R: Rng>(
    poly: &Polynomial,
    options: &GaOptions,
    rng: &mut R,
) -> Result<Vec<f64>, EngineError> {
    let size = options.data_size.max(2) as usize;
    let (lo, hi) = (options.min_range, options.max_range);
    let portion = |ratio: f64| ((size as f64) * ratio).round() as usize;

    let elite_n = portion(options.elite_ratio).min(size);
    let cross_n = portion(options.crossover_ratio).min(size - elite_n);
    let mut_n = portion(options.mutation_ratio).min(size - elite_n - cross_n);
    let pool_n = portion(options.selection_percentile).clamp(1, size);

    let mut population = (0..size)
        .map(|_| sample(rng, lo, hi))
        .collect::<Result<Vec<f64>, _>>()?;

    for _ in 0..options.num_of_generations {
        rank(poly, &mut population);
        let pool = &population[..pool_n];
        let mut next = Vec::with_capacity(size);
        next.extend_from_slice(&population[..elite_n]);

        for _ in 0..cross_n {
            let a = pool[rng.gen_range(0..pool_n)];
            let b = pool[rng.gen_range(0..pool_n)];
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let spread = (high - low) * options.blend_alpha;
            next.push(sample(rng, low - spread, high + spread)?);
        }

        let strength = options.mutation_strength;
        for _ in 0..mut_n {
            let parent = pool[rng.gen_range(0..pool_n)];
            next.push(parent * (1.0 + sample(rng, -strength, strength)?));
        }

        while next.len() < size {
            next.push(sample(rng, lo, hi)?);
        }
        population = next;
    }

    rank(poly, &mut population);
    let sampled = (options.sample_size as usize).clamp(1, size);
    Ok(extract_roots(poly, &population[..sampled], options.root_precision))
}

/// Uniform draw from `[low, high]`. Ranges whose width overflows are an error.
fn sample<R: Rng>(rng: &mut R, low: f64, high: f64) -> Result<f64, EngineError> {
    if low.is_nan() || high.is_nan() || low > high || !(high - low).is_finite() {
        return Err(EngineError::Computation(format!(
            "search range [{low}, {high}] is not representable"
        )));
    }
    if low == high {
        return Ok(low);
    }
    Ok(rng.gen_range(low..=high))
}

fn rank(poly: &Polynomial, population: &mut [f64]) {
    population.sort_by(|a, b| {
        let fa = poly.eval(*a).abs();
        let fb = poly.eval(*b).abs();
        fa.total_cmp(&fb)
    });
}

fn extract_roots(poly: &Polynomial, ranked: &[f64], precision: u32) -> Vec<f64> {
    let step = 10f64.powi(-(precision as i32));
    let slope = poly.derivative();
    let mut roots: Vec<f64> = Vec::new();
    // `ranked` is best-first, so the first candidate in each cluster wins.
    for candidate in ranked {
        if !candidate.is_finite() {
            continue;
        }
        let root = normalize_zero(round_to(*candidate, precision));
        if roots.iter().any(|r| (r - root).abs() <= step * 1.5) {
            continue;
        }
        let tolerance = slope.eval(root).abs() * step + step;
        if poly.eval(root).abs() <= tolerance {
            roots.push(root);
        }
    }
    roots.sort_by(f64::total_cmp);
    roots
}

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}
