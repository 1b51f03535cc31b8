use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::index::CategoryId;

/// Phase one candidates for the slope parameter.
const SIGMA_GRID: [f64; 9] = [1e-4, 1e-3, 1e-2, 1e-1, 1.0, 1e1, 1e2, 1e3, 1e4];
/// Sub-steps of the refinement phase.
const REFINE_STEPS: usize = 1000;

/// `p(x) = e^(x/σ) / (e^(x/σ) + 1)` mapping a signed distance from the
/// decision border into (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticFunction {
    pub sigma: f64,
}

impl Default for LogisticFunction {
    fn default() -> Self {
        Self { sigma: 1.0 }
    }
}

impl LogisticFunction {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    #[inline]
    pub fn probability(&self, x: f64) -> f64 {
        let z = x / self.sigma;
        if z.is_nan() {
            return 0.5;
        }
        // split on the sign so exp never overflows
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    /// Fit σ so that the summed probabilities over `xs` match `true_count`.
    pub fn fit(xs: &[f64], true_count: usize) -> LogisticFunction {
        if xs.is_empty() {
            return LogisticFunction::default();
        }
        let target = true_count as f64;
        LogisticFunction::new(search_sigma(|sigma| {
            let f = LogisticFunction::new(sigma);
            (target - xs.iter().map(|x| f.probability(*x)).sum::<f64>()).abs()
        }))
    }

    /// Fit one σ shared by several categories, minimising the summed error.
    pub fn fit_global(samples: &[(Vec<f64>, usize)]) -> LogisticFunction {
        if samples.iter().all(|(xs, _)| xs.is_empty()) {
            return LogisticFunction::default();
        }
        LogisticFunction::new(search_sigma(|sigma| {
            let f = LogisticFunction::new(sigma);
            samples
                .iter()
                .map(|(xs, count)| {
                    (*count as f64 - xs.iter().map(|x| f.probability(*x)).sum::<f64>()).abs()
                })
                .sum()
        }))
    }
}

/// Grid search followed by a linear refinement between the neighbours of the
/// best grid point. Ties keep the earlier (smaller) σ.
fn search_sigma<F>(objective: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let mut best = 0;
    let mut best_err = f64::INFINITY;
    for (i, sigma) in SIGMA_GRID.iter().enumerate() {
        let err = objective(*sigma);
        if err < best_err {
            best = i;
            best_err = err;
        }
    }

    let lo = SIGMA_GRID[best.saturating_sub(1)];
    let hi = SIGMA_GRID[(best + 1).min(SIGMA_GRID.len() - 1)];
    let mut best_sigma = SIGMA_GRID[best];
    let step = (hi - lo) / REFINE_STEPS as f64;
    for k in 1..REFINE_STEPS {
        let sigma = lo + step * k as f64;
        let err = objective(sigma);
        if err < best_err {
            best_err = err;
            best_sigma = sigma;
        }
    }
    best_sigma
}

/// Per-category logistic functions with a fallback for unknown categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    functions: IndexMap<CategoryId, LogisticFunction>,
    fallback: LogisticFunction,
}

impl Calibration {
    pub fn new(fallback: LogisticFunction) -> Self {
        Self {
            functions: IndexMap::new(),
            fallback,
        }
    }

    pub fn insert(&mut self, cat: CategoryId, function: LogisticFunction) {
        self.functions.insert(cat, function);
    }

    pub fn function(&self, cat: CategoryId) -> LogisticFunction {
        self.functions.get(&cat).copied().unwrap_or(self.fallback)
    }

    /// Rescaled probability of `x = score - border` for `cat`.
    #[inline]
    pub fn probability(&self, cat: CategoryId, x: f64) -> f64 {
        self.function(cat).probability(x)
    }
}
