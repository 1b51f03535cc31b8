//! Flat, per-component configuration.
//!
//! Each struct is validated once, when the component owning it is built.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    evaluation::{Aggregation, Measure},
    index::CategoryId,
    ranking::Policy,
};

/// Whether the logistic slope is fitted per category or once for all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigmaScope {
    #[default]
    PerCategory,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateEstimatorConfig {
    /// Requested fold count, reduced to the document count when larger
    pub folds: usize,
    /// Worker threads for fold training, 0 lets rayon decide
    pub threads: usize,
    /// Directory caching each fold's out-of-fold predictions
    pub cache_dir: Option<PathBuf>,
    /// Recompute folds even when a cached result exists
    pub overwrite_cache: bool,
    pub sigma_scope: SigmaScope,
}

impl Default for RateEstimatorConfig {
    fn default() -> Self {
        Self {
            folds: 10,
            threads: 0,
            cache_dir: None,
            overwrite_cache: false,
            sigma_scope: SigmaScope::PerCategory,
        }
    }
}

impl RateEstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.folds == 0 {
            return Err(Error::invalid_config("fold count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub measure: Measure,
    pub aggregation: Aggregation,
    pub policy: Policy,
    /// Size of the set the estimated tables were counted on. When given,
    /// estimated tables are rescaled to the ranked set's size.
    pub training_size: Option<usize>,
    /// Restrict evaluation and ranking to these categories
    pub categories: Option<Vec<CategoryId>>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            measure: Measure::F1,
            aggregation: Aggregation::Macro,
            policy: Policy::default(),
            training_size: None,
            categories: None,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<()> {
        if let Measure::F(beta) = self.measure {
            if !(beta.is_finite() && beta > 0.0) {
                return Err(Error::invalid_config(format!("F-measure beta must be positive, got {beta}")));
            }
        }
        if matches!(&self.categories, Some(cats) if cats.is_empty()) {
            return Err(Error::invalid_config("category filter is empty"));
        }
        if self.training_size == Some(0) {
            return Err(Error::invalid_config("training size must be positive"));
        }
        self.policy.validate()
    }
}
