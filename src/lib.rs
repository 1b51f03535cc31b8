/// This crate is a quantification and correction-ranking toolkit for
/// multi-label text classifiers.
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod progress;
pub mod quantification;
pub mod ranking;
pub mod utils;

/// Crate error and result alias
/// Rate and measure computations never fail on a zero denominator; they
/// resolve to 0.
pub use error::{Error, Result};

/// Document Index
/// In-memory document universe with its category universe and true
/// classification. Documents and categories iterate in insertion order.
///
/// # Serialization
/// Use `IndexData` as the serializable form; it converts into an `Index`
/// through `into_index`.
pub use index::{serde::IndexData, CategoryId, Classification, Confidences, DocId, Document, Index};

/// Contingency Tables
/// Per-category true/false positive/negative counts with a summed global
/// table. `evaluate` builds them from a predicted and a true
/// classification; `MixedEvaluation` updates them incrementally as
/// documents are corrected to their true labels.
pub use evaluation::{evaluate, evaluate_mixed, Aggregation, ContingencyTable, ContingencyTableSet, Measure};

/// Classifier Interface
/// `Learner` trains a `Classifier`; the quantification core never looks
/// inside the model. `CentroidLearner` is a small reference learner.
pub use classifier::{CborDataManager, CentroidLearner, ClassificationMode, Classifier, ClassifierDataManager, Learner};

/// Quantification Learner
/// Runs k-fold rate estimation, trains a classifier on the whole training
/// index and returns the pool of six quantifiers (CC, PA, ACC, MAX, SCC,
/// SPA) sharing both.
///
/// # Serialization
/// Supported through `QuantifierPool::write` and `QuantifierPool::read`.
pub use quantification::{Quantification, QuantificationLearner, Quantifier, QuantifierKind, QuantifierPool};

/// Ranking Simulation
/// Orders test documents for manual correction under a `Policy` and
/// records the evaluation measure after every correction.
pub use ranking::{Policy, RankingInput, Simulation, SimulationOutcome, SimulationStatus};

/// Configuration
/// Flat structs, validated once when the owning component is built.
pub use config::{RankingConfig, RateEstimatorConfig, SigmaScope};

/// Progress reporting and cooperative cancellation
pub use progress::{CancellationToken, LogProgress, NoProgress, Progress};
