//! Contingency accounting and evaluation measures.

pub mod contingency;
pub mod measure;

pub use contingency::{evaluate, evaluate_mixed, ContingencyTable, ContingencyTableSet, MixedEvaluation};
pub use measure::{Aggregation, Measure};
