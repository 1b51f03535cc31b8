//! Multi-label active-learning selection strategies.
//!
//! Each strategy orders the scored documents so that the one a learner would
//! most like to see labelled comes first.

use indexmap::IndexSet;

use crate::{
    error::{Error, Result},
    index::{Classification, Confidences, DocId, Index},
    ranking::policy::ActiveStrategy,
};

/// Collaborator interface for selection strategies.
pub trait ActiveLearningStrategy {
    /// Order the documents of `confidences`, most informative first.
    ///
    /// `training` is the labelled set the model was built from, `predicted`
    /// the thresholded predictions when the caller has them, and `extra` an
    /// additional labelled index whose documents count towards training
    /// statistics.
    fn rank(
        &self,
        confidences: &Confidences,
        training: &Index,
        predicted: Option<&Classification>,
        extra: Option<&Index>,
    ) -> Result<Vec<DocId>>;
}

/// Max-margin uncertainty: the smaller the gap between the lowest positive
/// and the highest negative score, the less certain the prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMarginUncertainty;

/// Label cardinality inconsistency: distance between the number of labels
/// predicted for a document and the mean label count of the training set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelCardinalityInconsistency;

/// Weighted geometric combination of [`MaxMarginUncertainty`] and
/// [`LabelCardinalityInconsistency`].
#[derive(Debug, Clone, Copy)]
pub struct Adaptive {
    pub beta: f64,
}

impl ActiveStrategy {
    pub fn strategy(&self) -> Box<dyn ActiveLearningStrategy> {
        match *self {
            ActiveStrategy::Mmu => Box::new(MaxMarginUncertainty),
            ActiveStrategy::Lci => Box::new(LabelCardinalityInconsistency),
            ActiveStrategy::Adaptive { beta } => Box::new(Adaptive { beta }),
        }
    }
}

/// Separation margin of `doc`, never negative.
fn margin(confidences: &Confidences, doc: DocId) -> f64 {
    let mut min_positive: Option<f64> = None;
    let mut max_negative: Option<f64> = None;
    for (_, s) in confidences.of_document(doc) {
        let x = s.x();
        if s.is_positive() {
            min_positive = Some(min_positive.map_or(x, |m| m.min(x)));
        } else {
            max_negative = Some(max_negative.map_or(x, |m| m.max(x)));
        }
    }
    (min_positive.unwrap_or(0.0) - max_negative.unwrap_or(0.0)).max(0.0)
}

fn uncertainty(confidences: &Confidences, doc: DocId) -> f64 {
    1.0 / margin(confidences, doc).max(f64::EPSILON)
}

fn mean_cardinality(training: &Index, extra: Option<&Index>) -> f64 {
    let mut labels = training.average_cardinality() * training.document_count() as f64;
    let mut docs = training.document_count();
    if let Some(extra) = extra {
        labels += extra.average_cardinality() * extra.document_count() as f64;
        docs += extra.document_count();
    }
    if docs == 0 {
        0.0
    } else {
        labels / docs as f64
    }
}

fn inconsistency(confidences: &Confidences, predicted: Option<&Classification>, doc: DocId, mean: f64) -> f64 {
    let count = match predicted {
        Some(p) => p.categories_of(doc).len(),
        None => confidences.of_document(doc).filter(|(_, s)| s.is_positive()).count(),
    };
    (count as f64 - mean).abs()
}

/// Stable sort of the scored documents by descending key.
fn order_by<F>(confidences: &Confidences, key: F) -> Vec<DocId>
where
    F: Fn(DocId) -> f64,
{
    let mut keyed: Vec<(DocId, f64)> = confidences.document_ids().map(|d| (d, key(d))).collect();
    keyed.sort_by(|a, b| b.1.total_cmp(&a.1));
    keyed.into_iter().map(|(d, _)| d).collect()
}

fn require_training(training: &Index) -> Result<()> {
    if training.document_count() == 0 {
        return Err(Error::invalid_config("active-learning ranking needs a non-empty training index"));
    }
    Ok(())
}

impl ActiveLearningStrategy for MaxMarginUncertainty {
    fn rank(
        &self,
        confidences: &Confidences,
        training: &Index,
        _predicted: Option<&Classification>,
        _extra: Option<&Index>,
    ) -> Result<Vec<DocId>> {
        require_training(training)?;
        Ok(order_by(confidences, |d| uncertainty(confidences, d)))
    }
}

impl ActiveLearningStrategy for LabelCardinalityInconsistency {
    fn rank(
        &self,
        confidences: &Confidences,
        training: &Index,
        predicted: Option<&Classification>,
        extra: Option<&Index>,
    ) -> Result<Vec<DocId>> {
        require_training(training)?;
        let mean = mean_cardinality(training, extra);
        Ok(order_by(confidences, |d| inconsistency(confidences, predicted, d, mean)))
    }
}

impl ActiveLearningStrategy for Adaptive {
    fn rank(
        &self,
        confidences: &Confidences,
        training: &Index,
        predicted: Option<&Classification>,
        extra: Option<&Index>,
    ) -> Result<Vec<DocId>> {
        require_training(training)?;
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(Error::invalid_config(format!("adaptive beta must be in [0, 1], got {}", self.beta)));
        }
        let mean = mean_cardinality(training, extra);
        Ok(order_by(confidences, |d| {
            let u = uncertainty(confidences, d);
            let c = inconsistency(confidences, predicted, d, mean);
            u.powf(self.beta) * c.powf(1.0 - self.beta)
        }))
    }
}

/// Keep only documents of `universe`, appending the ones the strategy
/// did not rank in universe order.
pub(crate) fn complete_rank(ranked: Vec<DocId>, universe: &[DocId]) -> Vec<DocId> {
    let allowed: IndexSet<DocId> = universe.iter().copied().collect();
    let mut seen: IndexSet<DocId> = ranked.into_iter().filter(|d| allowed.contains(d)).collect();
    for doc in universe {
        seen.insert(*doc);
    }
    seen.into_iter().collect()
}
