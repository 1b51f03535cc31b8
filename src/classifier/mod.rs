//! Classifier and learner interfaces consumed by the quantification core.
//!
//! The core never looks inside a model: it trains through [`Learner`],
//! scores documents through [`Classifier`] and persists models through a
//! [`ClassifierDataManager`].

pub mod centroid;
pub mod data_manager;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    index::{CategoryId, ClassificationScore, Confidences, DocId, Document, Index},
};

pub use centroid::{CentroidClassifier, CentroidLearner};
pub use data_manager::{CborDataManager, ClassifierDataManager};

/// Which axis document classification is parallelised over.
/// Both modes produce identical confidences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationMode {
    #[default]
    PerDocument,
    PerCategory,
}

/// A trained binary classifier per category.
pub trait Classifier: Send + Sync {
    /// Categories this classifier scores.
    fn categories(&self) -> Vec<CategoryId>;

    /// Score of `doc` for a single category.
    fn score(&self, doc: &Document, cat: CategoryId) -> ClassificationScore;

    /// Scores of `doc` for every category.
    fn classify(&self, doc: &Document) -> Vec<(CategoryId, ClassificationScore)> {
        self.categories()
            .into_iter()
            .map(|cat| (cat, self.score(doc, cat)))
            .collect()
    }
}

/// Builds a classifier from a labelled index.
pub trait Learner: Send + Sync {
    type Model: Classifier;

    fn build(&self, training: &Index) -> Result<Self::Model>;

    /// Short identifier of the learner and its parameters, used to name
    /// cached artefacts.
    fn tag(&self) -> String;
}

/// Classify every document of `index`. The result lists documents in index
/// order whatever the mode.
pub fn classify_index<C>(classifier: &C, index: &Index, mode: ClassificationMode) -> Confidences
where
    C: Classifier + ?Sized,
{
    let docs: Vec<(DocId, &Document)> = index.documents().collect();
    let mut out = Confidences::new();
    match mode {
        ClassificationMode::PerDocument => {
            let scored: Vec<(DocId, Vec<(CategoryId, ClassificationScore)>)> = docs
                .par_iter()
                .map(|(id, doc)| (*id, classifier.classify(doc)))
                .collect();
            for (doc, scores) in scored {
                for (cat, score) in scores {
                    out.insert(doc, cat, score);
                }
            }
        }
        ClassificationMode::PerCategory => {
            let cats = classifier.categories();
            let by_cat: Vec<Vec<ClassificationScore>> = cats
                .par_iter()
                .map(|cat| docs.iter().map(|(_, doc)| classifier.score(doc, *cat)).collect())
                .collect();
            for (d, (doc, _)) in docs.iter().enumerate() {
                for (c, cat) in cats.iter().enumerate() {
                    out.insert(*doc, *cat, by_cat[c][d]);
                }
            }
        }
    }
    out
}
