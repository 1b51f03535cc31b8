use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{Classifier, Learner},
    error::{Error, Result},
    index::{CategoryId, ClassificationScore, Document, Index},
    utils::math::vector::SparseVector,
};

/// Rocchio-style learner: one positive and one negative centroid per
/// category, compared by cosine similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CentroidLearner {
    /// Weight of the negative centroid in the score
    pub negative_weight: f64,
}

impl Default for CentroidLearner {
    fn default() -> Self {
        Self { negative_weight: 1.0 }
    }
}

impl Learner for CentroidLearner {
    type Model = CentroidClassifier;

    fn build(&self, training: &Index) -> Result<CentroidClassifier> {
        if !self.negative_weight.is_finite() || self.negative_weight < 0.0 {
            return Err(Error::Learner(format!(
                "negative weight must be finite and >= 0, got {}",
                self.negative_weight
            )));
        }
        let truth = training.classification();
        let mut centroids = IndexMap::new();
        for cat in training.category_ids() {
            let mut positive = SparseVector::new();
            let mut negative = SparseVector::new();
            let (mut n_pos, mut n_neg) = (0usize, 0usize);
            for (id, doc) in training.documents() {
                if truth.contains(id, cat) {
                    positive.add_scaled(&doc.features, 1.0);
                    n_pos += 1;
                } else {
                    negative.add_scaled(&doc.features, 1.0);
                    n_neg += 1;
                }
            }
            if n_pos > 0 {
                positive.scale(1.0 / n_pos as f64);
            }
            if n_neg > 0 {
                negative.scale(1.0 / n_neg as f64);
            }
            centroids.insert(cat, Centroids { positive, negative });
        }
        log::debug!(
            "centroid learner: {} categories over {} documents",
            centroids.len(),
            training.document_count()
        );
        Ok(CentroidClassifier {
            centroids,
            negative_weight: self.negative_weight,
        })
    }

    fn tag(&self) -> String {
        format!("centroid-{}", self.negative_weight)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Centroids {
    positive: SparseVector<f64>,
    negative: SparseVector<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidClassifier {
    centroids: IndexMap<CategoryId, Centroids>,
    negative_weight: f64,
}

impl Classifier for CentroidClassifier {
    fn categories(&self) -> Vec<CategoryId> {
        self.centroids.keys().copied().collect()
    }

    fn score(&self, doc: &Document, cat: CategoryId) -> ClassificationScore {
        let max = 1.0 + self.negative_weight;
        let score = self.centroids.get(&cat).map_or(-max, |c| {
            doc.features.cosine(&c.positive) - self.negative_weight * doc.features.cosine(&c.negative)
        });
        ClassificationScore::new(score, 0.0, -max, max)
    }
}
