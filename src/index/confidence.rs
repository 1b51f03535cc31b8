use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::index::{CategoryId, Classification, DocId};

/// Signed classifier output for one (document, category) pair.
///
/// `min <= border <= max` holds per classifier configuration, but `score`
/// itself may fall outside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationScore {
    pub score: f64,
    pub border: f64,
    pub min: f64,
    pub max: f64,
}

impl ClassificationScore {
    pub fn new(score: f64, border: f64, min: f64, max: f64) -> Self {
        Self {
            score,
            border,
            min,
            max,
        }
    }

    /// Distance from the decision border, positive means "in the category".
    #[inline]
    pub fn x(&self) -> f64 {
        self.score - self.border
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.score > self.border
    }
}

/// Confidence store queryable by (document, category).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Confidences {
    scores: IndexMap<DocId, IndexMap<CategoryId, ClassificationScore>>,
}

impl Confidences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: DocId, cat: CategoryId, score: ClassificationScore) {
        self.scores.entry(doc).or_default().insert(cat, score);
    }

    pub fn get(&self, doc: DocId, cat: CategoryId) -> Option<&ClassificationScore> {
        self.scores.get(&doc).and_then(|m| m.get(&cat))
    }

    /// All scored categories of `doc`.
    pub fn of_document(&self, doc: DocId) -> impl Iterator<Item = (CategoryId, &ClassificationScore)> + '_ {
        self.scores
            .get(&doc)
            .into_iter()
            .flat_map(|m| m.iter().map(|(c, s)| (*c, s)))
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.scores.keys().copied()
    }

    pub fn document_count(&self) -> usize {
        self.scores.len()
    }

    /// Documents whose score is above the border, per category.
    /// Every scored document is registered, even with no positive category.
    pub fn to_classification(&self) -> Classification {
        let mut out = Classification::new();
        for (doc, cats) in &self.scores {
            out.assign(
                *doc,
                cats.iter().filter(|(_, s)| s.is_positive()).map(|(c, _)| *c),
            );
        }
        out
    }

    /// Merge scores of disjoint documents.
    pub fn extend(&mut self, other: Confidences) {
        for (doc, cats) in other.scores {
            self.scores.entry(doc).or_default().extend(cats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholding_uses_strict_border() {
        let mut conf = Confidences::new();
        conf.insert(DocId(0), CategoryId(0), ClassificationScore::new(0.5, 0.0, -1.0, 1.0));
        conf.insert(DocId(0), CategoryId(1), ClassificationScore::new(0.0, 0.0, -1.0, 1.0));
        conf.insert(DocId(1), CategoryId(0), ClassificationScore::new(-0.2, 0.0, -1.0, 1.0));
        let cls = conf.to_classification();
        assert_eq!(cls.categories_of(DocId(0)), &[CategoryId(0)]);
        assert!(cls.categories_of(DocId(1)).is_empty());
        assert_eq!(cls.document_count(), 2);
    }
}
