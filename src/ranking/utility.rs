//! Expected-utility and confidence based document ranking.

use crate::{
    evaluation::{Aggregation, ContingencyTableSet, Measure},
    index::{CategoryId, Classification, Confidences, DocId},
    quantification::Calibration,
    ranking::gain::GainFunction,
};

/// Probability that a single (document, category) prediction is wrong.
#[derive(Clone, Copy)]
pub struct ErrorModel<'a> {
    predicted: &'a Classification,
    truth: &'a Classification,
    confidences: &'a Confidences,
    calibration: &'a Calibration,
    /// Use the true labels instead of calibrated probabilities
    oracle: bool,
}

impl<'a> ErrorModel<'a> {
    pub fn new(
        predicted: &'a Classification,
        truth: &'a Classification,
        confidences: &'a Confidences,
        calibration: &'a Calibration,
        oracle: bool,
    ) -> Self {
        Self {
            predicted,
            truth,
            confidences,
            calibration,
            oracle,
        }
    }

    /// Calibrated probability that `doc` belongs to `cat`. Unscored pairs
    /// count as certainly negative.
    pub fn probability(&self, doc: DocId, cat: CategoryId) -> f64 {
        self.confidences
            .get(doc, cat)
            .map_or(0.0, |s| self.calibration.probability(cat, s.x()))
    }

    pub fn error_probability(&self, doc: DocId, cat: CategoryId) -> f64 {
        let predicted = self.predicted.contains(doc, cat);
        if self.oracle {
            return if predicted != self.truth.contains(doc, cat) { 1.0 } else { 0.0 };
        }
        let p = self.probability(doc, cat);
        if predicted {
            1.0 - p
        } else {
            p
        }
    }

    pub fn is_predicted(&self, doc: DocId, cat: CategoryId) -> bool {
        self.predicted.contains(doc, cat)
    }

    fn disagrees(&self, doc: DocId, categories: &[CategoryId]) -> bool {
        categories
            .iter()
            .any(|c| self.predicted.contains(doc, *c) != self.truth.contains(doc, *c))
    }
}

/// Ranks documents by the measure gain expected from correcting them.
pub struct UtilityRanker<'a> {
    errors: ErrorModel<'a>,
    categories: &'a [CategoryId],
    measure: Measure,
    aggregation: Aggregation,
    gain: GainFunction,
}

impl<'a> UtilityRanker<'a> {
    pub fn new(
        errors: ErrorModel<'a>,
        categories: &'a [CategoryId],
        measure: Measure,
        aggregation: Aggregation,
        gain: GainFunction,
    ) -> Self {
        Self {
            errors,
            categories,
            measure,
            aggregation,
            gain,
        }
    }

    /// `Σ_c P(wrong | doc, c) · gain(correcting doc in c)` on `tables`.
    pub fn utility(&self, doc: DocId, tables: &ContingencyTableSet) -> f64 {
        let n = self.categories.len();
        self.categories
            .iter()
            .map(|cat| {
                let p_err = self.errors.error_probability(doc, *cat);
                if p_err == 0.0 {
                    return 0.0;
                }
                let predicted = self.errors.is_predicted(doc, *cat);
                let gain = self.gain.cell_gain(
                    &self.measure,
                    self.aggregation,
                    &tables.table(*cat),
                    tables.global(),
                    n,
                    predicted,
                );
                p_err * gain
            })
            .sum()
    }

    /// Order `docs` once by descending utility. Ties keep input order.
    pub fn rank_all(&self, docs: &[DocId], tables: &ContingencyTableSet) -> Vec<DocId> {
        let mut keyed: Vec<(DocId, f64)> = docs.iter().map(|d| (*d, self.utility(*d, tables))).collect();
        keyed.sort_by(|a, b| b.1.total_cmp(&a.1));
        keyed.into_iter().map(|(d, _)| d).collect()
    }

    /// Position in `remaining` of the first document with maximal utility.
    pub fn next(&self, remaining: &[DocId], tables: &ContingencyTableSet) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, doc) in remaining.iter().enumerate() {
            let u = self.utility(*doc, tables);
            if best.map_or(true, |(_, b)| u > b) {
                best = Some((i, u));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Most uncertain documents first: ascending `Σ |0.5 - p|` over each
/// document's `top_n` most probable categories. With `oracle`, documents
/// with any wrong prediction come first and the rest last.
pub fn confidence_rank(
    errors: &ErrorModel<'_>,
    docs: &[DocId],
    categories: &[CategoryId],
    top_n: Option<usize>,
    oracle: bool,
) -> Vec<DocId> {
    let key = |doc: DocId| -> f64 {
        if oracle {
            return if errors.disagrees(doc, categories) {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        let mut ps: Vec<f64> = categories.iter().map(|c| errors.probability(doc, *c)).collect();
        ps.sort_by(|a, b| b.total_cmp(a));
        ps.iter()
            .take(top_n.unwrap_or(usize::MAX))
            .map(|p| (0.5 - p).abs())
            .sum()
    };
    let mut keyed: Vec<(DocId, f64)> = docs.iter().map(|d| (*d, key(*d))).collect();
    keyed.sort_by(|a, b| a.1.total_cmp(&b.1));
    keyed.into_iter().map(|(d, _)| d).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        evaluation::evaluate,
        index::ClassificationScore,
        quantification::LogisticFunction,
    };

    struct Fixture {
        predicted: Classification,
        truth: Classification,
        confidences: Confidences,
        calibration: Calibration,
    }

    /// four documents, one category: 0 tp, 1 fp, 2 fn, 3 tn
    fn fixture() -> Fixture {
        let mut predicted = Classification::new();
        let mut truth = Classification::new();
        let mut confidences = Confidences::new();
        let rows = [(0.8, true), (0.1, false), (-0.2, true), (-0.9, false)];
        for (i, (x, actual)) in rows.iter().enumerate() {
            let doc = DocId(i as u32);
            let s = ClassificationScore::new(*x, 0.0, -1.0, 1.0);
            predicted.assign(doc, s.is_positive().then_some(CategoryId(0)));
            truth.assign(doc, actual.then_some(CategoryId(0)));
            confidences.insert(doc, CategoryId(0), s);
        }
        Fixture {
            predicted,
            truth,
            confidences,
            calibration: Calibration::new(LogisticFunction::new(0.2)),
        }
    }

    const CATS: [CategoryId; 1] = [CategoryId(0)];

    #[test]
    fn uncertain_predictions_are_likely_errors() {
        let f = fixture();
        let errors = ErrorModel::new(&f.predicted, &f.truth, &f.confidences, &f.calibration, false);
        assert!(errors.error_probability(DocId(1), CategoryId(0)) > errors.error_probability(DocId(0), CategoryId(0)));
        assert!(errors.error_probability(DocId(2), CategoryId(0)) > errors.error_probability(DocId(3), CategoryId(0)));

        let oracle = ErrorModel::new(&f.predicted, &f.truth, &f.confidences, &f.calibration, true);
        assert_eq!(oracle.error_probability(DocId(0), CategoryId(0)), 0.0);
        assert_eq!(oracle.error_probability(DocId(1), CategoryId(0)), 1.0);
    }

    #[test]
    fn oracle_utility_ranks_errors_first() {
        let f = fixture();
        let tables = evaluate(&f.predicted, &f.truth, &CATS);
        let errors = ErrorModel::new(&f.predicted, &f.truth, &f.confidences, &f.calibration, true);
        let ranker = UtilityRanker::new(errors, &CATS, Measure::F1, Aggregation::Macro, GainFunction::Gain);
        let docs: Vec<DocId> = (0..4).map(DocId).collect();
        let rank = ranker.rank_all(&docs, &tables);
        // F1 0.5 -> 0.8 fixing the false negative, -> 2/3 fixing the false positive
        assert_eq!(&rank[..2], &[DocId(2), DocId(1)]);
        assert_eq!(&rank[2..], &[DocId(0), DocId(3)]);
        assert_eq!(ranker.next(&docs, &tables), Some(docs.iter().position(|d| *d == rank[0]).unwrap()));
    }

    #[test]
    fn confidence_rank_prefers_scores_near_the_border() {
        let f = fixture();
        let errors = ErrorModel::new(&f.predicted, &f.truth, &f.confidences, &f.calibration, false);
        let docs: Vec<DocId> = (0..4).map(DocId).collect();
        let rank = confidence_rank(&errors, &docs, &CATS, None, false);
        assert_eq!(rank, vec![DocId(1), DocId(2), DocId(0), DocId(3)]);

        let oracle = ErrorModel::new(&f.predicted, &f.truth, &f.confidences, &f.calibration, true);
        let rank = confidence_rank(&oracle, &docs, &CATS, None, true);
        assert_eq!(rank, vec![DocId(1), DocId(2), DocId(0), DocId(3)]);
    }

    #[test]
    fn top_n_limits_confidence_rank_to_most_probable_categories() {
        let cats = [CategoryId(0), CategoryId(1)];
        let mut confidences = Confidences::new();
        // doc 0 is mildly unsure in both categories, doc 1 very unsure in
        // its most probable category and sure it is not in the other
        for (doc, xs) in [(DocId(0), [0.1, 0.1]), (DocId(1), [0.05, -5.0])] {
            for (cat, x) in cats.iter().zip(xs) {
                confidences.insert(doc, *cat, ClassificationScore::new(x, 0.0, -10.0, 10.0));
            }
        }
        let (predicted, truth) = (Classification::new(), Classification::new());
        let calibration = Calibration::new(LogisticFunction::new(1.0));
        let errors = ErrorModel::new(&predicted, &truth, &confidences, &calibration, false);
        let docs = [DocId(0), DocId(1)];

        assert_eq!(confidence_rank(&errors, &docs, &cats, Some(1), false), vec![DocId(1), DocId(0)]);
        assert_eq!(confidence_rank(&errors, &docs, &cats, None, false), vec![DocId(0), DocId(1)]);
        assert_eq!(confidence_rank(&errors, &docs, &cats, Some(2), false), vec![DocId(0), DocId(1)]);
    }
}
