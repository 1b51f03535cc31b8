//! Prevalence estimation on top of a binary classifier.
//!
//! A [`Quantifier`] turns the scores of a test set into one proportion per
//! category. Every variant shares one trained classifier and the rates
//! measured by the [`RateEstimator`] on the training set.

pub mod learner;
pub mod logistic;
pub mod rate;
pub mod report;

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{classify_index, ClassificationMode, Classifier},
    index::{CategoryId, Confidences, Index},
};

pub use learner::{QuantificationLearner, QuantifierPool};
pub use logistic::{Calibration, LogisticFunction};
pub use rate::{RateEstimate, RateEstimates, RateEstimator};

/// Estimated proportion of documents per category, each in `[0, 1]`.
/// Values are independent binary estimates and need not sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantification {
    pub name: String,
    pub values: IndexMap<CategoryId, f64>,
}

impl Quantification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: IndexMap::new(),
        }
    }

    pub fn get(&self, cat: CategoryId) -> Option<f64> {
        self.values.get(&cat).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }
}

/// Tag of a quantifier variant, in pool order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    ClassifyAndCount,
    ProbabilisticAverage,
    AdjustedCount,
    Max,
    ScaledClassifyAndCount,
    ScaledProbabilisticAverage,
}

impl QuantifierKind {
    pub const ALL: [QuantifierKind; 6] = [
        QuantifierKind::ClassifyAndCount,
        QuantifierKind::ProbabilisticAverage,
        QuantifierKind::AdjustedCount,
        QuantifierKind::Max,
        QuantifierKind::ScaledClassifyAndCount,
        QuantifierKind::ScaledProbabilisticAverage,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            QuantifierKind::ClassifyAndCount => "CC",
            QuantifierKind::ProbabilisticAverage => "PA",
            QuantifierKind::AdjustedCount => "ACC",
            QuantifierKind::Max => "MAX",
            QuantifierKind::ScaledClassifyAndCount => "SCC",
            QuantifierKind::ScaledProbabilisticAverage => "SPA",
        }
    }
}

impl fmt::Display for QuantifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A true/false positive rate pair used to correct a raw estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub tpr: f64,
    pub fpr: f64,
}

/// Threshold on `score - border` with the rates measured at it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxThreshold {
    pub threshold: f64,
    pub rates: Rates,
}

/// One prevalence estimation strategy. Each variant holds only what it
/// needs; scaled variants wrap the quantifier they correct.
pub enum Quantifier<C> {
    ClassifyAndCount {
        classifier: Arc<C>,
        mode: ClassificationMode,
    },
    ProbabilisticAverage {
        classifier: Arc<C>,
        mode: ClassificationMode,
        calibration: Calibration,
    },
    AdjustedCount {
        classifier: Arc<C>,
        mode: ClassificationMode,
        rates: IndexMap<CategoryId, Rates>,
    },
    Max {
        classifier: Arc<C>,
        mode: ClassificationMode,
        thresholds: IndexMap<CategoryId, MaxThreshold>,
    },
    ScaledClassifyAndCount {
        inner: Box<Quantifier<C>>,
        rates: IndexMap<CategoryId, Rates>,
    },
    ScaledProbabilisticAverage {
        inner: Box<Quantifier<C>>,
        rates: IndexMap<CategoryId, Rates>,
    },
}

impl<C> Quantifier<C>
where
    C: Classifier,
{
    pub fn kind(&self) -> QuantifierKind {
        match self {
            Quantifier::ClassifyAndCount { .. } => QuantifierKind::ClassifyAndCount,
            Quantifier::ProbabilisticAverage { .. } => QuantifierKind::ProbabilisticAverage,
            Quantifier::AdjustedCount { .. } => QuantifierKind::AdjustedCount,
            Quantifier::Max { .. } => QuantifierKind::Max,
            Quantifier::ScaledClassifyAndCount { .. } => QuantifierKind::ScaledClassifyAndCount,
            Quantifier::ScaledProbabilisticAverage { .. } => QuantifierKind::ScaledProbabilisticAverage,
        }
    }

    pub fn classifier(&self) -> &Arc<C> {
        match self {
            Quantifier::ClassifyAndCount { classifier, .. }
            | Quantifier::ProbabilisticAverage { classifier, .. }
            | Quantifier::AdjustedCount { classifier, .. }
            | Quantifier::Max { classifier, .. } => classifier,
            Quantifier::ScaledClassifyAndCount { inner, .. }
            | Quantifier::ScaledProbabilisticAverage { inner, .. } => inner.classifier(),
        }
    }

    fn mode(&self) -> ClassificationMode {
        match self {
            Quantifier::ClassifyAndCount { mode, .. }
            | Quantifier::ProbabilisticAverage { mode, .. }
            | Quantifier::AdjustedCount { mode, .. }
            | Quantifier::Max { mode, .. } => *mode,
            Quantifier::ScaledClassifyAndCount { inner, .. }
            | Quantifier::ScaledProbabilisticAverage { inner, .. } => inner.mode(),
        }
    }

    /// Classify `index` and estimate every category's prevalence.
    /// The index is only read.
    pub fn quantify(&self, index: &Index) -> Quantification {
        let confidences = classify_index(self.classifier().as_ref(), index, self.mode());
        self.quantify_confidences(&confidences)
    }

    /// Estimate prevalences from scores already computed by this
    /// quantifier's classifier.
    pub fn quantify_confidences(&self, confidences: &Confidences) -> Quantification {
        let mut out = Quantification::new(self.kind().short_name());
        match self {
            Quantifier::ClassifyAndCount { classifier, .. } => {
                for cat in classifier.categories() {
                    out.values.insert(cat, positive_fraction(confidences, cat, None));
                }
            }
            Quantifier::ProbabilisticAverage {
                classifier,
                calibration,
                ..
            } => {
                for cat in classifier.categories() {
                    out.values.insert(cat, mean_probability(confidences, cat, calibration));
                }
            }
            Quantifier::AdjustedCount { classifier, rates, .. } => {
                for cat in classifier.categories() {
                    let r = rates.get(&cat).copied().unwrap_or_default();
                    let cc = positive_fraction(confidences, cat, None);
                    out.values.insert(cat, adjust(cc, r.tpr, r.fpr));
                }
            }
            Quantifier::Max {
                classifier,
                thresholds,
                ..
            } => {
                for cat in classifier.categories() {
                    let m = thresholds.get(&cat).copied().unwrap_or_default();
                    let cc = positive_fraction(confidences, cat, Some(m.threshold));
                    out.values.insert(cat, adjust(cc, m.rates.tpr, m.rates.fpr));
                }
            }
            Quantifier::ScaledClassifyAndCount { inner, rates }
            | Quantifier::ScaledProbabilisticAverage { inner, rates } => {
                for (cat, raw) in inner.quantify_confidences(confidences).values {
                    let r = rates.get(&cat).copied().unwrap_or_default();
                    out.values.insert(cat, adjust(raw, r.tpr, r.fpr));
                }
            }
        }
        out
    }
}

/// Adjusted-count correction `(estimate - fpr) / (tpr - fpr)` clamped to
/// `[0, 1]`. With `tpr == fpr` the result is the bound on the side of
/// `estimate - fpr`.
pub fn adjust(estimate: f64, tpr: f64, fpr: f64) -> f64 {
    let num = estimate - fpr;
    let den = tpr - fpr;
    if den == 0.0 {
        return if num > 0.0 { 1.0 } else { 0.0 };
    }
    let q = num / den;
    if q.is_nan() {
        0.0
    } else {
        q.clamp(0.0, 1.0)
    }
}

/// Fraction of scored documents predicted positive. With a threshold the
/// test is `x > threshold`, otherwise the classifier's own border.
fn positive_fraction(confidences: &Confidences, cat: CategoryId, threshold: Option<f64>) -> f64 {
    let n = confidences.document_count();
    if n == 0 {
        return 0.0;
    }
    let positives = confidences
        .document_ids()
        .filter_map(|doc| confidences.get(doc, cat))
        .filter(|s| match threshold {
            Some(t) => s.x() > t,
            None => s.is_positive(),
        })
        .count();
    positives as f64 / n as f64
}

fn mean_probability(confidences: &Confidences, cat: CategoryId, calibration: &Calibration) -> f64 {
    let n = confidences.document_count();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = confidences
        .document_ids()
        .filter_map(|doc| confidences.get(doc, cat))
        .map(|s| calibration.probability(cat, s.x()))
        .sum();
    sum / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ClassificationScore, DocId, Document};
    use proptest::prelude::*;

    struct Fixed;

    impl Classifier for Fixed {
        fn categories(&self) -> Vec<CategoryId> {
            vec![CategoryId(0)]
        }

        fn score(&self, _doc: &Document, _cat: CategoryId) -> ClassificationScore {
            ClassificationScore::new(0.0, 0.0, -1.0, 1.0)
        }
    }

    fn confidences(xs: &[f64]) -> Confidences {
        let mut conf = Confidences::new();
        for (i, x) in xs.iter().enumerate() {
            conf.insert(DocId(i as u32), CategoryId(0), ClassificationScore::new(*x, 0.0, -1.0, 1.0));
        }
        conf
    }

    #[test]
    fn adjust_inverts_the_bias() {
        // tpr 0.8, fpr 0.2, true prevalence 0.5 -> observed 0.5*0.8 + 0.5*0.2
        assert!((adjust(0.5, 0.8, 0.2) - 0.5).abs() < 1e-12);
        assert!((adjust(0.38, 0.8, 0.2) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn adjust_with_equal_rates_hits_a_bound() {
        assert_eq!(adjust(0.6, 0.4, 0.4), 1.0);
        assert_eq!(adjust(0.3, 0.4, 0.4), 0.0);
        assert_eq!(adjust(f64::NAN, 0.4, 0.1), 0.0);
    }

    #[test]
    fn cc_and_pa_count_every_document() {
        let classifier = Arc::new(Fixed);
        let conf = confidences(&[1.0, 0.5, -0.5, -1.0]);
        let cc = Quantifier::ClassifyAndCount {
            classifier: classifier.clone(),
            mode: ClassificationMode::PerDocument,
        };
        assert_eq!(cc.quantify_confidences(&conf).get(CategoryId(0)), Some(0.5));

        let pa = Quantifier::ProbabilisticAverage {
            classifier,
            mode: ClassificationMode::PerDocument,
            calibration: Calibration::default(),
        };
        // symmetric scores average to 0.5
        let v = pa.quantify_confidences(&conf).get(CategoryId(0)).unwrap();
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn max_uses_its_own_threshold() {
        let mut thresholds = IndexMap::new();
        thresholds.insert(
            CategoryId(0),
            MaxThreshold { threshold: 0.75, rates: Rates { tpr: 1.0, fpr: 0.0 } },
        );
        let max = Quantifier::Max {
            classifier: Arc::new(Fixed),
            mode: ClassificationMode::PerDocument,
            thresholds,
        };
        let q = max.quantify_confidences(&confidences(&[1.0, 0.5, -0.5, -1.0]));
        assert_eq!(q.get(CategoryId(0)), Some(0.25));
        assert_eq!(q.name, "MAX");
    }

    #[test]
    fn scaled_wrapper_corrects_its_inner_estimate() {
        let mut rates = IndexMap::new();
        rates.insert(CategoryId(0), Rates { tpr: 0.9, fpr: 0.1 });
        let scc = Quantifier::ScaledClassifyAndCount {
            inner: Box::new(Quantifier::ClassifyAndCount {
                classifier: Arc::new(Fixed),
                mode: ClassificationMode::PerDocument,
            }),
            rates,
        };
        let q = scc.quantify_confidences(&confidences(&[1.0, 0.5, -0.5, -1.0]));
        assert!((q.get(CategoryId(0)).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(scc.kind(), QuantifierKind::ScaledClassifyAndCount);
    }

    proptest! {
        #[test]
        fn adjusted_count_stays_in_unit_interval(
            tp in 0u32..50, fp in 0u32..50, fn_ in 0u32..50, tn in 0u32..50,
            tpr in 0.0f64..=1.0, fpr in 0.0f64..=1.0,
        ) {
            let n = tp + fp + fn_ + tn;
            prop_assume!(n > 0);
            let cc = (tp + fp) as f64 / n as f64;
            let v = adjust(cc, tpr, fpr);
            prop_assert!((0.0..=1.0).contains(&v));
        }
    }
}
