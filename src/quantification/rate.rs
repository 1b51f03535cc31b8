//! Cross-validated estimation of true and false positive rates.
//!
//! The training documents are split into contiguous folds in index order.
//! Every fold is classified by a model trained on the remaining folds, so
//! each document ends up with exactly one out-of-fold prediction. Rates are
//! measured on that pooled prediction.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{classify_index, ClassificationMode, Learner},
    config::{RateEstimatorConfig, SigmaScope},
    error::{Error, Result},
    evaluation::{evaluate, ContingencyTable, ContingencyTableSet},
    index::{CategoryId, Classification, Confidences, DocId, Index},
    progress::Progress,
    quantification::logistic::{Calibration, LogisticFunction},
};

/// Rates of one category, measured on pooled out-of-fold predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub table: ContingencyTable,
    pub simple_tpr: f64,
    pub simple_fpr: f64,
    pub scaled_tpr: f64,
    pub scaled_fpr: f64,
    pub logistic: LogisticFunction,
    /// Threshold on `score - border` maximising `tpr - fpr`
    pub max_threshold: f64,
    pub max_tpr: f64,
    pub max_fpr: f64,
}

/// Per-category rates produced by one cross-validation run. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEstimates {
    pub folds: usize,
    pub estimates: IndexMap<CategoryId, RateEstimate>,
    pub tables: ContingencyTableSet,
}

impl RateEstimates {
    pub fn get(&self, cat: CategoryId) -> Option<&RateEstimate> {
        self.estimates.get(&cat)
    }

    pub fn categories(&self) -> Vec<CategoryId> {
        self.estimates.keys().copied().collect()
    }

    pub fn simple_tprs(&self) -> IndexMap<CategoryId, f64> {
        self.map(|e| e.simple_tpr)
    }

    pub fn simple_fprs(&self) -> IndexMap<CategoryId, f64> {
        self.map(|e| e.simple_fpr)
    }

    pub fn scaled_tprs(&self) -> IndexMap<CategoryId, f64> {
        self.map(|e| e.scaled_tpr)
    }

    pub fn scaled_fprs(&self) -> IndexMap<CategoryId, f64> {
        self.map(|e| e.scaled_fpr)
    }

    /// Logistic functions fitted during estimation.
    pub fn calibration(&self) -> Calibration {
        let mut cal = Calibration::default();
        for (cat, e) in &self.estimates {
            cal.insert(*cat, e.logistic);
        }
        cal
    }

    fn map<F>(&self, f: F) -> IndexMap<CategoryId, f64>
    where
        F: Fn(&RateEstimate) -> f64,
    {
        self.estimates.iter().map(|(c, e)| (*c, f(e))).collect()
    }
}

/// True labels and out-of-fold confidences of one fold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoldResult {
    pub truth: Classification,
    pub confidences: Confidences,
}

pub struct RateEstimator<'l, L>
where
    L: Learner,
{
    learner: &'l L,
    config: RateEstimatorConfig,
    pool: rayon::ThreadPool,
}

impl<'l, L> RateEstimator<'l, L>
where
    L: Learner,
{
    pub fn new(learner: &'l L, config: RateEstimatorConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("rate-fold-{i}"))
            .build()
            .map_err(|e| Error::invalid_config(format!("cannot build fold thread pool: {e}")))?;
        Ok(Self {
            learner,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &RateEstimatorConfig {
        &self.config
    }

    /// Run k-fold cross-validation on `training` and measure rates.
    pub fn estimate(&self, training: &Index, progress: &mut dyn Progress) -> Result<RateEstimates> {
        progress.report(0.0);
        let docs = training.document_ids();
        let folds = split_folds(&docs, self.config.folds);
        log::info!(
            "rate estimation: {} documents, {} folds requested, {} used",
            docs.len(),
            self.config.folds,
            folds.len()
        );

        // fork/join: pooling starts only after every fold is classified
        let results: Vec<FoldResult> = self.pool.install(|| {
            (0..folds.len())
                .into_par_iter()
                .map(|e| self.fold(training, &folds, e))
                .collect::<Result<Vec<_>>>()
        })?;
        progress.report(80.0);

        let mut pooled = FoldResult::default();
        for result in results {
            pooled.truth.extend(&result.truth);
            pooled.confidences.extend(result.confidences);
        }

        let estimates = rates_from_pool(&pooled, &training.category_ids(), self.config.sigma_scope, folds.len());
        progress.report(100.0);
        Ok(estimates)
    }

    fn fold(&self, training: &Index, folds: &[Vec<DocId>], e: usize) -> Result<FoldResult> {
        let cache = self.cache_path(e, folds.len());
        if let Some(path) = cache.as_deref() {
            if path.exists() && !self.config.overwrite_cache {
                log::debug!("fold {e}: using cached predictions {}", path.display());
                return read_fold(path);
            }
        }

        let held_out = &folds[e];
        let model = self.learner.build(&training.without(held_out))?;
        let test = training.subset(held_out);
        let result = FoldResult {
            truth: test.classification().clone(),
            confidences: classify_index(&model, &test, ClassificationMode::PerDocument),
        };
        log::debug!("fold {e}: classified {} held-out documents", held_out.len());

        if let Some(path) = cache.as_deref() {
            write_fold(path, &result)?;
        }
        Ok(result)
    }

    fn cache_path(&self, e: usize, k: usize) -> Option<PathBuf> {
        self.config
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("fold-{e}-of-{k}-{}.cbor", self.learner.tag())))
    }
}

/// Contiguous folds of `⌊n/k⌋` documents, remainder appended to the last.
/// The fold count is reduced to the document count when it is larger.
pub fn split_folds(docs: &[DocId], requested: usize) -> Vec<Vec<DocId>> {
    let k = requested.min(docs.len());
    if k == 0 {
        return Vec::new();
    }
    let size = docs.len() / k;
    (0..k)
        .map(|e| {
            let end = if e + 1 == k { docs.len() } else { (e + 1) * size };
            docs[e * size..end].to_vec()
        })
        .collect()
}

/// Measure every category's rates on pooled out-of-fold predictions.
pub fn rates_from_pool(
    pooled: &FoldResult,
    categories: &[CategoryId],
    scope: SigmaScope,
    folds: usize,
) -> RateEstimates {
    let predicted = pooled.confidences.to_classification();
    let mut tables = evaluate(&predicted, &pooled.truth, categories);
    tables.set_name("cross-validation");

    // (x, truly positive) per category
    let samples: Vec<Vec<(f64, bool)>> = categories
        .iter()
        .map(|cat| {
            pooled
                .confidences
                .document_ids()
                .filter_map(|doc| {
                    pooled
                        .confidences
                        .get(doc, *cat)
                        .map(|s| (s.x(), pooled.truth.contains(doc, *cat)))
                })
                .collect()
        })
        .collect();

    let logistics: Vec<LogisticFunction> = match scope {
        SigmaScope::PerCategory => samples.iter().map(|s| fit_logistic(s)).collect(),
        SigmaScope::Global => {
            let all: Vec<(Vec<f64>, usize)> = samples
                .iter()
                .map(|s| (s.iter().map(|(x, _)| *x).collect(), s.iter().filter(|(_, p)| *p).count()))
                .collect();
            vec![LogisticFunction::fit_global(&all); categories.len()]
        }
    };

    let mut estimates = IndexMap::new();
    for ((cat, sample), logistic) in categories.iter().zip(&samples).zip(logistics) {
        let table = tables.table(*cat);
        let (scaled_tpr, scaled_fpr) = scaled_rates(sample, &logistic);
        let (max_threshold, max_tpr, max_fpr) = max_threshold(sample);
        estimates.insert(
            *cat,
            RateEstimate {
                table,
                simple_tpr: table.tpr(),
                simple_fpr: table.fpr(),
                scaled_tpr,
                scaled_fpr,
                logistic,
                max_threshold,
                max_tpr,
                max_fpr,
            },
        );
    }
    RateEstimates {
        folds,
        estimates,
        tables,
    }
}

fn fit_logistic(sample: &[(f64, bool)]) -> LogisticFunction {
    let xs: Vec<f64> = sample.iter().map(|(x, _)| *x).collect();
    let positives = sample.iter().filter(|(_, p)| *p).count();
    LogisticFunction::fit(&xs, positives)
}

/// Mean rescaled probability over the truly positive and truly negative
/// documents. A side with no documents yields 0.
fn scaled_rates(sample: &[(f64, bool)], logistic: &LogisticFunction) -> (f64, f64) {
    let (mut pos_sum, mut pos_n, mut neg_sum, mut neg_n) = (0.0, 0usize, 0.0, 0usize);
    for (x, positive) in sample {
        let p = logistic.probability(*x);
        if *positive {
            pos_sum += p;
            pos_n += 1;
        } else {
            neg_sum += p;
            neg_n += 1;
        }
    }
    let mean = |sum: f64, n: usize| if n == 0 { 0.0 } else { sum / n as f64 };
    (mean(pos_sum, pos_n), mean(neg_sum, neg_n))
}

/// Threshold on `x` maximising `tpr - fpr`, starting from the classifier's
/// own border (threshold 0) and moving only on strict improvement.
fn max_threshold(sample: &[(f64, bool)]) -> (f64, f64, f64) {
    let positives = sample.iter().filter(|(_, p)| *p).count();
    let negatives = sample.len() - positives;
    let rates = |t: f64| {
        let (mut tp, mut fp) = (0usize, 0usize);
        for (x, positive) in sample {
            if *x > t {
                if *positive {
                    tp += 1;
                } else {
                    fp += 1;
                }
            }
        }
        (
            if positives == 0 { 0.0 } else { tp as f64 / positives as f64 },
            if negatives == 0 { 0.0 } else { fp as f64 / negatives as f64 },
        )
    };

    let (tpr0, fpr0) = rates(0.0);
    let mut best = (0.0, tpr0, fpr0);
    let mut best_diff = tpr0 - fpr0;

    // sweep distinct values from the highest down: predicting positive for
    // x > v grows the counts monotonically
    let mut sorted: Vec<(f64, bool)> = sample.iter().copied().filter(|(x, _)| !x.is_nan()).collect();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < sorted.len() {
        let v = sorted[i].0;
        let tpr = if positives == 0 { 0.0 } else { tp as f64 / positives as f64 };
        let fpr = if negatives == 0 { 0.0 } else { fp as f64 / negatives as f64 };
        if tpr - fpr > best_diff + 1e-12 {
            best = (v, tpr, fpr);
            best_diff = tpr - fpr;
        }
        while i < sorted.len() && sorted[i].0 == v {
            if sorted[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
    }
    best
}

fn read_fold(path: &Path) -> Result<FoldResult> {
    let file = File::open(path).map_err(|e| Error::resource("fold cache", path, e))?;
    serde_cbor::from_reader(BufReader::new(file)).map_err(|e| Error::resource("fold cache", path, e))
}

fn write_fold(path: &Path, result: &FoldResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_cbor::to_writer(BufWriter::new(file), result)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::Classifier,
        index::{ClassificationScore, Document},
        progress::NoProgress,
        utils::math::vector::SparseVector,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Predicts category 0 when feature 0 is set, ignores training data.
    struct FixedRule;
    struct FixedLearner {
        builds: AtomicUsize,
    }

    impl Classifier for FixedRule {
        fn categories(&self) -> Vec<CategoryId> {
            vec![CategoryId(0), CategoryId(1)]
        }

        fn score(&self, doc: &Document, cat: CategoryId) -> ClassificationScore {
            let score = if cat == CategoryId(0) { doc.features.get(0) - 0.5 } else { -1.0 };
            ClassificationScore::new(score, 0.0, -1.0, 1.0)
        }
    }

    impl Learner for FixedLearner {
        type Model = FixedRule;

        fn build(&self, _training: &Index) -> Result<FixedRule> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(FixedRule)
        }

        fn tag(&self) -> String {
            "fixed".into()
        }
    }

    fn learner() -> FixedLearner {
        FixedLearner { builds: AtomicUsize::new(0) }
    }

    /// docs 0..6: feature 0 set on 0,1,2,3; true category 0 on 0,1,4
    fn training() -> Index {
        let mut index = Index::new();
        index.add_category(CategoryId(0), "c0");
        index.add_category(CategoryId(1), "c1");
        for i in 0..6u32 {
            let features = if i < 4 { vec![(0, 1.0)] } else { vec![(1, 1.0)] };
            let labels = if [0, 1, 4].contains(&i) { vec![CategoryId(0)] } else { vec![] };
            let doc = Document { name: format!("d{i}"), features: SparseVector::from_pairs(features) };
            index.add_document(DocId(i), doc, &labels);
        }
        index
    }

    #[test]
    fn folds_are_contiguous_with_remainder_last() {
        let docs: Vec<DocId> = (0..7).map(DocId).collect();
        let folds = split_folds(&docs, 3);
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0], vec![DocId(0), DocId(1)]);
        assert_eq!(folds[2], vec![DocId(4), DocId(5), DocId(6)]);
    }

    #[test]
    fn fold_count_is_capped_by_document_count() {
        let docs: Vec<DocId> = (0..3).map(DocId).collect();
        let folds = split_folds(&docs, 4);
        assert_eq!(folds.len(), 3);
        assert!(folds.iter().all(|f| f.len() == 1));
        assert!(split_folds(&[], 5).is_empty());
    }

    #[test]
    fn simple_rates_come_from_pooled_table() {
        let learner = learner();
        let config = RateEstimatorConfig { folds: 3, threads: 2, ..Default::default() };
        let estimator = RateEstimator::new(&learner, config).unwrap();
        let rates = estimator.estimate(&training(), &mut NoProgress).unwrap();

        assert_eq!(learner.builds.load(Ordering::SeqCst), 3);
        let c0 = rates.get(CategoryId(0)).unwrap();
        // predicted 0,1,2,3 ; true 0,1,4
        assert_eq!(c0.table, ContingencyTable::new(2, 2, 1, 1));
        assert!((c0.simple_tpr - 2.0 / 3.0).abs() < 1e-12);
        assert!((c0.simple_fpr - 2.0 / 3.0).abs() < 1e-12);
        assert!(c0.scaled_tpr > 0.0 && c0.scaled_tpr < 1.0);
        assert_eq!(rates.tables.table(CategoryId(0)).total(), 6);
    }

    #[test]
    fn category_without_positives_has_zero_tpr() {
        let learner = learner();
        let estimator = RateEstimator::new(&learner, RateEstimatorConfig { folds: 2, ..Default::default() }).unwrap();
        let rates = estimator.estimate(&training(), &mut NoProgress).unwrap();
        let c1 = rates.get(CategoryId(1)).unwrap();
        assert_eq!(c1.simple_tpr, 0.0);
        assert_eq!(c1.scaled_tpr, 0.0);
        assert!(!c1.simple_tpr.is_nan());
    }

    #[test]
    fn max_threshold_prefers_the_widest_gap() {
        // positives sit above 0.5, negatives below, border at 0 lets two negatives in
        let sample = [(0.9, true), (0.7, true), (0.3, false), (0.1, false), (-0.5, false)];
        let (t, tpr, fpr) = max_threshold(&sample);
        assert_eq!((tpr, fpr), (1.0, 0.0));
        assert!((0.3..0.7).contains(&t));
    }

    #[test]
    fn cached_folds_skip_training_unless_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = RateEstimatorConfig {
            folds: 2,
            cache_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let first = learner();
        let a = RateEstimator::new(&first, config.clone()).unwrap().estimate(&training(), &mut NoProgress).unwrap();
        assert_eq!(first.builds.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("fold-0-of-2-fixed.cbor").exists());

        let second = learner();
        let b = RateEstimator::new(&second, config.clone()).unwrap().estimate(&training(), &mut NoProgress).unwrap();
        assert_eq!(second.builds.load(Ordering::SeqCst), 0);
        assert_eq!(a, b);

        let third = learner();
        let overwrite = RateEstimatorConfig { overwrite_cache: true, ..config };
        RateEstimator::new(&third, overwrite).unwrap().estimate(&training(), &mut NoProgress).unwrap();
        assert_eq!(third.builds.load(Ordering::SeqCst), 2);
    }

    /// Two categories scored over five documents, truth per category.
    fn two_category_pool() -> FoldResult {
        let rows = [
            ([0.8, -0.5], [true, false]),
            ([0.6, 0.3], [true, false]),
            ([-0.1, 0.4], [false, true]),
            ([-0.2, -0.7], [false, false]),
            ([-0.9, 0.1], [false, false]),
        ];
        let mut pooled = FoldResult::default();
        for (i, (xs, labels)) in rows.iter().enumerate() {
            let doc = DocId(i as u32);
            let mut truth = Vec::new();
            for c in 0..2u32 {
                let cat = CategoryId(c);
                pooled
                    .confidences
                    .insert(doc, cat, ClassificationScore::new(xs[c as usize], 0.0, -1.0, 1.0));
                if labels[c as usize] {
                    truth.push(cat);
                }
            }
            pooled.truth.assign(doc, truth);
        }
        pooled
    }

    #[test]
    fn global_sigma_is_shared_and_fitted() {
        let pooled = two_category_pool();
        let cats = [CategoryId(0), CategoryId(1)];
        let rates = rates_from_pool(&pooled, &cats, SigmaScope::Global, 1);
        let sigma = rates.get(cats[0]).unwrap().logistic.sigma;
        assert_eq!(rates.get(cats[1]).unwrap().logistic.sigma, sigma);

        let summed_error = |sigma: f64| -> f64 {
            let f = LogisticFunction::new(sigma);
            cats.iter()
                .map(|cat| {
                    let count = pooled.truth.count_of(*cat) as f64;
                    let mass: f64 = pooled
                        .confidences
                        .document_ids()
                        .filter_map(|doc| pooled.confidences.get(doc, *cat))
                        .map(|s| f.probability(s.x()))
                        .sum();
                    (count - mass).abs()
                })
                .sum()
        };
        let fitted = summed_error(sigma);
        for candidate in [1e-4, 1e-2, 1e-1, 1.0, 1e2] {
            assert!(fitted <= summed_error(candidate) + 1e-12, "sigma {sigma} vs {candidate}");
        }

        let per_category = rates_from_pool(&pooled, &cats, SigmaScope::PerCategory, 1);
        assert_ne!(
            per_category.get(cats[0]).unwrap().logistic,
            per_category.get(cats[1]).unwrap().logistic
        );
    }

    #[test]
    fn missing_fold_cache_names_the_resource() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fold-0-of-2-fixed.cbor");
        match read_fold(&path) {
            Err(Error::Resource { resource, path: p, .. }) => {
                assert_eq!(resource, "fold cache");
                assert_eq!(p, path);
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn progress_runs_from_zero_to_hundred() {
        let learner = learner();
        let estimator = RateEstimator::new(&learner, RateEstimatorConfig { folds: 2, ..Default::default() }).unwrap();
        let mut seen = Vec::new();
        estimator.estimate(&training(), &mut |p: f64| seen.push(p)).unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
    }
}
