use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::Path,
    sync::Arc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{classify_index, ClassificationMode, Classifier, ClassifierDataManager, Learner},
    config::RateEstimatorConfig,
    error::{Error, Result},
    evaluation::ContingencyTableSet,
    index::{CategoryId, Index},
    progress::{Progress, ProgressRange},
    quantification::{
        rate::{RateEstimate, RateEstimates, RateEstimator},
        MaxThreshold, Quantification, Quantifier, QuantifierKind, Rates,
    },
};

const RATES_FILE: &str = "rates.cbor";

/// Trains the classifier and the rate estimates behind a quantifier pool.
pub struct QuantificationLearner<L> {
    learner: L,
    config: RateEstimatorConfig,
    mode: ClassificationMode,
}

impl<L> QuantificationLearner<L>
where
    L: Learner,
{
    pub fn new(learner: L, config: RateEstimatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            learner,
            config,
            mode: ClassificationMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: ClassificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    /// Estimate rates by cross-validation, train one classifier on the whole
    /// training index, and build the six quantifiers around both.
    pub fn learn(&self, training: &Index, progress: &mut dyn Progress) -> Result<QuantifierPool<L::Model>> {
        progress.report(0.0);
        let estimator = RateEstimator::new(&self.learner, self.config.clone())?;
        let rates = estimator.estimate(training, &mut ProgressRange::new(&mut *progress, 0.0, 80.0))?;

        log::info!("training final classifier on {} documents", training.document_count());
        let classifier = self.learner.build(training)?;
        progress.report(100.0);

        Ok(QuantifierPool::from_rates(Arc::new(classifier), rates, self.mode))
    }
}

/// The six quantifiers sharing one classifier and one set of rates.
pub struct QuantifierPool<C> {
    classifier: Arc<C>,
    mode: ClassificationMode,
    rates: RateEstimates,
    quantifiers: Vec<Quantifier<C>>,
}

#[derive(Serialize, Deserialize)]
struct PoolData {
    kinds: Vec<QuantifierKind>,
    mode: ClassificationMode,
    rates: RateEstimates,
}

impl<C> QuantifierPool<C>
where
    C: Classifier,
{
    pub fn from_rates(classifier: Arc<C>, rates: RateEstimates, mode: ClassificationMode) -> Self {
        Self::with_kinds(classifier, rates, mode, &QuantifierKind::ALL)
    }

    fn with_kinds(classifier: Arc<C>, rates: RateEstimates, mode: ClassificationMode, kinds: &[QuantifierKind]) -> Self {
        let quantifiers = kinds
            .iter()
            .map(|kind| build_quantifier(*kind, &classifier, &rates, mode))
            .collect();
        Self {
            classifier,
            mode,
            rates,
            quantifiers,
        }
    }

    pub fn classifier(&self) -> &Arc<C> {
        &self.classifier
    }

    pub fn mode(&self) -> ClassificationMode {
        self.mode
    }

    /// Rates and pooled contingency tables shared by every quantifier.
    pub fn rates(&self) -> &RateEstimates {
        &self.rates
    }

    /// Pooled cross-validation tables the rates were measured on.
    pub fn contingency_tables(&self) -> &ContingencyTableSet {
        &self.rates.tables
    }

    pub fn simple_tprs(&self) -> IndexMap<CategoryId, f64> {
        self.rates.simple_tprs()
    }

    pub fn simple_fprs(&self) -> IndexMap<CategoryId, f64> {
        self.rates.simple_fprs()
    }

    pub fn scaled_tprs(&self) -> IndexMap<CategoryId, f64> {
        self.rates.scaled_tprs()
    }

    pub fn scaled_fprs(&self) -> IndexMap<CategoryId, f64> {
        self.rates.scaled_fprs()
    }

    pub fn quantifiers(&self) -> &[Quantifier<C>] {
        &self.quantifiers
    }

    pub fn len(&self) -> usize {
        self.quantifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantifiers.is_empty()
    }

    pub fn get(&self, kind: QuantifierKind) -> Option<&Quantifier<C>> {
        self.quantifiers.iter().find(|q| q.kind() == kind)
    }

    /// Quantifier at `slot`, failing when it is not of the `expected` kind.
    pub fn slot(&self, slot: usize, expected: QuantifierKind) -> Result<&Quantifier<C>> {
        let q = self
            .quantifiers
            .get(slot)
            .ok_or_else(|| Error::invalid_config(format!("quantifier slot {slot} out of range ({} slots)", self.len())))?;
        if q.kind() != expected {
            return Err(Error::QuantifierSlot {
                slot,
                expected,
                found: q.kind(),
            });
        }
        Ok(q)
    }

    /// Classify `index` once and apply every quantifier to the scores.
    pub fn quantify_all(&self, index: &Index) -> Vec<Quantification> {
        let confidences = classify_index(self.classifier.as_ref(), index, self.mode);
        self.quantifiers
            .iter()
            .map(|q| q.quantify_confidences(&confidences))
            .collect()
    }

    /// Persist the classifier through `dm` and the rates with the slot
    /// layout as `rates.cbor` in `dir`.
    pub fn write<D>(&self, dir: &Path, dm: &D) -> Result<()>
    where
        D: ClassifierDataManager<C>,
    {
        dm.write(dir, self.classifier.as_ref())?;
        let data = PoolData {
            kinds: self.quantifiers.iter().map(Quantifier::kind).collect(),
            mode: self.mode,
            rates: self.rates.clone(),
        };
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join(RATES_FILE))?;
        serde_cbor::to_writer(BufWriter::new(file), &data)?;
        log::debug!("wrote {} quantifiers to {}", data.kinds.len(), dir.display());
        Ok(())
    }

    /// Rebuild a pool written by [`QuantifierPool::write`], classifying with
    /// `mode`.
    pub fn read<D>(dir: &Path, dm: &D, mode: ClassificationMode) -> Result<Self>
    where
        D: ClassifierDataManager<C>,
    {
        let classifier = dm.read(dir)?;
        let path = dir.join(RATES_FILE);
        let file = File::open(&path).map_err(|e| Error::resource("rates file", &path, e))?;
        let data: PoolData =
            serde_cbor::from_reader(BufReader::new(file)).map_err(|e| Error::resource("rates file", &path, e))?;
        Ok(Self::with_kinds(Arc::new(classifier), data.rates, mode, &data.kinds))
    }
}

fn build_quantifier<C>(
    kind: QuantifierKind,
    classifier: &Arc<C>,
    rates: &RateEstimates,
    mode: ClassificationMode,
) -> Quantifier<C>
where
    C: Classifier,
{
    let simple = || rate_map(rates, |e| Rates { tpr: e.simple_tpr, fpr: e.simple_fpr });
    let scaled = || rate_map(rates, |e| Rates { tpr: e.scaled_tpr, fpr: e.scaled_fpr });
    match kind {
        QuantifierKind::ClassifyAndCount => Quantifier::ClassifyAndCount {
            classifier: classifier.clone(),
            mode,
        },
        QuantifierKind::ProbabilisticAverage => Quantifier::ProbabilisticAverage {
            classifier: classifier.clone(),
            mode,
            calibration: rates.calibration(),
        },
        QuantifierKind::AdjustedCount => Quantifier::AdjustedCount {
            classifier: classifier.clone(),
            mode,
            rates: simple(),
        },
        QuantifierKind::Max => Quantifier::Max {
            classifier: classifier.clone(),
            mode,
            thresholds: rates
                .estimates
                .iter()
                .map(|(cat, e)| {
                    let max = MaxThreshold {
                        threshold: e.max_threshold,
                        rates: Rates { tpr: e.max_tpr, fpr: e.max_fpr },
                    };
                    (*cat, max)
                })
                .collect(),
        },
        QuantifierKind::ScaledClassifyAndCount => Quantifier::ScaledClassifyAndCount {
            inner: Box::new(build_quantifier(QuantifierKind::ClassifyAndCount, classifier, rates, mode)),
            rates: scaled(),
        },
        QuantifierKind::ScaledProbabilisticAverage => Quantifier::ScaledProbabilisticAverage {
            inner: Box::new(build_quantifier(QuantifierKind::ProbabilisticAverage, classifier, rates, mode)),
            rates: scaled(),
        },
    }
}

fn rate_map<F>(rates: &RateEstimates, f: F) -> IndexMap<CategoryId, Rates>
where
    F: Fn(&RateEstimate) -> Rates,
{
    rates.estimates.iter().map(|(cat, e)| (*cat, f(e))).collect()
}
