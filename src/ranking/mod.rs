//! Simulated correction ranking.
//!
//! A [`Simulation`] orders the test documents for manual correction and
//! replays that order one document at a time, recording the evaluation
//! measure after every correction. Batch policies compute the whole order
//! up front; incremental policies pick each document on the evaluation
//! state left by the previous correction.

pub mod active;
pub mod gain;
pub mod output;
pub mod policy;
pub mod utility;

use std::collections::VecDeque;

use indexmap::IndexSet;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    config::RankingConfig,
    error::{Error, Result},
    evaluation::{ContingencyTable, ContingencyTableSet, MixedEvaluation},
    index::{CategoryId, Classification, Confidences, DocId, Index},
    progress::{CancellationToken, Progress},
    quantification::Calibration,
};

pub use active::{ActiveLearningStrategy, Adaptive, LabelCardinalityInconsistency, MaxMarginUncertainty};
pub use gain::GainFunction;
pub use output::{FullReportWriter, LightWriter, NullSink, StepSink};
pub use policy::{ActiveStrategy, Policy};
pub use utility::{confidence_rank, ErrorModel, UtilityRanker};

/// Everything a simulation reads. Nothing here is modified.
#[derive(Clone, Copy)]
pub struct RankingInput<'a> {
    pub predicted: &'a Classification,
    pub truth: &'a Classification,
    pub confidences: &'a Confidences,
    pub calibration: &'a Calibration,
    /// Estimated contingency tables, e.g. pooled cross-validation tables
    pub estimated: &'a ContingencyTableSet,
    /// Labelled set for active-learning policies
    pub training: Option<&'a Index>,
    /// Category universe
    pub categories: &'a [CategoryId],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Init,
    /// Batch order computed, being replayed
    RankComputed,
    /// Incremental selection in progress
    Ranking,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    Completed,
    /// The initial evaluation was already perfect
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    /// Corrected documents in correction order
    pub rank: Vec<DocId>,
    /// Measure before any correction followed by one value per correction
    pub measures: Vec<f64>,
    pub status: SimulationStatus,
}

pub struct Simulation<'a> {
    input: RankingInput<'a>,
    config: RankingConfig,
    categories: Vec<CategoryId>,
    documents: Vec<DocId>,
    mixed: MixedEvaluation<'a>,
    estimated: ContingencyTableSet,
    state: SimulationState,
    pending: VecDeque<DocId>,
    remaining: Vec<DocId>,
    rank: Vec<DocId>,
    measures: Vec<f64>,
    skipped: bool,
}

impl<'a> Simulation<'a> {
    pub fn new(input: RankingInput<'a>, config: RankingConfig) -> Result<Self> {
        config.validate()?;
        if config.policy.needs_training() && input.training.is_none() {
            return Err(Error::invalid_config(format!(
                "policy {} needs the training index",
                config.policy
            )));
        }

        let categories = match &config.categories {
            Some(filter) => {
                if let Some(missing) = filter.iter().find(|c| !input.categories.contains(c)) {
                    return Err(Error::UnknownCategory(missing.0));
                }
                filter.clone()
            }
            None => input.categories.to_vec(),
        };
        let documents: Vec<DocId> = input
            .predicted
            .document_ids()
            .chain(input.truth.document_ids())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        let mut estimated = ContingencyTableSet::new("estimated");
        for cat in &categories {
            estimated.insert(*cat, input.estimated.table(*cat));
        }
        if let Some(size) = config.training_size {
            if estimated.iter().any(|(_, t)| t.total() as usize != size) {
                log::warn!("estimated tables do not sum to the training size {size}");
            }
            estimated = estimated.scaled_to(documents.len() as u32);
        }

        let mixed = MixedEvaluation::new(input.predicted, input.truth, &categories);
        log::debug!(
            "simulation: {} documents, {} categories, policy {}",
            documents.len(),
            categories.len(),
            config.policy
        );
        Ok(Self {
            input,
            config,
            categories,
            documents,
            mixed,
            estimated,
            state: SimulationState::Init,
            pending: VecDeque::new(),
            remaining: Vec::new(),
            rank: Vec::new(),
            measures: Vec::new(),
            skipped: false,
        })
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn rank(&self) -> &[DocId] {
        &self.rank
    }

    pub fn measures(&self) -> &[f64] {
        &self.measures
    }

    /// True evaluation with the corrections made so far.
    pub fn current_tables(&self) -> &ContingencyTableSet {
        self.mixed.tables()
    }

    /// Estimated evaluation, updated with every revealed label.
    pub fn estimated_tables(&self) -> &ContingencyTableSet {
        &self.estimated
    }

    /// Advance by one transition. Returns the document corrected by this
    /// step, if any.
    pub fn step(&mut self, sink: &mut dyn StepSink) -> Result<Option<DocId>> {
        match self.state {
            SimulationState::Init => {
                self.start(sink)?;
                Ok(None)
            }
            SimulationState::RankComputed => match self.pending.pop_front() {
                Some(doc) => {
                    self.apply(doc, sink)?;
                    Ok(Some(doc))
                }
                None => {
                    self.state = SimulationState::Done;
                    Ok(None)
                }
            },
            SimulationState::Ranking => match self.next_incremental() {
                Some(pos) => {
                    let doc = self.remaining.remove(pos);
                    self.apply(doc, sink)?;
                    Ok(Some(doc))
                }
                None => {
                    self.state = SimulationState::Done;
                    Ok(None)
                }
            },
            SimulationState::Done => Ok(None),
        }
    }

    /// Run to completion, checking `cancel` before every step.
    pub fn run(
        mut self,
        progress: &mut dyn Progress,
        cancel: &CancellationToken,
        sink: &mut dyn StepSink,
    ) -> Result<SimulationOutcome> {
        progress.report(0.0);
        let total = self.documents.len().max(1) as f64;
        while self.state != SimulationState::Done {
            if cancel.is_cancelled() {
                log::warn!("ranking cancelled after {} corrections", self.rank.len());
                sink.finish(&self.measures)?;
                return Ok(self.into_outcome(SimulationStatus::Cancelled));
            }
            if self.step(sink)?.is_some() {
                progress.report(100.0 * self.rank.len() as f64 / total);
            }
        }
        let status = if self.skipped {
            SimulationStatus::Skipped
        } else {
            sink.finish(&self.measures)?;
            SimulationStatus::Completed
        };
        progress.report(100.0);
        Ok(self.into_outcome(status))
    }

    fn into_outcome(self, status: SimulationStatus) -> SimulationOutcome {
        SimulationOutcome {
            rank: self.rank,
            measures: self.measures,
            status,
        }
    }

    fn current_value(&self) -> f64 {
        self.mixed
            .tables()
            .aggregate(&self.config.measure, self.config.aggregation)
    }

    fn start(&mut self, sink: &mut dyn StepSink) -> Result<()> {
        let initial = self.current_value();
        self.measures.push(initial);
        if self.mixed.tables().macro_f1() == 1.0 {
            log::info!("initial macro F1 is 1, nothing to correct");
            self.skipped = true;
            self.state = SimulationState::Done;
            return Ok(());
        }
        sink.step(0, None, self.mixed.tables(), initial)?;

        if self.config.policy.is_incremental() {
            self.remaining = self.documents.clone();
            self.state = SimulationState::Ranking;
        } else {
            self.pending = self.batch_rank()?.into();
            self.state = SimulationState::RankComputed;
        }
        Ok(())
    }

    /// Full order computed once from the initial tables. For an incremental
    /// policy this is the order its first pick is taken from.
    fn batch_rank(&self) -> Result<Vec<DocId>> {
        let order = match self.config.policy {
            Policy::Random { seed } => {
                let mut docs = self.documents.clone();
                docs.shuffle(&mut StdRng::seed_from_u64(seed));
                docs
            }
            Policy::Confidence { top_n, oracle } => {
                confidence_rank(&self.errors(oracle), &self.documents, &self.categories, top_n, oracle)
            }
            Policy::Utility { gain, oracle_confidence } | Policy::Incremental { gain, oracle_confidence } => {
                self.ranker(gain, oracle_confidence)
                    .rank_all(&self.documents, self.gain_tables(gain))
            }
            Policy::ActiveLearning(strategy) => {
                let training = self
                    .input
                    .training
                    .ok_or_else(|| Error::invalid_config("active-learning policy needs the training index"))?;
                let ranked = strategy
                    .strategy()
                    .rank(self.input.confidences, training, Some(self.input.predicted), None)?;
                active::complete_rank(ranked, &self.documents)
            }
        };
        Ok(order)
    }

    fn next_incremental(&self) -> Option<usize> {
        match self.config.policy {
            Policy::Incremental { gain, oracle_confidence } => self
                .ranker(gain, oracle_confidence)
                .next(&self.remaining, self.gain_tables(gain)),
            _ => None,
        }
    }

    fn errors(&self, oracle: bool) -> ErrorModel<'a> {
        ErrorModel::new(
            self.input.predicted,
            self.input.truth,
            self.input.confidences,
            self.input.calibration,
            oracle,
        )
    }

    fn ranker(&self, gain: GainFunction, oracle_confidence: bool) -> UtilityRanker<'_> {
        UtilityRanker::new(
            self.errors(oracle_confidence),
            &self.categories,
            self.config.measure,
            self.config.aggregation,
            gain,
        )
    }

    /// Tables a gain function is evaluated on: the current true ones for
    /// oracle gains, the estimated ones otherwise.
    fn gain_tables(&self, gain: GainFunction) -> &ContingencyTableSet {
        if gain.uses_true_table() {
            self.mixed.tables()
        } else {
            &self.estimated
        }
    }

    fn apply(&mut self, doc: DocId, sink: &mut dyn StepSink) -> Result<()> {
        self.mixed.correct(doc);
        self.estimated.apply_correction(
            self.input.predicted.categories_of(doc),
            self.input.truth.categories_of(doc),
        );
        let value = self.current_value();
        self.rank.push(doc);
        self.measures.push(value);
        sink.step(self.rank.len(), Some(doc), self.mixed.tables(), value)
    }
}

/// Contingency tables expected from calibrated probabilities: a predicted
/// positive with probability `p` counts `p` as true positive, a predicted
/// negative counts `p` as false negative. Expected counts are rounded within
/// the predicted positive and negative totals.
pub fn expected_tables(
    predicted: &Classification,
    confidences: &Confidences,
    calibration: &Calibration,
    categories: &[CategoryId],
) -> ContingencyTableSet {
    let n = confidences.document_count() as u32;
    let mut set = ContingencyTableSet::new("expected");
    for cat in categories {
        let (mut tp, mut fn_) = (0.0, 0.0);
        let mut positives = 0u32;
        for doc in confidences.document_ids() {
            let p = confidences
                .get(doc, *cat)
                .map_or(0.0, |s| calibration.probability(*cat, s.x()));
            if predicted.contains(doc, *cat) {
                positives += 1;
                tp += p;
            } else {
                fn_ += p;
            }
        }
        let negatives = n.saturating_sub(positives);
        let tp = (tp.round() as u32).min(positives);
        let fn_ = (fn_.round() as u32).min(negatives);
        set.insert(*cat, ContingencyTable::new(tp, positives - tp, fn_, negatives - fn_));
    }
    set
}
