use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    evaluation::measure::{ratio, Aggregation, Measure},
    index::{CategoryId, Classification, DocId},
};

/// True/false positive/negative counts of one category.
///
/// `tp + fp + fn_ + tn` is the number of documents the table was built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    pub tp: u32,
    pub fp: u32,
    pub fn_: u32,
    pub tn: u32,
}

impl ContingencyTable {
    pub fn new(tp: u32, fp: u32, fn_: u32, tn: u32) -> Self {
        Self { tp, fp, fn_, tn }
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall, also the true positive rate.
    pub fn tpr(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn fpr(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    pub fn tnr(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f(&self, beta: f64) -> f64 {
        self.measure(&Measure::F(beta))
    }

    pub fn f1(&self) -> f64 {
        self.f(1.0)
    }

    pub fn measure(&self, measure: &Measure) -> f64 {
        let (tp, fp, fn_, tn) = self.as_f64();
        measure.of_counts(tp, fp, fn_, tn)
    }

    pub fn as_f64(&self) -> (f64, f64, f64, f64) {
        (self.tp as f64, self.fp as f64, self.fn_ as f64, self.tn as f64)
    }

    pub fn add(&mut self, other: &ContingencyTable) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.tn += other.tn;
    }

    /// Proportionally rescale the counts to sum to exactly `total`.
    /// Largest remainder apportionment: every cell gets the floor of its
    /// share, the leftover units go to the largest fractional parts (ties in
    /// tp, fp, fn, tn order).
    pub fn scaled_to(&self, total: u32) -> ContingencyTable {
        let current = self.total() as u64;
        if current == 0 {
            return ContingencyTable::new(0, 0, 0, total);
        }
        let cells = [self.tp, self.fp, self.fn_, self.tn];
        let mut out = [0u32; 4];
        let mut remainders = [0u64; 4];
        for (i, v) in cells.iter().enumerate() {
            let share = *v as u64 * total as u64;
            out[i] = (share / current) as u32;
            remainders[i] = share % current;
        }
        let leftover = total - out.iter().sum::<u32>();
        let mut order = [0usize, 1, 2, 3];
        order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));
        for i in order.iter().take(leftover as usize) {
            out[*i] += 1;
        }
        ContingencyTable::new(out[0], out[1], out[2], out[3])
    }

    /// Apply the cell transition caused by replacing a prediction with the
    /// true label. Returns `false` when the table lacks the count to move,
    /// which only happens for estimated tables.
    pub fn correct(&mut self, predicted: bool, actual: bool) -> bool {
        match (predicted, actual) {
            (true, false) => {
                if self.fp == 0 {
                    return false;
                }
                self.fp -= 1;
                self.tn += 1;
            }
            (false, true) => {
                if self.fn_ == 0 {
                    return false;
                }
                self.fn_ -= 1;
                self.tp += 1;
            }
            _ => {}
        }
        true
    }
}

/// Per-category tables plus their micro-averaged (summed) aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContingencyTableSet {
    name: String,
    tables: IndexMap<CategoryId, ContingencyTable>,
    global: ContingencyTable,
}

impl ContingencyTableSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn insert(&mut self, cat: CategoryId, table: ContingencyTable) {
        if let Some(old) = self.tables.insert(cat, table) {
            self.global.tp -= old.tp;
            self.global.fp -= old.fp;
            self.global.fn_ -= old.fn_;
            self.global.tn -= old.tn;
        }
        self.global.add(&table);
    }

    pub fn get(&self, cat: CategoryId) -> Option<&ContingencyTable> {
        self.tables.get(&cat)
    }

    /// Table of `cat`, all zeros when absent.
    pub fn table(&self, cat: CategoryId) -> ContingencyTable {
        self.tables.get(&cat).copied().unwrap_or_default()
    }

    pub fn global(&self) -> &ContingencyTable {
        &self.global
    }

    pub fn categories(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.tables.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &ContingencyTable)> {
        self.tables.iter().map(|(c, t)| (*c, t))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn macro_measure(&self, measure: &Measure) -> f64 {
        if self.tables.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.tables.values().map(|t| t.measure(measure)).sum();
        sum / self.tables.len() as f64
    }

    pub fn micro_measure(&self, measure: &Measure) -> f64 {
        self.global.measure(measure)
    }

    pub fn aggregate(&self, measure: &Measure, aggregation: Aggregation) -> f64 {
        match aggregation {
            Aggregation::Macro => self.macro_measure(measure),
            Aggregation::Micro => self.micro_measure(measure),
        }
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_measure(&Measure::F1)
    }

    /// Every table rescaled to `total` documents.
    pub fn scaled_to(&self, total: u32) -> ContingencyTableSet {
        let mut out = ContingencyTableSet::new(self.name.clone());
        for (cat, table) in &self.tables {
            out.insert(*cat, table.scaled_to(total));
        }
        out
    }

    /// Update the counts touched by replacing one document's predicted
    /// categories with its true ones. Cost is proportional to the number of
    /// categories on either side; categories outside the set are ignored.
    pub fn apply_correction(&mut self, predicted: &[CategoryId], actual: &[CategoryId]) {
        for cat in predicted.iter().filter(|c| !actual.contains(c)) {
            self.move_cell(*cat, true, false);
        }
        for cat in actual.iter().filter(|c| !predicted.contains(c)) {
            self.move_cell(*cat, false, true);
        }
    }

    fn move_cell(&mut self, cat: CategoryId, predicted: bool, actual: bool) {
        if let Some(table) = self.tables.get_mut(&cat) {
            if table.correct(predicted, actual) {
                self.global.correct(predicted, actual);
            }
        }
    }
}

/// Contingency tables of `predicted` against `truth` over `categories`.
///
/// The document universe is the union of the documents known to either
/// relation.
pub fn evaluate(
    predicted: &Classification,
    truth: &Classification,
    categories: &[CategoryId],
) -> ContingencyTableSet {
    let universe: IndexSet<DocId> = predicted.document_ids().chain(truth.document_ids()).collect();
    let n = universe.len() as u32;
    let mut set = ContingencyTableSet::new("evaluation");
    for cat in categories {
        let predicted_pos = predicted.count_of(*cat) as u32;
        let actual_pos = truth.count_of(*cat) as u32;
        let tp = predicted
            .documents_of(*cat)
            .filter(|doc| truth.contains(*doc, *cat))
            .count() as u32;
        let fp = predicted_pos - tp;
        let fn_ = actual_pos - tp;
        set.insert(*cat, ContingencyTable::new(tp, fp, fn_, n - tp - fp - fn_));
    }
    set
}

/// Evaluation where the documents in `corrected` are taken with their true
/// labels. Built from the plain evaluation by incremental corrections.
pub fn evaluate_mixed(
    predicted: &Classification,
    truth: &Classification,
    categories: &[CategoryId],
    corrected: &[DocId],
) -> ContingencyTableSet {
    let mut mixed = MixedEvaluation::new(predicted, truth, categories);
    for doc in corrected {
        mixed.correct(*doc);
    }
    mixed.into_tables()
}

/// Running evaluation over a growing set of corrected documents.
#[derive(Debug, Clone)]
pub struct MixedEvaluation<'a> {
    predicted: &'a Classification,
    truth: &'a Classification,
    tables: ContingencyTableSet,
    corrected: IndexSet<DocId>,
}

impl<'a> MixedEvaluation<'a> {
    pub fn new(
        predicted: &'a Classification,
        truth: &'a Classification,
        categories: &[CategoryId],
    ) -> Self {
        let mut tables = evaluate(predicted, truth, categories);
        tables.set_name("mixed");
        Self {
            predicted,
            truth,
            tables,
            corrected: IndexSet::new(),
        }
    }

    /// Replace `doc`'s prediction by its true label. Returns `false` if it
    /// was already corrected.
    pub fn correct(&mut self, doc: DocId) -> bool {
        if !self.corrected.insert(doc) {
            return false;
        }
        self.tables
            .apply_correction(self.predicted.categories_of(doc), self.truth.categories_of(doc));
        true
    }

    pub fn is_corrected(&self, doc: DocId) -> bool {
        self.corrected.contains(&doc)
    }

    pub fn corrected(&self) -> impl Iterator<Item = DocId> + '_ {
        self.corrected.iter().copied()
    }

    pub fn tables(&self) -> &ContingencyTableSet {
        &self.tables
    }

    pub fn into_tables(self) -> ContingencyTableSet {
        self.tables
    }
}
