//! Gain functions scoring a candidate correction.
//!
//! Every function is a pure function of the tables it is given plus the
//! configured measure, so the ranking engine may call them in any order.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    evaluation::{Aggregation, ContingencyTable, ContingencyTableSet, Measure},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainFunction {
    /// Delta of the measure on the estimated tables
    #[default]
    Gain,
    /// Delta of the measure on the true tables
    GainOracle,
    /// Mean of the macro and micro deltas
    GainAvg,
    GainOracleAvg,
    /// Delta with every cell incremented by one
    GainSmooth1,
    GainSmooth1Avg,
}

impl GainFunction {
    pub const ALL: [GainFunction; 6] = [
        GainFunction::Gain,
        GainFunction::GainOracle,
        GainFunction::GainAvg,
        GainFunction::GainOracleAvg,
        GainFunction::GainSmooth1,
        GainFunction::GainSmooth1Avg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GainFunction::Gain => "gain",
            GainFunction::GainOracle => "gainOracle",
            GainFunction::GainAvg => "gainAvg",
            GainFunction::GainOracleAvg => "gainOracleAvg",
            GainFunction::GainSmooth1 => "gainSmooth1",
            GainFunction::GainSmooth1Avg => "gainSmooth1Avg",
        }
    }

    /// Whether the gain is computed on the true tables instead of the
    /// estimated ones.
    pub fn uses_true_table(&self) -> bool {
        matches!(self, GainFunction::GainOracle | GainFunction::GainOracleAvg)
    }

    pub fn averaged(&self) -> bool {
        matches!(
            self,
            GainFunction::GainAvg | GainFunction::GainOracleAvg | GainFunction::GainSmooth1Avg
        )
    }

    /// Pseudo-count added to every cell before evaluating the measure.
    pub fn smoothing(&self) -> f64 {
        match self {
            GainFunction::GainSmooth1 | GainFunction::GainSmooth1Avg => 1.0,
            _ => 0.0,
        }
    }

    /// Measure delta between two table sets.
    pub fn gain(
        &self,
        measure: &Measure,
        aggregation: Aggregation,
        before: &ContingencyTableSet,
        after: &ContingencyTableSet,
    ) -> f64 {
        self.value(measure, aggregation, after) - self.value(measure, aggregation, before)
    }

    fn value(&self, measure: &Measure, aggregation: Aggregation, set: &ContingencyTableSet) -> f64 {
        let s = self.smoothing();
        let macro_value = || {
            if set.is_empty() {
                0.0
            } else {
                set.iter().map(|(_, t)| smoothed(measure, counts(t), s)).sum::<f64>() / set.len() as f64
            }
        };
        let micro_value = || smoothed(measure, counts(set.global()), s);
        if self.averaged() {
            (macro_value() + micro_value()) / 2.0
        } else {
            match aggregation {
                Aggregation::Macro => macro_value(),
                Aggregation::Micro => micro_value(),
            }
        }
    }

    /// Gain of correcting a single wrong cell of one category: a false
    /// positive when `predicted` is true, a false negative otherwise.
    ///
    /// Equals [`GainFunction::gain`] on the set before and after that single
    /// move. A cell the tables hold no count for yields 0.
    pub fn cell_gain(
        &self,
        measure: &Measure,
        aggregation: Aggregation,
        table: &ContingencyTable,
        global: &ContingencyTable,
        n_categories: usize,
        predicted: bool,
    ) -> f64 {
        let (Some(after), Some(global_after)) = (moved(table, predicted), moved(global, predicted)) else {
            return 0.0;
        };
        let s = self.smoothing();
        let macro_delta = || {
            if n_categories == 0 {
                0.0
            } else {
                (smoothed(measure, after, s) - smoothed(measure, counts(table), s)) / n_categories as f64
            }
        };
        let micro_delta = || smoothed(measure, global_after, s) - smoothed(measure, counts(global), s);
        if self.averaged() {
            (macro_delta() + micro_delta()) / 2.0
        } else {
            match aggregation {
                Aggregation::Macro => macro_delta(),
                Aggregation::Micro => micro_delta(),
            }
        }
    }
}

type Counts = (f64, f64, f64, f64);

fn counts(t: &ContingencyTable) -> Counts {
    t.as_f64()
}

fn smoothed(measure: &Measure, (tp, fp, fn_, tn): Counts, s: f64) -> f64 {
    measure.of_counts(tp + s, fp + s, fn_ + s, tn + s)
}

/// Counts after moving one wrong prediction to its correct cell.
fn moved(t: &ContingencyTable, predicted: bool) -> Option<Counts> {
    let (tp, fp, fn_, tn) = t.as_f64();
    if predicted {
        (t.fp > 0).then_some((tp, fp - 1.0, fn_, tn + 1.0))
    } else {
        (t.fn_ > 0).then_some((tp + 1.0, fp, fn_ - 1.0, tn))
    }
}

impl fmt::Display for GainFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GainFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GainFunction::ALL
            .into_iter()
            .find(|g| g.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownPolicy(s.to_string()))
    }
}
