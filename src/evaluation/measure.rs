use std::{fmt, str::FromStr};

use num::{Num, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// `num / den`, or 0 when the denominator is zero.
#[inline]
pub fn ratio<N>(num: N, den: N) -> f64
where
    N: Num + ToPrimitive + Copy,
{
    if den.is_zero() {
        return 0.0;
    }
    num.to_f64().unwrap_or(0.0) / den.to_f64().unwrap_or(0.0)
}

/// Evaluation measure computed from contingency counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measure {
    /// F-measure with the given β
    F(f64),
    /// Sebastiani's K (sensitivity + specificity - 1, with single-class fallbacks)
    K,
    /// Mean of true positive and true negative rates
    Roc,
    Accuracy,
}

impl Measure {
    pub const F1: Measure = Measure::F(1.0);
    pub const F05: Measure = Measure::F(0.5);
    pub const F2: Measure = Measure::F(2.0);

    /// Value of the measure on (possibly smoothed, hence real valued) counts.
    pub fn of_counts(&self, tp: f64, fp: f64, fn_: f64, tn: f64) -> f64 {
        match *self {
            Measure::F(beta) => {
                let b2 = beta * beta;
                ratio((1.0 + b2) * tp, (1.0 + b2) * tp + b2 * fn_ + fp)
            }
            Measure::K => {
                let pos = tp + fn_;
                let neg = tn + fp;
                match (pos > 0.0, neg > 0.0) {
                    (true, true) => ratio(tp, pos) + ratio(tn, neg) - 1.0,
                    (false, true) => 2.0 * ratio(tn, neg) - 1.0,
                    (true, false) => 2.0 * ratio(tp, pos) - 1.0,
                    (false, false) => 0.0,
                }
            }
            Measure::Roc => (ratio(tp, tp + fn_) + ratio(tn, tn + fp)) / 2.0,
            Measure::Accuracy => ratio(tp + tn, tp + fp + fn_ + tn),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::F(beta) => write!(f, "F{beta}"),
            Measure::K => write!(f, "K"),
            Measure::Roc => write!(f, "ROC"),
            Measure::Accuracy => write!(f, "Acc"),
        }
    }
}

impl FromStr for Measure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "K" => Ok(Measure::K),
            "ROC" => Ok(Measure::Roc),
            "ACC" | "ACCURACY" => Ok(Measure::Accuracy),
            other => other
                .strip_prefix('F')
                .and_then(|b| b.parse::<f64>().ok())
                .filter(|b| *b > 0.0)
                .map(Measure::F)
                .ok_or_else(|| Error::invalid_config(format!("unknown measure `{s}`"))),
        }
    }
}

/// How per-category values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Average of the per-category measures
    Macro,
    /// Measure of the summed contingency table
    Micro,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominators_resolve_to_zero() {
        assert_eq!(Measure::F1.of_counts(0.0, 0.0, 0.0, 10.0), 0.0);
        assert_eq!(Measure::Roc.of_counts(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(ratio(3u32, 0u32), 0.0);
    }

    #[test]
    fn f_beta_weights_recall() {
        // tp=2 fp=2 fn=0: precision 0.5, recall 1
        let f1 = Measure::F1.of_counts(2.0, 2.0, 0.0, 6.0);
        let f2 = Measure::F2.of_counts(2.0, 2.0, 0.0, 6.0);
        let f05 = Measure::F05.of_counts(2.0, 2.0, 0.0, 6.0);
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!(f2 > f1 && f1 > f05);
    }

    #[test]
    fn k_falls_back_when_one_class_is_missing() {
        assert_eq!(Measure::K.of_counts(3.0, 1.0, 1.0, 3.0), 0.5);
        assert_eq!(Measure::K.of_counts(0.0, 1.0, 0.0, 3.0), 0.5);
        assert_eq!(Measure::K.of_counts(2.0, 0.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn measure_names_parse() {
        assert_eq!("F1".parse::<Measure>().unwrap(), Measure::F1);
        assert_eq!("f0.5".parse::<Measure>().unwrap(), Measure::F05);
        assert_eq!("k".parse::<Measure>().unwrap(), Measure::K);
        assert!("F0".parse::<Measure>().is_err());
        assert!("G1".parse::<Measure>().is_err());
    }
}
