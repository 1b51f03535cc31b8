use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    ranking::gain::GainFunction,
};

/// Selection strategy delegated to an active-learning model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActiveStrategy {
    /// Max-margin uncertainty
    Mmu,
    /// Label cardinality inconsistency
    Lci,
    /// `uncertainty^β · inconsistency^(1-β)`
    Adaptive { beta: f64 },
}

/// How the documents to correct are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Policy {
    /// Shuffled order, reproducible through the seed
    Random { seed: u64 },
    /// Most uncertain documents first ("PM"). `top_n` limits the sum to
    /// each document's most probable categories.
    Confidence { top_n: Option<usize>, oracle: bool },
    /// Ranked once by expected utility ("greedy")
    Utility { gain: GainFunction, oracle_confidence: bool },
    /// Re-ranked by expected utility after every correction
    Incremental { gain: GainFunction, oracle_confidence: bool },
    ActiveLearning(ActiveStrategy),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Utility {
            gain: GainFunction::Gain,
            oracle_confidence: false,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        match self {
            Policy::Confidence { top_n: Some(0), .. } => {
                Err(Error::invalid_config("confidence policy needs top-N of at least 1"))
            }
            Policy::ActiveLearning(ActiveStrategy::Adaptive { beta }) if !(0.0..=1.0).contains(beta) => {
                Err(Error::invalid_config(format!("adaptive beta must be in [0, 1], got {beta}")))
            }
            _ => Ok(()),
        }
    }

    /// Whether the next document depends on the corrections made so far.
    pub fn is_incremental(&self) -> bool {
        matches!(self, Policy::Incremental { .. })
    }

    pub fn needs_training(&self) -> bool {
        matches!(self, Policy::ActiveLearning(_))
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trueconf = |oracle: bool| if oracle { "-trueconf" } else { "" };
        match self {
            Policy::Random { seed } => write!(f, "random-{seed}"),
            Policy::Confidence { top_n, oracle } => {
                write!(f, "PM")?;
                if let Some(n) = top_n {
                    write!(f, "-{n}")?;
                }
                if *oracle {
                    write!(f, "-oracle")?;
                }
                Ok(())
            }
            Policy::Utility { gain, oracle_confidence } => {
                write!(f, "greedy-{gain}{}", trueconf(*oracle_confidence))
            }
            Policy::Incremental { gain, oracle_confidence } => {
                write!(f, "incremental-greedy-{gain}{}", trueconf(*oracle_confidence))
            }
            Policy::ActiveLearning(ActiveStrategy::Mmu) => write!(f, "MMU"),
            Policy::ActiveLearning(ActiveStrategy::Lci) => write!(f, "LCI"),
            Policy::ActiveLearning(ActiveStrategy::Adaptive { beta }) => write!(f, "adaptive-{beta}"),
        }
    }
}

/// Parses `random[-seed]`, `PM[-n][-oracle]`, `greedy[-gain][-trueconf]`,
/// `incremental-greedy[-gain][-trueconf]`, `MMU`, `LCI` and
/// `adaptive[-beta]`.
impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || Error::UnknownPolicy(s.to_string());
        let mut parts: Vec<&str> = s.split('-').collect();
        let head = parts.remove(0).to_ascii_lowercase();

        let policy = match head.as_str() {
            "random" => {
                let seed = match parts.as_slice() {
                    [] => 0,
                    [seed] => seed.parse().map_err(|_| unknown())?,
                    _ => return Err(unknown()),
                };
                Policy::Random { seed }
            }
            "pm" => {
                let oracle = parts.last().is_some_and(|p| p.eq_ignore_ascii_case("oracle"));
                if oracle {
                    parts.pop();
                }
                let top_n = match parts.as_slice() {
                    [] => None,
                    [n] => Some(n.parse().map_err(|_| unknown())?),
                    _ => return Err(unknown()),
                };
                Policy::Confidence { top_n, oracle }
            }
            "greedy" => {
                let (gain, oracle_confidence) = parse_greedy(&mut parts).ok_or_else(unknown)?;
                Policy::Utility { gain, oracle_confidence }
            }
            "incremental" => {
                if parts.is_empty() || !parts.remove(0).eq_ignore_ascii_case("greedy") {
                    return Err(unknown());
                }
                let (gain, oracle_confidence) = parse_greedy(&mut parts).ok_or_else(unknown)?;
                Policy::Incremental { gain, oracle_confidence }
            }
            "mmu" if parts.is_empty() => Policy::ActiveLearning(ActiveStrategy::Mmu),
            "lci" if parts.is_empty() => Policy::ActiveLearning(ActiveStrategy::Lci),
            "adaptive" => {
                let beta = match parts.as_slice() {
                    [] => 0.5,
                    [beta] => beta.parse().map_err(|_| unknown())?,
                    _ => return Err(unknown()),
                };
                Policy::ActiveLearning(ActiveStrategy::Adaptive { beta })
            }
            _ => return Err(unknown()),
        };
        policy.validate()?;
        Ok(policy)
    }
}

fn parse_greedy(parts: &mut Vec<&str>) -> Option<(GainFunction, bool)> {
    let trueconf = parts.last().is_some_and(|p| p.eq_ignore_ascii_case("trueconf"));
    if trueconf {
        parts.pop();
    }
    let gain = match parts.as_slice() {
        [] => GainFunction::Gain,
        [name] => name.parse().ok()?,
        _ => return None,
    };
    Some((gain, trueconf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse() {
        assert_eq!("random".parse::<Policy>().unwrap(), Policy::Random { seed: 0 });
        assert_eq!("random-42".parse::<Policy>().unwrap(), Policy::Random { seed: 42 });
        assert_eq!(
            "PM-oracle".parse::<Policy>().unwrap(),
            Policy::Confidence { top_n: None, oracle: true }
        );
        assert_eq!(
            "greedy-gainOracle-trueconf".parse::<Policy>().unwrap(),
            Policy::Utility { gain: GainFunction::GainOracle, oracle_confidence: true }
        );
        assert_eq!(
            "incremental-greedy-gainSmooth1Avg".parse::<Policy>().unwrap(),
            Policy::Incremental { gain: GainFunction::GainSmooth1Avg, oracle_confidence: false }
        );
        assert_eq!("MMU".parse::<Policy>().unwrap(), Policy::ActiveLearning(ActiveStrategy::Mmu));
        assert_eq!(
            "adaptive".parse::<Policy>().unwrap(),
            Policy::ActiveLearning(ActiveStrategy::Adaptive { beta: 0.5 })
        );
    }

    #[test]
    fn display_parses_back() {
        let policies = [
            Policy::Random { seed: 7 },
            Policy::Confidence { top_n: Some(3), oracle: true },
            Policy::default(),
            Policy::Incremental { gain: GainFunction::GainOracleAvg, oracle_confidence: true },
            Policy::ActiveLearning(ActiveStrategy::Lci),
            Policy::ActiveLearning(ActiveStrategy::Adaptive { beta: 0.25 }),
        ];
        for p in policies {
            assert_eq!(p.to_string().parse::<Policy>().unwrap(), p);
        }
    }

    #[test]
    fn bad_names_and_values_are_rejected() {
        assert!(matches!("greedy-nope".parse::<Policy>(), Err(Error::UnknownPolicy(_))));
        assert!(matches!("incremental-random".parse::<Policy>(), Err(Error::UnknownPolicy(_))));
        assert!(matches!("PM-0".parse::<Policy>(), Err(Error::InvalidConfig(_))));
        assert!(matches!("adaptive-1.5".parse::<Policy>(), Err(Error::InvalidConfig(_))));
        assert!("".parse::<Policy>().is_err());
    }
}
