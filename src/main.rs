use std::{
    env,
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    process,
};

use satc_quant::{
    classifier::classify_index,
    quantification::report::{true_prevalence, write_quantification, write_rates},
    ranking::{expected_tables, FullReportWriter, LightWriter, StepSink},
    CancellationToken, CentroidLearner, IndexData, LogProgress, Policy, QuantificationLearner, RankingConfig,
    RankingInput, RateEstimatorConfig, Result, Simulation,
};

const USAGE: &str = "usage:
  satc-quant quantify <train.json> <test.json> [folds] [threads]
  satc-quant rank <train.json> <test.json> <policy> <out> [light] [expected]

  light     write only the per-step measure array
  expected  estimate tables from calibrated probabilities instead of
            the cross-validation tables";

enum Command {
    Quantify {
        train: PathBuf,
        test: PathBuf,
        folds: usize,
        threads: usize,
    },
    Rank {
        train: PathBuf,
        test: PathBuf,
        policy: Policy,
        out: PathBuf,
        light: bool,
        expected: bool,
    },
}

fn parse_number(value: Option<&String>, name: &str, default: usize) -> std::result::Result<usize, String> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| format!("{name} must be a non-negative integer, got `{v}`")),
    }
}

fn parse_args(args: &[String]) -> std::result::Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("quantify") if (3..=5).contains(&args.len()) => Ok(Command::Quantify {
            train: PathBuf::from(&args[1]),
            test: PathBuf::from(&args[2]),
            folds: parse_number(args.get(3), "folds", 10)?,
            threads: parse_number(args.get(4), "threads", 0)?,
        }),
        Some("rank") if (5..=7).contains(&args.len()) => {
            let (mut light, mut expected) = (false, false);
            for flag in &args[5..] {
                match flag.as_str() {
                    "light" if !light => light = true,
                    "expected" if !expected => expected = true,
                    other => return Err(format!("unexpected argument `{other}`")),
                }
            }
            Ok(Command::Rank {
                train: PathBuf::from(&args[1]),
                test: PathBuf::from(&args[2]),
                policy: args[3].parse().map_err(|e| format!("{e}"))?,
                out: PathBuf::from(&args[4]),
                light,
                expected,
            })
        }
        Some(cmd) => Err(format!("wrong arguments for `{cmd}`")),
        None => Err("missing command".to_string()),
    }
}

fn quantify(train: PathBuf, test: PathBuf, folds: usize, threads: usize) -> Result<()> {
    let train = IndexData::load(&train)?;
    let test = IndexData::load(&test)?;
    let config = RateEstimatorConfig {
        folds,
        threads,
        ..Default::default()
    };
    let learner = QuantificationLearner::new(CentroidLearner::default(), config)?;
    let pool = learner.learn(&train, &mut LogProgress::new("learning"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_rates(&mut out, "cv", "train", pool.rates(), &train)?;
    write_quantification(&mut out, &true_prevalence(&test), &test)?;
    for q in pool.quantify_all(&test) {
        write_quantification(&mut out, &q, &test)?;
    }
    out.flush()?;
    Ok(())
}

fn rank(train: PathBuf, test: PathBuf, policy: Policy, out: PathBuf, light: bool, expected: bool) -> Result<()> {
    let train = IndexData::load(&train)?;
    let test = IndexData::load(&test)?;
    let learner = QuantificationLearner::new(CentroidLearner::default(), RateEstimatorConfig::default())?;
    let pool = learner.learn(&train, &mut LogProgress::new("learning"))?;

    let confidences = classify_index(pool.classifier().as_ref(), &test, pool.mode());
    let predicted = confidences.to_classification();
    let calibration = pool.rates().calibration();
    let categories = test.category_ids();
    // expected tables are already counted on the test set
    let (estimated, training_size) = if expected {
        let tables = expected_tables(&predicted, &confidences, &calibration, &categories);
        (tables, None)
    } else {
        (pool.contingency_tables().clone(), Some(train.document_count()))
    };
    let input = RankingInput {
        predicted: &predicted,
        truth: test.classification(),
        confidences: &confidences,
        calibration: &calibration,
        estimated: &estimated,
        training: Some(&train),
        categories: &categories,
    };
    let config = RankingConfig {
        policy,
        training_size,
        ..Default::default()
    };
    let measure = config.measure;
    let simulation = Simulation::new(input, config)?;

    let file = BufWriter::new(File::create(&out)?);
    let mut sink: Box<dyn StepSink> = if light {
        Box::new(LightWriter::new(file))
    } else {
        Box::new(FullReportWriter::new(file, measure))
    };
    let outcome = simulation.run(&mut LogProgress::new("ranking"), &CancellationToken::new(), sink.as_mut())?;
    log::info!(
        "{:?} after {} corrections, final value {:?}",
        outcome.status,
        outcome.rank.len(),
        outcome.measures.last()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            process::exit(2);
        }
    };
    let result = match command {
        Command::Quantify {
            train,
            test,
            folds,
            threads,
        } => quantify(train, test, folds, threads),
        Command::Rank {
            train,
            test,
            policy,
            out,
            light,
            expected,
        } => rank(train, test, policy, out, light, expected),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rank_accepts_output_and_estimate_flags() {
        let parsed = parse_args(&args(&["rank", "a.json", "b.json", "greedy", "out.txt", "expected", "light"]));
        match parsed {
            Ok(Command::Rank { light, expected, .. }) => assert!(light && expected),
            _ => panic!("rank arguments rejected"),
        }
        match parse_args(&args(&["rank", "a.json", "b.json", "PM", "out.txt"])) {
            Ok(Command::Rank { light, expected, .. }) => assert!(!light && !expected),
            _ => panic!("rank arguments rejected"),
        }
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_args(&args(&["rank", "a.json", "b.json", "PM", "out.txt", "light", "light"])).is_err());
        assert!(parse_args(&args(&["rank", "a.json", "b.json", "nope", "out.txt"])).is_err());
        assert!(parse_args(&args(&["quantify", "a.json", "b.json", "ten"])).is_err());
        assert!(parse_args(&[]).is_err());
    }
}
