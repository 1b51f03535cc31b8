use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use satc_quant::{
    classifier::classify_index,
    ranking::NullSink,
    utils::math::vector::SparseVector,
    CancellationToken, CategoryId, CentroidLearner, DocId, Document, Index, NoProgress, Policy,
    QuantificationLearner, RankingConfig, RankingInput, RateEstimatorConfig, Simulation,
};

const CATEGORIES: u32 = 8;
const FEATURES: u32 = 200;

/// Documents draw most of their weight from the features of their own
/// categories, plus some noise.
fn synthetic_index(docs: u32, seed: u64) -> Index {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut index = Index::new();
    for c in 0..CATEGORIES {
        index.add_category(CategoryId(c), format!("cat{c}"));
    }
    let per_cat = FEATURES / CATEGORIES;
    for d in 0..docs {
        let labels: Vec<CategoryId> = (0..CATEGORIES)
            .filter(|_| rng.gen_bool(0.2))
            .map(CategoryId)
            .collect();
        let mut pairs = Vec::new();
        for cat in &labels {
            for _ in 0..6 {
                pairs.push((cat.0 * per_cat + rng.gen_range(0..per_cat), 1.0));
            }
        }
        for _ in 0..10 {
            pairs.push((rng.gen_range(0..FEATURES), rng.gen_range(0.1..0.5)));
        }
        let doc = Document {
            name: format!("doc{d}"),
            features: SparseVector::from_pairs(pairs),
        };
        index.add_document(DocId(d), doc, &labels);
    }
    index
}

fn quantification_benchmark(c: &mut Criterion) {
    let train = synthetic_index(600, 1);
    let test = synthetic_index(300, 2);
    let learner = QuantificationLearner::new(CentroidLearner::default(), RateEstimatorConfig::default())
        .expect("valid config");

    c.bench_function("learn_quantifiers", |b| {
        b.iter(|| learner.learn(black_box(&train), &mut NoProgress).expect("learn"));
    });

    let pool = learner.learn(&train, &mut NoProgress).expect("learn");
    c.bench_function("quantify_all", |b| {
        b.iter(|| pool.quantify_all(black_box(&test)));
    });
}

fn ranking_benchmark(c: &mut Criterion) {
    let train = synthetic_index(600, 3);
    let test = synthetic_index(200, 4);
    let learner = QuantificationLearner::new(CentroidLearner::default(), RateEstimatorConfig::default())
        .expect("valid config");
    let pool = learner.learn(&train, &mut NoProgress).expect("learn");

    let confidences = classify_index(pool.classifier().as_ref(), &test, pool.mode());
    let predicted = confidences.to_classification();
    let calibration = pool.rates().calibration();
    let categories = test.category_ids();
    let input = RankingInput {
        predicted: &predicted,
        truth: test.classification(),
        confidences: &confidences,
        calibration: &calibration,
        estimated: &pool.rates().tables,
        training: Some(&train),
        categories: &categories,
    };

    for name in ["greedy", "incremental-greedy", "PM", "MMU"] {
        let policy: Policy = name.parse().expect("policy name");
        c.bench_function(&format!("rank_{name}"), |b| {
            b.iter(|| {
                let config = RankingConfig {
                    policy,
                    training_size: Some(train.document_count()),
                    ..Default::default()
                };
                Simulation::new(input, config)
                    .expect("simulation")
                    .run(&mut NoProgress, &CancellationToken::new(), &mut NullSink)
                    .expect("run")
            });
        });
    }
}

criterion_group!(benches, quantification_benchmark, ranking_benchmark);
criterion_main!(benches);
