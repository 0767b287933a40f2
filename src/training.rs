use crate::artifact::{ModelArtifact, TrainingSummary};
use crate::dataset::Example;
use crate::encoder::ColumnEncoder;
use crate::features::{FeatureRecord, FeatureSet};
use crate::forest::{ForestParams, RandomForest};
use crate::schema::FeatureSchema;
use crate::util::Accuracy;
use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub feature_set: FeatureSet,
    pub params: ForestParams,
    pub test_fraction: f64,
}

#[derive(Debug)]
pub struct Split<'a> {
    pub train: Vec<&'a Example>,
    pub test: Vec<&'a Example>,
    pub train_matches: usize,
    pub test_matches: usize,
}

/// Holds out whole matches, so no deliveries of a test match are seen during fitting.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_by_match(examples: &[Example], test_fraction: f64, seed: u64) -> Split<'_> {
    let mut ids: Vec<u32> = examples
        .iter()
        .map(|e| e.match_id)
        .collect::<FxHashSet<u32>>()
        .into_iter()
        .collect();
    ids.sort_unstable();
    ids.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut n_test = (ids.len() as f64 * test_fraction).round() as usize;
    if n_test >= ids.len() {
        n_test = ids.len().saturating_sub(1);
    }
    let test_ids: FxHashSet<u32> = ids[..n_test].iter().copied().collect();

    let (test, train): (Vec<&Example>, Vec<&Example>) =
        examples.iter().partition(|e| test_ids.contains(&e.match_id));
    Split {
        train,
        test,
        train_matches: ids.len() - n_test,
        test_matches: n_test,
    }
}

/// Fits the encoder and forest. Training rows go through the same derivation and alignment as a
/// live prediction.
#[instrument(skip(examples, params))]
pub fn fit(
    examples: &[&Example],
    feature_set: FeatureSet,
    params: &ForestParams,
) -> Result<(FeatureSchema, ColumnEncoder, RandomForest)> {
    ensure!(!examples.is_empty(), "no training examples");
    let schema = FeatureSchema::from_fields(feature_set.fields());
    let fields = schema.resolve()?;

    let records: Vec<FeatureRecord> = examples
        .par_iter()
        .map(|e| e.state.record(&fields))
        .collect();
    let aligned = records
        .iter()
        .map(|r| schema.align(r))
        .collect::<Result<Vec<_>, _>>()?;

    let encoder = ColumnEncoder::fit(&schema, &aligned);
    let x: Vec<Vec<f64>> = aligned
        .par_iter()
        .map(|row| encoder.transform(row))
        .collect();
    let y: Vec<bool> = examples.iter().map(|e| e.won).collect();
    info!(rows = x.len(), columns = encoder.width(), "encoded training rows");

    let forest = RandomForest::fit(&x, &y, params)?;
    Ok((schema, encoder, forest))
}

pub fn evaluate(artifact: &ModelArtifact, examples: &[&Example]) -> Result<Accuracy> {
    let scored = examples
        .par_iter()
        .map(|e| {
            artifact
                .predict(&artifact.record(&e.state))
                .map(|p| (p.p_win, e.won))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut accuracy = Accuracy::default();
    for (p_win, won) in scored {
        accuracy.record(p_win, won);
    }
    Ok(accuracy)
}

#[instrument(skip(examples))]
pub fn train(examples: &[Example], options: &TrainOptions) -> Result<ModelArtifact> {
    let split = split_by_match(examples, options.test_fraction, options.params.seed);
    info!(
        train_matches = split.train_matches,
        train_examples = split.train.len(),
        test_matches = split.test_matches,
        test_examples = split.test.len(),
        "split by match"
    );

    let (schema, encoder, forest) = fit(&split.train, options.feature_set, &options.params)?;
    let summary = TrainingSummary {
        feature_set: options.feature_set,
        params: options.params,
        train_matches: split.train_matches,
        train_examples: split.train.len(),
        test_matches: split.test_matches,
        test_examples: split.test.len(),
        accuracy: None,
        brier: None,
    };
    let artifact = ModelArtifact::new(schema, encoder, forest, summary)?;

    let accuracy = evaluate(&artifact, &split.test)?;
    info!(%accuracy, "held-out evaluation");
    Ok(artifact.with_evaluation(&accuracy))
}
