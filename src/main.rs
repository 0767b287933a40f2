#![warn(clippy::pedantic, rust_2018_idioms)]

mod artifact;
mod config;
mod dataset;
mod encoder;
mod error;
mod features;
mod forest;
mod read_dir;
mod schema;
mod serving;
mod team;
mod training;
mod util;

use crate::artifact::ModelArtifact;
use crate::config::{Command, Config, PredictArgs, TrainArgs};
use crate::dataset::TrainingSet;
use crate::features::FieldKind;
use crate::serving::Assessment;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    match &config.command {
        Command::Train(args) => train(&config.artifact, args),
        Command::Predict(args) => predict(&ModelArtifact::load(&config.artifact)?, args),
        Command::Batch { input } => {
            let artifact = ModelArtifact::load(&config.artifact)?;
            let results = match input {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("unable to open {}", path.display()))?;
                    serving::assess_batch(&artifact, BufReader::new(file))?
                }
                None => {
                    let stdin = io::stdin();
                    serving::assess_batch(&artifact, stdin.lock())?
                }
            };
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            for line in &results {
                serde_json::to_writer(&mut out, line)?;
                writeln!(out)?;
            }
            out.flush()?;
            Ok(())
        }
        Command::Schema => schema(&ModelArtifact::load(&config.artifact)?),
    }
}

fn train(artifact_path: &Path, args: &TrainArgs) -> Result<()> {
    let options = args.options();
    info!(?options, "training");
    let set = TrainingSet::load(&args.data_dir, args.first_over, !args.no_cache)?;
    let artifact = training::train(&set.examples, &options)?;
    artifact
        .save(artifact_path)
        .with_context(|| format!("unable to write {}", artifact_path.display()))?;

    let summary = artifact.summary();
    println!(
        "trained on {} deliveries from {} matches; held out {} matches",
        summary.train_examples, summary.train_matches, summary.test_matches
    );
    if let (Some(accuracy), Some(brier)) = (summary.accuracy, summary.brier) {
        println!("hold-out accuracy {:.4}, brier score {:.4}", accuracy, brier);
    }
    println!("wrote {}", artifact_path.display());
    Ok(())
}

fn predict(artifact: &ModelArtifact, args: &PredictArgs) -> Result<()> {
    let state = args.input()?.validate()?;
    let assessment = serving::assess(artifact, &state)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        render(&assessment);
    }
    Ok(())
}

fn render(a: &Assessment) {
    println!("{} {:.2}%", a.batting_team, a.win_percent);
    println!("{} {:.2}%", a.bowling_team, a.loss_percent);
    println!("favourite: {} ({:.2}%)", a.favourite, a.favourite_percent);
    println!(
        "needs {} off {} balls with {} wickets in hand",
        a.runs_left, a.balls_left, a.wickets
    );
    println!("CRR {:.2}  RRR {:.2}", a.crr, a.rrr);
}

fn schema(artifact: &ModelArtifact) -> Result<()> {
    let schema = artifact.expected_schema();
    println!("schema version {}, {} fields", schema.version, schema.len());
    for (i, field) in schema.fields().iter().enumerate() {
        match field.kind {
            FieldKind::Numeric => println!("{:>3}  {}  numeric", i, field.name),
            FieldKind::Categorical => {
                let categories = serving::known_categories(artifact, &field.name);
                println!("{:>3}  {}  categorical: {}", i, field.name, categories.join(", "));
            }
        }
    }

    let summary = artifact.summary();
    let forest = artifact.forest();
    println!(
        "feature set {:?}; {} trees, {} leaves, average depth {:.1}; {} encoded columns",
        summary.feature_set,
        forest.n_trees(),
        forest.total_leaves(),
        forest.avg_depth(),
        artifact.encoder().width()
    );
    println!(
        "trained on {} matches ({} deliveries), held out {} matches ({} deliveries)",
        summary.train_matches, summary.train_examples, summary.test_matches, summary.test_examples
    );
    match (summary.accuracy, summary.brier) {
        (Some(accuracy), Some(brier)) => {
            println!("hold-out accuracy {:.4}, brier score {:.4}", accuracy, brier);
        }
        _ => println!("no hold-out evaluation"),
    }
    Ok(())
}
