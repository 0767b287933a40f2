use crate::features::FeatureSet;
use crate::forest::ForestParams;
use crate::serving::{MatchInput, Overs};
use crate::training::TrainOptions;
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// IPL chase win probability: train a model from ball-by-ball logs and query it
#[derive(Parser, Debug, Clone)]
#[command(name = "ipl-win", version, about)]
pub struct Config {
    /// Model artifact to write when training and read otherwise
    #[arg(
        long,
        global = true,
        env = "IPL_WIN_ARTIFACT",
        default_value = "pipe.bincode.gz"
    )]
    pub artifact: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the model artifact from matches.csv and deliveries.csv
    Train(TrainArgs),
    /// Win probability for one chase situation
    Predict(PredictArgs),
    /// Score JSON match inputs from a file or stdin, one JSON result per line
    Batch {
        /// Read from this file instead of stdin
        input: Option<PathBuf>,
    },
    /// Show the fields, categories and training summary recorded in the artifact
    Schema,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Directory holding matches.csv and deliveries.csv
    #[arg(long, env = "IPL_WIN_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Feature set the model is trained on (base or extended)
    #[arg(long, default_value = "extended")]
    pub features: FeatureSet,

    /// Number of trees in the forest
    #[arg(long, default_value = "250")]
    pub trees: usize,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Fraction of matches held out for evaluation
    #[arg(long, default_value = "0.2")]
    pub test_fraction: f64,

    /// Maximum tree depth (unbounded when absent)
    #[arg(long)]
    pub max_depth: Option<usize>,

    #[arg(long, default_value = "2")]
    pub min_samples_split: usize,

    /// Number of the first over in the `over` column of deliveries.csv
    #[arg(long, default_value = "1")]
    pub first_over: u32,

    /// Re-read the CSV logs even if a cached training set exists
    #[arg(long)]
    pub no_cache: bool,
}

impl TrainArgs {
    pub fn options(&self) -> TrainOptions {
        TrainOptions {
            feature_set: self.features,
            params: ForestParams {
                n_trees: self.trees,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                seed: self.seed,
            },
            test_fraction: self.test_fraction,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Host city
    #[arg(long)]
    pub city: String,

    /// Chasing team, by name or abbreviation
    #[arg(long)]
    pub batting: String,

    /// Defending team, by name or abbreviation
    #[arg(long)]
    pub bowling: String,

    #[arg(long)]
    pub target: u32,

    /// Runs scored so far in the chase
    #[arg(long)]
    pub score: u32,

    /// Overs bowled, as `10` or `10.3`
    #[arg(long)]
    pub overs: Overs,

    /// Balls bowled in the current over, if not given with --overs
    #[arg(long)]
    pub balls: Option<u32>,

    /// Wickets fallen
    #[arg(long)]
    pub wickets: u32,

    /// Print the assessment as JSON
    #[arg(long)]
    pub json: bool,
}

impl PredictArgs {
    pub fn input(&self) -> Result<MatchInput> {
        let overs = match self.balls {
            None => self.overs,
            Some(_) if self.overs.balls != 0 => {
                bail!("give balls either with --overs {} or --balls, not both", self.overs)
            }
            Some(balls) => format!("{}.{}", self.overs.completed, balls)
                .parse()
                .map_err(anyhow::Error::msg)?,
        };
        Ok(MatchInput {
            city: self.city.clone(),
            batting_team: self.batting.clone(),
            bowling_team: self.bowling.clone(),
            target: self.target,
            score: self.score,
            overs,
            wickets: self.wickets,
        })
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if let Command::Train(args) = &self.command {
            if args.trees == 0 {
                bail!("--trees must be at least 1");
            }
            if !(0.0..1.0).contains(&args.test_fraction) {
                bail!("--test-fraction must be in [0.0, 1.0)");
            }
            if args.min_samples_split < 2 {
                bail!("--min-samples-split must be at least 2");
            }
            if args.max_depth == Some(0) {
                bail!("--max-depth must be at least 1");
            }
            if args.first_over > 1 {
                bail!("--first-over must be 0 or 1");
            }
        }
        Ok(())
    }
}
