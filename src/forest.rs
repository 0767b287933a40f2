//! Bagged ensemble of `linfa-trees` decision trees over two outcomes.
//!
//! Each tree is fitted on a bootstrap sample of the rows and a random half of the columns,
//! splitting on gini impurity. The forest's win probability is the fraction of trees voting win.

use anyhow::{ensure, Context, Result};
use linfa::prelude::*;
use linfa::Dataset;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const WIN: usize = 1;
const LOSS: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> ForestParams {
        ForestParams {
            n_trees: 250,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// One tree and the encoded columns it was fitted on, in the order it expects them.
#[derive(Debug, Deserialize, Serialize)]
struct Member {
    columns: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

impl Member {
    #[allow(clippy::cast_precision_loss)]
    fn fit(
        x: &Array2<f64>,
        y: &Array1<usize>,
        params: &ForestParams,
        n_columns: usize,
        seed: u64,
    ) -> Result<Member> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_rows = x.nrows();
        let rows: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0, n_rows)).collect();
        let mut columns = index::sample(&mut rng, x.ncols(), n_columns).into_vec();
        columns.sort_unstable();

        let records = x.select(Axis(0), &rows).select(Axis(1), &columns);
        let targets = y.select(Axis(0), &rows);
        let tree = DecisionTree::<f64, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(params.max_depth)
            .min_weight_split(params.min_samples_split as f32)
            .min_weight_leaf(1.0)
            .min_impurity_decrease(1e-9)
            .fit(&Dataset::new(records, targets))
            .context("unable to fit decision tree")?;
        Ok(Member { columns, tree })
    }

    fn votes_win(&self, x: &[f64]) -> bool {
        let row: Vec<f64> = self
            .columns
            .iter()
            .map(|&c| x.get(c).copied().unwrap_or(0.0))
            .collect();
        match Array2::from_shape_vec((1, row.len()), row) {
            Ok(row) => self.tree.predict(&row).get(0) == Some(&WIN),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RandomForest {
    members: Vec<Member>,
    n_features: usize,
}

impl RandomForest {
    #[instrument(name = "RandomForest::fit", skip(x, y))]
    pub fn fit(x: &[Vec<f64>], y: &[bool], params: &ForestParams) -> Result<RandomForest> {
        ensure!(!x.is_empty(), "no training examples");
        ensure!(x.len() == y.len(), "{} rows but {} labels", x.len(), y.len());
        ensure!(params.n_trees > 0, "a forest needs at least one tree");
        let n_features = x[0].len();
        ensure!(n_features > 0, "rows have no columns");
        ensure!(
            x.iter().all(|row| row.len() == n_features),
            "rows have differing widths"
        );

        let flat: Vec<f64> = x.iter().flatten().copied().collect();
        let records = Array2::from_shape_vec((x.len(), n_features), flat)?;
        let targets: Array1<usize> = y.iter().map(|&won| if won { WIN } else { LOSS }).collect();
        let n_columns = (n_features + 1) / 2;

        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();
        let members = seeds
            .into_par_iter()
            .map(|seed| Member::fit(&records, &targets, params, n_columns, seed))
            .collect::<Result<Vec<_>>>()?;

        let forest = RandomForest {
            members,
            n_features,
        };
        debug!(
            trees = forest.n_trees(),
            leaves = forest.total_leaves(),
            avg_depth = %forest.avg_depth(),
            "fitted forest"
        );
        Ok(forest)
    }

    /// Probability of the positive class (a batting-side win).
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        let wins = self.members.iter().filter(|m| m.votes_win(x)).count();
        wins as f64 / self.members.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn total_leaves(&self) -> usize {
        self.members.iter().map(|m| m.tree.num_leaves()).sum()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn avg_depth(&self) -> f64 {
        let sum: usize = self.members.iter().map(|m| m.tree.max_depth()).sum();
        sum as f64 / self.members.len() as f64
    }
}
