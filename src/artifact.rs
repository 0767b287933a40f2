use crate::encoder::ColumnEncoder;
use crate::error::{Error, Result};
use crate::features::{FeatureRecord, FeatureSet, Field, MatchState};
use crate::forest::{ForestParams, RandomForest};
use crate::schema::FeatureSchema;
use crate::util::{round2, Accuracy};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{info, instrument};

const ARTIFACT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrainingSummary {
    pub feature_set: FeatureSet,
    pub params: ForestParams,
    pub train_matches: usize,
    pub train_examples: usize,
    pub test_matches: usize,
    pub test_examples: usize,
    pub accuracy: Option<f64>,
    pub brier: Option<f64>,
}

/// Outcome distribution for the batting side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub p_loss: f64,
    pub p_win: f64,
}

impl Prediction {
    fn from_win(p_win: f64) -> Prediction {
        Prediction {
            p_loss: 1.0 - p_win,
            p_win,
        }
    }

    pub fn win_percent(&self) -> f64 {
        round2(self.p_win * 100.0)
    }

    pub fn loss_percent(&self) -> f64 {
        round2(self.p_loss * 100.0)
    }
}

/// A fitted encoder and forest together with the schema they were fitted against. Immutable once
/// built; share it by reference across as many predictions as needed.
#[derive(Debug, Deserialize, Serialize)]
pub struct ModelArtifact {
    schema: FeatureSchema,
    encoder: ColumnEncoder,
    forest: RandomForest,
    summary: TrainingSummary,
    #[serde(skip)]
    fields: Vec<Field>,
}

impl ModelArtifact {
    pub fn new(
        schema: FeatureSchema,
        encoder: ColumnEncoder,
        forest: RandomForest,
        summary: TrainingSummary,
    ) -> Result<ModelArtifact> {
        let mut artifact = ModelArtifact {
            schema,
            encoder,
            forest,
            summary,
            fields: Vec::new(),
        };
        artifact.check()?;
        Ok(artifact)
    }

    /// Records hold-out scores in the summary.
    pub fn with_evaluation(mut self, accuracy: &Accuracy) -> ModelArtifact {
        self.summary.accuracy = accuracy.accuracy();
        self.summary.brier = accuracy.brier();
        self
    }

    fn check(&mut self) -> Result<()> {
        self.fields = self.schema.resolve()?;
        if self.encoder.width() != self.forest.n_features() {
            return Err(Error::CorruptArtifact(format!(
                "encoder produces {} columns but the forest was fitted on {}",
                self.encoder.width(),
                self.forest.n_features()
            )));
        }
        Ok(())
    }

    pub fn expected_schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// The schema's fields, in the order the model consumes them.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn summary(&self) -> &TrainingSummary {
        &self.summary
    }

    pub fn encoder(&self) -> &ColumnEncoder {
        &self.encoder
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Derives exactly the fields this model was trained on.
    pub fn record(&self, state: &MatchState) -> FeatureRecord {
        state.record(&self.fields)
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction> {
        let aligned = self.schema.align(record)?;
        let x = self.encoder.transform(&aligned);
        Ok(Prediction::from_win(self.forest.predict_proba(&x)))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = GzEncoder::new(Vec::new(), Compression::default());
        bincode::serialize_into(&mut writer, &ARTIFACT_VERSION)?;
        bincode::serialize_into(&mut writer, self)?;
        let data = writer.finish()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        info!(path = %path.display(), "saved model artifact");
        Ok(())
    }

    #[instrument(name = "ModelArtifact::load", skip(path))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ModelArtifact> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let mut reader = GzDecoder::new(BufReader::new(file));
        let version: u64 = bincode::deserialize_from(&mut reader)?;
        if version != ARTIFACT_VERSION {
            return Err(Error::UnsupportedArtifact {
                found: version,
                expected: ARTIFACT_VERSION,
            });
        }
        let mut artifact: ModelArtifact = bincode::deserialize_from(&mut reader)?;
        artifact.check()?;
        info!(
            path = %path.display(),
            fields = artifact.fields.len(),
            trees = artifact.forest.n_trees(),
            "loaded model artifact"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::ModelArtifact;
    use crate::error::Error;
    use crate::features::{FeatureRecord, FeatureSet, MatchState};
    use crate::training::tests::toy_artifact;
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ipl-win-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let artifact = toy_artifact(FeatureSet::Extended);
        for score in (0..=200).step_by(10) {
            for balls_bowled in (0..=120).step_by(12) {
                for wickets_fallen in 0..10 {
                    let state = MatchState::test(180, score, balls_bowled, wickets_fallen);
                    let p = artifact.predict(&artifact.record(&state)).unwrap();
                    assert_approx_eq!(p.p_win + p.p_loss, 1.0, 1e-6);
                    assert!((0.0..=1.0).contains(&p.p_win));
                }
            }
        }
    }

    #[test]
    fn test_submission_order_is_irrelevant() {
        let artifact = toy_artifact(FeatureSet::Extended);
        let state = MatchState::test(180, 80, 60, 2);
        let record = artifact.record(&state);

        let reversed: FeatureRecord = record
            .iter()
            .rev()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect();
        let mut rotated: Vec<_> = record
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect();
        rotated.rotate_left(4);
        let rotated: FeatureRecord = rotated.into_iter().collect();

        let expected = artifact.predict(&record).unwrap();
        assert_eq!(artifact.predict(&reversed).unwrap(), expected);
        assert_eq!(artifact.predict(&rotated).unwrap(), expected);
    }

    #[test]
    fn test_rejects_other_feature_set() {
        let artifact = toy_artifact(FeatureSet::Base);
        let record = MatchState::test(180, 80, 60, 2).record(FeatureSet::Extended.fields());
        assert!(matches!(
            artifact.predict(&record),
            Err(Error::SchemaMismatch { .. })
        ));
        assert_eq!(artifact.fields(), FeatureSet::Base.fields());
    }

    #[test]
    fn test_save_and_load() {
        let artifact = toy_artifact(FeatureSet::Base);
        let path = temp_path("artifact.bincode.gz");
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.expected_schema(), artifact.expected_schema());
        assert_eq!(loaded.encoder(), artifact.encoder());
        assert_eq!(loaded.summary(), artifact.summary());
        assert_eq!(loaded.forest().n_trees(), artifact.forest().n_trees());
        let state = MatchState::test(160, 120, 96, 5);
        assert_eq!(
            loaded.predict(&loaded.record(&state)).unwrap(),
            artifact.predict(&artifact.record(&state)).unwrap()
        );
    }

    #[test]
    fn test_missing_artifact() {
        let path = temp_path("does-not-exist.bincode.gz");
        match ModelArtifact::load(&path) {
            Err(Error::ArtifactNotFound { path: p }) => assert_eq!(p, path),
            other => panic!("expected ArtifactNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version() {
        use flate2::{write::GzEncoder, Compression};

        let path = temp_path("old.bincode.gz");
        let mut writer = GzEncoder::new(Vec::new(), Compression::default());
        bincode::serialize_into(&mut writer, &0_u64).unwrap();
        std::fs::write(&path, writer.finish().unwrap()).unwrap();
        let result = ModelArtifact::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(
            result,
            Err(Error::UnsupportedArtifact {
                found: 0,
                expected: 1
            })
        ));
    }
}
