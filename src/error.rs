use crate::team::Team;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The record handed to the model does not carry the fields it was trained on.
    #[error("feature schema mismatch: model expects {expected:?}, got {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error(
        "no model artifact at {}; run `ipl-win train` to build one",
        path.display()
    )]
    ArtifactNotFound { path: PathBuf },

    #[error("model artifact format {found} is not supported (expected {expected}); retrain")]
    UnsupportedArtifact { found: u64, expected: u64 },

    #[error("model artifact is inconsistent: {0}")]
    CorruptArtifact(String),

    #[error("batting and bowling team are both {0}")]
    SameTeams(Team),

    #[error("invalid match state: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unable to decode model artifact: {0}")]
    Decode(#[from] bincode::Error),
}
