//! Turns what a user types into a validated match state and a rendered-ready assessment.

use crate::artifact::{ModelArtifact, Prediction};
use crate::error::{Error, Result};
use crate::features::{canonical_city, FieldKind, MatchState, Value, BALLS_PER_INNINGS};
use crate::team::Team;
use crate::util::round2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use tracing::warn;

/// Overs in cricket notation: `10.3` is ten completed overs and three balls of the eleventh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "OversRepr")]
pub struct Overs {
    pub completed: u32,
    pub balls: u32,
}

impl Overs {
    pub fn balls_bowled(self) -> u32 {
        self.completed * 6 + self.balls
    }
}

impl fmt::Display for Overs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.completed, self.balls)
    }
}

impl FromStr for Overs {
    type Err = String;

    fn from_str(s: &str) -> Result<Overs, String> {
        let s = s.trim();
        let (completed, balls) = match s.find('.') {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => (s, "0"),
        };
        let completed: u32 = completed
            .parse()
            .map_err(|_| format!("invalid overs {:?}", s))?;
        let balls: u32 = balls.parse().map_err(|_| format!("invalid overs {:?}", s))?;
        if balls > 5 {
            return Err(format!("{:?}: an over has six balls, numbered .0 to .5", s));
        }
        let overs = Overs { completed, balls };
        if completed > BALLS_PER_INNINGS / 6 || overs.balls_bowled() > BALLS_PER_INNINGS {
            return Err(format!("{:?}: an innings lasts 20 overs", s));
        }
        Ok(overs)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OversRepr {
    Text(String),
    Number(f64),
}

impl TryFrom<OversRepr> for Overs {
    type Error = String;

    fn try_from(repr: OversRepr) -> Result<Overs, String> {
        match repr {
            OversRepr::Text(s) => s.parse(),
            OversRepr::Number(x) => x.to_string().parse(),
        }
    }
}

/// Raw inputs as collected from a user, before any checking.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchInput {
    pub city: String,
    pub batting_team: String,
    pub bowling_team: String,
    pub target: u32,
    pub score: u32,
    pub overs: Overs,
    pub wickets: u32,
}

impl MatchInput {
    pub fn validate(&self) -> Result<MatchState> {
        let batting_team = parse_team(&self.batting_team)?;
        let bowling_team = parse_team(&self.bowling_team)?;
        if batting_team == bowling_team {
            return Err(Error::SameTeams(batting_team));
        }
        let city = canonical_city(&self.city);
        if city.is_empty() {
            return Err(Error::InvalidInput("city is required".to_string()));
        }
        if self.target == 0 {
            return Err(Error::InvalidInput("target must be positive".to_string()));
        }
        if self.wickets > 9 {
            return Err(Error::InvalidInput(format!(
                "{} wickets down ends the innings",
                self.wickets
            )));
        }
        Ok(MatchState {
            batting_team,
            bowling_team,
            city: city.to_string(),
            target: self.target,
            score: self.score,
            balls_bowled: self.overs.balls_bowled(),
            wickets_fallen: self.wickets,
        })
    }
}

fn parse_team(name: &str) -> Result<Team> {
    name.parse()
        .map_err(|err: crate::team::UnknownTeam| Error::InvalidInput(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub batting_team: Team,
    pub bowling_team: Team,
    pub win_percent: f64,
    pub loss_percent: f64,
    pub favourite: Team,
    pub favourite_percent: f64,
    pub runs_left: u32,
    pub balls_left: u32,
    pub wickets: u32,
    pub crr: f64,
    pub rrr: f64,
}

/// Scores one match state. The record is built in the artifact's own field order.
pub fn assess(artifact: &ModelArtifact, state: &MatchState) -> Result<Assessment> {
    if state.batting_team == state.bowling_team {
        return Err(Error::SameTeams(state.batting_team));
    }

    let record = artifact.record(state);
    for (name, value) in record.iter() {
        if let Value::Category(category) = value {
            let known = artifact.encoder().categories(name).unwrap_or(&[]);
            if !known.iter().any(|k| k == category) {
                warn!(field = name, value = %category, "not seen during training; ignoring it");
            }
        }
    }
    let prediction = artifact.predict(&record)?;

    let features = state.features();
    let (favourite, favourite_percent) = favourite(state, &prediction);
    Ok(Assessment {
        batting_team: state.batting_team,
        bowling_team: state.bowling_team,
        win_percent: prediction.win_percent(),
        loss_percent: prediction.loss_percent(),
        favourite,
        favourite_percent,
        runs_left: features.runs_left,
        balls_left: features.balls_left,
        wickets: features.wickets,
        crr: round2(features.crr),
        rrr: round2(features.rrr),
    })
}

/// The side with the better chance; an even contest is given to the bowling side.
fn favourite(state: &MatchState, prediction: &Prediction) -> (Team, f64) {
    if prediction.p_win > prediction.p_loss {
        (state.batting_team, prediction.win_percent())
    } else {
        (state.bowling_team, prediction.loss_percent())
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchLine {
    Assessed(Assessment),
    Rejected { error: String },
}

/// Scores a stream of JSON match inputs against one shared artifact. Inputs that fail
/// validation are reported in place rather than aborting the batch.
pub fn assess_batch<R: Read>(
    artifact: &ModelArtifact,
    reader: R,
) -> anyhow::Result<Vec<BatchLine>> {
    let inputs = serde_json::Deserializer::from_reader(reader)
        .into_iter::<MatchInput>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(inputs
        .par_iter()
        .map(|input| match input.validate().and_then(|s| assess(artifact, &s)) {
            Ok(assessment) => BatchLine::Assessed(assessment),
            Err(err) => BatchLine::Rejected {
                error: err.to_string(),
            },
        })
        .collect())
}

/// Categories the model can tell apart for a field, for offering as choices.
pub fn known_categories<'a>(artifact: &'a ModelArtifact, field: &str) -> &'a [String] {
    match artifact
        .expected_schema()
        .fields()
        .iter()
        .find(|f| f.name == field && f.kind == FieldKind::Categorical)
    {
        Some(_) => artifact.encoder().categories(field).unwrap_or(&[]),
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::{assess, assess_batch, favourite, known_categories, BatchLine, MatchInput, Overs};
    use crate::artifact::Prediction;
    use crate::error::Error;
    use crate::features::{FeatureSet, MatchState};
    use crate::team::Team;
    use crate::training::tests::toy_artifact;
    use assert_approx_eq::assert_approx_eq;

    fn input(batting: &str, bowling: &str, overs: &str) -> MatchInput {
        MatchInput {
            city: "Mumbai".to_string(),
            batting_team: batting.to_string(),
            bowling_team: bowling.to_string(),
            target: 180,
            score: 80,
            overs: overs.parse().unwrap(),
            wickets: 2,
        }
    }

    #[test]
    fn test_overs() {
        assert_eq!("10.3".parse(), Ok(Overs { completed: 10, balls: 3 }));
        assert_eq!("10".parse(), Ok(Overs { completed: 10, balls: 0 }));
        assert_eq!("19.5".parse::<Overs>().unwrap().balls_bowled(), 119);
        assert_eq!("20".parse::<Overs>().unwrap().balls_bowled(), 120);
        assert!("10.6".parse::<Overs>().is_err());
        assert!("20.1".parse::<Overs>().is_err());
        assert!("ten".parse::<Overs>().is_err());
        assert!("21".parse::<Overs>().is_err());
        assert!("800000000".parse::<Overs>().is_err());
        assert!("4294967295.5".parse::<Overs>().is_err());
        assert_eq!(Overs { completed: 4, balls: 2 }.to_string(), "4.2");
    }

    #[test]
    fn test_overs_from_json() {
        let text: MatchInput = serde_json::from_str(
            r#"{"city":"Delhi","batting_team":"DC","bowling_team":"MI",
                "target":150,"score":20,"overs":"3.4","wickets":1}"#,
        )
        .unwrap();
        assert_eq!(text.overs.balls_bowled(), 22);

        let number: MatchInput = serde_json::from_str(
            r#"{"city":"Delhi","batting_team":"DC","bowling_team":"MI",
                "target":150,"score":20,"overs":3.4,"wickets":1}"#,
        )
        .unwrap();
        assert_eq!(number.overs, text.overs);
    }

    #[test]
    fn test_validate() {
        let state = input("MI", "Chennai Super Kings", "10").validate().unwrap();
        assert_eq!(state, MatchState::test(180, 80, 60, 2));

        assert!(matches!(
            input("MI", "Mumbai Indians", "10").validate(),
            Err(Error::SameTeams(Team::MumbaiIndians))
        ));
        assert!(matches!(
            input("MI", "Gujarat Lions", "10").validate(),
            Err(Error::InvalidInput(_))
        ));

        let mut all_out = input("MI", "CSK", "10");
        all_out.wickets = 10;
        assert!(all_out.validate().is_err());

        let mut no_target = input("MI", "CSK", "10");
        no_target.target = 0;
        assert!(no_target.validate().is_err());

        let mut renamed_city = input("MI", "CSK", "10");
        renamed_city.city = "Bengaluru".to_string();
        assert_eq!(renamed_city.validate().unwrap().city, "Bangalore");
    }

    #[test]
    fn test_favourite() {
        let state = MatchState::test(180, 80, 60, 2);
        let even = Prediction {
            p_loss: 0.5,
            p_win: 0.5,
        };
        assert_eq!(favourite(&state, &even), (Team::ChennaiSuperKings, 50.0));
        let ahead = Prediction {
            p_loss: 0.25,
            p_win: 0.75,
        };
        assert_eq!(favourite(&state, &ahead), (Team::MumbaiIndians, 75.0));
    }

    #[test]
    fn test_oversized_overs_in_batch_are_rejected() {
        let artifact = toy_artifact(FeatureSet::Base);
        let lines = r#"{"city":"Mumbai","batting_team":"MI","bowling_team":"CSK","target":180,
            "score":80,"overs":"800000000","wickets":2}"#;
        assert!(assess_batch(&artifact, lines.as_bytes()).is_err());
    }

    #[test]
    fn test_equal_teams_never_reach_the_model() {
        let artifact = toy_artifact(FeatureSet::Base);
        let state = MatchState {
            bowling_team: Team::MumbaiIndians,
            ..MatchState::test(180, 80, 60, 2)
        };
        assert!(matches!(
            assess(&artifact, &state),
            Err(Error::SameTeams(Team::MumbaiIndians))
        ));
    }

    #[test]
    fn test_assess() {
        let artifact = toy_artifact(FeatureSet::Extended);
        let assessment = assess(&artifact, &MatchState::test(180, 80, 60, 2)).unwrap();

        assert_eq!(assessment.runs_left, 100);
        assert_eq!(assessment.balls_left, 60);
        assert_eq!(assessment.wickets, 8);
        assert_approx_eq!(assessment.crr, 8.0);
        assert_approx_eq!(assessment.rrr, 10.0);
        assert_approx_eq!(assessment.win_percent + assessment.loss_percent, 100.0, 0.011);
        assert!(assessment.favourite_percent >= 50.0);
        if assessment.favourite == Team::MumbaiIndians {
            assert_approx_eq!(assessment.favourite_percent, assessment.win_percent);
        } else {
            assert_eq!(assessment.favourite, Team::ChennaiSuperKings);
            assert_approx_eq!(assessment.favourite_percent, assessment.loss_percent);
        }
    }

    #[test]
    fn test_unseen_city_still_predicts() {
        let artifact = toy_artifact(FeatureSet::Base);
        let state = MatchState {
            city: "Ranchi".to_string(),
            ..MatchState::test(180, 80, 60, 2)
        };
        assert!(assess(&artifact, &state).is_ok());
        assert!(!known_categories(&artifact, "city").contains(&"Ranchi".to_string()));
        assert_eq!(known_categories(&artifact, "city").len(), 3);
        assert!(known_categories(&artifact, "crr").is_empty());
    }

    #[test]
    fn test_batch() {
        let artifact = toy_artifact(FeatureSet::Base);
        let lines = r#"
            {"city":"Mumbai","batting_team":"MI","bowling_team":"CSK","target":180,"score":80,"overs":"10","wickets":2}
            {"city":"Mumbai","batting_team":"MI","bowling_team":"MI","target":180,"score":80,"overs":"10","wickets":2}
        "#;
        let results = assess_batch(&artifact, lines.as_bytes()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], BatchLine::Assessed(_)));
        match &results[1] {
            BatchLine::Rejected { error } => assert!(error.contains("Mumbai Indians")),
            other => panic!("expected a rejection, got {:?}", other),
        }

        assert!(assess_batch(&artifact, "{\"city\":".as_bytes()).is_err());
    }
}
