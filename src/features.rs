//! Match-state to feature-record derivation.
//!
//! The same arithmetic runs over every historical delivery at training time and over a single
//! live snapshot at prediction time, so the two can never disagree about what a feature means.

use crate::team::Team;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FromIterator;
use std::str::FromStr;

pub const BALLS_PER_INNINGS: u32 = 120;
pub const WICKETS_PER_INNINGS: u32 = 10;

/// A snapshot of the chasing innings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MatchState {
    pub batting_team: Team,
    pub bowling_team: Team,
    pub city: String,
    pub target: u32,
    pub score: u32,
    pub balls_bowled: u32,
    pub wickets_fallen: u32,
}

/// Folds renamed host cities into the name the older logs use, so both land in one category.
pub fn canonical_city(name: &str) -> &str {
    let name = name.trim();
    match name {
        "Bengaluru" => "Bangalore",
        _ => name,
    }
}

/// The numeric half of a feature record, also shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchFeatures {
    pub runs_left: u32,
    pub balls_left: u32,
    pub wickets: u32,
    pub total_runs_x: u32,
    pub crr: f64,
    pub rrr: f64,
    pub pressure: f64,
    pub runs_per_wicket: f64,
}

impl MatchFeatures {
    pub fn derive(state: &MatchState) -> MatchFeatures {
        let runs_left = state.target.saturating_sub(state.score);
        let balls_left = BALLS_PER_INNINGS.saturating_sub(state.balls_bowled).max(1);
        let wickets = WICKETS_PER_INNINGS
            .saturating_sub(state.wickets_fallen)
            .max(1);

        let crr = if state.balls_bowled == 0 {
            0.0
        } else {
            f64::from(state.score) * 6.0 / f64::from(state.balls_bowled)
        };
        let rrr = f64::from(runs_left) * 6.0 / f64::from(balls_left);

        MatchFeatures {
            runs_left,
            balls_left,
            wickets,
            total_runs_x: state.target,
            crr,
            rrr,
            pressure: rrr - crr,
            runs_per_wicket: f64::from(runs_left) / f64::from(wickets.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FieldKind {
    Categorical,
    Numeric,
}

/// Every feature the deriver knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Field {
    BattingTeam,
    BowlingTeam,
    City,
    RunsLeft,
    BallsLeft,
    Wickets,
    TotalRunsX,
    Crr,
    Rrr,
    Pressure,
    RunsPerWicket,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::BattingTeam,
        Field::BowlingTeam,
        Field::City,
        Field::RunsLeft,
        Field::BallsLeft,
        Field::Wickets,
        Field::TotalRunsX,
        Field::Crr,
        Field::Rrr,
        Field::Pressure,
        Field::RunsPerWicket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::BattingTeam => "batting_team",
            Field::BowlingTeam => "bowling_team",
            Field::City => "city",
            Field::RunsLeft => "runs_left",
            Field::BallsLeft => "balls_left",
            Field::Wickets => "wickets",
            Field::TotalRunsX => "total_runs_x",
            Field::Crr => "crr",
            Field::Rrr => "rrr",
            Field::Pressure => "pressure",
            Field::RunsPerWicket => "runs_per_wicket",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::BattingTeam | Field::BowlingTeam | Field::City => FieldKind::Categorical,
            _ => FieldKind::Numeric,
        }
    }

    pub fn value(self, state: &MatchState, features: &MatchFeatures) -> Value {
        match self {
            Field::BattingTeam => Value::Category(state.batting_team.name().to_string()),
            Field::BowlingTeam => Value::Category(state.bowling_team.name().to_string()),
            Field::City => Value::Category(state.city.clone()),
            Field::RunsLeft => Value::number(f64::from(features.runs_left)),
            Field::BallsLeft => Value::number(f64::from(features.balls_left)),
            Field::Wickets => Value::number(f64::from(features.wickets)),
            Field::TotalRunsX => Value::number(f64::from(features.total_runs_x)),
            Field::Crr => Value::number(features.crr),
            Field::Rrr => Value::number(features.rrr),
            Field::Pressure => Value::number(features.pressure),
            Field::RunsPerWicket => Value::number(features.runs_per_wicket),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static BASE_FIELDS: [Field; 9] = [
    Field::BattingTeam,
    Field::BowlingTeam,
    Field::City,
    Field::RunsLeft,
    Field::BallsLeft,
    Field::Wickets,
    Field::TotalRunsX,
    Field::Crr,
    Field::Rrr,
];

/// Which fields a deployment trains on. Fixed per artifact; serving reads it back from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FeatureSet {
    Base,
    Extended,
}

impl FeatureSet {
    pub fn fields(self) -> &'static [Field] {
        match self {
            FeatureSet::Base => &BASE_FIELDS,
            FeatureSet::Extended => &Field::ALL,
        }
    }
}

impl FromStr for FeatureSet {
    type Err = String;

    fn from_str(s: &str) -> Result<FeatureSet, String> {
        match s {
            "base" => Ok(FeatureSet::Base),
            "extended" => Ok(FeatureSet::Extended),
            _ => Err(format!("unknown feature set {:?} (expected base or extended)", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Category(String),
    Number(f64),
}

impl Value {
    /// Non-finite results are replaced with 0 before they reach the model.
    pub fn number(x: f64) -> Value {
        Value::Number(if x.is_finite() { x } else { 0.0 })
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Category(_) => FieldKind::Categorical,
            Value::Number(_) => FieldKind::Numeric,
        }
    }
}

/// Named feature values in submission order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FeatureRecord(Vec<(String, Value)>);

impl FeatureRecord {
    pub fn new() -> FeatureRecord {
        FeatureRecord::default()
    }

    pub fn push<S: Into<String>>(&mut self, name: S, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> FeatureRecord {
        FeatureRecord(iter.into_iter().collect())
    }
}

impl MatchState {
    pub fn features(&self) -> MatchFeatures {
        MatchFeatures::derive(self)
    }

    /// Derives the requested fields, in the order given.
    pub fn record(&self, fields: &[Field]) -> FeatureRecord {
        let features = self.features();
        fields
            .iter()
            .map(|field| (field.name().to_string(), field.value(self, &features)))
            .collect()
    }
}
