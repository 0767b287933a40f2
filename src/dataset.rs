use crate::features::{canonical_city, MatchState, BALLS_PER_INNINGS, WICKETS_PER_INNINGS};
use crate::read_dir::Fingerprint;
use crate::team::Team;
use anyhow::{Context, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const CACHE_VERSION: u64 = 1;

pub const MATCHES_FILE: &str = "matches.csv";
pub const DELIVERIES_FILE: &str = "deliveries.csv";

/// One delivery of a chase, labelled with whether the chasing side went on to win.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Example {
    pub match_id: u32,
    pub state: MatchState,
    pub won: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TrainingSet {
    pub examples: Vec<Example>,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    id: u32,
    city: Option<String>,
    team1: String,
    team2: String,
    winner: Option<String>,
    #[serde(default)]
    dl_applied: u8,
    // Later seasons record the rain rule by name instead.
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeliveryRow {
    match_id: u32,
    inning: u8,
    batting_team: String,
    bowling_team: String,
    over: u32,
    ball: u32,
    total_runs: u32,
    #[serde(default)]
    player_dismissed: Option<String>,
    #[serde(default)]
    is_wicket: Option<u8>,
}

impl DeliveryRow {
    fn dismissal(&self) -> bool {
        match self.is_wicket {
            Some(flag) => flag != 0,
            None => present(&self.player_dismissed).is_some(),
        }
    }
}

#[derive(Debug)]
struct MatchInfo {
    city: String,
    winner: Team,
}

#[derive(Debug, Hash)]
struct CacheKey<'a> {
    version: u64,
    fingerprint: &'a Fingerprint,
}

impl TrainingSet {
    /// Reads `matches.csv` and `deliveries.csv` from `dir`, reusing previously derived examples
    /// when neither file has changed.
    #[instrument(name = "TrainingSet::load", skip(dir))]
    pub fn load<P: AsRef<Path>>(dir: P, first_over: u32, use_cache: bool) -> Result<TrainingSet> {
        let dir = dir.as_ref();
        let fingerprint = Fingerprint::read(dir, &[MATCHES_FILE, DELIVERIES_FILE], first_over)
            .with_context(|| format!("unable to read match logs in {}", dir.display()))?;
        let cache_dir = cache_dir();
        match &cache_dir {
            Ok(cache_dir) if use_cache => {
                if let Ok(cache) = TrainingSet::load_from_cache(cache_dir, &fingerprint) {
                    info!(examples = cache.examples.len(), "using cached examples");
                    return Ok(cache);
                }
            }
            _ => {}
        }

        let matches = File::open(dir.join(MATCHES_FILE))
            .with_context(|| format!("unable to open {}", MATCHES_FILE))?;
        let deliveries = File::open(dir.join(DELIVERIES_FILE))
            .with_context(|| format!("unable to open {}", DELIVERIES_FILE))?;
        let set = TrainingSet::from_readers(
            BufReader::new(matches),
            BufReader::new(deliveries),
            first_over,
        )?;

        let saved = cache_dir.and_then(|cache_dir| set.save_to_cache(&cache_dir, &fingerprint));
        if let Err(err) = saved {
            warn!(%err, "unable to cache examples");
        }
        Ok(set)
    }

    /// Builds examples from the two logs. `first_over` is the number the logs give the opening
    /// over (1 in the older exports, 0 in the newer).
    pub fn from_readers<M: Read, D: Read>(
        matches: M,
        deliveries: D,
        first_over: u32,
    ) -> Result<TrainingSet> {
        let matches = read_matches(matches)?;

        let mut first_innings: FxHashMap<u32, u32> = FxHashMap::default();
        let mut chases: FxHashMap<u32, Vec<DeliveryRow>> = FxHashMap::default();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(deliveries);
        for row in reader.deserialize() {
            let row: DeliveryRow = row.context("malformed delivery row")?;
            if !matches.contains_key(&row.match_id) {
                continue;
            }
            match row.inning {
                1 => *first_innings.entry(row.match_id).or_default() += row.total_runs,
                2 => chases.entry(row.match_id).or_default().push(row),
                _ => {}
            }
        }

        let mut ids: Vec<u32> = matches.keys().copied().collect();
        ids.sort_unstable();

        let mut examples = Vec::new();
        for id in ids {
            let target = match first_innings.get(&id) {
                Some(&total) if total > 0 => total,
                _ => continue,
            };
            let balls = match chases.get(&id) {
                Some(balls) => balls,
                None => continue,
            };
            chase_examples(id, &matches[&id], target, balls, first_over, &mut examples);
        }

        let set = TrainingSet { examples };
        info!(
            matches = set.matches(),
            examples = set.examples.len(),
            "derived training examples"
        );
        Ok(set)
    }

    pub fn matches(&self) -> usize {
        self.examples
            .iter()
            .map(|e| e.match_id)
            .collect::<FxHashSet<u32>>()
            .len()
    }

    fn load_from_cache(cache_dir: &Path, fingerprint: &Fingerprint) -> Result<TrainingSet> {
        let mut reader = GzDecoder::new(File::open(cache_path(cache_dir, fingerprint))?);
        Ok(bincode::deserialize_from(&mut reader)?)
    }

    fn save_to_cache(&self, cache_dir: &Path, fingerprint: &Fingerprint) -> Result<()> {
        let cache_path = cache_path(cache_dir, fingerprint);
        let mut writer = GzEncoder::new(Vec::new(), Compression::default());
        bincode::serialize_into(&mut writer, self)?;
        let data = writer.finish()?;
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(cache_path, data)?;
        Ok(())
    }
}

fn read_matches<R: Read>(reader: R) -> Result<FxHashMap<u32, MatchInfo>> {
    let mut matches = FxHashMap::default();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    for row in reader.deserialize() {
        let row: MatchRow = row.context("malformed match row")?;
        let rain_affected = row.dl_applied != 0 || present(&row.method).is_some();
        if rain_affected {
            debug!(id = row.id, "skipping rain-affected match");
            continue;
        }
        if row.team1.parse::<Team>().is_err() || row.team2.parse::<Team>().is_err() {
            debug!(
                id = row.id,
                team1 = %row.team1,
                team2 = %row.team2,
                "skipping match outside the team set"
            );
            continue;
        }
        let winner = match present(&row.winner).and_then(|w| w.parse::<Team>().ok()) {
            Some(winner) => winner,
            None => {
                debug!(id = row.id, "skipping match without a result");
                continue;
            }
        };
        let city = match present(&row.city) {
            Some(city) => canonical_city(city).to_string(),
            None => {
                debug!(id = row.id, "skipping match without a city");
                continue;
            }
        };
        matches.insert(row.id, MatchInfo { city, winner });
    }
    Ok(matches)
}

fn chase_examples(
    match_id: u32,
    info: &MatchInfo,
    target: u32,
    balls: &[DeliveryRow],
    first_over: u32,
    examples: &mut Vec<Example>,
) {
    let mut score = 0;
    let mut wickets_fallen = 0;
    for ball in balls {
        let (batting_team, bowling_team) =
            match (ball.batting_team.parse::<Team>(), ball.bowling_team.parse::<Team>()) {
                (Ok(bat), Ok(bowl)) if bat != bowl => (bat, bowl),
                _ => {
                    debug!(match_id, "skipping chase with unrecognised teams");
                    return;
                }
            };

        score += ball.total_runs;
        if ball.dismissal() {
            wickets_fallen += 1;
        }
        // Extras can push the ball number past six; they do not advance the over.
        let balls_bowled = ball.over.saturating_sub(first_over) * 6 + ball.ball.min(6);

        let finished = score >= target
            || balls_bowled >= BALLS_PER_INNINGS
            || wickets_fallen >= WICKETS_PER_INNINGS;
        if finished {
            continue;
        }
        examples.push(Example {
            match_id,
            won: batting_team == info.winner,
            state: MatchState {
                batting_team,
                bowling_team,
                city: info.city.clone(),
                target,
                score,
                balls_bowled,
                wickets_fallen,
            },
        });
    }
}

/// Empty fields and the newer exports' `NA` both mean absent.
fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "NA")
}

fn cache_dir() -> Result<PathBuf> {
    Ok(dirs::cache_dir()
        .context("unable to find cache dir")?
        .join(env!("CARGO_PKG_NAME")))
}

fn cache_path(cache_dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    let mut hasher = FxHasher::default();
    let key = CacheKey {
        version: CACHE_VERSION,
        fingerprint,
    };
    key.hash(&mut hasher);
    cache_dir.join(format!("examples-{:x}.bincode.gz", hasher.finish()))
}

#[cfg(test)]
pub mod tests {
    use super::{cache_path, TrainingSet, DELIVERIES_FILE, MATCHES_FILE};
    use crate::read_dir::Fingerprint;
    use crate::team::Team;
    use maplit::btreemap;
    use std::collections::BTreeMap;
    use std::fs;

    pub const MATCHES: &str = "\
id,season,city,team1,team2,winner,dl_applied
1,2017,Hyderabad,Sunrisers Hyderabad,Royal Challengers Bangalore,Sunrisers Hyderabad,0
2,2017,Pune,Rising Pune Supergiant,Mumbai Indians,Rising Pune Supergiant,0
3,2017,Delhi,Delhi Daredevils,Mumbai Indians,Delhi Daredevils,0
4,2017,Mumbai,Mumbai Indians,Chennai Super Kings,Chennai Super Kings,1
5,2017,Kolkata,Kolkata Knight Riders,Rajasthan Royals,,0
";

    pub const DELIVERIES: &str = "\
match_id,inning,batting_team,bowling_team,over,ball,total_runs,player_dismissed
1,1,Sunrisers Hyderabad,Royal Challengers Bangalore,1,1,4,
1,1,Sunrisers Hyderabad,Royal Challengers Bangalore,1,2,6,
1,2,Royal Challengers Bangalore,Sunrisers Hyderabad,1,1,1,
1,2,Royal Challengers Bangalore,Sunrisers Hyderabad,1,2,0,V Kohli
1,2,Royal Challengers Bangalore,Sunrisers Hyderabad,1,3,2,
2,1,Rising Pune Supergiant,Mumbai Indians,1,1,1,
2,2,Mumbai Indians,Rising Pune Supergiant,1,1,0,
3,1,Mumbai Indians,Delhi Daredevils,1,1,3,
3,2,Delhi Daredevils,Mumbai Indians,1,1,1,
3,2,Delhi Daredevils,Mumbai Indians,1,2,2,
4,1,Mumbai Indians,Chennai Super Kings,1,1,1,
4,2,Chennai Super Kings,Mumbai Indians,1,1,0,
5,1,Kolkata Knight Riders,Rajasthan Royals,1,1,1,
5,2,Rajasthan Royals,Kolkata Knight Riders,1,1,0,
";

    fn load() -> TrainingSet {
        TrainingSet::from_readers(MATCHES.as_bytes(), DELIVERIES.as_bytes(), 1).unwrap()
    }

    #[test]
    fn test_filters() {
        let set = load();
        assert_eq!(set.matches(), 2);
        assert_eq!(set.examples.len(), 4);

        let mut per_match = BTreeMap::new();
        for e in &set.examples {
            *per_match.entry(e.match_id).or_insert(0) += 1;
        }
        assert_eq!(per_match, btreemap! { 1 => 3, 3 => 1 });
    }

    #[test]
    fn test_running_totals() {
        let set = load();
        let chase: Vec<_> = set.examples.iter().filter(|e| e.match_id == 1).collect();
        assert_eq!(chase.len(), 3);

        let progress: Vec<(u32, u32, u32)> = chase
            .iter()
            .map(|e| (e.state.score, e.state.balls_bowled, e.state.wickets_fallen))
            .collect();
        assert_eq!(progress, vec![(1, 1, 0), (1, 2, 1), (3, 3, 1)]);

        for e in &chase {
            assert_eq!(e.state.target, 10);
            assert_eq!(e.state.city, "Hyderabad");
            assert_eq!(e.state.batting_team, Team::RoyalChallengersBangalore);
            assert_eq!(e.state.bowling_team, Team::SunrisersHyderabad);
            assert!(!e.won);
        }
    }

    #[test]
    fn test_renamed_team_and_finished_chase() {
        let set = load();
        let chase: Vec<_> = set.examples.iter().filter(|e| e.match_id == 3).collect();
        // The second ball reaches the target and is dropped.
        assert_eq!(chase.len(), 1);
        assert_eq!(chase[0].state.batting_team, Team::DelhiCapitals);
        assert_eq!(chase[0].state.target, 3);
        assert!(chase[0].won);
    }

    #[test]
    fn test_zero_based_overs() {
        let deliveries = DELIVERIES
            .replace(",1,1,", ",0,1,")
            .replace(",1,2,", ",0,2,")
            .replace(",1,3,", ",0,3,");
        let set =
            TrainingSet::from_readers(MATCHES.as_bytes(), deliveries.as_bytes(), 0).unwrap();
        assert_eq!(set.examples, load().examples);
    }

    #[test]
    fn test_malformed_rows() {
        let result = TrainingSet::from_readers(
            MATCHES.as_bytes(),
            "match_id,inning\n1,one\n".as_bytes(),
            1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_newer_export_format() {
        let matches = "\
id,season,city,date,team1,team2,winner,result,target_runs,method
7,2024,Bengaluru,2024-04-01,Mumbai Indians,Chennai Super Kings,Chennai Super Kings,wickets,11,NA
";
        let deliveries = "\
match_id,inning,batting_team,bowling_team,over,ball,total_runs,is_wicket,player_dismissed
7,1,Mumbai Indians,Chennai Super Kings,0,1,4,0,NA
7,1,Mumbai Indians,Chennai Super Kings,0,2,6,0,NA
7,2,Chennai Super Kings,Mumbai Indians,0,1,1,0,NA
7,2,Chennai Super Kings,Mumbai Indians,0,2,0,0,NA
7,2,Chennai Super Kings,Mumbai Indians,0,3,2,0,NA
7,2,Chennai Super Kings,Mumbai Indians,0,4,0,1,MS Dhoni
";
        let set = TrainingSet::from_readers(matches.as_bytes(), deliveries.as_bytes(), 0).unwrap();
        let wickets: Vec<u32> = set.examples.iter().map(|e| e.state.wickets_fallen).collect();
        assert_eq!(wickets, vec![0, 0, 0, 1]);
        let balls: Vec<u32> = set.examples.iter().map(|e| e.state.balls_bowled).collect();
        assert_eq!(balls, vec![1, 2, 3, 4]);
        for e in &set.examples {
            assert_eq!(e.state.city, "Bangalore");
            assert_eq!(e.state.target, 10);
            assert!(e.won);
        }
    }

    #[test]
    fn test_cache() {
        let dir = std::env::temp_dir().join(format!("ipl-win-dataset-{}", std::process::id()));
        let cache = dir.join("cache");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MATCHES_FILE), MATCHES).unwrap();
        fs::write(dir.join(DELIVERIES_FILE), DELIVERIES).unwrap();
        let names = [MATCHES_FILE, DELIVERIES_FILE];

        let fingerprint = Fingerprint::read(&dir, &names, 1).unwrap();
        assert!(TrainingSet::load_from_cache(&cache, &fingerprint).is_err());
        let set = load();
        set.save_to_cache(&cache, &fingerprint).unwrap();
        let cached = TrainingSet::load_from_cache(&cache, &fingerprint).unwrap();
        assert_eq!(cached.examples, set.examples);

        let zero_based = Fingerprint::read(&dir, &names, 0).unwrap();
        assert_ne!(cache_path(&cache, &zero_based), cache_path(&cache, &fingerprint));
        assert!(TrainingSet::load_from_cache(&cache, &zero_based).is_err());

        fs::write(dir.join(DELIVERIES_FILE), &DELIVERIES[..DELIVERIES.len() - 40]).unwrap();
        let rewritten = Fingerprint::read(&dir, &names, 1).unwrap();
        assert_ne!(cache_path(&cache, &rewritten), cache_path(&cache, &fingerprint));
        assert!(TrainingSet::load_from_cache(&cache, &rewritten).is_err());

        fs::remove_dir_all(&dir).ok();
    }
}
