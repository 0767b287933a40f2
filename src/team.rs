use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Team {
    SunrisersHyderabad,
    MumbaiIndians,
    RoyalChallengersBangalore,
    KolkataKnightRiders,
    KingsXiPunjab,
    ChennaiSuperKings,
    RajasthanRoyals,
    DelhiCapitals,
}

impl Team {
    pub const ALL: [Team; 8] = [
        Team::SunrisersHyderabad,
        Team::MumbaiIndians,
        Team::RoyalChallengersBangalore,
        Team::KolkataKnightRiders,
        Team::KingsXiPunjab,
        Team::ChennaiSuperKings,
        Team::RajasthanRoyals,
        Team::DelhiCapitals,
    ];

    /// The name as it appears in the match logs, and as the encoder sees it.
    pub fn name(self) -> &'static str {
        match self {
            Team::SunrisersHyderabad => "Sunrisers Hyderabad",
            Team::MumbaiIndians => "Mumbai Indians",
            Team::RoyalChallengersBangalore => "Royal Challengers Bangalore",
            Team::KolkataKnightRiders => "Kolkata Knight Riders",
            Team::KingsXiPunjab => "Kings XI Punjab",
            Team::ChennaiSuperKings => "Chennai Super Kings",
            Team::RajasthanRoyals => "Rajasthan Royals",
            Team::DelhiCapitals => "Delhi Capitals",
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Team::SunrisersHyderabad => "SRH",
            Team::MumbaiIndians => "MI",
            Team::RoyalChallengersBangalore => "RCB",
            Team::KolkataKnightRiders => "KKR",
            Team::KingsXiPunjab => "KXIP",
            Team::ChennaiSuperKings => "CSK",
            Team::RajasthanRoyals => "RR",
            Team::DelhiCapitals => "DC",
        }
    }

    // Former names that are folded into the current franchise.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Team::DelhiCapitals => &["Delhi Daredevils", "DD"],
            Team::KingsXiPunjab => &["Punjab Kings", "PBKS"],
            Team::RoyalChallengersBangalore => &["Royal Challengers Bengaluru"],
            _ => &[],
        }
    }

    pub fn matches_name(self, name: &str) -> bool {
        let name = name.trim();
        self.name().eq_ignore_ascii_case(name)
            || self.abbreviation().eq_ignore_ascii_case(name)
            || self.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTeam(pub String);

impl fmt::Display for UnknownTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown team {:?}", self.0)
    }
}

impl std::error::Error for UnknownTeam {}

impl FromStr for Team {
    type Err = UnknownTeam;

    fn from_str(s: &str) -> Result<Team, UnknownTeam> {
        Team::ALL
            .iter()
            .copied()
            .find(|t| t.matches_name(s))
            .ok_or_else(|| UnknownTeam(s.to_string()))
    }
}
