// Teams, matches, and contests as stored in the public namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A franchise in the league's teams directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub home_ground: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
}

/// One innings line for the live-scores screen, e.g. 164/6 in 20.0 overs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsScore {
    pub team: String,
    pub runs: u32,
    pub wickets: u8,
    /// Overs as displayed, e.g. "18.4".
    pub overs: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default)]
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub status: MatchStatus,
    #[serde(default)]
    pub innings: Vec<InningsScore>,
}

impl Match {
    pub fn involves(&self, team_id: &str) -> bool {
        self.home_team == team_id || self.away_team == team_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Open,
    Closed,
}

/// Prize metadata. Display only; nothing here moves money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    pub pool: u64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub winners: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub match_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub status: ContestStatus,
    #[serde(default)]
    pub prize: Option<Prize>,
}

impl Contest {
    pub fn is_open(&self) -> bool {
        self.status == ContestStatus::Open
    }
}
