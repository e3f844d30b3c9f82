// One-time fixture generation: players from CSV, teams derived from them, a
// match for each consecutive team pair, an open contest and an empty
// leaderboard per match.
//
// Everything goes out in a single batch together with a conditional-create
// marker, so a store is seeded at most once and never half-seeded.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use crease_core::{encode, DocumentStore, Namespace, StoreError, WriteBatch};
use crease_fantasy::catalog::{CONTESTS, LEADERBOARDS, MATCHES, PLAYERS, TEAMS};
use crease_fantasy::contest::Prize;
use crease_fantasy::{Contest, ContestStatus, Match, MatchStatus, Player, Role, Team, Visibility};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Collection holding bookkeeping documents.
pub const META: &str = "meta";
/// Marker document id; its presence means the store has been seeded.
pub const SEED_MARKER: &str = "seed";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("no usable players in {0}")]
    NoPlayers(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Raw CSV row (private)
// ---------------------------------------------------------------------------

/// One player row. Stat columns are optional and may be blank.
#[derive(Debug, Deserialize)]
struct RawPlayer {
    id: String,
    name: String,
    team: String,
    role: String,
    #[serde(default)]
    matches: Option<u32>,
    #[serde(default)]
    runs: Option<u32>,
    #[serde(default)]
    average: Option<f64>,
    #[serde(default)]
    strike_rate: Option<f64>,
    #[serde(default)]
    wickets: Option<u32>,
    #[serde(default)]
    economy: Option<f64>,
}

/// Lowercase, dash-separated form of a team name, used as its id.
pub fn team_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Initials of a multi-word name ("Chennai Kings" -> "CK"), or the first
/// three letters of a single word.
fn short_name(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() > 1 {
        words
            .iter()
            .filter_map(|w| w.chars().next())
            .collect::<String>()
            .to_uppercase()
    } else {
        name.chars().take(3).collect::<String>().to_uppercase()
    }
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
                continue;
            }
        };
        let id = raw.id.trim();
        if id.is_empty() || id.contains('/') {
            warn!("skipping player '{}': unusable id '{}'", raw.name.trim(), id);
            continue;
        }
        let role = match Role::parse(&raw.role) {
            Ok(role) => role,
            Err(e) => {
                warn!("skipping player '{}': {}", raw.name.trim(), e);
                continue;
            }
        };
        let mut player =
            Player::new(id, raw.name.trim(), role).with_team(team_slug(&raw.team));
        if raw.matches.is_some() || raw.runs.is_some() {
            player.batting = json!({
                "matches": raw.matches,
                "runs": raw.runs,
                "average": raw.average,
                "strike_rate": raw.strike_rate,
            });
        }
        if raw.wickets.is_some() {
            player.bowling = json!({
                "wickets": raw.wickets,
                "economy": raw.economy,
            });
        }
        players.push(player);
    }
    Ok(players)
}

/// Teams in first-seen order, named from `names` where known.
fn derive_teams(players: &[Player], names: &[(String, String)]) -> Vec<Team> {
    let mut teams: Vec<Team> = Vec::new();
    for player in players {
        if player.team.is_empty() || teams.iter().any(|t| t.id == player.team) {
            continue;
        }
        let name = names
            .iter()
            .find(|(slug, _)| slug == &player.team)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| player.team.clone());
        teams.push(Team {
            id: player.team.clone(),
            short_name: short_name(&name),
            name,
            home_ground: String::new(),
        });
    }
    teams
}

// ---------------------------------------------------------------------------
// Fixture generation
// ---------------------------------------------------------------------------

/// Everything one seeding run writes.
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub matches: Vec<Match>,
    pub contests: Vec<Contest>,
}

impl Fixtures {
    /// Build fixtures from a player list. Matches start a day apart from
    /// `first_start`.
    pub fn build(players: Vec<Player>, first_start: DateTime<Utc>) -> Self {
        Self::build_named(players, &[], first_start)
    }

    /// Like [`build`](Self::build), with display names for team slugs.
    pub fn build_named(
        players: Vec<Player>,
        team_names: &[(String, String)],
        first_start: DateTime<Utc>,
    ) -> Self {
        let teams = derive_teams(&players, team_names);
        let mut matches = Vec::new();
        let mut contests = Vec::new();
        for (i, pair) in teams.windows(2).enumerate() {
            let n = i + 1;
            let fixture = Match {
                id: format!("m{n}"),
                home_team: pair[0].id.clone(),
                away_team: pair[1].id.clone(),
                venue: String::new(),
                starts_at: first_start + Duration::days(i as i64),
                status: MatchStatus::Upcoming,
                innings: Vec::new(),
            };
            contests.push(Contest {
                id: format!("c{n}"),
                name: format!("{} vs {} Mega Contest", pair[0].short_name, pair[1].short_name),
                match_id: fixture.id.clone(),
                visibility: Visibility::Public,
                status: ContestStatus::Open,
                prize: Some(Prize {
                    pool: 10_000,
                    currency: "INR".into(),
                    winners: 3,
                }),
            });
            matches.push(fixture);
        }
        Fixtures {
            teams,
            players,
            matches,
            contests,
        }
    }

    fn into_batch(
        self,
        ns: &Namespace,
        seeded_at: DateTime<Utc>,
    ) -> Result<WriteBatch, StoreError> {
        let mut batch = WriteBatch::new();
        batch.create(
            ns.doc(META, SEED_MARKER)?,
            json!({
                "seeded_at": seeded_at,
                "players": self.players.len(),
                "contests": self.contests.len(),
            }),
        );
        for team in &self.teams {
            batch.set(ns.doc(TEAMS, &team.id)?, encode(team)?);
        }
        for player in &self.players {
            batch.set(ns.doc(PLAYERS, &player.id)?, encode(player)?);
        }
        for fixture in &self.matches {
            batch.set(ns.doc(MATCHES, &fixture.id)?, encode(fixture)?);
        }
        for contest in &self.contests {
            batch.set(ns.doc(CONTESTS, &contest.id)?, encode(contest)?);
            batch.set(ns.doc(LEADERBOARDS, &contest.id)?, json!({ "scores": {} }));
        }
        Ok(batch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { teams: usize, players: usize, contests: usize },
    AlreadySeeded,
}

/// Write `fixtures` to the public namespace unless the store was seeded
/// before.
pub async fn seed_store(
    store: &dyn DocumentStore,
    app_id: &str,
    fixtures: Fixtures,
) -> Result<SeedOutcome, SeedError> {
    let ns = Namespace::public(app_id)?;
    let counts = (fixtures.teams.len(), fixtures.players.len(), fixtures.contests.len());
    let batch = fixtures.into_batch(&ns, Utc::now())?;
    match store.commit(batch).await {
        Ok(()) => {
            info!(
                "Seeded {} teams, {} players, {} contests",
                counts.0, counts.1, counts.2
            );
            Ok(SeedOutcome::Seeded {
                teams: counts.0,
                players: counts.1,
                contests: counts.2,
            })
        }
        Err(StoreError::AlreadyExists { .. }) => {
            info!("Store already seeded, skipping");
            Ok(SeedOutcome::AlreadySeeded)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load players from `csv_path` and seed. A seeded store is left alone
/// without reading the CSV.
pub async fn seed_from_csv(
    store: &dyn DocumentStore,
    app_id: &str,
    csv_path: &Path,
) -> Result<SeedOutcome, SeedError> {
    let marker = Namespace::public(app_id)?.doc(META, SEED_MARKER)?;
    match store.get(&marker).await {
        Ok(_) => {
            info!("Store already seeded, skipping");
            return Ok(SeedOutcome::AlreadySeeded);
        }
        Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let (players, names) = load_players(csv_path)?;
    let first_start = (Utc::now() + Duration::days(1))
        .date_naive()
        .and_hms_opt(14, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or_else(Utc::now);
    seed_store(store, app_id, Fixtures::build_named(players, &names, first_start)).await
}

/// Load players from a CSV file, skipping malformed rows. Also returns each
/// team's display name keyed by slug.
pub fn load_players(path: &Path) -> Result<(Vec<Player>, Vec<(String, String)>), SeedError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| SeedError::Io {
        path: display.clone(),
        source: e,
    })?;
    let names = team_names_from_reader(text.as_bytes()).map_err(|e| SeedError::Csv {
        path: display.clone(),
        source: e,
    })?;
    let players = load_players_from_reader(text.as_bytes()).map_err(|e| SeedError::Csv {
        path: display.clone(),
        source: e,
    })?;
    if players.is_empty() {
        return Err(SeedError::NoPlayers(display));
    }
    Ok((players, names))
}

#[derive(Debug, Deserialize)]
struct RawTeamColumn {
    team: String,
}

fn team_names_from_reader<R: Read>(rdr: R) -> Result<Vec<(String, String)>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut names: Vec<(String, String)> = Vec::new();
    for row in reader.deserialize::<RawTeamColumn>().flatten() {
        let name = row.team.trim().to_string();
        let slug = team_slug(&name);
        if !slug.is_empty() && !names.iter().any(|(s, _)| s == &slug) {
            names.push((slug, name));
        }
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
