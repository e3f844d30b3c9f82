// Fantasy cricket rules: rosters under the credit cap, contest joins, and
// leaderboard ranking.

pub mod catalog;
pub mod contest;
pub mod error;
pub mod join;
pub mod leaderboard;
pub mod player;
pub mod roster;
pub mod session;

pub use catalog::Catalog;
pub use contest::{Contest, ContestStatus, Match, MatchStatus, Team, Visibility};
pub use error::{CatalogError, JoinError, UnknownRole, ValidationError};
pub use join::{ContestJoiner, JoinOutcome, Membership, TeamRecord};
pub use leaderboard::{LeaderboardView, RankedEntry, Ranking, DEFAULT_TOP};
pub use player::{Player, Role};
pub use roster::{
    credit_cost, CreditTable, FinalRoster, Pick, Rejection, Roster, RosterRules, Toggle,
    CREDIT_CAP, ROSTER_SIZE,
};
pub use session::FantasySession;
