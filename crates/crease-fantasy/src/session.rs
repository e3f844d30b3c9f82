// One user's team-building session for a single contest.

use std::time::Duration;

use crease_core::UserId;
use tracing::debug;

use crate::error::JoinError;
use crate::join::{ContestJoiner, JoinOutcome};
use crate::player::Player;
use crate::roster::{Roster, RosterRules, Toggle};

/// Roster plus the "joined" flag shown on the confirmation screen.
///
/// Owned by one caller. A failed submit leaves both the roster and the flag
/// as they were.
#[derive(Debug, Clone)]
pub struct FantasySession {
    user: UserId,
    contest_id: String,
    roster: Roster,
    joined: bool,
}

impl FantasySession {
    pub fn new(user: UserId, contest_id: impl Into<String>, rules: RosterRules) -> Self {
        FantasySession {
            user,
            contest_id: contest_id.into(),
            roster: Roster::new(rules),
            joined: false,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn has_joined(&self) -> bool {
        self.joined
    }

    pub fn toggle(&mut self, player: &Player) -> Toggle {
        let result = self.roster.toggle(player);
        debug!(
            "Toggle {} -> {:?} ({} players, {} credits)",
            player.id,
            result,
            self.roster.len(),
            self.roster.credits_used()
        );
        result
    }

    /// Add players in order until the roster is full, skipping any that do
    /// not fit. Returns how many were added.
    pub fn auto_fill(&mut self, pool: &[Player]) -> usize {
        let mut added = 0;
        for player in pool {
            if self.roster.is_full() {
                break;
            }
            if self.roster.can_add(player) && self.toggle(player) == Toggle::Added {
                added += 1;
            }
        }
        added
    }

    pub async fn submit(
        &mut self,
        joiner: &ContestJoiner,
        limit: Duration,
    ) -> Result<JoinOutcome, JoinError> {
        let outcome = joiner
            .join_with_timeout(&self.user, &self.contest_id, &self.roster, limit)
            .await?;
        self.joined = true;
        Ok(outcome)
    }
}
