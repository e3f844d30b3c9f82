// Roster construction under the size and credit caps.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::player::{Player, Role};

/// Players per fantasy team.
pub const ROSTER_SIZE: usize = 11;

/// Credits available to build one team.
pub const CREDIT_CAP: u32 = 100;

/// Credit cost per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTable {
    pub batsman: u32,
    pub bowler: u32,
    pub all_rounder: u32,
}

impl Default for CreditTable {
    fn default() -> Self {
        CreditTable {
            batsman: 7,
            bowler: 8,
            all_rounder: 9,
        }
    }
}

impl CreditTable {
    pub fn cost(&self, role: Role) -> u32 {
        match role {
            Role::Batsman => self.batsman,
            Role::Bowler => self.bowler,
            Role::AllRounder => self.all_rounder,
        }
    }
}

/// Credit cost of a role under the standard table.
pub fn credit_cost(role: Role) -> u32 {
    CreditTable::default().cost(role)
}

/// Size and budget limits for one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRules {
    pub max_players: usize,
    pub credit_cap: u32,
    pub credits: CreditTable,
}

impl Default for RosterRules {
    fn default() -> Self {
        RosterRules {
            max_players: ROSTER_SIZE,
            credit_cap: CREDIT_CAP,
            credits: CreditTable::default(),
        }
    }
}

/// A selected player and the credits they cost at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub player_id: String,
    pub role: Role,
    pub cost: u32,
}

/// Why a player could not be added.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("roster is full ({max} players)")]
    RosterFull { max: usize },

    #[error("player {player_id} is already selected")]
    AlreadySelected { player_id: String },

    #[error("player costs {cost} credits, only {remaining} left")]
    OverBudget { cost: u32, remaining: u32 },
}

/// Result of [`Roster::toggle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
    /// The roster is unchanged.
    Rejected(Rejection),
}

/// An in-progress team selection.
///
/// Every reachable state satisfies `len() <= max_players` and
/// `credits_used() <= credit_cap`: additions are checked before they happen
/// and removals can never break either limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    rules: RosterRules,
    picks: Vec<Pick>,
}

impl Default for Roster {
    fn default() -> Self {
        Roster::new(RosterRules::default())
    }
}

impl Roster {
    pub fn new(rules: RosterRules) -> Self {
        Roster {
            rules,
            picks: Vec::with_capacity(rules.max_players),
        }
    }

    pub fn rules(&self) -> &RosterRules {
        &self.rules
    }

    /// Selected players in selection order.
    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.picks.iter().map(|p| p.player_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.picks.len() >= self.rules.max_players
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.picks.iter().any(|p| p.player_id == player_id)
    }

    pub fn credits_used(&self) -> u32 {
        self.picks.iter().map(|p| p.cost).sum()
    }

    pub fn credits_remaining(&self) -> u32 {
        self.rules.credit_cap.saturating_sub(self.credits_used())
    }

    /// Credits `player` would cost on this roster.
    pub fn cost_of(&self, player: &Player) -> u32 {
        self.rules.credits.cost(player.role)
    }

    /// Check whether `player` can be added, naming the first rule it breaks.
    pub fn check_add(&self, player: &Player) -> Result<(), Rejection> {
        if self.is_full() {
            return Err(Rejection::RosterFull {
                max: self.rules.max_players,
            });
        }
        if self.contains(&player.id) {
            return Err(Rejection::AlreadySelected {
                player_id: player.id.clone(),
            });
        }
        let cost = self.cost_of(player);
        let remaining = self.credits_remaining();
        if cost > remaining {
            return Err(Rejection::OverBudget { cost, remaining });
        }
        Ok(())
    }

    pub fn can_add(&self, player: &Player) -> bool {
        self.check_add(player).is_ok()
    }

    /// Select `player` if absent, deselect if present.
    ///
    /// Removal always succeeds. Addition happens only when [`Roster::check_add`]
    /// passes; otherwise the roster is left as it was and the reason returned.
    pub fn toggle(&mut self, player: &Player) -> Toggle {
        if self.remove(&player.id).is_some() {
            return Toggle::Removed;
        }
        match self.check_add(player) {
            Ok(()) => {
                self.picks.push(Pick {
                    player_id: player.id.clone(),
                    role: player.role,
                    cost: self.cost_of(player),
                });
                Toggle::Added
            }
            Err(reason) => Toggle::Rejected(reason),
        }
    }

    /// Deselect a player, keeping the order of the others.
    pub fn remove(&mut self, player_id: &str) -> Option<Pick> {
        let idx = self.picks.iter().position(|p| p.player_id == player_id)?;
        Some(self.picks.remove(idx))
    }

    pub fn clear(&mut self) {
        self.picks.clear();
    }

    /// Whether the roster can be entered into a contest.
    pub fn is_joinable(&self) -> bool {
        self.picks.len() == self.rules.max_players
    }

    /// Players from `pool` that could be added right now.
    pub fn addable<'a>(&'a self, pool: &'a [Player]) -> impl Iterator<Item = &'a Player> + 'a {
        pool.iter().filter(move |p| self.can_add(p))
    }

    /// Freeze the roster under the rules it was built with.
    pub fn finalize(&self) -> Result<FinalRoster, ValidationError> {
        self.finalize_under(&self.rules)
    }

    /// Freeze the roster for an entry governed by `rules`.
    ///
    /// The roster must have been built under exactly those rules. Costs are
    /// recomputed from each pick's role, so stored costs are never trusted.
    pub fn finalize_under(&self, rules: &RosterRules) -> Result<FinalRoster, ValidationError> {
        if self.rules != *rules {
            return Err(ValidationError::RulesMismatch {
                max_players: rules.max_players,
                credit_cap: rules.credit_cap,
            });
        }
        if self.picks.len() != rules.max_players {
            return Err(ValidationError::RosterSize {
                expected: rules.max_players,
                actual: self.picks.len(),
            });
        }
        // Unreachable through `toggle`; rosters can also arrive deserialized.
        let mut seen = HashSet::with_capacity(self.picks.len());
        for pick in &self.picks {
            if !seen.insert(pick.player_id.as_str()) {
                return Err(ValidationError::DuplicatePlayer(pick.player_id.clone()));
            }
        }
        let picks: Vec<Pick> = self
            .picks
            .iter()
            .map(|p| Pick {
                cost: rules.credits.cost(p.role),
                ..p.clone()
            })
            .collect();
        let used: u32 = picks.iter().map(|p| p.cost).sum();
        if used > rules.credit_cap {
            return Err(ValidationError::OverBudget {
                used,
                cap: rules.credit_cap,
            });
        }
        Ok(FinalRoster {
            picks,
            credits_used: used,
            max_players: rules.max_players,
            credit_cap: rules.credit_cap,
        })
    }
}

/// A complete, validated roster ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRoster {
    pub picks: Vec<Pick>,
    pub credits_used: u32,
    pub max_players: usize,
    pub credit_cap: u32,
}

impl FinalRoster {
    pub fn player_ids(&self) -> Vec<String> {
        self.picks.iter().map(|p| p.player_id.clone()).collect()
    }
}
