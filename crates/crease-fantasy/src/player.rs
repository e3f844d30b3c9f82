// Players and their roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UnknownRole;

/// A player's role in the side. The role alone decides the credit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Batsman,
    Bowler,
    AllRounder,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Batsman, Role::Bowler, Role::AllRounder];

    /// Parse a role name. Case-insensitive; accepts the common spellings of
    /// all-rounder ("All-rounder", "AllRounder", "all rounder", "AR").
    pub fn parse(s: &str) -> Result<Self, UnknownRole> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '_'))
            .collect::<String>()
            .to_lowercase();
        match norm.as_str() {
            "batsman" | "batter" | "bat" => Ok(Role::Batsman),
            "bowler" | "bowl" => Ok(Role::Bowler),
            "allrounder" | "ar" => Ok(Role::AllRounder),
            _ => Err(UnknownRole(s.to_string())),
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Role::Batsman => "Batsman",
            Role::Bowler => "Bowler",
            Role::AllRounder => "All-rounder",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s)
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Role::parse(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.display_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

/// A selectable player as stored in the public `players` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique player id. Filled from the document id when absent in the body.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Id of the team the player turns out for.
    #[serde(default)]
    pub team: String,
    /// Batting aggregates. Opaque to the fantasy logic.
    #[serde(default)]
    pub batting: Value,
    /// Bowling aggregates. Opaque to the fantasy logic.
    #[serde(default)]
    pub bowling: Value,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Player {
            id: id.into(),
            name: name.into(),
            role,
            team: String::new(),
            batting: Value::Null,
            bowling: Value::Null,
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = team.into();
        self
    }
}
