// Contest join: validate, then write profile marker, team record, and
// membership in one batch under the user's private namespace.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crease_core::{encode, DocPath, DocumentStore, Namespace, StoreError, UserId, WriteBatch};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{JoinError, ValidationError};
use crate::roster::{FinalRoster, Pick, Roster, RosterRules};

pub const PROFILE: &str = "profile";
pub const PROFILE_DOC: &str = "fantasy";
pub const FANTASY_TEAMS: &str = "fantasy_teams";
pub const CONTEST_ENTRIES: &str = "contest_entries";

/// Marks that the user has taken part in fantasy contests at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FantasyProfile {
    pub user_id: UserId,
    pub last_joined_at: DateTime<Utc>,
}

/// The team a user entered into one contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub user_id: UserId,
    pub contest_id: String,
    pub match_id: String,
    pub player_ids: Vec<String>,
    pub picks: Vec<Pick>,
    pub credits_used: u32,
    pub roster_size: usize,
    pub credit_cap: u32,
    pub created_at: DateTime<Utc>,
}

/// Proof that a user joined a contest. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub contest_id: String,
    pub team_id: String,
    pub player_ids: Vec<String>,
    pub credits_used: u32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(Membership),
    /// The user was already in the contest. Nothing was written.
    AlreadyJoined(Membership),
}

impl JoinOutcome {
    pub fn membership(&self) -> &Membership {
        match self {
            JoinOutcome::Joined(m) | JoinOutcome::AlreadyJoined(m) => m,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, JoinOutcome::Joined(_))
    }
}

/// Enters rosters into contests under one fixed set of [`RosterRules`].
pub struct ContestJoiner {
    store: Arc<dyn DocumentStore>,
    catalog: Catalog,
    app_id: String,
    rules: RosterRules,
}

impl ContestJoiner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        app_id: &str,
        rules: RosterRules,
    ) -> Result<Self, JoinError> {
        let catalog = Catalog::new(store.clone(), app_id)?;
        Ok(ContestJoiner {
            store,
            catalog,
            app_id: app_id.to_string(),
            rules,
        })
    }

    pub fn rules(&self) -> &RosterRules {
        &self.rules
    }

    fn private(&self, user: &UserId) -> Result<Namespace, JoinError> {
        Ok(Namespace::private(&self.app_id, user)?)
    }

    /// Enter `roster` into `contest_id` for `user`.
    ///
    /// A repeat join for the same contest returns the stored membership as
    /// [`JoinOutcome::AlreadyJoined`], whatever the roster or contest status
    /// now is. Otherwise the roster is checked against the joiner's rules and
    /// the contest must be open; both happen before any write.
    pub async fn join(
        &self,
        user: &UserId,
        contest_id: &str,
        roster: &Roster,
    ) -> Result<JoinOutcome, JoinError> {
        let ns = self.private(user)?;
        let membership_path = ns
            .doc(CONTEST_ENTRIES, contest_id)
            .map_err(|_| ValidationError::UnknownContest(contest_id.to_string()))?;

        // Cheap pre-check; the conditional create below is what guarantees
        // a single membership.
        if let Some(existing) = self.read_membership(&membership_path).await? {
            info!("User {} already in contest {}", user, contest_id);
            return Ok(JoinOutcome::AlreadyJoined(existing));
        }

        let final_roster = roster.finalize_under(&self.rules)?;

        let contest = self
            .catalog
            .contest(contest_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownContest(contest_id.to_string()))?;
        if !contest.is_open() {
            return Err(ValidationError::ContestClosed(contest_id.to_string()).into());
        }

        let now = Utc::now();
        let (team, membership) = records(user, contest_id, &contest.match_id, &final_roster, now);
        let profile = FantasyProfile {
            user_id: user.clone(),
            last_joined_at: now,
        };

        let mut batch = WriteBatch::new();
        batch
            .set(ns.doc(PROFILE, PROFILE_DOC)?, encode(&profile)?)
            .set(ns.doc(FANTASY_TEAMS, contest_id)?, encode(&team)?)
            .create(membership_path.clone(), encode(&membership)?);

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(
                    "User {} joined contest {} ({} credits)",
                    user, contest_id, membership.credits_used
                );
                Ok(JoinOutcome::Joined(membership))
            }
            Err(StoreError::AlreadyExists { .. }) => {
                // Lost a race with another join for the same contest.
                let existing = self.read_membership(&membership_path).await?.ok_or_else(|| {
                    JoinError::StorageUnavailable(format!(
                        "membership for contest {contest_id} conflicted but could not be read"
                    ))
                })?;
                info!("User {} already in contest {}", user, contest_id);
                Ok(JoinOutcome::AlreadyJoined(existing))
            }
            Err(e) => {
                warn!("Join of contest {} failed: {}", contest_id, e);
                Err(e.into())
            }
        }
    }

    /// [`join`](Self::join) bounded by `limit`. Elapsing maps to
    /// [`JoinError::StorageUnavailable`]; a commit already in flight may
    /// still land, which a retry then reports as `AlreadyJoined`.
    pub async fn join_with_timeout(
        &self,
        user: &UserId,
        contest_id: &str,
        roster: &Roster,
        limit: Duration,
    ) -> Result<JoinOutcome, JoinError> {
        match tokio::time::timeout(limit, self.join(user, contest_id, roster)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Join of contest {} timed out after {:?}", contest_id, limit);
                Err(JoinError::StorageUnavailable(format!(
                    "join timed out after {} ms",
                    limit.as_millis()
                )))
            }
        }
    }

    pub async fn membership(
        &self,
        user: &UserId,
        contest_id: &str,
    ) -> Result<Option<Membership>, JoinError> {
        let path = self.private(user)?.doc(CONTEST_ENTRIES, contest_id)?;
        self.read_membership(&path).await
    }

    async fn read_membership(&self, path: &DocPath) -> Result<Option<Membership>, JoinError> {
        match self.store.get(path).await {
            Ok(doc) => Ok(Some(doc.decode()?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every contest the user has joined, ordered by contest id.
    pub async fn memberships(&self, user: &UserId) -> Result<Vec<Membership>, JoinError> {
        let coll = self.private(user)?.collection(CONTEST_ENTRIES)?;
        let docs = self.store.list(&coll).await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in &docs {
            match doc.decode() {
                Ok(m) => out.push(m),
                Err(e) => warn!("Skipping malformed membership {}: {}", doc.path, e),
            }
        }
        Ok(out)
    }

    pub async fn team(
        &self,
        user: &UserId,
        contest_id: &str,
    ) -> Result<Option<TeamRecord>, JoinError> {
        let path = self.private(user)?.doc(FANTASY_TEAMS, contest_id)?;
        match self.store.get(&path).await {
            Ok(doc) => Ok(Some(doc.decode()?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn records(
    user: &UserId,
    contest_id: &str,
    match_id: &str,
    roster: &FinalRoster,
    now: DateTime<Utc>,
) -> (TeamRecord, Membership) {
    let player_ids = roster.player_ids();
    let team = TeamRecord {
        user_id: user.clone(),
        contest_id: contest_id.to_string(),
        match_id: match_id.to_string(),
        player_ids: player_ids.clone(),
        picks: roster.picks.clone(),
        credits_used: roster.credits_used,
        roster_size: roster.max_players,
        credit_cap: roster.credit_cap,
        created_at: now,
    };
    let membership = Membership {
        user_id: user.clone(),
        contest_id: contest_id.to_string(),
        team_id: contest_id.to_string(),
        player_ids,
        credits_used: roster.credits_used,
        joined_at: now,
    };
    (team, membership)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CONTESTS;
    use crate::player::{Player, Role};
    use async_trait::async_trait;
    use crease_core::{CollectionPath, Document, MemoryStore, Subscription, WatchTarget};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    const APP: &str = "test-league";

    fn full_roster() -> Roster {
        let mut roster = Roster::default();
        // 5 batsmen, 5 bowlers, 1 all-rounder = 35 + 40 + 9 = 84
        for i in 0..5 {
            roster.toggle(&Player::new(format!("bat{i}"), "B", Role::Batsman));
            roster.toggle(&Player::new(format!("bowl{i}"), "W", Role::Bowler));
        }
        roster.toggle(&Player::new("ar0", "A", Role::AllRounder));
        assert_eq!(roster.len(), 11);
        roster
    }

    async fn store_with_contests() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::public(APP).unwrap();
        store
            .set(
                &ns.doc(CONTESTS, "c1").unwrap(),
                json!({"name": "Mega", "match_id": "m1", "status": "open"}),
            )
            .await
            .unwrap();
        store
            .set(
                &ns.doc(CONTESTS, "c2").unwrap(),
                json!({"name": "Done", "match_id": "m1", "status": "closed"}),
            )
            .await
            .unwrap();
        store
    }

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    /// Memory store that can hide the next membership read, as if another
    /// join landed between the pre-check and the commit, or stall commits.
    struct StagedStore {
        inner: Arc<MemoryStore>,
        hide_next_membership: AtomicBool,
        commit_delay: Option<Duration>,
    }

    impl StagedStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            StagedStore {
                inner,
                hide_next_membership: AtomicBool::new(false),
                commit_delay: None,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for StagedStore {
        async fn get(&self, path: &DocPath) -> Result<Document, StoreError> {
            if path.parent().as_str().ends_with(CONTEST_ENTRIES)
                && self.hide_next_membership.swap(false, Ordering::SeqCst)
            {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                });
            }
            self.inner.get(path).await
        }

        async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
            self.inner.list(collection).await
        }

        async fn set(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
            self.inner.set(path, data).await
        }

        async fn add(&self, collection: &CollectionPath, data: Value) -> Result<String, StoreError> {
            self.inner.add(collection, data).await
        }

        async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
            if let Some(delay) = self.commit_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.commit(batch).await
        }

        fn subscribe(&self, target: WatchTarget) -> Result<Subscription, StoreError> {
            self.inner.subscribe(target)
        }
    }

    #[tokio::test]
    async fn join_writes_three_documents() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let before = store.committed_writes();

        let outcome = joiner.join(&user(), "c1", &full_roster()).await.unwrap();
        assert!(outcome.is_new());
        assert_eq!(store.committed_writes(), before + 3);

        let m = outcome.membership();
        assert_eq!(m.contest_id, "c1");
        assert_eq!(m.team_id, "c1");
        assert_eq!(m.credits_used, 84);
        assert_eq!(m.player_ids.len(), 11);

        let team = joiner.team(&user(), "c1").await.unwrap().unwrap();
        assert_eq!(team.match_id, "m1");
        assert_eq!(team.player_ids, m.player_ids);
        assert_eq!(team.roster_size, 11);
        assert_eq!(team.credit_cap, 100);
    }

    #[tokio::test]
    async fn short_roster_writes_nothing() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let mut roster = full_roster();
        roster.remove("ar0");
        let before = store.committed_writes();

        let err = joiner.join(&user(), "c1", &roster).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::Validation(ValidationError::RosterSize {
                expected: 11,
                actual: 10
            })
        ));
        assert_eq!(store.committed_writes(), before);
        assert!(joiner.memberships(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_and_closed_contests_rejected() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let before = store.committed_writes();

        let err = joiner.join(&user(), "nope", &full_roster()).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::Validation(ValidationError::UnknownContest(_))
        ));
        let err = joiner.join(&user(), "c2", &full_roster()).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::Validation(ValidationError::ContestClosed(_))
        ));
        assert_eq!(store.committed_writes(), before);
    }

    #[tokio::test]
    async fn second_join_reports_already_joined() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let first = joiner.join(&user(), "c1", &full_roster()).await.unwrap();
        let writes = store.committed_writes();

        let second = joiner.join(&user(), "c1", &full_roster()).await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.membership(), first.membership());
        assert_eq!(store.committed_writes(), writes);
        assert_eq!(joiner.memberships(&user()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retryable() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let roster = full_roster();
        store.fail_next_writes(1);

        let err = joiner.join(&user(), "c1", &roster).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(joiner.membership(&user(), "c1").await.unwrap().is_none());

        let retry = joiner.join(&user(), "c1", &roster).await.unwrap();
        assert!(retry.is_new());
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let other = UserId::new("u2").unwrap();
        joiner.join(&user(), "c1", &full_roster()).await.unwrap();
        let outcome = joiner.join(&other, "c1", &full_roster()).await.unwrap();
        assert!(outcome.is_new());
        assert_eq!(joiner.memberships(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generous_timeout_does_not_interfere() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let outcome = joiner
            .join_with_timeout(&user(), "c1", &full_roster(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.is_new());
    }

    #[tokio::test]
    async fn roster_built_under_looser_rules_is_rejected() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let loose = RosterRules {
            max_players: 3,
            credit_cap: 1000,
            ..RosterRules::default()
        };
        let mut roster = Roster::new(loose);
        roster.toggle(&Player::new("bat0", "B", Role::Batsman));
        roster.toggle(&Player::new("bowl0", "W", Role::Bowler));
        roster.toggle(&Player::new("ar0", "A", Role::AllRounder));
        let before = store.committed_writes();

        let err = joiner.join(&user(), "c1", &roster).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::Validation(ValidationError::RulesMismatch {
                max_players: 11,
                credit_cap: 100
            })
        ));
        assert_eq!(store.committed_writes(), before);
        assert!(joiner.membership(&user(), "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_pick_costs_are_not_trusted() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let mut raw = serde_json::to_value(full_roster()).unwrap();
        for pick in raw["picks"].as_array_mut().unwrap() {
            pick["cost"] = json!(0);
        }
        let zero_cost: Roster = serde_json::from_value(raw).unwrap();
        assert_eq!(zero_cost.credits_used(), 0);

        let outcome = joiner.join(&user(), "c1", &zero_cost).await.unwrap();
        assert_eq!(outcome.membership().credits_used, 84);
        let team = joiner.team(&user(), "c1").await.unwrap().unwrap();
        assert_eq!(team.credits_used, 84);
        assert!(team.picks.iter().all(|p| p.cost > 0));
    }

    #[tokio::test]
    async fn recomputed_cost_over_cap_writes_nothing() {
        let store = store_with_contests().await;
        let rules = RosterRules {
            credit_cap: 95,
            ..RosterRules::default()
        };
        let joiner = ContestJoiner::new(store.clone(), APP, rules).unwrap();

        // 11 batsmen (77 credits), relabeled as free all-rounders (99 credits).
        let mut roster = Roster::new(rules);
        for i in 0..11 {
            roster.toggle(&Player::new(format!("bat{i}"), "B", Role::Batsman));
        }
        let mut raw = serde_json::to_value(&roster).unwrap();
        for pick in raw["picks"].as_array_mut().unwrap() {
            pick["role"] = serde_json::to_value(Role::AllRounder).unwrap();
            pick["cost"] = json!(0);
        }
        let relabeled: Roster = serde_json::from_value(raw).unwrap();
        let before = store.committed_writes();

        let err = joiner.join(&user(), "c1", &relabeled).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::Validation(ValidationError::OverBudget { used: 99, cap: 95 })
        ));
        assert_eq!(store.committed_writes(), before);
    }

    #[tokio::test]
    async fn rejoin_after_close_or_with_empty_roster_is_idempotent() {
        let store = store_with_contests().await;
        let joiner = ContestJoiner::new(store.clone(), APP, RosterRules::default()).unwrap();
        let first = joiner.join(&user(), "c1", &full_roster()).await.unwrap();

        let contest = Namespace::public(APP).unwrap().doc(CONTESTS, "c1").unwrap();
        store
            .set(
                &contest,
                json!({"name": "Mega", "match_id": "m1", "status": "closed"}),
            )
            .await
            .unwrap();
        let writes = store.committed_writes();

        let again = joiner.join(&user(), "c1", &Roster::default()).await.unwrap();
        assert!(!again.is_new());
        assert_eq!(again.membership(), first.membership());
        assert_eq!(store.committed_writes(), writes);
    }

    #[tokio::test]
    async fn lost_race_reports_existing_membership() {
        let memory = store_with_contests().await;
        let staged = Arc::new(StagedStore::new(memory.clone()));
        let joiner = ContestJoiner::new(staged.clone(), APP, RosterRules::default()).unwrap();
        let first = joiner.join(&user(), "c1", &full_roster()).await.unwrap();
        let writes = memory.committed_writes();

        // The pre-check misses the membership, so the conditional create
        // is what catches the repeat.
        staged.hide_next_membership.store(true, Ordering::SeqCst);
        let second = joiner.join(&user(), "c1", &full_roster()).await.unwrap();

        assert!(!staged.hide_next_membership.load(Ordering::SeqCst));
        assert_eq!(second, JoinOutcome::AlreadyJoined(first.membership().clone()));
        assert_eq!(memory.committed_writes(), writes);
        assert_eq!(joiner.memberships(&user()).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_commit_times_out_as_retryable() {
        let memory = store_with_contests().await;
        let mut staged = StagedStore::new(memory.clone());
        staged.commit_delay = Some(Duration::from_secs(60));
        let joiner =
            ContestJoiner::new(Arc::new(staged), APP, RosterRules::default()).unwrap();
        let writes = memory.committed_writes();

        let err = joiner
            .join_with_timeout(&user(), "c1", &full_roster(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "storage unavailable: join timed out after 5000 ms");
        assert_eq!(memory.committed_writes(), writes);
        assert!(joiner.membership(&user(), "c1").await.unwrap().is_none());
    }
}
