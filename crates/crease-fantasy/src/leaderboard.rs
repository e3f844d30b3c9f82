// Leaderboard ranking over a contest's score map, and a live view that
// recomputes it on every change.
//
// Score documents live at `leaderboards/{contest_id}` in the public namespace
// and look like `{"scores": {"<user id>": <points>, ...}}`. They are written
// by the scoring process only; this side never mutates them.

use std::cmp::Ordering;
use std::sync::Arc;

use crease_core::{DocumentStore, Namespace, Snapshot, StoreError, Subscription, WatchTarget};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::LEADERBOARDS;

/// How many entries the leaderboard screen shows.
pub const DEFAULT_TOP: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based ordinal rank.
    pub rank: usize,
    pub user_id: String,
    pub points: f64,
}

/// A fully ordered leaderboard.
///
/// Ordered by points descending, then user id ascending. Ranks are ordinal:
/// tied users get consecutive ranks in user id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    // Sorted; ranks are implied by position.
    rows: Vec<(String, f64)>,
}

fn compare(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Points from a raw score value. Missing and null count as zero.
fn points_of(user: &str, value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        other => {
            warn!("Non-numeric score for {}: {}", user, other);
            0.0
        }
    }
}

impl Ranking {
    pub fn from_scores<K, I>(scores: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Option<f64>)>,
    {
        let mut rows: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(user, points)| (user.into(), points.unwrap_or(0.0)))
            .collect();
        rows.sort_by(compare);
        Ranking { rows }
    }

    /// Build from a leaderboard document body. Anything but an object under
    /// `scores` yields an empty ranking.
    pub fn from_document(data: &Value) -> Self {
        let Some(scores) = data.get("scores").and_then(Value::as_object) else {
            return Ranking::default();
        };
        let mut rows: Vec<(String, f64)> = scores
            .iter()
            .map(|(user, v)| (user.clone(), points_of(user, v)))
            .collect();
        rows.sort_by(compare);
        Ranking { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entries in rank order. Produced on demand; calling again starts over.
    pub fn iter(&self) -> impl Iterator<Item = RankedEntry> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, (user, points))| RankedEntry {
                rank: i + 1,
                user_id: user.clone(),
                points: *points,
            })
    }

    /// The first `k` entries of the full ordering.
    pub fn top(&self, k: usize) -> Vec<RankedEntry> {
        self.iter().take(k).collect()
    }

    /// Rank of `user_id`, if present.
    pub fn position_of(&self, user_id: &str) -> Option<RankedEntry> {
        self.iter().find(|e| e.user_id == user_id)
    }
}

/// Live leaderboard for one contest.
///
/// Owns its subscription; dropping the view or calling [`cancel`](Self::cancel)
/// releases it.
pub struct LeaderboardView {
    contest_id: String,
    sub: Subscription,
}

impl LeaderboardView {
    pub fn open(
        store: &Arc<dyn DocumentStore>,
        app_id: &str,
        contest_id: &str,
    ) -> Result<Self, StoreError> {
        let path = Namespace::public(app_id)?.doc(LEADERBOARDS, contest_id)?;
        let sub = store.subscribe(WatchTarget::Document(path))?;
        info!("Watching leaderboard for contest {}", contest_id);
        Ok(LeaderboardView {
            contest_id: contest_id.to_string(),
            sub,
        })
    }

    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    /// Wait for the next ranking. The first call yields the current state.
    /// `None` once canceled.
    pub async fn next(&mut self) -> Option<Ranking> {
        loop {
            match self.sub.next().await? {
                Snapshot::Document(Some(doc)) => return Some(Ranking::from_document(&doc.data)),
                Snapshot::Document(None) => return Some(Ranking::default()),
                Snapshot::Collection(_) => {
                    debug!("Ignoring collection snapshot on a document watch");
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        if !self.sub.is_canceled() {
            info!("Stopped watching leaderboard for contest {}", self.contest_id);
        }
        self.sub.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.sub.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crease_core::MemoryStore;
    use serde_json::json;

    fn triple(e: &RankedEntry) -> (usize, &str, f64) {
        (e.rank, e.user_id.as_str(), e.points)
    }

    #[test]
    fn tie_broken_by_user_id() {
        let ranking = Ranking::from_scores([
            ("u1", Some(42.0)),
            ("u2", Some(58.0)),
            ("u3", Some(58.0)),
        ]);
        let top = ranking.top(2);
        let got: Vec<_> = top.iter().map(triple).collect();
        assert_eq!(got, vec![(1, "u2", 58.0), (2, "u3", 58.0)]);
    }

    #[test]
    fn missing_points_count_as_zero() {
        let ranking = Ranking::from_scores([("a", None), ("b", Some(1.5)), ("c", Some(-2.0))]);
        let got: Vec<_> = ranking.iter().map(|e| (e.user_id, e.points)).collect();
        assert_eq!(
            got,
            vec![("b".to_string(), 1.5), ("a".to_string(), 0.0), ("c".to_string(), -2.0)]
        );
    }

    #[test]
    fn iteration_is_restartable_and_stable() {
        let scores = vec![("x", Some(3.0)), ("y", Some(3.0)), ("z", Some(9.0))];
        let ranking = Ranking::from_scores(scores.clone());
        let first: Vec<_> = ranking.iter().collect();
        let second: Vec<_> = ranking.iter().collect();
        assert_eq!(first, second);
        assert_eq!(Ranking::from_scores(scores), ranking);
    }

    #[test]
    fn top_truncates_after_full_ordering() {
        let scores: Vec<_> = (0..30).map(|i| (format!("u{i:02}"), Some(i as f64))).collect();
        let ranking = Ranking::from_scores(scores);
        let top = ranking.top(DEFAULT_TOP);
        assert_eq!(top.len(), 20);
        assert_eq!(top[0].user_id, "u29");
        assert_eq!(top[19].user_id, "u10");
        assert_eq!(ranking.top(100).len(), 30);
    }

    #[test]
    fn from_document_reads_scores() {
        let ranking = Ranking::from_document(&json!({
            "scores": {"u1": 42, "u2": 58.5, "u3": null, "u4": "lots"}
        }));
        let got: Vec<_> = ranking.iter().map(|e| (e.user_id, e.points)).collect();
        assert_eq!(
            got,
            vec![
                ("u2".to_string(), 58.5),
                ("u1".to_string(), 42.0),
                ("u3".to_string(), 0.0),
                ("u4".to_string(), 0.0),
            ]
        );
        assert!(Ranking::from_document(&json!({})).is_empty());
        assert!(Ranking::from_document(&json!({"scores": [1, 2]})).is_empty());
    }

    #[test]
    fn position_of_finds_user() {
        let ranking = Ranking::from_scores([("a", Some(1.0)), ("b", Some(2.0))]);
        assert_eq!(ranking.position_of("a").unwrap().rank, 2);
        assert!(ranking.position_of("zz").is_none());
    }

    #[tokio::test]
    async fn view_recomputes_on_each_update() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        let path = Namespace::public("app")
            .unwrap()
            .doc(LEADERBOARDS, "c1")
            .unwrap();

        let mut view = LeaderboardView::open(&store, "app", "c1").unwrap();
        assert!(view.next().await.unwrap().is_empty());

        store
            .set(&path, json!({"scores": {"u1": 10}}))
            .await
            .unwrap();
        store
            .set(&path, json!({"scores": {"u1": 10, "u2": 20}}))
            .await
            .unwrap();

        let first = view.next().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = view.next().await.unwrap();
        assert_eq!(second.top(1)[0].user_id, "u2");
    }

    #[tokio::test]
    async fn cancel_releases_subscription() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        let mut view = LeaderboardView::open(&store, "app", "c1").unwrap();
        assert_eq!(memory.active_subscriptions(), 1);

        view.cancel();
        assert!(view.is_canceled());
        assert_eq!(memory.active_subscriptions(), 0);
        assert!(view.next().await.is_none());
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        {
            let _view = LeaderboardView::open(&store, "app", "c1").unwrap();
            assert_eq!(memory.active_subscriptions(), 1);
        }
        assert_eq!(memory.active_subscriptions(), 0);
    }
}
