// Session orchestration loop.
//
// Owns one user's FantasySession for a contest and the live leaderboard for
// it. Commands arrive on an mpsc channel; roster changes, join results and
// rankings go out on another. Exits on `Quit` or when the command channel
// closes, canceling the leaderboard subscription on the way out.

use std::sync::Arc;

use anyhow::Context;
use crease_core::{DocumentStore, UserId};
use crease_fantasy::{
    Catalog, Contest, ContestJoiner, FantasySession, JoinOutcome, LeaderboardView, Player,
    RankedEntry, Rejection, Toggle,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Input to the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add or remove a player by id.
    Toggle(String),
    /// Fill the remaining slots from the player pool.
    AutoFill,
    /// Join the contest with the current roster.
    Submit,
    Quit,
}

/// Output of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Ready {
        contest: Contest,
        pool_size: usize,
    },
    Roster {
        player_ids: Vec<String>,
        credits_used: u32,
        credits_remaining: u32,
        rejected: Option<Rejection>,
    },
    Joined(JoinOutcome),
    JoinFailed {
        message: String,
        retryable: bool,
    },
    Leaderboard {
        contest_id: String,
        top: Vec<RankedEntry>,
    },
    UnknownPlayer(String),
}

/// Parse one line of console input.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next()? {
        "t" | "toggle" => Command::Toggle(parts.next()?.to_string()),
        "auto" | "fill" => Command::AutoFill,
        "join" | "submit" => Command::Submit,
        "q" | "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

/// One-line rendering of an update for the console.
pub fn describe(update: &UiUpdate) -> String {
    match update {
        UiUpdate::Ready { contest, pool_size } => format!(
            "Contest {} ({}): {} players to pick from",
            contest.name, contest.id, pool_size
        ),
        UiUpdate::Roster {
            player_ids,
            credits_used,
            credits_remaining,
            rejected,
        } => {
            let mut line = format!(
                "Roster {} players, {} credits used, {} left",
                player_ids.len(),
                credits_used,
                credits_remaining
            );
            if let Some(reason) = rejected {
                line.push_str(&format!(" (rejected: {reason})"));
            }
            line
        }
        UiUpdate::Joined(JoinOutcome::Joined(m)) => {
            format!("Joined contest {} with {} credits", m.contest_id, m.credits_used)
        }
        UiUpdate::Joined(JoinOutcome::AlreadyJoined(m)) => {
            format!("Already in contest {}", m.contest_id)
        }
        UiUpdate::JoinFailed { message, retryable } => {
            if *retryable {
                format!("Join failed, try again: {message}")
            } else {
                format!("Join rejected: {message}")
            }
        }
        UiUpdate::Leaderboard { contest_id, top } => {
            let rows: Vec<String> = top
                .iter()
                .map(|e| format!("{}. {} {}", e.rank, e.user_id, e.points))
                .collect();
            format!("Leaderboard {}: {}", contest_id, rows.join(", "))
        }
        UiUpdate::UnknownPlayer(id) => format!("No player {id} in this match"),
    }
}

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub user: UserId,
}

struct AppState {
    config: Config,
    session: FantasySession,
    pool: Vec<Player>,
    joiner: ContestJoiner,
}

impl AppState {
    fn roster_update(&self, rejected: Option<Rejection>) -> UiUpdate {
        let roster = self.session.roster();
        UiUpdate::Roster {
            player_ids: roster.player_ids(),
            credits_used: roster.credits_used(),
            credits_remaining: roster.credits_remaining(),
            rejected,
        }
    }

    async fn handle(&mut self, cmd: Command) -> Option<UiUpdate> {
        match cmd {
            Command::Toggle(id) => {
                let Some(player) = self.pool.iter().find(|p| p.id == id) else {
                    return Some(UiUpdate::UnknownPlayer(id));
                };
                let rejected = match self.session.toggle(player) {
                    Toggle::Rejected(reason) => Some(reason),
                    Toggle::Added | Toggle::Removed => None,
                };
                Some(self.roster_update(rejected))
            }
            Command::AutoFill => {
                let added = self.session.auto_fill(&self.pool);
                debug!("Auto-fill added {} players", added);
                Some(self.roster_update(None))
            }
            Command::Submit => {
                let timeout = self.config.join_timeout();
                match self.session.submit(&self.joiner, timeout).await {
                    Ok(outcome) => Some(UiUpdate::Joined(outcome)),
                    Err(e) => {
                        warn!("Join failed: {}", e);
                        Some(UiUpdate::JoinFailed {
                            message: e.to_string(),
                            retryable: e.is_retryable(),
                        })
                    }
                }
            }
            Command::Quit => None,
        }
    }
}

/// First open contest, by id.
async fn pick_contest(catalog: &Catalog) -> anyhow::Result<Contest> {
    let mut contests = catalog
        .open_contests()
        .await
        .context("failed to list contests")?;
    contests.sort_by(|a, b| a.id.cmp(&b.id));
    contests
        .into_iter()
        .next()
        .context("no open contests available")
}

/// Run until `Quit`, a closed command channel, or a closed update channel.
pub async fn run(
    ctx: AppContext,
    mut cmd_rx: mpsc::Receiver<Command>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    let AppContext {
        config,
        store,
        user,
    } = ctx;

    let catalog = Catalog::new(store.clone(), &config.app_id)?;
    let contest = pick_contest(&catalog).await?;
    let pool = catalog
        .players_for_match(&contest.match_id)
        .await
        .context("failed to load player pool")?;
    info!(
        "Building a team for {} ({} players available)",
        contest.name,
        pool.len()
    );

    let joiner = ContestJoiner::new(store.clone(), &config.app_id, config.roster_rules())?;
    let session = FantasySession::new(user, contest.id.clone(), config.roster_rules());
    let mut view = LeaderboardView::open(&store, &config.app_id, &contest.id)
        .context("failed to watch leaderboard")?;
    let top_k = config.contest.leaderboard_top;

    let ready = UiUpdate::Ready {
        contest: contest.clone(),
        pool_size: pool.len(),
    };
    let mut state = AppState {
        config,
        session,
        pool,
        joiner,
    };

    if ui_tx.send(ready).await.is_err() {
        view.cancel();
        return Ok(());
    }

    loop {
        let update = tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    info!("Command channel closed");
                    break;
                };
                if cmd == Command::Quit {
                    info!("Quit requested");
                    break;
                }
                match state.handle(cmd).await {
                    Some(update) => update,
                    None => continue,
                }
            }
            ranking = view.next() => {
                let Some(ranking) = ranking else {
                    warn!("Leaderboard subscription ended");
                    break;
                };
                debug!("Leaderboard recomputed: {} entries", ranking.len());
                UiUpdate::Leaderboard {
                    contest_id: contest.id.clone(),
                    top: ranking.top(top_k),
                }
            }
        };
        if ui_tx.send(update).await.is_err() {
            info!("Update receiver dropped");
            break;
        }
    }

    view.cancel();
    info!("Session for contest {} closed", contest.id);
    Ok(())
}
