// Crease entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open the document store
// 4. Seed fixtures on first run
// 5. Sign in
// 6. Spawn the app loop, feed it console commands until quit or Ctrl+C
// 7. Cleanup on exit

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use crease_app::app::{self, AppContext, Command, UiUpdate};
use crease_app::config::{self, Backend, Config};
use crease_app::seed::{self, SeedOutcome};
use crease_core::{DocumentStore, MemoryStore, Session, SqliteStore};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Crease starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: app={}, {} players per team, {} credit cap",
        config.app_id, config.contest.roster_size, config.contest.credit_cap
    );

    // 3. Open the document store
    let store = open_store(&config)?;

    // 4. Seed fixtures
    if config.seed.enabled {
        match seed::seed_from_csv(store.as_ref(), &config.app_id, Path::new(&config.seed.players_csv))
            .await
            .context("failed to seed fixtures")?
        {
            SeedOutcome::Seeded { players, contests, .. } => {
                println!("Seeded {players} players and {contests} contests");
            }
            SeedOutcome::AlreadySeeded => {}
        }
    }

    // 5. Sign in
    let session = Session::pending();
    session.complete(&config.sign_in())?;
    let user = session.wait_ready().await.context("sign-in failed")?;
    println!("Signed in as {user}");

    // 6. Spawn the app loop
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    let ctx = AppContext {
        config,
        store,
        user,
    };
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ctx, cmd_rx, ui_tx).await {
            error!("Application loop error: {:#}", e);
            eprintln!("Error: {e:#}");
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            print_update(&update);
        }
    });

    println!("Commands: toggle <player id> | auto | join | quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match app::parse_command(&line) {
                    Some(Command::Quit) => break,
                    Some(cmd) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command: {}", line.trim()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
        }
    }

    // 7. Cleanup: ask the loop to stop and give it a moment
    let _ = cmd_tx.send(Command::Quit).await;
    drop(cmd_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = printer.await;
    })
    .await;

    info!("Crease shut down cleanly");
    Ok(())
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.storage.backend {
        Backend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Backend::Sqlite => {
            let path = config.db_path()?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let store = SqliteStore::open(&path.to_string_lossy())
                .context("failed to open database")?;
            Ok(Arc::new(store))
        }
    }
}

fn print_update(update: &UiUpdate) {
    println!("{}", app::describe(update));
}

/// Initialize tracing to log to a file, keeping the console for the session.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("crease.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crease=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
