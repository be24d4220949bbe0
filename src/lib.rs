pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod report;
pub mod scratch;
pub mod sensing;
pub mod settings;
pub mod timer;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use api::HttpReportSink;
use auth::StaticTokenProvider;
use cli::{Cli, Commands};
use db::Database;
use scratch::{load_pending_reports, ScratchStore, ACTIVE_SESSION_KEY};
use sensing::SimulatedDetector;
use settings::SettingsStore;
use timer::{
    commands, ControllerConfig, NoticeLevel, SessionController, SessionEvent, SessionPhase,
    SessionSnapshot, SessionState, SubmissionOutcome,
};

pub struct AppState {
    pub(crate) timer: SessionController,
    pub(crate) settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(timer: SessionController, settings: Arc<SettingsStore>) -> Self {
        Self { timer, settings }
    }
}

/// `RIVAL_DEBUG=1` or `RIVAL_DEBUG=true`.
pub fn debug_mode() -> bool {
    std::env::var("RIVAL_DEBUG")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("rival"))
        .ok_or_else(|| anyhow!("no user data directory available; pass --data-dir"))
}

/// Wire the database, settings, backend client and controller together.
pub fn build_app_state(data_dir: &Path, database: Database) -> Result<AppState> {
    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.get().with_env_overrides();

    let auth = Arc::new(StaticTokenProvider::new(settings.auth_token.clone()));
    let sink = HttpReportSink::new(settings.api_base_url.clone(), auth)?;

    let config = ControllerConfig::from_settings(&settings, debug_mode());
    let timer = SessionController::new(
        config,
        Arc::new(SimulatedDetector::new()),
        Arc::new(sink),
        Arc::new(database),
    );

    Ok(AppState::new(timer, Arc::new(settings_store)))
}

pub async fn run(cli: Cli) -> Result<()> {
    utils::logging::init_logging(debug_mode());

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("rival.sqlite3"))?;

    match cli.command {
        Commands::Study { cycles } => {
            let state = build_app_state(&data_dir, database)?;
            run_study(&state, cycles).await
        }
        Commands::Status => show_status(&database).await,
        Commands::Retry => {
            let state = build_app_state(&data_dir, database)?;
            let summary = commands::retry_pending_reports(&state)
                .await
                .map_err(anyhow::Error::msg)?;
            println!(
                "Submitted {} report(s), {} still pending",
                summary.submitted, summary.remaining
            );
            Ok(())
        }
    }
}

async fn run_study(state: &AppState, cycles: Option<u32>) -> Result<()> {
    let mut events = state.timer.subscribe();

    let snapshot = match state.timer.resume_interrupted().await {
        Ok(Some(snapshot)) => {
            println!("Resuming the session from your last run");
            snapshot
        }
        Ok(None) => commands::start_study(state, cycles)
            .await
            .map_err(anyhow::Error::msg)?,
        Err(err) => {
            warn!("Could not check for an interrupted session: {err:#}");
            commands::start_study(state, cycles)
                .await
                .map_err(anyhow::Error::msg)?
        }
    };
    info!("Study session running, Ctrl-C to stop");
    print_snapshot(&snapshot);

    let mut last_phase = snapshot.phase;
    let mut last_interruptions = snapshot.interruption_count;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                if let Some(totals) = commands::stop_study(state).await.map_err(anyhow::Error::msg)? {
                    println!("Stopped after {}s of study", totals.elapsed_study_secs);
                }
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Heartbeat(snapshot)) => print_snapshot(&snapshot),
                Ok(SessionEvent::StateChanged(snapshot)) => {
                    if snapshot.phase == SessionPhase::Stopped {
                        println!("Session complete");
                        break;
                    }
                    if snapshot.phase != last_phase
                        || snapshot.interruption_count != last_interruptions
                    {
                        print_snapshot(&snapshot);
                    }
                    last_phase = snapshot.phase;
                    last_interruptions = snapshot.interruption_count;
                }
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("event listener lagged by {skipped}");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    state.timer.wait_for_submissions().await;
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    Ok(())
}

async fn show_status(database: &Database) -> Result<()> {
    match database.get(ACTIVE_SESSION_KEY).await? {
        Some(raw) => match serde_json::from_str::<SessionState>(&raw) {
            Ok(saved) if saved.is_active() => {
                println!("Session in progress (last saved state):");
                print_snapshot(&saved.snapshot());
            }
            _ => println!("No active session"),
        },
        None => println!("No active session"),
    }

    let pending = load_pending_reports(database).await?;
    if pending.is_empty() {
        println!("No reports waiting to be saved");
    } else {
        println!("{} report(s) waiting to be saved:", pending.len());
        for entry in pending {
            println!(
                "  {}  {}s studied, {} interruption(s)",
                entry.report.date, entry.report.total_study_time, entry.report.interruption_count
            );
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!(
        "[{} {}/{}] {}  score {:>3}  interruptions {}  elapsed {}",
        snapshot.phase.as_str(),
        snapshot.current_cycle,
        snapshot.target_cycles,
        snapshot.countdown,
        snapshot.current_focus_score,
        snapshot.interruption_count,
        snapshot.elapsed
    );
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Notice(notice) => match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
        },
        SessionEvent::SessionCompleted {
            report, outcome, ..
        } => {
            if let SubmissionOutcome::Saved(_) = outcome {
                println!(
                    "Report for {} saved: {}s studied, {}s focused, {} interruption(s)",
                    report.date,
                    report.total_study_time,
                    report.total_focus_time,
                    report.interruption_count
                );
                if !report.ai_summary.is_empty() {
                    println!("{}", report.ai_summary);
                }
            }
        }
        SessionEvent::Coaching(message) => {
            println!("rival ({:?}): {}", message.tone, message.text);
        }
        SessionEvent::StateChanged(_) | SessionEvent::Heartbeat(_) => {}
    }
}
