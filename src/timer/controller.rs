use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Result};
use chrono::{Local, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    report::{
        request_feedback, request_summary, submit_report, CoachMessage, DailyReport,
        FeedbackRequest, ReportSink, SubmitOutcome,
    },
    scratch::{
        load_pending_reports, push_pending_report, save_pending_reports, PendingReport,
        ScratchStore, ACTIVE_SESSION_KEY,
    },
    sensing::{FocusSignalSource, SensingController, SensingUpdate, SAMPLE_INTERVAL},
    settings::UserSettings,
};

use super::{
    SensorStatus, SessionDurations, SessionSnapshot, SessionState, SessionTotals, StopReason,
    TickOutcome,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const EVENT_BUFFER: usize = 256;
const FEEDBACK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// User-facing message that does not affect session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionOutcome {
    Saved(SubmitOutcome),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    Heartbeat(SessionSnapshot),
    SessionCompleted {
        totals: SessionTotals,
        report: DailyReport,
        outcome: SubmissionOutcome,
    },
    Notice(Notice),
    Coaching(CoachMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySummary {
    pub submitted: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub user_id: String,
    pub ai_personality: String,
    pub durations: SessionDurations,
    pub tick_interval: Duration,
    pub sample_interval: Duration,
    pub heartbeat_every_ticks: u32,
    pub feedback_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            user_id: "local".into(),
            ai_personality: "strict".into(),
            durations: SessionDurations::default(),
            tick_interval: Duration::from_secs(1),
            sample_interval: SAMPLE_INTERVAL,
            heartbeat_every_ticks: 10,
            feedback_interval: FEEDBACK_INTERVAL,
        }
    }
}

impl ControllerConfig {
    pub fn from_settings(settings: &UserSettings, debug_mode: bool) -> Self {
        Self {
            user_id: settings.user_id.clone(),
            ai_personality: settings.ai_personality.clone(),
            durations: settings.durations(),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
            ..Self::default()
        }
    }
}

/// Drives one study session at a time: clock ticks, focus readings and the
/// hand-off of the finished report.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    config: Arc<ControllerConfig>,
    source: Arc<dyn FocusSignalSource>,
    sink: Arc<dyn ReportSink>,
    scratch: Arc<dyn ScratchStore>,
    sensing: Arc<Mutex<SensingController>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    submissions: Arc<StdMutex<Vec<JoinHandle<()>>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        source: Arc<dyn FocusSignalSource>,
        sink: Arc<dyn ReportSink>,
        scratch: Arc<dyn ScratchStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(SessionState::with_durations(config.durations))),
            config: Arc::new(config),
            source,
            sink,
            scratch,
            sensing: Arc::new(Mutex::new(SensingController::new())),
            ticker: Arc::new(Mutex::new(None)),
            submissions: Arc::new(StdMutex::new(Vec::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn start(&self, target_cycles: u32) -> Result<SessionSnapshot> {
        let session_id = Uuid::new_v4().to_string();

        // Sensing before state: a concurrent stop waits here until the source
        // it has to release actually exists.
        let mut sensing = self.sensing.lock().await;
        {
            let mut state = self.state.lock().await;
            if state.is_active() {
                bail!("study session already active");
            }
            state.durations = self.config.durations;
            state.begin_session(session_id.clone(), target_cycles, Utc::now());
            state.sensor_status = SensorStatus::Active;
        }

        let updates = match sensing
            .start_sensing(session_id.clone(), self.source.clone(), self.config.sample_interval)
            .await
        {
            Ok(updates) => updates,
            Err(err) => {
                self.state.lock().await.stop(StopReason::Manual);
                return Err(err);
            }
        };
        drop(sensing);

        self.persist_snapshot().await;
        self.spawn_ticker(updates).await;

        let snapshot = self.snapshot().await;
        info!(
            "Study session {} started: {} cycle(s)",
            session_id, snapshot.target_cycles
        );
        self.emit(SessionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Manual stop. Returns the captured totals, or `None` when no session was
    /// active.
    pub async fn stop(&self) -> Option<SessionTotals> {
        self.cancel_ticker().await;

        let totals = self.finish(StopReason::Manual).await;
        if totals.is_none() {
            // A concurrent completion may have been cut short; make sure the
            // camera is released either way.
            self.release_resources().await;
        }
        totals
    }

    /// Restore a session left active by a previous run.
    pub async fn resume_interrupted(&self) -> Result<Option<SessionSnapshot>> {
        let Some(raw) = self.scratch.get(ACTIVE_SESSION_KEY).await? else {
            return Ok(None);
        };

        let restored: SessionState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!("Discarding unreadable session snapshot: {err}");
                self.scratch.clear(ACTIVE_SESSION_KEY).await?;
                return Ok(None);
            }
        };

        if !restored.is_active() {
            self.scratch.clear(ACTIVE_SESSION_KEY).await?;
            return Ok(None);
        }

        let session_id = restored
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut sensing = self.sensing.lock().await;
        {
            let mut state = self.state.lock().await;
            if state.is_active() {
                return Ok(None);
            }
            *state = restored;
            state.session_id = Some(session_id.clone());
            state.sensor_status = SensorStatus::Active;
        }

        let updates = match sensing
            .start_sensing(session_id.clone(), self.source.clone(), self.config.sample_interval)
            .await
        {
            Ok(updates) => updates,
            Err(err) => {
                self.state.lock().await.stop(StopReason::Manual);
                return Err(err);
            }
        };
        drop(sensing);

        self.spawn_ticker(updates).await;

        let snapshot = self.snapshot().await;
        warn!(
            "Resumed interrupted session {} at cycle {}/{} ({} elapsed)",
            session_id, snapshot.current_cycle, snapshot.target_cycles, snapshot.elapsed
        );
        self.emit(SessionEvent::StateChanged(snapshot.clone()));
        self.emit(SessionEvent::Notice(Notice::info(
            "Resumed the study session from your last visit",
        )));
        Ok(Some(snapshot))
    }

    /// Resubmit reports whose earlier submission failed.
    pub async fn retry_pending_reports(&self) -> Result<RetrySummary> {
        let pending = load_pending_reports(self.scratch.as_ref()).await?;
        if pending.is_empty() {
            return Ok(RetrySummary {
                submitted: 0,
                remaining: 0,
            });
        }

        let mut remaining = Vec::new();
        let mut submitted = 0;
        for entry in pending {
            match submit_report(self.sink.as_ref(), &entry.user_id, &entry.report).await {
                Ok(_) => submitted += 1,
                Err(err) => {
                    warn!("Retry failed for report {}: {err:#}", entry.report.date);
                    remaining.push(entry);
                }
            }
        }

        save_pending_reports(self.scratch.as_ref(), &remaining).await?;
        info!(
            "Pending report retry: {} submitted, {} remaining",
            submitted,
            remaining.len()
        );

        Ok(RetrySummary {
            submitted,
            remaining: remaining.len(),
        })
    }

    /// Wait for every detached report submission started so far.
    pub async fn wait_for_submissions(&self) {
        let handles: Vec<JoinHandle<()>> = match self.submissions.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };

        for handle in handles {
            if let Err(err) = handle.await {
                error!("Report submission task failed: {err}");
            }
        }
    }

    async fn spawn_ticker(&self, updates: mpsc::Receiver<SensingUpdate>) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let started = Instant::now();
        let handle =
            tokio::spawn(async move { controller.run_timeline(updates, started).await });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    /// The single timeline of a session: clock ticks and focus readings are
    /// applied here, one at a time.
    async fn run_timeline(self, mut updates: mpsc::Receiver<SensingUpdate>, started: Instant) {
        let tick_interval = self.config.tick_interval;
        let heartbeat_every = self.config.heartbeat_every_ticks.max(1);
        let feedback_interval = self.config.feedback_interval.max(Duration::from_secs(1));

        let mut interval = time::interval_at(started + tick_interval, tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let mut feedback = time::interval_at(started + feedback_interval, feedback_interval);
        feedback.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks: u32 = 0;
        let mut sensing_open = true;
        let mut coaching: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let (outcome, snapshot) = {
                        let mut guard = self.state.lock().await;
                        if !guard.is_active() {
                            break;
                        }
                        let outcome = guard.tick();
                        (outcome, guard.snapshot())
                    };

                    match outcome {
                        TickOutcome::Completed => {
                            log_info!(
                                "Final break of cycle {}/{} finished",
                                snapshot.current_cycle,
                                snapshot.target_cycles
                            );
                            self.finish(StopReason::Completed).await;
                            break;
                        }
                        TickOutcome::PhaseChanged(phase) => {
                            log_info!(
                                "Entered {} phase (cycle {}/{})",
                                phase.as_str(),
                                snapshot.current_cycle,
                                snapshot.target_cycles
                            );
                            self.persist_snapshot().await;
                            self.emit(SessionEvent::StateChanged(snapshot));
                        }
                        TickOutcome::Running => {
                            ticks = ticks.wrapping_add(1);
                            if ticks % heartbeat_every == 0 {
                                self.persist_snapshot().await;
                                self.emit(SessionEvent::Heartbeat(snapshot));
                            }
                        }
                    }
                }
                _ = feedback.tick() => {
                    if coaching.as_ref().map_or(true, |handle| handle.is_finished()) {
                        coaching = self.spawn_coaching().await;
                    }
                }
                update = updates.recv(), if sensing_open => {
                    match update {
                        Some(update) => self.apply_sensing_update(update).await,
                        None => {
                            log_debug!("sensing channel closed");
                            sensing_open = false;
                        }
                    }
                }
            }
        }

        if let Some(handle) = coaching {
            handle.abort();
        }
    }

    /// Request a coaching line for the current score without blocking the
    /// timeline. The line is dropped if the session has ended by the time it
    /// arrives.
    async fn spawn_coaching(&self) -> Option<JoinHandle<()>> {
        let (session_id, request) = {
            let state = self.state.lock().await;
            if !state.is_active() {
                return None;
            }
            let request = FeedbackRequest {
                focus_score: state.current_focus_score,
                ai_personality: self.config.ai_personality.clone(),
            };
            (state.session_id.clone(), request)
        };

        let sink = self.sink.clone();
        let state = self.state.clone();
        let events = self.events.clone();

        Some(tokio::spawn(async move {
            let message = request_feedback(sink.as_ref(), &request).await;

            let current = {
                let state = state.lock().await;
                state.is_active() && state.session_id == session_id
            };
            if current {
                log_debug!("coaching ({:?}): {}", message.tone, message.text);
                let _ = events.send(SessionEvent::Coaching(message));
            }
        }))
    }

    async fn apply_sensing_update(&self, update: SensingUpdate) {
        let mut notice = None;

        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.is_active() {
                return;
            }

            match update {
                SensingUpdate::Reading(reading) => {
                    if state.sensor_status != SensorStatus::Active {
                        state.sensor_status = SensorStatus::Active;
                        notice = Some(Notice::info("Focus camera is back"));
                    }
                    if state.update_focus_score(reading.score) {
                        log_info!(
                            "Interruption #{} detected (score {})",
                            state.interruption_count,
                            reading.score
                        );
                    }
                }
                SensingUpdate::Failed(reason) => {
                    if !matches!(state.sensor_status, SensorStatus::Unavailable(_)) {
                        notice = Some(Notice::warning(format!(
                            "Focus camera unavailable: {reason}"
                        )));
                    }
                    state.sensor_status = SensorStatus::Unavailable(reason);
                    state.update_focus_score(0);
                }
            }

            state.snapshot()
        };

        if let Some(notice) = notice {
            self.emit(SessionEvent::Notice(notice));
        }
        self.emit(SessionEvent::StateChanged(snapshot));
    }

    /// Shared end-of-session path. Exactly one caller wins the transition to
    /// `Stopped`; the rest get `None`.
    async fn finish(&self, reason: StopReason) -> Option<SessionTotals> {
        let (totals, snapshot) = {
            let mut state = self.state.lock().await;
            let totals = state.stop(reason)?;
            (totals, state.snapshot())
        };

        // Spawned before any further await so an abort of the calling task
        // cannot lose the report.
        self.spawn_submission(totals.clone());

        info!(
            "Study session {} stopped ({:?}): {}s studied, {} interruption(s), cycle {}/{}",
            totals.session_id.as_deref().unwrap_or("-"),
            totals.stop_reason,
            totals.elapsed_study_secs,
            totals.interruption_count,
            totals.completed_cycles,
            totals.target_cycles
        );

        self.release_resources().await;
        self.emit(SessionEvent::StateChanged(snapshot));
        Some(totals)
    }

    async fn release_resources(&self) {
        if let Err(err) = self.sensing.lock().await.stop_sensing().await {
            error!("Failed to stop sensing: {err:#}");
        }
        if let Err(err) = self.scratch.clear(ACTIVE_SESSION_KEY).await {
            warn!("Failed to clear session snapshot: {err:#}");
        }
    }

    fn spawn_submission(&self, totals: SessionTotals) {
        let sink = self.sink.clone();
        let scratch = self.scratch.clone();
        let events = self.events.clone();
        let user_id = self.config.user_id.clone();
        let personality = self.config.ai_personality.clone();
        let date = Local::now().date_naive();

        let handle = tokio::spawn(async move {
            let mut report = DailyReport::from_totals(&totals, date, String::new());
            report.ai_summary =
                request_summary(sink.as_ref(), &report.summary_request(&personality)).await;

            let outcome = match submit_report(sink.as_ref(), &user_id, &report).await {
                Ok(outcome) => SubmissionOutcome::Saved(outcome),
                Err(err) => {
                    error!("Failed to save report for {}: {err:#}", report.date);
                    let pending = PendingReport {
                        user_id: user_id.clone(),
                        report: report.clone(),
                    };
                    let kept = match push_pending_report(scratch.as_ref(), pending).await {
                        Ok(()) => true,
                        Err(store_err) => {
                            error!("Failed to keep report for retry: {store_err:#}");
                            false
                        }
                    };
                    let message = if kept {
                        format!("Could not save today's report ({err}); it was kept and will be retried")
                    } else {
                        format!("Could not save today's report ({err})")
                    };
                    let _ = events.send(SessionEvent::Notice(Notice::warning(message)));
                    SubmissionOutcome::Failed(err.to_string())
                }
            };

            let _ = events.send(SessionEvent::SessionCompleted {
                totals,
                report,
                outcome,
            });
        });

        match self.submissions.lock() {
            Ok(mut guard) => {
                guard.retain(|h| !h.is_finished());
                guard.push(handle);
            }
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    async fn persist_snapshot(&self) {
        let serialized = {
            let state = self.state.lock().await;
            if !state.is_active() {
                return;
            }
            serde_json::to_string(&*state)
        };

        let result = match serialized {
            Ok(raw) => self.scratch.set(ACTIVE_SESSION_KEY, &raw).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            warn!("Failed to persist session snapshot: {err:#}");
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
