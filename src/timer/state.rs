use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format::{format_countdown, format_elapsed};

pub const FOCUS_DURATION_SECS: u32 = 25 * 60;
pub const BREAK_DURATION_SECS: u32 = 5 * 60;
pub const DEFAULT_FOCUS_SCORE: u8 = 75;
pub const INTERRUPTION_THRESHOLD: u8 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Focus,
    Break,
    Stopped,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Focus | SessionPhase::Break)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Focus => "Focus",
            SessionPhase::Break => "Break",
            SessionPhase::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind", content = "reason")]
pub enum SensorStatus {
    #[default]
    Inactive,
    Active,
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDurations {
    pub focus_secs: u32,
    pub break_secs: u32,
}

impl Default for SessionDurations {
    fn default() -> Self {
        Self {
            focus_secs: FOCUS_DURATION_SECS,
            break_secs: BREAK_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    PhaseChanged(SessionPhase),
    /// The final break elapsed; the caller must stop the session.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Manual,
    Completed,
}

/// Counters captured at the moment a session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub session_id: Option<String>,
    pub elapsed_study_secs: u64,
    pub final_focus_score: u8,
    pub interruption_count: u32,
    pub completed_cycles: u32,
    pub target_cycles: u32,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_study_secs: u64,
    /// Signed so a coalesced burst can overshoot and still be caught by `<= 0`.
    pub phase_remaining_secs: i64,
    pub current_cycle: u32,
    pub target_cycles: u32,
    pub current_focus_score: u8,
    pub interruption_count: u32,
    #[serde(default)]
    pub sensor_status: SensorStatus,
    #[serde(default)]
    pub durations: SessionDurations,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::with_durations(SessionDurations::default())
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_durations(durations: SessionDurations) -> Self {
        Self {
            phase: SessionPhase::Idle,
            session_id: None,
            started_at: None,
            elapsed_study_secs: 0,
            phase_remaining_secs: i64::from(durations.focus_secs),
            current_cycle: 1,
            target_cycles: 1,
            current_focus_score: DEFAULT_FOCUS_SCORE,
            interruption_count: 0,
            sensor_status: SensorStatus::Inactive,
            durations,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Remaining seconds as observed from outside; never negative.
    pub fn remaining_secs(&self) -> u64 {
        self.phase_remaining_secs.max(0) as u64
    }

    pub fn begin_session(
        &mut self,
        session_id: String,
        target_cycles: u32,
        started_at: DateTime<Utc>,
    ) {
        let durations = self.durations;
        *self = Self {
            phase: SessionPhase::Focus,
            session_id: Some(session_id),
            started_at: Some(started_at),
            elapsed_study_secs: 0,
            phase_remaining_secs: i64::from(durations.focus_secs),
            current_cycle: 1,
            target_cycles: target_cycles.max(1),
            current_focus_score: DEFAULT_FOCUS_SCORE,
            interruption_count: 0,
            sensor_status: SensorStatus::Inactive,
            durations,
        };
    }

    /// Advance the clock by one second and apply any phase transition in the
    /// same step.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Running;
        }

        self.elapsed_study_secs += 1;
        self.phase_remaining_secs -= 1;

        if self.phase_remaining_secs > 0 {
            return TickOutcome::Running;
        }

        match self.phase {
            SessionPhase::Focus => {
                self.phase = SessionPhase::Break;
                self.phase_remaining_secs = i64::from(self.durations.break_secs);
                TickOutcome::PhaseChanged(SessionPhase::Break)
            }
            SessionPhase::Break => {
                let next_cycle = self.current_cycle + 1;
                if next_cycle > self.target_cycles {
                    self.phase_remaining_secs = 0;
                    TickOutcome::Completed
                } else {
                    self.current_cycle = next_cycle;
                    self.phase = SessionPhase::Focus;
                    self.phase_remaining_secs = i64::from(self.durations.focus_secs);
                    TickOutcome::PhaseChanged(SessionPhase::Focus)
                }
            }
            SessionPhase::Idle | SessionPhase::Stopped => TickOutcome::Running,
        }
    }

    /// Record a new focus reading. Returns true when it registered an
    /// interruption.
    pub fn update_focus_score(&mut self, score: u8) -> bool {
        if !self.is_active() {
            return false;
        }

        let score = score.min(100);
        let interrupted =
            self.current_focus_score >= INTERRUPTION_THRESHOLD && score < INTERRUPTION_THRESHOLD;
        if interrupted {
            self.interruption_count += 1;
        }
        self.current_focus_score = score;
        interrupted
    }

    /// Move to `Stopped`, returning the counters as they were. `None` when no
    /// session was active.
    pub fn stop(&mut self, reason: StopReason) -> Option<SessionTotals> {
        if !self.is_active() {
            return None;
        }

        let totals = SessionTotals {
            session_id: self.session_id.clone(),
            elapsed_study_secs: self.elapsed_study_secs,
            final_focus_score: self.current_focus_score,
            interruption_count: self.interruption_count,
            completed_cycles: self.current_cycle,
            target_cycles: self.target_cycles,
            stop_reason: reason,
        };

        self.phase = SessionPhase::Stopped;
        self.session_id = None;
        self.started_at = None;
        self.elapsed_study_secs = 0;
        self.interruption_count = 0;
        self.phase_remaining_secs = i64::from(self.durations.focus_secs);
        self.current_cycle = 1;
        self.sensor_status = SensorStatus::Inactive;

        Some(totals)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            session_id: self.session_id.clone(),
            countdown: format_countdown(self.remaining_secs()),
            remaining_secs: self.remaining_secs(),
            current_cycle: self.current_cycle,
            target_cycles: self.target_cycles,
            current_focus_score: self.current_focus_score,
            elapsed: format_elapsed(self.elapsed_study_secs),
            elapsed_study_secs: self.elapsed_study_secs,
            interruption_count: self.interruption_count,
            sensor_status: self.sensor_status.clone(),
        }
    }
}

/// Read-only view handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub countdown: String,
    pub remaining_secs: u64,
    pub current_cycle: u32,
    pub target_cycles: u32,
    pub current_focus_score: u8,
    pub elapsed: String,
    pub elapsed_study_secs: u64,
    pub interruption_count: u32,
    pub sensor_status: SensorStatus,
}
