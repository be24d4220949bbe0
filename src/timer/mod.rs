pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{
    ControllerConfig, Notice, NoticeLevel, RetrySummary, SessionController, SessionEvent,
    SubmissionOutcome,
};
pub use state::{
    SensorStatus, SessionDurations, SessionPhase, SessionSnapshot, SessionState, SessionTotals,
    StopReason, TickOutcome, BREAK_DURATION_SECS, DEFAULT_FOCUS_SCORE, FOCUS_DURATION_SECS,
    INTERRUPTION_THRESHOLD,
};
