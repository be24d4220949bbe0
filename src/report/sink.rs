use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::DailyReport;

/// Metrics sent to the backend's summary generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub total_study_time: u64,
    pub total_focus_time: u64,
    pub avg_focus_score: f64,
    pub interruption_count: u32,
    pub ai_personality: String,
}

/// Live focus score sent for an in-session coaching line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub focus_score: u8,
    pub ai_personality: String,
}

/// Where finished sessions go, plus the coaching lines shown while one runs.
/// Implementations talk to the backend that owns report history.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn generate_summary(&self, request: &SummaryRequest) -> Result<String>;

    async fn generate_feedback(&self, request: &FeedbackRequest) -> Result<String>;

    async fn get_report(&self, user_id: &str, date: &str) -> Result<Option<DailyReport>>;

    async fn create_report(&self, user_id: &str, report: &DailyReport) -> Result<()>;

    async fn update_report(&self, user_id: &str, date: &str, report: &DailyReport) -> Result<()>;
}
