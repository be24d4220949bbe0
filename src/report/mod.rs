//! End-of-session reports and the merge-or-create submission against a
//! [`ReportSink`].

mod feedback;
mod sink;

pub use feedback::{fallback_message, request_feedback, CoachMessage, FeedbackTone};
pub use sink::{FeedbackRequest, ReportSink, SummaryRequest};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::timer::SessionTotals;

/// One day of study history as the backend stores it. Columns the backend
/// leaves null read as their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_study_time: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_focus_time: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avg_focus_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interruption_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ai_summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_notes: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DailyReport {
    /// Build the report for a finished session. Focus time is approximated as
    /// study time weighted by the last focus score.
    pub fn from_totals(totals: &SessionTotals, date: NaiveDate, ai_summary: String) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            total_study_time: totals.elapsed_study_secs,
            total_focus_time: focus_time_secs(totals.elapsed_study_secs, totals.final_focus_score),
            avg_focus_score: f64::from(totals.final_focus_score),
            interruption_count: totals.interruption_count,
            ai_summary,
            user_notes: String::new(),
        }
    }

    pub fn summary_request(&self, ai_personality: &str) -> SummaryRequest {
        SummaryRequest {
            total_study_time: self.total_study_time,
            total_focus_time: self.total_focus_time,
            avg_focus_score: self.avg_focus_score,
            interruption_count: self.interruption_count,
            ai_personality: ai_personality.to_string(),
        }
    }

    /// Fold a new session into an existing day.
    pub fn merged_with(&self, new: &DailyReport) -> DailyReport {
        let avg_focus_score = if self.total_study_time == 0 {
            new.avg_focus_score
        } else {
            (self.avg_focus_score + new.avg_focus_score) / 2.0
        };

        DailyReport {
            date: self.date.clone(),
            total_study_time: self.total_study_time + new.total_study_time,
            total_focus_time: self.total_focus_time + new.total_focus_time,
            avg_focus_score,
            interruption_count: self.interruption_count + new.interruption_count,
            ai_summary: if new.ai_summary.is_empty() {
                self.ai_summary.clone()
            } else {
                new.ai_summary.clone()
            },
            user_notes: self.user_notes.clone(),
        }
    }
}

pub fn focus_time_secs(elapsed_secs: u64, focus_score: u8) -> u64 {
    elapsed_secs * u64::from(focus_score.min(100)) / 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmitOutcome {
    Created,
    Merged,
}

/// Ask the sink for a summary; a failed call yields an empty summary.
pub async fn request_summary(sink: &dyn ReportSink, request: &SummaryRequest) -> String {
    match sink.generate_summary(request).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!("AI summary generation failed, continuing without one: {err:#}");
            String::new()
        }
    }
}

/// Merge the report into the same-day report at the sink, or create it.
pub async fn submit_report(
    sink: &dyn ReportSink,
    user_id: &str,
    report: &DailyReport,
) -> Result<SubmitOutcome> {
    let existing = sink
        .get_report(user_id, &report.date)
        .await
        .with_context(|| format!("failed to fetch report for {}", report.date))?;

    match existing {
        Some(existing) => {
            let merged = existing.merged_with(report);
            sink.update_report(user_id, &report.date, &merged)
                .await
                .with_context(|| format!("failed to update report for {}", report.date))?;
            info!("Merged session into report for {}", report.date);
            Ok(SubmitOutcome::Merged)
        }
        None => {
            sink.create_report(user_id, report)
                .await
                .with_context(|| format!("failed to create report for {}", report.date))?;
            info!("Created report for {}", report.date);
            Ok(SubmitOutcome::Created)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::*;
    use crate::timer::StopReason;

    fn totals(elapsed: u64, score: u8, interruptions: u32) -> SessionTotals {
        SessionTotals {
            session_id: Some("s".into()),
            elapsed_study_secs: elapsed,
            final_focus_score: score,
            interruption_count: interruptions,
            completed_cycles: 1,
            target_cycles: 1,
            stop_reason: StopReason::Manual,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn report_derives_focus_time_from_final_score() {
        let report = DailyReport::from_totals(&totals(1800, 80, 2), day(), "ok".into());
        assert_eq!(report.date, "2025-03-14");
        assert_eq!(report.total_study_time, 1800);
        assert_eq!(report.total_focus_time, 1440);
        assert_eq!(report.avg_focus_score, 80.0);
        assert_eq!(report.interruption_count, 2);
        assert_eq!(report.ai_summary, "ok");
        assert!(report.user_notes.is_empty());
    }

    #[test]
    fn focus_time_rounds_down() {
        assert_eq!(focus_time_secs(7, 50), 3);
        assert_eq!(focus_time_secs(0, 100), 0);
    }

    #[test]
    fn merge_sums_counters_and_keeps_notes() {
        let existing = DailyReport {
            date: "2025-03-14".into(),
            total_study_time: 1000,
            total_focus_time: 600,
            avg_focus_score: 60.0,
            interruption_count: 3,
            ai_summary: "old".into(),
            user_notes: "chapter 3 done".into(),
        };
        let new = DailyReport::from_totals(&totals(500, 80, 1), day(), String::new());

        let merged = existing.merged_with(&new);
        assert_eq!(merged.total_study_time, 1500);
        assert_eq!(merged.total_focus_time, 1000);
        assert_eq!(merged.avg_focus_score, 70.0);
        assert_eq!(merged.interruption_count, 4);
        assert_eq!(merged.ai_summary, "old");
        assert_eq!(merged.user_notes, "chapter 3 done");
    }

    #[test]
    fn merge_into_notes_only_day_takes_new_score() {
        let existing = DailyReport {
            date: "2025-03-14".into(),
            total_study_time: 0,
            total_focus_time: 0,
            avg_focus_score: 0.0,
            interruption_count: 0,
            ai_summary: String::new(),
            user_notes: "plan".into(),
        };
        let new = DailyReport::from_totals(&totals(100, 90, 0), day(), "fresh".into());
        let merged = existing.merged_with(&new);
        assert_eq!(merged.avg_focus_score, 90.0);
        assert_eq!(merged.ai_summary, "fresh");
        assert_eq!(merged.user_notes, "plan");
    }

    #[test]
    fn backend_payload_tolerates_missing_fields() {
        let report: DailyReport = serde_json::from_str(
            r#"{"date":"2025-03-14","total_study_time":60,"report_id":"abc"}"#,
        )
        .unwrap();
        assert_eq!(report.total_study_time, 60);
        assert_eq!(report.user_notes, "");
    }

    #[test]
    fn null_columns_read_as_defaults() {
        let report: DailyReport = serde_json::from_str(
            r#"{"date":"2025-03-14","total_study_time":null,"total_focus_time":120,
                "avg_focus_score":null,"interruption_count":null,
                "ai_summary":null,"user_notes":null}"#,
        )
        .unwrap();
        assert_eq!(report.total_study_time, 0);
        assert_eq!(report.total_focus_time, 120);
        assert_eq!(report.avg_focus_score, 0.0);
        assert_eq!(report.ai_summary, "");
        assert_eq!(report.user_notes, "");

        let merged = report.merged_with(&DailyReport::from_totals(
            &totals(300, 80, 1),
            day(),
            String::new(),
        ));
        assert_eq!(merged.total_study_time, 300);
        assert_eq!(merged.avg_focus_score, 80.0);
    }

    #[tokio::test]
    async fn submit_creates_then_merges() {
        let sink = MemorySink::default();
        let first = DailyReport::from_totals(&totals(600, 80, 1), day(), String::new());
        let second = DailyReport::from_totals(&totals(300, 60, 2), day(), String::new());

        assert_eq!(
            submit_report(&sink, "u1", &first).await.unwrap(),
            SubmitOutcome::Created
        );
        assert_eq!(
            submit_report(&sink, "u1", &second).await.unwrap(),
            SubmitOutcome::Merged
        );

        let stored = sink.report("u1", "2025-03-14").unwrap();
        assert_eq!(stored.total_study_time, 900);
        assert_eq!(stored.interruption_count, 3);
        assert_eq!(stored.avg_focus_score, 70.0);
    }

    #[tokio::test]
    async fn submit_propagates_backend_failure() {
        let sink = MemorySink::default();
        sink.set_fail_writes(true);
        let report = DailyReport::from_totals(&totals(10, 80, 0), day(), String::new());
        assert!(submit_report(&sink, "u1", &report).await.is_err());
    }

    #[tokio::test]
    async fn failed_summary_falls_back_to_empty() {
        let sink = MemorySink::with_summary("great work");
        let request = DailyReport::from_totals(&totals(10, 80, 0), day(), String::new())
            .summary_request("strict");
        assert_eq!(request_summary(&sink, &request).await, "great work");

        *sink.fail_summary.lock().unwrap() = true;
        assert_eq!(request_summary(&sink, &request).await, "");
    }
}
