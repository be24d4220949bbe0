//! Coaching lines shown while a session runs, keyed off the live focus score.

use log::warn;
use serde::{Deserialize, Serialize};

use super::{FeedbackRequest, ReportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackTone {
    Critical,
    Warning,
    Info,
    Success,
}

impl FeedbackTone {
    pub fn for_score(score: u8) -> Self {
        match score {
            0..=29 => FeedbackTone::Critical,
            30..=59 => FeedbackTone::Warning,
            60..=79 => FeedbackTone::Info,
            _ => FeedbackTone::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachMessage {
    pub text: String,
    pub tone: FeedbackTone,
    pub focus_score: u8,
    /// Set when the backend gave nothing usable and a local line was used.
    pub fallback: bool,
}

pub fn fallback_message(score: u8) -> &'static str {
    match FeedbackTone::for_score(score) {
        FeedbackTone::Critical => "Your focus is scattered. Get serious about this!",
        FeedbackTone::Warning => "Still too soft. You can concentrate harder than this.",
        FeedbackTone::Info => "Not bad, but there is room to aim higher.",
        FeedbackTone::Success => "Excellent focus! Hold this pace!",
    }
}

/// Ask the sink for a coaching line. A failed or empty reply falls back to a
/// local line for the same score band.
pub async fn request_feedback(sink: &dyn ReportSink, request: &FeedbackRequest) -> CoachMessage {
    let score = request.focus_score;
    let reply = match sink.generate_feedback(request).await {
        Ok(text) => Some(text).filter(|t| !t.trim().is_empty()),
        Err(err) => {
            warn!("AI feedback unavailable, using local message: {err:#}");
            None
        }
    };

    let (text, fallback) = match reply {
        Some(text) => (text, false),
        None => (fallback_message(score).to_string(), true),
    };

    CoachMessage {
        text,
        tone: FeedbackTone::for_score(score),
        focus_score: score,
        fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::MemorySink;

    fn request(score: u8) -> FeedbackRequest {
        FeedbackRequest {
            focus_score: score,
            ai_personality: "strict".into(),
        }
    }

    #[test]
    fn tone_follows_score_bands() {
        assert_eq!(FeedbackTone::for_score(0), FeedbackTone::Critical);
        assert_eq!(FeedbackTone::for_score(29), FeedbackTone::Critical);
        assert_eq!(FeedbackTone::for_score(30), FeedbackTone::Warning);
        assert_eq!(FeedbackTone::for_score(59), FeedbackTone::Warning);
        assert_eq!(FeedbackTone::for_score(60), FeedbackTone::Info);
        assert_eq!(FeedbackTone::for_score(79), FeedbackTone::Info);
        assert_eq!(FeedbackTone::for_score(80), FeedbackTone::Success);
        assert_eq!(FeedbackTone::for_score(100), FeedbackTone::Success);
    }

    #[tokio::test]
    async fn backend_line_is_used_when_available() {
        let sink = MemorySink::with_feedback("Eyes on the page.");
        let message = request_feedback(&sink, &request(72)).await;
        assert_eq!(message.text, "Eyes on the page.");
        assert_eq!(message.tone, FeedbackTone::Info);
        assert!(!message.fallback);
        assert_eq!(sink.feedback_requests.lock().unwrap()[0], request(72));
    }

    #[tokio::test]
    async fn failure_or_empty_reply_uses_local_line() {
        let sink = MemorySink::default();
        *sink.fail_feedback.lock().unwrap() = true;
        let message = request_feedback(&sink, &request(12)).await;
        assert_eq!(message.text, fallback_message(12));
        assert_eq!(message.tone, FeedbackTone::Critical);
        assert!(message.fallback);

        let empty = MemorySink::default();
        let message = request_feedback(&empty, &request(45)).await;
        assert_eq!(message.text, fallback_message(45));
        assert!(message.fallback);
    }
}
