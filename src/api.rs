//! REST backend client implementing [`ReportSink`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::auth::AuthProvider;
use crate::report::{DailyReport, FeedbackRequest, ReportSink, SummaryRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct FeedbackResponse {
    #[serde(default)]
    message: String,
}

pub struct HttpReportSink {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpReportSink {
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.token().await {
            Some(token) => request.bearer_auth(token),
            None => {
                debug!("No auth token available, sending request unauthenticated");
                request
            }
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn generate_summary(&self, request: &SummaryRequest) -> Result<String> {
        let builder = self.client.post(self.url("/ai/summary")).json(request);
        let response: SummaryResponse = self
            .authorized(builder)
            .await
            .send()
            .await
            .context("summary request failed")?
            .error_for_status()
            .context("summary endpoint returned an error")?
            .json()
            .await
            .context("invalid summary response")?;

        Ok(response.summary)
    }

    async fn generate_feedback(&self, request: &FeedbackRequest) -> Result<String> {
        let builder = self.client.post(self.url("/ai/feedback")).json(request);
        let response: FeedbackResponse = self
            .authorized(builder)
            .await
            .send()
            .await
            .context("feedback request failed")?
            .error_for_status()
            .context("feedback endpoint returned an error")?
            .json()
            .await
            .context("invalid feedback response")?;

        Ok(response.message)
    }

    async fn get_report(&self, user_id: &str, date: &str) -> Result<Option<DailyReport>> {
        let builder = self
            .client
            .get(self.url(&format!("/users/{user_id}/reports/{date}")));
        let response = self
            .authorized(builder)
            .await
            .send()
            .await
            .context("report fetch failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let report = response
            .error_for_status()
            .context("report endpoint returned an error")?
            .json()
            .await
            .context("invalid report payload")?;
        Ok(Some(report))
    }

    async fn create_report(&self, user_id: &str, report: &DailyReport) -> Result<()> {
        let builder = self
            .client
            .post(self.url(&format!("/users/{user_id}/reports")))
            .json(report);
        self.authorized(builder)
            .await
            .send()
            .await
            .context("report create failed")?
            .error_for_status()
            .context("report create returned an error")?;
        Ok(())
    }

    async fn update_report(&self, user_id: &str, date: &str, report: &DailyReport) -> Result<()> {
        let builder = self
            .client
            .put(self.url(&format!("/users/{user_id}/reports/{date}")))
            .json(report);
        self.authorized(builder)
            .await
            .send()
            .await
            .context("report update failed")?
            .error_for_status()
            .context("report update returned an error")?;
        Ok(())
    }
}
