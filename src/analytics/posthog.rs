use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use super::{ AnalyticsError, AnalyticsEvent, AnalyticsSink };

pub const DEFAULT_POSTHOG_HOST: &str = "https://us.i.posthog.com";

#[derive(Serialize)]
struct BatchRequest<'a> {
    api_key: &'a str,
    batch: &'a [AnalyticsEvent],
}

/// Delivers events through the PostHog batch capture endpoint.
pub struct PostHogSink {
    http: reqwest::Client,
    api_key: String,
    host: String,
}

impl PostHogSink {
    pub fn new(api_key: &str, host: &str) -> Result<Self, AnalyticsError> {
        let host = if host.trim().is_empty() { DEFAULT_POSTHOG_HOST } else { host };
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_key: api_key.to_string(),
            host: host.trim_end_matches('/').to_string(),
        })
    }

    fn batch_url(&self) -> String {
        format!("{}/batch/", self.host)
    }
}

#[async_trait]
impl AnalyticsSink for PostHogSink {
    async fn send_batch(&self, events: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
        let body = BatchRequest { api_key: &self.api_key, batch: &events };
        let resp = self.http.post(self.batch_url()).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(AnalyticsError::Status(resp.status().as_u16()));
        }
        debug!("Delivered {} analytics event(s) to PostHog", events.len());
        Ok(())
    }
}
