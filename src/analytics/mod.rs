pub mod posthog;
pub mod trace;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::{ debug, warn };
use serde::Serialize;
use serde_json::{ Map, Value };
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cli::AnalyticsArgs;
use self::posthog::PostHogSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub event: String,
    pub distinct_id: String,
    pub properties: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(event: impl Into<String>, distinct_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            distinct_id: distinct_id.into(),
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Adds a property. Values that fail to serialize are stored as null.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.properties.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analytics endpoint returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send_batch(&self, events: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError>;
}

pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn send_batch(&self, events: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
        debug!("Analytics disabled, dropping {} event(s)", events.len());
        Ok(())
    }
}

/// Handle to the analytics backend. Cheap to clone.
#[derive(Clone)]
pub struct Analytics {
    sink: Arc<dyn AnalyticsSink>,
}

impl Analytics {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    pub fn from_args(args: &AnalyticsArgs) -> Result<Self, AnalyticsError> {
        match args.posthog_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                let sink = PostHogSink::new(key, &args.posthog_host)?;
                Ok(Self::new(Arc::new(sink)))
            }
            _ => Ok(Self::disabled()),
        }
    }

    /// Fire-and-forget capture of a single event.
    pub fn capture(&self, event: AnalyticsEvent) -> Option<JoinHandle<()>> {
        spawn_send(self.sink.clone(), vec![event])
    }

    /// Opens a buffered scope. Events are held until `shutdown`, or until the
    /// scope is dropped.
    pub fn scope(&self) -> AnalyticsScope {
        AnalyticsScope {
            sink: self.sink.clone(),
            pending: Vec::new(),
            closed: false,
        }
    }
}

pub struct AnalyticsScope {
    sink: Arc<dyn AnalyticsSink>,
    pending: Vec<AnalyticsEvent>,
    closed: bool,
}

impl AnalyticsScope {
    pub fn capture(&mut self, event: AnalyticsEvent) {
        self.pending.push(event);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flushes buffered events in the background and closes the scope. The
    /// caller does not wait for delivery.
    pub fn shutdown(mut self) -> Option<JoinHandle<()>> {
        self.flush_detached()
    }

    fn flush_detached(&mut self) -> Option<JoinHandle<()>> {
        self.closed = true;
        if self.pending.is_empty() {
            return None;
        }
        let events = std::mem::take(&mut self.pending);
        spawn_send(self.sink.clone(), events)
    }
}

impl Drop for AnalyticsScope {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Analytics scope dropped without shutdown, flushing {} event(s)", self.pending.len());
            self.flush_detached();
        }
    }
}

fn spawn_send(sink: Arc<dyn AnalyticsSink>, events: Vec<AnalyticsEvent>) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("No async runtime available, dropping {} analytics event(s)", events.len());
        return None;
    };
    Some(handle.spawn(async move {
        let count = events.len();
        if let Err(e) = sink.send_batch(events).await {
            warn!("Failed to deliver {} analytics event(s): {}", count, e);
        }
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// Sink that forwards every batch to a channel.
    pub struct ChannelSink(pub mpsc::UnboundedSender<Vec<AnalyticsEvent>>);

    #[async_trait]
    impl AnalyticsSink for ChannelSink {
        async fn send_batch(&self, events: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
            let _ = self.0.send(events);
            Ok(())
        }
    }

    pub fn channel_analytics() -> (Analytics, mpsc::UnboundedReceiver<Vec<AnalyticsEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Analytics::new(Arc::new(ChannelSink(tx))), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::channel_analytics;

    #[tokio::test]
    async fn capture_sends_immediately() {
        let (analytics, mut rx) = channel_analytics();
        analytics
            .capture(AnalyticsEvent::new("professionalize", "abc").with("language", "Spanish"))
            .unwrap()
            .await
            .unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event, "professionalize");
        assert_eq!(batch[0].properties["language"], "Spanish");
    }

    #[tokio::test]
    async fn scope_buffers_until_shutdown() {
        let (analytics, mut rx) = channel_analytics();
        let mut scope = analytics.scope();
        scope.capture(AnalyticsEvent::new("one", "x"));
        scope.capture(AnalyticsEvent::new("two", "x"));
        assert!(rx.try_recv().is_err());

        scope.shutdown().unwrap().await.unwrap();
        let names: Vec<_> = rx.recv().await.unwrap().into_iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn dropped_scope_still_flushes() {
        let (analytics, mut rx) = channel_analytics();
        {
            let mut scope = analytics.scope();
            scope.capture(AnalyticsEvent::new("orphan", "x"));
        }
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch[0].event, "orphan");
    }

    #[tokio::test]
    async fn empty_scope_sends_nothing() {
        let (analytics, mut rx) = channel_analytics();
        assert!(analytics.scope().shutdown().is_none());
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
