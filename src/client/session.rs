//! Client-side state machine for a single rewrite.
//!
//! The session owns the exchanged messages and drives one request at a time
//! against the chat endpoint. Every change is published through a `watch`
//! channel so a renderer can follow along; the visible [`Phase`] is derived
//! from the published state rather than stored.

use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::{ Arc, Mutex, MutexGuard };
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::api::ChatApi;
use super::progress::{ ProgressCaptions, CAPTIONS };
use crate::analytics::{ Analytics, AnalyticsEvent };
use crate::models::chat::{ ChatMessage, ChatRequest };

/// Shown for every failed request. Provider and transport errors are logged,
/// never displayed.
pub const ADVISORY: &str = "Failed to process your message. Please try again.";

pub const SUBMIT_EVENT: &str = "professionalize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Streaming,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// "Be Real": the raw input.
    Real,
    /// "Be Professional": the rewritten output.
    Professional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub input: String,
    pub language: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub finished: bool,
    pub error: Option<String>,
    pub tab: Tab,
    pub progress_caption: Option<&'static str>,
    epoch: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            input: String::new(),
            language: None,
            messages: Vec::new(),
            finished: false,
            error: None,
            tab: Tab::Real,
            progress_caption: None,
            epoch: 0,
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.error.is_some() {
            return Phase::Error;
        }
        match self.messages.len() {
            0 => Phase::Idle,
            1 => Phase::Submitting,
            _ if self.finished => Phase::Success,
            _ => Phase::Streaming,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == Phase::Submitting
    }

    pub fn has_response(&self) -> bool {
        self.messages.len() >= 2
    }

    /// Single-turn: once something was submitted the input stays read-only
    /// until the session is retried or reset.
    pub fn is_input_disabled(&self) -> bool {
        self.has_response() || self.is_loading() || self.error.is_some()
    }

    pub fn can_submit(&self) -> bool {
        !self.is_input_disabled() && !self.input.trim().is_empty()
    }

    pub fn response(&self) -> Option<&str> {
        self.messages.get(1).map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("nothing to submit")]
    EmptyInput,

    #[error("input is locked until the session is retried or reset")]
    InputLocked,
}

#[derive(Default)]
struct Inflight {
    epoch: u64,
    request: Option<JoinHandle<()>>,
    progress: Option<ProgressCaptions>,
}

pub struct ConversationSession {
    api: Arc<dyn ChatApi>,
    analytics: Analytics,
    distinct_id: String,
    state: Arc<watch::Sender<SessionState>>,
    inflight: Arc<Mutex<Inflight>>,
}

impl ConversationSession {
    pub fn new(api: Arc<dyn ChatApi>, analytics: Analytics) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            analytics,
            distinct_id: Uuid::new_v4().to_string(),
            state: Arc::new(state),
            inflight: Arc::new(Mutex::new(Inflight::default())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase()
    }

    /// Text for the copy-to-clipboard action.
    pub fn copy_text(&self) -> Option<String> {
        self.state.borrow().response().map(str::to_string)
    }

    pub fn has_inflight_request(&self) -> bool {
        lock(&self.inflight).request.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn set_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.edit(|s| s.input = text)
    }

    /// `None` leaves the choice to the server default.
    pub fn set_language(&self, language: Option<String>) -> Result<(), SessionError> {
        self.edit(|s| s.language = language)
    }

    fn edit(&self, apply: impl FnOnce(&mut SessionState)) -> Result<(), SessionError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| {
            if s.is_input_disabled() {
                outcome = Err(SessionError::InputLocked);
                return false;
            }
            apply(s);
            true
        });
        outcome
    }

    /// Sends the current input. Switches to the result tab right away and
    /// issues exactly one request.
    pub fn submit(&self) -> Result<(), SessionError> {
        let mut pending = Err(SessionError::EmptyInput);
        self.state.send_if_modified(|s| {
            if s.is_input_disabled() {
                pending = Err(SessionError::InputLocked);
                return false;
            }
            if s.input.trim().is_empty() {
                return false;
            }
            s.epoch += 1;
            s.tab = Tab::Professional;
            s.error = None;
            s.finished = false;
            s.messages = vec![ChatMessage::user(s.input.clone())];
            s.progress_caption = Some(CAPTIONS[0]);
            pending = Ok((s.epoch, ChatRequest {
                language: s.language.clone(),
                messages: s.messages.clone(),
            }));
            true
        });
        let (epoch, request) = pending?;

        info!(
            "Submitting rewrite: chars={} language={}",
            request.messages[0].content.chars().count(),
            request.language.as_deref().unwrap_or("default")
        );

        let mut event = AnalyticsEvent::new(SUBMIT_EVENT, self.distinct_id.clone())
            .with("message", &request.messages[0].content);
        if let Some(language) = &request.language {
            event = event.with("language", language);
        }
        self.analytics.capture(event);

        let mut inflight = lock(&self.inflight);
        abort_inflight(&mut inflight);
        inflight.epoch = epoch;
        inflight.progress = Some(ProgressCaptions::start(caption_setter(self.state.clone(), epoch)));
        inflight.request = Some(tokio::spawn(run_request(
            self.api.clone(),
            request,
            epoch,
            self.state.clone(),
            self.inflight.clone()
        )));
        Ok(())
    }

    /// "Try Again": drop the failed attempt and go back to the input, keeping
    /// what was typed.
    pub fn retry(&self) {
        self.clear(false);
    }

    /// "Start Over": back to an empty input, cancelling any request in flight.
    pub fn reset(&self) {
        self.clear(true);
    }

    fn clear(&self, clear_input: bool) {
        self.state.send_modify(|s| {
            s.epoch += 1;
            s.messages.clear();
            s.finished = false;
            s.error = None;
            s.tab = Tab::Real;
            s.progress_caption = None;
            if clear_input {
                s.input.clear();
            }
        });
        abort_inflight(&mut lock(&self.inflight));
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        abort_inflight(&mut lock(&self.inflight));
    }
}

fn lock(inflight: &Mutex<Inflight>) -> MutexGuard<'_, Inflight> {
    inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn abort_inflight(inflight: &mut Inflight) {
    if let Some(task) = inflight.request.take() {
        if !task.is_finished() {
            debug!("Cancelling in-flight rewrite request");
        }
        task.abort();
    }
    inflight.progress = None;
}

/// Cancels the caption timers once the submission they belong to is no
/// longer waiting for its first chunk.
fn stop_progress(inflight: &Mutex<Inflight>, epoch: u64) {
    let mut inflight = lock(inflight);
    if inflight.epoch == epoch {
        inflight.progress = None;
    }
}

fn caption_setter(
    state: Arc<watch::Sender<SessionState>>,
    epoch: u64
) -> impl Fn(&'static str) -> bool + Send + 'static {
    move |caption| {
        state.send_if_modified(|s| {
            if s.epoch != epoch || s.phase() != Phase::Submitting {
                return false;
            }
            s.progress_caption = Some(caption);
            true
        })
    }
}

async fn run_request(
    api: Arc<dyn ChatApi>,
    request: ChatRequest,
    epoch: u64,
    state: Arc<watch::Sender<SessionState>>,
    inflight: Arc<Mutex<Inflight>>
) {
    let mut stream = match api.send(request).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Rewrite request failed: {}", e);
            fail(&state, epoch);
            stop_progress(&inflight, epoch);
            return;
        }
    };

    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                content.push_str(&text);
                let assistant = ChatMessage::assistant(content.clone());
                let applied = state.send_if_modified(|s| {
                    if s.epoch != epoch {
                        return false;
                    }
                    if s.messages.len() >= 2 {
                        s.messages[1] = assistant;
                    } else {
                        s.messages.push(assistant);
                    }
                    s.progress_caption = None;
                    true
                });
                if !applied {
                    debug!("Dropping stream for superseded submission {}", epoch);
                    return;
                }
                stop_progress(&inflight, epoch);
            }
            Err(e) => {
                warn!("Rewrite stream failed after {} chars: {}", content.len(), e);
                fail(&state, epoch);
                stop_progress(&inflight, epoch);
                return;
            }
        }
    }

    if content.is_empty() {
        warn!("Rewrite stream ended without any content");
        fail(&state, epoch);
        stop_progress(&inflight, epoch);
        return;
    }

    state.send_if_modified(|s| {
        if s.epoch != epoch {
            return false;
        }
        s.finished = true;
        true
    });
    info!("Rewrite complete: chars={}", content.chars().count());
}

fn fail(state: &watch::Sender<SessionState>, epoch: u64) {
    state.send_if_modified(|s| {
        if s.epoch != epoch {
            return false;
        }
        s.error = Some(ADVISORY.to_string());
        s.progress_caption = None;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::channel_analytics;
    use crate::client::{ ClientError, ClientStream };
    use crate::client::progress::CAPTION_DELAYS;
    use crate::models::chat::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    type ChunkSender = mpsc::UnboundedSender<Result<String, ClientError>>;

    enum Script {
        Chunks(Vec<&'static str>),
        FailChunk(&'static str),
        Reject(&'static str),
        Manual(mpsc::UnboundedReceiver<Result<String, ClientError>>),
    }

    #[derive(Default)]
    struct ScriptedApi {
        requests: Mutex<Vec<ChatRequest>>,
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedApi {
        fn with(script: Script) -> Arc<Self> {
            let api = Self::default();
            api.scripts.lock().unwrap().push_back(script);
            Arc::new(api)
        }

        fn manual() -> (Arc<Self>, ChunkSender) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self::with(Script::Manual(rx)), tx)
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for ScriptedApi {
        async fn send(&self, request: ChatRequest) -> Result<ClientStream, ClientError> {
            self.requests.lock().unwrap().push(request);
            let script = self.scripts.lock().unwrap().pop_front().expect("unexpected request");
            match script {
                Script::Chunks(chunks) => {
                    let items: Vec<Result<String, ClientError>> =
                        chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                    Ok(Box::pin(futures::stream::iter(items)))
                }
                Script::FailChunk(first) => {
                    let items = vec![
                        Ok(first.to_string()),
                        Err(ClientError::Stream("connection reset by provider".into())),
                    ];
                    Ok(Box::pin(futures::stream::iter(items)))
                }
                Script::Reject(detail) => {
                    Err(ClientError::Server { status: 500, message: detail.to_string() })
                }
                Script::Manual(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            }
        }
    }

    fn session(api: Arc<ScriptedApi>) -> ConversationSession {
        ConversationSession::new(api, Analytics::disabled())
    }

    async fn wait_for_phase(session: &ConversationSession, phase: Phase) -> SessionState {
        let mut rx = session.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.phase() == phase))
            .await
            .expect("timed out waiting for phase")
            .expect("session dropped");
        state.clone()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn submit_issues_exactly_one_request() {
        let api = ScriptedApi::with(Script::Chunks(vec!["ok"]));
        let session = session(api.clone());
        session.set_input("X").unwrap();
        session.set_language(Some("L".into())).unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Success).await;

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language.as_deref(), Some("L"));
        assert_eq!(requests[0].messages, vec![ChatMessage::user("X")]);
    }

    #[tokio::test]
    async fn default_language_is_omitted_from_request() {
        let api = ScriptedApi::with(Script::Chunks(vec!["ok"]));
        let session = session(api.clone());
        session.set_input("hello").unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Success).await;

        let body = serde_json::to_value(&api.requests()[0]).unwrap();
        assert!(body.get("language").is_none());
    }

    #[tokio::test]
    async fn submit_switches_tab_and_enters_submitting() {
        let (api, _tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("why is nobody answering").unwrap();
        session.submit().unwrap();

        let state = session.snapshot();
        assert_eq!(state.phase(), Phase::Submitting);
        assert_eq!(state.tab, Tab::Professional);
        assert_eq!(state.progress_caption, Some(CAPTIONS[0]));
        assert!(state.is_input_disabled());
        assert_eq!(session.set_input("edit"), Err(SessionError::InputLocked));
        assert_eq!(session.submit(), Err(SessionError::InputLocked));
    }

    #[tokio::test]
    async fn rejects_blank_input() {
        let api = Arc::new(ScriptedApi::default());
        let session = session(api.clone());
        assert_eq!(session.submit(), Err(SessionError::EmptyInput));
        session.set_input("   \n").unwrap();
        assert_eq!(session.submit(), Err(SessionError::EmptyInput));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn streamed_chunks_grow_the_assistant_message() {
        let (api, tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("fix it already").unwrap();
        session.submit().unwrap();

        tx.send(Ok("Could we ".into())).unwrap();
        let state = wait_for_phase(&session, Phase::Streaming).await;
        assert_eq!(state.response(), Some("Could we "));
        assert_eq!(state.progress_caption, None);

        tx.send(Ok("prioritise the fix?".into())).unwrap();
        drop(tx);
        let state = wait_for_phase(&session, Phase::Success).await;

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.response(), Some("Could we prioritise the fix?"));
        assert_eq!(session.copy_text().as_deref(), Some("Could we prioritise the fix?"));
        assert_eq!(session.set_input("again"), Err(SessionError::InputLocked));
    }

    #[tokio::test]
    async fn request_failure_shows_advisory_only() {
        let api = ScriptedApi::with(Script::Reject("quota exceeded for key AIza-secret"));
        let session = session(api);
        session.set_input("ugh").unwrap();
        session.submit().unwrap();

        let state = wait_for_phase(&session, Phase::Error).await;
        assert_eq!(state.error.as_deref(), Some(ADVISORY));
        assert_eq!(state.progress_caption, None);
        assert!(state.is_input_disabled());
    }

    #[tokio::test]
    async fn mid_stream_failure_shows_advisory() {
        let api = ScriptedApi::with(Script::FailChunk("Partial"));
        let session = session(api);
        session.set_input("ugh").unwrap();
        session.submit().unwrap();

        let state = wait_for_phase(&session, Phase::Error).await;
        assert_eq!(state.error.as_deref(), Some(ADVISORY));
        assert!(!state.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn empty_stream_counts_as_failure() {
        let api = ScriptedApi::with(Script::Chunks(vec![]));
        let session = session(api);
        session.set_input("ugh").unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Error).await;
    }

    #[tokio::test]
    async fn retry_returns_to_input_and_keeps_text() {
        let api = ScriptedApi::with(Script::Reject("boom"));
        api.scripts.lock().unwrap().push_back(Script::Chunks(vec!["Better"]));
        let session = session(api.clone());
        session.set_input("try me").unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Error).await;

        session.retry();
        let state = session.snapshot();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.tab, Tab::Real);
        assert_eq!(state.input, "try me");
        assert!(state.error.is_none());

        session.submit().unwrap();
        let state = wait_for_phase(&session, Phase::Success).await;
        assert_eq!(state.response(), Some("Better"));
        assert_eq!(api.requests().len(), 2);
    }

    fn assert_pristine(session: &ConversationSession) {
        let state = session.snapshot();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.messages.is_empty());
        assert!(state.error.is_none());
        assert!(state.input.is_empty());
        assert_eq!(state.tab, Tab::Real);
        assert_eq!(state.progress_caption, None);
        assert!(!session.has_inflight_request());
    }

    #[tokio::test]
    async fn reset_from_idle() {
        let session = session(Arc::new(ScriptedApi::default()));
        session.set_input("draft").unwrap();
        session.reset();
        assert_pristine(&session);
        session.reset();
        assert_pristine(&session);
    }

    #[tokio::test]
    async fn reset_while_submitting_cancels_request() {
        let (api, tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("draft").unwrap();
        session.submit().unwrap();
        settle().await;
        assert!(session.has_inflight_request());

        session.reset();
        assert_pristine(&session);

        let _ = tx.send(Ok("late chunk".into()));
        settle().await;
        assert_pristine(&session);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn reset_while_streaming_discards_partial_output() {
        let (api, tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("draft").unwrap();
        session.submit().unwrap();
        tx.send(Ok("half".into())).unwrap();
        wait_for_phase(&session, Phase::Streaming).await;

        session.reset();
        assert_pristine(&session);
    }

    #[tokio::test]
    async fn reset_after_success_and_error() {
        let api = ScriptedApi::with(Script::Chunks(vec!["done"]));
        api.scripts.lock().unwrap().push_back(Script::Reject("nope"));
        let session = session(api);

        session.set_input("one").unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Success).await;
        session.reset();
        assert_pristine(&session);

        session.set_input("two").unwrap();
        session.submit().unwrap();
        wait_for_phase(&session, Phase::Error).await;
        session.reset();
        assert_pristine(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn captions_advance_while_waiting() {
        let (api, _tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("slow one").unwrap();
        session.submit().unwrap();
        settle().await;

        tokio::time::advance(CAPTION_DELAYS[0]).await;
        settle().await;
        assert_eq!(session.snapshot().progress_caption, Some(CAPTIONS[1]));

        tokio::time::advance(CAPTION_DELAYS[1] - CAPTION_DELAYS[0]).await;
        settle().await;
        assert_eq!(session.snapshot().progress_caption, Some(CAPTIONS[2]));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_submitting_early_cancels_captions() {
        let (api, tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("quick one").unwrap();
        session.submit().unwrap();
        settle().await;

        tokio::time::advance(Duration::from_millis(500)).await;
        tx.send(Ok("Done".into())).unwrap();
        settle().await;
        assert_eq!(session.phase(), Phase::Streaming);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(session.snapshot().progress_caption, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_before_first_caption_leaves_no_stale_update() {
        let (api, _tx) = ScriptedApi::manual();
        let session = session(api);
        session.set_input("never mind").unwrap();
        session.submit().unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(1)).await;
        session.reset();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_pristine(&session);
    }

    #[tokio::test]
    async fn submit_captures_analytics_event() {
        let (analytics, mut rx) = channel_analytics();
        let api = ScriptedApi::with(Script::Chunks(vec!["ok"]));
        let session = ConversationSession::new(api, analytics);
        session.set_input("my boss is clueless").unwrap();
        session.set_language(Some("German".into())).unwrap();
        session.submit().unwrap();

        let event = rx.recv().await.unwrap().remove(0);
        assert_eq!(event.event, SUBMIT_EVENT);
        assert_eq!(event.properties["message"], "my boss is clueless");
        assert_eq!(event.properties["language"], "German");
    }
}
