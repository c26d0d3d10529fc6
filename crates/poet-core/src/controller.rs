//! Per-session interaction state machine.
//!
//! The controller sequences upload → analyze → generate against a
//! [`PhotoFlows`] implementation and owns the only mutable state in the
//! system. The state lock is never held across an await, so `clear`,
//! `set_photo`, `cancel` and `snapshot` stay responsive while a model call is
//! pending.
//!
//! Every dispatched call captures a monotonic request id. Anything that
//! supersedes the call (clear, new upload, cancel) advances the id, and a
//! response whose id no longer matches is discarded without touching state.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::AnalysisResult;
use crate::photo::PhotoReference;
use crate::traits::PhotoFlows;

/// Position in the interaction state machine.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Analyzing,
    Analyzed,
    Generating,
    Generated,
}

impl Phase {
    /// True while a model call is outstanding.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Analyzing | Self::Generating)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Generating => write!(f, "generating"),
            Self::Generated => write!(f, "generated"),
        }
    }
}

/// Everything one UI session knows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    pub photo: Option<PhotoReference>,
    pub analysis: Option<AnalysisResult>,
    pub poem: Option<String>,
    pub phase: Phase,
    /// User-facing message for the last failed action.
    pub error: Option<String>,
}

/// Read-only view of [`InteractionState`] for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct InteractionSnapshot {
    pub phase: Phase,
    /// Data URI or URL of the current photo.
    #[schema(value_type = Option<String>)]
    pub photo: Option<PhotoReference>,
    pub analysis: Option<AnalysisResult>,
    /// Analysis as shown in the UI and sent to the poem prompt.
    pub analysis_text: Option<String>,
    /// Image tags (the analysis objects).
    pub tags: Vec<String>,
    pub poem: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The two model-backed stages.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Analyze,
    Generate,
}

impl Stage {
    fn busy_phase(self) -> Phase {
        match self {
            Self::Analyze => Phase::Analyzing,
            Self::Generate => Phase::Generating,
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Self::Analyze => defaults::MSG_ANALYSIS_FAILED,
            Self::Generate => defaults::MSG_GENERATION_FAILED,
        }
    }

    /// Deadline expiry is a failure of the stage itself.
    fn timed_out(self, timeout: Duration) -> Error {
        let reason = format!("timed out after {:?}", timeout);
        match self {
            Self::Analyze => Error::Analysis(reason),
            Self::Generate => Error::Generation(reason),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    seq: u64,
    resume_phase: Phase,
}

#[derive(Debug, Default)]
struct Inner {
    state: InteractionState,
    seq: u64,
    pending: Option<Pending>,
    updated_at: DateTime<Utc>,
}

impl Inner {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Invalidate any in-flight request.
    fn supersede(&mut self) {
        self.seq += 1;
        if let Some(pending) = self.pending.take() {
            debug!(request_seq = pending.seq, "Superseded in-flight request");
        }
    }

    fn dispatch(&mut self, stage: Stage) -> u64 {
        self.seq += 1;
        self.pending = Some(Pending {
            seq: self.seq,
            resume_phase: self.state.phase,
        });
        self.state.phase = stage.busy_phase();
        self.state.error = None;
        self.touch();
        self.seq
    }

    /// Take the pending request if `seq` is still the current one.
    fn settle(&mut self, seq: u64) -> Option<Pending> {
        match self.pending {
            Some(pending) if pending.seq == seq && self.seq == seq => self.pending.take(),
            _ => None,
        }
    }

    fn snapshot(&self) -> InteractionSnapshot {
        let analysis = self.state.analysis.clone();
        InteractionSnapshot {
            phase: self.state.phase,
            photo: self.state.photo.clone(),
            analysis_text: analysis.as_ref().and_then(|a| a.to_prompt_text().ok()),
            tags: analysis
                .as_ref()
                .map(|a| a.objects.clone())
                .unwrap_or_default(),
            analysis,
            poem: self.state.poem.clone(),
            error: self.state.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restores the previous phase if the awaiting caller goes away mid-call.
struct PendingGuard {
    inner: Arc<Mutex<Inner>>,
    seq: u64,
    armed: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock(&self.inner);
        if let Some(pending) = inner.settle(self.seq) {
            inner.seq += 1;
            inner.state.phase = pending.resume_phase;
            inner.touch();
            debug!(request_seq = self.seq, "Released abandoned request");
        }
    }
}

/// State machine over one session's [`InteractionState`].
pub struct InteractionController {
    flows: Arc<dyn PhotoFlows>,
    inner: Arc<Mutex<Inner>>,
    call_timeout: Duration,
}

impl InteractionController {
    /// Create a controller in the Idle phase.
    pub fn new(flows: Arc<dyn PhotoFlows>) -> Self {
        Self {
            flows,
            inner: Arc::new(Mutex::new(Inner {
                updated_at: Utc::now(),
                ..Inner::default()
            })),
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
        }
    }

    /// Bound every flow call by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Current state, for rendering.
    pub fn snapshot(&self) -> InteractionSnapshot {
        lock(&self.inner).snapshot()
    }

    /// Replace the photo; analysis, poem and error are cleared.
    pub fn set_photo(&self, photo: PhotoReference) -> InteractionSnapshot {
        let mut inner = lock(&self.inner);
        inner.supersede();
        debug!(photo = %photo, "Photo set");
        inner.state = InteractionState {
            photo: Some(photo),
            ..InteractionState::default()
        };
        inner.touch();
        inner.snapshot()
    }

    /// Reset to Idle with nothing set.
    pub fn clear(&self) -> InteractionSnapshot {
        let mut inner = lock(&self.inner);
        inner.supersede();
        inner.state = InteractionState::default();
        inner.touch();
        debug!("Interaction cleared");
        inner.snapshot()
    }

    /// Abandon the in-flight request, if any, and return to the prior phase.
    pub fn cancel(&self) -> InteractionSnapshot {
        let mut inner = lock(&self.inner);
        if let Some(pending) = inner.pending.take() {
            inner.seq += 1;
            inner.state.phase = pending.resume_phase;
            inner.touch();
            info!(request_seq = pending.seq, phase = %pending.resume_phase, "Request cancelled");
        }
        inner.snapshot()
    }

    /// Record a user-facing error without changing anything else.
    pub fn report_error(&self, message: impl Into<String>) -> InteractionSnapshot {
        let mut inner = lock(&self.inner);
        inner.state.error = Some(message.into());
        inner.touch();
        inner.snapshot()
    }

    /// Run the photo analysis flow on the current photo.
    pub async fn request_analyze(&self) -> Result<InteractionSnapshot> {
        let (seq, photo) = {
            let mut inner = lock(&self.inner);
            Self::ensure_idle_for_request(&inner)?;
            let Some(photo) = inner.state.photo.clone() else {
                inner.state.error = Some(defaults::MSG_PHOTO_REQUIRED.to_string());
                inner.touch();
                return Err(Error::InvalidInput(defaults::MSG_PHOTO_REQUIRED.to_string()));
            };
            (inner.dispatch(Stage::Analyze), photo)
        };

        let outcome = self
            .run(seq, Stage::Analyze, self.flows.analyze_photo(&photo))
            .await;

        let mut inner = lock(&self.inner);
        let pending = Self::settle_or_discard(&mut inner, seq)?;
        match outcome {
            Ok(analysis) => {
                info!(
                    request_seq = seq,
                    objects = analysis.objects.len(),
                    "Photo analyzed"
                );
                inner.state.analysis = Some(analysis);
                inner.state.poem = None;
                inner.state.phase = Phase::Analyzed;
                inner.state.error = None;
                inner.touch();
                Ok(inner.snapshot())
            }
            Err(e) => Err(Self::fail(&mut inner, pending, Stage::Analyze, e)),
        }
    }

    /// Run the poem generation flow on the current photo and analysis.
    pub async fn request_generate(&self) -> Result<InteractionSnapshot> {
        let (seq, photo, analysis_text) = {
            let mut inner = lock(&self.inner);
            Self::ensure_idle_for_request(&inner)?;
            let Some(photo) = inner.state.photo.clone() else {
                return Err(Self::out_of_sequence(&mut inner, defaults::MSG_PHOTO_REQUIRED));
            };
            let Some(analysis) = inner.state.analysis.clone() else {
                return Err(Self::out_of_sequence(
                    &mut inner,
                    defaults::MSG_ANALYSIS_REQUIRED,
                ));
            };
            let analysis_text = analysis.to_prompt_text()?;
            (inner.dispatch(Stage::Generate), photo, analysis_text)
        };

        let outcome = self
            .run(
                seq,
                Stage::Generate,
                self.flows.generate_poem(&photo, &analysis_text),
            )
            .await;

        let mut inner = lock(&self.inner);
        let pending = Self::settle_or_discard(&mut inner, seq)?;
        match outcome {
            Ok(result) => {
                info!(
                    request_seq = seq,
                    lines = result.poem.lines().count(),
                    "Poem generated"
                );
                inner.state.poem = Some(result.poem);
                inner.state.phase = Phase::Generated;
                inner.state.error = None;
                inner.touch();
                Ok(inner.snapshot())
            }
            Err(e) => Err(Self::fail(&mut inner, pending, Stage::Generate, e)),
        }
    }

    /// Await a flow call under the timeout, releasing it if we are dropped.
    async fn run<T>(
        &self,
        seq: u64,
        stage: Stage,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let mut guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            seq,
            armed: true,
        };
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(stage.timed_out(self.call_timeout)),
        };
        guard.armed = false;
        debug!(
            request_seq = seq,
            phase = %stage.busy_phase(),
            duration_ms = start.elapsed().as_millis() as u64,
            success = outcome.is_ok(),
            "Flow call finished"
        );
        outcome
    }

    fn ensure_idle_for_request(inner: &Inner) -> Result<()> {
        if inner.state.phase.is_busy() {
            return Err(Error::State(format!(
                "A request is already in progress ({})",
                inner.state.phase
            )));
        }
        Ok(())
    }

    fn out_of_sequence(inner: &mut Inner, message: &str) -> Error {
        inner.state.error = Some(message.to_string());
        inner.touch();
        Error::State(message.to_string())
    }

    fn settle_or_discard(inner: &mut Inner, seq: u64) -> Result<Pending> {
        inner.settle(seq).ok_or_else(|| {
            debug!(
                request_seq = seq,
                current_seq = inner.seq,
                "Discarding response from superseded request"
            );
            Error::Cancelled("Request was superseded".to_string())
        })
    }

    fn fail(inner: &mut Inner, pending: Pending, stage: Stage, error: Error) -> Error {
        warn!(
            request_seq = pending.seq,
            error = %error,
            "Flow call failed"
        );
        inner.state.phase = pending.resume_phase;
        inner.state.error = Some(stage.failure_message().to_string());
        inner.touch();
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PoemResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Flows that replay scripted outcomes, optionally waiting on a gate.
    #[derive(Default)]
    struct ScriptedFlows {
        analyses: Mutex<VecDeque<Result<AnalysisResult>>>,
        poems: Mutex<VecDeque<Result<PoemResult>>>,
        gate: Option<Notify>,
        hang: bool,
        analyze_calls: AtomicUsize,
        poem_calls: AtomicUsize,
        last_analysis_text: Mutex<Option<String>>,
    }

    impl ScriptedFlows {
        fn new() -> Self {
            Self::default()
        }

        fn gated() -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::default()
            }
        }

        fn push_analysis(&self, outcome: Result<AnalysisResult>) {
            self.analyses.lock().unwrap().push_back(outcome);
        }

        fn push_poem(&self, outcome: Result<PoemResult>) {
            self.poems.lock().unwrap().push_back(outcome);
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        async fn wait(&self) {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl PhotoFlows for ScriptedFlows {
        async fn analyze_photo(&self, _photo: &PhotoReference) -> Result<AnalysisResult> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            self.wait().await;
            self.analyses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Analysis("no scripted analysis".to_string())))
        }

        async fn generate_poem(
            &self,
            _photo: &PhotoReference,
            analysis_text: &str,
        ) -> Result<PoemResult> {
            self.poem_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_analysis_text.lock().unwrap() = Some(analysis_text.to_string());
            self.wait().await;
            self.poems
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Generation("no scripted poem".to_string())))
        }
    }

    fn photo(name: &str) -> PhotoReference {
        PhotoReference::parse(format!("https://example.com/{}.jpg", name)).unwrap()
    }

    fn cat_analysis() -> AnalysisResult {
        AnalysisResult {
            objects: vec!["cat".to_string()],
            scenes: vec!["indoor".to_string()],
            emotions: vec!["calm".to_string()],
            description: "A cat resting.".to_string(),
        }
    }

    fn poem() -> PoemResult {
        PoemResult {
            poem: "Soft paws at rest,\nthe afternoon sleeps.".to_string(),
        }
    }

    fn controller(flows: &Arc<ScriptedFlows>) -> Arc<InteractionController> {
        let flows: Arc<dyn PhotoFlows> = flows.clone();
        Arc::new(InteractionController::new(flows))
    }

    async fn wait_for_phase(controller: &InteractionController, phase: Phase) {
        while controller.snapshot().phase != phase {
            tokio::task::yield_now().await;
        }
    }

    async fn analyzed(flows: &Arc<ScriptedFlows>) -> Arc<InteractionController> {
        let controller = controller(flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));
        controller.request_analyze().await.unwrap();
        controller
    }

    #[test]
    fn test_new_controller_is_idle_and_empty() {
        let controller = controller(&Arc::new(ScriptedFlows::new()));
        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.photo.is_none());
        assert!(snap.analysis.is_none());
        assert!(snap.poem.is_none());
        assert!(snap.error.is_none());
        assert!(snap.tags.is_empty());
    }

    #[tokio::test]
    async fn test_full_scenario_analyze_then_generate() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = controller(&flows);

        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));
        let snap = controller.request_analyze().await.unwrap();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(snap.analysis, Some(cat_analysis()));
        assert_eq!(snap.tags, vec!["cat"]);
        assert!(snap.error.is_none());

        flows.push_poem(Ok(poem()));
        let snap = controller.request_generate().await.unwrap();
        assert_eq!(snap.phase, Phase::Generated);
        assert_eq!(snap.poem.as_deref(), Some(poem().poem.as_str()));
        assert_eq!(snap.analysis, Some(cat_analysis()));

        let sent = flows.last_analysis_text.lock().unwrap().clone().unwrap();
        assert_eq!(sent, cat_analysis().to_prompt_text().unwrap());
    }

    #[tokio::test]
    async fn test_analyze_failure_reverts_phase_with_message() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Err(Error::Analysis("model down".to_string())));

        let err = controller.request_analyze().await.unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_ANALYSIS_FAILED));
        assert!(snap.analysis.is_none());
        assert!(snap.photo.is_some());
    }

    #[tokio::test]
    async fn test_reanalyze_failure_keeps_previous_analysis() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;
        flows.push_analysis(Err(Error::Analysis("model down".to_string())));

        assert!(controller.request_analyze().await.is_err());
        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(snap.analysis, Some(cat_analysis()));
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_ANALYSIS_FAILED));
    }

    #[tokio::test]
    async fn test_analyze_without_photo_sets_error_and_keeps_phase() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = controller(&flows);

        let err = controller.request_analyze().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_PHOTO_REQUIRED));
        assert_eq!(flows.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_in_idle_is_state_error() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));

        let err = controller.request_generate().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_ANALYSIS_REQUIRED));
        assert_eq!(flows.poem_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_without_photo_asks_for_upload() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = controller(&flows);

        let err = controller.request_generate().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
        assert_eq!(
            controller.snapshot().error.as_deref(),
            Some(defaults::MSG_PHOTO_REQUIRED)
        );
    }

    #[tokio::test]
    async fn test_generate_failure_reverts_to_analyzed() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;
        flows.push_poem(Err(Error::Generation("model down".to_string())));

        let err = controller.request_generate().await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_GENERATION_FAILED));
        assert!(snap.poem.is_none());
    }

    #[tokio::test]
    async fn test_regenerate_failure_returns_to_generated() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;
        flows.push_poem(Ok(poem()));
        controller.request_generate().await.unwrap();
        flows.push_poem(Err(Error::Generation("model down".to_string())));

        assert!(controller.request_generate().await.is_err());
        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Generated);
        assert_eq!(snap.poem.as_deref(), Some(poem().poem.as_str()));
    }

    #[tokio::test]
    async fn test_reanalyze_clears_stale_poem() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;
        flows.push_poem(Ok(poem()));
        controller.request_generate().await.unwrap();

        flows.push_analysis(Ok(cat_analysis()));
        let snap = controller.request_analyze().await.unwrap();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert!(snap.poem.is_none());
    }

    #[tokio::test]
    async fn test_clear_from_every_settled_phase() {
        let flows = Arc::new(ScriptedFlows::new());

        let idle = controller(&flows);
        idle.set_photo(photo("p1"));

        let analyzed_controller = analyzed(&flows).await;

        let generated = analyzed(&flows).await;
        flows.push_poem(Ok(poem()));
        generated.request_generate().await.unwrap();

        let errored = controller(&flows);
        let _ = errored.request_analyze().await;

        for controller in [idle, analyzed_controller, generated, errored] {
            let snap = controller.clear();
            assert_eq!(snap.phase, Phase::Idle);
            assert!(snap.photo.is_none());
            assert!(snap.analysis.is_none());
            assert!(snap.poem.is_none());
            assert!(snap.error.is_none());
        }
    }

    #[tokio::test]
    async fn test_set_photo_resets_analysis_and_poem() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;
        flows.push_poem(Ok(poem()));
        controller.request_generate().await.unwrap();

        let snap = controller.set_photo(photo("p2"));
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.photo, Some(photo("p2")));
        assert!(snap.analysis.is_none());
        assert!(snap.poem.is_none());
    }

    #[tokio::test]
    async fn test_superseded_analyze_after_clear_is_discarded() {
        let flows = Arc::new(ScriptedFlows::gated());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_analyze().await })
        };
        wait_for_phase(&controller, Phase::Analyzing).await;

        // Clear is accepted while the call is pending.
        let cleared = controller.clear();
        assert_eq!(cleared.phase, Phase::Idle);

        flows.release();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled(_))));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.photo.is_none());
        assert!(snap.analysis.is_none());
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_superseded_analyze_after_new_upload_keeps_new_photo() {
        let flows = Arc::new(ScriptedFlows::gated());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_analyze().await })
        };
        wait_for_phase(&controller, Phase::Analyzing).await;
        controller.set_photo(photo("p2"));

        flows.release();
        assert!(task.await.unwrap().is_err());

        let snap = controller.snapshot();
        assert_eq!(snap.photo, Some(photo("p2")));
        assert!(snap.analysis.is_none());
        assert_eq!(snap.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_reentrant_analyze_is_rejected() {
        let flows = Arc::new(ScriptedFlows::gated());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_analyze().await })
        };
        wait_for_phase(&controller, Phase::Analyzing).await;

        let err = controller.request_analyze().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
        let err = controller.request_generate().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
        assert_eq!(controller.snapshot().phase, Phase::Analyzing);

        flows.release();
        let snap = task.await.unwrap().unwrap();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(flows.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_restores_previous_phase() {
        let flows = Arc::new(ScriptedFlows::gated());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_analyze().await })
        };
        wait_for_phase(&controller, Phase::Analyzing).await;

        let snap = controller.cancel();
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.photo.is_some());

        flows.release();
        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled(_))));
        assert!(controller.snapshot().analysis.is_none());
    }

    #[tokio::test]
    async fn test_dropped_caller_releases_pending_request() {
        let flows = Arc::new(ScriptedFlows::gated());
        let controller = controller(&flows);
        controller.set_photo(photo("p1"));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_analyze().await })
        };
        wait_for_phase(&controller, Phase::Analyzing).await;

        task.abort();
        let _ = task.await;

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.error.is_none());

        // The session is usable again.
        flows.push_analysis(Ok(cat_analysis()));
        flows.release();
        let snap = controller.request_analyze().await.unwrap();
        assert_eq!(snap.phase, Phase::Analyzed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let flows = Arc::new(ScriptedFlows::hanging());
        let flows_dyn: Arc<dyn PhotoFlows> = flows.clone();
        let controller =
            InteractionController::new(flows_dyn).with_call_timeout(Duration::from_secs(5));
        controller.set_photo(photo("p1"));

        let err = controller.request_analyze().await.unwrap_err();
        assert!(matches!(err, Error::Analysis(ref reason) if reason == "timed out after 5s"));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_ANALYSIS_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_timeout_is_generation_failure() {
        let flows = Arc::new(ScriptedFlows::gated());
        let flows_dyn: Arc<dyn PhotoFlows> = flows.clone();
        let controller =
            InteractionController::new(flows_dyn).with_call_timeout(Duration::from_secs(5));
        controller.set_photo(photo("p1"));
        flows.push_analysis(Ok(cat_analysis()));
        flows.release();
        controller.request_analyze().await.unwrap();

        // Gate stays closed for the poem call.
        let err = controller.request_generate().await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref reason) if reason == "timed out after 5s"));

        let snap = controller.snapshot();
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(snap.error.as_deref(), Some(defaults::MSG_GENERATION_FAILED));
    }

    #[tokio::test]
    async fn test_report_error_keeps_state() {
        let flows = Arc::new(ScriptedFlows::new());
        let controller = analyzed(&flows).await;

        let snap = controller.report_error("Failed to read file.");
        assert_eq!(snap.phase, Phase::Analyzed);
        assert_eq!(snap.error.as_deref(), Some("Failed to read file."));
        assert!(snap.analysis.is_some());
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::Generating).unwrap(),
            "\"generating\""
        );
        assert!(Phase::Analyzing.is_busy());
        assert!(!Phase::Generated.is_busy());
    }
}
