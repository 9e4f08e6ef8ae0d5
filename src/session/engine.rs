//! The session engine: one task that owns all session state.
//!
//! Every mutation flows through a single command queue, so there are no
//! torn updates between playback progress, plan transitions and reviewer
//! verdicts.  Background work (script fetch, narration prefetch, playback,
//! settle timers, reviews) runs in spawned tasks that report back into the
//! same queue.
//!
//! ```text
//!  SessionHandle ───commands───▶ ┌───────────────┐ ──events───▶ subscribers
//!                                │ SessionEngine │
//!  ReviewProtocol ─resolutions──▶└───────────────┘ ──snapshot─▶ SharedState
//! ```
//!
//! Playback results carry a sequence number stamped at start; any result or
//! settle timer whose sequence no longer matches is stale (the user skipped,
//! restarted or disposed meanwhile) and is dropped.
//!
//! ## Quick-start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use guided_session::config::AppConfig;
//! use guided_session::narration::{ApiSynthesizer, PacedSpeechOutput};
//! use guided_session::plan::SessionContext;
//! use guided_session::review::ApiReviewer;
//! use guided_session::script::ApiScriptProvider;
//! use guided_session::session::{SessionEngine, SessionProviders};
//!
//! # async fn demo() {
//! let config = AppConfig::load().unwrap_or_default();
//! let providers = SessionProviders {
//!     script: Arc::new(ApiScriptProvider::from_config(&config.script)),
//!     synthesizer: Arc::new(ApiSynthesizer::from_config(&config.synth)),
//!     reviewer: Arc::new(ApiReviewer::from_config(&config.reviewer)),
//!     output: Arc::new(PacedSpeechOutput::new()),
//! };
//!
//! let session = SessionEngine::spawn(
//!     SessionContext::new("unwind after a long day", "sage"),
//!     config,
//!     providers,
//! );
//! session.confirm_plan().await;
//! session.play().await;
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::AppConfig;
use crate::narration::{
    NarrationOutput, NarrationSynthesizer, PlaybackOutcome, ResolvedNarration, SynthesisRequest,
};
use crate::plan::{
    PlanOptions, SessionContext, SessionPlan, StepFeedback, StepPatch, StepStatus, StepType,
};
use crate::review::{
    apply_transitions, PlanResolution, PlanReviewer, ResolutionPhase, ReviewProtocol,
    ReviewResolution,
};
use crate::script::{
    emergency_script, FallbackScriptProvider, ScriptProvider, ScriptSegment, SessionScript,
};

use super::events::{EventBus, SessionEvent};
use super::segment::SessionSegment;
use super::state::{new_shared_state, PlayState, SegmentSnapshot, SessionState, SharedState};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const RESOLUTION_QUEUE_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Everything that can mutate a session.
///
/// The first group comes from [`SessionHandle`]; the internal group is sent
/// by the engine's own background tasks.
#[derive(Debug)]
pub enum SessionCommand {
    Play,
    Pause,
    Next,
    Prev,
    Restart,
    ConfirmPlan,
    SubmitStepFeedback(StepFeedback),
    CompleteWrapUp,
    RevisePlan { feedback: Option<String> },
    Dispose,

    // Internal: background task results.
    ScriptReady(SessionScript),
    SegmentResolved { index: usize, narration: ResolvedNarration },
    PlaybackFinished { index: usize, seq: u64, outcome: PlaybackOutcome },
    SettleElapsed { seq: u64 },
}

/// The pluggable backends a session runs against.
pub struct SessionProviders {
    pub script: Arc<dyn ScriptProvider>,
    pub synthesizer: Arc<dyn NarrationSynthesizer>,
    pub reviewer: Arc<dyn PlanReviewer>,
    pub output: Arc<dyn NarrationOutput>,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cheap-to-clone front door to a running session.
///
/// Commands are fire-and-forget: effects show up in the state snapshot and
/// on the event channel.  Once the engine is disposed, commands are dropped
/// with a debug log.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state: SharedState,
    events: Arc<EventBus>,
}

impl SessionHandle {
    pub async fn play(&self) {
        self.send(SessionCommand::Play).await;
    }

    pub async fn pause(&self) {
        self.send(SessionCommand::Pause).await;
    }

    pub async fn next(&self) {
        self.send(SessionCommand::Next).await;
    }

    pub async fn prev(&self) {
        self.send(SessionCommand::Prev).await;
    }

    /// Jump back to the first segment whose step is not complete.
    pub async fn restart(&self) {
        self.send(SessionCommand::Restart).await;
    }

    pub async fn confirm_plan(&self) {
        self.send(SessionCommand::ConfirmPlan).await;
    }

    /// Apply a caller-made feedback decision for a step awaiting one.
    pub async fn submit_step_feedback(&self, feedback: StepFeedback) {
        self.send(SessionCommand::SubmitStepFeedback(feedback)).await;
    }

    pub async fn complete_wrap_up(&self) {
        self.send(SessionCommand::CompleteWrapUp).await;
    }

    /// Replace the plan with a revision built from the same context.
    pub async fn revise_plan(&self, feedback: Option<String>) {
        self.send(SessionCommand::RevisePlan { feedback }).await;
    }

    /// Stop playback, release audio and shut the engine down.
    pub async fn dispose(&self) {
        self.send(SessionCommand::Dispose).await;
    }

    /// Current observable snapshot.
    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).await.is_err() {
            log::debug!("session: engine is gone, command dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// How a playback start was requested; decides what an unresolved current
/// segment means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// The user pressed play: an unready segment is an error.
    Explicit,
    /// Auto-advance or skip: wait for the segment to resolve.
    Auto,
}

pub struct SessionEngine {
    config: AppConfig,
    context: SessionContext,
    script_chain: Arc<dyn ScriptProvider>,
    synthesizer: Arc<dyn NarrationSynthesizer>,
    output: Arc<dyn NarrationOutput>,
    protocol: ReviewProtocol,
    events: Arc<EventBus>,
    shared: SharedState,
    cmd_tx: mpsc::Sender<SessionCommand>,

    plan: SessionPlan,
    segments: Vec<SessionSegment>,
    current: usize,
    play_state: PlayState,
    /// Stamped into playback tasks and settle timers; bumped on every start
    /// and interruption so stale results identify themselves.
    playback_seq: u64,
    /// True while an `output.play` task is in flight for the current segment.
    playback_active: bool,
    /// Auto-advance landed on an unresolved segment; start as soon as its
    /// narration arrives.
    pending_start: bool,
    in_flight_prefetch: HashSet<usize>,
    error: Option<String>,
    is_initialized: bool,
    disposed: bool,
}

impl SessionEngine {
    /// Build a plan from the context, start the engine task and hand back
    /// its handle.  Must be called from within a tokio runtime.
    pub fn spawn(
        context: SessionContext,
        config: AppConfig,
        providers: SessionProviders,
    ) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (resolution_tx, resolution_rx) = mpsc::channel(RESOLUTION_QUEUE_CAPACITY);

        let shared = new_shared_state();
        let events = Arc::new(EventBus::default());
        let protocol = ReviewProtocol::new(Arc::clone(&providers.reviewer), resolution_tx);
        let script_chain: Arc<dyn ScriptProvider> = Arc::new(
            FallbackScriptProvider::with_default_chain(Arc::clone(&providers.script)),
        );
        let plan = SessionPlan::from_context(&context, PlanOptions::default());

        let engine = SessionEngine {
            config,
            context,
            script_chain,
            synthesizer: providers.synthesizer,
            output: providers.output,
            protocol,
            events: Arc::clone(&events),
            shared: Arc::clone(&shared),
            cmd_tx: cmd_tx.clone(),
            plan,
            segments: Vec::new(),
            current: 0,
            play_state: PlayState::Stopped,
            playback_seq: 0,
            playback_active: false,
            pending_start: false,
            in_flight_prefetch: HashSet::new(),
            error: None,
            is_initialized: false,
            disposed: false,
        };
        tokio::spawn(engine.run(cmd_rx, resolution_rx));

        SessionHandle {
            cmd_tx,
            state: shared,
            events,
        }
    }

    /// The engine loop.  Exits on `Dispose` or when every handle is gone.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut resolution_rx: mpsc::Receiver<ReviewResolution>,
    ) {
        log::info!(
            "session: engine started (plan {}, intent {})",
            self.plan.id,
            self.plan.intent.as_str()
        );
        self.publish();
        self.events
            .emit(SessionEvent::PlanConfirmationNeeded(self.plan.clone()));
        self.spawn_script_fetch();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Dispose) | None => {
                        self.dispose();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(resolution) = resolution_rx.recv() => {
                    self.handle_resolution(resolution);
                }
            }
        }

        log::info!("session: engine stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Play => self.handle_play(),
            SessionCommand::Pause => self.handle_pause(),
            SessionCommand::Next => self.handle_next(),
            SessionCommand::Prev => self.handle_prev(),
            SessionCommand::Restart => self.handle_restart(),
            SessionCommand::ConfirmPlan => self.handle_confirm_plan(),
            SessionCommand::SubmitStepFeedback(feedback) => self.apply_step_feedback(feedback),
            SessionCommand::CompleteWrapUp => self.handle_complete_wrap_up(),
            SessionCommand::RevisePlan { feedback } => self.handle_revise_plan(feedback),
            SessionCommand::ScriptReady(script) => self.handle_script_ready(script),
            SessionCommand::SegmentResolved { index, narration } => {
                self.handle_segment_resolved(index, narration)
            }
            SessionCommand::PlaybackFinished { index, seq, outcome } => {
                self.handle_playback_finished(index, seq, outcome)
            }
            SessionCommand::SettleElapsed { seq } => self.handle_settle_elapsed(seq),
            // Handled by the run loop before dispatch.
            SessionCommand::Dispose => {}
        }
    }

    fn handle_resolution(&mut self, resolution: ReviewResolution) {
        match resolution {
            ReviewResolution::Plan(resolution) => self.apply_plan_resolution(resolution),
            ReviewResolution::Feedback(feedback) => self.apply_step_feedback(feedback),
        }
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    fn spawn_script_fetch(&self) {
        let provider = Arc::clone(&self.script_chain);
        let context = self.context.clone();
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let script = match provider.generate(&context).await {
                Ok(script) => script,
                Err(e) => {
                    // The chain ends in the emergency provider, so this is
                    // unreachable in practice; degrade anyway.
                    log::warn!("session: script chain failed ({e}); using the emergency script");
                    emergency_script(&context)
                }
            };
            let _ = cmd_tx.send(SessionCommand::ScriptReady(script)).await;
        });
    }

    fn handle_script_ready(&mut self, script: SessionScript) {
        if self.is_initialized {
            log::debug!("session: already initialized, late script dropped");
            return;
        }
        log::info!(
            "session: script '{}' ready ({} segments)",
            script.title,
            script.segments.len()
        );
        self.segments = SessionSegment::from_script(&script);
        self.plan = self.plan.materialize_segments(&script.segments);
        self.is_initialized = true;
        self.current = 0;
        self.prefetch();
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Playback control
    // -----------------------------------------------------------------------

    fn handle_play(&mut self) {
        match self.play_state {
            PlayState::Playing => {
                log::debug!("session: play ignored, already playing");
            }
            PlayState::Paused => {
                if self.playback_active {
                    self.output.resume();
                    self.play_state = PlayState::Playing;
                    self.events.emit(SessionEvent::Play);
                    self.publish();
                } else if self.current_is_resolved() {
                    // Paused in the gap between segments: restart the
                    // current one from its beginning.
                    self.start_current_playback();
                } else {
                    self.pending_start = true;
                    self.play_state = PlayState::Playing;
                    self.events.emit(SessionEvent::Play);
                    self.publish();
                }
            }
            PlayState::Stopped => self.try_start(StartMode::Explicit),
        }
    }

    fn handle_pause(&mut self) {
        if self.play_state != PlayState::Playing {
            log::debug!("session: pause ignored, not playing");
            return;
        }
        self.output.pause();
        self.play_state = PlayState::Paused;
        self.events.emit(SessionEvent::Pause);
        self.publish();
    }

    fn handle_next(&mut self) {
        if !self.is_initialized || self.segments.is_empty() {
            self.set_error("cannot skip: no segments are available yet");
            return;
        }
        if self.current + 1 >= self.segments.len() {
            // Skipping past the end ends the session.
            self.finish_session();
            return;
        }
        let was_playing = self.play_state == PlayState::Playing;
        self.interrupt_playback();
        self.current += 1;
        log::info!("session: skipped forward to segment {}", self.current);
        if was_playing {
            self.try_start(StartMode::Auto);
        } else {
            self.play_state = PlayState::Stopped;
            self.publish();
        }
    }

    fn handle_prev(&mut self) {
        if !self.is_initialized || self.segments.is_empty() {
            self.set_error("cannot skip: no segments are available yet");
            return;
        }
        let was_playing = self.play_state == PlayState::Playing;
        self.interrupt_playback();
        self.current = self.current.saturating_sub(1);
        log::info!("session: skipped back to segment {}", self.current);
        if was_playing {
            self.try_start(StartMode::Auto);
        } else {
            self.play_state = PlayState::Stopped;
            self.publish();
        }
    }

    fn handle_restart(&mut self) {
        if !self.is_initialized || self.segments.is_empty() {
            self.set_error("cannot restart: no segments are available yet");
            return;
        }
        let was_playing = self.play_state == PlayState::Playing;
        self.interrupt_playback();

        // Seek the first segment whose step still has work left.
        let target = self
            .segments
            .iter()
            .position(|seg| {
                self.plan
                    .step(&seg.step_id)
                    .map(|s| s.status != StepStatus::Complete)
                    .unwrap_or(true)
            })
            .unwrap_or(0);
        self.current = target;
        log::info!("session: restarting at segment {target}");

        if was_playing {
            self.try_start(StartMode::Auto);
        } else {
            self.play_state = PlayState::Stopped;
            self.publish();
        }
    }

    fn try_start(&mut self, mode: StartMode) {
        if !self.is_initialized || self.segments.is_empty() {
            self.set_error("cannot play: no segments are available yet");
            return;
        }
        if self.current >= self.segments.len() {
            self.current = self.segments.len() - 1;
        }
        if !self.current_is_resolved() {
            match mode {
                StartMode::Explicit => {
                    let id = self.segments[self.current].script.id.clone();
                    self.set_error(&format!("segment '{id}' is not ready yet"));
                }
                StartMode::Auto => {
                    self.pending_start = true;
                    self.play_state = PlayState::Playing;
                    self.prefetch();
                    self.publish();
                }
            }
            return;
        }
        self.start_current_playback();
    }

    fn start_current_playback(&mut self) {
        self.pending_start = false;
        self.playback_seq += 1;
        let seq = self.playback_seq;
        let index = self.current;
        let piece = self.segments[index].narration_piece(self.config.playback.speech_chars_per_sec);

        // Clear any stop or pause left over from the previous segment
        // before the new play task subscribes to the control signal.
        self.output.resume();
        self.playback_active = true;

        let output = Arc::clone(&self.output);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let outcome = output.play(piece).await;
            let _ = cmd_tx
                .send(SessionCommand::PlaybackFinished { index, seq, outcome })
                .await;
        });

        let step_id = self.segments[index].step_id.clone();
        self.plan = self
            .plan
            .with_step_status(&step_id, StepStatus::InProgress, StepPatch::default());

        self.play_state = PlayState::Playing;
        self.error = None;
        self.events.emit(SessionEvent::Play);
        self.prefetch();
        self.publish();
    }

    fn handle_playback_finished(&mut self, index: usize, seq: u64, outcome: PlaybackOutcome) {
        if seq != self.playback_seq {
            log::debug!("session: stale playback result for segment {index}, dropped");
            return;
        }
        self.playback_active = false;

        match outcome {
            // A stop was issued by whoever interrupted us; they already
            // decided what happens next.
            PlaybackOutcome::Stopped => return,
            PlaybackOutcome::Failed(reason) => {
                log::warn!(
                    "session: playback failed for segment {index} ({reason}); treating it as finished"
                );
            }
            PlaybackOutcome::Completed => {}
        }

        // The segment's step is done; ask for feedback while moving on.
        if let Some(step_id) = self.segments.get(index).map(|s| s.step_id.clone()) {
            self.plan = self.plan.with_step_status(
                &step_id,
                StepStatus::AwaitingFeedback,
                StepPatch::default(),
            );
            if let Some(step) = self.plan.step(&step_id) {
                self.events.emit(SessionEvent::FeedbackRequired(step.clone()));
                self.protocol.handle_step_feedback(step.clone());
            }
        }

        if index + 1 >= self.segments.len() {
            log::info!("session: final segment finished");
            self.play_state = PlayState::Stopped;
            self.events.emit(SessionEvent::End);
            self.publish();
            return;
        }

        // Let the moment settle before moving on.
        let delay = Duration::from_millis(self.config.playback.settle_delay_ms);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = cmd_tx.send(SessionCommand::SettleElapsed { seq }).await;
        });
        self.publish();
    }

    fn handle_settle_elapsed(&mut self, seq: u64) {
        if seq != self.playback_seq {
            log::debug!("session: stale settle timer, dropped");
            return;
        }
        if self.play_state != PlayState::Playing {
            log::debug!("session: settle elapsed while not playing, dropped");
            return;
        }
        self.current += 1;
        self.try_start(StartMode::Auto);
    }

    fn finish_session(&mut self) {
        self.interrupt_playback();
        self.play_state = PlayState::Stopped;
        self.events.emit(SessionEvent::End);
        self.publish();
    }

    /// Invalidate in-flight playback and settle timers.
    fn interrupt_playback(&mut self) {
        self.playback_seq += 1;
        self.playback_active = false;
        self.pending_start = false;
        self.output.stop();
    }

    fn current_is_resolved(&self) -> bool {
        self.segments
            .get(self.current)
            .map(|s| s.is_resolved())
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Narration prefetch
    // -----------------------------------------------------------------------

    /// Resolve narration for the current segment and the lookahead window
    /// behind it.  Failures degrade to fallback speech instead of erroring.
    fn prefetch(&mut self) {
        if !self.is_initialized || self.segments.is_empty() {
            return;
        }
        let end = (self.current + self.config.playback.lookahead_depth)
            .min(self.segments.len() - 1);

        for index in self.current..=end {
            if self.segments[index].is_resolved() || self.in_flight_prefetch.contains(&index) {
                continue;
            }
            self.in_flight_prefetch.insert(index);

            let request =
                SynthesisRequest::for_segment(&self.segments[index].script, &self.config.synth);
            let segment_id = self.segments[index].script.id.clone();
            let synthesizer = Arc::clone(&self.synthesizer);
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                let narration = match synthesizer.synthesize(&request).await {
                    Ok(narration) => narration,
                    Err(e) => {
                        log::warn!(
                            "session: synthesis failed for segment '{segment_id}' ({e}); \
                             falling back to paced speech"
                        );
                        ResolvedNarration::fallback_speech()
                    }
                };
                let _ = cmd_tx
                    .send(SessionCommand::SegmentResolved { index, narration })
                    .await;
            });
        }
    }

    fn handle_segment_resolved(&mut self, index: usize, narration: ResolvedNarration) {
        self.in_flight_prefetch.remove(&index);
        let Some(segment) = self.segments.get_mut(index) else {
            log::debug!("session: resolved index {index} is out of range, dropped");
            return;
        };

        let segment_id = segment.script.id.clone();
        let provider = narration.provider;
        let has_audio = narration.has_audio();
        segment.narration = Some(narration);
        log::info!("session: segment '{segment_id}' resolved via {}", provider.as_str());

        if has_audio {
            self.events.emit(SessionEvent::AudioElement { segment_id });
        }

        if self.pending_start && index == self.current && self.play_state == PlayState::Playing {
            self.start_current_playback();
        } else {
            self.publish();
        }
    }

    // -----------------------------------------------------------------------
    // Plan lifecycle
    // -----------------------------------------------------------------------

    fn handle_confirm_plan(&mut self) {
        if !self.plan.needs_confirmation {
            log::debug!("session: plan {} is already confirmed", self.plan.id);
            return;
        }
        self.protocol.handle_plan_confirmation(self.plan.clone());
    }

    fn apply_plan_resolution(&mut self, resolution: PlanResolution) {
        if resolution.plan_id != self.plan.id {
            log::debug!(
                "session: resolution for superseded plan {}, discarded",
                resolution.plan_id
            );
            return;
        }

        self.plan = apply_transitions(&self.plan, &resolution.transitions);
        match resolution.phase {
            ResolutionPhase::Heuristic => {
                self.plan = self.plan.with_confirmation_cleared();
                log::info!("session: plan {} confirmed", self.plan.id);
            }
            ResolutionPhase::Reviewed => {
                // A generate_script step the reviewer left untouched counts
                // as done once the review passes.
                let bump = self.plan.step_of_type(StepType::GenerateScript).and_then(|step| {
                    let untouched = !resolution.transitions.iter().any(|t| t.step_id == step.id);
                    (untouched && step.status == StepStatus::InProgress).then(|| step.id.clone())
                });
                if let Some(step_id) = bump {
                    self.plan = self.plan.with_step_status(
                        &step_id,
                        StepStatus::Complete,
                        StepPatch::default(),
                    );
                }
                if let Some(note) = resolution.summary_note.as_deref() {
                    self.plan = self.plan.with_summary_note(note);
                }
                log::info!("session: review refinements applied to plan {}", self.plan.id);
            }
        }
        self.publish();
    }

    fn apply_step_feedback(&mut self, feedback: StepFeedback) {
        let Some(step) = self.plan.step(&feedback.step_id) else {
            log::debug!("session: feedback for unknown step {}, dropped", feedback.step_id);
            return;
        };
        if step.status != StepStatus::AwaitingFeedback {
            log::debug!(
                "session: step '{}' is not awaiting feedback, decision dropped",
                step.title
            );
            return;
        }

        let status = if feedback.approved {
            StepStatus::Complete
        } else {
            StepStatus::NeedsRevision
        };
        let patch = StepPatch {
            details: feedback.notes.clone().or_else(|| feedback.reason.clone()),
            data: feedback.adjustments.clone(),
        };
        self.plan = self.plan.with_step_status(&feedback.step_id, status, patch);
        self.publish();
    }

    fn handle_complete_wrap_up(&mut self) {
        let Some(step_id) = self
            .plan
            .step_of_type(StepType::WrapUp)
            .map(|s| s.id.clone())
        else {
            log::debug!("session: plan has no wrap-up step");
            return;
        };
        self.plan =
            self.plan
                .with_step_status(&step_id, StepStatus::Complete, StepPatch::default());
        log::info!("session: wrap-up complete");
        self.publish();
    }

    fn handle_revise_plan(&mut self, feedback: Option<String>) {
        let options = PlanOptions {
            revision_of: Some(self.plan.id.clone()),
            feedback,
        };
        let mut plan = SessionPlan::from_context(&self.context, options);
        if self.is_initialized {
            let scripts: Vec<ScriptSegment> =
                self.segments.iter().map(|s| s.script.clone()).collect();
            plan = plan.materialize_segments(&scripts);
        }
        log::info!("session: plan {} supersedes {}", plan.id, self.plan.id);
        self.plan = plan;
        self.events
            .emit(SessionEvent::PlanConfirmationNeeded(self.plan.clone()));
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Shutdown and observability
    // -----------------------------------------------------------------------

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.interrupt_playback();
        self.play_state = PlayState::Stopped;
        // Release audio handles; the segment list itself stays readable.
        for segment in &mut self.segments {
            if let Some(narration) = segment.narration.as_mut() {
                narration.audio = None;
            }
        }
        log::info!("session: disposed");
        self.publish();
    }

    fn set_error(&mut self, message: &str) {
        log::warn!("session: {message}");
        self.error = Some(message.to_string());
        self.publish();
    }

    /// Recompute the snapshot, store it and broadcast the change.
    fn publish(&self) {
        let snapshot = self.snapshot();
        *self.shared.lock().unwrap() = snapshot.clone();
        self.events.emit(SessionEvent::StateChange(snapshot));
    }

    fn snapshot(&self) -> SessionState {
        let buffered_ahead = self
            .segments
            .iter()
            .enumerate()
            .filter(|(i, s)| *i > self.current && s.is_resolved())
            .count();

        SessionState {
            play_state: self.play_state,
            current_segment_index: self.current,
            current_segment_id: self.segments.get(self.current).map(|s| s.script.id.clone()),
            total_segments: self.segments.len(),
            buffered_ahead,
            is_initialized: self.is_initialized,
            awaiting_plan_confirmation: self.plan.needs_confirmation,
            awaiting_feedback_for_step_id: self
                .plan
                .awaiting_feedback_step()
                .map(|s| s.id.clone()),
            error: self.error.clone(),
            segments: self
                .segments
                .iter()
                .map(|s| SegmentSnapshot {
                    id: s.script.id.clone(),
                    step_id: s.step_id.clone(),
                    resolved: s.is_resolved(),
                    provider: s.narration.as_ref().map(|n| n.provider),
                })
                .collect(),
            plan: Some(self.plan.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::narration::{MockNarrationOutput, MockSynthesizer, NarrationProvider, PacedSpeechOutput};
    use crate::review::{MockReviewer, PlanReview, StepReview, StepTransition};
    use crate::script::MockScriptProvider;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.playback.settle_delay_ms = 10;
        config.playback.lookahead_depth = 2;
        config
    }

    fn context() -> SessionContext {
        SessionContext::new("focus", "sage")
    }

    fn script(n: usize, approx_sec: f32) -> SessionScript {
        SessionScript {
            title: "test script".into(),
            segments: (1..=n)
                .map(|i| {
                    ScriptSegment::new(format!("seg-{i}"), format!("Text {i}"))
                        .with_approx_sec(approx_sec)
                })
                .collect(),
            ..Default::default()
        }
    }

    struct Backends {
        script: Arc<MockScriptProvider>,
        synthesizer: Arc<MockSynthesizer>,
        reviewer: Arc<MockReviewer>,
    }

    impl Backends {
        fn quiet(n_segments: usize, approx_sec: f32) -> Self {
            Self {
                script: Arc::new(MockScriptProvider::ok(script(n_segments, approx_sec))),
                synthesizer: Arc::new(MockSynthesizer::ok()),
                reviewer: Arc::new(MockReviewer::failing()),
            }
        }

        fn providers(&self, output: Arc<dyn NarrationOutput>) -> SessionProviders {
            SessionProviders {
                script: Arc::clone(&self.script) as Arc<dyn ScriptProvider>,
                synthesizer: Arc::clone(&self.synthesizer) as Arc<dyn NarrationSynthesizer>,
                reviewer: Arc::clone(&self.reviewer) as Arc<dyn PlanReviewer>,
                output,
            }
        }
    }

    async fn wait_until(
        handle: &SessionHandle,
        what: &str,
        predicate: impl Fn(&SessionState) -> bool,
    ) -> SessionState {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let state = handle.state();
            if predicate(&state) {
                return state;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {what}; last state: {state:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn expect_event(
        rx: &mut broadcast::Receiver<SessionEvent>,
        kind: &str,
    ) -> SessionEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind() == kind => return event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event channel closed: {e}"),
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for '{kind}' event"))
    }

    fn step_status(state: &SessionState, step_id: &str) -> Option<StepStatus> {
        state
            .plan
            .as_ref()
            .and_then(|p| p.step(step_id))
            .map(|s| s.status)
    }

    // ---- initialization ---

    #[tokio::test]
    async fn init_materializes_script_into_segments() {
        let backends = Backends::quiet(3, 0.05);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        assert_eq!(state.total_segments, 3);
        assert_eq!(state.current_segment_id.as_deref(), Some("seg-1"));
        assert!(state.awaiting_plan_confirmation);
        assert_eq!(state.plan.as_ref().map(|p| p.play_step_count()), Some(3));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn init_survives_script_provider_failure() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::failing()),
            synthesizer: Arc::new(MockSynthesizer::ok()),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        // The fallback chain produced a canned script for the intent.
        assert!(state.total_segments > 0);
        assert_eq!(state.current_segment_id.as_deref(), Some("canned-1"));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn play_before_initialization_sets_an_error() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::blocked()),
            synthesizer: Arc::new(MockSynthesizer::ok()),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        handle.play().await;
        let state = wait_until(&handle, "error", |s| s.error.is_some()).await;
        assert!(state.error.unwrap_or_default().contains("no segments"));
        assert_eq!(state.play_state, PlayState::Stopped);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn explicit_play_on_unresolved_segment_sets_an_error() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::ok(script(2, 0.05))),
            synthesizer: Arc::new(MockSynthesizer::blocked()),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        wait_until(&handle, "initialization", |s| s.is_initialized).await;
        handle.play().await;

        let state = wait_until(&handle, "error", |s| s.error.is_some()).await;
        assert!(state.error.unwrap_or_default().contains("not ready"));
        assert_eq!(state.play_state, PlayState::Stopped);
        handle.dispose().await;
    }

    // ---- playback flow ---

    #[tokio::test]
    async fn play_advances_through_all_segments_and_ends() {
        let backends = Backends::quiet(3, 0.05);
        let output = Arc::new(MockNarrationOutput::new());
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::clone(&output) as Arc<dyn NarrationOutput>),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;

        expect_event(&mut events, "end").await;
        let state = wait_until(&handle, "stop", |s| s.play_state == PlayState::Stopped).await;
        assert_eq!(state.current_segment_index, 2);
        assert_eq!(output.played(), vec!["seg-1", "seg-2", "seg-3"]);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn playback_failure_still_advances() {
        let backends = Backends::quiet(2, 0.05);
        let output = Arc::new(MockNarrationOutput::failing_for(&["seg-1"]));
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::clone(&output) as Arc<dyn NarrationOutput>),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;

        expect_event(&mut events, "end").await;
        assert_eq!(output.played(), vec!["seg-1", "seg-2"]);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn next_advances_one_segment_while_playing() {
        let backends = Backends::quiet(3, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        wait_until(&handle, "playing", |s| s.play_state == PlayState::Playing).await;

        handle.next().await;
        let state = wait_until(&handle, "advance", |s| s.current_segment_index == 1).await;
        assert_eq!(state.play_state, PlayState::Playing);
        assert_eq!(state.current_segment_id.as_deref(), Some("seg-2"));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn next_at_the_last_segment_ends_the_session() {
        let backends = Backends::quiet(1, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "initialization", |s| s.is_initialized).await;
        handle.next().await;

        expect_event(&mut events, "end").await;
        let state = handle.state();
        assert_eq!(state.play_state, PlayState::Stopped);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn prev_clamps_at_the_first_segment() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        wait_until(&handle, "initialization", |s| s.is_initialized).await;
        handle.prev().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = handle.state();
        assert_eq!(state.current_segment_index, 0);
        assert!(state.error.is_none());
        handle.dispose().await;
    }

    #[tokio::test]
    async fn pause_then_resume_keeps_the_same_segment() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        expect_event(&mut events, "play").await;

        handle.pause().await;
        expect_event(&mut events, "pause").await;
        let state = wait_until(&handle, "paused", |s| s.play_state == PlayState::Paused).await;
        assert_eq!(state.current_segment_index, 0);

        handle.play().await;
        expect_event(&mut events, "play").await;
        let state = wait_until(&handle, "playing", |s| s.play_state == PlayState::Playing).await;
        assert_eq!(state.current_segment_index, 0);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn play_while_playing_is_a_noop() {
        let backends = Backends::quiet(1, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        wait_until(&handle, "playing", |s| s.play_state == PlayState::Playing).await;
        handle.play().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut play_events = 0;
        while let Ok(event) = events.try_recv() {
            if event.kind() == "play" {
                play_events += 1;
            }
        }
        assert_eq!(play_events, 1);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn auto_advance_waits_for_an_unresolved_segment() {
        let mut config = test_config();
        config.playback.lookahead_depth = 0;
        let backends = Backends {
            script: Arc::new(MockScriptProvider::ok(script(2, 0.05))),
            synthesizer: Arc::new(MockSynthesizer::blocked_for(&["Text 2"])),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            config,
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;

        // Auto-advance lands on seg-2 and then has to wait for narration
        // that will never arrive.
        let state = wait_until(&handle, "buffering", |s| s.current_segment_index == 1).await;
        assert_eq!(state.play_state, PlayState::Playing);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let state = handle.state();
        assert_eq!(state.current_segment_index, 1);
        assert!(!state.segments[1].resolved);
        assert_eq!(state.play_state, PlayState::Playing);
        handle.dispose().await;
    }

    // ---- narration resolution ---

    #[tokio::test]
    async fn synthesis_failure_degrades_to_fallback_speech() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::ok(script(3, 0.05))),
            synthesizer: Arc::new(MockSynthesizer::failing_for(&["Text 2"])),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        let state = wait_until(&handle, "all segments resolved", |s| {
            s.is_initialized && s.segments.iter().all(|seg| seg.resolved)
        })
        .await;

        assert_eq!(state.segments[0].provider, Some(NarrationProvider::Synth));
        assert_eq!(
            state.segments[1].provider,
            Some(NarrationProvider::FallbackSpeech)
        );
        assert_eq!(state.segments[2].provider, Some(NarrationProvider::Synth));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn synthesized_audio_emits_an_audio_element_event() {
        let backends = Backends::quiet(1, 0.05);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );
        let mut events = handle.subscribe();

        let event = expect_event(&mut events, "audio-element").await;
        match event {
            SessionEvent::AudioElement { segment_id } => assert_eq!(segment_id, "seg-1"),
            other => panic!("unexpected event: {other:?}"),
        }
        handle.dispose().await;
    }

    #[tokio::test]
    async fn buffered_ahead_counts_resolved_upcoming_segments() {
        let backends = Backends::quiet(3, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        // Lookahead 2 resolves seg-2 and seg-3 behind the current one.
        let state = wait_until(&handle, "lookahead resolved", |s| s.buffered_ahead == 2).await;
        assert_eq!(state.current_segment_index, 0);
        handle.dispose().await;
    }

    // ---- plan confirmation and review ---

    #[tokio::test]
    async fn failed_review_confirms_the_plan_exactly_once() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        wait_until(&handle, "initialization", |s| s.is_initialized).await;
        handle.confirm_plan().await;

        let state = wait_until(&handle, "confirmation", |s| !s.awaiting_plan_confirmation).await;
        let plan = state.plan.expect("plan must be present");
        let gather = plan.step_of_type(StepType::GatherContext).unwrap();
        let generate = plan.step_of_type(StepType::GenerateScript).unwrap();
        assert_eq!(gather.status, StepStatus::Complete);
        assert_eq!(generate.status, StepStatus::InProgress);

        // The reviewer failed; nothing else may change.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let plan = handle.state().plan.expect("plan must be present");
        let generate = plan.step_of_type(StepType::GenerateScript).unwrap();
        assert_eq!(generate.status, StepStatus::InProgress);
        assert_eq!(backends.reviewer.plan_calls(), 1);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn successful_review_applies_transitions_and_default_bump() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        let plan = state.plan.expect("plan must be present");
        let gather_id = plan.step_of_type(StepType::GatherContext).unwrap().id.clone();
        let generate_id = plan.step_of_type(StepType::GenerateScript).unwrap().id.clone();

        backends.reviewer.push_plan_ok(PlanReview {
            confirm: Some(true),
            plan_notes: Some("well matched to the goal".into()),
            step_transitions: vec![StepTransition {
                step_id: gather_id.clone(),
                status: StepStatus::Complete,
                notes: Some("context looks solid".into()),
                data: None,
            }],
        });
        handle.confirm_plan().await;

        // The untouched generate step gets the default completion bump.
        let state = wait_until(&handle, "review applied", |s| {
            step_status(s, &generate_id) == Some(StepStatus::Complete)
        })
        .await;
        let plan = state.plan.expect("plan must be present");
        assert!(plan.summary.contains("well matched to the goal"));
        assert_eq!(
            plan.step(&gather_id).and_then(|s| s.details.as_deref()),
            Some("context looks solid")
        );
        assert!(!plan.needs_confirmation);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn late_review_for_a_superseded_plan_is_discarded() {
        let backends = Backends::quiet(2, 5.0);
        backends.reviewer.push_plan_ok_delayed(
            PlanReview {
                confirm: Some(true),
                plan_notes: Some("first-review".into()),
                step_transitions: vec![],
            },
            Duration::from_millis(300),
        );
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        let first_plan_id = state.plan.as_ref().map(|p| p.id.clone()).unwrap_or_default();

        handle.confirm_plan().await;
        wait_until(&handle, "heuristic confirmation", |s| !s.awaiting_plan_confirmation).await;

        handle.revise_plan(Some("make it shorter".into())).await;
        let state = wait_until(&handle, "revision", |s| {
            s.plan.as_ref().map(|p| p.id != first_plan_id).unwrap_or(false)
        })
        .await;
        let revised_id = state.plan.as_ref().map(|p| p.id.clone()).unwrap_or_default();

        // Let the delayed review of the superseded plan arrive, then check
        // it changed nothing.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let plan = handle.state().plan.expect("plan must be present");
        assert_eq!(plan.id, revised_id);
        assert!(!plan.summary.contains("first-review"));
        assert!(plan.needs_confirmation);
        assert_eq!(plan.revision_of.as_deref(), Some(first_plan_id.as_str()));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn revision_keeps_segments_but_resets_statuses() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        let first_plan_id = state.plan.as_ref().map(|p| p.id.clone()).unwrap_or_default();

        handle.revise_plan(Some("slower pace please".into())).await;
        let state = wait_until(&handle, "revision", |s| {
            s.plan.as_ref().map(|p| p.id != first_plan_id).unwrap_or(false)
        })
        .await;

        let plan = state.plan.expect("plan must be present");
        assert_eq!(plan.play_step_count(), 2);
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(plan.revision_of.as_deref(), Some(first_plan_id.as_str()));
        assert_eq!(
            plan.metadata.get("revisionNotes").and_then(|v| v.as_str()),
            Some("slower pace please")
        );
        assert_eq!(state.total_segments, 2);
        handle.dispose().await;
    }

    // ---- step feedback ---

    #[tokio::test]
    async fn reviewer_outage_auto_approves_finished_steps() {
        let backends = Backends::quiet(2, 0.05);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;

        let state = wait_until(&handle, "all steps approved", |s| {
            s.plan
                .as_ref()
                .map(|p| p.all_segment_steps_complete())
                .unwrap_or(false)
        })
        .await;

        let plan = state.plan.expect("plan must be present");
        let details = plan
            .step("play-seg-1")
            .and_then(|s| s.details.clone())
            .unwrap_or_default();
        assert!(details.contains("auto-approved"));
        handle.dispose().await;
    }

    #[tokio::test]
    async fn rejected_step_is_marked_needs_revision() {
        let backends = Backends::quiet(1, 0.05);
        backends.reviewer.push_step_ok(StepReview {
            approved: false,
            notes: None,
            reason: Some("pacing felt rushed".into()),
            adjustments: None,
        });
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        expect_event(&mut events, "feedback-required").await;

        let state = wait_until(&handle, "rejection applied", |s| {
            step_status(s, "play-seg-1") == Some(StepStatus::NeedsRevision)
        })
        .await;
        let plan = state.plan.expect("plan must be present");
        assert_eq!(
            plan.step("play-seg-1").and_then(|s| s.details.as_deref()),
            Some("pacing felt rushed")
        );
        handle.dispose().await;
    }

    #[tokio::test]
    async fn caller_feedback_applies_only_while_awaiting() {
        let backends = Backends::quiet(1, 0.05);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );

        wait_until(&handle, "initialization", |s| s.is_initialized).await;
        // Nothing has played: feedback for a pending step is dropped.
        handle
            .submit_step_feedback(StepFeedback::auto_approved("play-seg-1", "caller approval"))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = handle.state();
        assert_eq!(step_status(&state, "play-seg-1"), Some(StepStatus::Pending));
        handle.dispose().await;
    }

    // ---- restart, wrap-up, dispose ---

    #[tokio::test]
    async fn restart_seeks_the_first_incomplete_segment() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::ok(SessionScript {
                title: "mixed".into(),
                segments: vec![
                    ScriptSegment::new("seg-1", "Text 1").with_approx_sec(0.05),
                    ScriptSegment::new("seg-2", "Text 2").with_approx_sec(5.0),
                    ScriptSegment::new("seg-3", "Text 3").with_approx_sec(5.0),
                ],
                ..Default::default()
            })),
            synthesizer: Arc::new(MockSynthesizer::ok()),
            reviewer: Arc::new(MockReviewer::failing()),
        };
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;

        // seg-1 finishes and auto-approves; the session moves into seg-2.
        wait_until(&handle, "first step complete", |s| {
            step_status(s, "play-seg-1") == Some(StepStatus::Complete)
                && s.current_segment_index == 1
        })
        .await;

        handle.pause().await;
        wait_until(&handle, "paused", |s| s.play_state == PlayState::Paused).await;
        handle.prev().await;
        wait_until(&handle, "rewound", |s| s.current_segment_index == 0).await;

        handle.restart().await;
        let state = wait_until(&handle, "restart", |s| s.current_segment_index == 1).await;
        assert_eq!(state.play_state, PlayState::Stopped);
        handle.dispose().await;
    }

    #[tokio::test]
    async fn wrap_up_completion_is_explicit() {
        let backends = Backends::quiet(1, 0.05);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );
        let mut events = handle.subscribe();

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        expect_event(&mut events, "end").await;

        let state = handle.state();
        let plan = state.plan.expect("plan must be present");
        let wrap_up = plan.step_of_type(StepType::WrapUp).unwrap();
        assert_eq!(wrap_up.status, StepStatus::Pending);
        let wrap_up_id = wrap_up.id.clone();

        handle.complete_wrap_up().await;
        wait_until(&handle, "wrap-up", |s| {
            step_status(s, &wrap_up_id) == Some(StepStatus::Complete)
        })
        .await;
        handle.dispose().await;
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_releases_audio() {
        let backends = Backends::quiet(2, 5.0);
        let handle = SessionEngine::spawn(
            context(),
            test_config(),
            backends.providers(Arc::new(PacedSpeechOutput::new())),
        );

        wait_until(&handle, "first segment ready", |s| {
            s.segments.first().map(|seg| seg.resolved).unwrap_or(false)
        })
        .await;
        handle.play().await;
        wait_until(&handle, "playing", |s| s.play_state == PlayState::Playing).await;

        handle.dispose().await;
        let state = wait_until(&handle, "disposal", |s| s.play_state == PlayState::Stopped).await;
        // Segments stay listed but their audio handles are gone.
        assert!(!state.segments.is_empty());

        // A second dispose lands on a closed channel and is dropped quietly.
        handle.dispose().await;
        assert_eq!(handle.state().play_state, PlayState::Stopped);
    }

    // ---- end to end ---

    #[tokio::test]
    async fn full_session_for_a_sage_seeking_focus() {
        let backends = Backends {
            script: Arc::new(MockScriptProvider::ok(script(2, 0.05))),
            synthesizer: Arc::new(MockSynthesizer::ok()),
            reviewer: Arc::new(MockReviewer::approving()),
        };
        let handle = SessionEngine::spawn(
            SessionContext::new("focus", "sage"),
            test_config(),
            backends.providers(Arc::new(MockNarrationOutput::new())),
        );
        let mut events = handle.subscribe();

        let state = wait_until(&handle, "initialization", |s| s.is_initialized).await;
        assert_eq!(
            state.plan.as_ref().map(|p| p.intent),
            Some(crate::plan::PlanIntent::Focus)
        );

        handle.confirm_plan().await;
        wait_until(&handle, "confirmation", |s| !s.awaiting_plan_confirmation).await;

        handle.play().await;
        expect_event(&mut events, "end").await;

        let state = wait_until(&handle, "all steps settled", |s| {
            s.plan
                .as_ref()
                .map(|p| {
                    p.all_segment_steps_complete()
                        && p.step_of_type(StepType::GenerateScript)
                            .map(|step| step.status == StepStatus::Complete)
                            .unwrap_or(false)
                })
                .unwrap_or(false)
        })
        .await;

        let plan = state.plan.expect("plan must be present");
        assert_eq!(
            plan.step_of_type(StepType::GatherContext).map(|s| s.status),
            Some(StepStatus::Complete)
        );
        assert_eq!(
            plan.step_of_type(StepType::WrapUp).map(|s| s.status),
            Some(StepStatus::Pending)
        );

        handle.complete_wrap_up().await;
        wait_until(&handle, "wrap-up", |s| {
            s.plan
                .as_ref()
                .and_then(|p| p.step_of_type(StepType::WrapUp))
                .map(|step| step.status == StepStatus::Complete)
                .unwrap_or(false)
        })
        .await;
        handle.dispose().await;
    }
}
