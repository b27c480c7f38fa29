//! The per-visit state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;
use whosthere_matcher::PassphraseSet;
use whosthere_observe::{SpanMetadata, SpanOutcome, TraceSink};
use whosthere_session::{AttemptOutcome, Session, SessionTracker, TrackerError};
use whosthere_types::{PhraseKey, SessionEvent, SessionStatus, TransitionError, VisitOutcome};
use whosthere_voice::{
    AudioHandle, DoorbellTransport, SpeechSynthesizer, Transcriber, Transcript, VoiceError,
};

use crate::error::FlowError;
use crate::rate_limit::DeviceRateLimiter;
use crate::report::{VisitReason, VisitReport};
use crate::settings::{CaptureFailurePolicy, FlowSettings};
use crate::trace::{ActiveSpan, Tracer};

/// The external systems a visit talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub transport: Arc<dyn DoorbellTransport>,
    pub transcriber: Arc<dyn Transcriber>,
    pub trace: Arc<dyn TraceSink>,
}

/// Runs doorbell visits.
///
/// One instance serves every device; each call to
/// [`handle_doorbell_event`](Self::handle_doorbell_event) is an independent
/// visit sharing only the session tracker and the passphrase set.
pub struct Orchestrator {
    settings: FlowSettings,
    passphrases: Arc<PassphraseSet>,
    tracker: Arc<SessionTracker>,
    speech: Arc<dyn SpeechSynthesizer>,
    transport: Arc<dyn DoorbellTransport>,
    transcriber: Arc<dyn Transcriber>,
    tracer: Tracer,
    limiter: DeviceRateLimiter,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("passphrases", &self.passphrases)
            .finish_non_exhaustive()
    }
}

/// How a visit ended, before farewell playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Granted,
    Denied,
    Expired,
    Errored(VisitReason),
}

impl Ending {
    /// The ending a session already settled in `status` stands for.
    fn settled_as(status: SessionStatus, fallback: Ending) -> Ending {
        match status {
            SessionStatus::Matched => Ending::Granted,
            SessionStatus::Denied => Ending::Denied,
            SessionStatus::Expired => Ending::Expired,
            _ => match fallback {
                Ending::Errored(reason) => Ending::Errored(reason),
                _ => Ending::Errored(VisitReason::TrackerFailure),
            },
        }
    }
}

/// One state of the visit loop.
enum Step {
    /// Play a prompt, then listen.
    Prompt(PhraseKey),
    Capture,
    Transcribe(AudioHandle),
    Score(Transcript),
    /// Branch on the status after an attempt; the phrase is what to say
    /// if another attempt is allowed.
    Decide(Session, PhraseKey),
    Done(Ending),
}

impl Orchestrator {
    pub fn new(
        settings: FlowSettings,
        passphrases: Arc<PassphraseSet>,
        tracker: Arc<SessionTracker>,
        collaborators: Collaborators,
    ) -> Result<Self, FlowError> {
        settings.validate()?;
        Ok(Self {
            limiter: DeviceRateLimiter::new(settings.rate_limit),
            settings,
            passphrases,
            tracker,
            speech: collaborators.speech,
            transport: collaborators.transport,
            transcriber: collaborators.transcriber,
            tracer: Tracer::new(collaborators.trace),
        })
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn passphrases(&self) -> &PassphraseSet {
        &self.passphrases
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Runs one visit for `device_id` to completion.
    ///
    /// Never fails: every problem ends up in the report's outcome and
    /// reason. Expiry returns without waiting for the timeout message.
    pub async fn handle_doorbell_event(&self, device_id: &str) -> VisitReport {
        let started = Instant::now();
        let visit_span = self
            .tracer
            .start("visit", SpanMetadata::for_device(device_id));

        if !self.limiter.check(device_id) {
            tracing::warn!(device_id, "doorbell event rejected by rate limit");
            let report = self.rejected(device_id, VisitReason::RateLimited, started);
            close_visit_span(visit_span, &report);
            return report;
        }

        let session = match self.open_session(device_id) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(device_id, error = %e, "no session for doorbell event");
                self.say_goodbye(
                    SpanMetadata::for_device(device_id),
                    PhraseKey::SystemError,
                )
                .await;
                let report = self.rejected(device_id, VisitReason::SessionUnavailable, started);
                close_visit_span(visit_span, &report);
                return report;
            }
        };

        tracing::info!(
            session_id = %session.session_id,
            device_id,
            max_attempts = session.max_attempts,
            "visit started"
        );

        let mut visit = Visit {
            orchestrator: self,
            session_id: session.session_id,
            device_id,
            deadline: session.deadline(),
            attempts: 0,
            needs_rearm: false,
            free_repeats: 0,
        };
        let ending = visit.run().await;
        let report = visit.conclude(ending, started).await;

        tracing::info!(
            session_id = %visit.session_id,
            device_id,
            outcome = %report.outcome,
            reason = report.reason.map(VisitReason::as_str).unwrap_or("none"),
            attempts = report.attempts,
            duration_ms = report.duration_ms,
            "visit finished"
        );
        close_visit_span(visit_span, &report);
        report
    }

    fn open_session(&self, device_id: &str) -> Result<Session, FlowError> {
        let mut span = self
            .tracer
            .start("session.create", SpanMetadata::for_device(device_id));

        let created = self
            .tracker
            .create(
                device_id,
                self.settings.max_attempts,
                self.settings.session_deadline,
            )
            .and_then(|session| self.tracker.apply(session.session_id, SessionEvent::Arm));

        match created {
            Ok(session) => {
                span.finish(SpanOutcome::Ok);
                Ok(session)
            }
            Err(e) => {
                span.set_detail("session_creation");
                span.finish(SpanOutcome::Error);
                Err(FlowError::SessionCreation(e))
            }
        }
    }

    fn rejected(&self, device_id: &str, reason: VisitReason, started: Instant) -> VisitReport {
        VisitReport {
            outcome: VisitOutcome::Errored,
            session_id: None,
            device_id: device_id.to_string(),
            attempts: 0,
            max_attempts: self.settings.max_attempts,
            last_score: None,
            reason: Some(reason),
            duration_ms: elapsed_ms(started),
        }
    }

    /// Plays a closing phrase, bounded by the call timeout only. Failure
    /// is logged and traced; the outcome is already decided.
    async fn say_goodbye(&self, metadata: SpanMetadata, phrase: PhraseKey) {
        farewell(
            self.speech.clone(),
            self.tracer.clone(),
            metadata,
            phrase,
            self.settings.call_timeout,
        )
        .await;
    }
}

async fn farewell(
    speech: Arc<dyn SpeechSynthesizer>,
    tracer: Tracer,
    metadata: SpanMetadata,
    phrase: PhraseKey,
    call_timeout: Duration,
) {
    let device_id = metadata.device_id.clone();
    let mut span = tracer.start("farewell", metadata);
    span.set_detail(phrase.as_str());

    match tokio::time::timeout(call_timeout, speech.speak(&device_id, phrase)).await {
        Ok(Ok(())) => span.finish(SpanOutcome::Ok),
        Ok(Err(e)) => {
            tracing::warn!(device_id = %device_id, %phrase, error = %e, "closing phrase failed");
            span.finish(SpanOutcome::Error);
        }
        Err(_) => {
            tracing::warn!(device_id = %device_id, %phrase, "closing phrase timed out");
            span.finish(SpanOutcome::Timeout);
        }
    }
}

fn close_visit_span(mut span: ActiveSpan, report: &VisitReport) {
    span.metrics_mut().score = report.last_score;
    if let Some(reason) = report.reason {
        span.set_detail(reason.as_str());
    }
    let outcome = match report.outcome {
        VisitOutcome::Granted | VisitOutcome::Denied => SpanOutcome::Ok,
        VisitOutcome::Expired => SpanOutcome::Expired,
        VisitOutcome::Errored => SpanOutcome::Error,
    };
    span.finish(outcome);
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn span_outcome(error: &FlowError) -> SpanOutcome {
    match error {
        FlowError::SessionExpired(_) => SpanOutcome::Expired,
        FlowError::CollaboratorTimeout { .. } => SpanOutcome::Timeout,
        _ => SpanOutcome::Error,
    }
}

/// State of one running visit.
struct Visit<'a> {
    orchestrator: &'a Orchestrator,
    session_id: Uuid,
    device_id: &'a str,
    deadline: Instant,
    /// Mirror of the session's attempt count, for span metadata.
    attempts: u32,
    /// The session is `retrying` and must be re-armed before listening.
    needs_rearm: bool,
    free_repeats: u32,
}

impl Visit<'_> {
    async fn run(&mut self) -> Ending {
        let mut step = Step::Prompt(PhraseKey::Challenge);
        loop {
            step = match step {
                Step::Done(ending) => return ending,
                // The attempt is already recorded; its status stands.
                Step::Decide(session, retry_phrase) if session.is_terminal() => {
                    self.decide(&session, retry_phrase)
                }
                _ if self.deadline_passed() => return Ending::Expired,
                Step::Prompt(phrase) => self.prompt(phrase).await,
                Step::Capture => self.capture().await,
                Step::Transcribe(audio) => self.transcribe(audio).await,
                Step::Score(transcript) => self.score(&transcript),
                Step::Decide(session, retry_phrase) => self.decide(&session, retry_phrase),
            };
        }
    }

    fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn metadata(&self) -> SpanMetadata {
        SpanMetadata::for_device(self.device_id)
            .with_session(self.session_id)
            .with_attempt(self.attempts + 1)
    }

    fn span(&self, name: &'static str) -> ActiveSpan {
        self.orchestrator.tracer.start(name, self.metadata())
    }

    /// Awaits a collaborator call bounded by the call timeout and the
    /// session deadline, whichever comes first.
    async fn call<T>(
        &self,
        step: &'static str,
        call: impl Future<Output = Result<T, VoiceError>>,
    ) -> Result<T, FlowError> {
        let started = Instant::now();
        let remaining = self.deadline.saturating_duration_since(started);
        if remaining.is_zero() {
            return Err(FlowError::SessionExpired(self.session_id));
        }
        let call_timeout = self.orchestrator.settings.call_timeout;
        let budget = remaining.min(call_timeout);

        match tokio::time::timeout(budget, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(VoiceError::NoAudio)) => Err(FlowError::NoAudio),
            Ok(Err(e)) if e.is_timeout() => Err(FlowError::CollaboratorTimeout {
                step,
                after_ms: elapsed_ms(started),
            }),
            Ok(Err(e)) => Err(FlowError::CollaboratorUnavailable {
                step,
                message: e.to_string(),
            }),
            Err(_) if remaining <= call_timeout => Err(FlowError::SessionExpired(self.session_id)),
            Err(_) => Err(FlowError::CollaboratorTimeout {
                step,
                after_ms: elapsed_ms(started),
            }),
        }
    }

    async fn prompt(&mut self, phrase: PhraseKey) -> Step {
        let mut span = self.span("prompt");
        span.set_detail(phrase.as_str());

        let speech = self.orchestrator.speech.clone();
        match self.call("prompt", speech.speak(self.device_id, phrase)).await {
            Ok(()) => {
                span.finish(SpanOutcome::Ok);
                match phrase {
                    PhraseKey::WrongPassword => Step::Prompt(PhraseKey::RetryPrompt),
                    _ => Step::Capture,
                }
            }
            Err(FlowError::SessionExpired(_)) => {
                span.finish(SpanOutcome::Expired);
                Step::Done(Ending::Expired)
            }
            Err(e) => {
                span.finish(span_outcome(&e));
                tracing::warn!(
                    session_id = %self.session_id,
                    device_id = self.device_id,
                    %phrase,
                    error = %e,
                    "prompt playback failed"
                );
                Step::Done(Ending::Errored(VisitReason::PromptFailed))
            }
        }
    }

    async fn capture(&mut self) -> Step {
        if self.needs_rearm {
            if let Err(e) = self
                .orchestrator
                .tracker
                .apply(self.session_id, SessionEvent::Rearm)
            {
                return self.tracker_failed(e);
            }
            self.needs_rearm = false;
        }

        let mut span = self.span("capture");
        let transport = self.orchestrator.transport.clone();
        let window = self.orchestrator.settings.recording_window;

        match self.call("capture", transport.record(self.device_id, window)).await {
            Ok(audio) => {
                span.finish(SpanOutcome::Ok);
                Step::Transcribe(audio)
            }
            Err(FlowError::SessionExpired(_)) => {
                span.finish(SpanOutcome::Expired);
                Step::Done(Ending::Expired)
            }
            Err(e) => {
                span.set_detail(e.kind());
                span.finish(span_outcome(&e));
                tracing::info!(
                    session_id = %self.session_id,
                    attempt = self.attempts + 1,
                    error = %e,
                    "no usable answer captured"
                );
                self.wasted(AttemptOutcome::NoAudio)
            }
        }
    }

    async fn transcribe(&mut self, audio: AudioHandle) -> Step {
        let mut span = self.span("transcribe");
        let transcriber = self.orchestrator.transcriber.clone();

        match self.call("transcribe", transcriber.transcribe(&audio)).await {
            Ok(transcript) => {
                span.metrics_mut().transcript_chars = Some(transcript.char_count());
                span.finish(SpanOutcome::Ok);
                Step::Score(transcript)
            }
            Err(FlowError::SessionExpired(_)) => {
                span.finish(SpanOutcome::Expired);
                Step::Done(Ending::Expired)
            }
            Err(e) => {
                span.set_detail(e.kind());
                span.finish(span_outcome(&e));
                tracing::info!(
                    session_id = %self.session_id,
                    attempt = self.attempts + 1,
                    error = %e,
                    "transcription failed"
                );
                self.wasted(AttemptOutcome::TranscriptionFailed)
            }
        }
    }

    fn score(&mut self, transcript: &Transcript) -> Step {
        let settings = &self.orchestrator.settings;
        let result = self
            .orchestrator
            .passphrases
            .check(&transcript.text, settings.threshold);

        // The score is traced before anything acts on it.
        let mut span = self.span("match");
        let metrics = span.metrics_mut();
        metrics.score = Some(result.score);
        metrics.matched_index = result.matched_phrase_index;
        metrics.transcript_chars = Some(transcript.char_count());
        span.finish(SpanOutcome::Ok);

        tracing::info!(
            session_id = %self.session_id,
            attempt = self.attempts + 1,
            score = result.score,
            matched = result.matched,
            "answer scored"
        );

        match self
            .orchestrator
            .tracker
            .record_attempt(self.session_id, AttemptOutcome::Scored(result))
        {
            Ok(session) => Step::Decide(session, PhraseKey::WrongPassword),
            Err(e) => self.tracker_failed(e),
        }
    }

    /// A capture or transcription that produced nothing to score.
    fn wasted(&mut self, outcome: AttemptOutcome) -> Step {
        if let CaptureFailurePolicy::FreeRepeat { max_free_repeats } =
            self.orchestrator.settings.capture_failure_policy
        {
            if self.free_repeats < max_free_repeats {
                self.free_repeats += 1;
                tracing::debug!(
                    session_id = %self.session_id,
                    free_repeats = self.free_repeats,
                    "re-prompting without consuming an attempt"
                );
                return Step::Prompt(PhraseKey::NoInputPrompt);
            }
        }

        match self
            .orchestrator
            .tracker
            .record_attempt(self.session_id, outcome)
        {
            Ok(session) => Step::Decide(session, PhraseKey::NoInputPrompt),
            Err(e) => self.tracker_failed(e),
        }
    }

    fn decide(&mut self, session: &Session, retry_phrase: PhraseKey) -> Step {
        self.attempts = session.attempt_count;

        let mut span = self.orchestrator.tracer.start(
            "decision",
            SpanMetadata::for_device(self.device_id)
                .with_session(self.session_id)
                .with_attempt(session.attempt_count),
        );
        span.metrics_mut().score = session.last_score;
        span.set_detail(session.status.as_str());

        let next = match session.status {
            SessionStatus::Matched => Step::Done(Ending::Granted),
            SessionStatus::Denied => Step::Done(Ending::Denied),
            SessionStatus::Retrying => {
                self.needs_rearm = true;
                Step::Prompt(retry_phrase)
            }
            other => {
                tracing::error!(
                    session_id = %self.session_id,
                    status = %other,
                    "unexpected status after an attempt"
                );
                Step::Done(Ending::Errored(VisitReason::TrackerFailure))
            }
        };
        span.finish(SpanOutcome::Ok);
        next
    }

    /// The tracker refused an update. A session expired underneath us by
    /// the sweeper is an expiry, anything else a failure.
    fn tracker_failed(&self, error: TrackerError) -> Step {
        if let Ok(session) = self.orchestrator.tracker.get(self.session_id) {
            if session.status == SessionStatus::Expired {
                return Step::Done(Ending::Expired);
            }
        }
        tracing::error!(session_id = %self.session_id, error = %error, "tracker update failed");
        Step::Done(Ending::Errored(VisitReason::TrackerFailure))
    }

    async fn conclude(&self, ending: Ending, started: Instant) -> VisitReport {
        // A session that is already terminal keeps its recorded status.
        let ending = match ending {
            Ending::Expired => self
                .settle(SessionEvent::Expire)
                .map_or(ending, |from| Ending::settled_as(from, ending)),
            Ending::Errored(_) => self
                .settle(SessionEvent::Fail)
                .map_or(ending, |from| Ending::settled_as(from, ending)),
            settled => settled,
        };

        let (outcome, reason) = match ending {
            Ending::Granted => {
                self.orchestrator
                    .say_goodbye(self.metadata(), PhraseKey::Success)
                    .await;
                (VisitOutcome::Granted, None)
            }
            Ending::Denied => {
                self.orchestrator
                    .say_goodbye(self.metadata(), PhraseKey::Denied)
                    .await;
                (VisitOutcome::Denied, Some(VisitReason::MaxAttemptsExceeded))
            }
            Ending::Expired => {
                // Best effort; the visit does not wait for it.
                tokio::spawn(farewell(
                    self.orchestrator.speech.clone(),
                    self.orchestrator.tracer.clone(),
                    self.metadata(),
                    PhraseKey::Timeout,
                    self.orchestrator.settings.call_timeout,
                ));
                (VisitOutcome::Expired, Some(VisitReason::DeadlineExceeded))
            }
            Ending::Errored(reason) => {
                self.orchestrator
                    .say_goodbye(self.metadata(), PhraseKey::SystemError)
                    .await;
                (VisitOutcome::Errored, Some(reason))
            }
        };

        let snapshot = self.orchestrator.tracker.get(self.session_id).ok();
        VisitReport {
            outcome,
            session_id: Some(self.session_id),
            device_id: self.device_id.to_string(),
            attempts: snapshot.as_ref().map_or(self.attempts, |s| s.attempt_count),
            max_attempts: self.orchestrator.settings.max_attempts,
            last_score: snapshot.and_then(|s| s.last_score),
            reason,
            duration_ms: elapsed_ms(started),
        }
    }

    /// Moves the session to a terminal status unless it already is in one.
    /// Returns the status it had already settled in, if any.
    fn settle(&self, event: SessionEvent) -> Option<SessionStatus> {
        match self.orchestrator.tracker.apply(self.session_id, event) {
            Ok(session) => {
                tracing::debug!(session_id = %self.session_id, status = %session.status, "session settled");
                None
            }
            Err(TrackerError::Transition(TransitionError::Terminal { from, .. })) => {
                tracing::debug!(session_id = %self.session_id, status = %from, "session already terminal");
                Some(from)
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "could not settle session");
                None
            }
        }
    }
}
