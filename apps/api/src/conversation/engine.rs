//! The turn-taking loop of a live interview.
//!
//! One `Conversation` is owned by one task and fed events one at a time, so
//! it needs no locks. Capture and synthesis are fire-and-forget commands
//! whose outcomes come back later as events tagged with the capture or
//! segment id they belong to; anything tagged with an id that is no longer
//! active is dropped.
//!
//! A completion call is the one slow step. `on_capture` hands it back as a
//! [`PendingTurn`] instead of awaiting it, so the owner can keep handling
//! client input (`finish`, a closed socket) while the model answers, and
//! applies the result with [`Conversation::complete_turn`].

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::capabilities::{
    CaptureError, CaptureEvent, CaptureEventKind, CaptureId, CompletionEndpoint, SegmentId,
    SpeechCapture, SpeechSynthesis, TranscriptStore, TurnRequest, Utterance, VoiceProfile,
};
use crate::conversation::segment::{clean_for_speech, segments};
use crate::conversation::state::TurnState;
use crate::evaluation::Evaluation;
use crate::interview::policy::ReplyPolicy;
use crate::interview::reply::{next_reply, recent_turns, ShapedReply};
use crate::models::interview::{Message, Sender};

pub const SAVE_WARNING: &str = "Warning: Could not save progress.";
pub const FINALIZE_ERROR: &str = "Could not finalize your interview. Please try again.";
pub const MIC_START_ERROR: &str = "Could not start microphone.";
pub const REPLY_ERROR: &str = "Sorry, I ran into a problem. Please try again.";

/// Per-session inputs.
pub struct SessionSetup {
    pub session_id: Uuid,
    pub resume_text: String,
    pub transcript: Vec<Message>,
    /// Prior exchanges sent with each completion call.
    pub history_turns: usize,
    pub voice: VoiceProfile,
    /// Start listening again as soon as the interviewer finishes speaking.
    pub auto_listen: bool,
}

/// Owned collaborators of one conversation.
pub struct Services {
    pub capture: Box<dyn SpeechCapture>,
    pub synthesis: Box<dyn SpeechSynthesis>,
    pub completion: Arc<dyn CompletionEndpoint>,
    pub store: Arc<dyn TranscriptStore>,
    pub policy: Arc<dyn ReplyPolicy>,
}

/// A completion request detached from the conversation.
pub struct PendingTurn {
    utterance: String,
    resume_text: Arc<str>,
    history: Vec<Message>,
    completion: Arc<dyn CompletionEndpoint>,
    policy: Arc<dyn ReplyPolicy>,
}

impl PendingTurn {
    /// Calls the model and shapes its reply. Never fails; see [`next_reply`].
    pub async fn run(self) -> ShapedReply {
        let request = TurnRequest {
            utterance: &self.utterance,
            resume_text: &self.resume_text,
            history: &self.history,
        };
        next_reply(self.completion.as_ref(), self.policy.as_ref(), request).await
    }
}

/// What the conversation reports to its client.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    State(TurnState),
    Interim(String),
    Message(Message),
    Warning(String),
    Error(String),
    Finished(Evaluation),
}

/// Events are sent as `E`, so a transport can share one ordered channel
/// between events and capability commands.
pub struct Conversation<E = ConversationEvent> {
    session_id: Uuid,
    resume_text: Arc<str>,
    transcript: Vec<Message>,
    history_turns: usize,
    voice: VoiceProfile,
    auto_listen: bool,
    services: Services,
    events: mpsc::UnboundedSender<E>,

    state: TurnState,
    next_capture_id: CaptureId,
    active_capture: Option<CaptureId>,
    next_segment_id: SegmentId,
    queue: VecDeque<Utterance>,
    speaking: Option<SegmentId>,
}

impl<E: From<ConversationEvent>> Conversation<E> {
    pub fn new(setup: SessionSetup, services: Services, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            session_id: setup.session_id,
            resume_text: setup.resume_text.into(),
            transcript: setup.transcript,
            history_turns: setup.history_turns,
            voice: setup.voice,
            auto_listen: setup.auto_listen,
            services,
            events,
            state: TurnState::Idle,
            next_capture_id: 1,
            active_capture: None,
            next_segment_id: 1,
            queue: VecDeque::new(),
            speaking: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    fn emit(&self, event: ConversationEvent) {
        // A closed receiver means the client is gone; nothing to report to.
        let _ = self.events.send(event.into());
    }

    fn set_state(&mut self, to: TurnState) {
        if self.state == to {
            return;
        }
        debug_assert!(
            self.state.can_transition(to),
            "illegal transition {} -> {}",
            self.state,
            to
        );
        debug!(session = %self.session_id, "state {} -> {}", self.state, to);
        self.state = to;
        self.emit(ConversationEvent::State(to));
    }

    /// Speaks the opening question of a fresh session.
    pub fn speak_opening(&mut self) {
        let fresh = matches!(self.transcript.as_slice(), [only] if only.sender == Sender::Interviewer);
        if fresh && self.state == TurnState::Idle {
            let opening = self.transcript[0].text.clone();
            self.speak(&opening);
        }
    }

    /// User-initiated capture. Only honoured from `idle`.
    pub fn listen(&mut self) {
        if self.state != TurnState::Idle {
            debug!("Ignoring listen in state {}", self.state);
            return;
        }
        self.start_capture();
    }

    fn start_capture(&mut self) {
        let capture_id = self.next_capture_id;
        self.next_capture_id += 1;

        match self.services.capture.start(capture_id) {
            Ok(()) => {
                self.active_capture = Some(capture_id);
                self.set_state(TurnState::Listening);
            }
            Err(e) => {
                warn!(session = %self.session_id, "Capture failed to start: {e}");
                let message = match e {
                    CaptureError::Unsupported => e.user_message(),
                    _ => MIC_START_ERROR.to_string(),
                };
                self.fail(message);
            }
        }
    }

    fn stop_capture(&mut self) {
        if let Some(capture_id) = self.active_capture.take() {
            self.services.capture.stop(capture_id);
        }
    }

    /// Applies a capture event. A non-empty final transcript moves to
    /// `thinking` and returns the turn to run; its reply goes to
    /// [`Conversation::complete_turn`].
    pub fn on_capture(&mut self, event: CaptureEvent) -> Option<PendingTurn> {
        if self.active_capture != Some(event.capture_id) {
            debug!("Ignoring event for stale capture {}", event.capture_id);
            return None;
        }

        match event.kind {
            CaptureEventKind::Interim(text) => self.emit(ConversationEvent::Interim(text)),
            CaptureEventKind::Final(text) => {
                self.stop_capture();
                let text = text.trim();
                if text.is_empty() {
                    self.set_state(TurnState::Idle);
                } else {
                    return Some(self.begin_turn(text.to_string()));
                }
            }
            CaptureEventKind::Error(e) => {
                self.active_capture = None;
                if e.is_benign() {
                    debug!("Benign capture error: {e}");
                    self.set_state(TurnState::Idle);
                } else {
                    self.fail(e.user_message());
                }
            }
            CaptureEventKind::Ended => {
                self.active_capture = None;
                if self.state == TurnState::Listening {
                    self.set_state(TurnState::Idle);
                }
            }
        }
        None
    }

    /// Records the candidate's utterance and builds the completion request.
    fn begin_turn(&mut self, utterance: String) -> PendingTurn {
        self.set_state(TurnState::Thinking);

        let history = recent_turns(&self.transcript, self.history_turns).to_vec();
        let candidate = Message::candidate(utterance.clone());
        self.transcript.push(candidate.clone());
        self.emit(ConversationEvent::Message(candidate));

        PendingTurn {
            utterance,
            resume_text: self.resume_text.clone(),
            history,
            completion: self.services.completion.clone(),
            policy: self.services.policy.clone(),
        }
    }

    /// Stores and speaks the interviewer's reply, then checkpoints. A reply
    /// that arrives after the turn was abandoned (`finish`) is dropped.
    pub async fn complete_turn(&mut self, reply: ShapedReply) {
        if self.state != TurnState::Thinking {
            debug!("Dropping reply that arrived in state {}", self.state);
            return;
        }
        if reply.text.trim().is_empty() {
            self.fail(REPLY_ERROR.to_string());
            return;
        }
        if reply.fallback {
            info!(session = %self.session_id, "Substituted fallback reply");
        }

        let interviewer = Message::interviewer(reply.text);
        self.transcript.push(interviewer.clone());
        self.emit(ConversationEvent::Message(interviewer.clone()));

        self.speak(&interviewer.text);
        self.checkpoint().await;
    }

    async fn checkpoint(&mut self) {
        if let Err(e) = self
            .services
            .store
            .checkpoint(self.session_id, &self.transcript)
            .await
        {
            warn!(session = %self.session_id, "Checkpoint failed: {e}");
            self.emit(ConversationEvent::Warning(SAVE_WARNING.to_string()));
        }
    }

    /// Queues `text` as sentence segments and starts playback.
    fn speak(&mut self, text: &str) {
        let cleaned = clean_for_speech(text);
        for (i, segment) in segments(&cleaned).enumerate() {
            let id = self.next_segment_id;
            self.next_segment_id += 1;
            self.queue.push_back(Utterance {
                id,
                text: segment.to_string(),
                voice: self.voice.clone(),
                pause_before_ms: if i == 0 { 0 } else { self.voice.segment_pause_ms },
            });
        }

        // A reply that cleans down to nothing passes straight through speaking.
        self.set_state(TurnState::Speaking);
        self.speak_next();
    }

    fn speak_next(&mut self) {
        match self.queue.pop_front() {
            Some(utterance) => {
                self.speaking = Some(utterance.id);
                self.services.synthesis.speak(&utterance);
            }
            None => {
                self.speaking = None;
                self.after_speech();
            }
        }
    }

    fn after_speech(&mut self) {
        self.set_state(TurnState::Idle);
        if self.auto_listen {
            self.start_capture();
        }
    }

    pub fn on_segment_finished(&mut self, segment_id: SegmentId) {
        if self.speaking != Some(segment_id) {
            debug!("Ignoring completion of stale segment {segment_id}");
            return;
        }
        self.speak_next();
    }

    fn clear_speech(&mut self) {
        let had_speech = self.speaking.take().is_some() || !self.queue.is_empty();
        self.queue.clear();
        if had_speech {
            self.services.synthesis.cancel();
        }
    }

    /// The candidate interrupts playback: drop everything queued and listen.
    pub fn barge_in(&mut self) {
        if self.state != TurnState::Speaking {
            debug!("Ignoring barge-in in state {}", self.state);
            return;
        }
        self.clear_speech();
        self.start_capture();
    }

    /// Cancels whatever is listening or speaking and goes idle.
    pub fn stop(&mut self) {
        match self.state {
            TurnState::Listening => {
                self.stop_capture();
                self.set_state(TurnState::Idle);
            }
            TurnState::Speaking => {
                self.clear_speech();
                self.set_state(TurnState::Idle);
            }
            _ => debug!("Ignoring stop in state {}", self.state),
        }
    }

    /// Ends the interview and scores it. Returns the evaluation on success.
    pub async fn finish(&mut self) -> Option<Evaluation> {
        if self.state == TurnState::Finishing {
            return None;
        }
        self.clear_speech();
        self.stop_capture();
        self.set_state(TurnState::Finishing);

        match self
            .services
            .store
            .complete(self.session_id, &self.transcript)
            .await
        {
            Ok(evaluation) => {
                info!(
                    session = %self.session_id,
                    "Interview finished with score {}", evaluation.score
                );
                self.emit(ConversationEvent::Finished(evaluation.clone()));
                Some(evaluation)
            }
            Err(e) => {
                warn!(session = %self.session_id, "Finalizing failed: {e}");
                self.fail(FINALIZE_ERROR.to_string());
                None
            }
        }
    }

    /// Leaves the error state.
    pub fn retry(&mut self) {
        if self.state == TurnState::Error {
            self.set_state(TurnState::Idle);
        }
    }

    fn fail(&mut self, message: String) {
        self.clear_speech();
        self.stop_capture();
        self.emit(ConversationEvent::Error(message));
        self.set_state(TurnState::Error);
    }
}
