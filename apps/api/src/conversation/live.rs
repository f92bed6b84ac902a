//! WebSocket transport for a live interview.
//!
//! The browser owns the microphone and the speaker; the server owns the
//! turn-taking loop. Capture and synthesis are implemented by [`ClientBridge`],
//! which turns commands into frames for the browser, while browser frames
//! are fed back into the [`Conversation`] as events.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{future::BoxFuture, stream::SplitSink, FutureExt, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::conversation::capabilities::{
    CaptureError, CaptureEvent, CaptureEventKind, CaptureId, SegmentId, SpeechCapture,
    SpeechSynthesis, TranscriptStore, Utterance, VoiceInfo, VoiceProfile,
};
use crate::conversation::engine::{Conversation, ConversationEvent, Services, SessionSetup};
use crate::conversation::state::TurnState;
use crate::errors::AppError;
use crate::evaluation::Evaluation;
use crate::interview::reply::{InterviewerModel, ShapedReply};
use crate::interview::sessions;
use crate::llm_client::LlmClient;
use crate::models::interview::{Message, SessionStatus, SessionWithResume};
use crate::state::AppState;

fn default_true() -> bool {
    true
}

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Hello {
        #[serde(default = "default_true")]
        capture_supported: bool,
        #[serde(default)]
        voices: Vec<VoiceInfo>,
        #[serde(default)]
        auto_listen: bool,
    },
    Listen,
    Transcript {
        capture_id: CaptureId,
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    CaptureError {
        capture_id: CaptureId,
        error: String,
    },
    CaptureEnded {
        capture_id: CaptureId,
    },
    SegmentFinished {
        segment_id: SegmentId,
    },
    BargeIn,
    Stop,
    Finish,
    Retry,
}

/// Frames sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    StartCapture {
        capture_id: CaptureId,
    },
    StopCapture {
        capture_id: CaptureId,
    },
    Speak {
        segment_id: SegmentId,
        text: String,
        voice: Option<String>,
        lang: String,
        rate: f32,
        pitch: f32,
        pause_before_ms: u32,
    },
    CancelSpeech,
    State {
        state: TurnState,
    },
    Interim {
        text: String,
    },
    Message {
        message: Message,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
    Finished {
        score: u8,
        feedback: String,
    },
}

impl From<ConversationEvent> for ServerFrame {
    fn from(event: ConversationEvent) -> Self {
        match event {
            ConversationEvent::State(state) => ServerFrame::State { state },
            ConversationEvent::Interim(text) => ServerFrame::Interim { text },
            ConversationEvent::Message(message) => ServerFrame::Message { message },
            ConversationEvent::Warning(message) => ServerFrame::Warning { message },
            ConversationEvent::Error(message) => ServerFrame::Error { message },
            ConversationEvent::Finished(Evaluation { score, feedback }) => {
                ServerFrame::Finished { score, feedback }
            }
        }
    }
}

impl From<&Utterance> for ServerFrame {
    fn from(u: &Utterance) -> Self {
        ServerFrame::Speak {
            segment_id: u.id,
            text: u.text.clone(),
            voice: u.voice.voice_name.clone(),
            lang: u.voice.lang.clone(),
            rate: u.voice.rate,
            pitch: u.voice.pitch,
            pause_before_ms: u.pause_before_ms,
        }
    }
}

/// Capture and synthesis as commands to the connected browser.
#[derive(Clone)]
pub struct ClientBridge {
    frames: mpsc::UnboundedSender<ServerFrame>,
    capture_supported: bool,
}

impl ClientBridge {
    pub fn new(frames: mpsc::UnboundedSender<ServerFrame>, capture_supported: bool) -> Self {
        Self {
            frames,
            capture_supported,
        }
    }

    fn send(&self, frame: ServerFrame) -> bool {
        self.frames.send(frame).is_ok()
    }
}

impl SpeechCapture for ClientBridge {
    fn start(&mut self, capture_id: CaptureId) -> Result<(), CaptureError> {
        if !self.capture_supported {
            return Err(CaptureError::Unsupported);
        }
        if self.send(ServerFrame::StartCapture { capture_id }) {
            Ok(())
        } else {
            Err(CaptureError::Other("client disconnected".to_string()))
        }
    }

    fn stop(&mut self, capture_id: CaptureId) {
        self.send(ServerFrame::StopCapture { capture_id });
    }
}

impl SpeechSynthesis for ClientBridge {
    fn speak(&mut self, utterance: &Utterance) {
        self.send(ServerFrame::from(utterance));
    }

    fn cancel(&mut self) {
        self.send(ServerFrame::CancelSpeech);
    }
}

/// Postgres-backed transcript store scoped to the connected user.
pub struct SessionStore {
    db: PgPool,
    llm: LlmClient,
    user_id: Uuid,
}

#[async_trait]
impl TranscriptStore for SessionStore {
    async fn checkpoint(&self, session_id: Uuid, transcript: &[Message]) -> Result<(), AppError> {
        sessions::checkpoint(&self.db, session_id, self.user_id, transcript).await
    }

    async fn complete(
        &self,
        session_id: Uuid,
        transcript: &[Message],
    ) -> Result<Evaluation, AppError> {
        sessions::checkpoint(&self.db, session_id, self.user_id, transcript).await?;
        let (_, evaluation) =
            sessions::complete_session(&self.db, &self.llm, session_id, self.user_id).await?;
        Ok(evaluation)
    }
}

struct Hello {
    capture_supported: bool,
    voices: Vec<VoiceInfo>,
    auto_listen: bool,
}

/// GET /api/v1/interviews/:id/live
pub async fn handle_live(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let session = sessions::load_live(&state.db, id, auth.user_id).await?;
    if session.status == SessionStatus::Completed.as_str() {
        return Err(AppError::Conflict(
            "Interview is already completed".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| run_live(socket, state, auth.user_id, session)))
}

fn parse_frame(text: &str) -> Option<ClientFrame> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Ignoring malformed client frame: {e}");
            None
        }
    }
}

async fn next_frame<S>(stream: &mut S) -> Option<ClientFrame>
where
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                if let Some(frame) = parse_frame(&text) {
                    return Some(frame);
                }
            }
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket read failed: {e}");
                return None;
            }
        }
    }
    None
}

async fn wait_for_hello<S>(stream: &mut S) -> Option<Hello>
where
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    loop {
        match next_frame(stream).await? {
            ClientFrame::Hello {
                capture_supported,
                voices,
                auto_listen,
            } => {
                return Some(Hello {
                    capture_supported,
                    voices,
                    auto_listen,
                })
            }
            other => debug!("Ignoring {other:?} before hello"),
        }
    }
}

async fn send_frame(sink: &mut SplitSink<WebSocket, WsMessage>, frame: &ServerFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode frame: {e}");
            return true;
        }
    };
    sink.send(WsMessage::Text(text)).await.is_ok()
}

/// Forwards frames to the browser in the order they were produced until the
/// channel closes or the interview is finished.
async fn write_frames(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut frames: mpsc::UnboundedReceiver<ServerFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let finished = matches!(frame, ServerFrame::Finished { .. });
        if !send_frame(&mut sink, &frame).await || finished {
            break;
        }
    }
    let _ = sink.close().await;
}

enum Input {
    Frame(Option<ClientFrame>),
    Reply(ShapedReply),
}

/// Feeds client frames into the conversation until the socket closes or the
/// interview is finished. A model call in flight is polled alongside the
/// socket; `finish` or a close abandons it.
async fn drive<E, S>(conversation: &mut Conversation<E>, stream: &mut S)
where
    E: From<ConversationEvent>,
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let mut pending: Option<BoxFuture<'static, ShapedReply>> = None;

    loop {
        let input = match pending.as_mut() {
            Some(turn) => tokio::select! {
                reply = turn => Input::Reply(reply),
                frame = next_frame(stream) => Input::Frame(frame),
            },
            None => Input::Frame(next_frame(stream).await),
        };

        let frame = match input {
            Input::Reply(reply) => {
                pending = None;
                conversation.complete_turn(reply).await;
                continue;
            }
            Input::Frame(Some(frame)) => frame,
            Input::Frame(None) => break,
        };

        match frame {
            ClientFrame::Hello { .. } => debug!("Ignoring repeated hello"),
            ClientFrame::Listen => conversation.listen(),
            ClientFrame::Transcript {
                capture_id,
                text,
                is_final,
            } => {
                let kind = if is_final {
                    CaptureEventKind::Final(text)
                } else {
                    CaptureEventKind::Interim(text)
                };
                if let Some(turn) = conversation.on_capture(CaptureEvent { capture_id, kind }) {
                    pending = Some(turn.run().boxed());
                }
            }
            ClientFrame::CaptureError { capture_id, error } => {
                conversation.on_capture(CaptureEvent {
                    capture_id,
                    kind: CaptureEventKind::Error(CaptureError::from_browser(&error)),
                });
            }
            ClientFrame::CaptureEnded { capture_id } => {
                conversation.on_capture(CaptureEvent {
                    capture_id,
                    kind: CaptureEventKind::Ended,
                });
            }
            ClientFrame::SegmentFinished { segment_id } => {
                conversation.on_segment_finished(segment_id)
            }
            ClientFrame::BargeIn => conversation.barge_in(),
            ClientFrame::Stop => conversation.stop(),
            ClientFrame::Retry => conversation.retry(),
            ClientFrame::Finish => {
                if pending.take().is_some() {
                    info!("Finish requested while a reply was pending; dropping it");
                }
                if conversation.finish().await.is_some() {
                    break;
                }
            }
        }
    }
}

async fn run_live(socket: WebSocket, state: AppState, user_id: Uuid, session: SessionWithResume) {
    let session_id = session.id;
    let (sink, mut stream) = socket.split();

    let Some(hello) = wait_for_hello(&mut stream).await else {
        debug!("Live session {session_id} closed before hello");
        return;
    };
    info!(
        "Live interview {session_id} started (capture supported: {}, auto listen: {})",
        hello.capture_supported, hello.auto_listen
    );

    // Commands and events share one channel so the browser sees them in order.
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(sink, frames_rx));

    let bridge = ClientBridge::new(frames_tx.clone(), hello.capture_supported);
    let mut conversation = Conversation::new(
        SessionSetup {
            session_id,
            resume_text: session.resume_text,
            transcript: session.messages.0,
            history_turns: state.config.history_turns,
            voice: VoiceProfile::for_voices(&hello.voices),
            auto_listen: hello.auto_listen,
        },
        Services {
            capture: Box::new(bridge.clone()),
            synthesis: Box::new(bridge),
            completion: Arc::new(InterviewerModel::new(state.llm.clone())),
            store: Arc::new(SessionStore {
                db: state.db.clone(),
                llm: state.llm.clone(),
                user_id,
            }),
            policy: state.policy.clone(),
        },
        frames_tx,
    );

    conversation.speak_opening();
    drive(&mut conversation, &mut stream).await;

    info!(
        "Live interview {session_id} ended in state {} with {} messages",
        conversation.state(),
        conversation.transcript().len()
    );
    drop(conversation);
    if let Err(e) = writer.await {
        warn!("Live writer task failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::capabilities::{CompletionEndpoint, TurnRequest};
    use crate::interview::policy::SingleQuestionPolicy;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A model that answers immediately, or never when `reply` is `None`.
    struct Model {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl CompletionEndpoint for Model {
        async fn complete(&self, _: TurnRequest<'_>) -> Result<String, AppError> {
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct Store {
        completed: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl TranscriptStore for Store {
        async fn checkpoint(&self, _: Uuid, _: &[Message]) -> Result<(), AppError> {
            Ok(())
        }

        async fn complete(&self, _: Uuid, transcript: &[Message]) -> Result<Evaluation, AppError> {
            self.completed.lock().unwrap().push(transcript.len());
            Ok(Evaluation {
                score: 5,
                feedback: "Cut short.".into(),
            })
        }
    }

    fn live_conversation(
        reply: Option<&'static str>,
        store: Arc<Store>,
    ) -> (
        Conversation<ServerFrame>,
        mpsc::UnboundedReceiver<ServerFrame>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = ClientBridge::new(tx.clone(), true);
        let conversation = Conversation::new(
            SessionSetup {
                session_id: Uuid::new_v4(),
                resume_text: "Backend engineer. Built a Redis caching layer.".into(),
                transcript: Vec::new(),
                history_turns: 6,
                voice: VoiceProfile::default(),
                auto_listen: false,
            },
            Services {
                capture: Box::new(bridge.clone()),
                synthesis: Box::new(bridge),
                completion: Arc::new(Model { reply }),
                store,
                policy: Arc::new(SingleQuestionPolicy),
            },
            tx,
        );
        (conversation, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_hello_defaults() {
        let frame: ClientFrame = serde_json::from_value(json!({"type": "hello"})).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Hello {
                capture_supported: true,
                voices: vec![],
                auto_listen: false
            }
        );
    }

    #[test]
    fn test_client_frames_parse() {
        let frame = parse_frame(
            r#"{"type":"transcript","capture_id":3,"text":"I built a caching layer","is_final":true}"#,
        );
        assert_eq!(
            frame,
            Some(ClientFrame::Transcript {
                capture_id: 3,
                text: "I built a caching layer".into(),
                is_final: true
            })
        );
        assert_eq!(
            parse_frame(r#"{"type":"barge_in"}"#),
            Some(ClientFrame::BargeIn)
        );
        assert_eq!(
            parse_frame(r#"{"type":"segment_finished","segment_id":7}"#),
            Some(ClientFrame::SegmentFinished { segment_id: 7 })
        );
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        assert_eq!(parse_frame("not json"), None);
        assert_eq!(parse_frame(r#"{"type":"dance"}"#), None);
        assert_eq!(parse_frame(r#"{"type":"transcript"}"#), None);
    }

    #[test]
    fn test_server_frames_serialize_tagged() {
        let value = serde_json::to_value(ServerFrame::State {
            state: TurnState::Listening,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "state", "state": "listening"}));

        let value = serde_json::to_value(ServerFrame::from(ConversationEvent::Finished(
            Evaluation {
                score: 7,
                feedback: "Solid.".into(),
            },
        )))
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "finished", "score": 7, "feedback": "Solid."})
        );
        assert_eq!(
            serde_json::to_value(ServerFrame::CancelSpeech).unwrap(),
            json!({"type": "cancel_speech"})
        );
    }

    #[test]
    fn test_bridge_turns_commands_into_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bridge = ClientBridge::new(tx, true);

        assert!(SpeechCapture::start(&mut bridge, 1).is_ok());
        SpeechCapture::stop(&mut bridge, 1);
        bridge.speak(&Utterance {
            id: 4,
            text: "What did you cache?".into(),
            voice: VoiceProfile::default(),
            pause_before_ms: 300,
        });
        bridge.cancel();

        assert_eq!(rx.try_recv().unwrap(), ServerFrame::StartCapture { capture_id: 1 });
        assert_eq!(rx.try_recv().unwrap(), ServerFrame::StopCapture { capture_id: 1 });
        match rx.try_recv().unwrap() {
            ServerFrame::Speak {
                segment_id,
                lang,
                pause_before_ms,
                ..
            } => {
                assert_eq!(segment_id, 4);
                assert_eq!(lang, "en-IN");
                assert_eq!(pause_before_ms, 300);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), ServerFrame::CancelSpeech);
    }

    #[test]
    fn test_bridge_without_capture_support() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bridge = ClientBridge::new(tx, false);
        assert_eq!(
            SpeechCapture::start(&mut bridge, 1),
            Err(CaptureError::Unsupported)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bridge_reports_disconnected_client() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut bridge = ClientBridge::new(tx, true);
        assert!(matches!(
            SpeechCapture::start(&mut bridge, 1),
            Err(CaptureError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_finish_preempts_pending_reply() {
        let store = Arc::new(Store::default());
        let (mut conversation, mut rx) = live_conversation(None, store.clone());
        let (tx, mut stream) = futures::channel::mpsc::unbounded();
        for frame in [
            json!({"type": "listen"}),
            json!({"type": "transcript", "capture_id": 1, "text": "I built a caching layer", "is_final": true}),
            json!({"type": "finish"}),
        ] {
            tx.unbounded_send(Ok(WsMessage::Text(frame.to_string())))
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), drive(&mut conversation, &mut stream))
            .await
            .expect("finish must not wait for the model");

        assert_eq!(conversation.state(), TurnState::Finishing);
        assert_eq!(*store.completed.lock().unwrap(), vec![1]);
        let frames = drain(&mut rx);
        assert!(frames.contains(&ServerFrame::Finished {
            score: 5,
            feedback: "Cut short.".into()
        }));
        assert!(!frames
            .iter()
            .any(|f| matches!(f, ServerFrame::Speak { .. })));
    }

    #[tokio::test]
    async fn test_closed_socket_abandons_pending_reply() {
        let store = Arc::new(Store::default());
        let (mut conversation, _rx) = live_conversation(None, store.clone());
        let (tx, mut stream) = futures::channel::mpsc::unbounded();
        for frame in [
            json!({"type": "listen"}),
            json!({"type": "transcript", "capture_id": 1, "text": "I built a caching layer", "is_final": true}),
        ] {
            tx.unbounded_send(Ok(WsMessage::Text(frame.to_string())))
                .unwrap();
        }
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), drive(&mut conversation, &mut stream))
            .await
            .expect("a closed socket must end the loop");
        assert_eq!(conversation.state(), TurnState::Thinking);
        assert!(store.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commands_and_events_share_one_ordered_channel() {
        let store = Arc::new(Store::default());
        let (mut conversation, mut rx) =
            live_conversation(Some("Nice. What did you cache first?"), store);

        conversation.listen();
        let turn = conversation
            .on_capture(CaptureEvent {
                capture_id: 1,
                kind: CaptureEventKind::Final("I built a caching layer".into()),
            })
            .expect("a final transcript starts a turn");
        conversation.complete_turn(turn.run().await).await;

        let frames = drain(&mut rx);
        let index_of = |wanted: fn(&ServerFrame) -> bool| {
            frames.iter().position(wanted).expect("frame was sent")
        };
        let start = index_of(|f| matches!(f, ServerFrame::StartCapture { capture_id: 1 }));
        let listening = index_of(|f| {
            matches!(f, ServerFrame::State { state: TurnState::Listening })
        });
        let stop = index_of(|f| matches!(f, ServerFrame::StopCapture { capture_id: 1 }));
        let reply = index_of(|f| {
            matches!(f, ServerFrame::Message { message } if message.text == "Nice. What did you cache first?")
        });
        let speaking = index_of(|f| {
            matches!(f, ServerFrame::State { state: TurnState::Speaking })
        });
        let speak = index_of(|f| matches!(f, ServerFrame::Speak { segment_id: 1, .. }));
        assert!(start < listening);
        assert!(listening < stop);
        assert!(stop < reply);
        assert!(reply < speaking);
        assert!(speaking < speak);
    }
}
