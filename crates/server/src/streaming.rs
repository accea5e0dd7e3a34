// crates/server/src/streaming.rs
//! Per-connection state machine for streamed generation.
//!
//! Protocol:
//! 1. Client sends one JSON request carrying a `mode` plus that mode's fields.
//! 2. For `voice_clone`, the server answers `awaiting_audio` and the client
//!    sends the reference audio as one binary frame.
//! 3. Server sends `status: queued` and `status: processing`, both with the job id.
//! 4. Client may send `{"type":"cancel"}` at any time until the outcome.
//! 5. Server sends the WAV as a binary frame followed by `done`, or
//!    `status: cancelled`, or an `error` message; then closes.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use ttsweb_core::catalog::DEFAULT_SPEAKER;
use ttsweb_core::request::DEFAULT_LANGUAGE;
use ttsweb_core::{
    CustomVoiceParams, GenerationMode, GenerationRequest, ValidationError, VoiceCloneParams,
    VoiceDesignCloneParams, VoiceDesignParams,
};
use ttsweb_server_jobs::{JobId, JobStatus};

use crate::orchestrator::Orchestrator;

/// Close code sent when the initial message names an unknown mode.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    AwaitingRequest,
    AwaitingReferenceAudio,
    Dispatched,
    Racing,
    Terminal,
    Closed,
}

/// Messages the server sends as text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    Done {
        job_id: JobId,
    },
    Error {
        error: String,
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
}

impl ServerMessage {
    fn status(status: &str, job_id: Option<JobId>) -> Self {
        Self::Status {
            status: status.to_string(),
            job_id,
        }
    }

    fn error(error: &str, detail: impl Into<String>, job_id: Option<JobId>) -> Self {
        Self::Error {
            error: error.to_string(),
            detail: detail.into(),
            job_id,
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// The initial request. Flat: every mode's fields in one object, with the
/// composite fields falling back to `text`/`language`/`instruct`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamRequest {
    pub mode: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub speaker: Option<String>,
    pub instruct: Option<String>,
    pub ref_text: Option<String>,
    #[serde(default)]
    pub x_vector_only_mode: bool,
    #[serde(default)]
    pub consent_acknowledged: bool,
    pub design_text: Option<String>,
    pub design_language: Option<String>,
    pub design_instruct: Option<String>,
    pub clone_texts: Option<Vec<String>>,
    pub clone_languages: Option<Vec<String>>,
}

impl StreamRequest {
    /// Build the typed request. `reference_audio` is only read in clone mode.
    pub fn into_request(self, mode: GenerationMode, reference_audio: Bytes) -> GenerationRequest {
        match mode {
            GenerationMode::CustomVoice => GenerationRequest::CustomVoice(CustomVoiceParams {
                text: self.text,
                language: self.language,
                speaker: self.speaker.unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
                instruct: self.instruct,
            }),
            GenerationMode::VoiceDesign => GenerationRequest::VoiceDesign(VoiceDesignParams {
                text: self.text,
                language: self.language,
                instruct: self.instruct.unwrap_or_default(),
            }),
            GenerationMode::VoiceClone => GenerationRequest::VoiceClone(VoiceCloneParams {
                text: self.text,
                language: self.language,
                ref_text: self.ref_text,
                x_vector_only_mode: self.x_vector_only_mode,
                instruct: self.instruct,
                consent_acknowledged: self.consent_acknowledged,
                reference_audio,
            }),
            GenerationMode::VoiceDesignClone => {
                GenerationRequest::VoiceDesignClone(VoiceDesignCloneParams {
                    design_text: self.design_text.unwrap_or_else(|| self.text.clone()),
                    design_language: self
                        .design_language
                        .unwrap_or_else(|| self.language.clone()),
                    design_instruct: self
                        .design_instruct
                        .or(self.instruct)
                        .unwrap_or_default(),
                    clone_texts: self.clone_texts.unwrap_or_else(|| vec![self.text]),
                    clone_languages: self.clone_languages.unwrap_or_else(|| vec![self.language]),
                })
            }
        }
    }
}

fn is_cancel(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|v| v.get("type").and_then(|t| t.as_str()) == Some("cancel"))
        .unwrap_or(false)
}

/// Why the cancel listener returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    CancelRequested,
    Disconnected,
    Stopped,
}

/// Read inbound frames until a cancel message, a disconnect or `stop`.
///
/// Stopping drops the pending read, so a cancel that arrives after the
/// generation finished is never observed.
pub async fn listen_for_cancel<R, E>(mut inbound: R, stop: CancellationToken) -> ListenerExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return ListenerExit::Stopped,
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) if is_cancel(text.as_str()) => {
                    return ListenerExit::CancelRequested;
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(message = %text.as_str(), "Ignoring message during generation");
                }
                Some(Ok(Message::Close(_))) | None => return ListenerExit::Disconnected,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return ListenerExit::Disconnected;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// The peer went away; nothing more can be delivered.
#[derive(Debug)]
struct PeerGone;

/// One WebSocket connection, split into its outbound sink and inbound stream.
pub struct StreamingSession<S, R> {
    orchestrator: Arc<Orchestrator>,
    outbound: S,
    inbound: Option<R>,
    state: SessionState,
    close_code: Option<u16>,
}

impl<S, R, E> StreamingSession<S, R>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator>, outbound: S, inbound: R) -> Self {
        Self {
            orchestrator,
            outbound,
            inbound: Some(inbound),
            state: SessionState::Init,
            close_code: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }

    /// Drive the connection to completion. Always ends by closing the socket.
    pub async fn run(mut self) -> SessionState {
        self.transition(SessionState::AwaitingRequest);
        if self.drive().await.is_err() {
            tracing::info!("WebSocket client disconnected");
        }
        self.close().await;
        self.state
    }

    async fn drive(&mut self) -> Result<(), PeerGone> {
        let raw = match self.recv().await? {
            Message::Text(text) => text,
            _ => {
                return self
                    .send_json(&ServerMessage::error(
                        "invalid_request",
                        "Expected a JSON request message",
                        None,
                    ))
                    .await;
            }
        };
        let request: StreamRequest = match serde_json::from_str(raw.as_str()) {
            Ok(request) => request,
            Err(e) => {
                return self
                    .send_json(&ServerMessage::error("invalid_request", e.to_string(), None))
                    .await;
            }
        };
        let mode: GenerationMode = match request.mode.parse() {
            Ok(mode) => mode,
            Err(e) => {
                self.close_code = Some(CLOSE_POLICY_VIOLATION);
                return self
                    .send_json(&ServerMessage::error("invalid_mode", e.to_string(), None))
                    .await;
            }
        };

        let reference_audio = if mode == GenerationMode::VoiceClone {
            self.transition(SessionState::AwaitingReferenceAudio);
            self.send_json(&ServerMessage::status("awaiting_audio", None))
                .await?;
            match self.recv().await? {
                Message::Binary(audio) => audio,
                _ => {
                    return self
                        .send_json(&ServerMessage::error(
                            "invalid_request",
                            "Expected reference audio as a binary message",
                            None,
                        ))
                        .await;
                }
            }
        } else {
            Bytes::new()
        };

        let request = request.into_request(mode, reference_audio);
        if let Err(e) = request.validate(self.orchestrator.limits()) {
            return self.send_json(&validation_message(&e)).await;
        }

        self.transition(SessionState::Dispatched);
        let job = self.orchestrator.create_job(mode);
        let announced = async {
            self.send_json(&ServerMessage::status("queued", Some(job.id)))
                .await?;
            self.send_json(&ServerMessage::status("processing", Some(job.id)))
                .await
        }
        .await;
        if announced.is_err() {
            self.orchestrator.store().cancel(job.id);
            return Err(PeerGone);
        }

        let peer_left = self.race(job.id, request).await;
        self.transition(SessionState::Terminal);
        if peer_left {
            return Err(PeerGone);
        }
        self.deliver(job.id).await
    }

    /// Run generation against the cancel listener and join both.
    /// Returns whether the peer disconnected.
    async fn race(&mut self, id: JobId, request: GenerationRequest) -> bool {
        self.transition(SessionState::Racing);
        let Some(inbound) = self.inbound.take() else {
            return true;
        };

        let store = Arc::clone(self.orchestrator.store());
        let mut generation = self.orchestrator.spawn(id, request);
        let stop = CancellationToken::new();
        let mut listener = tokio::spawn(listen_for_cancel(inbound, stop.clone()));

        let exit = tokio::select! {
            joined = &mut generation => {
                if let Err(e) = joined {
                    tracing::error!(job_id = %id, error = %e, "Generation task failed");
                }
                stop.cancel();
                match listener.await {
                    Ok(exit) => exit,
                    Err(e) => {
                        tracing::error!(job_id = %id, error = %e, "Cancel listener failed");
                        ListenerExit::Stopped
                    }
                }
            }
            exit = &mut listener => {
                let exit = exit.unwrap_or_else(|e| {
                    tracing::error!(job_id = %id, error = %e, "Cancel listener failed");
                    ListenerExit::Disconnected
                });
                match exit {
                    ListenerExit::CancelRequested => {
                        tracing::info!(job_id = %id, "WebSocket cancel received");
                        store.cancel(id);
                    }
                    ListenerExit::Disconnected => {
                        tracing::info!(job_id = %id, "Peer left mid-generation, cancelling job");
                        store.cancel(id);
                    }
                    ListenerExit::Stopped => {}
                }
                if let Err(e) = generation.await {
                    tracing::error!(job_id = %id, error = %e, "Generation task failed");
                }
                exit
            }
        };

        exit == ListenerExit::Disconnected
    }

    /// Report the job's recorded outcome.
    async fn deliver(&mut self, id: JobId) -> Result<(), PeerGone> {
        let Some(job) = self.orchestrator.store().get(id) else {
            return self
                .send_json(&ServerMessage::error(
                    "internal_error",
                    "Job record disappeared",
                    Some(id),
                ))
                .await;
        };

        match (job.status, job.result) {
            (JobStatus::Completed, Some(result)) => {
                self.send(Message::Binary(result.audio)).await?;
                self.send_json(&ServerMessage::Done { job_id: id }).await
            }
            (JobStatus::Completed, None) => {
                tracing::error!(job_id = %id, "Completed job has no result payload");
                self.send_json(&ServerMessage::error(
                    "internal_error",
                    "Job completed but audio data is missing",
                    Some(id),
                ))
                .await
            }
            (JobStatus::Cancelled, _) => {
                self.send_json(&ServerMessage::status("cancelled", Some(id)))
                    .await
            }
            (JobStatus::Failed, _) => {
                let detail = job.error.unwrap_or_else(|| "Unknown error".to_string());
                self.send_json(&ServerMessage::error("generation_failed", detail, Some(id)))
                    .await
            }
            (status, _) => {
                tracing::error!(job_id = %id, %status, "Generation ended without a terminal state");
                self.send_json(&ServerMessage::error(
                    "internal_error",
                    "Generation ended unexpectedly",
                    Some(id),
                ))
                .await
            }
        }
    }

    /// Next data frame. Pings and pongs are skipped.
    async fn recv(&mut self) -> Result<Message, PeerGone> {
        let inbound = self.inbound.as_mut().ok_or(PeerGone)?;
        loop {
            match inbound.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(PeerGone),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return Err(PeerGone);
                }
                Some(Ok(message)) => return Ok(message),
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), PeerGone> {
        self.outbound.send(message).await.map_err(|e| {
            tracing::debug!(error = %e, "WebSocket send failed");
            PeerGone
        })
    }

    async fn send_json(&mut self, message: &ServerMessage) -> Result<(), PeerGone> {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Message::Text(json.into())).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize WebSocket message");
                Ok(())
            }
        }
    }

    async fn close(&mut self) {
        let frame = self.close_code.map(|code| CloseFrame {
            code,
            reason: "invalid mode".into(),
        });
        if let Err(e) = self.outbound.send(Message::Close(frame)).await {
            tracing::trace!(error = %e, "Close frame not delivered");
        }
        self.transition(SessionState::Closed);
    }
}

fn validation_message(e: &ValidationError) -> ServerMessage {
    let kind = if e.is_payload_too_large() {
        "payload_too_large"
    } else {
        "bad_request"
    };
    ServerMessage::error(kind, e.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tokio_util::sync::PollSender;
    use ttsweb_core::{Limits, MockBackend};
    use ttsweb_server_jobs::{ConcurrencyGate, JobStore};

    type Inbound = mpsc::UnboundedSender<Result<Message, axum::Error>>;
    type Outbound = mpsc::Receiver<Message>;

    fn orchestrator(latency_ms: u64) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::new(JobStore::default()),
            ConcurrencyGate::new(2),
            Arc::new(MockBackend::new().with_latency(Duration::from_millis(latency_ms))),
            Limits::default(),
            std::env::temp_dir(),
        ))
    }

    fn start(
        orch: &Arc<Orchestrator>,
    ) -> (Inbound, Outbound, tokio::task::JoinHandle<SessionState>) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(32);
        let session = StreamingSession::new(
            Arc::clone(orch),
            PollSender::new(out_tx),
            UnboundedReceiverStream::new(in_rx),
        );
        (in_tx, out_rx, tokio::spawn(session.run()))
    }

    fn text(value: serde_json::Value) -> Result<Message, axum::Error> {
        Ok(Message::Text(value.to_string().into()))
    }

    async fn next_json(out: &mut Outbound) -> ServerMessage {
        match out.recv().await {
            Some(Message::Text(t)) => serde_json::from_str(t.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_server_message_shapes() {
        let id = JobId::new();
        let json = serde_json::to_value(ServerMessage::status("queued", Some(id))).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["job_id"], id.to_string());

        let json = serde_json::to_value(ServerMessage::status("awaiting_audio", None)).unwrap();
        assert!(json.get("job_id").is_none());

        let json = serde_json::to_value(ServerMessage::Done { job_id: id }).unwrap();
        assert_eq!(json["type"], "done");
    }

    #[test]
    fn test_flat_request_fallbacks() {
        let request = StreamRequest {
            mode: "voice_design_clone".into(),
            text: "Hi".into(),
            language: "English".into(),
            instruct: Some("deep voice".into()),
            ..StreamRequest::default()
        };
        match request.into_request(GenerationMode::VoiceDesignClone, Bytes::new()) {
            GenerationRequest::VoiceDesignClone(p) => {
                assert_eq!(p.design_text, "Hi");
                assert_eq!(p.design_instruct, "deep voice");
                assert_eq!(p.clone_texts, vec!["Hi".to_string()]);
                assert_eq!(p.clone_languages, vec!["English".to_string()]);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let request = StreamRequest {
            mode: "custom_voice".into(),
            text: "Hi".into(),
            ..StreamRequest::default()
        };
        match request.into_request(GenerationMode::CustomVoice, Bytes::new()) {
            GenerationRequest::CustomVoice(p) => assert_eq!(p.speaker, DEFAULT_SPEAKER),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_is_cancel() {
        assert!(is_cancel(r#"{"type":"cancel"}"#));
        assert!(!is_cancel(r#"{"type":"status"}"#));
        assert!(!is_cancel("cancel"));
    }

    #[tokio::test]
    async fn test_listener_stops_on_token() {
        let (_tx, rx) = mpsc::unbounded_channel::<Result<Message, axum::Error>>();
        let stop = CancellationToken::new();
        let listener = tokio::spawn(listen_for_cancel(
            UnboundedReceiverStream::new(rx),
            stop.clone(),
        ));
        stop.cancel();
        assert_eq!(listener.await.unwrap(), ListenerExit::Stopped);
    }

    #[tokio::test]
    async fn test_listener_ignores_other_messages() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(text(serde_json::json!({"type": "ping"}))).unwrap();
        tx.send(Ok(Message::Binary(Bytes::from_static(b"xx")))).unwrap();
        tx.send(text(serde_json::json!({"type": "cancel"}))).unwrap();
        let exit =
            listen_for_cancel(UnboundedReceiverStream::new(rx), CancellationToken::new()).await;
        assert_eq!(exit, ListenerExit::CancelRequested);
    }

    #[tokio::test]
    async fn test_custom_voice_delivers_audio_then_done() {
        let orch = orchestrator(0);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({
            "mode": "custom_voice", "text": "Hello world", "speaker": "Ryan"
        })))
        .unwrap();

        let ServerMessage::Status { status, job_id } = next_json(&mut out).await else {
            panic!("expected queued status");
        };
        assert_eq!(status, "queued");
        let job_id = job_id.unwrap();
        assert_eq!(
            next_json(&mut out).await,
            ServerMessage::status("processing", Some(job_id))
        );
        match out.recv().await {
            Some(Message::Binary(audio)) => assert_eq!(&audio[..4], b"RIFF"),
            other => panic!("expected audio, got {other:?}"),
        }
        assert_eq!(next_json(&mut out).await, ServerMessage::Done { job_id });
        assert!(matches!(out.recv().await, Some(Message::Close(None))));
        assert_eq!(session.await.unwrap(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_unknown_mode_closes_with_policy_violation() {
        let orch = orchestrator(0);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({"mode": "karaoke", "text": "hi"})))
            .unwrap();

        let ServerMessage::Error { error, .. } = next_json(&mut out).await else {
            panic!("expected error");
        };
        assert_eq!(error, "invalid_mode");
        match out.recv().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_POLICY_VIOLATION),
            other => panic!("expected close frame, got {other:?}"),
        }
        session.await.unwrap();
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_creates_no_job() {
        let orch = orchestrator(0);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({
            "mode": "voice_design_clone",
            "design_text": "ref",
            "design_instruct": "calm",
            "clone_texts": ["a", "b"],
            "clone_languages": ["English"]
        })))
        .unwrap();

        let ServerMessage::Error { error, detail, job_id } = next_json(&mut out).await else {
            panic!("expected error");
        };
        assert_eq!(error, "bad_request");
        assert!(detail.contains("same length"));
        assert!(job_id.is_none());
        session.await.unwrap();
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_dispatch_reports_cancelled() {
        let orch = orchestrator(300);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({
            "mode": "voice_design", "text": "Hello", "instruct": "warm"
        })))
        .unwrap();

        let _queued = next_json(&mut out).await;
        let ServerMessage::Status { job_id, .. } = next_json(&mut out).await else {
            panic!("expected processing status");
        };
        tx.send(text(serde_json::json!({"type": "cancel"})))
            .unwrap();

        assert_eq!(
            next_json(&mut out).await,
            ServerMessage::status("cancelled", job_id)
        );
        assert!(matches!(out.recv().await, Some(Message::Close(_))));
        session.await.unwrap();
        let job = orch.store().get(job_id.unwrap()).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_clone_waits_for_audio_and_rejects_empty_upload() {
        let orch = orchestrator(0);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({
            "mode": "voice_clone", "text": "Hi", "consent_acknowledged": true
        })))
        .unwrap();
        assert_eq!(
            next_json(&mut out).await,
            ServerMessage::status("awaiting_audio", None)
        );
        tx.send(Ok(Message::Binary(Bytes::new()))).unwrap();

        let ServerMessage::Error { error, .. } = next_json(&mut out).await else {
            panic!("expected error");
        };
        assert_eq!(error, "bad_request");
        session.await.unwrap();
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_mid_generation_cancels_job() {
        let orch = orchestrator(200);
        let (tx, mut out, session) = start(&orch);
        tx.send(text(serde_json::json!({
            "mode": "custom_voice", "text": "Hello", "speaker": "Vivian"
        })))
        .unwrap();
        let _queued = next_json(&mut out).await;
        let ServerMessage::Status { job_id, .. } = next_json(&mut out).await else {
            panic!("expected processing status");
        };
        drop(tx);

        assert_eq!(session.await.unwrap(), SessionState::Closed);
        let job = orch.store().get(job_id.unwrap()).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(orch.gate().available(), 2);
    }
}
