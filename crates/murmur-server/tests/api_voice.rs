use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use murmur_server::{app, config::BotConfig, AppState};
use murmur_voice::{
    ConnectionConfig, LoopbackTransport, ProcessSinkTransport, SpeechSynthesizer, VoiceError,
    VoiceSession, VoiceTransport,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const TARGET: u64 = 42;
const AGENT: u64 = 7;

/// One minute of audio at the loopback byte rate, so playback outlasts a test.
const LONG_AUDIO: usize = 44_100 * 60;

#[derive(Default)]
struct RecordingSynth {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSynth {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.contains("explode") {
            return Err(VoiceError::Tts("backend unavailable".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(vec![0; LONG_AUDIO])
    }
}

struct Harness {
    app: Router,
    transport: LoopbackTransport,
    synth: Arc<RecordingSynth>,
}

fn bot() -> BotConfig {
    BotConfig {
        target_member: Some(TARGET),
        agent_member: Some(AGENT),
        ..BotConfig::default()
    }
}

fn harness() -> Harness {
    let transport = LoopbackTransport::new(44_100);
    let synth = Arc::new(RecordingSynth::default());
    let app = build(Arc::new(transport.clone()), synth.clone());
    Harness {
        app,
        transport,
        synth,
    }
}

fn build(transport: Arc<dyn VoiceTransport>, synth: Arc<RecordingSynth>) -> Router {
    let (session, _task) = VoiceSession::spawn(transport, &ConnectionConfig::default());
    app(AppState::new(session, synth, &bot()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn lounge() -> Value {
    json!({ "channel_id": 1, "name": "lounge" })
}

fn text_from(sender: u64, content: &str, channel: Option<Value>) -> Value {
    json!({
        "sender_id": sender,
        "content": content,
        "sender_channel": channel,
    })
}

#[tokio::test(start_paused = true)]
async fn health_check_returns_ok() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test(start_paused = true)]
async fn tracked_member_message_is_spoken() {
    let h = harness();
    let event = json!({
        "sender_id": TARGET,
        "content": "hi <@9>, look at https://example.com",
        "sender_channel": lounge(),
        "mentions": [{ "kind": "user", "id": 9, "name": "Biscuit" }],
    });

    let (status, body) = send(&h.app, "POST", "/api/events/text", Some(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "speaking");
    assert_eq!(body["started"]["bytes"], LONG_AUDIO);
    assert_eq!(h.synth.spoken(), vec!["hi Biscuit, look at".to_string()]);

    let (_, status_body) = send(&h.app, "GET", "/api/voice/status", None).await;
    assert_eq!(status_body["connected"], true);
    assert_eq!(status_body["playing"], true);
    assert_eq!(status_body["channel"]["name"], "lounge");
    assert_eq!(status_body["target_member"], TARGET);
}

#[tokio::test(start_paused = true)]
async fn other_senders_and_commands_are_ignored() {
    let h = harness();

    let (_, body) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(1234, "hello", Some(lounge()))),
    )
    .await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["reason"], "other_sender");

    let (_, body) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "!skip", Some(lounge()))),
    )
    .await;
    assert_eq!(body["reason"], "command");

    assert_eq!(h.transport.connects(), 0);
    assert!(h.synth.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sender_outside_voice_is_dropped() {
    let h = harness();
    let (_, body) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "hello", None)),
    )
    .await;
    assert_eq!(body["outcome"], "dropped");
    assert_eq!(body["reason"]["kind"], "unready");
    assert_eq!(h.transport.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_message_is_dropped_while_playing() {
    let h = harness();
    let (_, first) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "first", Some(lounge()))),
    )
    .await;
    assert_eq!(first["outcome"], "speaking");

    let (_, second) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "second", Some(lounge()))),
    )
    .await;
    assert_eq!(second["outcome"], "dropped");
    assert_eq!(second["reason"]["kind"], "busy");
    assert_eq!(h.transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn synthesis_failure_drops_the_utterance() {
    let h = harness();
    let (_, body) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "explode please", Some(lounge()))),
    )
    .await;
    assert_eq!(body["outcome"], "dropped");
    assert_eq!(body["reason"]["kind"], "synthesis");
    assert_eq!(h.transport.bytes_played(), 0);
}

#[tokio::test(start_paused = true)]
async fn target_leaving_voice_disconnects() {
    let h = harness();
    send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "hello", Some(lounge()))),
    )
    .await;

    let event = json!({
        "member_id": TARGET,
        "previous_channel": lounge(),
        "new_channel": null,
    });
    let (status, body) = send(&h.app, "POST", "/api/events/membership", Some(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "teardown");
    assert_eq!(body["reason"], "target_left");

    let (_, status_body) = send(&h.app, "GET", "/api/voice/status", None).await;
    assert_eq!(status_body["has_handle"], false);
    assert_eq!(h.transport.live_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn session_invalid_fault_disconnects() {
    let h = harness();
    send(
        &h.app,
        "POST",
        "/api/voice/join",
        Some(json!({ "channel": lounge() })),
    )
    .await;

    let fault = json!({ "event": "on_message", "detail": "ConnectionClosed: code 4006" });
    let (_, body) = send(&h.app, "POST", "/api/events/fault", Some(fault)).await;
    assert_eq!(body["action"], "teardown");

    let (_, status_body) = send(&h.app, "GET", "/api/voice/status", None).await;
    assert_eq!(status_body["connected"], false);
}

#[tokio::test(start_paused = true)]
async fn join_and_leave() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/voice/join",
        Some(json!({ "channel": lounge() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], "connected");
    assert_eq!(body["channel"]["name"], "lounge");

    let (status, body) = send(&h.app, "POST", "/api/voice/leave", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["left"], true);

    let (status, body) = send(&h.app, "POST", "/api/voice/leave", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not connected"));
}

#[tokio::test(start_paused = true)]
async fn join_failure_reports_terminal_error() {
    let synth = Arc::new(RecordingSynth::default());
    let app = build(
        Arc::new(ProcessSinkTransport::new("", Vec::new())),
        synth,
    );

    let (status, body) = send(&app, "POST", "/api/voice/join", Some(json!({ "channel": lounge() }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("lounge"));
    assert!(message.contains("not configured"));
}

#[tokio::test(start_paused = true)]
async fn join_rejects_blank_channel_name() {
    let h = harness();
    let (status, _) = send(
        &h.app,
        "POST",
        "/api/voice/join",
        Some(json!({ "channel": { "channel_id": 3, "name": "  " } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.transport.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn changing_target_switches_listener() {
    let h = harness();

    let (status, body) = send(&h.app, "PUT", "/api/target", Some(json!({ "member_id": 99 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target_member"], 99);

    let (_, ignored) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(TARGET, "old voice", Some(lounge()))),
    )
    .await;
    assert_eq!(ignored["reason"], "other_sender");

    let (_, spoken) = send(
        &h.app,
        "POST",
        "/api/events/text",
        Some(text_from(99, "new voice", Some(lounge()))),
    )
    .await;
    assert_eq!(spoken["outcome"], "speaking");
}

#[tokio::test(start_paused = true)]
async fn say_requires_connection_unless_channel_given() {
    let h = harness();

    let (_, body) = send(&h.app, "POST", "/api/voice/say", Some(json!({ "text": "hello" }))).await;
    assert_eq!(body["outcome"], "dropped");
    assert_eq!(body["reason"]["kind"], "disconnected");

    let (_, body) = send(
        &h.app,
        "POST",
        "/api/voice/say",
        Some(json!({ "text": "hello", "channel": lounge() })),
    )
    .await;
    assert_eq!(body["outcome"], "speaking");
    assert_eq!(h.synth.spoken(), vec!["hello".to_string()]);
}
