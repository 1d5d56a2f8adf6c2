//! End-to-end tests: a real server on a loopback port, driven by a
//! WebSocket client.

use std::{
    io::Cursor,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    futures::{SinkExt, StreamExt},
    image::{DynamicImage, ImageFormat, Rgb, RgbImage},
    serde_json::{Value, json},
    tokio::net::TcpStream,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
};

use {
    captions_config::SessionConfig,
    captions_gateway::{GatewayState, build_gateway_app},
    captions_recognition::{
        GestureClassifier, LandmarkFrame, PcmClip, Recognition, RecognitionGateway,
        RecognitionSettings, SkinRegionDetector, SpeechRecognizer, Transcript,
    },
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const QUIET: Duration = Duration::from_millis(300);

struct FixedSpeech;

#[async_trait]
impl SpeechRecognizer for FixedSpeech {
    fn id(&self) -> &'static str {
        "fixed"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn transcribe(&self, _clip: &PcmClip) -> anyhow::Result<Option<Transcript>> {
        Ok(Some(Transcript::new("hello world")))
    }
}

/// Hangs on loud clips, answers quiet ones immediately.
#[derive(Default)]
struct SlowWhenLoud {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechRecognizer for SlowWhenLoud {
    fn id(&self) -> &'static str {
        "slow-when-loud"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn transcribe(&self, clip: &PcmClip) -> anyhow::Result<Option<Transcript>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if clip.samples().first().is_some_and(|s| *s > 25_000) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(Some(Transcript::new("quick reply")))
    }
}

#[derive(Default)]
struct CountingClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl GestureClassifier for CountingClassifier {
    fn id(&self) -> &'static str {
        "counting"
    }

    async fn classify(&self, window: &[LandmarkFrame]) -> anyhow::Result<Option<Recognition>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Recognition {
            text: format!("sign over {} frames", window.len()),
            confidence: None,
        }))
    }
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<GatewayState>,
    classifier: Arc<CountingClassifier>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Arc::new(FixedSpeech), RecognitionSettings::default()).await
    }

    async fn start_with(speech: Arc<dyn SpeechRecognizer>, settings: RecognitionSettings) -> Self {
        let classifier = Arc::new(CountingClassifier::default());
        let recognition = RecognitionGateway::new(
            speech,
            Arc::new(SkinRegionDetector::default()),
            Arc::clone(&classifier) as Arc<dyn GestureClassifier>,
            settings,
        );
        let state = GatewayState::new(Arc::new(recognition), SessionConfig::default());
        let app = build_gateway_app(Arc::clone(&state), &[]);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr,
            state,
            classifier,
        }
    }

    fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn connect(&self, user_id: &str, status: &str) -> Client {
        let url = format!(
            "ws://{}/ws/translate?userId={user_id}&hearingStatus={status}",
            self.addr
        );
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    async fn session_count(&self) -> usize {
        self.state.registry.count().await
    }

    /// Poll until the registry holds `expected` sessions.
    async fn wait_for_sessions(&self, expected: usize) {
        for _ in 0..100 {
            if self.session_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {expected} sessions, found {}",
            self.session_count().await
        );
    }
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("no reply within 5s")
        .expect("stream ended")
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    }
}

async fn assert_quiet(client: &mut Client) {
    if let Ok(msg) = tokio::time::timeout(QUIET, client.next()).await {
        panic!("expected no reply, got {msg:?}");
    }
}

fn loud_audio() -> Vec<u8> {
    audio_at(0.5)
}

fn audio_at(level: f32) -> Vec<u8> {
    std::iter::repeat_n(level, 160)
        .flat_map(f32::to_le_bytes)
        .collect()
}

fn hand_frame(left: u32) -> String {
    let image = RgbImage::from_fn(40, 30, |x, y| {
        if (left..left + 8).contains(&x) && (8..16).contains(&y) {
            Rgb([220, 170, 140])
        } else {
            Rgb([30, 60, 200])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
}

#[tokio::test]
async fn health_reports_fixed_payload() {
    let server = TestServer::start().await;
    let body: Value = reqwest::get(server.http("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({ "status": "healthy", "service": "translation-backend" })
    );
}

#[tokio::test]
async fn health_ignores_connected_sessions() {
    let server = TestServer::start().await;
    let _alice = server.connect("alice", "hearing").await;
    let _bob = server.connect("bob", "deaf").await;
    server.wait_for_sessions(2).await;

    let response = reqwest::get(server.http("/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "status": "healthy", "service": "translation-backend" })
    );
}

#[tokio::test]
async fn status_counts_sessions() {
    let server = TestServer::start().await;
    let _client = server.connect("alice", "hearing").await;
    server.wait_for_sessions(1).await;

    let body: Value = reqwest::get(server.http("/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["service"], "translation-backend");
    assert_eq!(body["gesture_windows"], 0);
}

#[tokio::test]
async fn handshake_without_identity_is_rejected() {
    let server = TestServer::start().await;

    for query in [
        "hearingStatus=hearing",
        "userId=alice",
        "userId=&hearingStatus=hearing",
        "userId=alice&hearingStatus=sometimes",
    ] {
        let status = reqwest::get(server.http(&format!("/ws/translate?{query}")))
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST, "query: {query}");

        let url = format!("ws://{}/ws/translate?{query}", server.addr);
        assert!(connect_async(url).await.is_err(), "query: {query}");
    }
    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn snake_case_handshake_is_accepted() {
    let server = TestServer::start().await;
    let url = format!(
        "ws://{}/ws/translate?user_id=bob&hearing_status=hard-of-hearing",
        server.addr
    );
    let (_client, _) = connect_async(url).await.unwrap();
    server.wait_for_sessions(1).await;
}

#[tokio::test]
async fn audio_yields_subtitle_with_echoed_timestamp() {
    let server = TestServer::start().await;
    let mut client = server.connect("alice", "hearing").await;

    send(
        &mut client,
        json!({
            "type": "audio",
            "data": { "audio": loud_audio(), "sampleRate": 16000 },
            "timestamp": 1_718_000_000_123i64,
        }),
    )
    .await;

    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "subtitle");
    assert_eq!(reply["data"]["text"], "hello world");
    assert_eq!(reply["timestamp"], 1_718_000_000_123i64);
    let confidence = reply["data"]["confidence"].as_f64().unwrap();
    assert!((confidence - 0.85).abs() < 1e-6);
}

#[tokio::test]
async fn malformed_message_does_not_end_session() {
    let server = TestServer::start().await;
    let mut client = server.connect("alice", "hearing").await;

    client.send(Message::text("not json".to_string())).await.unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["code"], "malformed_envelope");
    assert!(reply["timestamp"].as_i64().unwrap() > 0);

    send(
        &mut client,
        json!({ "type": "audio", "data": { "audio": loud_audio() }, "timestamp": 7 }),
    )
    .await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "subtitle");
    assert_eq!(reply["timestamp"], 7);
}

#[tokio::test]
async fn unknown_type_is_reported() {
    let server = TestServer::start().await;
    let mut client = server.connect("alice", "hearing").await;

    send(
        &mut client,
        json!({ "type": "sticker", "data": {}, "timestamp": 1 }),
    )
    .await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["code"], "unknown_kind");
}

#[tokio::test]
async fn silence_gets_no_reply() {
    let server = TestServer::start().await;
    let mut client = server.connect("alice", "hearing").await;

    send(
        &mut client,
        json!({ "type": "audio", "data": { "audio": vec![0u8; 640] }, "timestamp": 1 }),
    )
    .await;
    assert_quiet(&mut client).await;

    // Processing is serialized, so the next reply belongs to the next message.
    send(&mut client, json!({ "type": "video", "data": {}, "timestamp": 2 })).await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["data"]["code"], "invalid_payload");
}

#[tokio::test]
async fn undecodable_video_frame_is_dropped() {
    let server = TestServer::start().await;
    let mut client = server.connect("carol", "deaf").await;

    send(
        &mut client,
        json!({ "type": "video", "data": { "frame": "data:image/jpeg;base64,%%%" }, "timestamp": 3 }),
    )
    .await;
    assert_quiet(&mut client).await;

    send(
        &mut client,
        json!({ "type": "audio", "data": { "audio": loud_audio() }, "timestamp": 4 }),
    )
    .await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "subtitle");
    assert_eq!(reply["timestamp"], 4);
}

#[tokio::test]
async fn moving_hand_yields_sign_after_full_window() {
    let server = TestServer::start().await;
    let mut client = server.connect("carol", "deaf").await;
    let min_frames = RecognitionSettings::default().min_frames;

    for i in 0..min_frames - 1 {
        let left = u32::try_from(i * 3).unwrap();
        send(
            &mut client,
            json!({ "type": "video", "data": { "frame": hand_frame(left) }, "timestamp": i }),
        )
        .await;
    }
    assert_quiet(&mut client).await;
    assert_eq!(server.classifier.calls.load(Ordering::SeqCst), 0);

    let left = u32::try_from((min_frames - 1) * 3).unwrap();
    send(
        &mut client,
        json!({ "type": "video", "data": { "frame": hand_frame(left) }, "timestamp": 99 }),
    )
    .await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "subtitle");
    assert_eq!(reply["timestamp"], 99);
    assert_eq!(
        reply["data"]["text"],
        format!("sign over {min_frames} frames")
    );
    let confidence = reply["data"]["confidence"].as_f64().unwrap();
    assert!((confidence - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn disconnect_removes_exactly_one_session() {
    let server = TestServer::start().await;
    let mut alice = server.connect("alice", "hearing").await;
    let _bob = server.connect("bob", "deaf").await;
    server.wait_for_sessions(2).await;

    alice.close(None).await.unwrap();
    server.wait_for_sessions(1).await;
    assert!(server.state.registry.get("bob").await.is_some());
    assert!(server.state.registry.get("alice").await.is_none());
}

#[tokio::test]
async fn reconnect_keeps_newest_connection() {
    let server = TestServer::start().await;
    let mut first = server.connect("alice", "hearing").await;
    server.wait_for_sessions(1).await;
    let first_conn = server.state.registry.get("alice").await.unwrap().conn_id;

    let mut second = server.connect("alice", "hearing").await;
    for _ in 0..100 {
        if server.state.registry.get("alice").await.unwrap().conn_id != first_conn {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let second_conn = server.state.registry.get("alice").await.unwrap().conn_id;
    assert_ne!(first_conn, second_conn);

    // The stale handler ends without evicting its replacement.
    first.close(None).await.unwrap();
    tokio::time::sleep(QUIET).await;
    assert_eq!(
        server.state.registry.get("alice").await.unwrap().conn_id,
        second_conn
    );

    send(
        &mut second,
        json!({ "type": "audio", "data": { "audio": loud_audio() }, "timestamp": 5 }),
    )
    .await;
    assert_eq!(recv(&mut second).await["type"], "subtitle");
}

#[tokio::test]
async fn reconnect_does_not_share_or_leak_gesture_windows() {
    let server = TestServer::start().await;
    let windows = server.state.recognition.windows();

    let mut first = server.connect("alice", "deaf").await;
    server.wait_for_sessions(1).await;
    let first_conn = server.state.registry.get("alice").await.unwrap().conn_id;

    let mut second = server.connect("alice", "deaf").await;
    for _ in 0..100 {
        if server.state.registry.get("alice").await.unwrap().conn_id != first_conn {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let second_conn = server.state.registry.get("alice").await.unwrap().conn_id;
    assert_ne!(first_conn, second_conn);

    for (client, left) in [(&mut first, 0), (&mut second, 10)] {
        send(
            client,
            json!({ "type": "video", "data": { "frame": hand_frame(left) }, "timestamp": 1 }),
        )
        .await;
    }
    for _ in 0..100 {
        if windows.len(&first_conn) == 1 && windows.len(&second_conn) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(windows.len(&first_conn), 1);
    assert_eq!(windows.len(&second_conn), 1);

    // The replacement leaves first; the stale connection keeps feeding frames.
    second.close(None).await.unwrap();
    send(
        &mut first,
        json!({ "type": "video", "data": { "frame": hand_frame(3) }, "timestamp": 2 }),
    )
    .await;
    for _ in 0..100 {
        if windows.len(&second_conn) == 0 && windows.len(&first_conn) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(windows.len(&second_conn), 0);
    assert_eq!(windows.len(&first_conn), 2);

    first.close(None).await.unwrap();
    server.wait_for_sessions(0).await;
    for _ in 0..100 {
        if windows.connection_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(windows.connection_count(), 0);
}

#[tokio::test]
async fn disconnect_during_slow_recognition_releases_promptly() {
    let speech = Arc::new(SlowWhenLoud::default());
    let settings = RecognitionSettings {
        audio_timeout: Duration::from_secs(60),
        ..RecognitionSettings::default()
    };
    let server =
        TestServer::start_with(Arc::clone(&speech) as Arc<dyn SpeechRecognizer>, settings).await;

    let mut alice = server.connect("alice", "hearing").await;
    let mut bob = server.connect("bob", "deaf").await;
    server.wait_for_sessions(2).await;

    send(
        &mut alice,
        json!({ "type": "audio", "data": { "audio": audio_at(0.9) }, "timestamp": 1 }),
    )
    .await;
    for _ in 0..100 {
        if speech.calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(speech.calls.load(Ordering::SeqCst), 1);

    let closed_at = Instant::now();
    alice.close(None).await.unwrap();
    server.wait_for_sessions(1).await;
    assert!(closed_at.elapsed() < Duration::from_secs(2));
    assert!(server.state.registry.get("alice").await.is_none());

    send(
        &mut bob,
        json!({ "type": "audio", "data": { "audio": loud_audio() }, "timestamp": 2 }),
    )
    .await;
    let reply = recv(&mut bob).await;
    assert_eq!(reply["type"], "subtitle");
    assert_eq!(reply["data"]["text"], "quick reply");
    assert_eq!(reply["timestamp"], 2);
    assert_eq!(server.session_count().await, 1);
}
