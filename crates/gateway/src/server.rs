use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{
            ConnectInfo, Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection,
        },
        http::{HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    serde::Deserialize,
    tower_http::{
        cors::{AllowOrigin, Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    captions_config::CaptionsConfig,
    captions_protocol::SERVICE_NAME,
    captions_recognition::RecognitionGateway,
};

use crate::{
    state::{CapabilityProfile, GatewayState},
    ws::{Handshake, handle_connection},
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// An empty `cors_origins`, or one containing `*`, allows any origin.
pub fn build_gateway_app(state: Arc<GatewayState>, cors_origins: &[String]) -> Router {
    let app_state = AppState { gateway: state };

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws/translate", get(translate_upgrade_handler))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the gateway HTTP + WebSocket server and run until shutdown.
pub async fn start_gateway(config: CaptionsConfig) -> anyhow::Result<()> {
    let recognition = Arc::new(RecognitionGateway::from_config(&config.recognition));
    let state = GatewayState::new(Arc::clone(&recognition), config.session.clone());
    let app = build_gateway_app(Arc::clone(&state), &config.server.cors_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let settings = recognition.settings();
    let lines = [
        format!("captions gateway v{} on {}", state.version, state.hostname),
        format!("listening on ws://{addr}/ws/translate"),
        format!(
            "speech: {} (timeout {}ms)",
            recognition.speech_provider(),
            settings.audio_timeout.as_millis()
        ),
        format!(
            "gestures: {} (timeout {}ms, window {}/{})",
            recognition.gesture_classifier(),
            settings.video_timeout.as_millis(),
            settings.min_frames,
            settings.window_capacity
        ),
        format!("max concurrent recognitions: {}", settings.max_concurrent),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    // Run the server with ConnectInfo for remote IP extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// Query string of `/ws/translate`.
#[derive(Debug, Default, Deserialize)]
pub struct TranslateQuery {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(rename = "hearingStatus", alias = "hearing_status")]
    pub hearing_status: Option<String>,
}

impl TranslateQuery {
    /// Validate the query into a [`Handshake`], or say why it is unusable.
    pub fn into_handshake(self) -> Result<Handshake, String> {
        let user_id = self
            .user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "missing userId".to_string())?;
        let status = self
            .hearing_status
            .ok_or_else(|| "missing hearingStatus".to_string())?;
        let profile = CapabilityProfile::parse(&status)
            .ok_or_else(|| format!("unknown hearingStatus '{status}'"))?;
        Ok(Handshake { user_id, profile })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.gateway.registry.count().await;
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": state.gateway.version,
        "sessions": sessions,
        "gesture_windows": state.gateway.recognition.windows().connection_count(),
    }))
}

async fn translate_upgrade_handler(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Query(query): Query<TranslateQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let handshake = match query.into_handshake() {
        Ok(handshake) => handshake,
        Err(reason) => {
            warn!(remote_ip = %addr.ip(), reason = %reason, "rejected handshake");
            return (StatusCode::BAD_REQUEST, reason).into_response();
        },
    };
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_connection(socket, state.gateway, handshake, addr))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}
