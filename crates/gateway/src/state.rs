use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Instant};

use {
    serde::Serialize,
    tokio::sync::{RwLock, mpsc},
};

use {
    captions_config::SessionConfig,
    captions_recognition::RecognitionGateway,
};

// ── Capability profile ───────────────────────────────────────────────────────

/// What the client declared about its user at handshake. Advisory only:
/// it hints at the modality the client will send but is never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityProfile {
    Hearing,
    /// Deaf or hard of hearing.
    Deaf,
}

impl CapabilityProfile {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hearing" => Some(Self::Hearing),
            "deaf" | "hard-of-hearing" | "hard_of_hearing" | "hoh" => Some(Self::Deaf),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hearing => "hearing",
            Self::Deaf => "deaf",
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A connected client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub profile: CapabilityProfile,
    /// Identifies the transport connection; a reconnect under the same `id`
    /// gets a new one.
    pub conn_id: String,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: Instant,
}

impl Session {
    /// Send a serialized JSON frame to this client.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Live sessions keyed by user id. At most one entry per id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `session.id`. Returns the replaced
    /// session, whose transport is left untouched.
    pub async fn register(&self, session: Session) -> Option<Session> {
        let id = session.id.clone();
        self.sessions.write().await.insert(id, session)
    }

    /// Remove the entry for `id`, if any.
    pub async fn unregister(&self, id: &str) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    /// Remove the entry for `id` only if it still belongs to `conn_id`.
    ///
    /// Returns false when the entry is gone or was taken over by a newer
    /// connection.
    pub async fn release(&self, id: &str, conn_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.get(id).is_some_and(|s| s.conn_id == conn_id) {
            sessions.remove(id);
            true
        } else {
            false
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver a frame to the session registered under `id`.
    pub async fn send_to(&self, id: &str, frame: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|s| s.send(frame))
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    pub registry: SessionRegistry,
    pub recognition: Arc<RecognitionGateway>,
    pub session: SessionConfig,
    /// Server version string.
    pub version: String,
    pub hostname: String,
}

impl GatewayState {
    pub fn new(recognition: Arc<RecognitionGateway>, session: SessionConfig) -> Arc<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Arc::new(Self {
            registry: SessionRegistry::new(),
            recognition,
            session,
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
        })
    }
}
