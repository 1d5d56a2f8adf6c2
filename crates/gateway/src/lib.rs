//! Gateway: HTTP + WebSocket server carrying live captions between clients
//! and the recognition gateway.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Wire recognizers into a [`RecognitionGateway`](captions_recognition::RecognitionGateway)
//! 3. Start HTTP server (`/health`, `/status`)
//! 4. Attach the `/ws/translate` upgrade handler
//!
//! Each WebSocket connection is one session; see [`ws`] for its lifecycle.

pub mod server;
pub mod state;
pub mod ws;

pub use {
    server::{build_gateway_app, start_gateway},
    state::{CapabilityProfile, GatewayState, Session, SessionRegistry},
    ws::Handshake,
};
