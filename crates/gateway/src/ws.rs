//! Per-connection session handler.
//!
//! Each connection runs three cooperating pieces sharing one
//! [`CancellationToken`]:
//! - a reader task forwarding inbound frames into a bounded queue,
//! - a writer task draining the session's outbound channel into the socket,
//! - the processing loop, handling one frame at a time so replies leave in
//!   the order their messages were processed.
//!
//! Whichever side notices the connection is gone cancels the token; the
//! handler then releases its registry entry exactly once and drops the
//! connection's recognition state.

use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{FutureExt, SinkExt, StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    captions_protocol::{self as protocol, Envelope, Payload, error_codes},
    captions_recognition::RecognitionInput,
};

use crate::state::{CapabilityProfile, GatewayState, Session};

/// Identity a client presents when opening the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: String,
    pub profile: CapabilityProfile,
}

/// A frame as read off the socket.
#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Binary,
}

/// Run a session until the client goes away.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    handshake: Handshake,
    remote_addr: SocketAddr,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let session_id = handshake.user_id;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, mut in_rx) = mpsc::channel::<Inbound>(state.session.inbound_queue.max(1));
    let cancel = CancellationToken::new();

    let replaced = state
        .registry
        .register(Session {
            id: session_id.clone(),
            profile: handshake.profile,
            conn_id: conn_id.clone(),
            sender: out_tx.clone(),
            remote_addr: Some(remote_addr),
            connected_at: Instant::now(),
        })
        .await;
    if let Some(prev) = replaced {
        warn!(
            session_id = %session_id,
            conn_id = %conn_id,
            replaced_conn_id = %prev.conn_id,
            "session id reconnected, replacing previous entry"
        );
    }
    let sessions = state.registry.count().await;
    info!(
        session_id = %session_id,
        conn_id = %conn_id,
        profile = handshake.profile.as_str(),
        remote_ip = %remote_addr.ip(),
        sessions,
        "session connected"
    );

    // Writer: outbound channel -> socket.
    let write_cancel = cancel.clone();
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = write_cancel.cancelled() => break,
                frame = out_rx.recv() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                debug!(conn_id = %write_conn_id, error = %e, "ws write failed");
                break;
            }
        }
        write_cancel.cancel();
        let _ = ws_tx.close().await;
    });

    // Reader: socket -> inbound queue.
    let read_cancel = cancel.clone();
    let read_conn_id = conn_id.clone();
    let read_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = read_cancel.cancelled() => break,
                msg = ws_rx.next() => msg,
            };
            let inbound = match msg {
                Some(Ok(Message::Text(text))) => Inbound::Text(text.to_string()),
                Some(Ok(Message::Binary(_))) => Inbound::Binary,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(conn_id = %read_conn_id, error = %e, "ws read error");
                    break;
                },
            };
            if in_tx.send(inbound).await.is_err() {
                break;
            }
        }
        read_cancel.cancel();
    });

    // Processing loop.
    let mut processed = 0u64;
    loop {
        let inbound = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            inbound = in_rx.recv() => match inbound {
                Some(inbound) => inbound,
                None => break,
            },
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(session_id = %session_id, conn_id = %conn_id, "connection closed during processing");
                break;
            },
            outcome = AssertUnwindSafe(process_frame(&state, &session_id, &conn_id, inbound)).catch_unwind() => outcome,
        };
        processed += 1;

        let reply = outcome.unwrap_or_else(|_| {
            error!(session_id = %session_id, conn_id = %conn_id, "message handler panicked");
            Some(Envelope::error("internal server error", Some(error_codes::INTERNAL)))
        });
        if let Some(reply) = reply
            && out_tx.send(protocol::encode(&reply)).is_err()
        {
            break;
        }
    }

    // Teardown.
    cancel.cancel();
    drop(out_tx);
    drop(in_rx);
    let _ = tokio::join!(read_handle, write_handle);

    let released = state.registry.release(&session_id, &conn_id).await;
    state.recognition.end_session(&conn_id);
    let sessions = state.registry.count().await;
    info!(
        session_id = %session_id,
        conn_id = %conn_id,
        processed,
        released,
        sessions,
        "session disconnected"
    );
}

/// Handle one inbound frame and produce the reply, if any.
///
/// Protocol errors become error envelopes. Recognition that finds nothing,
/// fails, or times out produces no reply.
pub async fn process_frame(
    state: &GatewayState,
    session_id: &str,
    conn_id: &str,
    inbound: Inbound,
) -> Option<Envelope> {
    let raw = match inbound {
        Inbound::Text(raw) => raw,
        Inbound::Binary => {
            return Some(Envelope::error(
                "binary frames are not supported, send JSON text",
                Some(error_codes::UNSUPPORTED_FRAME),
            ));
        },
    };

    let envelope = match protocol::decode(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(session_id, code = e.code(), error = %e, "rejected inbound message");
            return Some(e.to_envelope());
        },
    };

    let timestamp = envelope.timestamp;
    let kind = envelope.kind();
    let input = match envelope.payload {
        Payload::Audio(audio) => RecognitionInput::Audio(audio),
        Payload::Video(video) => RecognitionInput::Video(video),
        Payload::Subtitle(_) | Payload::Error(_) => {
            return Some(Envelope::error(
                format!("'{kind}' messages are sent by the server only"),
                Some(error_codes::UNSUPPORTED_KIND),
            ));
        },
    };

    let modality = input.modality();
    let recognized = state.recognition.recognize(conn_id, input).await?;
    info!(
        session_id,
        ?modality,
        text = %preview(&recognized.text),
        "sending subtitle"
    );
    Some(Envelope::subtitle(
        recognized.text,
        recognized.confidence,
        timestamp,
    ))
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 50;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    out.push('…');
    out
}
