//! Websocket transport of a live session.
//!
//! Inbound text frames are client events:
//!
//! ```json
//! {"event": "temp-change", "params": {"temperature": "2"}}
//! ```
//!
//! Outbound frames carry a rendered fragment, `{"html": "..."}`, or
//! `{"error": "..."}` with a client-safe message.
//!
//! A connection that loses its session to a newer connection with the same
//! cookie is closed with code [`CLOSE_REPLACED`]; the client does not
//! reconnect after it.

use crate::model::ThermoModel;
use crate::routes::{cookie_header, with_set_cookie, AppState};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use live_runtime::{Params, SessionActorHandle, SessionId, SessionSupervisorHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Rendered frames buffered between the session actor and the socket.
const FRAME_BUFFER: usize = 64;

/// Close code sent when a newer connection took over the session.
pub const CLOSE_REPLACED: u16 = 4000;

/// Close code sent when the server is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// A client event as sent by the browser.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub params: Params,
}

/// A frame sent to the browser.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFrame {
    Html(String),
    Error(String),
}

/// Parse an inbound text frame.
///
/// # Errors
///
/// Returns the JSON error for anything that is not a client event.
pub fn decode_client_frame(text: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// `GET /thermostat/ws`: resolve the session identity and upgrade.
///
/// Query parameters become the mount parameters of a new session.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let identity = state.identity.resolve(cookie_header(&headers));
    let session_id = identity.session_id;
    let params = query
        .into_iter()
        .fold(Params::new(), |params, (key, value)| params.with(key, value));

    let supervisor = state.supervisor;
    let response =
        ws.on_upgrade(move |socket| run_connection(socket, supervisor, session_id, params));
    with_set_cookie(response, identity.set_cookie)
}

#[instrument(skip_all, name = "thermostat.ws", fields(session_id = %session_id))]
async fn run_connection(
    socket: WebSocket,
    supervisor: SessionSupervisorHandle<ThermoModel>,
    session_id: SessionId,
    params: Params,
) {
    let (mut outbound, mut inbound) = socket.split();
    let (sink, mut frames) = mpsc::channel(FRAME_BUFFER);

    let connected = match supervisor.on_connect(session_id, params, sink).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!(
                target: "thermostat.ws",
                error = %e,
                kind = e.kind(),
                "Session connect failed"
            );
            let _ = send_frame(&mut outbound, &ServerFrame::Error(e.client_message())).await;
            return;
        }
    };

    info!(
        target: "thermostat.ws",
        generation = connected.generation,
        origin = ?connected.origin,
        "Websocket session connected"
    );

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // The session actor stopped: replaced or shutting down
                    let code = if supervisor.is_draining() {
                        CLOSE_GOING_AWAY
                    } else {
                        CLOSE_REPLACED
                    };
                    let _ = outbound
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: "session ended".into(),
                        })))
                        .await;
                    break;
                };
                if send_frame(&mut outbound, &ServerFrame::Html(frame.body)).await.is_err() {
                    break;
                }
            }

            message = inbound.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(reply) = submit(&connected.handle, &text).await {
                            if send_frame(&mut outbound, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(target: "thermostat.ws", error = %e, "Websocket receive failed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = supervisor
        .on_disconnect(session_id, connected.generation)
        .await
    {
        warn!(target: "thermostat.ws", error = %e, "Session disconnect failed");
    }

    info!(
        target: "thermostat.ws",
        generation = connected.generation,
        "Websocket session closed"
    );
}

/// Hand a client event to the session.
async fn submit(handle: &SessionActorHandle<ThermoModel>, text: &str) -> Result<(), ServerFrame> {
    let frame = decode_client_frame(text).map_err(|e| {
        debug!(target: "thermostat.ws", error = %e, "Malformed client frame");
        ServerFrame::Error("Malformed event".to_string())
    })?;

    handle
        .client_event(frame.event, frame.params)
        .await
        .map_err(|e| {
            warn!(target: "thermostat.ws", error = %e, "Client event dropped");
            ServerFrame::Error(e.client_message())
        })
}

async fn send_frame(
    outbound: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => outbound.send(Message::Text(text)).await,
        Err(e) => {
            warn!(target: "thermostat.ws", error = %e, "Failed to encode frame");
            Ok(())
        }
    }
}
