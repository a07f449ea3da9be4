//! End-to-end tests over a real websocket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use live_runtime::identity::SessionIdentity;
use live_runtime::SessionSupervisorHandle;
use serde_json::Value;
use thermostat::{build_routes, thermostat_registry, AppState, ThermoModel, ThermostatView};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Server {
    addr: SocketAddr,
    supervisor: SessionSupervisorHandle<ThermoModel>,
}

async fn boot_server() -> Server {
    let identity = Arc::new(SessionIdentity::new(&[9u8; 32], "session-name").unwrap());
    let runtime = live_test_utils::test_runtime(
        thermostat_registry().unwrap(),
        ThermostatView::new().unwrap(),
    );
    let supervisor = SessionSupervisorHandle::new(runtime);
    let state = AppState {
        supervisor: supervisor.clone(),
        identity,
    };
    let static_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("static");
    let app = build_routes(state, &static_dir);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server { addr, supervisor }
}

/// Connect as `name`, returning the socket and the session cookie pair.
async fn connect(addr: SocketAddr, name: &str, cookie: Option<&str>) -> (WsStream, Option<String>) {
    let mut request = format!("ws://{addr}/thermostat/ws?name={name}")
        .into_client_request()
        .unwrap();
    if let Some(cookie) = cookie {
        request
            .headers_mut()
            .insert("cookie", HeaderValue::from_str(cookie).unwrap());
    }

    let (ws, response) = timeout(TIMEOUT, connect_async(request)).await.unwrap().unwrap();
    let cookie = response
        .headers()
        .get("set-cookie")
        .map(|value| value.to_str().unwrap().split(';').next().unwrap().to_string());
    (ws, cookie)
}

/// Next `{"html": ...}` frame.
async fn next_html(ws: &mut WsStream) -> String {
    loop {
        let message = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            if let Some(html) = frame.get("html").and_then(Value::as_str) {
                return html.to_string();
            }
        }
    }
}

/// Read frames until one contains `needle`.
async fn html_containing(ws: &mut WsStream, needle: &str) -> String {
    loop {
        let html = next_html(ws).await;
        if html.contains(needle) {
            return html;
        }
    }
}

async fn send_event(ws: &mut WsStream, json: &str) {
    ws.send(Message::Text(json.into())).await.unwrap();
}

#[tokio::test]
async fn test_mount_renders_initial_page() {
    let server = boot_server().await;
    let (mut ws, cookie) = connect(server.addr, "alice", None).await;

    assert!(cookie.unwrap().starts_with("session-name="));

    let html = next_html(&mut ws).await;
    assert!(html.contains("User: alice"));
    assert!(html.contains("Temperature: 19.5"));

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_temp_up_twice() {
    let server = boot_server().await;
    let (mut ws, _) = connect(server.addr, "alice", None).await;
    next_html(&mut ws).await;

    send_event(&mut ws, r#"{"event":"temp-up"}"#).await;
    send_event(&mut ws, r#"{"event":"temp-up","params":{}}"#).await;

    html_containing(&mut ws, "Temperature: 19.7").await;

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_temp_change_warns_above_limit() {
    let server = boot_server().await;
    let (mut ws, _) = connect(server.addr, "alice", None).await;
    next_html(&mut ws).await;

    for _ in 0..3 {
        send_event(&mut ws, r#"{"event":"temp-change","params":{"temperature":"2"}}"#).await;
    }

    let html = html_containing(&mut ws, "Temperature: 25.5").await;
    assert!(html.contains("temperature-warning"));

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_save_reaches_every_session() {
    let server = boot_server().await;
    let (mut alice, _) = connect(server.addr, "alice", None).await;
    let (mut bob, _) = connect(server.addr, "bob", None).await;
    next_html(&mut alice).await;
    next_html(&mut bob).await;

    send_event(
        &mut alice,
        r#"{"event":"save","params":{"message":"hello"}}"#,
    )
    .await;

    html_containing(&mut alice, "alice: hello").await;
    html_containing(&mut bob, "alice: hello").await;

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    let server = boot_server().await;
    let (mut ws, _) = connect(server.addr, "alice", None).await;
    next_html(&mut ws).await;

    send_event(&mut ws, "temp-up").await;

    let message = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(frame["error"], "Malformed event");

    // The session is still usable
    send_event(&mut ws, r#"{"event":"temp-down"}"#).await;
    html_containing(&mut ws, "Temperature: 19.4").await;

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_reconnect_with_cookie_resumes_session() {
    let server = boot_server().await;

    let (mut first, cookie) = connect(server.addr, "alice", None).await;
    let cookie = cookie.unwrap();
    next_html(&mut first).await;
    send_event(&mut first, r#"{"event":"temp-up"}"#).await;
    html_containing(&mut first, "Temperature: 19.6").await;
    first.close(None).await.unwrap();

    let (mut second, reissued) = connect(server.addr, "ignored", Some(&cookie)).await;
    assert!(reissued.is_none());

    // Resumed snapshot keeps the original name and temperature
    let html = next_html(&mut second).await;
    assert!(html.contains("User: alice"));
    assert!(html.contains("Temperature: 19.6"));

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_newer_connection_replaces_older() {
    let server = boot_server().await;

    let (mut first, cookie) = connect(server.addr, "alice", None).await;
    let cookie = cookie.unwrap();
    next_html(&mut first).await;

    let (mut second, _) = connect(server.addr, "alice", Some(&cookie)).await;
    next_html(&mut second).await;

    // The older socket is closed with the replaced code
    let closed = loop {
        match timeout(TIMEOUT, first.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    assert_eq!(u16::from(closed.unwrap().code), thermostat::ws::CLOSE_REPLACED);

    server.supervisor.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_with_going_away() {
    let server = boot_server().await;
    let (mut ws, _) = connect(server.addr, "alice", None).await;
    next_html(&mut ws).await;

    server.supervisor.shutdown(TIMEOUT).await.unwrap();

    let closed = loop {
        match timeout(TIMEOUT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    // Not the replaced code, so the browser reconnects once the server is back
    assert_eq!(u16::from(closed.unwrap().code), thermostat::ws::CLOSE_GOING_AWAY);
}
