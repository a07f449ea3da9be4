//! HTTP routes for the thermostat.
//!
//! - `/thermostat` - page shell; issues the session cookie
//! - `/thermostat/ws` - websocket transport of the live session
//! - `/live.js` - client script
//! - `/static/*` - files from the configured static directory

use crate::model::ThermoModel;
use crate::ws;

use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{extract::State, Router};
use live_runtime::identity::SessionIdentity;
use live_runtime::SessionSupervisorHandle;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

const PAGE_SHELL: &str = include_str!("../static/thermostat.html");
const LIVE_JS: &str = include_str!("../static/live.js");

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Owner of every live session.
    pub supervisor: SessionSupervisorHandle<ThermoModel>,

    /// Session cookie issuer.
    pub identity: Arc<SessionIdentity>,
}

/// Build the application routes.
pub fn build_routes(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/thermostat", get(page))
        .route("/thermostat/ws", get(ws::upgrade))
        .route("/live.js", get(live_js))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = state.identity.resolve(cookie_header(&headers));
    with_set_cookie(Html(PAGE_SHELL).into_response(), identity.set_cookie)
}

async fn live_js() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/javascript")], LIVE_JS)
}

/// The request's `Cookie` header, if it is valid text.
pub(crate) fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(COOKIE).and_then(|value| value.to_str().ok())
}

/// Attach a `Set-Cookie` header when a new identity was issued.
pub(crate) fn with_set_cookie(mut response: Response, set_cookie: Option<String>) -> Response {
    if let Some(set_cookie) = set_cookie {
        match HeaderValue::from_str(&set_cookie) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => warn!(target: "thermostat.routes", error = %e, "Invalid Set-Cookie value"),
        }
    }
    response
}
