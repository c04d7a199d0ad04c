// HTTP surface of the relay: message endpoint plus a forwarding fallback

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, warn};

use crate::relay::{
    Fetch, InterceptingFetcher, OutboundRequest, RelayMessage, RelayRegistry, RequestMode,
    TokenReply, TransportOptions,
};

pub struct RelayAppState {
    pub registry: Arc<RelayRegistry>,
    pub network: InterceptingFetcher,
    pub api_host: Url,
    pub max_body_bytes: usize,
}

pub type AppState = Arc<RelayAppState>;

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Query parameters whose values are secrets and must not reach the logs.
const REDACTED_PARAMS: [&str; 1] = ["token"];

/// The relay's own endpoints get no CORS headers: only the relay's origin,
/// or a non-browser client, may talk to the token mirror. Forwarded
/// requests keep permissive CORS so the page can load backend resources.
pub fn create_relay_router(state: AppState) -> Router {
    let forwarding = Router::new()
        .fallback(forward)
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/relay/health", get(health_check))
        .route("/relay/messages", post(post_message))
        .merge(forwarding)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_span)),
        )
        .with_state(state)
}

fn request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %redacted_uri(request.uri()),
        version = ?request.version(),
    )
}

/// Path and query of `uri` with secret query values replaced.
fn redacted_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };
    let mut redacted = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if REDACTED_PARAMS.contains(&name.as_ref()) {
            redacted.append_pair(&name, "REDACTED");
        } else {
            redacted.append_pair(&name, &value);
        }
    }
    format!("{}?{}", uri.path(), redacted.finish())
}

/// A browser request whose `Origin` is not the relay itself.
fn is_cross_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return false;
    };
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let origin_host = origin
        .to_str()
        .ok()
        .and_then(|o| Url::parse(o).ok())
        .and_then(|o| {
            let host = o.host_str()?.to_string();
            Some(match o.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            })
        });
    match (origin_host, host) {
        (Some(origin_host), Some(host)) => !origin_host.eq_ignore_ascii_case(host),
        _ => true,
    }
}

/// Backend URL for a relayed request. Only the path and query are taken from
/// the request; the origin is always the configured backend's.
fn upstream_url(api_host: &Url, uri: &Uri) -> Option<Url> {
    let mut target = api_host.clone();
    target.set_path(uri.path());
    target.set_query(uri.query());
    (target.origin() == api_host.origin()).then_some(target)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.registry.controller() {
        Some(handle) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "worker": {
                    "version": handle.version().get(),
                    "state": handle.state(),
                },
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "no_worker",
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        ),
    }
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<RelayMessage>,
) -> Result<Response, StatusCode> {
    if is_cross_origin(&headers) {
        warn!("Rejected relay message from another origin");
        return Err(StatusCode::FORBIDDEN);
    }
    let handle = state
        .registry
        .controller()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    match message {
        RelayMessage::GetAuthToken => {
            let token = handle
                .request_token()
                .await
                .map_err(|_e| StatusCode::SERVICE_UNAVAILABLE)?;
            Ok(Json(TokenReply { token }).into_response())
        }
        message @ RelayMessage::SetAuthToken { .. } => {
            handle
                .post_message(message)
                .map_err(|_e| StatusCode::SERVICE_UNAVAILABLE)?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
    }
}

/// Forward anything else to the backend through the intercepting network.
async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(target) = upstream_url(&state.api_host, &parts.uri) else {
        return (StatusCode::BAD_REQUEST, "Invalid request path").into_response();
    };

    // Buffered so the relay can duplicate it.
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_e) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let transport = transport_from_headers(&parts.headers);
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let mut outbound = OutboundRequest::new(parts.method, target)
        .with_headers(headers)
        .with_transport(transport);
    if !bytes.is_empty() {
        outbound = outbound.with_body(bytes);
    }

    match state.network.fetch(outbound).await {
        Ok(response) => into_axum_response(response),
        Err(e) => {
            warn!(error = %e, "Upstream request failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

fn transport_from_headers(headers: &HeaderMap) -> TransportOptions {
    let mode = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_sec_fetch_mode)
        .unwrap_or_default();
    let referrer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    TransportOptions {
        mode,
        referrer,
        ..Default::default()
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Also drop whatever the Connection header nominates.
    let nominated: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in &nominated {
        headers.remove(name.as_str());
    }
}

fn into_axum_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut out = Response::new(Body::from_stream(response.bytes_stream()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out.headers_mut()
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-store"));
    out
}
