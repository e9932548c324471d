//! HTTP API handlers

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::{debug, error};

use super::routes::{parse_route, Endpoint, Scope};
use super::State;
use crate::auth::AuthError;
use crate::hub::Hub;
use crate::protocol::{self, Outbound};
use crate::session::{process, Origin};
use crate::transport;

type HttpResponse = Response<Full<Bytes>>;

pub(super) async fn handle(
    req: Request<Incoming>,
    state: Arc<State>,
    peer: SocketAddr,
) -> Result<HttpResponse, Infallible> {
    let Some(route) = parse_route(req.uri().path()) else {
        return Ok(reply(StatusCode::NOT_FOUND, &Outbound::err("not found")));
    };
    if let Some(m) = state.metrics.as_ref() {
        m.http_request(route.endpoint.as_str());
    }

    let method = req.method().clone();
    let response = match (route.endpoint, &method) {
        (Endpoint::Index, &Method::GET) => index(),
        (Endpoint::Metrics, &Method::GET) => metrics(&state),
        (Endpoint::Ws, &Method::GET) => upgrade(req, &state, route.scope, peer),
        (Endpoint::Status, &Method::GET)
        | (Endpoint::Http, &Method::GET)
        | (Endpoint::Http, &Method::POST) => {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let hub = match state.resolve(route.scope, authorization) {
                Ok(hub) => hub,
                Err(e) => return Ok(unauthorized(e)),
            };

            if route.endpoint == Endpoint::Status {
                reply(StatusCode::OK, &Outbound::ok(hub.status()))
            } else if method == Method::GET {
                let query = req.uri().query();
                drain(&hub, query, state.config.hub.default_drain_amount)
            } else {
                publish(&hub, req.into_body(), state.config.server.max_body_size).await
            }
        }
        _ => reply(
            StatusCode::METHOD_NOT_ALLOWED,
            &Outbound::err("method not allowed"),
        ),
    };
    Ok(response)
}

/// `GET {prefix}/ws`: switch the connection to WebSocket and attach a session
fn upgrade(
    mut req: Request<Incoming>,
    state: &State,
    scope: Scope,
    peer: SocketAddr,
) -> HttpResponse {
    let Some(accept) = websocket_accept(req.headers()) else {
        return reply(
            StatusCode::UPGRADE_REQUIRED,
            &Outbound::err("expected WebSocket upgrade"),
        );
    };
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let hub = match state.resolve(scope, authorization) {
        Ok(hub) => hub,
        Err(e) => return unauthorized(e),
    };
    let Ok(accept) = HeaderValue::from_str(&accept) else {
        return reply(
            StatusCode::BAD_REQUEST,
            &Outbound::err("invalid Sec-WebSocket-Key"),
        );
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let (source, sink) = transport::accept_upgraded(TokioIo::new(upgraded)).await;
                super::start_session(hub, source, sink, peer).await;
            }
            Err(e) => debug!("WebSocket upgrade from {} failed: {}", peer, e),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    response
}

/// `Sec-WebSocket-Accept` for a well-formed version 13 upgrade request
fn websocket_accept(headers: &HeaderMap) -> Option<String> {
    if !has_token(headers, header::UPGRADE, "websocket")
        || !has_token(headers, header::CONNECTION, "upgrade")
    {
        return None;
    }
    if headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .map(|v| v.as_bytes())
        != Some(b"13".as_slice())
    {
        return None;
    }
    headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
}

/// Whether a comma-separated header lists `token` (case-insensitive)
fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn index() -> HttpResponse {
    let document = json!({
        "status": "service is healthy",
        "version": env!("CARGO_PKG_VERSION"),
    });
    reply(StatusCode::OK, &Outbound::ok(document))
}

fn metrics(state: &State) -> HttpResponse {
    let Some(metrics) = state.metrics.as_ref() else {
        return reply(StatusCode::NOT_FOUND, &Outbound::err("metrics are disabled"));
    };
    match metrics.encode() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                &Outbound::err("failed to encode metrics"),
            )
        }
    }
}

/// `GET {prefix}/http?topic=<t>&amount=<n>`
fn drain(hub: &Hub, query: Option<&str>, default_amount: usize) -> HttpResponse {
    let mut topic = None;
    let mut amount = None;
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match key.as_ref() {
            "topic" => topic = Some(value.into_owned()),
            "amount" => amount = Some(value.into_owned()),
            _ => {}
        }
    }

    let Some(topic) = topic.filter(|t| !t.is_empty()) else {
        return reply(StatusCode::BAD_REQUEST, &Outbound::err("missing topic"));
    };
    let amount = match amount {
        None => default_amount,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) => n,
            Err(e) => {
                return reply(
                    StatusCode::BAD_REQUEST,
                    &Outbound::err(format!("invalid amount {:?}: {}", raw, e)),
                )
            }
        },
    };

    reply(StatusCode::OK, &Outbound::ok(hub.drain(&topic, amount)))
}

/// `POST {prefix}/http` with a request document as the body
async fn publish(hub: &Hub, body: Incoming, limit: usize) -> HttpResponse {
    let raw = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return reply(
                StatusCode::PAYLOAD_TOO_LARGE,
                &Outbound::err(format!("request body exceeds {} bytes", limit)),
            );
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return reply(
                StatusCode::BAD_REQUEST,
                &Outbound::err(format!("failed to read request body: {}", e)),
            );
        }
    };

    let result = match protocol::Request::decode(&raw) {
        Ok(request) => process(request, Origin::Http(hub)).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(text) => reply(StatusCode::OK, &Outbound::ok(text)),
        Err(e) => {
            debug!("HTTP publish rejected: {}", e);
            reply(StatusCode::BAD_REQUEST, &Outbound::err(e))
        }
    }
}

fn unauthorized(e: AuthError) -> HttpResponse {
    let mut response = reply(StatusCode::UNAUTHORIZED, &Outbound::err(&e));
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"msghub\""),
    );
    response
}

/// Serialize a RESPONSE frame as the JSON body
fn reply(status: StatusCode, body: &Outbound<'_>) -> HttpResponse {
    let (status, content_type, body) = match body.encode() {
        Ok(json) => (status, "application/json", Bytes::from(json)),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                Bytes::from_static(b"internal error"),
            )
        }
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
