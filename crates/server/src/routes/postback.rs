use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Query, Request, State};
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, Method, StatusCode};
use ingest::{RawPostback, RequestContext, decode_body, fields_from_pairs};
use postback::CounterReport;
use serde::Serialize;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Body of a `200` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostbackResponse {
    pub ok: bool,
    pub key: String,
    pub idempotent: bool,
    /// True only if the counters of every mirror were fully updated.
    pub subs_updated: bool,
    pub mirrors: CounterReport,
}

/// `GET|POST /postback`
///
/// Fields come from the query string and, for JSON or URL-encoded bodies,
/// from the body; body fields win on collisions.
pub async fn receive_postback(
    State(state): State<Arc<ServerState>>,
    request: Request,
) -> ServerResult<Json<PostbackResponse>> {
    let method = request.method().clone();
    if method != Method::GET && method != Method::POST {
        return Err(ServerError::MethodNotAllowed);
    }

    let query = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map_err(|rejection| ServerError::MalformedQuery(rejection.body_text()))?;
    let context = request_context(&method, request.headers(), peer_ip(&request));
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = Bytes::from_request(request, &state)
        .await
        .map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ServerError::PayloadTooLarge
            } else {
                ServerError::Internal(rejection.body_text())
            }
        })?;
    let body = decode_body(content_type.as_deref(), &bytes)?;

    let raw = RawPostback {
        query: fields_from_pairs(query.0),
        body,
        context,
    };
    let event = state.pipeline.normalize(raw);
    let accepted = state.pipeline.process(&event).await?;

    Ok(Json(PostbackResponse {
        ok: true,
        subs_updated: accepted.subs_updated(),
        key: accepted.key,
        idempotent: accepted.idempotent,
        mirrors: accepted.counters,
    }))
}

fn peer_ip(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn request_context(method: &Method, headers: &HeaderMap, peer_addr: Option<String>) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestContext {
        method: method.as_str().to_string(),
        forwarded_for: header(FORWARDED_FOR),
        peer_addr,
        user_agent: header(USER_AGENT.as_str()),
    }
}
