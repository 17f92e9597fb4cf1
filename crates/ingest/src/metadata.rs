//! Receipt metadata attached to every normalized postback.
use serde_json::Value;

use crate::types::{RequestContext, RequestMeta};

/// Builds the `_meta` block for a request.
///
/// The client IP prefers the `X-Forwarded-For` header over the peer address.
/// `received_at` is supplied by the caller and is expected to be the store's
/// server-timestamp placeholder (or a local clock reading when the store has
/// none), never a client-supplied time.
pub(crate) fn build_meta(ctx: &RequestContext, received_at: Value) -> RequestMeta {
    let ip = non_empty(ctx.forwarded_for.as_deref())
        .or_else(|| non_empty(ctx.peer_addr.as_deref()));

    RequestMeta {
        ip,
        user_agent: non_empty(ctx.user_agent.as_deref()),
        method: ctx.method.clone(),
        received_at,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
