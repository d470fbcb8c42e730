//! The API entry point: classify, decide local vs forward, drive it.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crest_core::node::epoch_secs;
use crest_services::SecretKind;

use crate::proxy::{self, ForwardError};
use crate::registry::{ApiHandler, Lookup, QueryParams};
use crate::{responses, ApiState};

/// Handle one API request.
///
/// Everything that can be rejected is rejected before any downstream
/// state is built: origin check, request-type parse, registry lookup,
/// secret pre-check. Only then is the forwarding decision made.
pub async fn handle(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    if !state.access.is_allowed(addr.ip()) {
        return local_json(responses::not_allowed());
    }

    let params = parse_query(req.uri().query());

    let request_type = match params.get("requestType") {
        Some(rt) if !rt.is_empty() => rt.to_string(),
        _ => return local_json(responses::missing_request_type()),
    };

    let handler = match state.registry.lookup(&request_type) {
        Lookup::Found(handler) => handler,
        Lookup::Disabled => return local_json(responses::disabled()),
        Lookup::Unknown => return local_json(responses::incorrect_request()),
    };

    // Secrets ride in query strings too, not only bodies. Reject on the
    // literal parameter name before anything leaves this node.
    for kind in SecretKind::ALL {
        if params.get(kind.param()).is_some() {
            return local_json(responses::secret_detected(kind));
        }
    }

    if state.node.proxy_active() && handler.forwardable(&request_type) {
        forward(state.clone(), handler, &request_type, &params, req).await
    } else {
        local_json((handler.run)(&state, &params))
    }
}

async fn forward(
    state: ApiState,
    handler: &ApiHandler,
    request_type: &str,
    params: &QueryParams,
    req: Request,
) -> Response {
    let query = req.uri().query().map(str::to_owned);

    let forced_url = &state.config.proxy.forced_server_url;
    let (target, peer) = if !forced_url.is_empty() {
        (proxy::forced_target(forced_url, query.as_deref()), None)
    } else {
        match state.selector.serving_peer(request_type, epoch_secs()) {
            Some(peer) => (proxy::remote_target(&peer, query.as_deref()), Some(peer)),
            None if state.node.is_light_client() => {
                // A light client has nothing to fall back on.
                return local_json(responses::no_open_api_peers());
            }
            None => return local_json((handler.run)(&state, params)),
        }
    };

    tracing::debug!(request_type, remote = %target, "forwarding API request");

    match proxy::forward(&state.client, &state.selector, &target, peer.as_ref(), req).await {
        Ok(response) => response,
        Err(ForwardError::SecretDetected(kind)) => {
            tracing::warn!(request_type, secret = %kind, "forward aborted, secret in request body");
            local_json(responses::secret_detected(kind))
        }
        Err(ForwardError::Transport(e)) => {
            tracing::warn!(request_type, remote = %target, error = %e, "forward failed");
            (StatusCode::BAD_GATEWAY, Json(responses::proxy_failure())).into_response()
        }
    }
}

/// Local rejections and locally served answers are HTTP 200 with a JSON
/// body; clients switch on `errorCode`.
fn local_json(value: Value) -> Response {
    Json(value).into_response()
}

/// Decode the query string, keeping the first value per name.
fn parse_query(query: Option<&str>) -> QueryParams {
    let mut params: HashMap<String, String> = HashMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    QueryParams(params)
}
