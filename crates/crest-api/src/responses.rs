//! JSON error catalogue for the API surface.
//!
//! Every local rejection answers HTTP 200 with a numbered error body, so
//! API clients can switch on `errorCode` without caring about transport
//! status. The one exception is a failed forward, which is a transport
//! problem and answers 502.

use serde_json::{json, Value};

use crest_services::SecretKind;

pub fn not_allowed() -> Value {
    error(7, "Not allowed")
}

pub fn incorrect_request() -> Value {
    error(1, "Incorrect request")
}

pub fn disabled() -> Value {
    error(16, "This API has been disabled")
}

pub fn missing_request_type() -> Value {
    error(17, "The requestType parameter is missing from the query string")
}

pub fn secret_detected(kind: SecretKind) -> Value {
    let code = match kind {
        SecretKind::SecretPhrase => 18,
        SecretKind::AdminPassword => 19,
        SecretKind::SharedKey => 20,
    };
    error(
        code,
        format!("{} parameter detected, the request will not be forwarded", kind.param()),
    )
}

pub fn no_open_api_peers() -> Value {
    error(21, "No openAPI peers found")
}

pub fn proxy_failure() -> Value {
    error(22, "Request forwarding to a remote peer failed")
}

pub fn blockchain_unavailable() -> Value {
    error(23, "Blockchain state is not available on this node yet")
}

fn error(code: u32, description: impl Into<String>) -> Value {
    json!({
        "errorCode": code,
        "errorDescription": description.into(),
    })
}
