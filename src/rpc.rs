//! JSON-RPC envelope construction and response unwrapping. Pure functions,
//! no I/O; the actual POST lives in [`crate::session`].

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::{error::UntisError, session::SessionError};

/// Fixed request id the mobile clients send; the server keys some behavior
/// off it, so it is part of the wire contract.
pub(crate) const CLIENT_ID: &str = "untis-mobile-blackberry-2.7.4";
pub(crate) const JSONRPC_VERSION: &str = "2.0";
/// Protocol version carried in the `v` query parameter.
pub(crate) const API_VERSION: &str = "i5.12.3";
pub(crate) const RPC_PATH: &str = "/WebUntis/jsonrpc_intern.do";
pub(crate) const SCHOOL_SEARCH_URL: &str = "https://schoolsearch.webuntis.com/schoolquery2";
/// User-agent of a known mobile client; the server rejects unknown agents on
/// some instances.
pub(crate) const USER_AGENT: &str = "okhttp/4.11.0";
pub(crate) const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Per-request authentication payload: client timestamp, OTP placeholder and
/// user name. Built fresh for every call, never stored.
///
/// `otp` stays 0; only anonymous access is supported.
// TODO: derive a real one-time password from the app shared secret so
// credentialed users can authenticate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBlock {
    pub client_time: i64,
    pub otp: u32,
    pub user: String,
}

impl AuthBlock {
    pub fn for_user(user: &str) -> Self {
        Self {
            client_time: Utc::now().timestamp_millis(),
            otp: 0,
            user: user.to_owned(),
        }
    }
}

/// URL of the mobile JSON-RPC endpoint, with the query parameters the server
/// requires alongside the body.
pub(crate) fn endpoint_url(
    server: &str,
    school: &str,
    method: &str,
) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        &format!("https://{server}{RPC_PATH}"),
        &[
            ("school", school),
            ("m", method),
            ("a", "true"),
            ("s", server),
            ("v", API_VERSION),
        ],
    )
}

/// Builds the JSON-RPC request body.
///
/// When an auth block is given, the extra parameters are merged into the
/// same object, as siblings of the `auth` key. The live server expects
/// exactly this nesting, odd as it looks.
pub(crate) fn request_body(method: &str, params: Value, auth: Option<AuthBlock>) -> Value {
    let mut entry = Map::new();
    if let Some(auth) = auth {
        entry.insert("auth".to_owned(), json!(auth));
    }
    if let Value::Object(extra) = params {
        entry.extend(extra);
    }
    let params = if entry.is_empty() {
        Vec::new()
    } else {
        vec![Value::Object(entry)]
    };

    json!({
        "id": CLIENT_ID,
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

/// Body of the `searchSchool` call against the central school-search
/// endpoint; the only call that goes to a fixed host instead of the school's
/// server.
pub(crate) fn school_search_body(query: &str) -> Value {
    json!({
        "id": CLIENT_ID,
        "jsonrpc": JSONRPC_VERSION,
        "method": "searchSchool",
        "params": [{ "search": query }],
    })
}

/// Splits a parsed JSON-RPC response into the `result` payload or the typed
/// server error.
pub(crate) fn unwrap_response(response: Value) -> Result<Value, SessionError> {
    let mut response = match response {
        Value::Object(response) => response,
        _ => return Err(SessionError::Malformed("response body is not a JSON object")),
    };
    if let Some(error) = response.get("error") {
        return Err(UntisError::from_wire(error).into());
    }
    response
        .remove("result")
        .ok_or(SessionError::Malformed("response has neither result nor error"))
}

/// Accessor for a field the response is required to carry; shape mismatches
/// surface as [`SessionError::Malformed`] instead of panics.
pub(crate) fn field<'a>(value: &'a Value, name: &'static str) -> Result<&'a Value, SessionError> {
    value.get(name).ok_or(SessionError::Malformed(name))
}

pub(crate) fn as_array<'a>(
    value: &'a Value,
    context: &'static str,
) -> Result<&'a [Value], SessionError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or(SessionError::Malformed(context))
}
