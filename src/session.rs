use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::NaiveDate;
use hyper::{body, client::connect::Connect, header, Body, Client, Method, Request};
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use url::Url;

use crate::{
    error::UntisError,
    rpc::{self, AuthBlock},
    timetable::ElementType,
    week::DATE_FORMAT,
};

/// Username sentinel for schools that allow public timetable access.
pub const ANONYMOUS_USER: &str = "#anonymous#";

const MOBILE_DATA_PATH: &str = "/WebUntis/api/rest/view/v1/mobile/data";

/// One connection to a school's Untis server: host, school login and
/// credentials, plus the HTTP client all calls go through.
///
/// Calls are sequential request/response with no retry; a failed call
/// surfaces immediately as a [`SessionError`]. Not designed for concurrent
/// use without external synchronization.
pub struct Session<T> {
    client: Client<T, Body>,
    server: String,
    school: String,
    username: String,
    password: String,
}

impl<T> Session<T> {
    /// Anonymous session against `school` on `server`.
    pub fn new(
        client: Client<T, Body>,
        server: impl Into<String>,
        school: impl Into<String>,
    ) -> Self {
        Self::with_credentials(client, server, school, ANONYMOUS_USER, "")
    }

    pub fn with_credentials(
        client: Client<T, Body>,
        server: impl Into<String>,
        school: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            server: server.into(),
            school: school.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn school(&self) -> &str {
        &self.school
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl<T> Session<T>
where
    T: Connect + Clone + Send + Sync + 'static,
{
    /// Issues one JSON-RPC call and returns the raw `result` payload.
    ///
    /// `auth` is true for everything except the handful of
    /// pre-authentication calls (`getAppInfo`, `getVersion`,
    /// `getAppSharedSecret`).
    pub async fn rpc(&self, method: &str, params: Value, auth: bool) -> Result<Value, SessionError> {
        let url = rpc::endpoint_url(&self.server, &self.school, method)?;
        let auth = auth.then(|| AuthBlock::for_user(&self.username));
        let body = rpc::request_body(method, params, auth);
        debug!("rpc {method} against {}", self.server);
        self.post_json(url, &body)
            .await
            .and_then(rpc::unwrap_response)
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value, SessionError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, rpc::CONTENT_TYPE)
            .header(header::USER_AGENT, rpc::USER_AGENT)
            .body(Body::from(serde_json::to_vec(body)?))?;
        let response = self.client.request(request).await?;
        let bytes = body::to_bytes(response.into_body()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Looks up schools on the central search endpoint. The school's own
    /// server is not involved; this works before any authentication.
    pub async fn search_school(&self, query: &str) -> Result<Vec<SchoolInfo>, SessionError> {
        let url = Url::parse(rpc::SCHOOL_SEARCH_URL)?;
        let response = self.post_json(url, &rpc::school_search_body(query)).await?;
        let result = rpc::unwrap_response(response)?;
        let schools = rpc::as_array(rpc::field(&result, "schools")?, "schools")?;
        schools
            .iter()
            .map(|school| {
                serde_json::from_value(school.clone())
                    .map_err(|_| SessionError::Malformed("school entry"))
            })
            .collect()
    }

    pub async fn get_user_data(&self) -> Result<Value, SessionError> {
        let params = json!({
            "deviceOs": "AND",
            "deviceOsVersion": "Android13 API 33",
            "elementId": 0,
        });
        self.rpc("getUserData2017", params, true).await
    }

    /// Raw timetable between two dates for one element (class, student,
    /// ...). The zeroed timestamps ask for a full payload instead of a
    /// delta.
    pub async fn get_timetable(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        id: &str,
        kind: &ElementType,
    ) -> Result<Value, SessionError> {
        let params = json!({
            "startDate": start.format(DATE_FORMAT).to_string(),
            "endDate": end.format(DATE_FORMAT).to_string(),
            "id": id,
            "type": kind.as_tag(),
            "masterDataTimestamp": 0,
            "timetableTimestamp": 0,
            "timetableTimestamps": [0, 0, 0, 0, 0, 0, 0],
        });
        self.rpc("getTimetable2017", params, true).await
    }

    pub async fn get_exams(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        id: &str,
        kind: &ElementType,
    ) -> Result<Value, SessionError> {
        self.rpc("getExams2017", range_params(start, end, id, kind), true)
            .await
    }

    pub async fn get_homework(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        id: &str,
        kind: &ElementType,
    ) -> Result<Value, SessionError> {
        self.rpc("getHomeWork2017", range_params(start, end, id, kind), true)
            .await
    }

    pub async fn get_messages_of_day(&self, date: NaiveDate) -> Result<Value, SessionError> {
        let params = json!({ "date": date.format(DATE_FORMAT).to_string() });
        self.rpc("getMessagesOfDay2017", params, true).await
    }

    /// The school's display colors, keyed by entry type.
    pub async fn get_colors(&self) -> Result<Map<String, Value>, SessionError> {
        let result = self.rpc("getColors2017", Value::Null, true).await?;
        reshape_colors(&result)
    }

    /// Shared secret for OTP generation. Pre-authentication call.
    pub async fn get_app_shared_secret(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Value, SessionError> {
        let params = json!({ "username": username, "password": password });
        self.rpc("getAppSharedSecret", params, false).await
    }

    pub async fn get_app_info(&self) -> Result<Value, SessionError> {
        self.rpc("getAppInfo", Value::Null, false).await
    }

    pub async fn get_version(&self) -> Result<Value, SessionError> {
        self.rpc("getVersion", Value::Null, false).await
    }

    /// Payload of the mobile REST view, outside the JSON-RPC surface.
    pub async fn mobile_data(&self) -> Result<Value, SessionError> {
        self.rest_get(MOBILE_DATA_PATH).await
    }

    // The REST views authenticate a school differently: the login name goes
    // base64-encoded into a header instead of the RPC auth block.
    async fn rest_get(&self, path: &str) -> Result<Value, SessionError> {
        let url = Url::parse_with_params(
            &format!("https://{}{path}", self.server),
            &[("school", self.school.as_str())],
        )?;
        debug!("rest get {path} against {}", self.server);
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(
                "anonymous-school-base64",
                base64.encode(self.school.as_bytes()),
            )
            .header(header::USER_AGENT, "android")
            .body(Body::empty())?;
        let response = self.client.request(request).await?;
        let bytes = body::to_bytes(response.into_body()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn range_params(start: NaiveDate, end: NaiveDate, id: &str, kind: &ElementType) -> Value {
    json!({
        "startDate": start.format(DATE_FORMAT).to_string(),
        "endDate": end.format(DATE_FORMAT).to_string(),
        "id": id,
        "type": kind.as_tag(),
    })
}

fn reshape_colors(result: &Value) -> Result<Map<String, Value>, SessionError> {
    let entries = rpc::as_array(rpc::field(result, "appcolors")?, "appcolors")?;
    let mut colors = Map::new();
    for entry in entries {
        let entry = entry
            .as_object()
            .ok_or(SessionError::Malformed("appcolors entry"))?;
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SessionError::Malformed("appcolors entry type"))?;
        let rest: Map<String, Value> = entry
            .iter()
            .filter(|(key, _)| *key != "type")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        colors.insert(kind.to_owned(), Value::Object(rest));
    }
    Ok(colors)
}

/// One school as returned by the central search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolInfo {
    pub server: String,
    pub login_name: String,
    pub display_name: String,
    #[serde(default)]
    pub address: String,
    pub school_id: i64,
}

/// Errors raised while issuing a call. Transport and parse failures are kept
/// apart from [`SessionError::Server`] so callers can tell "the server
/// rejected this" from "the server could not be reached or understood".
#[derive(Debug, Error)]
pub enum SessionError {
    /// An argument to build the HTTP request was invalid.
    #[error("an argument while building an HTTP request was invalid")]
    MalformedHttpArgs(#[from] hyper::http::Error),
    /// Failed to send the HTTP request.
    #[error("failed to send HTTP request")]
    HttpRequestFailed(#[from] hyper::Error),
    /// The endpoint URL could not be built.
    #[error("could not build the endpoint URL")]
    MalformedUrl(#[from] url::ParseError),
    /// The body could not be serialized or the response was not valid JSON.
    #[error("request or response body is not valid JSON")]
    InvalidJson(#[from] serde_json::Error),
    /// The server reported an application-level error.
    #[error(transparent)]
    Server(#[from] UntisError),
    /// The response parsed as JSON but not in the shape the call expects.
    #[error("malformed server response: missing or mistyped `{0}`")]
    Malformed(&'static str),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn colors_are_keyed_by_entry_type() {
        let result = json!({
            "appcolors": [
                { "type": "EXAM", "foreColor": "000000", "backColor": "ffd700" },
                { "type": "CANCELLED", "foreColor": "ffffff", "backColor": "b22222" },
            ],
        });
        let colors = reshape_colors(&result).unwrap();
        assert_eq!(colors.len(), 2);
        assert_eq!(colors["EXAM"]["backColor"], "ffd700");
        assert_eq!(colors["CANCELLED"]["foreColor"], "ffffff");
        // The type key is folded into the map key.
        assert!(colors["EXAM"].get("type").is_none());
    }

    #[test]
    fn colors_without_the_expected_shape_are_malformed() {
        assert!(matches!(
            reshape_colors(&json!({ "appcolors": "nope" })),
            Err(SessionError::Malformed(_))
        ));
        assert!(matches!(
            reshape_colors(&json!({})),
            Err(SessionError::Malformed(_))
        ));
    }

    #[test]
    fn school_info_deserializes_from_a_search_entry() {
        let info: SchoolInfo = serde_json::from_value(json!({
            "server": "melpomene.webuntis.com",
            "loginName": "gym-musterstadt",
            "displayName": "Gymnasium Musterstadt",
            "address": "Schulstr. 1, 12345 Musterstadt",
            "schoolId": 7001400,
            "mobileServiceUrl": "ignored",
        }))
        .unwrap();
        assert_eq!(info.server, "melpomene.webuntis.com");
        assert_eq!(info.login_name, "gym-musterstadt");
        assert_eq!(info.school_id, 7001400);
    }
}
