//! JSON-RPC over HTTP(S) transport.
//!
//! Calls are POSTed to `<url>/jsonrpc` as JSON-RPC 2.0 requests. A fault
//! comes back as `{"error": {"message": NAME, "data": [params...]}}`; older
//! servers answer with the XML-RPC style status struct inside `result`,
//! which is accepted too.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use tracing::{debug, instrument, warn};

use crate::error::{Result, XenApiError};
use crate::transport::{Envelope, Transport};
use crate::wire::{format_datetime, WireValue};

/// Connection settings for [`JsonRpcTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the pool master, e.g. `https://xen01.lab.local`
    pub url: String,

    /// Upper bound for one call. Long polls (`event.from`) get their own
    /// timeout added on top.
    pub request_timeout_secs: u64,

    pub connect_timeout_secs: u64,

    /// Skip certificate validation (self-signed lab hosts)
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost".to_string(),
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            accept_invalid_certs: false,
        }
    }
}

/// [`Transport`] speaking JSON-RPC to a real server.
pub struct JsonRpcTransport {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| XenApiError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint_for(&config.url),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Timeout for one request. `event.from` blocks server side for up to
    /// its own timeout argument, which must not cut the request short.
    fn timeout_for(&self, method: &str, args: &[WireValue]) -> Duration {
        let long_poll = match (method, args.get(3)) {
            ("event.from", Some(WireValue::Double(secs))) => {
                Duration::try_from_secs_f64(*secs).unwrap_or(Duration::ZERO)
            }
            _ => Duration::ZERO,
        };
        self.request_timeout + long_poll
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    #[instrument(skip_all, fields(method = %method, endpoint = %self.endpoint))]
    async fn execute(&self, method: &str, args: Vec<WireValue>) -> Result<Envelope> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timeout = self.timeout_for(method, &args);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": args.iter().map(to_json).collect::<Vec<_>>(),
            "id": id,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| XenApiError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Server rejected request");
            return Err(XenApiError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| XenApiError::BadServerResponse(format!("Invalid JSON body: {}", e)))?;
        debug!(id, "Response received");
        parse_response(&body)
    }
}

fn endpoint_for(url: &str) -> String {
    let base = url.trim_end_matches('/');
    if base.ends_with("/jsonrpc") {
        base.to_string()
    } else {
        format!("{}/jsonrpc", base)
    }
}

/// Interpret a JSON-RPC response body.
pub fn parse_response(body: &Value) -> Result<Envelope> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let name = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("INTERNAL_ERROR")
            .to_string();
        let params: Vec<String> = match error.get("data") {
            Some(Value::Array(items)) => items.iter().map(json_to_string).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![json_to_string(other)],
        };
        return Ok(Envelope::Failure(std::iter::once(name).chain(params).collect()));
    }

    let result = body
        .get("result")
        .ok_or_else(|| XenApiError::BadServerResponse(format!("Missing result in {}", body)))?;
    let value = from_json(result);
    if value.get("Status").is_some() {
        Envelope::from_status_struct(&value)
    } else {
        Ok(Envelope::Success(value))
    }
}

fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wire value to JSON. Datetimes become their compact string form.
pub fn to_json(value: &WireValue) -> Value {
    match value {
        WireValue::Nil => Value::Null,
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Int(i) => Value::Number((*i).into()),
        WireValue::Double(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::DateTime(dt) => Value::String(format_datetime(dt)),
        WireValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        WireValue::Struct(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// JSON to wire value. Integral numbers become `Int`, others `Double`.
pub fn from_json(value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Nil,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => WireValue::Int(i),
            None => WireValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => WireValue::String(s.clone()),
        Value::Array(items) => WireValue::Array(items.iter().map(from_json).collect()),
        Value::Object(fields) => WireValue::Struct(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_datetime_sent_as_compact_string() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 31, 8, 15, 0).unwrap();
        assert_eq!(to_json(&WireValue::DateTime(dt)), json!("20240131T08:15:00Z"));
    }

    #[test]
    fn test_numbers_keep_their_kind() {
        assert_eq!(from_json(&json!(3)), WireValue::Int(3));
        assert_eq!(from_json(&json!(0.5)), WireValue::Double(0.5));
        assert_eq!(to_json(&WireValue::Double(f64::NAN)), Value::Null);
    }

    #[test]
    fn test_struct_conversion() {
        let wire = WireValue::structure([
            ("name_label", WireValue::from("web")),
            ("tags", WireValue::Array(vec!["prod".into()])),
            ("affinity", WireValue::Nil),
        ]);
        let value = to_json(&wire);
        assert_eq!(value, json!({"name_label": "web", "tags": ["prod"], "affinity": null}));
        assert_eq!(from_json(&value), wire);
    }

    #[test]
    fn test_parse_success() {
        let body = json!({"jsonrpc": "2.0", "result": ["OpaqueRef:a"], "id": 1});
        assert_eq!(
            parse_response(&body).unwrap(),
            Envelope::Success(WireValue::Array(vec!["OpaqueRef:a".into()]))
        );
    }

    #[test]
    fn test_parse_fault() {
        let body = json!({
            "jsonrpc": "2.0",
            "error": {"code": 1, "message": "HANDLE_INVALID", "data": ["VM", "OpaqueRef:x"]},
            "id": 1
        });
        assert_eq!(
            parse_response(&body).unwrap(),
            Envelope::Failure(vec![
                "HANDLE_INVALID".to_string(),
                "VM".to_string(),
                "OpaqueRef:x".to_string()
            ])
        );
    }

    #[test]
    fn test_parse_status_struct_result() {
        let body = json!({
            "result": {"Status": "Failure", "ErrorDescription": ["SESSION_INVALID", "OpaqueRef:s"]},
            "id": 1
        });
        assert!(matches!(parse_response(&body).unwrap(), Envelope::Failure(d) if d[0] == "SESSION_INVALID"));
    }

    #[test]
    fn test_missing_result() {
        assert!(matches!(
            parse_response(&json!({"id": 1})),
            Err(XenApiError::BadServerResponse(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(endpoint_for("https://xen01/"), "https://xen01/jsonrpc");
        assert_eq!(endpoint_for("https://xen01/jsonrpc"), "https://xen01/jsonrpc");
    }

    #[test]
    fn test_long_poll_extends_timeout() {
        let transport = JsonRpcTransport::new(&ClientConfig::default()).unwrap();
        let args = vec![
            WireValue::from("OpaqueRef:s"),
            WireValue::Array(vec!["VM".into()]),
            WireValue::from(""),
            WireValue::Double(30.0),
        ];
        assert_eq!(transport.timeout_for("event.from", &args), Duration::from_secs(90));
        assert_eq!(transport.timeout_for("VM.get_all", &args[..1]), Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_yaml() {
        let config: ClientConfig = serde_yaml::from_str(
            "url: https://xen01.lab.local\naccept_invalid_certs: true\n",
        )
        .unwrap();
        assert_eq!(config.url, "https://xen01.lab.local");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.request_timeout_secs, 60);
    }
}
