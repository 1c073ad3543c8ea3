//! Wire protocol of the panel's console websocket.

use panel_bridge_core::config::PanelConfig;
use panel_bridge_core::types::ServerStatus;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::client::StreamError;

/// Typed frames the panel sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PanelMessage {
    /// A console line (string or wrapped object).
    Console {
        #[serde(default)]
        data: Value,
    },
    /// A batch of console lines; older panels use `data` instead of `logs`.
    Logs {
        #[serde(default)]
        logs: Option<Vec<Value>>,
        #[serde(default)]
        data: Option<Vec<Value>>,
    },
    /// Process status update.
    Status {
        #[serde(default)]
        data: Value,
    },
    /// Server-side error report.
    Error {
        #[serde(default)]
        message: String,
    },
}

/// One parsed websocket text frame.
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// Console lines, in receipt order.
    Lines(Vec<String>),
    /// A process status update.
    Status(ServerStatus),
    /// A server-reported error (informational; the connection stays up).
    Error(String),
    /// A frame kind this client does not consume.
    Ignored,
}

/// Classify a raw text frame.
///
/// Non-JSON frames are raw console output and become a single line; JSON
/// frames with an unknown `type` are ignored.
#[must_use]
pub fn parse_frame(raw: &str) -> Frame {
    match serde_json::from_str::<PanelMessage>(raw) {
        Ok(PanelMessage::Console { data }) => match extract_text(&data) {
            Some(line) => Frame::Lines(vec![line]),
            None => Frame::Ignored,
        },
        Ok(PanelMessage::Logs { logs, data }) => {
            let entries = logs.or(data).unwrap_or_default();
            let lines: Vec<String> = entries.iter().filter_map(extract_text).collect();
            if lines.is_empty() {
                Frame::Ignored
            } else {
                Frame::Lines(lines)
            }
        }
        Ok(PanelMessage::Status { data }) => match data.get("running").and_then(Value::as_bool) {
            Some(true) => Frame::Status(ServerStatus::Running),
            Some(false) => Frame::Status(ServerStatus::Stopped),
            None => Frame::Ignored,
        },
        Ok(PanelMessage::Error { message }) => Frame::Error(message),
        Err(_) => {
            if serde_json::from_str::<Value>(raw).is_ok() {
                Frame::Ignored
            } else {
                Frame::Lines(vec![raw.to_owned()])
            }
        }
    }
}

/// Pull the line text out of the panel's assorted payload shapes.
fn extract_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            for key in ["message", "msg", "log", "line", "text", "data"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return Some(s.clone());
                }
            }
            Some(value.to_string())
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Console socket URL for the configured server, with the token as a query
/// parameter (the panel authenticates the upgrade from it).
pub fn socket_url(panel: &PanelConfig, token: &str) -> Result<Url, StreamError> {
    let mut url =
        Url::parse(panel.base()).map_err(|e| StreamError::Endpoint(e.to_string()))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(StreamError::Endpoint(format!(
                "unsupported scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| StreamError::Endpoint("scheme rejected".into()))?;
    url.set_path(&format!("/proxy/daemon/socket/{}", panel.server_id));
    url.query_pairs_mut().clear().append_pair("token", token);

    Ok(url)
}
