// Socket.IO frame codec - Engine.IO v4 / Socket.IO v5 text packets
use crate::application::connection_manager::InboundEvent;
use crate::domain::device::{PumpStatus, ValveStatus};
use crate::domain::error::{ConnectionError, RenderError};
use crate::domain::sample::{Sample, parse_timestamp};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Namespace connect request for the default namespace.
pub const CONNECT_DEFAULT_NAMESPACE: &str = "40";

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO open, carries the handshake JSON
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    /// Socket.IO namespace connect acknowledged
    Connect,
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
    Noop,
}

/// Engine.IO v4 server defaults, used when the open packet omits them.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Silence tolerated before the open packet has told us the real timers.
pub const DEFAULT_LIVENESS: Duration = Duration::from_millis(DEFAULT_PING_INTERVAL_MS + DEFAULT_PING_TIMEOUT_MS);

/// Handshake JSON of the Engine.IO open packet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInfo {
    #[serde(default = "default_ping_interval")]
    ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

/// Longest silence tolerated before the peer counts as gone: the server
/// pings every `pingInterval` and waits `pingTimeout` for the pong.
pub fn liveness_window(open: &str) -> Duration {
    let (interval, timeout) = match serde_json::from_str::<OpenInfo>(open) {
        Ok(info) => (info.ping_interval, info.ping_timeout),
        Err(error) => {
            tracing::debug!("Unreadable open packet, using default ping timers: {}", error);
            (DEFAULT_PING_INTERVAL_MS, DEFAULT_PING_TIMEOUT_MS)
        }
    };
    Duration::from_millis(interval.saturating_add(timeout))
}

/// `vial_update` payload as the backend emits it.
#[derive(Debug, Deserialize)]
struct VialUpdate {
    vial: u32,
    od: f64,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    drug_concentration: Option<f64>,
    #[serde(default)]
    growth_rate: Option<f64>,
    timestamp: String,
}

pub fn decode(frame: &str) -> Result<Packet, ConnectionError> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ConnectionError::Protocol("empty frame".to_string()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(rest.to_string())),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(rest.to_string())),
        '3' => Ok(Packet::Pong(rest.to_string())),
        '4' => decode_message(rest),
        '6' => Ok(Packet::Noop),
        other => Err(ConnectionError::Protocol(format!(
            "unknown engine.io packet type {:?}",
            other
        ))),
    }
}

fn decode_message(body: &str) -> Result<Packet, ConnectionError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ConnectionError::Protocol("empty socket.io packet".to_string()))?;
    let rest = strip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // optional ack id before the payload
            let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items: Vec<Value> = serde_json::from_str(payload)
                .map_err(|e| ConnectionError::Protocol(format!("bad event payload: {}", e)))?;
            if items.is_empty() {
                return Err(ConnectionError::Protocol("event without a name".to_string()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(ConnectionError::Protocol(format!("event name is not a string: {}", other)));
                }
            };
            let data = if items.is_empty() { Value::Null } else { items.remove(0) };
            Ok(Packet::Event { name, data })
        }
        '4' => Ok(Packet::ConnectError(rest.to_string())),
        other => Err(ConnectionError::Protocol(format!(
            "unsupported socket.io packet type {:?}",
            other
        ))),
    }
}

/// Drop a `/namespace,` prefix.
fn strip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(index) => &rest[index + 1..],
            None => "",
        }
    } else {
        rest
    }
}

pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}

/// Map an event to what the monitor consumes. `None` for events it ignores.
pub fn decode_event(name: &str, data: Value) -> Option<Result<InboundEvent, RenderError>> {
    match name {
        "vial_update" => Some(payload::<VialUpdate>(name, data).and_then(|update| {
            let timestamp = parse_timestamp(&update.timestamp)?;
            let sample = Sample::new(update.vial, timestamp, update.od)?
                .with_temperature(update.temperature)
                .with_drug_concentration(update.drug_concentration)
                .with_growth_rate(update.growth_rate);
            Ok(InboundEvent::VialUpdate(sample))
        })),
        "pump_status" => Some(payload::<PumpStatus>(name, data).map(InboundEvent::PumpStatus)),
        "valve_status" => Some(payload::<ValveStatus>(name, data).map(InboundEvent::ValveStatus)),
        _ => None,
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, RenderError> {
    serde_json::from_value(data).map_err(|e| RenderError::MalformedPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}
