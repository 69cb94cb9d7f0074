//! JSON-RPC envelope encoding and inbound frame classification.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;
use crate::error::CodecError;

const JSONRPC_VERSION: &str = "2.0";

/// An encoded outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub correlation_id: u64,
    pub method: &'static str,
    /// Text frame ready for the transport.
    pub text: String,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// Successful response to a request.
    Result { correlation_id: u64, payload: Value },
    /// Error response. Venue errors about unparseable requests carry no id.
    ProtocolError {
        correlation_id: Option<u64>,
        code: i64,
        message: String,
    },
    /// Subscription notification.
    Event { channel: String, payload: Value },
    /// `heartbeat` notification; `test_request` ones must be answered.
    Heartbeat { test_request: bool },
}

#[derive(Serialize)]
struct RequestFrame<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    // `null` results are legal, so presence is tracked separately.
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawSubscription {
    channel: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RawHeartbeat {
    #[serde(rename = "type")]
    kind: String,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Encodes commands with fresh correlation ids and decodes inbound frames.
///
/// Ids are monotonic from 1 for the lifetime of the codec.
#[derive(Debug)]
pub struct ProtocolCodec {
    next_id: AtomicU64,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
        }
    }

    /// Reserve the next correlation id.
    pub fn next_correlation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Encode `command` under a fresh correlation id.
    pub fn encode(&self, command: &Command) -> Result<Envelope, CodecError> {
        Self::encode_with_id(command, self.next_correlation_id())
    }

    /// Encode `command` under a caller-chosen id. Pure.
    pub fn encode_with_id(command: &Command, correlation_id: u64) -> Result<Envelope, CodecError> {
        let method = command.method();
        let params = command
            .params()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        let text = serde_json::to_string(&RequestFrame {
            jsonrpc: JSONRPC_VERSION,
            id: correlation_id,
            method,
            params,
        })
        .map_err(|e| CodecError::Encode(e.to_string()))?;

        Ok(Envelope {
            correlation_id,
            method,
            text,
        })
    }

    /// Classify one inbound text frame.
    pub fn decode(text: &str) -> Result<DecodedMessage, CodecError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;

        if let Some(error) = raw.error {
            return Ok(DecodedMessage::ProtocolError {
                correlation_id: raw.id,
                code: error.code,
                message: error.message,
            });
        }

        if let (Some(id), Some(result)) = (raw.id, raw.result) {
            return Ok(DecodedMessage::Result {
                correlation_id: id,
                payload: result,
            });
        }

        match raw.method.as_deref() {
            Some("subscription") => {
                let params = raw
                    .params
                    .ok_or_else(|| CodecError::MalformedFrame("subscription without params".into()))?;
                let sub = RawSubscription::deserialize(params)
                    .map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
                Ok(DecodedMessage::Event {
                    channel: sub.channel,
                    payload: sub.data,
                })
            }
            Some("heartbeat") => {
                let test_request = raw
                    .params
                    .and_then(|p| RawHeartbeat::deserialize(p).ok())
                    .is_some_and(|hb| hb.kind == "test_request");
                Ok(DecodedMessage::Heartbeat { test_request })
            }
            Some(other) => Err(CodecError::MalformedFrame(format!(
                "unexpected notification method: {other}"
            ))),
            None => Err(CodecError::MalformedFrame(
                "frame has neither result, error nor method".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution_core::{InstrumentKind, OrderDraft, OrderKind, OrderSide};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_encode_envelope() {
        let codec = ProtocolCodec::new();
        let cmd = Command::Cancel {
            order_id: "ETH-1".into(),
        };

        let env = codec.encode(&cmd).unwrap();

        assert_eq!(env.correlation_id, 1);
        assert_eq!(env.method, "private/cancel");
        let v: Value = serde_json::from_str(&env.text).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 1);
        assert_eq!(v["method"], "private/cancel");
        assert_eq!(v["params"]["order_id"], "ETH-1");
    }

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let codec = ProtocolCodec::new();
        let ids: Vec<u64> = (0..5)
            .map(|_| codec.encode(&Command::Currencies).unwrap().correlation_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_encode_with_id_is_deterministic() {
        let draft = OrderDraft::new("O1", "BTC-PERPETUAL", InstrumentKind::Futures, OrderSide::Buy, OrderKind::Market, dec!(10));
        let cmd = Command::Place(draft);
        let a = ProtocolCodec::encode_with_id(&cmd, 42).unwrap();
        let b = ProtocolCodec::encode_with_id(&cmd, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.method, "private/buy");
    }

    #[test]
    fn test_decode_result() {
        let msg = ProtocolCodec::decode(r#"{"jsonrpc":"2.0","id":7,"result":{"order":{"order_id":"X"}}}"#).unwrap();
        assert_eq!(
            msg,
            DecodedMessage::Result {
                correlation_id: 7,
                payload: json!({"order": {"order_id": "X"}})
            }
        );
    }

    #[test]
    fn test_decode_null_result() {
        let msg = ProtocolCodec::decode(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(
            msg,
            DecodedMessage::Result {
                correlation_id: 3,
                payload: Value::Null
            }
        );
    }

    #[test]
    fn test_decode_error() {
        let msg = ProtocolCodec::decode(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":10009,"message":"not_enough_funds"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            DecodedMessage::ProtocolError {
                correlation_id: Some(9),
                code: 10009,
                message: "not_enough_funds".into()
            }
        );
    }

    #[test]
    fn test_decode_event() {
        let msg = ProtocolCodec::decode(
            r#"{"jsonrpc":"2.0","method":"subscription","params":{"channel":"ticker.BTC-PERPETUAL.raw","data":{"mark_price":1}}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            DecodedMessage::Event {
                channel: "ticker.BTC-PERPETUAL.raw".into(),
                payload: json!({"mark_price": 1})
            }
        );
    }

    #[test]
    fn test_decode_heartbeat() {
        let test = ProtocolCodec::decode(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"test_request"}}"#).unwrap();
        let plain = ProtocolCodec::decode(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"heartbeat"}}"#).unwrap();
        assert_eq!(test, DecodedMessage::Heartbeat { test_request: true });
        assert_eq!(plain, DecodedMessage::Heartbeat { test_request: false });
    }

    #[test]
    fn test_decode_malformed() {
        for frame in [
            "not json",
            "{}",
            r#"{"method":"subscription"}"#,
            r#"{"method":"subscription","params":{"data":1}}"#,
            r#"{"method":"mystery","params":{}}"#,
            r#"{"id":"abc","result":1}"#,
        ] {
            assert!(
                matches!(ProtocolCodec::decode(frame), Err(CodecError::MalformedFrame(_))),
                "frame should be malformed: {frame}"
            );
        }
    }
}
