//! The wire format shared between the runner and the harness running inside a sandbox.
//!
//! A stream is a sequence of UTF-8 lines. Every line is either a JSON envelope
//! (see [`Envelope`]) or, if it fails to parse as one, an unstructured line of
//! player output that callers should treat as a [`MessageType::Print`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four kinds of line a harness may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Handshake key announcement. Must be the first line on a fresh stream.
    NewKey,
    /// A structured response to a `call`/`ping`.
    Result,
    /// A line of captured player output, diverted from the protocol proper.
    Print,
    /// Stream is finished; no further envelopes follow.
    End,
}

/// One line of the wire protocol once it has been recognised as structured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new_key(key: i64) -> Self {
        Envelope { kind: MessageType::NewKey, data: Value::from(key) }
    }

    pub fn result(data: Value) -> Self {
        Envelope { kind: MessageType::Result, data }
    }

    pub fn end() -> Self {
        Envelope { kind: MessageType::End, data: Value::Null }
    }

    /// Parse one line of the stream. Lines that aren't valid JSON, or that
    /// parse but aren't an object with a recognised `type` field, are not
    /// envelopes at all: the caller should fold them into the print buffer.
    pub fn try_parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("Envelope always serialises")
    }
}

/// The discriminator carried by domain payloads so a decoder can reconstruct
/// the original Rust value out of an otherwise-untyped JSON blob.
pub const CUSTOM_TYPE_KEY: &str = "__custom_type";

/// Domain values that may appear as the `data` of a [`MessageType::Result`]
/// envelope, tagged with [`CUSTOM_TYPE_KEY`] so a decoder on either end of the
/// wire can tell them apart from a plain object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__custom_type")]
pub enum CustomValue {
    /// A `call`/`ping` request travelling runner -> harness.
    #[serde(rename = "message")]
    Message {
        method_name: String,
        #[serde(default)]
        method_args: Vec<Value>,
        #[serde(default)]
        method_kwargs: serde_json::Map<String, Value>,
    },
    /// The harness could not find the requested player function.
    #[serde(rename = "missing_function_error")]
    MissingFunctionError { function_name: String },
    /// The harness's own self-check tripped; the sandbox can no longer be trusted.
    #[serde(rename = "failsafe_error")]
    FailsafeError { reason: String },
    /// Player code raised an exception while computing a move.
    #[serde(rename = "exception_trace")]
    ExceptionTrace { traceback: String },
    /// A board encoded for a chess-family gamemode.
    #[serde(rename = "chessboard")]
    Chessboard { fen: String },
    /// A move encoded for a chess-family gamemode.
    #[serde(rename = "chess_move")]
    ChessMove { uci: String },
}

impl CustomValue {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("CustomValue always serialises")
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.get(CUSTOM_TYPE_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_a_line() {
        let env = Envelope::new_key(42);
        let line = env.to_line();
        let parsed = Envelope::try_parse(&line).unwrap();
        assert_eq!(parsed.kind, MessageType::NewKey);
        assert_eq!(parsed.data, Value::from(42));
    }

    #[test]
    fn unstructured_line_does_not_parse_as_envelope() {
        assert!(Envelope::try_parse("the player printed something").is_none());
    }

    #[test]
    fn custom_value_round_trips_message() {
        let v = CustomValue::Message {
            method_name: "make_move".into(),
            method_args: vec![Value::from(1)],
            method_kwargs: serde_json::Map::new(),
        };
        let encoded = v.to_value();
        assert_eq!(encoded.get(CUSTOM_TYPE_KEY).unwrap(), "message");
        let decoded = CustomValue::from_value(&encoded).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn missing_custom_type_is_not_a_custom_value() {
        let plain = serde_json::json!({"board": [[0,0,0]]});
        assert!(CustomValue::from_value(&plain).is_none());
    }

    #[test]
    fn custom_value_round_trips_every_variant() {
        let values = vec![
            CustomValue::MissingFunctionError { function_name: "make_move".into() },
            CustomValue::FailsafeError { reason: "writable /tmp".into() },
            CustomValue::ExceptionTrace { traceback: "Traceback...".into() },
            CustomValue::Chessboard { fen: "8/8/8/8/8/8/8/8 w - - 0 1".into() },
            CustomValue::ChessMove { uci: "e2e4".into() },
        ];
        for v in values {
            let decoded = CustomValue::from_value(&v.to_value()).unwrap();
            assert_eq!(decoded, v);
        }
    }
}
