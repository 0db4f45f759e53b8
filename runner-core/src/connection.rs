//! Framing a raw duplex line stream (the sandbox's stdio) into the message
//! protocol: a keyed handshake, `call`/`ping` request-response pairs, and a
//! side buffer for anything the peer printed outside the protocol.

use async_trait::async_trait;
use protocol::{CustomValue, Envelope, MessageType};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ConnectionError;

/// The raw duplex byte transport a [`Connection`] frames. Implemented once
/// against a real sandbox's stdio and once against an in-memory script for
/// tests.
#[async_trait]
pub trait LineStream: Send {
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError>;
    /// Reads one line. `Ok(None)` signals a clean EOF.
    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Done,
}

/// A handshaken, framed connection to one player's sandbox.
pub struct Connection<S: LineStream> {
    stream: S,
    state: State,
    prints: Vec<String>,
}

impl<S: LineStream> Connection<S> {
    /// Performs the keyed handshake and returns a ready-to-use connection.
    ///
    /// Sends our own key immediately, then reads lines until the peer's key
    /// arrives. Anything read before that point is not discarded: it is
    /// reclassified as player output, since a harness is free to `print()`
    /// before the runtime takes over stdout.
    pub async fn handshake(mut stream: S) -> Result<Self, ConnectionError> {
        let key: i64 = rand::rng().random();
        stream.write_line(&Envelope::new_key(key).to_line()).await?;

        let mut prints = Vec::new();
        loop {
            match stream.read_line().await? {
                None => return Err(ConnectionError::HandshakeFailed(prints)),
                Some(line) => match Envelope::try_parse(&line) {
                    Some(env) if env.kind == MessageType::NewKey => {
                        debug!("handshake complete");
                        break;
                    }
                    Some(env) => {
                        // Anything structured but not a key is still pre-handshake noise.
                        prints.push(envelope_as_text(&env));
                    }
                    None => prints.push(line),
                },
            }
        }

        Ok(Connection { stream, state: State::Open, prints })
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.state == State::Done { Err(ConnectionError::NotActive) } else { Ok(()) }
    }

    /// Reads lines until a `RESULT` or `END` is seen, diverting everything
    /// else (including plain unstructured lines) into the print buffer.
    async fn next_result(&mut self) -> Result<Value, ConnectionError> {
        loop {
            match self.stream.read_line().await? {
                None => {
                    self.state = State::Done;
                    return Err(ConnectionError::NotActive);
                }
                Some(line) => match Envelope::try_parse(&line) {
                    Some(env) if env.kind == MessageType::Result => {
                        if let Some(CustomValue::FailsafeError { reason }) = CustomValue::from_value(&env.data) {
                            warn!(reason, "failsafe tripped, sandbox can no longer be trusted");
                            self.state = State::Done;
                            return Err(ConnectionError::NotActive);
                        }
                        return Ok(env.data);
                    }
                    Some(env) if env.kind == MessageType::End => {
                        self.state = State::Done;
                        return Err(ConnectionError::NotActive);
                    }
                    Some(env) => self.prints.push(envelope_as_text(&env)),
                    None => self.prints.push(line),
                },
            }
        }
    }

    /// Sends a method call and returns the single `RESULT` the peer sends back.
    pub async fn call(&mut self, method_name: &str, args: Vec<Value>) -> Result<Value, ConnectionError> {
        self.ensure_open()?;
        let payload = protocol::CustomValue::Message {
            method_name: method_name.to_string(),
            method_args: args,
            method_kwargs: serde_json::Map::new(),
        };
        self.stream.write_line(&Envelope::result(payload.to_value()).to_line()).await?;
        self.next_result().await
    }

    /// Round-trips an empty call and reports the elapsed time in seconds.
    pub async fn ping(&mut self) -> Result<f64, ConnectionError> {
        let start = std::time::Instant::now();
        self.call("__ping__", Vec::new()).await?;
        Ok(start.elapsed().as_secs_f64())
    }

    /// Sends `END` and drains any remaining `RESULT`s the peer still had
    /// queued. Idempotent: calling it twice just returns an empty list the
    /// second time.
    pub async fn complete(&mut self) -> Vec<Value> {
        if self.state == State::Done {
            return Vec::new();
        }
        if self.stream.write_line(&Envelope::end().to_line()).await.is_err() {
            self.state = State::Done;
            return Vec::new();
        }
        let mut leftovers = Vec::new();
        loop {
            match self.next_result().await {
                Ok(v) => leftovers.push(v),
                Err(_) => break,
            }
        }
        self.state = State::Done;
        leftovers
    }

    pub fn get_prints(&self) -> String {
        self.prints.join("\n")
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Open
    }
}

fn envelope_as_text(env: &Envelope) -> String {
    match &env.data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A [`LineStream`] over an in-memory scripted transcript, used by the
/// runner-core test suite and re-exported for downstream conformance tests.
pub struct ScriptedStream {
    inbound: std::collections::VecDeque<String>,
    pub outbound: Vec<String>,
}

impl ScriptedStream {
    pub fn new(inbound: Vec<String>) -> Self {
        ScriptedStream { inbound: inbound.into(), outbound: Vec::new() }
    }
}

#[async_trait]
impl LineStream for Box<dyn LineStream> {
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        (**self).write_line(line).await
    }

    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        (**self).read_line().await
    }
}

#[async_trait]
impl LineStream for ScriptedStream {
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        self.outbound.push(line.to_string());
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        Ok(self.inbound.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_line() -> String {
        Envelope::new_key(7).to_line()
    }

    #[tokio::test]
    async fn handshake_consumes_prelude_as_prints() {
        let stream = ScriptedStream::new(vec!["hello from player code".into(), key_line()]);
        let conn = Connection::handshake(stream).await.unwrap();
        assert!(conn.is_active());
        assert_eq!(conn.get_prints(), "hello from player code");
    }

    #[tokio::test]
    async fn handshake_fails_on_eof_before_key() {
        let stream = ScriptedStream::new(vec!["only noise".into()]);
        let err = Connection::handshake(stream).await.unwrap_err();
        match err {
            ConnectionError::HandshakeFailed(lines) => assert_eq!(lines, vec!["only noise".to_string()]),
            other => panic!("expected HandshakeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_returns_result_and_buffers_interleaved_prints() {
        let result_line = Envelope::result(json!({"move": "a1"})).to_line();
        let stream = ScriptedStream::new(vec![key_line(), "thinking...".into(), result_line]);
        let mut conn = Connection::handshake(stream).await.unwrap();
        let v = conn.call("make_move", vec![]).await.unwrap();
        assert_eq!(v, json!({"move": "a1"}));
        assert_eq!(conn.get_prints(), "thinking...");
    }

    #[tokio::test]
    async fn failsafe_error_closes_the_connection() {
        let failsafe = Envelope::result(CustomValue::FailsafeError { reason: "writable /tmp".into() }.to_value()).to_line();
        let stream = ScriptedStream::new(vec![key_line(), failsafe]);
        let mut conn = Connection::handshake(stream).await.unwrap();
        let err = conn.call("make_move", vec![]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotActive));
        assert!(!conn.is_active());
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let stream = ScriptedStream::new(vec![key_line()]);
        let mut conn = Connection::handshake(stream).await.unwrap();
        conn.complete().await;
        let err = conn.call("make_move", vec![]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotActive));
    }

    #[tokio::test]
    async fn eof_mid_call_marks_connection_done() {
        let stream = ScriptedStream::new(vec![key_line()]);
        let mut conn = Connection::handshake(stream).await.unwrap();
        let err = conn.call("make_move", vec![]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotActive));
        assert!(!conn.is_active());
    }
}
