//! Wraps a [`Connection`] with a shared wall-clock budget. The budget is not
//! reset per call: it is consumed across the whole lifetime of the wrapper,
//! enforcing a chess-clock style ceiling on one player's total thinking time.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::connection::{Connection, LineStream};
use crate::error::ConnectionError;

pub struct TimedConnection<S: LineStream> {
    inner: Connection<S>,
    /// Seconds left. Once an operation times out this is left as-is and
    /// `poisoned` takes over — the clock does not get "topped up".
    time_remaining: f64,
    poisoned: bool,
}

impl<S: LineStream> TimedConnection<S> {
    pub fn new(inner: Connection<S>, time_budget_seconds: f64) -> Self {
        TimedConnection { inner, time_remaining: time_budget_seconds, poisoned: false }
    }

    pub fn time_remaining(&self) -> f64 {
        self.time_remaining
    }

    fn budget(&self) -> Duration {
        Duration::from_secs_f64(self.time_remaining.max(0.0))
    }

    /// Runs `elapsed` against the live budget and, on success, subtracts the
    /// wall-clock cost from it. On timeout the wrapper is poisoned permanently.
    fn account(&mut self, elapsed: Duration, timed_out: bool) -> Result<(), ConnectionError> {
        if timed_out {
            self.poisoned = true;
            return Err(ConnectionError::TimedOut);
        }
        self.time_remaining -= elapsed.as_secs_f64();
        Ok(())
    }

    pub async fn call(&mut self, method_name: &str, args: Vec<Value>) -> Result<Value, ConnectionError> {
        if self.poisoned {
            return Err(ConnectionError::TimedOut);
        }
        let start = Instant::now();
        match tokio::time::timeout(self.budget(), self.inner.call(method_name, args)).await {
            Ok(result) => {
                self.account(start.elapsed(), false)?;
                result
            }
            Err(_) => Err(self.account(start.elapsed(), true).unwrap_err()),
        }
    }

    pub async fn ping(&mut self) -> Result<f64, ConnectionError> {
        if self.poisoned {
            return Err(ConnectionError::TimedOut);
        }
        let start = Instant::now();
        match tokio::time::timeout(self.budget(), self.inner.ping()).await {
            Ok(result) => {
                self.account(start.elapsed(), false)?;
                result
            }
            Err(_) => Err(self.account(start.elapsed(), true).unwrap_err()),
        }
    }

    pub async fn complete(&mut self) -> Vec<Value> {
        if self.poisoned {
            return Vec::new();
        }
        match tokio::time::timeout(self.budget(), self.inner.complete()).await {
            Ok(leftovers) => leftovers,
            Err(_) => {
                self.poisoned = true;
                Vec::new()
            }
        }
    }

    pub fn get_prints(&self) -> String {
        self.inner.get_prints()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ScriptedStream;
    use protocol::Envelope;
    use serde_json::json;

    fn key_line() -> String {
        Envelope::new_key(1).to_line()
    }

    #[tokio::test]
    async fn successful_call_consumes_from_the_shared_budget() {
        let stream = ScriptedStream::new(vec![key_line(), Envelope::result(json!("ok")).to_line()]);
        let conn = Connection::handshake(stream).await.unwrap();
        let mut timed = TimedConnection::new(conn, 10.0);
        timed.call("make_move", vec![]).await.unwrap();
        assert!(timed.time_remaining() <= 10.0);
    }

    #[tokio::test]
    async fn exhausted_budget_poisons_the_wrapper_permanently() {
        let stream = ScriptedStream::new(vec![key_line()]);
        let conn = Connection::handshake(stream).await.unwrap();
        let mut timed = TimedConnection::new(conn, 0.0);
        let first = timed.call("make_move", vec![]).await;
        assert!(matches!(first, Err(ConnectionError::TimedOut)));
        let second = timed.call("make_move", vec![]).await;
        assert!(matches!(second, Err(ConnectionError::TimedOut)));
    }
}
