//! An indexed collection of player connections. Oblivious to game rules: the
//! turn engine is the only caller that knows what the indices mean.

use serde_json::Value;

use crate::connection::LineStream;
use crate::error::ConnectionError;
use crate::timed_connection::TimedConnection;

pub struct Middleware<S: LineStream> {
    connections: Vec<TimedConnection<S>>,
}

impl<S: LineStream> Middleware<S> {
    pub fn new(connections: Vec<TimedConnection<S>>) -> Self {
        Middleware { connections }
    }

    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    pub async fn call(&mut self, player: usize, method_name: &str, args: Vec<Value>) -> Result<Value, ConnectionError> {
        self.connections[player].call(method_name, args).await
    }

    pub async fn ping(&mut self, player: usize) -> Result<f64, ConnectionError> {
        self.connections[player].ping().await
    }

    pub fn time_remaining(&self, player: usize) -> f64 {
        self.connections[player].time_remaining()
    }

    pub fn get_player_prints(&self, player: usize) -> String {
        self.connections[player].get_prints()
    }

    /// Closes every connection and drains whatever `RESULT`s were still queued.
    pub async fn complete_all(&mut self) {
        for conn in &mut self.connections {
            conn.complete().await;
        }
    }
}
