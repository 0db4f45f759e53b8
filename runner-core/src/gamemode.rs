//! The pure game-logic contract the turn engine drives. A `Gamemode`
//! implementation knows nothing about sandboxes, connections, or time
//! budgets — it only ever sees board/move values.

use serde::Serialize;
use serde_json::Value;

/// Pure rules for one game. Implementations must be side-effect free:
/// the turn engine calls these synchronously, in between awaiting a player's
/// response, and relies on them never blocking or touching global state.
pub trait Gamemode: Send + Sync {
    type Board: Clone + Send + Sync;
    type BoardView: Serialize;
    type Move: Clone + Send + Sync;

    fn name(&self) -> &str;
    fn player_count(&self) -> usize;
    /// Per-player clock allowance, in whole seconds.
    fn turn_time(&self) -> u64;
    fn player_label(&self, player: usize) -> String {
        format!("player-{player}")
    }

    fn setup(&self) -> Self::Board;
    /// Hides information the given player shouldn't see (e.g. an opponent's
    /// hidden hand). Gamemodes with no hidden state can return the board as-is.
    fn filter_board(&self, board: &Self::Board, player: usize) -> Self::BoardView;
    /// Attempts to interpret a raw value sent back by a player as a move.
    /// Returns `None` if the value can't be parsed into this gamemode's move
    /// shape at all (treated identically to an illegal move by the caller).
    fn parse_move(&self, raw: &Value) -> Option<Self::Move>;
    fn is_move_legal(&self, board: &Self::Board, player: usize, mv: &Self::Move) -> bool;
    fn apply_move(&self, board: &Self::Board, player: usize, mv: &Self::Move) -> Self::Board;
    fn is_win(&self, board: &Self::Board, player: usize) -> bool;
    fn is_loss(&self, board: &Self::Board, player: usize) -> bool;
    fn is_draw(&self, board: &Self::Board) -> bool;
    fn encode_board(&self, board: &Self::Board) -> String;
    fn encode_move(&self, mv: &Self::Move, player: usize) -> String;
}
