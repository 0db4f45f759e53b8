//! A minimal, fully-specified [`Gamemode`] implementation. Tic-tac-toe has no
//! hidden information and no draw-by-agreement subtlety, which makes it the
//! conformance fixture the turn engine's own tests are built against.

use runner_core::gamemode::Gamemode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 3x3 grid, `0` empty, `1` cross (player 0), `2` circle (player 1).
#[derive(Clone)]
pub struct Board {
    cells: [[u8; 3]; 3],
}

#[derive(Clone, Copy)]
pub struct StonePlacement {
    pub row: usize,
    pub column: usize,
}

#[derive(Serialize)]
pub struct BoardView {
    pub board: Vec<Vec<u8>>,
    /// The mark (`1` or `2`) the receiving player should look for as "mine".
    pub you: u8,
}

#[derive(Deserialize)]
struct RawMove {
    row: usize,
    column: usize,
}

pub struct TicTacToe {
    turn_time_seconds: u64,
}

impl TicTacToe {
    pub fn new(turn_time_seconds: u64) -> Self {
        TicTacToe { turn_time_seconds }
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        TicTacToe::new(5)
    }
}

fn check_for(board: &Board, mark: u8) -> bool {
    (0..3).any(|row| (0..3).all(|col| board.cells[row][col] == mark))
        || (0..3).any(|col| (0..3).all(|row| board.cells[row][col] == mark))
        || (0..3).all(|i| board.cells[i][i] == mark)
        || (0..3).all(|i| board.cells[i][2 - i] == mark)
}

impl Gamemode for TicTacToe {
    type Board = Board;
    type BoardView = BoardView;
    type Move = StonePlacement;

    fn name(&self) -> &str {
        "tic-tac-toe"
    }

    fn player_count(&self) -> usize {
        2
    }

    fn turn_time(&self) -> u64 {
        self.turn_time_seconds
    }

    fn player_label(&self, player: usize) -> String {
        if player == 0 { "cross".to_string() } else { "circle".to_string() }
    }

    fn setup(&self) -> Self::Board {
        Board { cells: [[0; 3]; 3] }
    }

    fn filter_board(&self, board: &Self::Board, player: usize) -> Self::BoardView {
        BoardView { board: board.cells.iter().map(|row| row.to_vec()).collect(), you: player as u8 + 1 }
    }

    fn parse_move(&self, raw: &Value) -> Option<Self::Move> {
        let raw: RawMove = serde_json::from_value(raw.clone()).ok()?;
        if raw.row < 3 && raw.column < 3 { Some(StonePlacement { row: raw.row, column: raw.column }) } else { None }
    }

    fn is_move_legal(&self, board: &Self::Board, _player: usize, mv: &Self::Move) -> bool {
        board.cells[mv.row][mv.column] == 0
    }

    fn apply_move(&self, board: &Self::Board, player: usize, mv: &Self::Move) -> Self::Board {
        let mut next = board.clone();
        next.cells[mv.row][mv.column] = player as u8 + 1;
        next
    }

    fn is_win(&self, board: &Self::Board, player: usize) -> bool {
        check_for(board, player as u8 + 1)
    }

    fn is_loss(&self, _board: &Self::Board, _player: usize) -> bool {
        // A move either wins, draws, or passes play on; there's no separate
        // self-inflicted loss condition in this gamemode.
        false
    }

    fn is_draw(&self, board: &Self::Board) -> bool {
        !check_for(board, 1) && !check_for(board, 2) && board.cells.iter().flatten().all(|&c| c != 0)
    }

    fn encode_board(&self, board: &Self::Board) -> String {
        board.cells.iter().map(|row| row.iter().map(u8::to_string).collect::<Vec<_>>().join(",")).collect::<Vec<_>>().join(";")
    }

    fn encode_move(&self, mv: &Self::Move, player: usize) -> String {
        format!("{}:{},{}", player, mv.row, mv.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_win_is_detected_for_the_mover() {
        let game = TicTacToe::default();
        let mut board = game.setup();
        for col in 0..3 {
            board = game.apply_move(&board, 0, &StonePlacement { row: 0, column: col });
        }
        assert!(game.is_win(&board, 0));
        assert!(!game.is_win(&board, 1));
    }

    #[test]
    fn occupied_cell_is_illegal() {
        let game = TicTacToe::default();
        let board = game.apply_move(&game.setup(), 0, &StonePlacement { row: 1, column: 1 });
        assert!(!game.is_move_legal(&board, 1, &StonePlacement { row: 1, column: 1 }));
    }

    #[test]
    fn full_board_with_no_winner_is_a_draw() {
        let game = TicTacToe::default();
        // X O X / X O O / O X X -- no three in a row, fully filled.
        let layout = [[1, 2, 1], [1, 2, 2], [2, 1, 1]];
        let board = Board { cells: layout };
        assert!(game.is_draw(&board));
    }

    #[test]
    fn parse_move_rejects_out_of_range_values() {
        let game = TicTacToe::default();
        assert!(game.parse_move(&json!({"row": 5, "column": 0})).is_none());
        assert!(game.parse_move(&json!({"row": 0, "column": 0})).is_some());
    }
}

/// End-to-end scenarios run through the turn engine against scripted player
/// streams, exercising the gamemode as the engine's own conformance fixture.
#[cfg(test)]
mod turn_engine_conformance {
    use super::*;
    use protocol::{CustomValue, Envelope};
    use runner_core::connection::{Connection, ScriptedStream};
    use runner_core::middleware::Middleware;
    use runner_core::result::{Outcome, ResultCode};
    use runner_core::timed_connection::TimedConnection;
    use runner_core::turn_engine::run_match;
    use serde_json::json;

    fn key_line(key: i64) -> String {
        Envelope::new_key(key).to_line()
    }

    fn move_result(row: usize, column: usize) -> String {
        Envelope::result(json!({"row": row, "column": column})).to_line()
    }

    /// Five identical RESULT lines for the latency calibration pings that
    /// precede the first real turn.
    fn pings() -> Vec<String> {
        vec![move_result(0, 0); 5]
    }

    async fn middleware_from(scripts: Vec<Vec<String>>, budget_seconds: f64) -> Middleware<ScriptedStream> {
        let mut connections = Vec::new();
        for script in scripts {
            let stream = ScriptedStream::new(script);
            let conn = Connection::handshake(stream).await.unwrap();
            connections.push(TimedConnection::new(conn, budget_seconds));
        }
        Middleware::new(connections)
    }

    #[tokio::test]
    async fn clean_win_is_attributed_to_the_mover() {
        let game = TicTacToe::new(5);
        let cross = [vec![key_line(1)], pings(), vec![move_result(0, 0), move_result(0, 1), move_result(0, 2)]].concat();
        let circle = [vec![key_line(2)], pings(), vec![move_result(1, 0), move_result(1, 1)]].concat();
        let mut middleware = middleware_from(vec![cross, circle], 60.0).await;

        let result = run_match(&game, &mut middleware, 9).await;

        assert_eq!(result.submission_results[0].outcome, Outcome::Win);
        assert_eq!(result.submission_results[0].result_code, ResultCode::ValidGame);
        assert_eq!(result.submission_results[1].outcome, Outcome::Loss);
        assert_eq!(result.moves.len(), 5);
    }

    #[tokio::test]
    async fn illegal_move_loses_immediately() {
        let game = TicTacToe::new(5);
        let cross = [vec![key_line(1)], pings(), vec![move_result(9, 9)]].concat();
        let circle = [vec![key_line(2)], pings()].concat();
        let mut middleware = middleware_from(vec![cross, circle], 60.0).await;

        let result = run_match(&game, &mut middleware, 9).await;

        assert_eq!(result.submission_results[0].outcome, Outcome::Loss);
        assert_eq!(result.submission_results[0].result_code, ResultCode::IllegalMove);
        assert_eq!(result.submission_results[1].outcome, Outcome::Win);
    }

    #[tokio::test]
    async fn broken_entry_point_is_reported_for_the_caller() {
        let game = TicTacToe::new(5);
        let error_response = Envelope::result(CustomValue::MissingFunctionError { function_name: "make_move".into() }.to_value()).to_line();
        let cross = [vec![key_line(1)], pings(), vec![error_response]].concat();
        let circle = [vec![key_line(2)], pings()].concat();
        let mut middleware = middleware_from(vec![cross, circle], 60.0).await;

        let result = run_match(&game, &mut middleware, 9).await;

        assert_eq!(result.submission_results[0].outcome, Outcome::Loss);
        assert_eq!(result.submission_results[0].result_code, ResultCode::BrokenEntryPoint);
        assert_eq!(result.submission_results[1].outcome, Outcome::Win);
    }

    #[tokio::test]
    async fn exhausted_clock_times_out_the_slow_player() {
        // A zero-second turn allowance means any measured thinking time, even
        // an instantly-answered scripted call, exhausts the clock on the
        // first move.
        let game = TicTacToe::new(0);
        let cross = [vec![key_line(1)], pings(), vec![move_result(0, 0)]].concat();
        let circle = [vec![key_line(2)], pings()].concat();
        let mut middleware = middleware_from(vec![cross, circle], 60.0).await;

        let result = run_match(&game, &mut middleware, 9).await;

        assert_eq!(result.submission_results[0].outcome, Outcome::Loss);
        assert_eq!(result.submission_results[0].result_code, ResultCode::Timeout);
        assert_eq!(result.submission_results[1].outcome, Outcome::Win);
    }

    #[tokio::test]
    async fn handshake_failure_before_any_key_stops_the_match() {
        // No NEW_KEY line ever arrives: the stream runs dry during the
        // handshake itself, before a `Middleware` can even be assembled.
        let stream = ScriptedStream::new(vec!["garbled startup noise".into()]);
        let err = Connection::handshake(stream).await.unwrap_err();
        match err {
            runner_core::error::ConnectionError::HandshakeFailed(lines) => {
                assert_eq!(lines, vec!["garbled startup noise".to_string()]);
            }
            other => panic!("expected HandshakeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn draw_is_reported_for_every_player() {
        let game = TicTacToe::new(5);
        // X O X / X O O / O X X: a full board with no winner.
        let cross = [
            vec![key_line(1)],
            pings(),
            vec![move_result(0, 0), move_result(0, 2), move_result(1, 0), move_result(2, 1), move_result(2, 2)],
        ]
        .concat();
        let circle = [
            vec![key_line(2)],
            pings(),
            vec![move_result(0, 1), move_result(1, 1), move_result(1, 2), move_result(2, 0)],
        ]
        .concat();
        let mut middleware = middleware_from(vec![cross, circle], 60.0).await;

        let result = run_match(&game, &mut middleware, 9).await;

        assert!(result.submission_results.iter().all(|r| r.outcome == Outcome::Draw));
        assert!(result.submission_results.iter().all(|r| r.result_code == ResultCode::ValidGame));
    }
}
