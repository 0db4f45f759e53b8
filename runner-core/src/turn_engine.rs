//! Drives a [`Gamemode`] against a [`Middleware`] of player connections:
//! calibrates latency, runs the chess-clock turn loop, and classifies the
//! outcome into a [`ParsedResult`].

use std::time::Instant;

use protocol::CustomValue;
use tracing::{info, warn};

use crate::connection::LineStream;
use crate::error::ConnectionError;
use crate::gamemode::Gamemode;
use crate::middleware::Middleware;
use crate::result::{Outcome, ParsedResult, ResultCode, SingleResult};

/// Per-player round-trip time is clamped at this many seconds before being
/// folded into the overall latency compensation, so one slow sandbox can't
/// eat into every player's clock.
const MAX_PER_PLAYER_LATENCY_SECONDS: f64 = 0.2;
const LATENCY_SAMPLES: usize = 5;

/// Runs one complete match and returns the final, persistable result.
pub async fn run_match<S: LineStream, G: Gamemode>(
    gamemode: &G,
    middleware: &mut Middleware<S>,
    turn_cap: usize,
) -> ParsedResult {
    let player_count = gamemode.player_count();
    debug_assert_eq!(player_count, middleware.player_count());

    let latency = match calibrate_latency(middleware, player_count).await {
        Ok(latency) => latency,
        Err(_) => {
            warn!("latency calibration failed; treating the match as infrastructure failure");
            return all_draw(gamemode, middleware, ResultCode::UnknownResultType).await;
        }
    };

    let mut time_remaining: Vec<f64> = (0..player_count).map(|_| gamemode.turn_time() as f64).collect();
    let mut board = gamemode.setup();
    let initial_board = gamemode.encode_board(&board);
    let mut moves = Vec::new();
    let mut player_turn = 0usize;

    let outcome = 'turns: {
        for _ in 0..turn_cap {
            let view = gamemode.filter_board(&board, player_turn);
            let view_json = serde_json::to_value(&view).expect("BoardView always serialises");
            let start = Instant::now();
            let response = middleware
                .call(
                    player_turn,
                    "make_move",
                    vec![view_json, serde_json::json!(time_remaining[player_turn])],
                )
                .await;

            let raw = match response {
                Err(ConnectionError::TimedOut) => break 'turns loss(player_turn, player_count, ResultCode::Timeout),
                Err(_) => break 'turns loss(player_turn, player_count, ResultCode::ProcessKilled),
                Ok(raw) => raw,
            };

            let elapsed = (start.elapsed().as_secs_f64() - latency).max(0.0);
            time_remaining[player_turn] -= elapsed;
            if time_remaining[player_turn] <= 0.0 {
                break 'turns loss(player_turn, player_count, ResultCode::Timeout);
            }

            if let Some(custom) = CustomValue::from_value(&raw) {
                match custom {
                    CustomValue::MissingFunctionError { .. } => {
                        break 'turns loss(player_turn, player_count, ResultCode::BrokenEntryPoint);
                    }
                    CustomValue::ExceptionTrace { .. } => {
                        break 'turns loss(player_turn, player_count, ResultCode::Exception);
                    }
                    _ => {}
                }
            }

            let parsed_move = gamemode.parse_move(&raw);
            let legal = parsed_move.as_ref().is_some_and(|mv| gamemode.is_move_legal(&board, player_turn, mv));
            if !legal {
                break 'turns loss(player_turn, player_count, ResultCode::IllegalMove);
            }
            let mv = parsed_move.expect("checked legal above");

            moves.push(gamemode.encode_move(&mv, player_turn));
            board = gamemode.apply_move(&board, player_turn, &mv);

            if gamemode.is_win(&board, player_turn) {
                break 'turns win(player_turn, player_count, ResultCode::ValidGame);
            }
            if gamemode.is_loss(&board, player_turn) {
                break 'turns loss(player_turn, player_count, ResultCode::ValidGame);
            }
            if gamemode.is_draw(&board) {
                break 'turns vec![Outcome::Draw; player_count]
                    .into_iter()
                    .map(|o| (o, ResultCode::ValidGame))
                    .collect();
            }

            player_turn = (player_turn + 1) % player_count;
        }
        vec![Outcome::Draw; player_count].into_iter().map(|o| (o, ResultCode::GameUnfinished)).collect()
    };

    middleware.complete_all().await;
    info!(player_count, turns = moves.len(), "match finished");

    let submission_results = outcome
        .into_iter()
        .enumerate()
        .map(|(i, (outcome, code))| {
            SingleResult::new(outcome, gamemode.player_label(i), code, middleware.get_player_prints(i))
        })
        .collect();

    ParsedResult { initial_board, moves, submission_results }
}

type OutcomeVector = Vec<(Outcome, ResultCode)>;

fn win(winner: usize, player_count: usize, code: ResultCode) -> OutcomeVector {
    (0..player_count).map(|i| (if i == winner { Outcome::Win } else { Outcome::Loss }, code)).collect()
}

fn loss(loser: usize, player_count: usize, code: ResultCode) -> OutcomeVector {
    (0..player_count).map(|i| (if i == loser { Outcome::Loss } else { Outcome::Win }, code)).collect()
}

async fn calibrate_latency<S: LineStream>(
    middleware: &mut Middleware<S>,
    player_count: usize,
) -> Result<f64, ConnectionError> {
    let mut total = 0.0;
    for player in 0..player_count {
        let mut sum = 0.0;
        for _ in 0..LATENCY_SAMPLES {
            sum += middleware.ping(player).await?;
        }
        total += (sum / LATENCY_SAMPLES as f64).min(MAX_PER_PLAYER_LATENCY_SECONDS);
    }
    Ok(total / player_count as f64)
}

async fn all_draw<S: LineStream, G: Gamemode>(
    gamemode: &G,
    middleware: &mut Middleware<S>,
    code: ResultCode,
) -> ParsedResult {
    let board = gamemode.setup();
    let initial_board = gamemode.encode_board(&board);
    middleware.complete_all().await;
    let submission_results = (0..gamemode.player_count())
        .map(|i| SingleResult::new(Outcome::Draw, gamemode.player_label(i), code, middleware.get_player_prints(i)))
        .collect();
    ParsedResult { initial_board, moves: Vec::new(), submission_results }
}
