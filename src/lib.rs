//! bot-2048: an Expectimax move picker for the 2048 sliding-tile puzzle
//!
//! This crate provides:
//! - A packed `Board` (16 four-bit exponents in a `u64`) with table-driven moves
//! - An Expectimax policy with iterative deepening under a time budget (`expectimax`)
//! - Conversion from the game layer's grid snapshot (`codec`)
//! - The JSON request/response messages of the search worker (`protocol`)
//! - A background search thread and the bot on/off controller (`worker`)
//!
//! Quick start:
//! ```
//! use bot_2048::codec::{self, GridSnapshot};
//! use bot_2048::engine::Move;
//! use bot_2048::expectimax::find_best_move;
//! use std::time::Duration;
//!
//! let grid = GridSnapshot::from_rows([[2, 2, 4, 0], [0; 4], [0; 4], [0; 4]]);
//! let board = codec::encode(&grid).unwrap();
//! let moved = board.apply(Move::Left);
//! assert_eq!(moved.score, 4);
//!
//! let decision = find_best_move(board, 2, Duration::from_millis(100));
//! assert!(decision.best_move.is_some());
//! ```
//!
pub mod codec;
pub mod engine;
pub mod expectimax;
pub mod protocol;
pub mod worker;
