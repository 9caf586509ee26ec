//! Expectimax search policy for 2048.
//!
//! The search alternates MAX nodes (the bot picks a direction) and CHANCE
//! nodes (a 2 or 4 spawns in some empty cell). Depth only drops when a CHANCE
//! node hands over to the next MAX layer. [`Expectimax::decide`] wraps the
//! search in an iterative-deepening loop bounded by a depth ceiling and a
//! wall-clock budget; one [`TranspositionTable`] lives for one decision.
//!
//! Quick start
//! ```
//! use bot_2048::engine::{self as GameEngine, Board};
//! use bot_2048::expectimax::{Expectimax, SearchConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! GameEngine::new();
//! let mut rng = StdRng::seed_from_u64(123);
//! let b0 = Board::EMPTY
//!     .with_random_tile(&mut rng)
//!     .with_random_tile(&mut rng);
//!
//! let mut ex = Expectimax::with_config(SearchConfig { max_depth: 2, ..Default::default() });
//! let decision = ex.decide(b0);
//! assert!(decision.best_move.is_some());
//! assert!(decision.score.is_finite());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{self, Move};

pub mod heuristic;
mod table;
mod search;
mod deepening;

pub use deepening::{find_best_move, Decision};
pub use heuristic::{evaluate, evaluate_with, Weights};
pub use search::Expectimax;
pub use table::{TranspositionEntry, TranspositionTable};

/// Probability that a spawned tile is a 2.
pub const LOW_TILE_PROBABILITY: f64 = 0.9;
/// Probability that a spawned tile is a 4.
pub const HIGH_TILE_PROBABILITY: f64 = 0.1;

/// Configurable knobs for a decision.
///
/// - `max_depth`: deepest iteration the driver may start.
/// - `time_limit_ms`: wall-clock budget checked between iterations.
/// - `cache_enabled`: enable/disable transposition table usage.
/// - `weights`: heuristic weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_depth: u32,
    pub time_limit_ms: u64,
    pub cache_enabled: bool,
    pub weights: Weights,
}

impl SearchConfig {
    #[inline]
    pub fn time_limit(&self) -> Duration { Duration::from_millis(self.time_limit_ms) }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_depth: 3, time_limit_ms: 100, cache_enabled: true, weights: Weights::default() }
    }
}

/// Whose turn a search node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Max,
    Chance,
}

/// Value of a node, plus the chosen direction for MAX nodes that have one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub best_move: Option<Move>,
    pub score: f64,
}

/// Basic search stats for a single decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub cache_hits: u64,
    pub depth_reached: u32,
}

/// Common helper for constructors to ensure tables are initialized.
fn warm_engine_and_heuristics() {
    // Safe to call multiple times.
    engine::new();
    heuristic::warm();
}
