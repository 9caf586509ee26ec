use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::engine as GameEngine;
use crate::engine::Board;

/// Weights for each heuristic component.
///
/// The corner and snake terms are scaled so that a single tile moves each of
/// them by at most one unit. Smoothness and monotonicity can only improve when
/// a tile is removed. So whenever [`Weights::empty_dominates`] holds, emptying
/// a cell never lowers the score.
///
/// `merge` is not part of the board evaluation: the search adds
/// `merge * MoveResult::score` to each direction it tries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub empty: f64,
    pub smoothness: f64,
    pub monotonicity: f64,
    pub corner: f64,
    pub snake: f64,
    pub merge: f64,
}

impl Weights {
    /// True if one empty cell is worth more than any single tile can add.
    pub fn empty_dominates(&self) -> bool {
        self.smoothness >= 0.0
            && self.monotonicity >= 0.0
            && self.corner >= 0.0
            && self.snake >= 0.0
            && self.empty >= self.corner + self.snake
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self { empty: 2.7, smoothness: 0.1, monotonicity: 1.0, corner: 2.0, snake: 0.5, merge: 0.01 }
    }
}

/// Row/column features that only depend on one 16-bit line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LineFeatures {
    empty: u8,
    /// Negative sum of exponent gaps between occupied neighbours.
    smoothness: i32,
    /// Penalty (<= 0) for steps that decrease along the line, empties skipped.
    mono_dec: i32,
    /// Penalty (<= 0) for steps that increase along the line, empties skipped.
    mono_inc: i32,
}

const CORNERS: [usize; 4] = [0, 3, 12, 15];

const EXPONENT_RANGE: f64 = GameEngine::MAX_EXPONENT as f64;

// Snake path from the top-left corner: weight falls by one per step.
// The largest weight times the largest exponent normalises the term.
const SNAKE: [u32; 16] = [
    15, 14, 13, 12,
    8, 9, 10, 11,
    7, 6, 5, 4,
    0, 1, 2, 3,
];

static LINE_FEATURES: OnceLock<Box<[LineFeatures]>> = OnceLock::new();

pub(crate) fn warm() {
    let _ = line_features();
}

fn line_features() -> &'static [LineFeatures] {
    LINE_FEATURES
        .get_or_init(|| {
            let mut v = vec![LineFeatures::default(); 0x1_0000];
            for (i, slot) in v.iter_mut().enumerate() {
                *slot = calc_line_features(i as u16);
            }
            v.into_boxed_slice()
        })
        .as_ref()
}

/// Score a board with the default weights; `-inf` when the game is over.
///
/// ```
/// use bot_2048::engine::Board;
/// use bot_2048::expectimax::evaluate;
/// assert!(evaluate(Board::from_raw(0x1000_0000_0000_0000)).is_finite());
/// assert_eq!(evaluate(Board::from_raw(0x1212_2121_1212_2121)), f64::NEG_INFINITY);
/// ```
pub fn evaluate(board: Board) -> f64 {
    evaluate_with(board, &Weights::default())
}

/// Score a board with explicit weights.
///
/// Rows are read straight from the packed board and columns from its
/// transpose, so every horizontal and vertical neighbour pair is seen once.
pub fn evaluate_with(board: Board, w: &Weights) -> f64 {
    if board.is_game_over() {
        return f64::NEG_INFINITY;
    }
    let features = line_features();
    let cols = GameEngine::transpose(board.raw());
    let mut empty = 0i32;
    let mut smoothness = 0i32;
    let (mut row_dec, mut row_inc, mut col_dec, mut col_inc) = (0i32, 0i32, 0i32, 0i32);
    for i in 0..4 {
        let row = features[GameEngine::extract_line(board.raw(), i) as usize];
        let col = features[GameEngine::extract_line(cols, i) as usize];
        empty += row.empty as i32;
        smoothness += row.smoothness + col.smoothness;
        row_dec += row.mono_dec;
        row_inc += row.mono_inc;
        col_dec += col.mono_dec;
        col_inc += col.mono_inc;
    }
    let monotonicity = row_dec.max(row_inc) + col_dec.max(col_inc);

    empty as f64 * w.empty
        + smoothness as f64 * w.smoothness
        + monotonicity as f64 * w.monotonicity
        + corner_bonus(board) as f64 / EXPONENT_RANGE * w.corner
        + snake_gradient(board) as f64 / (SNAKE[0] as f64 * EXPONENT_RANGE) * w.snake
}

/// Exponent of the largest tile if some corner holds it, else 0.
fn corner_bonus(board: Board) -> u8 {
    let max = board.max_exponent();
    if max > 0 && CORNERS.iter().any(|&idx| board.exponent(idx) == max) {
        max
    } else {
        0
    }
}

fn snake_gradient(board: Board) -> u32 {
    SNAKE
        .iter()
        .enumerate()
        .map(|(idx, &weight)| weight * board.exponent(idx) as u32)
        .sum()
}

fn calc_line_features(line: u16) -> LineFeatures {
    let tiles = GameEngine::line_to_array(line);
    let empty = tiles.iter().filter(|&&t| t == 0).count() as u8;
    let smoothness = -tiles
        .windows(2)
        .filter(|pair| pair[0] != 0 && pair[1] != 0)
        .map(|pair| (pair[0] as i32 - pair[1] as i32).abs())
        .sum::<i32>();

    let occupied: Vec<i32> = tiles.iter().filter(|&&t| t != 0).map(|&t| t as i32).collect();
    let mut mono_dec = 0;
    let mut mono_inc = 0;
    for pair in occupied.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        if current > next {
            mono_dec += next - current;
        } else if next > current {
            mono_inc += current - next;
        }
    }
    LineFeatures { empty, smoothness, mono_dec, mono_inc }
}
