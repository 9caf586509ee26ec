use log::warn;

use crate::engine::{Board, Move};

use super::heuristic::evaluate_with;
use super::{
    warm_engine_and_heuristics, Node, SearchConfig, SearchResult, SearchStats, TranspositionTable,
    HIGH_TILE_PROBABILITY, LOW_TILE_PROBABILITY,
};

/// Single-threaded Expectimax search.
///
/// Constructors warm engine/heuristic tables. [`Expectimax::search`] runs one
/// fixed-depth pass; [`Expectimax::decide`] deepens it under a time budget.
pub struct Expectimax {
    pub(super) cfg: SearchConfig,
    pub(super) stats: SearchStats,
}

impl Expectimax {
    pub fn new() -> Self { Self::with_config(SearchConfig::default()) }

    pub fn with_config(cfg: SearchConfig) -> Self {
        warm_engine_and_heuristics();
        if !cfg.weights.empty_dominates() {
            warn!("heuristic weights {:?} can prefer a fuller board over an emptier one", cfg.weights);
        }
        Self { cfg, stats: SearchStats::default() }
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig { &self.cfg }

    /// Compute the best move with the configured depth and time budget.
    ///
    /// Example
    /// ```
    /// use bot_2048::engine::Board;
    /// use bot_2048::expectimax::Expectimax;
    /// let b = Board::from_raw(0x1000_0000_0000_0001);
    /// let mut ex = Expectimax::new();
    /// assert!(ex.best_move(b).is_some());
    /// ```
    #[inline]
    pub fn best_move(&mut self, board: Board) -> Option<Move> { self.decide(board).best_move }

    /// Evaluate `board` as a MAX node searched `depth` layers deep.
    ///
    /// Returns no move only when no direction changes the board.
    pub fn search(&mut self, board: Board, depth: u32, table: &mut TranspositionTable) -> SearchResult {
        self.expectimax(board, Node::Max, depth, table)
    }

    /// Statistics collected from the last call to [`Self::decide`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Reset accumulated stats to zero.
    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }

    #[inline]
    pub(super) fn heuristic(&self, board: Board) -> f64 { evaluate_with(board, &self.cfg.weights) }

    fn expectimax(&mut self, board: Board, node: Node, depth: u32, table: &mut TranspositionTable) -> SearchResult {
        self.stats.nodes += 1;
        match node {
            Node::Max => self.evaluate_max(board, depth, table),
            Node::Chance => self.evaluate_chance(board, depth, table),
        }
    }

    fn evaluate_max(&mut self, board: Board, depth: u32, table: &mut TranspositionTable) -> SearchResult {
        if depth == 0 {
            return SearchResult { best_move: None, score: self.heuristic(board) };
        }
        if let Some(hit) = self.recall(table, board, Node::Max, depth) {
            return hit;
        }
        if board.is_game_over() {
            let leaf = SearchResult { best_move: None, score: self.heuristic(board) };
            self.remember(table, board, Node::Max, depth, leaf);
            return leaf;
        }
        let mut best_score = f64::NEG_INFINITY;
        let mut best_move = None;
        for direction in Move::ALL {
            let moved = board.apply(direction);
            if !moved.changed {
                continue;
            }
            // The chance layer shares this node's depth; the merge reward is
            // credited to the direction that earns it.
            let reward = moved.score as f64 * self.cfg.weights.merge;
            let score = reward + self.expectimax(moved.board, Node::Chance, depth, table).score;
            // Strict `>` keeps the earliest direction on ties; a first legal move
            // is kept even if every child is lost.
            if best_move.is_none() || score > best_score {
                best_score = score;
                best_move = Some(direction);
            }
        }
        let result = match best_move {
            Some(_) => SearchResult { best_move, score: best_score },
            None => SearchResult { best_move: None, score: self.heuristic(board) },
        };
        self.remember(table, board, Node::Max, depth, result);
        result
    }

    fn evaluate_chance(&mut self, board: Board, depth: u32, table: &mut TranspositionTable) -> SearchResult {
        let num_empty_tiles = board.count_empty();
        if depth == 0 || num_empty_tiles == 0 {
            return SearchResult { best_move: None, score: self.heuristic(board) };
        }
        if let Some(hit) = self.recall(table, board, Node::Chance, depth) {
            return hit;
        }
        let mut tiles_searched = 0;
        let mut tmp: u64 = board.raw();
        let mut insert_tile: u64 = 1;
        let mut low_sum = 0.0;
        let mut high_sum = 0.0;
        while tiles_searched < num_empty_tiles {
            if (tmp & 0xf) == 0 {
                low_sum += self.spawn_outcome(Board::from_raw(board.raw() | insert_tile), depth - 1, table);
                high_sum += self.spawn_outcome(Board::from_raw(board.raw() | (insert_tile << 1)), depth - 1, table);
                tiles_searched += 1;
            }
            tmp >>= 4;
            insert_tile <<= 4;
        }
        let n = num_empty_tiles as f64;
        let score = LOW_TILE_PROBABILITY * (low_sum / n) + HIGH_TILE_PROBABILITY * (high_sum / n);
        let result = SearchResult { best_move: None, score };
        self.remember(table, board, Node::Chance, depth, result);
        result
    }

    /// Value of the board right after a spawn; lost boards are scored directly.
    fn spawn_outcome(&mut self, board: Board, depth: u32, table: &mut TranspositionTable) -> f64 {
        if board.is_game_over() {
            self.heuristic(board)
        } else {
            self.expectimax(board, Node::Max, depth, table).score
        }
    }

    #[inline]
    fn recall(&self, table: &mut TranspositionTable, board: Board, node: Node, depth: u32) -> Option<SearchResult> {
        if self.cfg.cache_enabled { table.probe(board, node, depth) } else { None }
    }

    #[inline]
    fn remember(&self, table: &mut TranspositionTable, board: Board, node: Node, depth: u32, result: SearchResult) {
        if self.cfg.cache_enabled {
            table.store(board, node, depth, result);
        }
    }
}

impl Default for Expectimax { fn default() -> Self { Self::new() } }
