use std::collections::HashMap;

use ahash::RandomState as AHasher;

use crate::engine::{Board, Move};

use super::{Node, SearchResult};

/// Memoized result for one board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranspositionEntry {
    pub node: Node,
    /// Remaining depth the score was computed with.
    pub depth: u32,
    pub score: f64,
    /// Only ever set for `Node::Max` entries.
    pub best_move: Option<Move>,
}

/// Per-request memo table keyed by the packed board.
///
/// One entry per board; a later store overwrites whatever was there. A probe
/// only succeeds when the stored node kind matches and the stored depth is at
/// least the requested one.
pub struct TranspositionTable {
    map: HashMap<Board, TranspositionEntry, AHasher>,
    hits: u64,
}

impl TranspositionTable {
    pub fn new() -> Self {
        Self { map: HashMap::with_hasher(AHasher::new()), hits: 0 }
    }

    pub fn probe(&mut self, board: Board, node: Node, depth: u32) -> Option<SearchResult> {
        match self.map.get(&board) {
            Some(entry) if entry.node == node && entry.depth >= depth => {
                self.hits += 1;
                Some(SearchResult { best_move: entry.best_move, score: entry.score })
            }
            _ => None,
        }
    }

    pub fn store(&mut self, board: Board, node: Node, depth: u32, result: SearchResult) {
        let best_move = match node {
            Node::Max => result.best_move,
            Node::Chance => None,
        };
        self.map.insert(board, TranspositionEntry { node, depth, score: result.score, best_move });
    }

    pub fn get(&self, board: Board) -> Option<&TranspositionEntry> {
        self.map.get(&board)
    }

    #[inline]
    pub fn len(&self) -> usize { self.map.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    /// Successful probes since creation.
    #[inline]
    pub fn hits(&self) -> u64 { self.hits }
}

impl Default for TranspositionTable { fn default() -> Self { Self::new() } }
