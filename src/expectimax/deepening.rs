use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::engine::{Board, Move};

use super::{Expectimax, SearchConfig, SearchResult, SearchStats, TranspositionTable};

/// Anytime answer for one board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// `None` only when the board is lost.
    pub best_move: Option<Move>,
    pub score: f64,
    /// Deepest iteration that completed with a move (0 if none did).
    pub depth_reached: u32,
    pub elapsed: Duration,
    pub stats: SearchStats,
}

impl Expectimax {
    /// Iteratively deepen up to the configured depth within the configured budget.
    pub fn decide(&mut self, board: Board) -> Decision {
        let (max_depth, time_limit) = (self.cfg.max_depth, self.cfg.time_limit());
        self.decide_within(board, max_depth, time_limit)
    }

    /// Iteratively deepen from depth 1 to `max_depth`.
    ///
    /// The clock is read before each new depth (depth 1 always runs) and
    /// again right after each completed one. A depth that panics is dropped
    /// and the previous depth's answer stands.
    pub fn decide_within(&mut self, board: Board, max_depth: u32, time_limit: Duration) -> Decision {
        let start = Instant::now();
        self.reset_stats();

        if board.is_game_over() {
            info!("board is already lost, no move");
            return Decision {
                best_move: None,
                score: f64::NEG_INFINITY,
                depth_reached: 0,
                elapsed: start.elapsed(),
                stats: self.stats,
            };
        }

        let mut table = TranspositionTable::new();
        let mut best: Option<SearchResult> = None;
        let mut depth_reached = 0;

        for depth in 1..=max_depth.max(1) {
            if depth > 1 && start.elapsed() > time_limit {
                debug!("time budget spent before depth {}, keeping depth {}", depth, depth_reached);
                break;
            }
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.search(board, depth, &mut table)));
            match attempt {
                Ok(result @ SearchResult { best_move: Some(dir), score }) => {
                    debug!("depth {} done: {} ({:.2}), {} nodes", depth, dir, score, self.stats.nodes);
                    best = Some(result);
                    depth_reached = depth;
                }
                Ok(_) => {
                    debug!("depth {} returned no move, keeping depth {}", depth, depth_reached);
                    break;
                }
                Err(_) => {
                    error!("search aborted at depth {}, keeping depth {}", depth, depth_reached);
                    break;
                }
            }
            if start.elapsed() > time_limit {
                debug!("time budget spent after depth {}", depth);
                break;
            }
        }

        let (best_move, score) = match best {
            Some(SearchResult { best_move, score }) => (best_move, score),
            None => self.fallback(board),
        };
        self.stats.cache_hits = table.hits();
        self.stats.depth_reached = depth_reached;
        let elapsed = start.elapsed();
        info!(
            "chose {} (score {:.2}, depth {}, {} nodes, {} cache hits, {:?})",
            best_move.map_or_else(|| "none".to_string(), |m| m.to_string()),
            score,
            depth_reached,
            self.stats.nodes,
            self.stats.cache_hits,
            elapsed
        );
        Decision { best_move, score, depth_reached, elapsed, stats: self.stats }
    }

    /// First direction, in fixed order, that changes the board.
    fn fallback(&self, board: Board) -> (Option<Move>, f64) {
        warn!("no searched move for {:?}, falling back to the first legal direction", board);
        Move::ALL
            .iter()
            .map(|&dir| (dir, board.apply(dir)))
            .find(|(_, moved)| moved.changed)
            .map_or((None, f64::NEG_INFINITY), |(dir, moved)| (Some(dir), self.heuristic(moved.board)))
    }
}

/// One-shot decision with default weights and a fresh table.
///
/// ```
/// use std::time::Duration;
/// use bot_2048::engine::Board;
/// use bot_2048::expectimax::find_best_move;
/// let lost = Board::from_raw(0x1212_2121_1212_2121);
/// assert_eq!(find_best_move(lost, 3, Duration::from_millis(50)).best_move, None);
/// ```
pub fn find_best_move(board: Board, max_depth: u32, time_limit: Duration) -> Decision {
    let cfg = SearchConfig { max_depth, time_limit_ms: time_limit.as_millis() as u64, ..Default::default() };
    Expectimax::with_config(cfg).decide_within(board, max_depth, time_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_depth_ceiling() {
        let b = Board::from_raw(0x1000_0000_0000_0001);
        let d = find_best_move(b, 2, Duration::from_secs(60));
        assert_eq!(d.depth_reached, 2);
        assert_eq!(d.stats.depth_reached, 2);
        assert!(d.best_move.is_some());
    }

    #[test]
    fn tiny_budget_still_completes_depth_one() {
        let b = Board::from_raw(0x2100_1000_0000_0011);
        let d = find_best_move(b, 8, Duration::ZERO);
        assert_eq!(d.depth_reached, 1);
        assert!(d.best_move.is_some());
        assert!(d.score.is_finite());
    }

    #[test]
    fn lost_board_short_circuits() {
        let b = Board::from_raw(0x1212_2121_1212_2121);
        let mut ex = Expectimax::new();
        let d = ex.decide(b);
        assert_eq!(d.best_move, None);
        assert_eq!(d.depth_reached, 0);
        assert_eq!(d.stats.nodes, 0);
    }

    #[test]
    fn deeper_iterations_reuse_the_table() {
        let b = Board::from_raw(0x2100_1000_0000_0011);
        let d = find_best_move(b, 3, Duration::from_secs(60));
        assert_eq!(d.depth_reached, 3);
        assert!(d.stats.cache_hits > 0);
    }

    #[test]
    fn fallback_picks_first_changing_direction() {
        let ex = Expectimax::new();
        // Up is blocked, Right is the first direction that moves something.
        let b = Board::from_raw(0x1000_0000_0000_0000);
        let (m, score) = ex.fallback(b);
        assert_eq!(m, Some(Move::Right));
        assert!(score.is_finite());
        assert_eq!(ex.fallback(Board::from_raw(0x1212_2121_1212_2121)).0, None);
    }
}
