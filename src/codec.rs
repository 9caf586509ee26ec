//! Conversion between the game layer's grid snapshot and the packed [`Board`].
//!
//! Snapshots follow the game's own serializer: `cells[x][y]` is column `x`,
//! row `y`, and each cell is `null` or an object carrying the tile `value`.
//! Anything else a tile object carries (positions, merge history) is ignored.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{Board, MAX_EXPONENT};

/// Side length the packed encoding supports.
pub const BOARD_SIZE: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported board size {0} (only 4x4 is encodable)")]
    UnsupportedSize(usize),
    #[error("grid does not have {expected} columns of {expected} cells")]
    Ragged { expected: usize },
    #[error("tile value {0} is not a power of two >= 2")]
    InvalidTile(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileState {
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// `{ "size": N, "cells": [[cell; N]; N] }`, column-major like the game layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub size: usize,
    pub cells: Vec<Vec<Option<TileState>>>,
}

impl GridSnapshot {
    pub fn empty(size: usize) -> Self {
        Self { size, cells: vec![vec![None; size]; size] }
    }

    /// Build a 4x4 snapshot from row-major tile values (0 = empty).
    ///
    /// ```
    /// use bot_2048::codec::GridSnapshot;
    /// let g = GridSnapshot::from_rows([[2, 2, 4, 0], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(g.value_at(2, 0), Some(4));
    /// assert_eq!(g.value_at(3, 0), None);
    /// ```
    pub fn from_rows(rows: [[u64; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        let mut grid = Self::empty(BOARD_SIZE);
        for (y, row) in rows.iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                if value != 0 {
                    grid.cells[x][y] = Some(TileState { value, position: Some(Position { x, y }) });
                }
            }
        }
        grid
    }

    /// Tile value at column `x`, row `y`.
    pub fn value_at(&self, x: usize, y: usize) -> Option<u64> {
        self.cells.get(x)?.get(y)?.as_ref().map(|t| t.value)
    }
}

/// Pack a snapshot. Values above 2^15 are clamped to 2^15.
pub fn encode(grid: &GridSnapshot) -> Result<Board, CodecError> {
    if grid.size != BOARD_SIZE {
        return Err(CodecError::UnsupportedSize(grid.size));
    }
    if grid.cells.len() != BOARD_SIZE || grid.cells.iter().any(|col| col.len() != BOARD_SIZE) {
        return Err(CodecError::Ragged { expected: BOARD_SIZE });
    }
    let mut board = Board::EMPTY;
    for (x, column) in grid.cells.iter().enumerate() {
        for (y, cell) in column.iter().enumerate() {
            if let Some(tile) = cell {
                board = board.with_exponent(y * BOARD_SIZE + x, exponent_of(tile.value)?);
            }
        }
    }
    Ok(board)
}

/// Unpack a board into a snapshot of side `size` (must be 4).
pub fn decode(board: Board, size: usize) -> Result<GridSnapshot, CodecError> {
    if size != BOARD_SIZE {
        return Err(CodecError::UnsupportedSize(size));
    }
    let mut grid = GridSnapshot::empty(size);
    for (x, column) in grid.cells.iter_mut().enumerate() {
        for (y, cell) in column.iter_mut().enumerate() {
            let e = board.exponent(y * BOARD_SIZE + x);
            if e > 0 {
                *cell = Some(TileState { value: 1 << e, position: Some(Position { x, y }) });
            }
        }
    }
    Ok(grid)
}

fn exponent_of(value: u64) -> Result<u8, CodecError> {
    if value < 2 || !value.is_power_of_two() {
        return Err(CodecError::InvalidTile(value));
    }
    let e = value.trailing_zeros() as u8;
    if e > MAX_EXPONENT {
        warn!("tile {} exceeds the 4-bit field, clamping to {}", value, 1u64 << MAX_EXPONENT);
        return Ok(MAX_EXPONENT);
    }
    Ok(e)
}
