use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A direction to move/merge tiles.
///
/// Variant order is the fixed iteration order used everywhere a search or a
/// fallback walks the directions: Up, Right, Down, Left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Up,
    Right,
    Down,
    Left,
}

impl Move {
    /// All directions in tie-break order.
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    /// Unit displacement `(dx, dy)`; `y` grows downward.
    pub fn vector(self) -> (i8, i8) {
        match self {
            Move::Up => (0, -1),
            Move::Right => (1, 0),
            Move::Down => (0, 1),
            Move::Left => (-1, 0),
        }
    }

    /// Numeric index used by the game layer (0 = up ... 3 = left).
    pub fn index(self) -> u8 {
        match self {
            Move::Up => 0,
            Move::Right => 1,
            Move::Down => 2,
            Move::Left => 3,
        }
    }
}

impl TryFrom<u8> for Move {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Move::ALL.get(v as usize).copied().ok_or(v)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Move::Up => "up",
            Move::Right => "right",
            Move::Down => "down",
            Move::Left => "left",
        };
        f.write_str(s)
    }
}

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

/// Largest exponent a nybble can hold (tile value 2^15).
pub const MAX_EXPONENT: u8 = 15;

type BoardRaw = u64;
type Line = u16;
type Score = u64;

/// Precomputed slide-left result for one 16-bit row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowEntry {
    /// Row after sliding and merging toward column 0.
    pub left: u16,
    /// Sum of the tile values created by merges.
    pub score: u32,
    /// The input row with its four nybbles in reverse order.
    pub reversed: u16,
}

/// Packed 4x4 2048 board as 16 4-bit nibbles in a `u64`.
///
/// Cell `idx = row * 4 + col` lives at bits `60 - 4 * idx ..= 63 - 4 * idx`,
/// so row 0 occupies the top 16 bits and column 0 the top nybble of each row.
/// Each nybble stores the tile exponent (0 = empty, 1 = 2, 2 = 4, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board(BoardRaw);

/// Outcome of applying one direction to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResult {
    pub board: Board,
    /// Sum of the values of tiles created by merges during this move.
    pub score: Score,
    pub changed: bool,
}

impl Board {
    /// A constant empty board (all zeros).
    pub const EMPTY: Board = Board(0);

    /// Construct a `Board` from its raw packed representation.
    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self { Board(raw) }

    /// Consume this `Board`, returning the raw packed `u64`.
    #[inline]
    pub fn into_raw(self) -> BoardRaw { self.0 }

    /// Borrow the raw packed `u64` for this `Board`.
    #[inline]
    pub fn raw(&self) -> BoardRaw { self.0 }

    /// Build a board from row-major exponents.
    ///
    /// ```
    /// use bot_2048::engine::Board;
    /// let b = Board::from_exponents([[1, 1, 2, 0], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(b.raw(), 0x1120_0000_0000_0000);
    /// ```
    pub fn from_exponents(rows: [[u8; 4]; 4]) -> Self {
        let mut board = Board::EMPTY;
        for (r, row) in rows.iter().enumerate() {
            for (c, &e) in row.iter().enumerate() {
                board = board.with_exponent(r * 4 + c, e);
            }
        }
        board
    }

    /// Row-major exponents of every cell.
    pub fn to_exponents(self) -> [[u8; 4]; 4] {
        let mut rows = [[0u8; 4]; 4];
        for (idx, cell) in rows.iter_mut().flatten().enumerate() {
            *cell = self.exponent(idx);
        }
        rows
    }

    /// Exponent stored at `idx` (row-major, 0..16).
    #[inline]
    pub fn exponent(self, idx: usize) -> u8 {
        ((self.0 >> (60 - 4 * idx)) & 0xf) as u8
    }

    /// Copy of this board with cell `idx` set to exponent `e` (clamped to 15).
    #[inline]
    pub fn with_exponent(self, idx: usize, e: u8) -> Self {
        let shift = 60 - 4 * idx;
        let cleared = self.0 & !(0xf << shift);
        Board(cleared | ((e.min(MAX_EXPONENT) as u64) << shift))
    }

    /// Get the actual value at index (0 if empty, otherwise 2^exponent).
    #[inline]
    pub fn tile_value(self, idx: usize) -> u32 {
        match self.exponent(idx) {
            0 => 0,
            e => 1 << e,
        }
    }

    /// Slide/merge in `dir` and report the new board, score and whether anything moved.
    ///
    /// ```
    /// use bot_2048::engine::{self as GameEngine, Board, Move};
    /// GameEngine::new();
    /// let b = Board::from_raw(0x1120_0000_0000_0000);
    /// let r = b.apply(Move::Left);
    /// assert_eq!(r.board.raw(), 0x2200_0000_0000_0000);
    /// assert_eq!(r.score, 4);
    /// assert!(r.changed);
    /// ```
    #[inline]
    pub fn apply(self, dir: Move) -> MoveResult { apply_move(self, dir) }

    /// Return the board resulting from sliding/merging tiles in `dir` (no random insert).
    #[inline]
    pub fn shift(self, dir: Move) -> Self { apply_move(self, dir).board }

    /// Insert a random 2 (90%) or 4 (10%) tile into a random empty slot, using the provided RNG.
    ///
    /// A full board is returned unchanged.
    ///
    /// ```
    /// use bot_2048::engine::Board;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let empty = self.count_empty();
        if empty == 0 {
            return self;
        }
        let mut index = rng.gen_range(0..empty);
        let mut tmp = self.0;
        let mut tile: u64 = if rng.gen_range(0..10) < 9 { 1 } else { 2 };
        loop {
            while (tmp & 0xf) != 0 {
                tmp >>= 4;
                tile <<= 4;
            }
            if index == 0 { break; }
            index -= 1;
            tmp >>= 4;
            tile <<= 4;
        }
        Board(self.0 | tile)
    }

    /// Count the number of empty cells on the board.
    #[inline]
    pub fn count_empty(self) -> u32 { count_empty(self) }

    /// Row-major indices of the empty cells.
    pub fn empty_cells(self) -> impl Iterator<Item = usize> {
        (0..16).filter(move |&idx| self.exponent(idx) == 0)
    }

    /// True if two orthogonally adjacent cells hold the same mergeable tile.
    pub fn has_adjacent_pair(self) -> bool {
        let cols = transpose(self.0);
        (0..4).any(|i| line_has_pair(extract_line(self.0, i)) || line_has_pair(extract_line(cols, i)))
    }

    /// Return true if no legal moves remain: no empty cell and no adjacent equal pair.
    ///
    /// ```
    /// use bot_2048::engine::Board;
    /// assert!(!Board::EMPTY.is_game_over());
    /// assert!(Board::from_raw(0x1212_2121_1212_2121).is_game_over());
    /// ```
    #[inline]
    pub fn is_game_over(self) -> bool { is_game_over(self) }

    /// Largest exponent on the board (0 when empty).
    pub fn max_exponent(self) -> u8 {
        (0..16).map(|idx| self.exponent(idx)).max().unwrap_or(0)
    }

    /// Return the highest tile value (e.g., 2048) present on the board.
    #[inline]
    pub fn highest_tile(self) -> u32 {
        match self.max_exponent() {
            0 => 0,
            e => 1 << e,
        }
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for row in 0..4 {
            if row > 0 {
                writeln!(f, "-------------------------------")?;
            }
            let cells: Vec<String> = (0..4).map(|col| format_val(self.tile_value(row * 4 + col))).collect();
            writeln!(f, "{}", cells.join("|"))?;
        }
        Ok(())
    }
}

impl From<BoardRaw> for Board { fn from(v: BoardRaw) -> Self { Board::from_raw(v) } }
impl From<Board> for BoardRaw { fn from(b: Board) -> Self { b.into_raw() } }

/// Initialize internal tables on first use. Safe to call multiple times.
pub fn new() {
    let _ = stores();
}

/// Look up the precomputed transition for a single row.
#[inline]
pub fn row_entry(line: u16) -> RowEntry {
    stores()[line as usize]
}

/// Apply `direction` to `board`.
///
/// `changed` compares the final board against the input rather than trusting
/// per-row results, so transposition never hides or invents a change.
pub fn apply_move(board: Board, direction: Move) -> MoveResult {
    let (raw, score) = match direction {
        Move::Left => slide_rows_left(board.0),
        Move::Right => slide_rows_right(board.0),
        Move::Up => {
            let (t, score) = slide_rows_left(transpose(board.0));
            (transpose(t), score)
        }
        Move::Down => {
            let (t, score) = slide_rows_right(transpose(board.0));
            (transpose(t), score)
        }
    };
    let moved = Board(raw);
    MoveResult { board: moved, score, changed: moved != board }
}

/// Slide/merge tiles in the given direction. No randomness.
pub fn shift(board: Board, direction: Move) -> Board {
    apply_move(board, direction).board
}

/// Authoritative game-over check: the board is full and no neighbours match.
pub fn is_game_over(board: Board) -> bool {
    count_empty(board) == 0 && !board.has_adjacent_pair()
}

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

#[inline]
pub(crate) fn extract_line(board: BoardRaw, line_idx: u32) -> Line {
    ((board >> ((3 - line_idx) * 16)) & 0xffff) as Line
}

pub(crate) fn line_to_array(line: Line) -> [u8; 4] {
    [
        ((line >> 12) & 0xf) as u8,
        ((line >> 8) & 0xf) as u8,
        ((line >> 4) & 0xf) as u8,
        (line & 0xf) as u8,
    ]
}

fn array_to_line(tiles: [u8; 4]) -> Line {
    (tiles[0] as Line) << 12 | (tiles[1] as Line) << 8 | (tiles[2] as Line) << 4 | tiles[3] as Line
}

// https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
/// Count the number of zero tiles.
pub fn count_empty(board: Board) -> u32 {
    16 - count_non_empty(board)
}

fn count_non_empty(board: Board) -> u32 {
    let mut board_copy = board.0;
    board_copy |= board_copy >> 1;
    board_copy |= board_copy >> 2;
    board_copy &= 0x1111111111111111;
    board_copy.count_ones()
}

static STORES: OnceLock<Box<[RowEntry]>> = OnceLock::new();

#[inline(always)]
fn stores() -> &'static [RowEntry] {
    STORES.get_or_init(create_stores)
}

fn create_stores() -> Box<[RowEntry]> {
    // Allocate on the heap to avoid large stack frames
    let mut table = vec![RowEntry::default(); LINE_TABLE_SIZE];
    for (val, slot) in table.iter_mut().enumerate() {
        let line = val as Line;
        let (left, score) = slide_line_left(line);
        *slot = RowEntry { left, score, reversed: reverse_line(line) };
    }
    table.into_boxed_slice()
}

fn reverse_line(line: Line) -> Line {
    let mut tiles = line_to_array(line);
    tiles.reverse();
    array_to_line(tiles)
}

/// Slide toward index 0. A tile produced by a merge cannot merge again in the
/// same pass, and exponent-15 tiles never merge.
fn slide_line_left(line: Line) -> (Line, u32) {
    let mut out = [0u8; 4];
    let mut merged = [false; 4];
    let mut len = 0;
    let mut score = 0u32;
    for tile in line_to_array(line) {
        if tile == 0 {
            continue;
        }
        if len > 0 && out[len - 1] == tile && !merged[len - 1] && tile < MAX_EXPONENT {
            out[len - 1] += 1;
            merged[len - 1] = true;
            score += 1 << (tile + 1);
        } else {
            out[len] = tile;
            len += 1;
        }
    }
    (array_to_line(out), score)
}

fn slide_rows_left(board: BoardRaw) -> (BoardRaw, Score) {
    let table = stores();
    (0..4).fold((0, 0), |(new_board, score), row_idx| {
        let entry = table[extract_line(board, row_idx) as usize];
        (new_board | ((entry.left as u64) << (48 - 16 * row_idx)), score + entry.score as Score)
    })
}

fn slide_rows_right(board: BoardRaw) -> (BoardRaw, Score) {
    let table = stores();
    (0..4).fold((0, 0), |(new_board, score), row_idx| {
        let reversed = table[extract_line(board, row_idx) as usize].reversed;
        let entry = table[reversed as usize];
        let row = table[entry.left as usize].reversed;
        (new_board | ((row as u64) << (48 - 16 * row_idx)), score + entry.score as Score)
    })
}

fn line_has_pair(line: Line) -> bool {
    let t = line_to_array(line);
    (0..3).any(|i| t[i] != 0 && t[i] < MAX_EXPONENT && t[i] == t[i + 1])
}

fn format_val(val: u32) -> String {
    match val {
        0 => " ".repeat(7),
        x => format!("{:^7}", x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_slide_line_left() {
        assert_eq!(slide_line_left(0x0000), (0x0000, 0));
        assert_eq!(slide_line_left(0x1212), (0x1212, 0));
        assert_eq!(slide_line_left(0x1122), (0x2300, 12));
        assert_eq!(slide_line_left(0x1001), (0x2000, 4));
        assert_eq!(slide_line_left(0x2211), (0x3200, 12));
    }

    #[test]
    fn merged_tile_does_not_merge_again() {
        assert_eq!(slide_line_left(0x1111), (0x2200, 8));
        assert_eq!(slide_line_left(0x1120), (0x2200, 4));
    }

    #[test]
    fn max_exponent_tiles_stay_put() {
        assert_eq!(slide_line_left(0xff00), (0xff00, 0));
        assert_eq!(slide_line_left(0x0ff0), (0xff00, 0));
    }

    #[test]
    fn row_entry_reverses_input() {
        new();
        let e = row_entry(0x1230);
        assert_eq!(e.reversed, 0x0321);
        assert_eq!(e.left, 0x1230);
        assert_eq!(row_entry(0x0000).reversed, 0x0000);
    }

    #[test]
    fn test_shift_left() {
        new();
        assert_eq!(shift(Board::from_raw(0x0000), Move::Left), Board::from_raw(0x0000));
        assert_eq!(shift(Board::from_raw(0x0002), Move::Left), Board::from_raw(0x2000));
        assert_eq!(shift(Board::from_raw(0x2020), Move::Left), Board::from_raw(0x3000));
        assert_eq!(shift(Board::from_raw(0x1332), Move::Left), Board::from_raw(0x1420));
        assert_eq!(shift(Board::from_raw(0x1234), Move::Left), Board::from_raw(0x1234));
        assert_eq!(shift(Board::from_raw(0x1002), Move::Left), Board::from_raw(0x1200));
        assert_ne!(shift(Board::from_raw(0x1210), Move::Left), Board::from_raw(0x2200));
    }

    #[test]
    fn test_shift_right() {
        new();
        assert_eq!(shift(Board::from_raw(0x0000), Move::Right), Board::from_raw(0x0000));
        assert_eq!(shift(Board::from_raw(0x2000), Move::Right), Board::from_raw(0x0002));
        assert_eq!(shift(Board::from_raw(0x2020), Move::Right), Board::from_raw(0x0003));
        assert_eq!(shift(Board::from_raw(0x1332), Move::Right), Board::from_raw(0x0142));
        assert_eq!(shift(Board::from_raw(0x1234), Move::Right), Board::from_raw(0x1234));
        assert_eq!(shift(Board::from_raw(0x1002), Move::Right), Board::from_raw(0x0012));
    }

    #[test]
    fn test_move_left() {
        let r = apply_move(Board::from_raw(0x1234133220021002), Move::Left);
        assert_eq!(r.board, Board::from_raw(0x1234142030001200));
        assert_eq!(r.score, 24);
        assert!(r.changed);
    }

    #[test]
    fn test_move_up() {
        let r = apply_move(Board::from_raw(0x1121230033004222), Move::Up);
        assert_eq!(r.board, Board::from_raw(0x1131240232004000));
        assert_eq!(r.score, 24);
    }

    #[test]
    fn test_move_right() {
        let r = apply_move(Board::from_raw(0x1234133220021002), Move::Right);
        assert_eq!(r.board, Board::from_raw(0x1234014200030012));
        assert_eq!(r.score, 24);
    }

    #[test]
    fn test_move_down() {
        let r = apply_move(Board::from_raw(0x1121230033004222), Move::Down);
        assert_eq!(r.board, Board::from_raw(0x1000210034014232));
        assert_eq!(r.score, 24);
    }

    #[test]
    fn no_op_move_reports_unchanged() {
        let b = Board::from_raw(0x1234_0000_0000_0000);
        let r = apply_move(b, Move::Left);
        assert!(!r.changed);
        assert_eq!(r.board, b);
        assert_eq!(r.score, 0);
        assert!(!apply_move(b, Move::Up).changed);
        assert!(apply_move(b, Move::Down).changed);
    }

    #[test]
    fn transpose_is_an_involution() {
        for raw in [0x0123456789abcdef_u64, 0x1121230033004222, 0xf000_0000_0000_000f] {
            assert_eq!(transpose(transpose(raw)), raw);
        }
        assert_eq!(transpose(0x1000_2000_3000_4000), 0x1234_0000_0000_0000);
    }

    #[test]
    fn it_count_empty() {
        let game = Board::from_raw(0x1111000011110000);
        assert_eq!(count_empty(game), 8);
        let game = Board::from_raw(0x1100000000000000);
        assert_eq!(count_empty(game), 14);
        assert_eq!(Board::from_raw(0x1134000000000000).empty_cells().count(), 12);
    }

    #[test]
    fn it_get_tile_val() {
        let game = Board::from_raw(0x0123456789abcdef);
        assert_eq!(game.tile_value(0), 0);
        assert_eq!(game.tile_value(3), 8);
        assert_eq!(game.tile_value(10), 1024);
        assert_eq!(game.tile_value(15), 32768);
        assert_eq!(game.highest_tile(), 32768);
    }

    #[test]
    fn with_exponent_overwrites_and_clamps() {
        let b = Board::EMPTY.with_exponent(5, 3).with_exponent(5, 20);
        assert_eq!(b.exponent(5), MAX_EXPONENT);
        assert_eq!(b.count_empty(), 15);
    }

    #[test]
    fn game_over_needs_full_board_without_pairs() {
        assert!(Board::from_raw(0x1212_2121_1212_2121).is_game_over());
        // full, but a vertical pair in column 0
        assert!(!Board::from_raw(0x1212_1121_2212_1121).is_game_over());
        // one hole
        assert!(!Board::from_raw(0x1212_2121_1212_2120).is_game_over());
    }

    #[test]
    fn game_over_agrees_with_move_simulation() {
        let boards = [
            0x1212_2121_1212_2121_u64,
            0x1234_5678_9abc_def1,
            0x1234_5678_9abc_def2,
            0x1212_2121_1212_2122,
            0x1234_2341_3412_4123,
            0xffff_eeee_dddd_cccc,
            0xffff_efef_fefe_efef,
        ];
        for raw in boards {
            let b = Board::from_raw(raw);
            let stuck = Move::ALL.iter().all(|&m| !apply_move(b, m).changed);
            assert_eq!(b.is_game_over(), b.count_empty() == 0 && stuck, "{:?}", b);
        }
    }

    #[test]
    fn random_tile_fills_board() {
        use rand::{rngs::StdRng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let mut game = Board::EMPTY;
        for _ in 0..16 {
            game = game.with_random_tile(&mut rng);
        }
        assert_eq!(count_empty(game), 0);
        assert!((0..16).all(|i| matches!(game.exponent(i), 1 | 2)));
        assert_eq!(game.with_random_tile(&mut rng), game);
    }

    #[test]
    fn move_order_and_vectors() {
        assert_eq!(Move::ALL.map(Move::index), [0, 1, 2, 3]);
        assert_eq!(Move::try_from(2), Ok(Move::Down));
        assert_eq!(Move::try_from(4), Err(4));
        assert_eq!(Move::Left.vector(), (-1, 0));
        assert_eq!(Move::Up.to_string(), "up");
    }
}
