use smallvec::SmallVec;
use std::fmt::{self, Write};
use std::str::FromStr;

const WHITE: usize = 0;
const BLACK: usize = 1;

const PAWN: usize = 0;
const KNIGHT: usize = 1;
const BISHOP: usize = 2;
const ROOK: usize = 3;
const QUEEN: usize = 4;
const KING: usize = 5;

// Ray directions. Indexes below 4 travel towards higher square indexes,
// which is what `ray_attacks` relies on when picking the nearest blocker.
const NORTH: usize = 0;
const EAST: usize = 1;
const NORTH_EAST: usize = 2;
const NORTH_WEST: usize = 3;
const SOUTH: usize = 4;
const WEST: usize = 5;
const SOUTH_EAST: usize = 6;
const SOUTH_WEST: usize = 7;

const KNIGHT_DELTAS: [(i8, i8); 8] = [
   (1, 2),
   (2, 1),
   (2, -1),
   (1, -2),
   (-1, -2),
   (-2, -1),
   (-2, 1),
   (-1, 2),
];
const KING_DELTAS: [(i8, i8); 8] = [
   (0, 1),
   (1, 1),
   (1, 0),
   (1, -1),
   (0, -1),
   (-1, -1),
   (-1, 0),
   (-1, 1),
];
const WHITE_PAWN_DELTAS: [(i8, i8); 2] = [(-1, 1), (1, 1)];
const BLACK_PAWN_DELTAS: [(i8, i8); 2] = [(-1, -1), (1, -1)];

const fn jump_table(deltas: &[(i8, i8)]) -> [u64; 64] {
   let mut table = [0u64; 64];
   let mut sq = 0;
   while sq < 64 {
      let file = (sq % 8) as i8;
      let rank = (sq / 8) as i8;
      let mut i = 0;
      while i < deltas.len() {
         let f = file + deltas[i].0;
         let r = rank + deltas[i].1;
         if f >= 0 && f < 8 && r >= 0 && r < 8 {
            table[sq] |= 1u64 << ((r * 8 + f) as u32);
         }
         i += 1;
      }
      sq += 1;
   }
   table
}

const fn ray_table(df: i8, dr: i8) -> [u64; 64] {
   let mut table = [0u64; 64];
   let mut sq = 0;
   while sq < 64 {
      let mut f = (sq % 8) as i8 + df;
      let mut r = (sq / 8) as i8 + dr;
      let mut bb = 0u64;
      while f >= 0 && f < 8 && r >= 0 && r < 8 {
         bb |= 1u64 << ((r * 8 + f) as u32);
         f += df;
         r += dr;
      }
      table[sq] = bb;
      sq += 1;
   }
   table
}

const KNIGHT_ATTACKS: [u64; 64] = jump_table(&KNIGHT_DELTAS);
const KING_ATTACKS: [u64; 64] = jump_table(&KING_DELTAS);
const PAWN_ATTACKS: [[u64; 64]; 2] = [jump_table(&WHITE_PAWN_DELTAS), jump_table(&BLACK_PAWN_DELTAS)];

const RAYS: [[u64; 64]; 8] = [
   ray_table(0, 1),
   ray_table(1, 0),
   ray_table(1, 1),
   ray_table(-1, 1),
   ray_table(0, -1),
   ray_table(-1, 0),
   ray_table(1, -1),
   ray_table(-1, -1),
];

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A board square, indexed 0..64 with a1 = 0 and h8 = 63.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
   pub fn from_index(index: u8) -> Square {
      debug_assert!(index < 64);
      Square(index)
   }

   pub fn from_file_rank(file: u8, rank: u8) -> Square {
      debug_assert!(file < 8 && rank < 8);
      Square(rank * 8 + file)
   }

   pub fn index(self) -> usize {
      self.0 as usize
   }

   pub fn file(self) -> u8 {
      self.0 % 8
   }

   pub fn rank(self) -> u8 {
      self.0 / 8
   }

   fn bb(self) -> u64 {
      1u64 << self.0
   }
}

impl fmt::Display for Square {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}{}", (b'a' + self.file()) as char, self.rank() + 1)
   }
}

impl fmt::Debug for Square {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      fmt::Display::fmt(self, f)
   }
}

impl FromStr for Square {
   type Err = String;

   fn from_str(s: &str) -> Result<Square, String> {
      let bytes = s.as_bytes();
      if bytes.len() != 2 {
         return Err(format!("{} is not a valid algebraic square", s));
      }
      let file = match bytes[0] {
         b @ b'a'..=b'h' => b - b'a',
         other => {
            return Err(format!(
               "{} is not a valid algebraic file, expected a..=h",
               other as char
            ))
         }
      };
      let rank = match bytes[1] {
         b @ b'1'..=b'8' => b - b'1',
         other => {
            return Err(format!(
               "{} is not a valid algebraic rank, expected 1..=8",
               other as char
            ))
         }
      };
      Ok(Square::from_file_rank(file, rank))
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
   White,
   Black,
}

impl Color {
   fn index(self) -> usize {
      match self {
         Color::White => WHITE,
         Color::Black => BLACK,
      }
   }
}

impl std::ops::Not for Color {
   type Output = Color;
   fn not(self) -> Color {
      match self {
         Color::Black => Color::White,
         Color::White => Color::Black,
      }
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Piece {
   Pawn,
   Knight,
   Bishop,
   Rook,
   Queen,
   King,
}

impl Piece {
   fn index(self) -> usize {
      match self {
         Piece::Pawn => PAWN,
         Piece::Knight => KNIGHT,
         Piece::Bishop => BISHOP,
         Piece::Rook => ROOK,
         Piece::Queen => QUEEN,
         Piece::King => KING,
      }
   }

   fn from_index(index: usize) -> Piece {
      match index {
         PAWN => Piece::Pawn,
         KNIGHT => Piece::Knight,
         BISHOP => Piece::Bishop,
         ROOK => Piece::Rook,
         QUEEN => Piece::Queen,
         _ => Piece::King,
      }
   }

   pub fn name(self) -> &'static str {
      match self {
         Piece::Pawn => "pawn",
         Piece::Knight => "knight",
         Piece::Bishop => "bishop",
         Piece::Rook => "rook",
         Piece::Queen => "queen",
         Piece::King => "king",
      }
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromotionPiece {
   Knight,
   Bishop,
   Rook,
   Queen,
}

impl PromotionPiece {
   fn piece_index(self) -> usize {
      match self {
         PromotionPiece::Knight => KNIGHT,
         PromotionPiece::Bishop => BISHOP,
         PromotionPiece::Rook => ROOK,
         PromotionPiece::Queen => QUEEN,
      }
   }

   pub fn piece(self) -> Piece {
      Piece::from_index(self.piece_index())
   }
}

impl fmt::Display for PromotionPiece {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      let display = match self {
         PromotionPiece::Knight => "n",
         PromotionPiece::Bishop => "b",
         PromotionPiece::Rook => "r",
         PromotionPiece::Queen => "q",
      };
      write!(f, "{}", display)
   }
}

impl FromStr for PromotionPiece {
   type Err = String;

   fn from_str(s: &str) -> Result<PromotionPiece, String> {
      match s {
         "n" => Ok(PromotionPiece::Knight),
         "b" => Ok(PromotionPiece::Bishop),
         "r" => Ok(PromotionPiece::Rook),
         "q" => Ok(PromotionPiece::Queen),
         _ => Err(format!("Expected one of ASCII nbrq for promotion piece, got {}", s)),
      }
   }
}

/// A fully specified legal move. Only `State::legal_moves` constructs these;
/// everything else matches against them or applies them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegalMove {
   pub origin: Square,
   pub destination: Square,
   pub promotion: Option<PromotionPiece>,
   pub is_capture: bool,
   pub is_en_passant: bool,
   pub is_castle_kingside: bool,
   pub is_castle_queenside: bool,
   pub gives_check: bool,
}

impl LegalMove {
   fn quiet(origin: Square, destination: Square) -> LegalMove {
      LegalMove {
         origin,
         destination,
         promotion: None,
         is_capture: false,
         is_en_passant: false,
         is_castle_kingside: false,
         is_castle_queenside: false,
         gives_check: false,
      }
   }

   fn capture(origin: Square, destination: Square) -> LegalMove {
      LegalMove {
         is_capture: true,
         ..LegalMove::quiet(origin, destination)
      }
   }

   pub fn to_uci(&self) -> UciMove {
      UciMove {
         origin: self.origin,
         destination: self.destination,
         promotion: self.promotion,
      }
   }

   pub fn matches_uci(&self, uci: &UciMove) -> bool {
      self.origin == uci.origin && self.destination == uci.destination && self.promotion == uci.promotion
   }
}

impl fmt::Display for LegalMove {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}", self.to_uci())
   }
}

/// A move in the remote protocol's coordinate notation. Parsed from the wire
/// and matched against enumerated legal moves, never applied directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UciMove {
   pub origin: Square,
   pub destination: Square,
   pub promotion: Option<PromotionPiece>,
}

impl fmt::Display for UciMove {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}{}", self.origin, self.destination)?;
      if let Some(promotion) = self.promotion {
         write!(f, "{}", promotion)?;
      }
      Ok(())
   }
}

impl FromStr for UciMove {
   type Err = String;

   fn from_str(s: &str) -> Result<UciMove, String> {
      if s.len() < 4 || s.len() > 5 {
         return Err(format!(
            "A full move has to be 4-5 bytes long, got a move ({}) that was {} bytes long",
            s,
            s.len()
         ));
      }
      let promotion = match s.get(4..5) {
         Some(p) => Some(p.parse::<PromotionPiece>()?),
         None => None,
      };
      Ok(UciMove {
         origin: s[..2].parse()?,
         destination: s[2..4].parse()?,
         promotion,
      })
   }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bitboards {
   pieces: [[u64; 6]; 2],
   by_color: [u64; 2],
   occupied: u64,
}

impl Bitboards {
   fn empty() -> Bitboards {
      Bitboards {
         pieces: [[0; 6]; 2],
         by_color: [0; 2],
         occupied: 0,
      }
   }

   fn add(&mut self, color: usize, piece: usize, square: Square) {
      let bb = square.bb();
      self.pieces[color][piece] |= bb;
      self.by_color[color] |= bb;
      self.occupied |= bb;
   }

   fn remove(&mut self, color: usize, piece: usize, square: Square) {
      let bb = square.bb();
      self.pieces[color][piece] &= !bb;
      self.by_color[color] &= !bb;
      self.occupied &= !bb;
   }

   pub fn piece_at(&self, square: Square) -> Option<(Color, Piece)> {
      let bb = square.bb();
      if self.occupied & bb == 0 {
         return None;
      }
      let color = if self.by_color[WHITE] & bb > 0 {
         Color::White
      } else {
         Color::Black
      };
      for piece in PAWN..=KING {
         if self.pieces[color.index()][piece] & bb > 0 {
            return Some((color, Piece::from_index(piece)));
         }
      }
      None
   }

   fn king_square(&self, color: usize) -> Square {
      debug_assert!(self.pieces[color][KING] != 0);
      Square(self.pieces[color][KING].trailing_zeros() as u8)
   }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Position {
   pub boards: Bitboards,
   pub side_to_move: Color,
   pub white_kingside_castle: bool,
   pub white_queenside_castle: bool,
   pub black_kingside_castle: bool,
   pub black_queenside_castle: bool,
   pub en_passant: Option<Square>,
}

impl Position {
   pub fn in_check(&self, color: Color) -> bool {
      let king = self.boards.king_square(color.index());
      self.square_is_attacked(color, king.index())
   }

   pub fn square_is_attacked(&self, defender: Color, square: usize) -> bool {
      let attacker = (!defender).index();

      if PAWN_ATTACKS[defender.index()][square] & self.boards.pieces[attacker][PAWN] > 0 {
         return true;
      }

      if KNIGHT_ATTACKS[square] & self.boards.pieces[attacker][KNIGHT] > 0 {
         return true;
      }

      if KING_ATTACKS[square] & self.boards.pieces[attacker][KING] > 0 {
         return true;
      }

      let diagonal_sliders = self.boards.pieces[attacker][BISHOP] | self.boards.pieces[attacker][QUEEN];
      if bishop_attacks(self.boards.occupied, square) & diagonal_sliders > 0 {
         return true;
      }

      let straight_sliders = self.boards.pieces[attacker][ROOK] | self.boards.pieces[attacker][QUEEN];
      if rook_attacks(self.boards.occupied, square) & straight_sliders > 0 {
         return true;
      }

      false
   }

   fn apply(&self, a_move: &LegalMove) -> Position {
      let mut next = self.clone();
      next.make(a_move);
      next
   }

   fn make(&mut self, a_move: &LegalMove) {
      let (color, kind) = match self.boards.piece_at(a_move.origin) {
         Some(occupant) => occupant,
         None => {
            debug_assert!(false, "applied a move with an empty origin square");
            return;
         }
      };
      let us = color.index();
      let them = 1 - us;
      let forward: i8 = if color == Color::White { 8 } else { -8 };

      // Clear whatever is being captured. The en passant victim does not
      // sit on the destination square.
      if a_move.is_en_passant {
         let victim = Square((a_move.destination.index() as i8 - forward) as u8);
         self.boards.remove(them, PAWN, victim);
      } else if let Some((_, captured)) = self.boards.piece_at(a_move.destination) {
         self.boards.remove(them, captured.index(), a_move.destination);
      }

      self.boards.remove(us, kind.index(), a_move.origin);
      match a_move.promotion {
         Some(promotion) => self.boards.add(us, promotion.piece_index(), a_move.destination),
         None => self.boards.add(us, kind.index(), a_move.destination),
      }

      // Castling moves the rook as well, and a king move always forfeits
      // both castling rights.
      if kind == Piece::King {
         let rank_base = if color == Color::White { 0u8 } else { 56u8 };
         if a_move.is_castle_kingside {
            self.boards.remove(us, ROOK, Square(rank_base + 7));
            self.boards.add(us, ROOK, Square(rank_base + 5));
         } else if a_move.is_castle_queenside {
            self.boards.remove(us, ROOK, Square(rank_base));
            self.boards.add(us, ROOK, Square(rank_base + 3));
         }
         match color {
            Color::White => {
               self.white_kingside_castle = false;
               self.white_queenside_castle = false;
            }
            Color::Black => {
               self.black_kingside_castle = false;
               self.black_queenside_castle = false;
            }
         }
      }

      // A rook leaving a corner, or anything landing on one, kills the
      // matching right. Both ends checked independently; a rook capturing
      // the far rook revokes two rights at once.
      for square in &[a_move.origin, a_move.destination] {
         match square.index() {
            0 => self.white_queenside_castle = false,
            7 => self.white_kingside_castle = false,
            56 => self.black_queenside_castle = false,
            63 => self.black_kingside_castle = false,
            _ => {}
         }
      }

      // The en passant window lasts exactly one ply.
      self.en_passant = None;
      if kind == Piece::Pawn {
         let from = a_move.origin.index() as i8;
         let to = a_move.destination.index() as i8;
         if (to - from).abs() == 16 {
            self.en_passant = Some(Square(((from + to) / 2) as u8));
         }
      }

      self.side_to_move = !self.side_to_move;
   }

   fn pseudo_legal_moves(&self, color: Color, results: &mut Vec<LegalMove>) {
      self.pawn_moves(color, results);
      self.jump_moves(color, KNIGHT, &KNIGHT_ATTACKS, results);
      self.slider_moves(color, BISHOP, bishop_attacks, results);
      self.slider_moves(color, ROOK, rook_attacks, results);
      self.slider_moves(color, QUEEN, queen_attacks, results);
      self.jump_moves(color, KING, &KING_ATTACKS, results);
      self.castle_moves(color, results);
   }

   fn pawn_moves(&self, color: Color, results: &mut Vec<LegalMove>) {
      let us = color.index();
      let them = 1 - us;
      let (forward, start_rank, promotion_rank): (i8, u8, u8) = match color {
         Color::White => (8, 1, 7),
         Color::Black => (-8, 6, 0),
      };
      let capturable = self.boards.by_color[them] & !self.boards.pieces[them][KING];
      let ep_bb = self.en_passant.map(|s| s.bb()).unwrap_or(0);

      let mut pawns = self.boards.pieces[us][PAWN];
      while pawns > 0 {
         let from = pop_lsb(&mut pawns) as i8;
         let origin = Square(from as u8);

         let push = from + forward;
         if (0..64).contains(&push) && self.boards.occupied & (1u64 << push) == 0 {
            let destination = Square(push as u8);
            if destination.rank() == promotion_rank {
               push_promotions(results, origin, destination, false);
            } else {
               results.push(LegalMove::quiet(origin, destination));
               if origin.rank() == start_rank {
                  let double = push + forward;
                  if self.boards.occupied & (1u64 << double) == 0 {
                     results.push(LegalMove::quiet(origin, Square(double as u8)));
                  }
               }
            }
         }

         let mut attacks = PAWN_ATTACKS[us][from as usize] & capturable;
         while attacks > 0 {
            let to = pop_lsb(&mut attacks);
            let destination = Square(to as u8);
            if destination.rank() == promotion_rank {
               push_promotions(results, origin, destination, true);
            } else {
               results.push(LegalMove::capture(origin, destination));
            }
         }

         let en_passant = PAWN_ATTACKS[us][from as usize] & ep_bb;
         if en_passant > 0 {
            let mut a_move = LegalMove::capture(origin, Square(en_passant.trailing_zeros() as u8));
            a_move.is_en_passant = true;
            results.push(a_move);
         }
      }
   }

   fn jump_moves(&self, color: Color, piece: usize, table: &[u64; 64], results: &mut Vec<LegalMove>) {
      let us = color.index();
      let them = 1 - us;
      let mut origins = self.boards.pieces[us][piece];
      while origins > 0 {
         let from = pop_lsb(&mut origins) as usize;
         let targets = table[from] & !self.boards.by_color[us] & !self.boards.pieces[them][KING];
         self.add_moves(Square(from as u8), targets, them, results);
      }
   }

   fn slider_moves(&self, color: Color, piece: usize, attacks: fn(u64, usize) -> u64, results: &mut Vec<LegalMove>) {
      let us = color.index();
      let them = 1 - us;
      let mut origins = self.boards.pieces[us][piece];
      while origins > 0 {
         let from = pop_lsb(&mut origins) as usize;
         let targets = attacks(self.boards.occupied, from) & !self.boards.by_color[us] & !self.boards.pieces[them][KING];
         self.add_moves(Square(from as u8), targets, them, results);
      }
   }

   fn add_moves(&self, origin: Square, mut targets: u64, them: usize, results: &mut Vec<LegalMove>) {
      while targets > 0 {
         let to = pop_lsb(&mut targets);
         let destination = Square(to as u8);
         if self.boards.by_color[them] & destination.bb() > 0 {
            results.push(LegalMove::capture(origin, destination));
         } else {
            results.push(LegalMove::quiet(origin, destination));
         }
      }
   }

   fn castle_moves(&self, color: Color, results: &mut Vec<LegalMove>) {
      let (kingside, queenside, rank_base) = match color {
         Color::White => (self.white_kingside_castle, self.white_queenside_castle, 0u8),
         Color::Black => (self.black_kingside_castle, self.black_queenside_castle, 56u8),
      };
      if !kingside && !queenside {
         return;
      }
      if self.in_check(color) {
         return;
      }
      let king_from = Square(rank_base + 4);

      if kingside {
         let path = Square(rank_base + 5).bb() | Square(rank_base + 6).bb();
         let path_occupied = self.boards.occupied & path > 0;
         let path_attacked = self.square_is_attacked(color, (rank_base + 5) as usize)
            || self.square_is_attacked(color, (rank_base + 6) as usize);
         if !path_occupied && !path_attacked {
            let mut a_move = LegalMove::quiet(king_from, Square(rank_base + 6));
            a_move.is_castle_kingside = true;
            results.push(a_move);
         }
      }

      if queenside {
         let path = Square(rank_base + 1).bb() | Square(rank_base + 2).bb() | Square(rank_base + 3).bb();
         let path_occupied = self.boards.occupied & path > 0;
         let path_attacked = self.square_is_attacked(color, (rank_base + 2) as usize)
            || self.square_is_attacked(color, (rank_base + 3) as usize);
         if !path_occupied && !path_attacked {
            let mut a_move = LegalMove::quiet(king_from, Square(rank_base + 2));
            a_move.is_castle_queenside = true;
            results.push(a_move);
         }
      }
   }
}

fn push_promotions(results: &mut Vec<LegalMove>, origin: Square, destination: Square, is_capture: bool) {
   for target in &[
      PromotionPiece::Queen,
      PromotionPiece::Rook,
      PromotionPiece::Bishop,
      PromotionPiece::Knight,
   ] {
      let mut a_move = if is_capture {
         LegalMove::capture(origin, destination)
      } else {
         LegalMove::quiet(origin, destination)
      };
      a_move.promotion = Some(*target);
      results.push(a_move);
   }
}

fn pop_lsb(board: &mut u64) -> u32 {
   debug_assert!(*board != 0);
   let lsb_index = board.trailing_zeros();
   *board &= *board - 1;
   lsb_index
}

fn ray_attacks(direction: usize, square: usize, occupied: u64) -> u64 {
   let ray = RAYS[direction][square];
   let blockers = ray & occupied;
   if blockers == 0 {
      return ray;
   }
   let block_square = if direction < 4 {
      blockers.trailing_zeros()
   } else {
      63 - blockers.leading_zeros()
   };
   ray ^ RAYS[direction][block_square as usize]
}

fn bishop_attacks(occupied: u64, square: usize) -> u64 {
   ray_attacks(NORTH_EAST, square, occupied)
      | ray_attacks(NORTH_WEST, square, occupied)
      | ray_attacks(SOUTH_EAST, square, occupied)
      | ray_attacks(SOUTH_WEST, square, occupied)
}

fn rook_attacks(occupied: u64, square: usize) -> u64 {
   ray_attacks(NORTH, square, occupied)
      | ray_attacks(EAST, square, occupied)
      | ray_attacks(SOUTH, square, occupied)
      | ray_attacks(WEST, square, occupied)
}

fn queen_attacks(occupied: u64, square: usize) -> u64 {
   bishop_attacks(occupied, square) | rook_attacks(occupied, square)
}

/// How a game ended on the board, derived purely from the position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
   Ongoing,
   Checkmate { winner: Color },
   DrawStalemate,
   DrawRepetition,
   DrawFiftyMoves,
   DrawInsufficientMaterial,
}

/// Full game state: the position plus the counters and history the draw
/// rules need. Applying a move returns a fresh state.
#[derive(Clone, PartialEq, Eq)]
pub struct State {
   pub position: Position,
   pub halfmove_clock: u32,
   pub fullmove_number: u32,
   pub prior_positions: SmallVec<[Position; 8]>,
}

impl State {
   pub fn initial() -> State {
      State::from_fen(START_FEN).unwrap()
   }

   pub fn side_to_move(&self) -> Color {
      self.position.side_to_move
   }

   pub fn is_check(&self) -> bool {
      self.position.in_check(self.position.side_to_move)
   }

   pub fn is_checkmate(&self) -> bool {
      self.legal_moves().is_empty() && self.is_check()
   }

   pub fn is_stalemate(&self) -> bool {
      self.legal_moves().is_empty() && !self.is_check()
   }

   pub fn legal_moves(&self) -> Vec<LegalMove> {
      let mover = self.position.side_to_move;
      let mut pseudo = Vec::with_capacity(64);
      self.position.pseudo_legal_moves(mover, &mut pseudo);

      let mut legal = Vec::with_capacity(pseudo.len());
      for mut a_move in pseudo {
         let next = self.position.apply(&a_move);
         if next.in_check(mover) {
            continue;
         }
         a_move.gives_check = next.in_check(!mover);
         legal.push(a_move);
      }
      legal
   }

   #[must_use]
   pub fn apply(&self, a_move: &LegalMove) -> State {
      let is_pawn_move = self
         .position
         .boards
         .piece_at(a_move.origin)
         .map(|(_, piece)| piece == Piece::Pawn)
         .unwrap_or(false);
      let (halfmove_clock, prior_positions) = if a_move.is_capture || is_pawn_move {
         (0, SmallVec::new())
      } else {
         let mut prior = self.prior_positions.clone();
         prior.push(self.position.clone());
         (self.halfmove_clock + 1, prior)
      };
      let fullmove_number = match self.position.side_to_move {
         Color::White => self.fullmove_number,
         Color::Black => self.fullmove_number + 1,
      };

      State {
         position: self.position.apply(a_move),
         halfmove_clock,
         fullmove_number,
         prior_positions,
      }
   }

   /// Finds the legal move the wire notation names, if any. `None` on a
   /// position where that move is not legal, which is how desync shows up.
   pub fn find_legal(&self, uci: &UciMove) -> Option<LegalMove> {
      self.legal_moves().into_iter().find(|m| m.matches_uci(uci))
   }

   pub fn apply_uci(&self, uci: &UciMove) -> Result<State, String> {
      match self.find_legal(uci) {
         Some(a_move) => Ok(self.apply(&a_move)),
         None => Err(format!("{} is not a legal move in this position", uci)),
      }
   }

   pub fn apply_uci_moves(&self, moves: &str) -> Result<State, String> {
      let mut state = self.clone();
      for a_str_move in moves.split_whitespace() {
         let uci: UciMove = a_str_move.parse()?;
         state = state.apply_uci(&uci)?;
      }
      Ok(state)
   }

   pub fn outcome(&self, moves: &[LegalMove]) -> Outcome {
      if self.prior_positions.iter().filter(|x| **x == self.position).count() >= 2 {
         return Outcome::DrawRepetition;
      }

      if moves.is_empty() {
         return if self.position.in_check(self.position.side_to_move) {
            Outcome::Checkmate {
               winner: !self.position.side_to_move,
            }
         } else {
            Outcome::DrawStalemate
         };
      }

      if self.halfmove_clock >= 100 {
         return Outcome::DrawFiftyMoves;
      }

      if self.insufficient_material() {
         return Outcome::DrawInsufficientMaterial;
      }

      Outcome::Ongoing
   }

   fn insufficient_material(&self) -> bool {
      let boards = &self.position.boards;
      for color in &[WHITE, BLACK] {
         if boards.pieces[*color][PAWN] | boards.pieces[*color][ROOK] | boards.pieces[*color][QUEEN] != 0 {
            return false;
         }
      }
      let minors = (boards.pieces[WHITE][KNIGHT]
         | boards.pieces[WHITE][BISHOP]
         | boards.pieces[BLACK][KNIGHT]
         | boards.pieces[BLACK][BISHOP])
         .count_ones();
      minors <= 1
   }

   pub fn from_fen(fen: &str) -> Result<State, String> {
      let sections: Vec<&str> = fen.split_whitespace().collect();
      if sections.len() < 4 || sections.len() > 6 {
         return Err(format!(
            "malformed FEN; expected 4-6 whitespace delimited sections, found {}",
            sections.len()
         ));
      }

      let mut boards = Bitboards::empty();
      let mut index: i32 = 56;
      for ascii_char in sections[0].bytes() {
         if index > 64 || index < 0 {
            return Err("malformed FEN; too many squares on board".into());
         }
         let placement = match ascii_char {
            b'P' => Some((WHITE, PAWN)),
            b'N' => Some((WHITE, KNIGHT)),
            b'B' => Some((WHITE, BISHOP)),
            b'R' => Some((WHITE, ROOK)),
            b'Q' => Some((WHITE, QUEEN)),
            b'K' => Some((WHITE, KING)),
            b'p' => Some((BLACK, PAWN)),
            b'n' => Some((BLACK, KNIGHT)),
            b'b' => Some((BLACK, BISHOP)),
            b'r' => Some((BLACK, ROOK)),
            b'q' => Some((BLACK, QUEEN)),
            b'k' => Some((BLACK, KING)),
            _ => None,
         };
         match placement {
            Some((color, piece)) => {
               if index >= 64 {
                  return Err("malformed FEN; piece placed off the board".into());
               }
               boards.add(color, piece, Square(index as u8));
               index += 1;
            }
            None => match ascii_char {
               b'1'..=b'8' => {
                  index += (ascii_char - b'0') as i32;
               }
               b'/' => {
                  if index % 8 != 0 {
                     return Err(
                        "malformed FEN; got to end of rank without all squares in rank accounted for".into(),
                     );
                  }
                  index -= 16;
               }
               _ => {
                  return Err(format!(
                     "malformed FEN; got unexpected byte {} (ASCII: {}) during piece placement",
                     ascii_char, ascii_char as char
                  ));
               }
            },
         }
      }

      for color in &[WHITE, BLACK] {
         if boards.pieces[*color][KING].count_ones() != 1 {
            return Err("malformed FEN; each side must have exactly one king".into());
         }
      }

      let side_to_move = match sections[1] {
         "w" => Color::White,
         "b" => Color::Black,
         other => {
            return Err(format!(
               "malformed FEN; got {} parsing player to move, expecting one of wb",
               other
            ));
         }
      };

      let mut wkc = false;
      let mut wqc = false;
      let mut bkc = false;
      let mut bqc = false;
      if sections[2] != "-" {
         for ascii_char in sections[2].bytes() {
            match ascii_char {
               b'K' => wkc = true,
               b'Q' => wqc = true,
               b'k' => bkc = true,
               b'q' => bqc = true,
               _ => {
                  return Err(format!(
                     "malformed FEN; found byte {} (ASCII: {}) when parsing castling rights, expected one of KQkq",
                     ascii_char, ascii_char as char
                  ));
               }
            }
         }
      }

      let en_passant = match sections[3] {
         "-" => None,
         algebraic => Some(algebraic.parse::<Square>().map_err(|e| {
            format!("malformed FEN; en passant square was not valid algebraic notation: {}", e)
         })?),
      };

      let halfmove_clock: u32 = match sections.get(4) {
         Some(section) => section
            .parse()
            .map_err(|e| format!("malformed FEN; halfmove clock value {} couldn't be parsed: {}", section, e))?,
         None => 0,
      };

      let fullmove_number: u32 = match sections.get(5) {
         Some(section) => section
            .parse()
            .map_err(|e| format!("malformed FEN; fullmove number value {} couldn't be parsed: {}", section, e))?,
         None => 1,
      };

      Ok(State {
         position: Position {
            boards,
            side_to_move,
            white_kingside_castle: wkc,
            white_queenside_castle: wqc,
            black_kingside_castle: bkc,
            black_queenside_castle: bqc,
            en_passant,
         },
         halfmove_clock,
         fullmove_number,
         prior_positions: SmallVec::new(),
      })
   }

   pub fn to_fen(&self) -> String {
      let mut buf = String::new();
      for rank in (0..8).rev() {
         let mut empty_run = 0;
         for file in 0..8 {
            match self.position.boards.piece_at(Square::from_file_rank(file, rank)) {
               Some((color, piece)) => {
                  if empty_run > 0 {
                     write!(buf, "{}", empty_run).unwrap();
                     empty_run = 0;
                  }
                  let letter = match piece {
                     Piece::Pawn => 'p',
                     Piece::Knight => 'n',
                     Piece::Bishop => 'b',
                     Piece::Rook => 'r',
                     Piece::Queen => 'q',
                     Piece::King => 'k',
                  };
                  if color == Color::White {
                     buf.push(letter.to_ascii_uppercase());
                  } else {
                     buf.push(letter);
                  }
               }
               None => empty_run += 1,
            }
         }
         if empty_run > 0 {
            write!(buf, "{}", empty_run).unwrap();
         }
         if rank > 0 {
            buf.push('/');
         }
      }

      match self.position.side_to_move {
         Color::White => buf.push_str(" w "),
         Color::Black => buf.push_str(" b "),
      }

      let mut any_castle = false;
      for (right, letter) in &[
         (self.position.white_kingside_castle, 'K'),
         (self.position.white_queenside_castle, 'Q'),
         (self.position.black_kingside_castle, 'k'),
         (self.position.black_queenside_castle, 'q'),
      ] {
         if *right {
            buf.push(*letter);
            any_castle = true;
         }
      }
      if !any_castle {
         buf.push('-');
      }

      match self.position.en_passant {
         Some(square) => write!(buf, " {}", square).unwrap(),
         None => buf.push_str(" -"),
      }

      write!(buf, " {} {}", self.halfmove_clock, self.fullmove_number).unwrap();
      buf
   }

   #[cfg(test)]
   pub fn from_uci_move_list(moves: &str) -> State {
      State::initial().apply_uci_moves(moves).unwrap()
   }
}

#[cfg(test)]
mod tests {
   use crate::board::*;

   fn perft(state: &State, depth: u32) -> u64 {
      if depth == 0 {
         return 1;
      }
      let mut nodes = 0;
      for a_move in state.legal_moves() {
         nodes += perft(&state.apply(&a_move), depth - 1);
      }
      nodes
   }

   #[test]
   fn square_conversions() {
      assert_eq!("a1".parse::<Square>(), Ok(Square::from_index(0)));
      assert_eq!("e4".parse::<Square>(), Ok(Square::from_index(28)));
      assert_eq!("e2".parse::<Square>(), Ok(Square::from_index(12)));
      assert_eq!("a8".parse::<Square>(), Ok(Square::from_index(56)));
      assert_eq!("h8".parse::<Square>(), Ok(Square::from_index(63)));
      assert_eq!(format!("{}", Square::from_index(28)), "e4");
      assert!("i4".parse::<Square>().is_err());
      assert!("e9".parse::<Square>().is_err());
   }

   #[test]
   fn uci_move_parsing() {
      assert_eq!(
         "e2e4".parse::<UciMove>(),
         Ok(UciMove {
            origin: "e2".parse().unwrap(),
            destination: "e4".parse().unwrap(),
            promotion: None
         })
      );
      assert_eq!(
         "a7a8q".parse::<UciMove>(),
         Ok(UciMove {
            origin: "a7".parse().unwrap(),
            destination: "a8".parse().unwrap(),
            promotion: Some(PromotionPiece::Queen)
         })
      );
      assert!("e2".parse::<UciMove>().is_err());
      assert!("e2e4qq".parse::<UciMove>().is_err());
   }

   #[test]
   fn uci_move_display_round_trip() {
      for text in &["e2e4", "g8f6", "a7a8q", "h2h1n"] {
         let uci: UciMove = text.parse().unwrap();
         assert_eq!(format!("{}", uci), *text);
      }
   }

   #[test]
   fn perft_from_start() {
      let state = State::initial();
      assert_eq!(perft(&state, 1), 20);
      assert_eq!(perft(&state, 2), 400);
      assert_eq!(perft(&state, 3), 8902);
   }

   #[test]
   fn movegen_counts() {
      let mut state = State::initial();
      assert_eq!(state.legal_moves().len(), 20);
      state = state.apply_uci_moves("e2e4").unwrap();
      assert_eq!(state.legal_moves().len(), 20);
      let state = State::from_uci_move_list("g2g4 e7e5");
      assert_eq!(state.legal_moves().len(), 21);
   }

   #[test]
   fn capture_flags() {
      let state = State::from_uci_move_list("e2e4 d7d5");
      let capture = state.find_legal(&"e4d5".parse().unwrap()).unwrap();
      assert!(capture.is_capture);
      assert!(!capture.is_en_passant);
      let quiet = state.find_legal(&"e4e5".parse().unwrap()).unwrap();
      assert!(!quiet.is_capture);
   }

   #[test]
   fn en_passant_window() {
      let state = State::from_uci_move_list("e2e4 g8f6 e4e5 d7d5");
      assert_eq!(state.position.en_passant, Some("d6".parse().unwrap()));
      let ep = state.find_legal(&"e5d6".parse().unwrap()).unwrap();
      assert!(ep.is_en_passant);
      assert!(ep.is_capture);

      // One ply later the window is gone.
      let state = state.apply_uci_moves("b1c3 b8c6").unwrap();
      assert_eq!(state.position.en_passant, None);
      assert!(state.find_legal(&"e5d6".parse().unwrap()).is_none());
   }

   #[test]
   fn castling_generation_and_flags() {
      let state = State::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
      let kingside = state.find_legal(&"e1g1".parse().unwrap()).unwrap();
      assert!(kingside.is_castle_kingside);
      let queenside = state.find_legal(&"e1c1".parse().unwrap()).unwrap();
      assert!(queenside.is_castle_queenside);

      // Castling through an attacked square is not allowed.
      let state = State::from_fen("r3k2r/8/8/8/8/5q2/8/R3K2R w KQkq - 0 1").unwrap();
      assert!(state.find_legal(&"e1g1".parse().unwrap()).is_none());

      // Neither is castling out of check.
      let state = State::from_fen("r3k2r/8/8/8/8/4q3/8/R3K2R w KQkq - 0 1").unwrap();
      assert!(state.find_legal(&"e1g1".parse().unwrap()).is_none());
      assert!(state.find_legal(&"e1c1".parse().unwrap()).is_none());
   }

   #[test]
   fn castling_applies_rook_movement() {
      let state = State::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
      let after = state.apply_uci_moves("e1g1").unwrap();
      assert_eq!(
         after.position.boards.piece_at("f1".parse().unwrap()),
         Some((Color::White, Piece::Rook))
      );
      assert_eq!(after.position.boards.piece_at("h1".parse().unwrap()), None);
      assert!(!after.position.white_kingside_castle);
      assert!(!after.position.white_queenside_castle);
   }

   #[test]
   fn rook_moves_revoke_castling_rights() {
      let state = State::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
      let after = state.apply_uci_moves("h1h2").unwrap();
      assert!(!after.position.white_kingside_castle);
      assert!(after.position.white_queenside_castle);
      let after = state.apply_uci_moves("a1a8").unwrap();
      assert!(!after.position.white_queenside_castle);
      assert!(!after.position.black_queenside_castle);
   }

   #[test]
   fn check_detection() {
      let state = State::from_uci_move_list("e2e4 e7e5 d1h5 a7a6 h5f7");
      assert!(state.position.in_check(Color::Black));
      assert!(!state.position.in_check(Color::White));
   }

   #[test]
   fn gives_check_flag() {
      let state = State::from_uci_move_list("e2e4 e7e5 d1h5 a7a6");
      let checking = state.find_legal(&"h5f7".parse().unwrap()).unwrap();
      assert!(checking.gives_check);
      let quiet = state.find_legal(&"b1c3".parse().unwrap()).unwrap();
      assert!(!quiet.gives_check);
   }

   #[test]
   fn legal_moves_never_leave_own_king_in_check() {
      let positions = [
         START_FEN,
         "r3k2r/8/8/8/8/5q2/8/R3K2R w KQkq - 0 1",
         "rnbqkbnr/ppp2ppp/8/3pp3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq d6 0 3",
         "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
      ];
      for fen in &positions {
         let state = State::from_fen(fen).unwrap();
         let mover = state.side_to_move();
         for a_move in state.legal_moves() {
            let next = state.apply(&a_move);
            assert!(!next.position.in_check(mover), "{} leaves own king in check", a_move);
         }
      }
   }

   #[test]
   fn checkmate_no_moves() {
      let state = State::from_fen("2b1kr2/4Qp2/8/pP1Np2p/3P4/3BP3/PP3PPP/R3K2R b KQ - 1 19").unwrap();
      assert!(state.legal_moves().is_empty());
   }

   #[test]
   fn fools_mate_is_checkmate() {
      let state = State::from_uci_move_list("f2f3 e7e5 g2g4 d8h4");
      assert!(state.is_checkmate());
      let moves = state.legal_moves();
      assert_eq!(state.outcome(&moves), Outcome::Checkmate { winner: Color::Black });
   }

   #[test]
   fn stalemate_is_draw() {
      let state = State::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
      assert!(state.is_stalemate());
      let moves = state.legal_moves();
      assert_eq!(state.outcome(&moves), Outcome::DrawStalemate);
   }

   #[test]
   fn repetition_is_draw() {
      let state = State::from_uci_move_list("g1f3 g8f6 f3g1 f6g8 g1f3 g8f6 f3g1 f6g8");
      let moves = state.legal_moves();
      assert_eq!(state.outcome(&moves), Outcome::DrawRepetition);
   }

   #[test]
   fn bare_kings_are_insufficient_material() {
      let state = State::from_fen("8/5k2/8/8/2K5/8/8/8 w - - 0 1").unwrap();
      let moves = state.legal_moves();
      assert_eq!(state.outcome(&moves), Outcome::DrawInsufficientMaterial);
   }

   #[test]
   fn promotion_moves_generated() {
      let state = State::from_fen("8/4P2k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
      let promotions: Vec<LegalMove> = state
         .legal_moves()
         .into_iter()
         .filter(|m| m.promotion.is_some())
         .collect();
      assert_eq!(promotions.len(), 4);
      let queen = state.find_legal(&"e7e8q".parse().unwrap()).unwrap();
      assert_eq!(queen.promotion, Some(PromotionPiece::Queen));
      let after = state.apply(&queen);
      assert_eq!(
         after.position.boards.piece_at("e8".parse().unwrap()),
         Some((Color::White, Piece::Queen))
      );
   }

   #[test]
   fn fen_round_trip() {
      let fens = [
         START_FEN,
         "r3k2r/8/8/8/8/5q2/8/R3K2R w KQkq - 0 1",
         "rnbqkbnr/ppp2ppp/8/3pp3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq d6 0 3",
         "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
      ];
      for fen in &fens {
         let state = State::from_fen(fen).unwrap();
         assert_eq!(state.to_fen(), *fen);
      }
   }

   #[test]
   fn fen_requires_exactly_one_king_per_side() {
      assert!(State::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1").is_err());
      assert!(State::from_fen("4k3/8/8/8/8/8/8/KK6 w - - 0 1").is_err());
   }

   #[test]
   fn parses_valid_fen_file() {
      use std::fs::File;
      use std::io::{BufRead, BufReader};

      let file = File::open("tests/positions.fen").unwrap();
      let buf_reader = BufReader::new(file);
      for fen in buf_reader.lines() {
         let fen = fen.unwrap();
         assert!(State::from_fen(&fen).is_ok(), "failed on {}", fen);
      }
   }
}
