use crate::board::{Piece, PromotionPiece, Square};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastleSide {
   Kingside,
   Queenside,
}

/// Where the player said the move starts. A fully spelled origin square
/// pins the move on its own; a bare file only narrows the candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginHint {
   Unspecified,
   File(u8),
   Square(Square),
}

/// What the utterance asked for, before the board has been consulted.
#[derive(Clone, Debug, PartialEq)]
pub enum MoveIntent {
   PawnMove {
      destination: Square,
      origin: OriginHint,
   },
   PieceMove {
      piece: Piece,
      destination: Square,
      origin: OriginHint,
   },
   Capture {
      piece: Option<Piece>,
      destination: Square,
      origin: OriginHint,
   },
   Promotion {
      destination: Option<Square>,
      origin: OriginHint,
      promotion: Option<PromotionPiece>,
   },
   Castle {
      side: Option<CastleSide>,
   },
   OfferDraw,
   AcceptDraw,
   DeclineDraw,
   Resign,
   Exit,
   Unrecognized(String),
}

/// Parses normalized tokens into an intent. Rules are tried in priority
/// order: session commands, castling, promotion, capture, piece move,
/// bare squares. The first rule that fires wins.
pub fn parse(tokens: &[String], raw: &str) -> MoveIntent {
   let has = |word: &str| tokens.iter().any(|t| t == word);

   if has("exit") || has("quit") {
      return MoveIntent::Exit;
   }
   if has("resign") {
      return MoveIntent::Resign;
   }
   if has("draw") {
      if has("accept") || has("yes") {
         return MoveIntent::AcceptDraw;
      }
      if has("decline") || has("reject") || has("refuse") || has("no") {
         return MoveIntent::DeclineDraw;
      }
      return MoveIntent::OfferDraw;
   }
   if has("castle") {
      let side = if has("queenside") || has("queen") || has("long") {
         Some(CastleSide::Queenside)
      } else if has("kingside") || has("king") || has("short") {
         Some(CastleSide::Kingside)
      } else {
         None
      };
      return MoveIntent::Castle { side };
   }

   let squares: Vec<(usize, Square)> = tokens
      .iter()
      .enumerate()
      .filter_map(|(i, t)| t.parse::<Square>().ok().map(|s| (i, s)))
      .collect();
   let pieces: Vec<(usize, Piece)> = tokens
      .iter()
      .enumerate()
      .filter_map(|(i, t)| piece_token(t).map(|p| (i, p)))
      .collect();
   let files: Vec<(usize, u8)> = tokens
      .iter()
      .enumerate()
      .filter_map(|(i, t)| file_token(t).map(|f| (i, f)))
      .collect();

   let promote_idx = tokens.iter().position(|t| t == "promote");
   let promo_mentions: Vec<(usize, PromotionPiece)> = pieces
      .iter()
      .filter_map(|(i, p)| promotion_piece(*p).map(|pp| (*i, pp)))
      .collect();
   let last_square_idx = squares.last().map(|(i, _)| *i);

   // "e8 queen" only reads as a promotion when the square is on a back rank
   let implicit_promotion = match (promo_mentions.last(), squares.last()) {
      (Some((pi, _)), Some((si, sq))) => pi > si && (sq.rank() == 0 || sq.rank() == 7),
      _ => false,
   };
   if promote_idx.is_some() || implicit_promotion {
      let destination = squares.last().map(|(_, s)| *s);
      let origin = if squares.len() >= 2 {
         OriginHint::Square(squares[squares.len() - 2].1)
      } else if let Some((_, f)) = files
         .iter()
         .rev()
         .find(|(i, _)| last_square_idx.map_or(true, |si| *i < si))
      {
         OriginHint::File(*f)
      } else {
         OriginHint::Unspecified
      };
      let promotion = promo_mentions.last().and_then(|(i, pp)| {
         let after_square = last_square_idx.map_or(true, |si| *i > si);
         let after_promote = promote_idx.map_or(false, |pi| *i > pi);
         if after_square || after_promote {
            Some(*pp)
         } else {
            None
         }
      });
      return MoveIntent::Promotion {
         destination,
         origin,
         promotion,
      };
   }

   if let Some(takes_idx) = tokens.iter().position(|t| t == "takes") {
      let destination = match squares.iter().find(|(i, _)| *i > takes_idx) {
         Some((_, s)) => *s,
         None => return MoveIntent::Unrecognized(raw.to_string()),
      };
      let piece = pieces.iter().rev().find(|(i, _)| *i < takes_idx).map(|(_, p)| *p);
      let origin = if let Some((_, s)) = squares.iter().rev().find(|(i, _)| *i < takes_idx) {
         OriginHint::Square(*s)
      } else if let Some((_, f)) = files.iter().rev().find(|(i, _)| *i < takes_idx) {
         OriginHint::File(*f)
      } else {
         OriginHint::Unspecified
      };
      return MoveIntent::Capture {
         piece,
         origin,
         destination,
      };
   }

   if let Some((piece_idx, piece)) = pieces.first().copied() {
      let destination = match squares.last() {
         Some((_, s)) => *s,
         None => return MoveIntent::Unrecognized(raw.to_string()),
      };
      let origin = if squares.len() >= 2 {
         OriginHint::Square(squares[squares.len() - 2].1)
      } else if let Some((_, f)) = files.iter().find(|(i, _)| *i > piece_idx && Some(*i) != last_square_idx) {
         OriginHint::File(*f)
      } else {
         OriginHint::Unspecified
      };
      if piece == Piece::Pawn {
         return MoveIntent::PawnMove { destination, origin };
      }
      return MoveIntent::PieceMove {
         piece,
         destination,
         origin,
      };
   }

   match squares.len() {
      1 => {
         return MoveIntent::PawnMove {
            destination: squares[0].1,
            origin: OriginHint::Unspecified,
         }
      }
      2 => {
         return MoveIntent::PawnMove {
            destination: squares[1].1,
            origin: OriginHint::Square(squares[0].1),
         }
      }
      _ => {}
   }

   MoveIntent::Unrecognized(raw.to_string())
}

fn piece_token(token: &str) -> Option<Piece> {
   match token {
      "pawn" => Some(Piece::Pawn),
      "knight" => Some(Piece::Knight),
      "bishop" => Some(Piece::Bishop),
      "rook" => Some(Piece::Rook),
      "queen" => Some(Piece::Queen),
      "king" => Some(Piece::King),
      _ => None,
   }
}

fn promotion_piece(piece: Piece) -> Option<PromotionPiece> {
   match piece {
      Piece::Knight => Some(PromotionPiece::Knight),
      Piece::Bishop => Some(PromotionPiece::Bishop),
      Piece::Rook => Some(PromotionPiece::Rook),
      Piece::Queen => Some(PromotionPiece::Queen),
      Piece::Pawn | Piece::King => None,
   }
}

fn file_token(token: &str) -> Option<u8> {
   let bytes = token.as_bytes();
   if bytes.len() == 1 && matches!(bytes[0], b'a'..=b'h') {
      Some(bytes[0] - b'a')
   } else {
      None
   }
}
