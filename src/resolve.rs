//! Resolves a parsed intent against the current position into exactly one
//! legal move, or an error precise enough to narrate back to the player.

use crate::board::{LegalMove, Piece, PromotionPiece, Square, State};
use crate::error::ChessvoxError;
use crate::intent::{CastleSide, MoveIntent, OriginHint};
use fxhash::FxHashSet;

pub fn resolve(state: &State, intent: &MoveIntent) -> Result<LegalMove, ChessvoxError> {
   let legal = state.legal_moves();
   match intent {
      MoveIntent::PawnMove { destination, origin } => narrow(
         state,
         legal,
         Constraints {
            destination: Some(*destination),
            piece: Some(Piece::Pawn),
            origin: *origin,
            require_capture: false,
            forbid_capture: true,
            must_promote: false,
            promotion: None,
            description: "a pawn".to_string(),
         },
      ),
      MoveIntent::PieceMove {
         piece,
         destination,
         origin,
      } => narrow(
         state,
         legal,
         Constraints {
            destination: Some(*destination),
            piece: Some(*piece),
            origin: *origin,
            require_capture: false,
            forbid_capture: true,
            must_promote: false,
            promotion: None,
            description: format!("a {}", piece.name()),
         },
      ),
      MoveIntent::Capture {
         piece,
         destination,
         origin,
      } => narrow(
         state,
         legal,
         Constraints {
            destination: Some(*destination),
            piece: *piece,
            origin: *origin,
            require_capture: true,
            forbid_capture: false,
            must_promote: false,
            promotion: None,
            description: match piece {
               Some(p) => format!("a {} capture", p.name()),
               None => "a capture".to_string(),
            },
         },
      ),
      MoveIntent::Promotion {
         destination,
         origin,
         promotion,
      } => narrow(
         state,
         legal,
         Constraints {
            destination: *destination,
            piece: Some(Piece::Pawn),
            origin: *origin,
            require_capture: false,
            forbid_capture: false,
            must_promote: true,
            promotion: *promotion,
            description: "a promotion".to_string(),
         },
      ),
      MoveIntent::Castle { side } => resolve_castle(legal, *side),
      MoveIntent::Unrecognized(raw) => Err(ChessvoxError::UnrecognizedCommand(raw.clone())),
      // session commands are routed before resolution ever happens
      _ => Err(ChessvoxError::UnrecognizedCommand("not a board move".to_string())),
   }
}

struct Constraints {
   destination: Option<Square>,
   piece: Option<Piece>,
   origin: OriginHint,
   require_capture: bool,
   forbid_capture: bool,
   must_promote: bool,
   promotion: Option<PromotionPiece>,
   description: String,
}

fn narrow(state: &State, legal: Vec<LegalMove>, c: Constraints) -> Result<LegalMove, ChessvoxError> {
   let reachable: Vec<LegalMove> = legal
      .into_iter()
      .filter(|m| c.destination.map_or(true, |d| m.destination == d))
      .filter(|m| !c.must_promote || m.promotion.is_some())
      .collect();
   if reachable.is_empty() {
      return Err(ChessvoxError::IllegalOrImpossibleMove(match c.destination {
         Some(d) if !c.must_promote => format!("no legal move reaches {}", d),
         Some(d) => format!("no promotion on {} is possible", d),
         None => "no promotion is possible right now".to_string(),
      }));
   }

   // A fully spelled origin square pins the move by itself; the piece
   // constraint is dropped so "e4 d5" works even when e4 holds a knight.
   let origin_pinned = matches!(c.origin, OriginHint::Square(_));
   let matching: Vec<LegalMove> = reachable
      .into_iter()
      .filter(|m| match c.origin {
         OriginHint::Unspecified => true,
         OriginHint::File(f) => m.origin.file() == f,
         OriginHint::Square(s) => m.origin == s,
      })
      .filter(|m| {
         if origin_pinned {
            return true;
         }
         match c.piece {
            Some(p) => {
               state
                  .position
                  .boards
                  .piece_at(m.origin)
                  .map(|(_, occupant)| occupant == p)
                  .unwrap_or(false)
            }
            None => true,
         }
      })
      .filter(|m| !c.require_capture || m.is_capture)
      // non-capture phrasing never matches a capture by accident; a fully
      // spelled origin is deliberate enough to override that
      .filter(|m| !c.forbid_capture || !m.is_capture || origin_pinned)
      .filter(|m| c.promotion.map_or(true, |p| m.promotion == Some(p)))
      .collect();

   if matching.is_empty() {
      return Err(ChessvoxError::IllegalOrImpossibleMove(match c.destination {
         Some(d) => format!("{} cannot reach {} like that", c.description, d),
         None => format!("{} is not possible like that", c.description),
      }));
   }
   if matching.len() == 1 {
      return Ok(matching[0]);
   }

   // Candidates that agree on origin and destination can only differ in
   // the promotion piece: the intent is missing that, not ambiguous.
   let all_same_path = matching
      .iter()
      .all(|m| m.origin == matching[0].origin && m.destination == matching[0].destination);
   if all_same_path {
      return Err(ChessvoxError::IncompleteIntent(
         "which piece should the pawn promote to? say queen, rook, bishop or knight".to_string(),
      ));
   }

   let mut seen = FxHashSet::default();
   let mut origins: Vec<Square> = matching
      .iter()
      .map(|m| m.origin)
      .filter(|o| seen.insert(*o))
      .collect();
   origins.sort();
   Err(ChessvoxError::AmbiguousMove(origins))
}

fn resolve_castle(legal: Vec<LegalMove>, side: Option<CastleSide>) -> Result<LegalMove, ChessvoxError> {
   let kingside = legal.iter().find(|m| m.is_castle_kingside).copied();
   let queenside = legal.iter().find(|m| m.is_castle_queenside).copied();
   match side {
      Some(CastleSide::Kingside) => kingside.ok_or_else(|| {
         ChessvoxError::IllegalOrImpossibleMove("castling kingside is not possible right now".to_string())
      }),
      Some(CastleSide::Queenside) => queenside.ok_or_else(|| {
         ChessvoxError::IllegalOrImpossibleMove("castling queenside is not possible right now".to_string())
      }),
      None => match (kingside, queenside) {
         (Some(_), Some(_)) => Err(ChessvoxError::IncompleteIntent(
            "castle which way? say kingside or queenside".to_string(),
         )),
         (Some(m), None) | (None, Some(m)) => Ok(m),
         (None, None) => Err(ChessvoxError::IllegalOrImpossibleMove(
            "castling is not possible right now".to_string(),
         )),
      },
   }
}

#[cfg(test)]
mod tests {
   use crate::board::{PromotionPiece, Square, State};
   use crate::error::ChessvoxError;
   use crate::intent::{parse, MoveIntent};
   use crate::normalize::normalize;
   use crate::resolve::resolve;

   fn heard(state: &State, text: &str) -> Result<String, ChessvoxError> {
      let intent = parse(&normalize(text), text);
      resolve(state, &intent).map(|m| m.to_uci().to_string())
   }

   #[test]
   fn bare_square_resolves_to_the_pawn_push() {
      let state = State::initial();
      assert_eq!(heard(&state, "e4").unwrap(), "e2e4");
      assert_eq!(heard(&state, "pawn to d3").unwrap(), "d2d3");
   }

   #[test]
   fn named_piece_resolves_uniquely() {
      let state = State::initial();
      assert_eq!(heard(&state, "knight to f3").unwrap(), "g1f3");
   }

   #[test]
   fn ambiguous_piece_move_lists_origins() {
      let state = State::from_fen("4k3/8/8/8/2N3N1/8/8/4K3 w - - 0 1").unwrap();
      match heard(&state, "knight to e5") {
         Err(ChessvoxError::AmbiguousMove(origins)) => {
            assert_eq!(origins, vec!["c4".parse::<Square>().unwrap(), "g4".parse().unwrap()]);
         }
         other => panic!("expected an ambiguous move, got {:?}", other),
      }
      // spelling out the origin settles it
      assert_eq!(heard(&state, "knight g4 to e5").unwrap(), "g4e5");
   }

   #[test]
   fn promotion_without_a_piece_is_incomplete() {
      let state = State::from_fen("8/4P2k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
      assert!(matches!(heard(&state, "e8"), Err(ChessvoxError::IncompleteIntent(_))));
      assert!(matches!(
         heard(&state, "e7 to e8 promote"),
         Err(ChessvoxError::IncompleteIntent(_))
      ));
      assert_eq!(heard(&state, "e7 to e8 promote to queen").unwrap(), "e7e8q");
      let intent = MoveIntent::Promotion {
         destination: Some("e8".parse().unwrap()),
         origin: crate::intent::OriginHint::Unspecified,
         promotion: Some(PromotionPiece::Knight),
      };
      assert_eq!(resolve(&state, &intent).unwrap().to_uci().to_string(), "e7e8n");
   }

   #[test]
   fn promotion_capture_narrowed_by_file() {
      // pawns on c7 and e7 can both take the knight on d8
      let state = State::from_fen("3n4/2P1P3/8/8/8/8/8/4K2k w - - 0 1").unwrap();
      match heard(&state, "takes d8 queen") {
         Err(ChessvoxError::AmbiguousMove(origins)) => {
            assert_eq!(origins, vec!["c7".parse::<Square>().unwrap(), "e7".parse().unwrap()]);
         }
         other => panic!("expected an ambiguous move, got {:?}", other),
      }
      assert_eq!(heard(&state, "e takes d8 queen").unwrap(), "e7d8q");
   }

   #[test]
   fn quiet_phrasing_never_captures_by_accident() {
      let state = State::from_uci_move_list("e2e4 d7d5");
      // only e4xd5 reaches d5 for white, but nothing was said about taking
      assert!(matches!(
         heard(&state, "pawn to d5"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn occupied_by_own_piece_is_rejected() {
      let state = State::from_uci_move_list("e2e4 e7e5 g1f3 b8c6");
      let state = state.apply_uci_moves("d2d3 d7d6").unwrap();
      // the knight already sits on f3
      assert!(matches!(
         heard(&state, "knight to f3"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn pawn_capture_from_the_wrong_file_is_rejected() {
      // white pawns on c2 and e2, black knight on d4: neither can take it
      let state = State::from_fen("4k3/8/8/8/3n4/8/2P1P3/4K3 w - - 0 1").unwrap();
      assert!(matches!(
         heard(&state, "e takes d4"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn unreachable_square_is_rejected() {
      let state = State::initial();
      assert!(matches!(
         heard(&state, "e5"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn reachable_square_with_wrong_piece_is_rejected() {
      let state = State::initial();
      // e4 is reachable, but not by a knight
      assert!(matches!(
         heard(&state, "knight to e4"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn capture_requires_a_capture() {
      let state = State::initial();
      assert!(matches!(
         heard(&state, "takes e4"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
      let state = State::from_uci_move_list("e2e4 d7d5");
      assert_eq!(heard(&state, "pawn takes d5").unwrap(), "e4d5");
      assert_eq!(heard(&state, "e takes d5").unwrap(), "e4d5");
   }

   #[test]
   fn spelled_origin_pins_a_capture() {
      let state = State::from_uci_move_list("e2e4 d7d5");
      // origin square given, so neither piece kind nor capture wording matters
      assert_eq!(heard(&state, "e4 to d5").unwrap(), "e4d5");
   }

   #[test]
   fn castling_resolution() {
      let state = State::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
      assert_eq!(heard(&state, "castle kingside").unwrap(), "e1g1");
      assert_eq!(heard(&state, "castle queenside").unwrap(), "e1c1");
      // both available, no side given
      assert!(matches!(heard(&state, "castle"), Err(ChessvoxError::IncompleteIntent(_))));

      // only one side available, bare "castle" is enough
      let state = State::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w K - 0 1").unwrap();
      assert_eq!(heard(&state, "castle").unwrap(), "e1g1");

      let state = State::from_fen("r3k2r/8/8/8/8/4q3/8/R3K2R w KQ - 0 1").unwrap();
      assert!(matches!(
         heard(&state, "castle kingside"),
         Err(ChessvoxError::IllegalOrImpossibleMove(_))
      ));
   }

   #[test]
   fn garbage_is_unrecognized() {
      let state = State::initial();
      assert!(matches!(
         heard(&state, "flarble garble"),
         Err(ChessvoxError::UnrecognizedCommand(_))
      ));
   }

   #[test]
   fn ambiguous_pawn_captures() {
      // pawns on c4 and e4 can both take d5
      let state = State::from_uci_move_list("e2e4 d7d5 c2c4 e7e6");
      match heard(&state, "pawn takes d5") {
         Err(ChessvoxError::AmbiguousMove(origins)) => {
            assert_eq!(origins, vec!["c4".parse::<Square>().unwrap(), "e4".parse().unwrap()]);
         }
         other => panic!("expected an ambiguous move, got {:?}", other),
      }
      assert_eq!(heard(&state, "c takes d5").unwrap(), "c4d5");
   }
}
