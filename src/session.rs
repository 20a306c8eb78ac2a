use crate::board::{Color, LegalMove, Outcome, Piece, State, UciMove};
use crate::error::ChessvoxError;
use log::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
   Checkmate,
   Resignation,
   DrawAgreed,
   DrawByRule,
   Timeout,
   Abandoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
   InProgress,
   Finished(EndReason),
}

#[derive(Clone, Debug)]
pub struct GameSession {
   pub game_id: String,
   pub color: Color,
   pub opponent: String,
   pub status: SessionStatus,
}

/// Something the server told us about the game.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
   OpponentMove {
      uci: UciMove,
      authoritative_fen: Option<String>,
   },
   DrawOffered {
      by: Color,
   },
   GameEnded {
      reason: EndReason,
      winner: Option<Color>,
   },
   Chat {
      username: String,
      text: String,
   },
   Heartbeat,
}

/// Keeps the local board in lockstep with the server. The server's move
/// feed echoes our own moves back and may replay on reconnect, so every
/// incoming move is checked against the applied history first.
pub struct Reconciler {
   pub session: GameSession,
   pub state: State,
   history: Vec<UciMove>,
   pub pending_draw_offer: Option<Color>,
   pub our_draw_offer: bool,
}

impl Reconciler {
   pub fn new(session: GameSession, state: State) -> Reconciler {
      Reconciler {
         session,
         state,
         history: Vec::new(),
         pending_draw_offer: None,
         our_draw_offer: false,
      }
   }

   pub fn ensure_active(&self) -> Result<(), ChessvoxError> {
      match self.session.status {
         SessionStatus::InProgress => Ok(()),
         SessionStatus::Finished(_) => Err(ChessvoxError::SessionFinished),
      }
   }

   /// Applies one of our own moves after the server accepted it. Returns
   /// the narration line for it.
   pub fn record_local(&mut self, a_move: &LegalMove) -> String {
      let mut narration = describe_move(&self.state, a_move);
      self.state = self.state.apply(a_move);
      self.history.push(a_move.to_uci());
      self.pending_draw_offer = None;
      if let Some(note) = self.settle_outcome() {
         narration.push_str(", ");
         narration.push_str(note);
      }
      narration
   }

   pub fn handle(&mut self, event: RemoteEvent) -> Result<Option<String>, ChessvoxError> {
      match event {
         RemoteEvent::Heartbeat => Ok(None),
         RemoteEvent::Chat { username, text } => {
            info!("chat from {}: {}", username, text);
            Ok(None)
         }
         RemoteEvent::DrawOffered { by } => {
            if self.session.status != SessionStatus::InProgress {
               return Ok(None);
            }
            if by == self.session.color {
               // our own offer coming back on the wire
               self.our_draw_offer = true;
               return Ok(None);
            }
            self.pending_draw_offer = Some(by);
            Ok(Some("your opponent offers a draw".to_string()))
         }
         RemoteEvent::GameEnded { reason, winner } => {
            if let SessionStatus::Finished(_) = self.session.status {
               return Ok(None);
            }
            self.session.status = SessionStatus::Finished(reason);
            Ok(Some(describe_end(reason, winner, self.session.color)))
         }
         RemoteEvent::OpponentMove { uci, authoritative_fen } => {
            self.ensure_active()?;
            if self.history.last() == Some(&uci) {
               // replayed echo of the move we already applied
               return Ok(None);
            }
            match self.state.find_legal(&uci) {
               Some(a_move) => {
                  let mut narration = describe_move(&self.state, &a_move);
                  self.state = self.state.apply(&a_move);
                  self.history.push(uci);
                  self.pending_draw_offer = None;
                  // their move stands in for a decline of our offer
                  self.our_draw_offer = false;
                  if let Some(note) = self.settle_outcome() {
                     narration.push_str(", ");
                     narration.push_str(note);
                  }
                  Ok(Some(narration))
               }
               None => match authoritative_fen {
                  Some(fen) => {
                     warn!("move {} does not fit the local board, rebuilding from server position", uci);
                     self.state = State::from_fen(&fen).map_err(|_| ChessvoxError::DesyncDetected)?;
                     self.history.clear();
                     Ok(Some("the board was resynchronized with the server".to_string()))
                  }
                  None => Err(ChessvoxError::DesyncDetected),
               },
            }
         }
      }
   }

   /// Checkmate and stalemate end the game on the board itself. The rule
   /// draws (repetition, fifty moves, insufficient material) are only
   /// claimable: the server keeps the game running until a side claims,
   /// so the session stays in progress and we just announce it.
   fn settle_outcome(&mut self) -> Option<&'static str> {
      let moves = self.state.legal_moves();
      match self.state.outcome(&moves) {
         Outcome::Ongoing => None,
         Outcome::Checkmate { .. } => {
            self.session.status = SessionStatus::Finished(EndReason::Checkmate);
            None
         }
         Outcome::DrawStalemate => {
            self.session.status = SessionStatus::Finished(EndReason::DrawByRule);
            None
         }
         Outcome::DrawRepetition | Outcome::DrawFiftyMoves | Outcome::DrawInsufficientMaterial => {
            Some("a draw can be claimed")
         }
      }
   }
}

/// Natural language announcement for a move, from the position it is
/// about to be played in.
pub fn describe_move(state: &State, a_move: &LegalMove) -> String {
   let after = state.apply(a_move);
   let mut text = if a_move.is_castle_kingside {
      "castles kingside".to_string()
   } else if a_move.is_castle_queenside {
      "castles queenside".to_string()
   } else {
      let piece = state
         .position
         .boards
         .piece_at(a_move.origin)
         .map(|(_, p)| p)
         .unwrap_or(Piece::Pawn);
      let mut t = if a_move.is_capture {
         format!("{} takes on {}", piece.name(), a_move.destination)
      } else {
         format!("{} to {}", piece.name(), a_move.destination)
      };
      if let Some(promotion) = a_move.promotion {
         t.push_str(", promoting to ");
         t.push_str(promotion.piece().name());
      }
      t
   };
   if after.is_checkmate() {
      text.push_str(", checkmate");
   } else if a_move.gives_check {
      text.push_str(", check");
   }
   text
}

fn describe_end(reason: EndReason, winner: Option<Color>, us: Color) -> String {
   let result = match winner {
      Some(w) if w == us => " you win",
      Some(_) => " your opponent wins",
      None => "",
   };
   match reason {
      EndReason::Checkmate => format!("checkmate,{}", result),
      EndReason::Resignation => match winner {
         Some(w) if w == us => "your opponent resigned, you win".to_string(),
         _ => "the game ended by resignation".to_string(),
      },
      EndReason::DrawAgreed => "draw agreed".to_string(),
      EndReason::DrawByRule => "the game is a draw".to_string(),
      EndReason::Timeout => format!("time ran out,{}", result),
      EndReason::Abandoned => "the game was abandoned".to_string(),
   }
}
