//! Single owner of the session and board state. Everything that wants to
//! read or change the game goes through this loop's channel, so utterances
//! and server events can never race on the position.

use crate::error::ChessvoxError;
use crate::intent::{self, MoveIntent};
use crate::normalize;
use crate::remote::{Dispatcher, RemoteError};
use crate::resolve;
use crate::session::{EndReason, Reconciler, RemoteEvent, SessionStatus};
use crate::voice::Transcript;
use log::warn;
use std::sync::mpsc;

const LOW_CONFIDENCE: f32 = 0.5;

pub enum BrokerRequest {
   Utterance(Transcript),
   Remote(RemoteEvent),
   QueryFen,
}

pub enum BrokerReply {
   /// A line for the narrator.
   Spoken(String),
   Fen(String),
   /// The request could not be carried out; the text explains why.
   Rejected(String),
   Exit,
}

pub fn start(
   receiver: mpsc::Receiver<BrokerRequest>,
   sender: mpsc::Sender<BrokerReply>,
   dispatcher: Dispatcher,
   mut reconciler: Reconciler,
) {
   while let Ok(request) = receiver.recv() {
      match request {
         BrokerRequest::QueryFen => {
            if sender.send(BrokerReply::Fen(reconciler.state.to_fen())).is_err() {
               return;
            }
         }
         BrokerRequest::Remote(event) => {
            let reply = match reconciler.handle(event) {
               Ok(Some(line)) => BrokerReply::Spoken(line),
               Ok(None) => continue,
               Err(e) => BrokerReply::Rejected(e.to_string()),
            };
            if sender.send(reply).is_err() {
               return;
            }
         }
         BrokerRequest::Utterance(transcript) => {
            if let Some(confidence) = transcript.confidence {
               if confidence < LOW_CONFIDENCE {
                  warn!(
                     "transcript \"{}\" has low confidence {:.2}, proceeding anyway",
                     transcript.text, confidence
                  );
               }
            }
            let tokens = normalize::normalize(&transcript.text);
            let parsed = intent::parse(&tokens, &transcript.text);
            match handle_intent(&dispatcher, &mut reconciler, parsed) {
               Ok(Handled::Spoken(line)) => {
                  if sender.send(BrokerReply::Spoken(line)).is_err() {
                     return;
                  }
               }
               Ok(Handled::Exit) => {
                  let _ = sender.send(BrokerReply::Exit);
                  return;
               }
               Err(e) => {
                  if sender.send(BrokerReply::Rejected(e.to_string())).is_err() {
                     return;
                  }
               }
            }
         }
      }
   }
}

enum Handled {
   Spoken(String),
   Exit,
}

fn handle_intent(
   dispatcher: &Dispatcher,
   reconciler: &mut Reconciler,
   parsed: MoveIntent,
) -> Result<Handled, ChessvoxError> {
   let game_id = reconciler.session.game_id.clone();
   match parsed {
      MoveIntent::Exit => Ok(Handled::Exit),
      MoveIntent::Resign => {
         reconciler.ensure_active()?;
         dispatcher.send(|r| r.resign(&game_id)).map_err(remote_err)?;
         reconciler.session.status = SessionStatus::Finished(EndReason::Resignation);
         Ok(Handled::Spoken("you resigned".to_string()))
      }
      MoveIntent::OfferDraw => {
         reconciler.ensure_active()?;
         if reconciler.our_draw_offer {
            return Err(ChessvoxError::IllegalOrImpossibleMove(
               "your draw offer is already outstanding".to_string(),
            ));
         }
         dispatcher.send(|r| r.offer_draw(&game_id)).map_err(remote_err)?;
         reconciler.our_draw_offer = true;
         Ok(Handled::Spoken("draw offered".to_string()))
      }
      MoveIntent::AcceptDraw => {
         reconciler.ensure_active()?;
         if reconciler.pending_draw_offer.is_none() {
            // our own outstanding offer is not something we can accept
            if reconciler.our_draw_offer {
               return Err(ChessvoxError::IllegalOrImpossibleMove(
                  "you already offered a draw, waiting for your opponent".to_string(),
               ));
            }
            return Err(ChessvoxError::IllegalOrImpossibleMove(
               "there is no draw offer to accept".to_string(),
            ));
         }
         dispatcher.send(|r| r.respond_draw(&game_id, true)).map_err(remote_err)?;
         reconciler.session.status = SessionStatus::Finished(EndReason::DrawAgreed);
         Ok(Handled::Spoken("draw accepted".to_string()))
      }
      MoveIntent::DeclineDraw => {
         reconciler.ensure_active()?;
         if reconciler.pending_draw_offer.is_none() {
            return Err(ChessvoxError::IllegalOrImpossibleMove(
               "there is no draw offer to decline".to_string(),
            ));
         }
         dispatcher.send(|r| r.respond_draw(&game_id, false)).map_err(remote_err)?;
         reconciler.pending_draw_offer = None;
         Ok(Handled::Spoken("draw declined".to_string()))
      }
      MoveIntent::Unrecognized(raw) => Err(ChessvoxError::UnrecognizedCommand(raw)),
      move_shaped => {
         reconciler.ensure_active()?;
         if reconciler.state.side_to_move() != reconciler.session.color {
            return Err(ChessvoxError::IllegalOrImpossibleMove("it is not your turn".to_string()));
         }
         let a_move = resolve::resolve(&reconciler.state, &move_shaped)?;
         let uci = a_move.to_uci();
         dispatcher.send(|r| r.make_move(&game_id, &uci)).map_err(remote_err)?;
         Ok(Handled::Spoken(reconciler.record_local(&a_move)))
      }
   }
}

fn remote_err(e: RemoteError) -> ChessvoxError {
   match e {
      RemoteError::Unavailable(reason) => ChessvoxError::RemoteUnavailable(reason),
      RemoteError::Rejected(reason) => {
         // the server knows something we don't
         warn!("server rejected the command: {}", reason);
         ChessvoxError::DesyncDetected
      }
   }
}
