//! Lichess board API bindings: blocking HTTP for commands, a line-delimited
//! JSON stream for game events.

use crate::board::{Color, State, UciMove};
use crate::remote::{RemoteBoard, RemoteError};
use crate::session::{EndReason, GameSession, RemoteEvent, SessionStatus};
use log::{error, trace, warn};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Lines};
use std::thread;
use std::time::Duration;

const BASE_URL: &str = "https://lichess.org";

#[derive(Clone)]
pub struct LichessBoard {
   client: Client,
   api_token: String,
}

#[derive(Debug, Deserialize)]
pub struct Account {
   pub id: String,
   pub username: String,
}

#[derive(Deserialize)]
struct Game {
   id: String,
}

#[derive(Deserialize)]
struct GameStart {
   game: Game,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
enum AccountEvent {
   gameStart(GameStart),
   #[serde(other)]
   unknown,
}

#[derive(Deserialize)]
struct PlayerWire {
   id: Option<String>,
   name: Option<String>,
}

#[derive(Deserialize)]
struct GameStateWire {
   moves: String,
   status: String,
   winner: Option<String>,
   #[serde(default)]
   wdraw: bool,
   #[serde(default)]
   bdraw: bool,
}

#[derive(Deserialize)]
struct GameFullWire {
   white: PlayerWire,
   black: PlayerWire,
   state: GameStateWire,
}

#[derive(Deserialize)]
struct ChatLineWire {
   username: String,
   text: String,
   room: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
enum GameEventWire {
   gameFull(GameFullWire),
   gameState(GameStateWire),
   chatLine(ChatLineWire),
   #[serde(other)]
   unknown,
}

impl LichessBoard {
   pub fn new(api_token: String) -> LichessBoard {
      LichessBoard {
         client: Client::new(),
         api_token,
      }
   }

   pub fn account(&self) -> Result<Account, RemoteError> {
      let response = self
         .client
         .get(&format!("{}/api/account", BASE_URL))
         .bearer_auth(&self.api_token)
         .send()
         .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
      if !response.status().is_success() {
         return Err(RemoteError::Rejected(format!("account lookup failed: {}", response.status())));
      }
      response.json().map_err(|e| RemoteError::Rejected(e.to_string()))
   }

   pub fn create_challenge(
      &self,
      opponent: &str,
      minutes: u32,
      increment: u32,
      rated: bool,
      color: &str,
   ) -> Result<(), RemoteError> {
      let body = [
         ("clock.limit", (minutes * 60).to_string()),
         ("clock.increment", increment.to_string()),
         ("rated", rated.to_string()),
         ("color", color.to_string()),
      ];
      self.post_form(&format!("/api/challenge/{}", opponent), &body)
   }

   pub fn create_seek(&self, minutes: u32, increment: u32, rated: bool, color: &str) -> Result<(), RemoteError> {
      let body = [
         ("time", minutes.to_string()),
         ("increment", increment.to_string()),
         ("rated", rated.to_string()),
         ("color", color.to_string()),
      ];
      self.post_form("/api/board/seek", &body)
   }

   /// Blocks on the account event stream until a game begins, returning
   /// its id.
   pub fn wait_for_game_start(&self) -> Result<String, RemoteError> {
      let response = self
         .client
         .get(&format!("{}/api/stream/event", BASE_URL))
         .bearer_auth(&self.api_token)
         .send()
         .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
      for line in BufReader::new(response).lines() {
         let line = line.map_err(|e| RemoteError::Unavailable(e.to_string()))?;
         if line.is_empty() {
            continue;
         }
         trace!("account event: {}", line);
         match serde_json::from_str::<AccountEvent>(&line) {
            Ok(AccountEvent::gameStart(start)) => return Ok(start.game.id),
            Ok(AccountEvent::unknown) => {}
            Err(e) => warn!("could not parse account event: {}", e),
         }
      }
      Err(RemoteError::Unavailable("the event stream ended before a game started".to_string()))
   }

   fn open_stream(&self, game_id: &str) -> Result<Lines<BufReader<Response>>, RemoteError> {
      let response = self
         .client
         .get(&format!("{}/api/board/game/stream/{}", BASE_URL, game_id))
         .bearer_auth(&self.api_token)
         .send()
         .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
      if !response.status().is_success() {
         return Err(RemoteError::Rejected(format!("opening the game stream failed: {}", response.status())));
      }
      Ok(BufReader::new(response).lines())
   }

   /// Opens the game's event stream and consumes the initial full-game
   /// message, leaving the stream positioned at live events.
   pub fn open_game(&self, game_id: &str, user_id: &str) -> Result<(GameSession, State, GameStream), RemoteError> {
      let mut lines = self.open_stream(game_id)?;
      let full = loop {
         let line = match lines.next() {
            Some(line) => line.map_err(|e| RemoteError::Unavailable(e.to_string()))?,
            None => return Err(RemoteError::Unavailable("the game stream ended unexpectedly".to_string())),
         };
         if line.is_empty() {
            continue;
         }
         trace!("game event: {}", line);
         match serde_json::from_str::<GameEventWire>(&line) {
            Ok(GameEventWire::gameFull(full)) => break full,
            Ok(_) => warn!("expected the full game first, got something else"),
            Err(e) => warn!("could not parse game event: {}", e),
         }
      };

      let (color, opponent_wire) = if full.white.id.as_deref() == Some(user_id) {
         (Color::White, &full.black)
      } else {
         (Color::Black, &full.white)
      };
      let opponent = opponent_wire.name.clone().unwrap_or_else(|| "anonymous".to_string());
      let state = State::initial()
         .apply_uci_moves(&full.state.moves)
         .map_err(RemoteError::Rejected)?;
      let session = GameSession {
         game_id: game_id.to_string(),
         color,
         opponent,
         status: SessionStatus::InProgress,
      };
      let tracker = EventTracker::new(state.clone(), full.state.moves.split_whitespace().count());
      let stream = GameStream {
         board: self.clone(),
         game_id: game_id.to_string(),
         lines: Some(lines),
         tracker,
      };
      Ok((session, state, stream))
   }

   fn post_form(&self, path: &str, body: &[(&str, String)]) -> Result<(), RemoteError> {
      let response = self
         .client
         .post(&format!("{}{}", BASE_URL, path))
         .bearer_auth(&self.api_token)
         .form(body)
         .send()
         .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
      check_status(response)
   }

   fn post(&self, path: &str) -> Result<(), RemoteError> {
      let response = self
         .client
         .post(&format!("{}{}", BASE_URL, path))
         .bearer_auth(&self.api_token)
         .send()
         .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
      check_status(response)
   }
}

fn check_status(response: Response) -> Result<(), RemoteError> {
   if response.status().is_success() {
      return Ok(());
   }
   let status = response.status();
   let body = response.text().unwrap_or_default();
   Err(RemoteError::Rejected(format!("{}: {}", status, body)))
}

impl RemoteBoard for LichessBoard {
   fn make_move(&self, game_id: &str, uci: &UciMove) -> Result<(), RemoteError> {
      self.post(&format!("/api/board/game/{}/move/{}", game_id, uci))
   }

   fn resign(&self, game_id: &str) -> Result<(), RemoteError> {
      self.post(&format!("/api/board/game/{}/resign", game_id))
   }

   fn offer_draw(&self, game_id: &str) -> Result<(), RemoteError> {
      self.post(&format!("/api/board/game/{}/draw/yes", game_id))
   }

   fn respond_draw(&self, game_id: &str, accept: bool) -> Result<(), RemoteError> {
      let answer = if accept { "yes" } else { "no" };
      self.post(&format!("/api/board/game/{}/draw/{}", game_id, answer))
   }
}

const RECONNECT_ATTEMPTS: u32 = 5;

/// The live game stream. One wire message can carry several things at
/// once (a new move, a draw flag flip, the game ending), so events are
/// queued and handed out one at a time. A dropped connection is reopened
/// in place; the tracker's running move count makes the server's full
/// replay on the fresh stream a no-op.
pub struct GameStream {
   board: LichessBoard,
   game_id: String,
   lines: Option<Lines<BufReader<Response>>>,
   tracker: EventTracker,
}

impl GameStream {
   pub fn next_event(&mut self) -> Option<RemoteEvent> {
      loop {
         if let Some(event) = self.tracker.queue.pop_front() {
            return Some(event);
         }
         let line = match self.read_line() {
            Some(line) => line,
            None => {
               if self.tracker.finished {
                  // the stream closing after the game ended is the normal way out
                  return None;
               }
               self.reconnect()?;
               continue;
            }
         };
         if line.is_empty() {
            // stream keep-alive
            return Some(RemoteEvent::Heartbeat);
         }
         trace!("game event: {}", line);
         match serde_json::from_str::<GameEventWire>(&line) {
            Ok(event) => self.tracker.ingest(event),
            Err(e) => warn!("could not parse game event: {}", e),
         }
      }
   }

   fn read_line(&mut self) -> Option<String> {
      match self.lines.as_mut()?.next() {
         Some(Ok(line)) => Some(line),
         Some(Err(e)) => {
            warn!("game stream read failed: {}", e);
            self.lines = None;
            None
         }
         None => {
            self.lines = None;
            None
         }
      }
   }

   fn reconnect(&mut self) -> Option<()> {
      let mut backoff = Duration::from_millis(500);
      for attempt in 1..=RECONNECT_ATTEMPTS {
         warn!("game stream dropped, reopening (attempt {})", attempt);
         thread::sleep(backoff);
         match self.board.open_stream(&self.game_id) {
            Ok(lines) => {
               self.lines = Some(lines);
               return Some(());
            }
            Err(e) => {
               warn!("could not reopen the game stream: {}", e);
               backoff *= 2;
            }
         }
      }
      error!("giving up on the game event stream");
      None
   }
}

struct EventTracker {
   /// Authoritative position, rebuilt move by move from the server's
   /// full move list.
   mirror: State,
   moves_seen: usize,
   wdraw: bool,
   bdraw: bool,
   finished: bool,
   queue: VecDeque<RemoteEvent>,
}

impl EventTracker {
   fn new(mirror: State, moves_seen: usize) -> EventTracker {
      EventTracker {
         mirror,
         moves_seen,
         wdraw: false,
         bdraw: false,
         finished: false,
         queue: VecDeque::new(),
      }
   }

   fn ingest(&mut self, event: GameEventWire) {
      match event {
         GameEventWire::gameFull(full) => self.ingest_state(full.state),
         GameEventWire::gameState(state) => self.ingest_state(state),
         GameEventWire::chatLine(chat) => {
            if chat.room == "player" {
               self.queue.push_back(RemoteEvent::Chat {
                  username: chat.username,
                  text: chat.text,
               });
            }
         }
         GameEventWire::unknown => {}
      }
   }

   fn ingest_state(&mut self, state: GameStateWire) {
      let moves: Vec<&str> = state.moves.split_whitespace().collect();
      for notation in moves.iter().skip(self.moves_seen) {
         let followed = notation
            .parse::<UciMove>()
            .and_then(|uci| self.mirror.apply_uci(&uci).map(|next| (uci, next)));
         match followed {
            Ok((uci, next)) => {
               self.mirror = next;
               self.queue.push_back(RemoteEvent::OpponentMove {
                  uci,
                  authoritative_fen: Some(self.mirror.to_fen()),
               });
            }
            Err(e) => warn!("could not follow move {} from the server: {}", notation, e),
         }
      }
      self.moves_seen = self.moves_seen.max(moves.len());

      if state.wdraw && !self.wdraw {
         self.queue.push_back(RemoteEvent::DrawOffered { by: Color::White });
      }
      if state.bdraw && !self.bdraw {
         self.queue.push_back(RemoteEvent::DrawOffered { by: Color::Black });
      }
      self.wdraw = state.wdraw;
      self.bdraw = state.bdraw;

      if state.status != "started" && state.status != "created" && !self.finished {
         self.finished = true;
         let winner = match state.winner.as_deref() {
            Some("white") => Some(Color::White),
            Some("black") => Some(Color::Black),
            _ => None,
         };
         self.queue.push_back(RemoteEvent::GameEnded {
            reason: end_reason(&state.status),
            winner,
         });
      }
   }
}

fn end_reason(status: &str) -> EndReason {
   match status {
      "mate" => EndReason::Checkmate,
      "resign" => EndReason::Resignation,
      "draw" => EndReason::DrawAgreed,
      "stalemate" => EndReason::DrawByRule,
      "outoftime" | "timeout" => EndReason::Timeout,
      "aborted" => EndReason::Abandoned,
      other => {
         warn!("unrecognized game end status {}", other);
         EndReason::Abandoned
      }
   }
}
