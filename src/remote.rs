use crate::board::UciMove;
use log::warn;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
   /// The server heard us and said no. Never retried; a rejected move
   /// usually means the local board is stale.
   #[error("the server rejected the request: {0}")]
   Rejected(String),
   /// Transport-level failure; worth retrying.
   #[error("the server could not be reached: {0}")]
   Unavailable(String),
}

/// The remote game as a capability: everything the client may do to it.
pub trait RemoteBoard: Send {
   fn make_move(&self, game_id: &str, uci: &UciMove) -> Result<(), RemoteError>;
   fn resign(&self, game_id: &str) -> Result<(), RemoteError>;
   fn offer_draw(&self, game_id: &str) -> Result<(), RemoteError>;
   fn respond_draw(&self, game_id: &str, accept: bool) -> Result<(), RemoteError>;
}

/// Sends commands to the remote board with a bounded retry policy:
/// transient failures are retried with doubling backoff, rejections are
/// surfaced immediately.
pub struct Dispatcher {
   remote: Box<dyn RemoteBoard>,
   attempts: u32,
   initial_backoff: Duration,
}

impl Dispatcher {
   pub fn new(remote: Box<dyn RemoteBoard>) -> Dispatcher {
      Dispatcher::with_policy(remote, 3, Duration::from_millis(500))
   }

   pub fn with_policy(remote: Box<dyn RemoteBoard>, attempts: u32, initial_backoff: Duration) -> Dispatcher {
      debug_assert!(attempts >= 1);
      Dispatcher {
         remote,
         attempts,
         initial_backoff,
      }
   }

   pub fn send<F>(&self, op: F) -> Result<(), RemoteError>
   where
      F: Fn(&dyn RemoteBoard) -> Result<(), RemoteError>,
   {
      let mut backoff = self.initial_backoff;
      let mut attempt = 0;
      loop {
         attempt += 1;
         match op(self.remote.as_ref()) {
            Ok(()) => return Ok(()),
            Err(RemoteError::Rejected(reason)) => return Err(RemoteError::Rejected(reason)),
            Err(RemoteError::Unavailable(reason)) => {
               if attempt >= self.attempts {
                  return Err(RemoteError::Unavailable(reason));
               }
               warn!("remote call failed ({}), retrying in {}ms", reason, backoff.as_millis());
               thread::sleep(backoff);
               backoff *= 2;
            }
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use crate::remote::*;
   use std::collections::VecDeque;
   use std::sync::{Arc, Mutex};

   #[derive(Default)]
   struct FlakyRemote {
      script: Arc<Mutex<VecDeque<Result<(), RemoteError>>>>,
      calls: Arc<Mutex<u32>>,
   }

   impl RemoteBoard for FlakyRemote {
      fn make_move(&self, _game_id: &str, _uci: &UciMove) -> Result<(), RemoteError> {
         *self.calls.lock().unwrap() += 1;
         self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
      }

      fn resign(&self, _game_id: &str) -> Result<(), RemoteError> {
         Ok(())
      }

      fn offer_draw(&self, _game_id: &str) -> Result<(), RemoteError> {
         Ok(())
      }

      fn respond_draw(&self, _game_id: &str, _accept: bool) -> Result<(), RemoteError> {
         Ok(())
      }
   }

   fn dispatcher_over(script: Vec<Result<(), RemoteError>>) -> (Dispatcher, Arc<Mutex<u32>>) {
      let remote = FlakyRemote {
         script: Arc::new(Mutex::new(script.into_iter().collect())),
         calls: Arc::new(Mutex::new(0)),
      };
      let calls = remote.calls.clone();
      (
         Dispatcher::with_policy(Box::new(remote), 3, Duration::from_millis(1)),
         calls,
      )
   }

   fn uci(s: &str) -> UciMove {
      s.parse().unwrap()
   }

   #[test]
   fn transient_failures_are_retried() {
      let (dispatcher, calls) = dispatcher_over(vec![
         Err(RemoteError::Unavailable("down".to_string())),
         Err(RemoteError::Unavailable("down".to_string())),
         Ok(()),
      ]);
      let result = dispatcher.send(|r| r.make_move("game", &uci("e2e4")));
      assert!(result.is_ok());
      assert_eq!(*calls.lock().unwrap(), 3);
   }

   #[test]
   fn gives_up_after_the_attempt_budget() {
      let (dispatcher, calls) = dispatcher_over(vec![
         Err(RemoteError::Unavailable("down".to_string())),
         Err(RemoteError::Unavailable("down".to_string())),
         Err(RemoteError::Unavailable("down".to_string())),
         Ok(()),
      ]);
      let result = dispatcher.send(|r| r.make_move("game", &uci("e2e4")));
      assert!(matches!(result, Err(RemoteError::Unavailable(_))));
      assert_eq!(*calls.lock().unwrap(), 3);
   }

   #[test]
   fn rejections_are_never_retried() {
      let (dispatcher, calls) = dispatcher_over(vec![Err(RemoteError::Rejected("not your turn".to_string()))]);
      let result = dispatcher.send(|r| r.make_move("game", &uci("e2e4")));
      assert!(matches!(result, Err(RemoteError::Rejected(_))));
      assert_eq!(*calls.lock().unwrap(), 1);
   }
}
