use crate::board::Square;
use thiserror::Error;

/// Everything that can go wrong between hearing an utterance and a move
/// landing on the server. The `Display` text is what gets narrated back
/// to the player, so it is phrased for speech.
#[derive(Debug, Error)]
pub enum ChessvoxError {
   #[error("could not make sense of \"{0}\"")]
   UnrecognizedCommand(String),
   #[error("{0}")]
   IncompleteIntent(String),
   #[error("{0}")]
   IllegalOrImpossibleMove(String),
   #[error("ambiguous move; it could come from {0:?}")]
   AmbiguousMove(Vec<Square>),
   #[error("the local board fell out of sync with the server")]
   DesyncDetected,
   #[error("the server could not be reached: {0}")]
   RemoteUnavailable(String),
   #[error("the game is already over")]
   SessionFinished,
}
