//! Voice-driven Lichess client. Spoken move transcripts are normalized,
//! parsed into intents, and resolved against a locally tracked board into
//! exactly one legal move before anything is sent to the server.

pub mod board;
pub mod broker;
pub mod error;
pub mod intent;
pub mod lichess;
pub mod normalize;
pub mod remote;
pub mod resolve;
pub mod session;
pub mod voice;
