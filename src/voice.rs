use std::io::{self, BufRead, Write};

/// One recognized utterance. The confidence score is passed through from
/// whatever produced the transcript; console input has none.
#[derive(Clone, Debug, PartialEq)]
pub struct Transcript {
   pub text: String,
   pub confidence: Option<f32>,
}

impl Transcript {
   pub fn new(text: impl Into<String>) -> Transcript {
      Transcript {
         text: text.into(),
         confidence: None,
      }
   }

   pub fn with_confidence(text: impl Into<String>, confidence: f32) -> Transcript {
      Transcript {
         text: text.into(),
         confidence: Some(confidence),
      }
   }
}

pub trait SpeechInput: Send {
   /// Blocks until the next utterance. `None` means the input source is
   /// closed and the session should wind down.
   fn next_utterance(&mut self) -> Option<Transcript>;
}

pub trait Narrator: Send {
   fn say(&mut self, line: &str);
}

/// Stand-in for a microphone: reads typed "utterances" from stdin.
pub struct ConsoleInput;

impl SpeechInput for ConsoleInput {
   fn next_utterance(&mut self) -> Option<Transcript> {
      let stdout = io::stdout();
      let mut out = stdout.lock();
      out.write_all(b"say> ").ok()?;
      out.flush().ok()?;

      let stdin = io::stdin();
      let mut line = String::new();
      match stdin.lock().read_line(&mut line) {
         Ok(0) => None,
         Ok(_) => Some(Transcript::new(line.trim().to_string())),
         Err(_) => None,
      }
   }
}

/// Stand-in for text-to-speech: prints to stdout.
pub struct ConsoleNarrator;

impl Narrator for ConsoleNarrator {
   fn say(&mut self, line: &str) {
      println!("{}", line);
   }
}
