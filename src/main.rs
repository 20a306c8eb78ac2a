use chessvox::broker::{self, BrokerReply, BrokerRequest};
use chessvox::lichess::LichessBoard;
use chessvox::remote::Dispatcher;
use chessvox::session::Reconciler;
use chessvox::voice::{ConsoleInput, ConsoleNarrator, Narrator, SpeechInput};
use log::{info, warn};
use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::mpsc;
use std::thread;
use structopt::StructOpt;

/// Play chess on Lichess by voice
#[derive(StructOpt, Debug)]
#[structopt(name = "chessvox")]
struct Opt {
   /// Username to challenge directly; an open seek is created when omitted
   #[structopt(short = "o", long = "opponent")]
   opponent: Option<String>,
   /// Clock time in minutes
   #[structopt(long = "minutes", default_value = "10")]
   minutes: u32,
   /// Clock increment in seconds
   #[structopt(long = "increment", default_value = "5")]
   increment: u32,
   /// Play the game rated
   #[structopt(long = "rated")]
   rated: bool,
   /// Color preference: white, black or random
   #[structopt(long = "color", default_value = "random")]
   color: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   let api_token = match env::var("LICHESS_API_TOKEN") {
      Ok(token) => token,
      Err(_) => {
         let stdout = io::stdout();
         let mut out = stdout.lock();
         out.write_all(b"Lichess API token: ")?;
         out.flush()?;
         let stdin = io::stdin();
         let mut line = String::new();
         stdin.lock().read_line(&mut line)?;
         line.trim().to_string()
      }
   };

   let lichess = LichessBoard::new(api_token);
   let account = lichess.account()?;
   info!("logged in as {}", account.username);

   match &opt.opponent {
      Some(opponent) => lichess.create_challenge(opponent, opt.minutes, opt.increment, opt.rated, &opt.color)?,
      None => lichess.create_seek(opt.minutes, opt.increment, opt.rated, &opt.color)?,
   }

   println!("waiting for a game to start...");
   let game_id = lichess.wait_for_game_start()?;
   let (session, state, mut stream) = lichess.open_game(&game_id, &account.id)?;
   println!(
      "game {} against {}, playing {:?}",
      session.game_id, session.opponent, session.color
   );

   let (request_tx, request_rx) = mpsc::channel();
   let (reply_tx, reply_rx) = mpsc::channel();

   let stream_tx = request_tx.clone();
   thread::spawn(move || {
      // next_event reopens a dropped stream itself; None means the game
      // ended or reconnecting was given up on
      while let Some(event) = stream.next_event() {
         if stream_tx.send(BrokerRequest::Remote(event)).is_err() {
            break;
         }
      }
      warn!("game event stream closed");
   });

   let dispatcher = Dispatcher::new(Box::new(lichess));
   let reconciler = Reconciler::new(session, state);
   thread::spawn(move || broker::start(request_rx, reply_tx, dispatcher, reconciler));

   thread::spawn(move || {
      let mut narrator = ConsoleNarrator;
      while let Ok(reply) = reply_rx.recv() {
         match reply {
            BrokerReply::Spoken(line) => narrator.say(&line),
            BrokerReply::Rejected(line) => narrator.say(&line),
            BrokerReply::Fen(fen) => println!("{}", fen),
            BrokerReply::Exit => {
               narrator.say("goodbye");
               process::exit(0);
            }
         }
      }
   });

   let mut input = ConsoleInput;
   while let Some(transcript) = input.next_utterance() {
      if transcript.text.is_empty() {
         continue;
      }
      if request_tx.send(BrokerRequest::Utterance(transcript)).is_err() {
         break;
      }
   }
   Ok(())
}
