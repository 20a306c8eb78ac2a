//! Turns a raw speech transcript into a clean token stream: lowercase,
//! punctuation stripped, homophones folded onto chess vocabulary, filler
//! words dropped, and file + rank fragments merged into square tokens.
//!
//! Deliberately absent from the homophone table: "to", "too", "for",
//! "won", "ate" and "tree". Folding those onto digits corrupts ordinary
//! phrasing like "pawn to e4" far more often than it helps.

pub fn normalize(raw: &str) -> Vec<String> {
   let mut tokens: Vec<String> = Vec::new();
   for word in raw.split_whitespace() {
      let cleaned: String = word
         .chars()
         .filter(|c| c.is_ascii_alphanumeric())
         .collect::<String>()
         .to_ascii_lowercase();
      if cleaned.is_empty() {
         continue;
      }
      let mapped = match cleaned.as_str() {
         // filler
         "please" | "move" | "moves" | "moving" | "to" | "the" | "from" | "on" | "at" | "piece" | "my" | "then"
         | "um" | "uh" | "it" | "and" => continue,
         // NATO alphabet and letter homophones for files
         "alpha" | "alfa" | "hey" => "a",
         "bravo" | "bee" | "be" => "b",
         "charlie" | "see" | "sea" => "c",
         "delta" | "dee" => "d",
         "echo" | "ee" => "e",
         "foxtrot" | "ef" | "eff" => "f",
         "golf" | "gee" => "g",
         "hotel" | "aitch" => "h",
         // rank words
         "one" => "1",
         "two" => "2",
         "three" => "3",
         "four" => "4",
         "five" => "5",
         "six" => "6",
         "seven" => "7",
         "eight" => "8",
         // piece homophones
         "night" => "knight",
         "pon" | "prawn" => "pawn",
         // verbs
         "takes" | "take" | "captures" | "capture" | "x" => "takes",
         "castle" | "castles" | "castling" => "castle",
         "promote" | "promotes" | "promoting" | "promotion" => "promote",
         other => other,
      };
      tokens.push(mapped.to_string());
   }

   let mut merged = Vec::with_capacity(tokens.len());
   let mut i = 0;
   while i < tokens.len() {
      if is_file(&tokens[i]) && i + 1 < tokens.len() && is_rank(&tokens[i + 1]) {
         merged.push(format!("{}{}", tokens[i], tokens[i + 1]));
         i += 2;
         continue;
      }
      // dictation sometimes runs both squares together, "e2e4"
      if is_double_square(&tokens[i]) {
         merged.push(tokens[i][..2].to_string());
         merged.push(tokens[i][2..].to_string());
         i += 1;
         continue;
      }
      merged.push(tokens[i].clone());
      i += 1;
   }
   merged
}

fn is_file(token: &str) -> bool {
   token.len() == 1 && matches!(token.as_bytes()[0], b'a'..=b'h')
}

fn is_rank(token: &str) -> bool {
   token.len() == 1 && matches!(token.as_bytes()[0], b'1'..=b'8')
}

fn is_double_square(token: &str) -> bool {
   let bytes = token.as_bytes();
   bytes.len() == 4
      && matches!(bytes[0], b'a'..=b'h')
      && matches!(bytes[1], b'1'..=b'8')
      && matches!(bytes[2], b'a'..=b'h')
      && matches!(bytes[3], b'1'..=b'8')
}

#[cfg(test)]
mod tests {
   use crate::normalize::normalize;

   fn norm(text: &str) -> Vec<String> {
      normalize(text)
   }

   #[test]
   fn lowercases_and_strips_punctuation() {
      assert_eq!(norm("Knight to F3!"), vec!["knight", "f3"]);
      assert_eq!(norm("E4."), vec!["e4"]);
   }

   #[test]
   fn folds_homophones() {
      assert_eq!(norm("night takes e5"), vec!["knight", "takes", "e5"]);
      assert_eq!(norm("bee seven"), vec!["b7"]);
      assert_eq!(norm("alpha one"), vec!["a1"]);
      assert_eq!(norm("see four"), vec!["c4"]);
   }

   #[test]
   fn drops_filler_words() {
      assert_eq!(norm("please move the pawn to e4"), vec!["pawn", "e4"]);
   }

   #[test]
   fn merges_spelled_out_squares() {
      assert_eq!(norm("Echo two to Echo four"), vec!["e2", "e4"]);
   }

   #[test]
   fn splits_run_together_squares() {
      assert_eq!(norm("e2e4"), vec!["e2", "e4"]);
   }

   #[test]
   fn capture_and_castle_synonyms() {
      assert_eq!(norm("bishop captures g7"), vec!["bishop", "takes", "g7"]);
      assert_eq!(norm("castles king-side"), vec!["castle", "kingside"]);
   }

   #[test]
   fn risky_homophones_stay_untouched() {
      // "for" must not become a rank digit
      assert_eq!(norm("for"), vec!["for"]);
      assert_eq!(norm("won"), vec!["won"]);
   }
}
