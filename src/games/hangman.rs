use rand::seq::SliceRandom;
use std::collections::BTreeSet;

pub const LIVES: u8 = 6;

const WORDS: &[&str] = &[
    "bahamut", "chocobo", "moogle", "tonberry", "cactuar", "behemoth", "leviathan", "ifrit",
    "shiva", "ramuh", "titan", "garuda", "odin", "alexander", "phoenix", "crystal", "aetheryte",
    "limsa", "gridania", "uldah", "ishgard", "kugane", "sharlayan", "thavnair", "eorzea",
    "dragoon", "paladin", "summoner", "astrologian", "machinist", "samurai", "reaper",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    Hit,
    Miss,
    AlreadyGuessed,
    Invalid,
    Won,
    Lost,
}

impl GuessOutcome {
    pub fn is_over(self) -> bool {
        matches!(self, GuessOutcome::Won | GuessOutcome::Lost)
    }
}

#[derive(Debug, Clone)]
pub struct Hangman {
    word: String,
    guessed: BTreeSet<char>,
    lives: u8,
}

impl Hangman {
    pub fn new(word: &str) -> Self {
        Self {
            word: word.to_lowercase(),
            guessed: BTreeSet::new(),
            lives: LIVES,
        }
    }

    pub fn random() -> Self {
        let word = WORDS.choose(&mut rand::thread_rng()).copied().unwrap_or("bahamut");
        Self::new(word)
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn lives(&self) -> u8 {
        self.lives
    }

    /// A single letter, or the whole word. A wrong word costs a life like a wrong letter.
    pub fn guess(&mut self, input: &str) -> GuessOutcome {
        let input = input.trim().to_lowercase();
        if self.lives == 0 || self.is_solved() {
            return GuessOutcome::Invalid;
        }

        let mut chars = input.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_alphabetic() => {
                if !self.guessed.insert(letter) {
                    return GuessOutcome::AlreadyGuessed;
                }
                if self.word.contains(letter) {
                    if self.is_solved() {
                        GuessOutcome::Won
                    } else {
                        GuessOutcome::Hit
                    }
                } else {
                    self.lose_life()
                }
            }
            (Some(_), Some(_)) if input.chars().all(char::is_alphabetic) => {
                if input == self.word {
                    self.guessed.extend(self.word.chars());
                    GuessOutcome::Won
                } else {
                    self.lose_life()
                }
            }
            _ => GuessOutcome::Invalid,
        }
    }

    fn lose_life(&mut self) -> GuessOutcome {
        self.lives = self.lives.saturating_sub(1);
        if self.lives == 0 {
            GuessOutcome::Lost
        } else {
            GuessOutcome::Miss
        }
    }

    pub fn is_solved(&self) -> bool {
        self.word.chars().all(|c| self.guessed.contains(&c))
    }

    /// The word with unknown letters as underscores, e.g. `b a _ a _ u _`.
    pub fn masked(&self) -> String {
        self.word
            .chars()
            .map(|c| if self.guessed.contains(&c) { c } else { '_' })
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn wrong_letters(&self) -> String {
        self.guessed
            .iter()
            .filter(|c| !self.word.contains(**c))
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn render(&self) -> String {
        let wrong = self.wrong_letters();
        format!(
            "`{}`\nLives: {}{}\nWrong: {}",
            self.masked(),
            "❤️".repeat(self.lives as usize),
            "🖤".repeat((LIVES - self.lives) as usize),
            if wrong.is_empty() { "none" } else { wrong.as_str() }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_guesses() {
        let mut game = Hangman::new("odin");
        assert_eq!(game.masked(), "_ _ _ _");
        assert_eq!(game.guess("o"), GuessOutcome::Hit);
        assert_eq!(game.guess("O"), GuessOutcome::AlreadyGuessed);
        assert_eq!(game.guess("z"), GuessOutcome::Miss);
        assert_eq!(game.lives(), LIVES - 1);
        assert_eq!(game.masked(), "o _ _ _");
        assert_eq!(game.guess("1"), GuessOutcome::Invalid);
        game.guess("d");
        game.guess("i");
        assert_eq!(game.guess("n"), GuessOutcome::Won);
        assert_eq!(game.wrong_letters(), "z");
    }

    #[test]
    fn test_word_guess() {
        let mut game = Hangman::new("shiva");
        assert_eq!(game.guess("ifrit"), GuessOutcome::Miss);
        assert_eq!(game.guess("Shiva"), GuessOutcome::Won);
        assert!(game.is_solved());
        assert_eq!(game.guess("a"), GuessOutcome::Invalid);
    }

    #[test]
    fn test_out_of_lives() {
        let mut game = Hangman::new("odin");
        let outcomes: Vec<_> = ["a", "b", "c", "e", "f", "g"]
            .iter()
            .map(|l| game.guess(l))
            .collect();
        assert_eq!(outcomes.last(), Some(&GuessOutcome::Lost));
        assert!(outcomes[..5].iter().all(|o| *o == GuessOutcome::Miss));
        assert_eq!(game.guess("o"), GuessOutcome::Invalid);
    }
}
