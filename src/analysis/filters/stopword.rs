use std::collections::HashSet;
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Drops stop words. Positions of surviving tokens are preserved so phrase
/// matching still sees the original gaps.
pub struct StopWordFilter {
    stop_words: HashSet<String>,
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

impl StopWordFilter {
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        StopWordFilter { stop_words: words.into_iter().collect() }
    }

    pub fn english() -> Self {
        StopWordFilter::new(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()))
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter().filter(|t| !self.stop_words.contains(&t.text)).collect()
    }

    fn name(&self) -> &str {
        "stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_preserved() {
        let filter = StopWordFilter::english();
        let tokens = vec![
            Token::new("the".into(), 0, 0, 3),
            Token::new("quick".into(), 1, 4, 9),
        ];
        let filtered = filter.filter(tokens);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text, "quick");
        assert_eq!(filtered[0].position, 1);
    }
}
