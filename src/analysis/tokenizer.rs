use unicode_segmentation::UnicodeSegmentation;
use crate::analysis::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Standard Unicode word tokenizer.
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer { max_token_length: 255 }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        for (start, word) in text.unicode_word_indices() {
            if word.len() > self.max_token_length {
                continue;
            }
            tokens.push(Token::new(word.to_string(), position, start, start + word.len()));
            position += 1;
        }
        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

/// Splits on ASCII whitespace only; preserves punctuation inside tokens.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        let mut start = None;
        for (offset, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push(Token::new(text[s..offset].to_string(), position, s, offset));
                    position += 1;
                }
            } else if start.is_none() {
                start = Some(offset);
            }
        }
        if let Some(s) = start {
            tokens.push(Token::new(text[s..].to_string(), position, s, text.len()));
        }
        tokens
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// Emits the entire input as a single token. Used for keyword fields.
pub struct KeywordTokenizer;

impl Tokenizer for KeywordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![Token::new(text.to_string(), 0, 0, text.len())]
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tokenizer_offsets() {
        let tokens = StandardTokenizer::default().tokenize("the quick brown fox");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].text, "quick");
        assert_eq!(tokens[1].position, 1);
        assert_eq!(&"the quick brown fox"[tokens[1].start..tokens[1].end], "quick");
    }

    #[test]
    fn test_whitespace_tokenizer() {
        let tokens = WhitespaceTokenizer.tokenize("a-b  c");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "a-b");
        assert_eq!(tokens[1].text, "c");
    }

    #[test]
    fn test_keyword_tokenizer() {
        let tokens = KeywordTokenizer.tokenize("New York");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "New York");
        assert!(KeywordTokenizer.tokenize("").is_empty());
    }
}
