use serde::{Deserialize, Serialize};

/// A single token produced by analysis. `start`/`end` are byte offsets into
/// the original text, kept for highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub position: u32,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(text: String, position: u32, start: usize, end: usize) -> Self {
        Token { text, position, start, end }
    }
}
