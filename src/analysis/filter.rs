use crate::analysis::token::Token;

/// Token stream transformation applied after tokenization.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &str;
}
