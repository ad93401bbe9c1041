use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            if token.text.chars().any(|c| c.is_uppercase()) {
                token.text = token.text.to_lowercase();
            }
        }
        tokens
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}
