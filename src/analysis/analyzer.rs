use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use rust_stemmers::Algorithm;
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{KeywordTokenizer, StandardTokenizer, Tokenizer, WhitespaceTokenizer};
use crate::core::error::{Error, ErrorKind, Result};

/// Text analysis pipeline: one tokenizer followed by a filter chain.
pub struct Analyzer {
    pub name: String,
    tokenizer: Box<dyn Tokenizer>,
    filters: Vec<Box<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(name: &str, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer { name: name.to_string(), tokenizer, filters: Vec::new() }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    pub fn standard() -> Self {
        Analyzer::new("standard", Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
    }

    pub fn simple() -> Self {
        Analyzer::new("simple", Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
    }

    pub fn whitespace() -> Self {
        Analyzer::new("whitespace", Box::new(WhitespaceTokenizer))
    }

    pub fn keyword() -> Self {
        Analyzer::new("keyword", Box::new(KeywordTokenizer))
    }

    pub fn english() -> Self {
        Analyzer::new("english", Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
            .add_filter(Box::new(StopWordFilter::english()))
            .add_filter(Box::new(StemmerFilter::new(Algorithm::English)))
    }
}

/// Named analyzer catalogue. Built once at startup and handed to each
/// IndexManager by value rather than living in global state, so tests can
/// run with isolated registries.
#[derive(Clone)]
pub struct AnalyzerRegistry {
    analyzers: Arc<RwLock<HashMap<String, Arc<Analyzer>>>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let registry = AnalyzerRegistry { analyzers: Arc::new(RwLock::new(HashMap::new())) };
        registry.register(Analyzer::standard());
        registry.register(Analyzer::simple());
        registry.register(Analyzer::whitespace());
        registry.register(Analyzer::keyword());
        registry.register(Analyzer::english());
        registry
    }

    pub fn register(&self, analyzer: Analyzer) {
        self.analyzers.write().insert(analyzer.name.clone(), Arc::new(analyzer));
    }

    pub fn get(&self, name: &str) -> Result<Arc<Analyzer>> {
        self.analyzers.read().get(name).cloned().ok_or_else(|| {
            Error::new(ErrorKind::IllegalArgument, format!("analyzer [{}] not found", name))
        })
    }

    pub fn analyze(&self, analyzer_name: &str, text: &str) -> Result<Vec<Token>> {
        Ok(self.get(analyzer_name)?.analyze(text))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        let tokens = Analyzer::standard().analyze("The Quick Brown FOX");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_english_analyzer_stems_and_stops() {
        let tokens = Analyzer::english().analyze("the running foxes");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["run", "fox"]);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AnalyzerRegistry::new();
        assert!(registry.get("standard").is_ok());
        assert!(registry.get("english").is_ok());
        assert!(registry.get("nope").is_err());

        let tokens = registry.analyze("keyword", "New York").unwrap();
        assert_eq!(tokens.len(), 1);
    }
}
