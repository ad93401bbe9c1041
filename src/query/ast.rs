use serde_json::Value;

/// Parsed query tree. `multi_match` and `query_string` desugar into `Bool`
/// disjunctions at parse time and have no node of their own.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll { boost: f32 },
    Match(MatchQuery),
    MatchPhrase(MatchPhraseQuery),
    MatchPhrasePrefix(MatchPhrasePrefixQuery),
    Term(TermQuery),
    Terms(TermsQuery),
    Range(RangeQuery),
    Bool(BoolQuery),
    Wildcard(WildcardQuery),
    Prefix(PrefixQuery),
    Fuzzy(FuzzyQuery),
    Regexp(RegexpQuery),
    Exists(ExistsQuery),
    Ids(IdsQuery),
    Nested(NestedQuery),
    HasChild(HasChildQuery),
    HasParent(HasParentQuery),
}

impl Query {
    pub fn match_all() -> Self {
        Query::MatchAll { boost: 1.0 }
    }

    pub fn boost(&self) -> f32 {
        match self {
            Query::MatchAll { boost } => *boost,
            Query::Match(q) => q.boost,
            Query::MatchPhrase(q) => q.boost,
            Query::MatchPhrasePrefix(q) => q.boost,
            Query::Term(q) => q.boost,
            Query::Terms(q) => q.boost,
            Query::Range(q) => q.boost,
            Query::Bool(q) => q.boost,
            Query::Wildcard(q) => q.boost,
            Query::Prefix(q) => q.boost,
            Query::Fuzzy(q) => q.boost,
            Query::Regexp(q) => q.boost,
            Query::Exists(q) => q.boost,
            Query::Ids(q) => q.boost,
            Query::Nested(q) => q.boost,
            Query::HasChild(q) => q.boost,
            Query::HasParent(q) => q.boost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub field: String,
    pub query: String,
    pub operator: Operator,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchPhraseQuery {
    pub field: String,
    pub query: String,
    pub slop: u32,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchPhrasePrefixQuery {
    pub field: String,
    pub query: String,
    pub max_expansions: usize,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    pub field: String,
    pub value: Value,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermsQuery {
    pub field: String,
    pub values: Vec<Value>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub field: String,
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub filter: Vec<Query>,
    pub minimum_should_match: Option<u32>,
    pub boost: f32,
}

impl BoolQuery {
    pub fn new() -> Self {
        BoolQuery { boost: 1.0, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WildcardQuery {
    pub field: String,
    pub pattern: String,
    pub case_insensitive: bool,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefixQuery {
    pub field: String,
    pub value: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyQuery {
    pub field: String,
    pub value: String,
    pub fuzziness: u8,
    pub prefix_length: usize,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegexpQuery {
    pub field: String,
    pub pattern: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsQuery {
    pub field: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdsQuery {
    pub values: Vec<String>,
    pub boost: f32,
}

/// Reduction operator combining child scores into a parent score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreMode {
    #[default]
    Avg,
    Sum,
    Max,
    Min,
    None,
}

impl ScoreMode {
    pub fn parse(raw: &str) -> Option<ScoreMode> {
        match raw {
            "avg" => Some(ScoreMode::Avg),
            "sum" => Some(ScoreMode::Sum),
            "max" => Some(ScoreMode::Max),
            "min" => Some(ScoreMode::Min),
            "none" => Some(ScoreMode::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerHitsSpec {
    pub name: Option<String>,
    pub size: usize,
    pub from: usize,
}

impl Default for InnerHitsSpec {
    fn default() -> Self {
        InnerHitsSpec { name: None, size: 3, from: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedQuery {
    pub path: String,
    pub query: Box<Query>,
    pub score_mode: ScoreMode,
    pub inner_hits: Option<InnerHitsSpec>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HasChildQuery {
    pub child_type: String,
    pub query: Box<Query>,
    pub score_mode: ScoreMode,
    pub min_children: u32,
    pub max_children: Option<u32>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HasParentQuery {
    pub parent_type: String,
    pub query: Box<Query>,
    pub score: bool,
    pub boost: f32,
}
