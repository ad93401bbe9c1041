use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, opt};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};
use crate::query::ast::{
    BoolQuery, MatchPhraseQuery, MatchQuery, Operator, Query, WildcardQuery,
};

/// One lexed clause of the query-string mini-language:
/// `[field:]term`, `[field:]"a phrase"`, or the operators AND/OR/NOT.
#[derive(Debug, PartialEq)]
struct Clause {
    field: Option<String>,
    text: ClauseText,
}

#[derive(Debug, PartialEq)]
enum ClauseText {
    Phrase(String),
    Term(String),
}

fn field_prefix(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-'),
        char(':'),
    )
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, ClauseText> {
    map(delimited(char('"'), take_while(|c| c != '"'), char('"')), |s: &str| {
        ClauseText::Phrase(s.to_string())
    })
    .parse(input)
}

fn bare(input: &str) -> IResult<&str, ClauseText> {
    map(take_while1(|c: char| !c.is_whitespace() && c != ':' && c != '"'), |s: &str| {
        ClauseText::Term(s.to_string())
    })
    .parse(input)
}

fn clause(input: &str) -> IResult<&str, Clause> {
    let (input, field) = opt(field_prefix).parse(input)?;
    let (input, text) = alt((quoted, bare)).parse(input)?;
    Ok((input, Clause { field: field.map(String::from), text }))
}

fn lex(input: &str) -> Result<Vec<Clause>> {
    let result: IResult<&str, Vec<Clause>> =
        terminated(many0(preceded(multispace0, clause)), multispace0).parse(input);
    match result {
        Ok(("", clauses)) => Ok(clauses),
        Ok((rest, _)) => {
            Err(Error::illegal_argument(format!("failed to parse query string near [{}]", rest)))
        }
        Err(_) => Err(Error::illegal_argument(format!("failed to parse query string [{}]", input))),
    }
}

/// Parse a query-string expression against a target field. Clauses may
/// override the field with `field:value`; `AND` makes all positive clauses
/// required, `NOT` negates the following clause, wildcards in a term make
/// it a wildcard query, quoted text becomes a phrase.
pub fn parse_query_string(input: &str, default_field: &str) -> Result<Query> {
    let clauses = lex(input)?;
    if clauses.is_empty() {
        return Ok(Query::match_all());
    }

    let mut conjunctive = false;
    let mut negate_next = false;
    let mut positive: Vec<Query> = Vec::new();
    let mut negative: Vec<Query> = Vec::new();

    for clause in clauses {
        if let ClauseText::Term(word) = &clause.text {
            if clause.field.is_none() {
                match word.as_str() {
                    "AND" => {
                        conjunctive = true;
                        continue;
                    }
                    "OR" => continue,
                    "NOT" => {
                        negate_next = true;
                        continue;
                    }
                    _ => {}
                }
            }
        }

        let field = clause.field.as_deref().unwrap_or(default_field);
        let query = clause_query(field, clause.text);
        if negate_next {
            negative.push(query);
            negate_next = false;
        } else {
            positive.push(query);
        }
    }

    if positive.len() == 1 && negative.is_empty() {
        return Ok(positive.remove(0));
    }

    let mut bool_query = BoolQuery::new();
    if conjunctive {
        bool_query.must = positive;
    } else {
        bool_query.minimum_should_match = Some(1);
        bool_query.should = positive;
    }
    bool_query.must_not = negative;
    Ok(Query::Bool(bool_query))
}

fn clause_query(field: &str, text: ClauseText) -> Query {
    match text {
        ClauseText::Phrase(phrase) => Query::MatchPhrase(MatchPhraseQuery {
            field: field.to_string(),
            query: phrase,
            slop: 0,
            boost: 1.0,
        }),
        ClauseText::Term(term) if term.contains('*') || term.contains('?') => {
            Query::Wildcard(WildcardQuery {
                field: field.to_string(),
                pattern: term.to_lowercase(),
                case_insensitive: true,
                boost: 1.0,
            })
        }
        ClauseText::Term(term) => Query::Match(MatchQuery {
            field: field.to_string(),
            query: term,
            operator: Operator::Or,
            boost: 1.0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_term() {
        let query = parse_query_string("fox", "title").unwrap();
        assert!(matches!(query, Query::Match(MatchQuery { ref field, ref query, .. })
            if field == "title" && query == "fox"));
    }

    #[test]
    fn test_field_override() {
        let query = parse_query_string("body:fox", "title").unwrap();
        assert!(matches!(query, Query::Match(MatchQuery { ref field, .. }) if field == "body"));
    }

    #[test]
    fn test_phrase() {
        let query = parse_query_string("\"quick brown\"", "title").unwrap();
        assert!(matches!(query, Query::MatchPhrase(MatchPhraseQuery { ref query, .. })
            if query == "quick brown"));
    }

    #[test]
    fn test_and_makes_conjunction() {
        let query = parse_query_string("quick AND fox", "title").unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.must.len(), 2);
        assert!(q.should.is_empty());
    }

    #[test]
    fn test_default_disjunction() {
        let query = parse_query_string("quick fox", "title").unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.should.len(), 2);
        assert_eq!(q.minimum_should_match, Some(1));
    }

    #[test]
    fn test_not_negates() {
        let query = parse_query_string("quick NOT lazy", "title").unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.must_not.len(), 1);
    }

    #[test]
    fn test_wildcard_term() {
        let query = parse_query_string("fo*", "title").unwrap();
        assert!(matches!(query, Query::Wildcard(WildcardQuery { ref pattern, .. })
            if pattern == "fo*"));
    }

    #[test]
    fn test_empty_is_match_all() {
        assert!(matches!(parse_query_string("   ", "title").unwrap(), Query::MatchAll { .. }));
    }
}
