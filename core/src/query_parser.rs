//! Structural split of a query string into quoted phrases, boolean operators, wildcards and
//! plain tokens. Retrieval does not consume the result; it is exposed for callers that want
//! to inspect a query.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref PHRASE: Regex = Regex::new(r#""([^"]*)""#).expect("phrase regex compiles");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "NOT" => Some(Self::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    pub tokens: Vec<String>,
    pub operators: Vec<Operator>,
    pub phrases: Vec<String>,
    pub wildcards: Vec<String>,
}

/// Phrases are pulled out first; the rest splits on whitespace. Each part is an operator
/// (case-insensitive), a wildcard if it contains `*`, or a token. Order of appearance is kept.
pub fn parse(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery {
        phrases: PHRASE.captures_iter(query).map(|c| c[1].to_string()).collect(),
        ..ParsedQuery::default()
    };
    let rest = PHRASE.replace_all(query, " ");
    for part in rest.split_whitespace() {
        if let Some(op) = Operator::from_word(part) {
            parsed.operators.push(op);
        } else if part.contains('*') {
            parsed.wildcards.push(part.to_string());
        } else {
            parsed.tokens.push(part.to_string());
        }
    }
    parsed
}
