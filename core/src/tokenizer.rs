use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &["the", "and", "is", "in", "to", "of", "a", "for"];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// NFKC-normalize and lowercase a single word or query fragment.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Tokenize text into (term, position): NFKC normalization, lowercase, `\w+` runs, stopword removal.
/// Positions count every token, stopwords included.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let normalized = normalize(text);
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if is_stopword(token) { continue; }
        tokens.push((token.to_string(), pos));
    }
    tokens
}

/// Terms only, in order of appearance.
pub fn terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|(t, _)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("The Cat, and the DOG!");
        assert_eq!(t, vec![("cat".to_string(), 1), ("dog".to_string(), 4)]);
    }

    #[test]
    fn keeps_underscores_and_digits() {
        assert_eq!(terms("snake_case v2"), vec!["snake_case", "v2"]);
    }
}
