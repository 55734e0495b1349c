// src/preprocessing/tokenize.rs
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};
use url::Url;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("separator pattern compiles"));

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in",
        "is", "it", "its", "of", "on", "or", "she", "that", "the", "to", "was", "were",
        "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Tokens that carry no identifying information in a URL.
static URL_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "http", "https", "www", "com", "org", "net", "info", "biz", "html", "htm", "php",
        "asp", "aspx", "index", "home", "en", "wiki",
    ]
    .into_iter()
    .collect()
});

/// Lowercases and strips diacritics through NFKD decomposition.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Splits text into normalized word tokens, dropping stopwords and
/// single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    NON_ALPHANUMERIC
        .split(&normalized)
        .filter(|token| token.chars().count() > 1 && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Splits a URL into host and path tokens, dropping scheme, `www` and
/// top-level domain noise.
pub fn tokenize_url(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let parsed = Url::parse(trimmed).or_else(|_| Url::parse(&format!("http://{}", trimmed)));

    let mut pieces: Vec<String> = Vec::new();
    match parsed {
        Ok(url) => {
            if let Some(host) = url.host_str() {
                pieces.push(host.to_string());
            }
            pieces.push(url.path().to_string());
            if let Some(query) = url.query() {
                pieces.push(query.to_string());
            }
        }
        Err(_) => pieces.push(trimmed.to_string()),
    }

    pieces
        .iter()
        .flat_map(|piece| {
            let normalized = normalize(piece);
            NON_ALPHANUMERIC
                .split(&normalized)
                .filter(|token| token.chars().count() > 1 && !URL_STOPWORDS.contains(token))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_accents_and_stopwords() {
        assert_eq!(tokenize("The Beatles"), vec!["beatles"]);
        assert_eq!(tokenize("Björk Guðmundsdóttir"), vec!["bjork", "guðmundsdottir"]);
        assert_eq!(tokenize("J. S. Bach"), vec!["bach"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" - . ").is_empty());
    }

    #[test]
    fn test_tokenize_url() {
        assert_eq!(
            tokenize_url("https://www.imdb.com/name/nm0000001/"),
            vec!["imdb", "name", "nm0000001"]
        );
        assert_eq!(
            tokenize_url("turing.org.uk/turing/index.html"),
            vec!["turing", "uk", "turing"]
        );
        assert!(tokenize_url("   ").is_empty());
    }
}
