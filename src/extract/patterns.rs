use regex::Regex;
use std::sync::OnceLock;

use crate::language::{normalize_language, Language};

fn status_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)https?://(?:www\.|mobile\.)?(?:twitter\.com|x\.com)/(?:[A-Za-z0-9_]{1,15}|i(?:/web)?)/status(?:es)?/\d+",
        )
        .expect("status url pattern is valid")
    })
}

fn any_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url pattern is valid"))
}

fn handle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[A-Za-z0-9_]+").expect("handle pattern is valid"))
}

fn language_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(english|spanish|french|german|hindi|japanese|korean|chinese|en|es|fr|de|hi|ja|ko|zh)\b",
        )
        .expect("language pattern is valid")
    })
}

/// First platform status link in the text, without query string or fragment.
pub fn find_status_url(text: &str) -> Option<String> {
    status_url_regex().find(text).map(|m| m.as_str().to_string())
}

/// Cheap language guess. Full names win over two-letter codes; links and
/// @handles are ignored so path segments never read as codes.
pub fn guess_language(text: &str) -> Option<Language> {
    let without_urls = any_url_regex().replace_all(text, " ");
    let cleaned = handle_regex().replace_all(&without_urls, " ");

    let mut code_guess = None;
    for m in language_word_regex().find_iter(&cleaned) {
        let word = m.as_str();
        if word.len() > 2 {
            return normalize_language(word);
        }
        if code_guess.is_none() {
            code_guess = normalize_language(word);
        }
    }
    code_guess
}

/// Whether a string looks like an absolute http(s) link
pub fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.trim().to_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")) && !lower.contains(char::is_whitespace)
}

/// Rewrite `x.com` links to `twitter.com`, which the downloader handles more
/// reliably. Other hosts pass through untouched.
pub fn normalize_status_host(url: &str) -> String {
    for prefix in ["https://x.com/", "http://x.com/", "https://www.x.com/", "http://www.x.com/"] {
        if let Some(head) = url.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                return format!("https://twitter.com/{}", &url[prefix.len()..]);
            }
        }
    }
    url.to_string()
}

/// Status id at the end of a status link
pub fn status_id_from_url(url: &str) -> Option<String> {
    let found = status_url_regex().find(url)?;
    found
        .as_str()
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}
