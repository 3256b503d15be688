use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::models::SourceDescriptor;

use super::SOURCE_DELIMITER;

/// `url` key (optionally quoted) followed by a single-quoted value.
static URL_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?\burl\b["']?\s*:\s*'([^']*)'"#).expect("static regex")
});

/// Turns a citation payload into at most one [`SourceDescriptor`].
///
/// The upstream writes citations as Python-style dicts with single quotes.
/// The strict path rewrites quotes and parses JSON; when that fails (an
/// apostrophe inside a value is enough) the url is pulled straight out of
/// the raw text. Failures are logged and yield `None`, as do urls that
/// contain the source delimiter.
pub fn normalize(payload: &str) -> Option<SourceDescriptor> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    let url = strict_url(payload).or_else(|| fallback_url(payload));
    match url.map(|u| u.trim().to_string()) {
        Some(url) if url.contains(SOURCE_DELIMITER) => {
            warn!("Dropping citation whose url contains {SOURCE_DELIMITER}: {url}");
            None
        }
        Some(url) if !url.is_empty() => Some(SourceDescriptor { url }),
        _ => {
            warn!("Dropping unparseable citation payload: {payload}");
            None
        }
    }
}

fn strict_url(payload: &str) -> Option<String> {
    let rewritten = payload.replace('\'', "\"");
    match serde_json::from_str::<Value>(&rewritten) {
        Ok(value) => value.get("url")?.as_str().map(str::to_string),
        Err(_) => None,
    }
}

fn fallback_url(payload: &str) -> Option<String> {
    URL_FALLBACK
        .captures(payload)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(payload: &str) -> Option<String> {
        normalize(payload).map(|d| d.url)
    }

    #[test]
    fn strict_single_quoted_record() {
        assert_eq!(url("{'url': 'http://a.example'}"), Some("http://a.example".into()));
    }

    #[test]
    fn strict_ignores_extra_fields() {
        assert_eq!(
            url(" {'title': 'Paris', 'url': 'http://b.example/x?y=1'} \n"),
            Some("http://b.example/x?y=1".into())
        );
    }

    #[test]
    fn apostrophe_in_title_falls_back_to_pattern() {
        assert_eq!(
            url("{'title': 'Earth's moon', 'url': 'http://moon.example'}"),
            Some("http://moon.example".into())
        );
    }

    #[test]
    fn missing_url_key_yields_none() {
        assert_eq!(url("{'ur':'x'}"), None);
    }

    #[test]
    fn empty_or_blank_payload_yields_none() {
        assert_eq!(url(""), None);
        assert_eq!(url("   "), None);
        assert_eq!(url("{'url': '  '}"), None);
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(url("not a record at all"), None);
    }

    #[test]
    fn non_string_url_without_quoted_fallback_yields_none() {
        assert_eq!(url("{'url': 42}"), None);
    }

    #[test]
    fn url_containing_delimiter_yields_none() {
        assert_eq!(url("{'url': 'http://a.example/<<SOURCE>>x'}"), None);
    }
}
