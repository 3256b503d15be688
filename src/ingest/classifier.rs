use super::CITATION_MARKER;

/// Label assigned to one decoded fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    Plain(&'a str),
    /// Payload following the first marker occurrence, possibly empty.
    Citation(&'a str),
}

/// A fragment carrying the marker is a citation in its entirety: no part of
/// it, including text before the marker, belongs to the answer.
pub fn classify(fragment: &str) -> Fragment<'_> {
    match fragment.split_once(CITATION_MARKER) {
        Some((_, payload)) => Fragment::Citation(payload),
        None => Fragment::Plain(fragment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_without_marker() {
        assert_eq!(classify("the capital. "), Fragment::Plain("the capital. "));
        assert_eq!(classify(""), Fragment::Plain(""));
    }

    #[test]
    fn whole_fragment_is_citation_when_marker_present() {
        assert_eq!(
            classify("lead-in source:{'url': 'http://a.example'}"),
            Fragment::Citation("{'url': 'http://a.example'}")
        );
    }

    #[test]
    fn marker_without_payload_is_empty_citation() {
        assert_eq!(classify("source:"), Fragment::Citation(""));
    }

    #[test]
    fn bare_word_source_is_plain() {
        assert_eq!(classify("an open source project"), Fragment::Plain("an open source project"));
    }
}
