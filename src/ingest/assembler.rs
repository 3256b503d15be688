use tracing::warn;

use crate::errors::AppError;
use crate::models::{Message, SourceDescriptor};

use super::classifier::{classify, Fragment};
use super::decoder::ByteDecoder;
use super::normalizer::normalize;
use super::SOURCE_DELIMITER;

/// Accumulates the answer for one response.
///
/// Citations are held back and only placed at the end of the content by
/// [`finalize`](Self::finalize), so the message shape does not depend on
/// where in the stream they arrived. The delimiter is reserved for those
/// trailing segments and is removed from the answer text itself.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    answer: String,
    sources: Vec<SourceDescriptor>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_plain(&mut self, text: &str) {
        self.answer.push_str(text);
    }

    pub fn defer_source(&mut self, descriptor: SourceDescriptor) {
        self.sources.push(descriptor);
    }

    /// The answer text received so far, without sources.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn finalize(self) -> Message {
        let Self { mut answer, sources } = self;
        if strip_delimiters(&mut answer) {
            warn!("Removed {SOURCE_DELIMITER} from answer text");
        }
        for source in &sources {
            answer.push_str(SOURCE_DELIMITER);
            answer.push_str(&source.url);
            answer.push_str(SOURCE_DELIMITER);
        }
        Message::assistant(answer)
    }
}

/// Removes every delimiter occurrence, including ones formed by joining
/// the text around a removed one. Returns whether anything was removed.
fn strip_delimiters(text: &mut String) -> bool {
    let mut stripped = false;
    while text.contains(SOURCE_DELIMITER) {
        *text = text.replace(SOURCE_DELIMITER, "");
        stripped = true;
    }
    stripped
}

/// Recovers the ordered source URLs appended by [`TranscriptAssembler::finalize`].
///
/// Only the trailing run of delimiter-wrapped segments is considered.
pub fn extract_sources(content: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = content;
    while let Some(head) = rest.strip_suffix(SOURCE_DELIMITER) {
        let Some(open) = head.rfind(SOURCE_DELIMITER) else {
            break;
        };
        urls.push(head[open + SOURCE_DELIMITER.len()..].to_string());
        rest = &head[..open];
    }
    urls.reverse();
    urls
}

/// Ephemeral per-response state: decoder plus assembler.
///
/// Once finalized the session is closed and every further call fails with
/// [`AppError::SessionClosed`].
#[derive(Debug)]
pub struct IngestionSession {
    decoder: ByteDecoder,
    assembler: Option<TranscriptAssembler>,
}

/// What a single fragment contributed to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Plain(String),
    Source(SourceDescriptor),
    Dropped,
}

impl IngestionSession {
    pub fn new() -> Self {
        Self { decoder: ByteDecoder::new(), assembler: Some(TranscriptAssembler::new()) }
    }

    fn assembler_mut(&mut self) -> Result<&mut TranscriptAssembler, AppError> {
        self.assembler.as_mut().ok_or(AppError::SessionClosed)
    }

    /// Decodes one chunk and routes the resulting fragment.
    pub fn ingest_chunk(&mut self, chunk: &[u8], terminated: bool) -> Result<Ingested, AppError> {
        if self.assembler.is_none() {
            return Err(AppError::SessionClosed);
        }
        let text = self.decoder.decode(chunk, terminated);
        self.ingest_text(&text)
    }

    pub fn ingest_text(&mut self, text: &str) -> Result<Ingested, AppError> {
        let assembler = self.assembler_mut()?;
        match classify(text) {
            Fragment::Plain(plain) => {
                assembler.append_plain(plain);
                Ok(Ingested::Plain(plain.to_string()))
            }
            Fragment::Citation(payload) => match normalize(payload) {
                Some(descriptor) => {
                    assembler.defer_source(descriptor.clone());
                    Ok(Ingested::Source(descriptor))
                }
                None => Ok(Ingested::Dropped),
            },
        }
    }

    pub fn answer(&self) -> Option<&str> {
        self.assembler.as_ref().map(TranscriptAssembler::answer)
    }

    pub fn finalize(&mut self) -> Result<Message, AppError> {
        let assembler = self.assembler.take().ok_or(AppError::SessionClosed)?;
        Ok(assembler.finalize())
    }
}

impl Default for IngestionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn wrap(url: &str) -> String {
        format!("{SOURCE_DELIMITER}{url}{SOURCE_DELIMITER}")
    }

    #[test]
    fn marker_free_fragments_concatenate_verbatim() {
        let mut session = IngestionSession::new();
        for part in ["Rust ", "is ", "", "memory safe."] {
            session.ingest_text(part).unwrap();
        }
        let msg = session.finalize().unwrap();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "Rust is memory safe.");
        assert!(!msg.content.contains(SOURCE_DELIMITER));
    }

    #[test]
    fn sources_go_to_the_end_in_arrival_order() {
        let mut session = IngestionSession::new();
        session.ingest_text("source:{'url': 'http://one.example'}").unwrap();
        session.ingest_text("First. ").unwrap();
        session.ingest_text("source:{'url': 'http://two.example'}").unwrap();
        session.ingest_text("Second.").unwrap();
        session.ingest_text("source:{'url': 'http://one.example'}").unwrap();

        let msg = session.finalize().unwrap();
        let expected = format!(
            "First. Second.{}{}{}",
            wrap("http://one.example"),
            wrap("http://two.example"),
            wrap("http://one.example"),
        );
        assert_eq!(msg.content, expected);
    }

    #[test]
    fn malformed_citation_leaves_buffer_untouched() {
        let mut session = IngestionSession::new();
        session.ingest_text("Answer.").unwrap();
        assert_eq!(session.ingest_text("source:{'ur':'x'}").unwrap(), Ingested::Dropped);
        assert_eq!(session.answer(), Some("Answer."));
        assert_eq!(session.finalize().unwrap().content, "Answer.");
    }

    #[test]
    fn extracted_sources_match_deferred_order() {
        let urls = ["http://a.example", "http://b.example/path", "http://a.example"];
        let mut assembler = TranscriptAssembler::new();
        assembler.append_plain("Some answer text.");
        for url in urls {
            assembler.defer_source(SourceDescriptor { url: url.to_string() });
        }
        let msg = assembler.finalize();
        assert_eq!(extract_sources(&msg.content), urls);
    }

    #[test]
    fn delimiter_in_answer_text_is_not_read_back_as_source() {
        let mut session = IngestionSession::new();
        session.ingest_text("Use <<SOURCE>>tags<<SOURCE>>").unwrap();
        let msg = session.finalize().unwrap();
        assert_eq!(msg.content, "Use tags");
        assert!(extract_sources(&msg.content).is_empty());
    }

    #[test]
    fn delimiter_split_across_fragments_is_removed() {
        let mut session = IngestionSession::new();
        for part in ["a <<SOU", "RCE>>b", " <<SOU<<SOURCE>>RCE>>"] {
            session.ingest_text(part).unwrap();
        }
        session.ingest_text("source:{'url': 'http://a.example'}").unwrap();
        let msg = session.finalize().unwrap();
        assert_eq!(msg.content, format!("a b {}", wrap("http://a.example")));
        assert_eq!(extract_sources(&msg.content), ["http://a.example"]);
    }

    #[test]
    fn extract_sources_of_plain_answer_is_empty() {
        assert!(extract_sources("no sources here").is_empty());
    }

    #[test]
    fn second_finalize_is_rejected() {
        let mut session = IngestionSession::new();
        session.ingest_text("done").unwrap();
        assert!(session.finalize().is_ok());
        assert!(matches!(session.finalize(), Err(AppError::SessionClosed)));
        assert!(matches!(session.ingest_text("late"), Err(AppError::SessionClosed)));
        assert!(matches!(session.ingest_chunk(b"late", false), Err(AppError::SessionClosed)));
        assert_eq!(session.answer(), None);
    }

    #[test]
    fn chunks_are_decoded_before_classification() {
        let bytes = "naïve".as_bytes();
        let mut session = IngestionSession::new();
        session.ingest_chunk(&bytes[..3], false).unwrap();
        session.ingest_chunk(&bytes[3..], false).unwrap();
        session.ingest_chunk(&[], true).unwrap();
        assert_eq!(session.finalize().unwrap().content, "naïve");
    }
}
