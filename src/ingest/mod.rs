//! Streaming answer ingestion.
//!
//! ```text
//! chunk ─▶ decoder ─▶ classifier ─┬─ plain ────▶ assembler buffer
//!                                 └─ citation ─▶ normalizer ─▶ deferred sources
//! end of stream ─▶ assembler.finalize() ─▶ ChatSession transcript ─▶ store
//! ```

pub mod assembler;
pub mod classifier;
pub mod decoder;
pub mod machine;
pub mod normalizer;
pub mod registry;

/// Token whose presence marks a decoded fragment as a citation record.
pub const CITATION_MARKER: &str = "source:";

/// Wraps each source URL appended to a finalized answer.
pub const SOURCE_DELIMITER: &str = "<<SOURCE>>";

pub use assembler::{extract_sources, IngestionSession, TranscriptAssembler};
pub use machine::{ChatSession, IngestConfig, Progress, Reply, TRANSPORT_ERROR_MESSAGE};
pub use registry::SessionRegistry;
