//! Chat backend that streams answers from a remote query service.
//!
//! The interesting part is [`ingest`]: the answer body arrives in chunks
//! that mix prose with `source:{'url': ...}` citation records. Prose is
//! accumulated as it arrives, citations are normalized and held back, and
//! the finished message carries the sources at its end.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ingest`] | Decoder, classifier, normalizer, assembler, state machine |
//! | [`agent`] | HTTP client for the query service |
//! | [`db`] / [`service`] | Postgres persistence of chats and transcripts |
//! | [`routes`] | REST and WebSocket handlers |

pub mod agent;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod service;
pub mod traits;
