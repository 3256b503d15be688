pub mod chat_repository;
pub mod message_repository;
