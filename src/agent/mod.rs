use async_trait::async_trait;
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::{Message, QueryRequest};
use crate::traits::{AnswerSource, ChunkReader};

const QUERY_PATH: &str = "/query";

/// Client for the remote query service that streams answers back.
#[derive(Clone)]
pub struct QueryServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl QueryServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn query_url(&self) -> String {
        format!("{}{QUERY_PATH}", self.base_url)
    }
}

#[async_trait]
impl AnswerSource for QueryServiceClient {
    /// POSTs the whole transcript; the response body is returned unread.
    async fn open(&self, messages: &[Message]) -> Result<Box<dyn ChunkReader>, AppError> {
        let url = self.query_url();
        debug!("Opening answer stream at {url} with {} messages", messages.len());

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&QueryRequest { messages })
            .send()
            .await
            .map_err(|e| {
                error!("Query service request to {url} failed: {e}");
                AppError::transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Query service at {url} answered {status}");
            return Err(AppError::UpstreamStatus { status: status.as_u16() });
        }

        Ok(Box::new(ResponseChunks { response }))
    }
}

struct ResponseChunks {
    response: reqwest::Response,
}

#[async_trait]
impl ChunkReader for ResponseChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, AppError> {
        let chunk = self.response.chunk().await.map_err(|e| {
            error!("Reading answer stream failed: {e}");
            AppError::from(e)
        })?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_url_joins_without_double_slash() {
        assert_eq!(
            QueryServiceClient::new("http://localhost:8000/").query_url(),
            "http://localhost:8000/query"
        );
        assert_eq!(
            QueryServiceClient::new("http://q.internal").query_url(),
            "http://q.internal/query"
        );
    }
}
