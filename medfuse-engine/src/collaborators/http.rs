//! HTTP collaborators
//!
//! Each collaborator POSTs to one configured URL and returns the response body
//! untouched. Deadlines are applied by the caller through
//! [`super::call_with_timeout`], not by the client.

use super::{
    CollaboratorError, CollaboratorResult, ContextRetriever, Extractor, ImageClassifier,
    QuestionContext, QuestionProposer,
};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::json;
use tracing::debug;

const USER_AGENT: &str = concat!("medfuse-engine/", env!("CARGO_PKG_VERSION"));

/// Shared client for every HTTP collaborator
pub fn build_client() -> CollaboratorResult<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| CollaboratorError::Network(format!("HTTP client build failed: {}", e)))
}

async fn send(request: RequestBuilder, collaborator: &str) -> CollaboratorResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| CollaboratorError::Network(format!("{} request failed: {}", collaborator, e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CollaboratorError::Network(format!("{} body read failed: {}", collaborator, e)))?;

    if !status.is_success() {
        return Err(CollaboratorError::Api {
            status: status.as_u16(),
            body,
        });
    }

    debug!(collaborator, bytes = body.len(), "Collaborator responded");
    Ok(body)
}

/// POST `{"dialogue": ...}`
pub struct HttpExtractor {
    client: Client,
    url: String,
}

impl HttpExtractor {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, dialogue: &str) -> CollaboratorResult<String> {
        let request = self.client.post(&self.url).json(&json!({ "dialogue": dialogue }));
        send(request, "extractor").await
    }
}

/// POST the serialized [`QuestionContext`]
pub struct HttpQuestionProposer {
    client: Client,
    url: String,
}

impl HttpQuestionProposer {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl QuestionProposer for HttpQuestionProposer {
    async fn propose(&self, context: &QuestionContext) -> CollaboratorResult<String> {
        let request = self.client.post(&self.url).json(context);
        send(request, "proposer").await
    }
}

/// POST `{"query": ..., "top_k": ...}`
pub struct HttpContextRetriever {
    client: Client,
    url: String,
}

impl HttpContextRetriever {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ContextRetriever for HttpContextRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> CollaboratorResult<String> {
        let request = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "top_k": top_k }));
        send(request, "retriever").await
    }
}

/// POST the raw image bytes
pub struct HttpImageClassifier {
    client: Client,
    url: String,
}

impl HttpImageClassifier {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ImageClassifier for HttpImageClassifier {
    async fn classify(&self, image: &[u8]) -> CollaboratorResult<String> {
        let request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        send(request, "classifier").await
    }
}
