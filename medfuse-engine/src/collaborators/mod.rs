//! External collaborators
//!
//! Extraction, question drafting, context retrieval and image classification
//! are opaque services reached through the traits below. Every call returns
//! the raw payload; [`payload`] parses it best-effort into strict types.
//! Calls are bounded by [`call_with_timeout`] and a failure never reaches the
//! caller of the pipeline: it is logged and replaced with a neutral default.

pub mod http;
pub mod offline;
pub mod payload;

use crate::services::ScopeHint;
use crate::types::{Extraction, Finding, RankedCandidate, TextFinding};
use async_trait::async_trait;
use medfuse_common::config::CollaboratorConfig;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Collaborator call failures
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Call exceeded its deadline
    #[error("{collaborator} timed out after {timeout_ms} ms")]
    Timeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Upstream returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Payload could not be produced or interpreted
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Structured extraction over the full dialogue
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the raw extraction payload (JSON, possibly wrapped in prose)
    async fn extract(&self, dialogue: &str) -> CollaboratorResult<String>;
}

/// Clarifying-question drafting
#[async_trait]
pub trait QuestionProposer: Send + Sync {
    /// Returns the raw `{"questions": [...]}` payload
    async fn propose(&self, context: &QuestionContext) -> CollaboratorResult<String>;
}

/// Background text retrieval
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> CollaboratorResult<String>;
}

/// Image classification into per-label probabilities
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Returns the raw findings payload (`[{"label", "score"|"prob"}]`)
    async fn classify(&self, image: &[u8]) -> CollaboratorResult<String>;
}

/// Case state handed to the question proposer
#[derive(Debug, Clone, Serialize)]
pub struct QuestionContext {
    pub top_candidates: Vec<RankedCandidate>,
    pub image_findings: Vec<Finding>,
    pub ehr_summary: String,
    pub text_findings: Vec<TextFinding>,
    pub extraction: Extraction,
    pub retrieved_context: String,
    pub top_confidence: f64,
    pub margin: f64,
    pub scope_hint: ScopeHint,
    pub max_questions: usize,
}

/// Candidates included in a [`QuestionContext`]
pub const CONTEXT_CANDIDATES: usize = 5;

/// Run a collaborator future under a deadline
pub async fn call_with_timeout<T, F>(
    collaborator: &'static str,
    timeout: Duration,
    call: F,
) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// The full set of collaborators used by one pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub proposer: Arc<dyn QuestionProposer>,
    pub retriever: Arc<dyn ContextRetriever>,
    pub classifier: Arc<dyn ImageClassifier>,
    /// Deadline for extraction, retrieval and classification
    pub timeout: Duration,
    /// Deadline for question proposal
    pub question_timeout: Duration,
}

impl Collaborators {
    /// Offline defaults with default deadlines
    pub fn offline() -> Self {
        let config = CollaboratorConfig::default();
        Self {
            extractor: Arc::new(offline::PassthroughExtractor),
            proposer: Arc::new(offline::EmptyProposer),
            retriever: Arc::new(offline::EmptyRetriever),
            classifier: Arc::new(offline::EmptyClassifier),
            timeout: Duration::from_millis(config.timeout_ms),
            question_timeout: Duration::from_millis(config.question_timeout_ms),
        }
    }

    /// HTTP collaborators for every configured URL, offline defaults otherwise
    pub fn from_config(config: &CollaboratorConfig) -> CollaboratorResult<Self> {
        let client = http::build_client()?;
        let mut collaborators = Self::offline();
        collaborators.timeout = Duration::from_millis(config.timeout_ms);
        collaborators.question_timeout = Duration::from_millis(config.question_timeout_ms);

        if let Some(url) = &config.extraction_url {
            info!(url = %url, "Extraction collaborator: HTTP");
            collaborators.extractor = Arc::new(http::HttpExtractor::new(client.clone(), url));
        }
        if let Some(url) = &config.question_url {
            info!(url = %url, "Question collaborator: HTTP");
            collaborators.proposer = Arc::new(http::HttpQuestionProposer::new(client.clone(), url));
        }
        if let Some(url) = &config.retrieval_url {
            info!(url = %url, "Retrieval collaborator: HTTP");
            collaborators.retriever = Arc::new(http::HttpContextRetriever::new(client.clone(), url));
        }
        if let Some(url) = &config.imaging_url {
            info!(url = %url, "Imaging collaborator: HTTP");
            collaborators.classifier = Arc::new(http::HttpImageClassifier::new(client, url));
        }
        Ok(collaborators)
    }
}
