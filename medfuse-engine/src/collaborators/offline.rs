//! Offline collaborators
//!
//! Used when no endpoint is configured. The pass-through extractor turns each
//! dialogue line into a symptom so keyword scanning still sees the words; the
//! rest return empty payloads.

use super::{
    CollaboratorError, CollaboratorResult, ContextRetriever, Extractor, ImageClassifier,
    QuestionContext, QuestionProposer,
};
use crate::types::Extraction;
use async_trait::async_trait;

/// Every non-blank dialogue line becomes a symptom
pub struct PassthroughExtractor;

#[async_trait]
impl Extractor for PassthroughExtractor {
    async fn extract(&self, dialogue: &str) -> CollaboratorResult<String> {
        let mut extraction = Extraction::neutral(dialogue);
        extraction.symptoms = dialogue
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        serde_json::to_string(&extraction).map_err(|e| CollaboratorError::Malformed(e.to_string()))
    }
}

/// Proposes nothing
pub struct EmptyProposer;

#[async_trait]
impl QuestionProposer for EmptyProposer {
    async fn propose(&self, _context: &QuestionContext) -> CollaboratorResult<String> {
        Ok(r#"{"questions": []}"#.to_string())
    }
}

/// Retrieves nothing
pub struct EmptyRetriever;

#[async_trait]
impl ContextRetriever for EmptyRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> CollaboratorResult<String> {
        Ok(String::new())
    }
}

/// Classifies nothing
pub struct EmptyClassifier;

#[async_trait]
impl ImageClassifier for EmptyClassifier {
    async fn classify(&self, _image: &[u8]) -> CollaboratorResult<String> {
        Ok("[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::payload;

    #[tokio::test]
    async fn test_passthrough_lines_become_symptoms() {
        let dialogue = "patient: fever and chills\n\n doctor: how long? ";
        let raw = PassthroughExtractor.extract(dialogue).await.unwrap();
        let extraction = payload::parse_extraction(&raw, dialogue);
        assert_eq!(
            extraction.symptoms,
            vec!["patient: fever and chills", "doctor: how long?"]
        );
        assert_eq!(extraction.retrieval_query, dialogue.trim());
    }

    #[tokio::test]
    async fn test_empty_collaborators_parse_to_nothing() {
        assert!(payload::parse_image_findings(&EmptyClassifier.classify(b"img").await.unwrap()).is_empty());
        assert!(EmptyRetriever.retrieve("q", 5).await.unwrap().is_empty());
    }
}
