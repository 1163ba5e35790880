//! Session State Store
//!
//! In-memory map of live cases. The outer map sits behind an async `RwLock`
//! (insert takes the write lock, lookups the read lock); each case has its own
//! `RwLock`, so work on different cases never contends beyond the map lookup.
//!
//! Cases are never removed.

use crate::services::{DomainBucketMap, EhrBinding, RedFlag};
use crate::types::{Finding, ProposedQuestion, RankedCandidate};
use chrono::{DateTime, Utc};
use medfuse_common::events::CompactSummary;
use medfuse_common::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Pipeline state of a case
///
/// `Created → AwaitingEvidence → Updating → Idle`, then back to `Updating`
/// on every new utterance. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Created,
    AwaitingEvidence,
    Updating,
    Idle,
}

/// Everything known about one encounter
#[derive(Debug, Clone, Serialize)]
pub struct CaseState {
    pub case_id: Uuid,
    /// Fixed at creation
    pub image_findings: Vec<Finding>,
    /// Append-only, optionally `"speaker: text"`
    pub utterances: Vec<String>,
    pub ehr_binding: Option<EhrBinding>,
    pub last_ranked: Vec<RankedCandidate>,
    pub last_domains: DomainBucketMap,
    pub last_summary: CompactSummary,
    pub last_questions: Vec<ProposedQuestion>,
    pub last_red_flags: Vec<RedFlag>,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseState {
    fn new(image_findings: Vec<Finding>, ehr_binding: Option<EhrBinding>) -> Self {
        let now = Utc::now();
        Self {
            case_id: Uuid::new_v4(),
            image_findings,
            utterances: Vec::new(),
            ehr_binding,
            last_ranked: Vec::new(),
            last_domains: DomainBucketMap::new(),
            last_summary: CompactSummary::empty(),
            last_questions: Vec::new(),
            last_red_flags: Vec::new(),
            status: CaseStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

type CaseHandle = Arc<RwLock<CaseState>>;

/// Shared in-memory case store
#[derive(Clone, Default)]
pub struct SessionStore {
    cases: Arc<RwLock<HashMap<Uuid, CaseHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new case; always succeeds
    pub async fn create(&self, image_findings: Vec<Finding>, ehr_binding: Option<EhrBinding>) -> Uuid {
        let state = CaseState::new(image_findings, ehr_binding);
        let case_id = state.case_id;
        self.cases
            .write()
            .await
            .insert(case_id, Arc::new(RwLock::new(state)));
        debug!(case_id = %case_id, "Case created");
        case_id
    }

    async fn handle(&self, case_id: Uuid) -> Result<CaseHandle> {
        self.cases
            .read()
            .await
            .get(&case_id)
            .cloned()
            .ok_or(Error::CaseNotFound(case_id))
    }

    /// Append one utterance and return the updated state
    pub async fn append_utterance(
        &self,
        case_id: Uuid,
        text: &str,
        speaker: Option<&str>,
    ) -> Result<CaseState> {
        let handle = self.handle(case_id).await?;
        let mut case = handle.write().await;
        let line = match speaker.map(str::trim).filter(|s| !s.is_empty()) {
            Some(speaker) => format!("{}: {}", speaker, text),
            None => text.to_string(),
        };
        case.utterances.push(line);
        case.touch();
        Ok(case.clone())
    }

    pub async fn get(&self, case_id: Uuid) -> Result<CaseState> {
        let handle = self.handle(case_id).await?;
        let case = handle.read().await;
        Ok(case.clone())
    }

    /// Store the latest fusion result
    pub async fn update_cache(
        &self,
        case_id: Uuid,
        ranked: Vec<RankedCandidate>,
        domains: DomainBucketMap,
    ) -> Result<()> {
        let handle = self.handle(case_id).await?;
        let mut case = handle.write().await;
        case.last_ranked = ranked;
        case.last_domains = domains;
        case.touch();
        Ok(())
    }

    /// Store the display-side outputs of a pipeline run
    pub async fn update_summary(
        &self,
        case_id: Uuid,
        summary: CompactSummary,
        questions: Vec<ProposedQuestion>,
        red_flags: Vec<RedFlag>,
    ) -> Result<()> {
        let handle = self.handle(case_id).await?;
        let mut case = handle.write().await;
        case.last_summary = summary;
        case.last_questions = questions;
        case.last_red_flags = red_flags;
        case.touch();
        Ok(())
    }

    pub async fn set_status(&self, case_id: Uuid, status: CaseStatus) -> Result<()> {
        let handle = self.handle(case_id).await?;
        let mut case = handle.write().await;
        case.status = status;
        case.touch();
        Ok(())
    }

    /// Cached compact summary, without cloning the rest of the state
    pub async fn summary(&self, case_id: Uuid) -> Result<CompactSummary> {
        let handle = self.handle(case_id).await?;
        let case = handle.read().await;
        Ok(case.last_summary.clone())
    }

    pub async fn len(&self) -> usize {
        self.cases.read().await.len()
    }
}
