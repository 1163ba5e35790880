//! Live Update Pipeline
//!
//! Every case owns one worker task fed by an unbounded FIFO queue. The worker
//! is the only writer of the case's derived state, so at most one run per
//! case is in flight and utterances are processed in arrival order. Each job
//! carries a oneshot reply; a caller that goes away does not cancel the run.
//!
//! # Case states
//! `Created → AwaitingEvidence → Updating → Idle`; a new utterance moves an
//! idle case back to `Updating`.

use crate::collaborators::{
    call_with_timeout, payload, CollaboratorError, Collaborators, QuestionContext,
    CONTEXT_CANDIDATES,
};
use crate::fusion::{EvidenceNormalizer, FusionEngine, TextEvidenceScanner};
use crate::services::{
    confidence_and_margin, scope_hint, DomainBucketer, EhrBinding, EhrDirectory, EhrRecord,
    QuestionGate, RedFlagDetector,
};
use crate::session::{CaseState, CaseStatus, SessionStore};
use crate::types::{
    ConfidenceSummary, Extraction, Finding, ProposedQuestion, RankedCandidate, TextFinding,
};
use crate::workflow::summary::build_summary;
use chrono::Utc;
use medfuse_common::events::{CompactSummary, EventBus, MedfuseEvent};
use medfuse_common::{EngineConfig, Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of registering a case
#[derive(Debug, Clone, Serialize)]
pub struct CreatedCase {
    pub case_id: Uuid,
    pub image_findings: Vec<Finding>,
    pub ehr_binding: Option<EhrBinding>,
    pub compact_summary: CompactSummary,
}

/// Read-only view of one case's summaries
///
/// `initial` is the cached summary at subscription time; [`next`](Self::next)
/// yields every later summary for the same case.
pub struct CaseSubscription {
    pub case_id: Uuid,
    pub initial: CompactSummary,
    rx: broadcast::Receiver<MedfuseEvent>,
    store: SessionStore,
}

impl CaseSubscription {
    /// Next summary for this case; `None` once the bus is closed
    ///
    /// The bus is shared by all cases. When this receiver lags, the skipped
    /// events may include this case's own update, so the cached summary is
    /// returned instead.
    pub async fn next(&mut self) -> Option<CompactSummary> {
        loop {
            match self.rx.recv().await {
                Ok(MedfuseEvent::CaseUpdated { case_id, summary, .. }) if case_id == self.case_id => {
                    return Some(summary);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(case_id = %self.case_id, skipped, "Case subscriber lagged, resending cached summary");
                    return self.store.summary(self.case_id).await.ok();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

type Reply = oneshot::Sender<Result<CompactSummary>>;

enum PipelineJob {
    /// Recompute without new evidence (case creation)
    Refresh { reply: Reply },
    /// Append an utterance, then recompute
    Utterance {
        text: String,
        speaker: Option<String>,
        reply: Reply,
    },
}

/// Stateless components plus shared handles used by every worker
struct PipelineCore {
    config: Arc<EngineConfig>,
    store: SessionStore,
    event_bus: EventBus,
    collaborators: Collaborators,
    /// Swapped whole on reload
    ehr: RwLock<EhrDirectory>,
    normalizer: EvidenceNormalizer,
    scanner: TextEvidenceScanner,
    fusion: FusionEngine,
    bucketer: DomainBucketer,
    red_flags: RedFlagDetector,
    gate: QuestionGate,
}

/// Entry point for case creation, utterance submission and subscription
#[derive(Clone)]
pub struct LivePipeline {
    core: Arc<PipelineCore>,
    workers: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<PipelineJob>>>>,
}

impl LivePipeline {
    pub fn new(
        config: Arc<EngineConfig>,
        collaborators: Collaborators,
        ehr: EhrDirectory,
        event_bus: EventBus,
    ) -> Self {
        let tables = &config.tables;
        let bucketer = DomainBucketer::new(&tables.domains);
        let core = PipelineCore {
            normalizer: EvidenceNormalizer::new(&tables.aliases),
            scanner: TextEvidenceScanner::new(tables, bucketer.allowed_labels()),
            fusion: FusionEngine::new(&config.fusion),
            red_flags: RedFlagDetector::new(&tables.critical_conditions),
            gate: QuestionGate::new(&config.gate),
            bucketer,
            store: SessionStore::new(),
            event_bus,
            collaborators,
            ehr: RwLock::new(ehr),
            config,
        };
        Self {
            core: Arc::new(core),
            workers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a case from an optional image
    ///
    /// The image is classified by the imaging collaborator; a failed
    /// classification yields a case without image findings.
    pub async fn create_case(
        &self,
        image: Option<&[u8]>,
        filename: Option<&str>,
        patient_hint: Option<&str>,
    ) -> Result<CreatedCase> {
        let findings = match image {
            Some(bytes) if !bytes.is_empty() => self.core.classify(bytes).await,
            _ => Vec::new(),
        };
        self.open_case(findings, filename, patient_hint).await
    }

    /// Register a case from already-classified image findings
    pub async fn create_case_with_findings(
        &self,
        findings: Vec<Finding>,
        patient_hint: Option<&str>,
    ) -> Result<CreatedCase> {
        self.open_case(findings, None, patient_hint).await
    }

    async fn open_case(
        &self,
        findings: Vec<Finding>,
        filename: Option<&str>,
        patient_hint: Option<&str>,
    ) -> Result<CreatedCase> {
        let ehr_binding = self
            .core
            .ehr
            .read()
            .await
            .bind(patient_hint, filename, &findings);
        let case_id = self
            .core
            .store
            .create(findings.clone(), ehr_binding.clone())
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        self.workers.write().await.insert(case_id, tx.clone());
        tokio::spawn(run_worker(Arc::clone(&self.core), case_id, rx));

        info!(
            case_id = %case_id,
            image_findings = findings.len(),
            ehr_bound = ehr_binding.is_some(),
            "Case created"
        );
        self.core.event_bus.emit_lossy(MedfuseEvent::CaseCreated {
            case_id,
            image_finding_count: findings.len(),
            timestamp: Utc::now(),
        });

        let compact_summary = enqueue(case_id, &tx, |reply| PipelineJob::Refresh { reply }).await?;

        Ok(CreatedCase {
            case_id,
            image_findings: findings,
            ehr_binding,
            compact_summary,
        })
    }

    /// Append an utterance and return the recomputed summary
    ///
    /// Fails with [`Error::CaseNotFound`] for an unknown id, then with
    /// [`Error::InvalidInput`] for blank text.
    pub async fn submit_utterance(
        &self,
        case_id: Uuid,
        text: &str,
        speaker: Option<&str>,
    ) -> Result<CompactSummary> {
        let worker = self.worker(case_id).await?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Utterance text is empty".to_string()));
        }
        let text = text.to_string();
        let speaker = speaker.map(str::to_string);
        enqueue(case_id, &worker, move |reply| PipelineJob::Utterance {
            text,
            speaker,
            reply,
        })
        .await
    }

    async fn worker(&self, case_id: Uuid) -> Result<mpsc::UnboundedSender<PipelineJob>> {
        self.workers
            .read()
            .await
            .get(&case_id)
            .cloned()
            .ok_or(Error::CaseNotFound(case_id))
    }

    /// Cached summary plus a stream of later summaries
    pub async fn subscribe(&self, case_id: Uuid) -> Result<CaseSubscription> {
        // Subscribe before reading the cache so no update falls in between
        let rx = self.core.event_bus.subscribe();
        let initial = self.core.store.summary(case_id).await?;
        Ok(CaseSubscription {
            case_id,
            initial,
            rx,
            store: self.core.store.clone(),
        })
    }

    /// Full state of a case
    pub async fn snapshot(&self, case_id: Uuid) -> Result<CaseState> {
        self.core.store.get(case_id).await
    }

    pub async fn case_count(&self) -> usize {
        self.core.store.len().await
    }

    /// Every loaded EHR record, in file order
    pub async fn ehr_records(&self) -> Vec<EhrRecord> {
        self.core.ehr.read().await.records().to_vec()
    }

    pub async fn ehr_record(&self, patient_id: &str) -> Option<EhrRecord> {
        self.core.ehr.read().await.get(patient_id).cloned()
    }

    /// Re-read the configured EHR file and swap it in
    ///
    /// Returns the new record count. On failure the current directory is kept.
    /// Existing case bindings are not re-resolved.
    pub async fn reload_ehr(&self) -> Result<usize> {
        let path = self
            .core
            .config
            .collaborators
            .ehr_json
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("No EHR file configured".to_string()))?;
        let directory = EhrDirectory::try_load(path)?;
        let count = directory.len();
        *self.core.ehr.write().await = directory;
        info!(count, "EHR directory reloaded from {}", path.display());
        Ok(count)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.core.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }
}

async fn enqueue<F>(
    case_id: Uuid,
    worker: &mpsc::UnboundedSender<PipelineJob>,
    job: F,
) -> Result<CompactSummary>
where
    F: FnOnce(Reply) -> PipelineJob,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    worker
        .send(job(reply_tx))
        .map_err(|_| Error::Internal(format!("Pipeline worker for case {} stopped", case_id)))?;

    reply_rx
        .await
        .map_err(|_| Error::Internal(format!("Pipeline worker for case {} dropped the job", case_id)))?
}

async fn run_worker(
    core: Arc<PipelineCore>,
    case_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<PipelineJob>,
) {
    debug!(case_id = %case_id, "Pipeline worker started");
    while let Some(job) = rx.recv().await {
        let (result, reply) = match job {
            PipelineJob::Refresh { reply } => (core.run(case_id).await, reply),
            PipelineJob::Utterance {
                text,
                speaker,
                reply,
            } => {
                let result = match core
                    .store
                    .append_utterance(case_id, &text, speaker.as_deref())
                    .await
                {
                    Ok(_) => core.run(case_id).await,
                    Err(e) => Err(e),
                };
                (result, reply)
            }
        };
        if let Err(e) = &result {
            warn!(case_id = %case_id, "Pipeline run failed: {}", e);
        }
        if reply.send(result).is_err() {
            debug!(case_id = %case_id, "Caller left before the pipeline run finished");
        }
    }
    debug!(case_id = %case_id, "Pipeline worker stopped");
}

impl PipelineCore {
    /// One full pipeline pass over the current case state
    async fn run(&self, case_id: Uuid) -> Result<CompactSummary> {
        self.store.set_status(case_id, CaseStatus::Updating).await?;
        let case = self.store.get(case_id).await?;

        let image = self.normalizer.normalize_image(&case.image_findings);
        let (extraction, text) = if case.utterances.is_empty() {
            (Extraction::default(), Vec::new())
        } else {
            let dialogue = case.utterances.join("\n");
            let extraction = self.extract(case_id, &dialogue).await;
            let text = self.normalizer.normalize_text(&self.scanner.scan(&extraction));
            (extraction, text)
        };

        let ranked = self.fusion.fuse(&image, &text);
        let confidence = confidence_and_margin(&ranked);
        let domains = self.bucketer.bucket(&ranked);
        self.store
            .update_cache(case_id, ranked.clone(), domains)
            .await?;

        let record = match &case.ehr_binding {
            Some(binding) => self.ehr.read().await.get(&binding.patient_id).cloned(),
            None => None,
        };
        let vitals = record.as_ref().and_then(|r| r.vital_signs.as_ref());
        let red_flags = self.red_flags.detect(&ranked, &extraction, vitals);

        let decision = self.gate.decide(confidence);
        let questions = match self.gate.carry_over(decision, &case.last_questions) {
            Some(kept) => kept,
            None => {
                let ehr_summary = record.as_ref().map(EhrRecord::summary).unwrap_or_default();
                let evidence = Evidence {
                    ranked: &ranked,
                    image: &image,
                    text: &text,
                    extraction: &extraction,
                    confidence,
                    ehr_summary,
                };
                self.propose(case_id, evidence).await
            }
        };

        let summary = build_summary(
            &ranked,
            confidence,
            &questions,
            !red_flags.is_empty(),
            &self.config.display,
        );
        self.store
            .update_summary(case_id, summary.clone(), questions, red_flags)
            .await?;

        let status = if case.utterances.is_empty() {
            CaseStatus::AwaitingEvidence
        } else {
            CaseStatus::Idle
        };
        self.store.set_status(case_id, status).await?;

        debug!(
            case_id = %case_id,
            utterances = case.utterances.len(),
            candidates = ranked.len(),
            top_confidence = confidence.top_confidence,
            margin = confidence.margin,
            gate = ?decision,
            "Pipeline run complete"
        );
        self.event_bus.emit_lossy(MedfuseEvent::CaseUpdated {
            case_id,
            utterance_count: case.utterances.len(),
            summary: summary.clone(),
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    async fn classify(&self, image: &[u8]) -> Vec<Finding> {
        let call = self.collaborators.classifier.classify(image);
        match call_with_timeout("classifier", self.collaborators.timeout, call).await {
            Ok(raw) => payload::parse_image_findings(&raw),
            Err(e) => {
                self.degraded(None, "classifier", &e);
                Vec::new()
            }
        }
    }

    async fn extract(&self, case_id: Uuid, dialogue: &str) -> Extraction {
        let call = self.collaborators.extractor.extract(dialogue);
        match call_with_timeout("extractor", self.collaborators.timeout, call).await {
            Ok(raw) => payload::parse_extraction(&raw, dialogue),
            Err(e) => {
                self.degraded(Some(case_id), "extractor", &e);
                let mut extraction = Extraction::neutral(dialogue);
                payload::append_blood_pressure(&mut extraction, dialogue);
                extraction
            }
        }
    }

    async fn retrieve(&self, case_id: Uuid, query: &str) -> String {
        if query.trim().is_empty() {
            return String::new();
        }
        let limits = &self.config.collaborators;
        let call = self.collaborators.retriever.retrieve(query, limits.retrieval_top_k);
        match call_with_timeout("retriever", self.collaborators.timeout, call).await {
            Ok(raw) => payload::parse_context(&raw, limits.max_context_chars),
            Err(e) => {
                self.degraded(Some(case_id), "retriever", &e);
                String::new()
            }
        }
    }

    async fn propose(&self, case_id: Uuid, evidence: Evidence<'_>) -> Vec<ProposedQuestion> {
        let retrieved_context = self
            .retrieve(case_id, &evidence.extraction.retrieval_query)
            .await;
        let max_questions = self.gate.max_questions();
        let context = QuestionContext {
            top_candidates: evidence.ranked.iter().take(CONTEXT_CANDIDATES).cloned().collect(),
            image_findings: evidence.image.to_vec(),
            ehr_summary: evidence.ehr_summary,
            text_findings: evidence.text.to_vec(),
            extraction: evidence.extraction.clone(),
            retrieved_context,
            top_confidence: evidence.confidence.top_confidence,
            margin: evidence.confidence.margin,
            scope_hint: scope_hint(evidence.confidence.top_confidence),
            max_questions,
        };

        let call = self.collaborators.proposer.propose(&context);
        match call_with_timeout("proposer", self.collaborators.question_timeout, call).await {
            Ok(raw) => payload::parse_questions(&raw, max_questions),
            Err(e) => {
                self.degraded(Some(case_id), "proposer", &e);
                Vec::new()
            }
        }
    }

    fn degraded(&self, case_id: Option<Uuid>, collaborator: &str, error: &CollaboratorError) {
        warn!(
            case_id = ?case_id,
            collaborator,
            "Collaborator failed, using neutral result: {}",
            error
        );
        self.event_bus.emit_lossy(MedfuseEvent::CollaboratorDegraded {
            case_id,
            collaborator: collaborator.to_string(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Evidence of one run, borrowed for question proposal
struct Evidence<'a> {
    ranked: &'a [RankedCandidate],
    image: &'a [Finding],
    text: &'a [TextFinding],
    extraction: &'a Extraction,
    confidence: ConfidenceSummary,
    ehr_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use medfuse_common::config::GateMode;

    fn pipeline(config: EngineConfig) -> LivePipeline {
        LivePipeline::new(
            Arc::new(config),
            Collaborators::offline(),
            EhrDirectory::default(),
            EventBus::new(100),
        )
    }

    #[tokio::test]
    async fn test_new_case_awaits_evidence() {
        let pipeline = pipeline(EngineConfig::default());
        let created = pipeline
            .create_case_with_findings(vec![Finding::new("Cardiomegaly", 0.8)], None)
            .await
            .unwrap();
        assert_eq!(created.compact_summary.dx.as_deref(), Some("cardiomegaly"));

        let state = pipeline.snapshot(created.case_id).await.unwrap();
        assert_eq!(state.status, CaseStatus::AwaitingEvidence);
        assert_eq!(state.last_summary, created.compact_summary);
        assert_eq!(state.last_ranked.len(), 1);
        assert_eq!(state.last_domains["cardiac"], vec!["cardiomegaly"]);
        assert!(state.last_domains["pulmonary"].is_empty());
    }

    #[tokio::test]
    async fn test_utterance_moves_case_to_idle() {
        let pipeline = pipeline(EngineConfig::default());
        let created = pipeline.create_case(None, None, None).await.unwrap();
        assert_eq!(created.compact_summary, CompactSummary::empty());

        let summary = pipeline
            .submit_utterance(created.case_id, "fever and chills", Some("patient"))
            .await
            .unwrap();
        assert_eq!(summary.dx.as_deref(), Some("pneumonia_unspecified"));

        let state = pipeline.snapshot(created.case_id).await.unwrap();
        assert_eq!(state.status, CaseStatus::Idle);
        assert_eq!(state.utterances, vec!["patient: fever and chills"]);
    }

    #[tokio::test]
    async fn test_unknown_case_rejected() {
        let pipeline = pipeline(EngineConfig::default());
        let id = Uuid::new_v4();
        assert!(matches!(
            pipeline.submit_utterance(id, "hello", None).await,
            Err(Error::CaseNotFound(missing)) if missing == id
        ));
        assert!(matches!(pipeline.subscribe(id).await, Err(Error::CaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_blank_utterance_checked_after_case_lookup() {
        let pipeline = pipeline(EngineConfig::default());
        assert!(matches!(
            pipeline.submit_utterance(Uuid::new_v4(), "  ", None).await,
            Err(Error::CaseNotFound(_))
        ));

        let created = pipeline.create_case(None, None, None).await.unwrap();
        assert!(matches!(
            pipeline.submit_utterance(created.case_id, "  ", None).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(pipeline.snapshot(created.case_id).await.unwrap().utterances.is_empty());
    }

    #[tokio::test]
    async fn test_reload_without_configured_file_is_rejected() {
        let pipeline = pipeline(EngineConfig::default());
        assert!(matches!(pipeline.reload_ehr().await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_disabled_gate_has_no_question() {
        let mut config = EngineConfig::default();
        config.gate.mode = GateMode::Disabled;
        let pipeline = pipeline(config);
        let created = pipeline.create_case(None, None, None).await.unwrap();
        assert!(created.compact_summary.next_question.is_none());
        let state = pipeline.snapshot(created.case_id).await.unwrap();
        assert!(state.last_questions.is_empty());
    }
}
