//! Live pipeline integration tests
//!
//! Run the full pipeline with offline or scripted collaborators.

use async_trait::async_trait;
use futures::future::join_all;
use medfuse_common::config::GateConfig;
use medfuse_common::events::{EventBus, MedfuseEvent};
use medfuse_common::{EngineConfig, Error};
use medfuse_engine::collaborators::{
    CollaboratorError, CollaboratorResult, Collaborators, Extractor, QuestionContext,
    QuestionProposer,
};
use medfuse_engine::fusion::{logit, sigmoid};
use medfuse_engine::services::{BindingSource, EhrDirectory, EhrRecord, VitalSigns};
use medfuse_engine::session::CaseStatus;
use medfuse_engine::types::Finding;
use medfuse_engine::workflow::LivePipeline;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Records every context it receives and answers with a fixed payload
struct ScriptedProposer {
    payload: String,
    calls: AtomicUsize,
    contexts: Mutex<Vec<QuestionContext>>,
}

impl ScriptedProposer {
    fn new(payload: &str) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.to_string(),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionProposer for ScriptedProposer {
    async fn propose(&self, context: &QuestionContext) -> CollaboratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        Ok(self.payload.clone())
    }
}

struct SlowProposer;

#[async_trait]
impl QuestionProposer for SlowProposer {
    async fn propose(&self, _context: &QuestionContext) -> CollaboratorResult<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(r#"{"questions": [{"q": "Too late?"}]}"#.to_string())
    }
}

struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(&self, _dialogue: &str) -> CollaboratorResult<String> {
        Err(CollaboratorError::Api {
            status: 503,
            body: "model overloaded".to_string(),
        })
    }
}

const QUESTIONS: &str = r#"Here you go:
```json
{"questions": [
  {"q": "Should you take aspirin now?", "priority": "red-flag"},
  {"q": "Is the cough productive?", "priority": "triage", "targets": ["pneumonia_unspecified"]},
  {"q": "Any recent travel?"}
]}
```"#;

fn pipeline_with(config: EngineConfig, collaborators: Collaborators, ehr: EhrDirectory) -> LivePipeline {
    LivePipeline::new(Arc::new(config), collaborators, ehr, EventBus::new(256))
}

fn offline_pipeline() -> LivePipeline {
    pipeline_with(EngineConfig::default(), Collaborators::offline(), EhrDirectory::default())
}

/// Image score for a probability that reaches the given fused score
fn image_score_for(fused: f64) -> f64 {
    sigmoid(logit(fused) / 0.7)
}

#[tokio::test]
async fn test_image_and_text_evidence_rank_together() {
    let pipeline = offline_pipeline();
    let created = pipeline
        .create_case_with_findings(vec![Finding::new("Cardiomegaly", 0.8)], None)
        .await
        .unwrap();
    let before = pipeline.snapshot(created.case_id).await.unwrap().last_ranked;
    assert_eq!(before.len(), 1);
    let expected = sigmoid(0.7 * logit(0.8));
    assert!((before[0].score - expected).abs() < 1e-12);

    pipeline
        .submit_utterance(created.case_id, "history of pneumonia", None)
        .await
        .unwrap();

    let state = pipeline.snapshot(created.case_id).await.unwrap();
    let conditions: Vec<&str> = state.last_ranked.iter().map(|c| c.condition.as_str()).collect();
    assert!(conditions.contains(&"cardiomegaly"));
    assert!(conditions.contains(&"pneumonia_unspecified"));
    let cardiomegaly = state
        .last_ranked
        .iter()
        .find(|c| c.condition == "cardiomegaly")
        .unwrap();
    assert_eq!(cardiomegaly.score, before[0].score);
    assert_eq!(state.last_domains["cardiac"], vec!["cardiomegaly"]);
    assert_eq!(state.last_domains["pulmonary"], vec!["pneumonia_unspecified"]);
    assert_eq!(state.image_findings, vec![Finding::new("Cardiomegaly", 0.8)]);
}

#[tokio::test]
async fn test_subscribe_twice_without_utterances_is_idempotent() {
    let pipeline = offline_pipeline();
    let created = pipeline
        .create_case_with_findings(vec![Finding::new("Edema", 0.7)], None)
        .await
        .unwrap();

    let first = pipeline.subscribe(created.case_id).await.unwrap();
    let second = pipeline.subscribe(created.case_id).await.unwrap();
    assert_eq!(first.initial, second.initial);
    assert_eq!(first.initial, created.compact_summary);
    assert_eq!(first.initial.dx.as_deref(), Some("heart_failure_suspected"));
}

#[tokio::test]
async fn test_subscription_receives_later_summaries_for_its_case_only() {
    let pipeline = offline_pipeline();
    let watched = pipeline.create_case(None, None, None).await.unwrap();
    let other = pipeline.create_case(None, None, None).await.unwrap();

    let mut subscription = pipeline.subscribe(watched.case_id).await.unwrap();
    pipeline
        .submit_utterance(other.case_id, "heartburn", None)
        .await
        .unwrap();
    let returned = pipeline
        .submit_utterance(watched.case_id, "wheezing at night", None)
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, returned);
    assert_eq!(received.dx.as_deref(), Some("asthma_exacerbation"));
}

#[tokio::test]
async fn test_lagged_subscription_resends_cached_summary() {
    let pipeline = LivePipeline::new(
        Arc::new(EngineConfig::default()),
        Collaborators::offline(),
        EhrDirectory::default(),
        EventBus::new(4),
    );
    let watched = pipeline.create_case(None, None, None).await.unwrap();
    let busy = pipeline.create_case(None, None, None).await.unwrap();

    let mut subscription = pipeline.subscribe(watched.case_id).await.unwrap();
    pipeline
        .submit_utterance(watched.case_id, "wheezing at night", None)
        .await
        .unwrap();
    // Flood the shared bus past its capacity with another case's updates
    for i in 0..6 {
        pipeline
            .submit_utterance(busy.case_id, &format!("heartburn {}", i), None)
            .await
            .unwrap();
    }

    let received = tokio::time::timeout(Duration::from_millis(300), subscription.next())
        .await
        .expect("subscription stalled after lagging")
        .unwrap();
    assert_eq!(received.dx.as_deref(), Some("asthma_exacerbation"));
}

#[tokio::test]
async fn test_concurrent_utterances_kept_in_submission_order() {
    let pipeline = offline_pipeline();
    let created = pipeline.create_case(None, None, None).await.unwrap();
    let texts: Vec<String> = (0..10).map(|i| format!("utterance {}", i)).collect();

    let results = join_all(
        texts
            .iter()
            .map(|text| pipeline.submit_utterance(created.case_id, text, None)),
    )
    .await;
    assert!(results.iter().all(Result::is_ok));

    let state = pipeline.snapshot(created.case_id).await.unwrap();
    assert_eq!(state.utterances, texts);
    assert_eq!(state.status, CaseStatus::Idle);
}

#[tokio::test]
async fn test_unknown_case_is_not_found() {
    let pipeline = offline_pipeline();
    let missing = Uuid::new_v4();
    assert!(matches!(
        pipeline.submit_utterance(missing, "hello", None).await,
        Err(Error::CaseNotFound(id)) if id == missing
    ));
    assert!(matches!(pipeline.snapshot(missing).await, Err(Error::CaseNotFound(_))));
}

#[tokio::test]
async fn test_low_confidence_asks_and_applies_guardrails() {
    let proposer = ScriptedProposer::new(QUESTIONS);
    let mut collaborators = Collaborators::offline();
    collaborators.proposer = proposer.clone();
    let pipeline = pipeline_with(EngineConfig::default(), collaborators, EhrDirectory::default());

    let created = pipeline.create_case(None, None, None).await.unwrap();
    assert_eq!(proposer.calls(), 1);
    assert_eq!(
        created.compact_summary.next_question.as_deref(),
        Some("Is the cough productive?")
    );

    let state = pipeline.snapshot(created.case_id).await.unwrap();
    assert_eq!(state.last_questions.len(), 2);
    assert_eq!(state.last_questions[0].targets, vec!["pneumonia_unspecified"]);

    let contexts = proposer.contexts.lock().unwrap();
    assert_eq!(contexts[0].max_questions, 4);
    assert!(contexts[0].top_candidates.is_empty());
}

#[tokio::test]
async fn test_confident_ranking_holds_previous_questions() {
    let proposer = ScriptedProposer::new(QUESTIONS);
    let mut collaborators = Collaborators::offline();
    collaborators.proposer = proposer.clone();
    let pipeline = pipeline_with(EngineConfig::default(), collaborators, EhrDirectory::default());

    // fused score ~0.85: above ask_threshold, wide margin, not near-certain
    let created = pipeline
        .create_case_with_findings(vec![Finding::new("Cardiomegaly", image_score_for(0.85))], None)
        .await
        .unwrap();
    assert_eq!(proposer.calls(), 0);
    assert!(created.compact_summary.next_question.is_none());
    assert_eq!(created.compact_summary.conf, 0.85);
}

#[tokio::test]
async fn test_near_certain_ranking_keeps_only_first_question() {
    let proposer = ScriptedProposer::new(QUESTIONS);
    let mut collaborators = Collaborators::offline();
    collaborators.proposer = proposer.clone();
    let mut config = EngineConfig::default();
    config.gate = GateConfig {
        near_certain_confidence: 0.6,
        ..GateConfig::default()
    };
    let pipeline = pipeline_with(config, collaborators, EhrDirectory::default());

    let created = pipeline.create_case(None, None, None).await.unwrap();
    assert_eq!(proposer.calls(), 1);
    assert_eq!(pipeline.snapshot(created.case_id).await.unwrap().last_questions.len(), 2);

    // one text-only candidate scores sigmoid(0.5) ≈ 0.62 with an equal margin
    let summary = pipeline
        .submit_utterance(created.case_id, "wheezing", None)
        .await
        .unwrap();
    assert_eq!(proposer.calls(), 1);
    assert_eq!(summary.next_question.as_deref(), Some("Is the cough productive?"));
    let state = pipeline.snapshot(created.case_id).await.unwrap();
    assert_eq!(state.last_questions.len(), 1);
}

#[tokio::test]
async fn test_proposer_timeout_degrades_to_no_questions() {
    let mut collaborators = Collaborators::offline();
    collaborators.proposer = Arc::new(SlowProposer);
    collaborators.question_timeout = Duration::from_millis(20);
    let pipeline = pipeline_with(EngineConfig::default(), collaborators, EhrDirectory::default());
    let mut events = pipeline.event_bus().subscribe();

    let created = pipeline.create_case(None, None, None).await.unwrap();
    assert!(created.compact_summary.next_question.is_none());

    let mut degraded = None;
    while let Ok(event) = events.try_recv() {
        if let MedfuseEvent::CollaboratorDegraded { collaborator, .. } = event {
            degraded = Some(collaborator);
        }
    }
    assert_eq!(degraded.as_deref(), Some("proposer"));
}

#[tokio::test]
async fn test_extractor_failure_keeps_blood_pressure_evidence() {
    let mut collaborators = Collaborators::offline();
    collaborators.extractor = Arc::new(FailingExtractor);
    let pipeline = pipeline_with(EngineConfig::default(), collaborators, EhrDirectory::default());

    let created = pipeline.create_case(None, None, None).await.unwrap();
    let summary = pipeline
        .submit_utterance(created.case_id, "my bp was 190/120 this morning", Some("patient"))
        .await
        .unwrap();
    assert_eq!(summary.dx.as_deref(), Some("hypertension_uncontrolled"));
}

#[tokio::test]
async fn test_red_flags_from_symptoms_and_bound_vitals() {
    let ehr = EhrDirectory::new(vec![EhrRecord {
        patient_id: "P042".to_string(),
        vital_signs: Some(VitalSigns {
            spo2_pct: Some(86.0),
            ..VitalSigns::default()
        }),
        ..EhrRecord::default()
    }]);
    let pipeline = pipeline_with(EngineConfig::default(), Collaborators::offline(), ehr);

    let bound = pipeline.create_case(None, None, Some("P042")).await.unwrap();
    assert_eq!(bound.ehr_binding.as_ref().map(|b| b.source), Some(BindingSource::PatientHint));
    assert!(bound.compact_summary.alerts.red_flag);

    let unbound = pipeline.create_case(None, None, None).await.unwrap();
    assert!(!unbound.compact_summary.alerts.red_flag);
    let summary = pipeline
        .submit_utterance(unbound.case_id, "crushing chest pain", None)
        .await
        .unwrap();
    assert!(summary.alerts.red_flag);
    assert_eq!(summary.dx.as_deref(), Some("acute_coronary_syndrome_suspected"));
}
