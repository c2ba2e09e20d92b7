//! End-to-end tests of the pipeline controller and batch runner against a
//! mock provider that answers per stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sentinel_core::{
    CandidateProfile, Exclusion, JobLevel, Posting, PostingOutcome, RetryStatus, Screening, Stage,
};
use sentinel_runtime::prompts::{AUDIT_SYSTEM, CLASSIFICATION_SYSTEM, EXTRACTION_SYSTEM};
use sentinel_runtime::{
    BatchConfig, BatchRunner, ChatMessage, CompletionConfig, CompletionResponse, FeedbackSnapshot,
    FeedbackStore, InferenceClient, LlmProvider, MemoryFeedbackStore, PipelineController,
    PipelineState, ProviderError, RetryPolicy, RuntimeConfig, TokenUsage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Extraction,
    Classification,
    Audit,
}

type Reply = Box<dyn Fn(usize) -> Result<String, ProviderError> + Send + Sync>;

/// Answers each stage with its own reply function, called with the number
/// of earlier calls to that stage.
struct StageProvider {
    extraction: Reply,
    classification: Reply,
    audit: Reply,
    calls: Mutex<Vec<(Route, Vec<ChatMessage>)>>,
}

impl StageProvider {
    fn new(extraction: Reply, classification: Reply, audit: Reply) -> Arc<Self> {
        Arc::new(Self {
            extraction,
            classification,
            audit,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn count(&self, route: Route) -> usize {
        self.calls.lock().iter().filter(|(r, _)| *r == route).count()
    }

    fn prompts(&self, route: Route) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, messages)| messages[1].content.clone())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for StageProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let route = match messages[0].content.as_str() {
            s if s == EXTRACTION_SYSTEM => Route::Extraction,
            s if s == CLASSIFICATION_SYSTEM => Route::Classification,
            s if s == AUDIT_SYSTEM => Route::Audit,
            other => panic!("unexpected system prompt: {}", other),
        };
        let index = self.count(route);
        self.calls.lock().push((route, messages));

        let reply = match route {
            Route::Extraction => (self.extraction)(index),
            Route::Classification => (self.classification)(index),
            Route::Audit => (self.audit)(index),
        }?;

        Ok(CompletionResponse {
            content: reply,
            usage: TokenUsage::default(),
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "stage-mock"
    }
}

fn always(text: String) -> Reply {
    Box::new(move |_: usize| Ok(text.clone()))
}

fn summary_json(seniority: &str, years: Option<u32>, visa: &[&str], coop: bool) -> String {
    serde_json::json!({
        "title_normalized": "Software Engineer",
        "role_type": "software_engineering",
        "seniority_level": seniority,
        "years_experience_required": years,
        "education_required": "bachelors",
        "visa_statements": visa,
        "is_internship_coop": coop,
        "key_requirements": ["Rust", "SQL"],
        "description_summary": "Builds backend services."
    })
    .to_string()
}

fn vote_json(keyword: bool, visa: bool, level: &str, intern: bool) -> String {
    serde_json::json!({
        "keyword_match": keyword,
        "visa_sponsorship": visa,
        "job_level": level,
        "requires_phd": false,
        "is_internship": intern,
        "reason": format!("model thinks {}", level)
    })
    .to_string()
}

fn approve() -> Reply {
    always(r#"{"approved": true, "confidence": 90, "feedback": ""}"#.to_string())
}

fn reject(feedback: &'static str) -> Reply {
    Box::new(move |_: usize| {
        Ok(serde_json::json!({"approved": false, "feedback": feedback, "gaps": ["job_level"]})
            .to_string())
    })
}

fn config(max_retries: u32, audit_enabled: bool) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.pipeline.max_retries = max_retries;
    config.pipeline.audit_enabled = audit_enabled;
    config
}

fn controller(provider: Arc<StageProvider>, config: RuntimeConfig) -> PipelineController {
    let client = InferenceClient::new(provider).with_retry(RetryPolicy::none());
    PipelineController::builder()
        .config(config)
        .client(client)
        .build()
        .unwrap()
}

fn posting(title: &str) -> Posting {
    Posting::new(
        title,
        "Acme",
        "We are looking for an engineer to build reliable backend services at scale.",
    )
}

fn roles() -> Vec<String> {
    vec!["software engineer".to_string()]
}

#[tokio::test]
async fn test_senior_posting_without_sponsorship() {
    let provider = StageProvider::new(
        always(summary_json(
            "senior",
            Some(5),
            &["Must be a US citizen or permanent resident"],
            false,
        )),
        // The models get level and visa wrong; the rules correct both
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(posting("Senior Software Engineer"), &roles(), &Default::default())
        .await;

    let evaluation = report.outcome.evaluation().expect("evaluated");
    assert!(evaluation.keyword_match);
    assert!(!evaluation.visa_sponsorship);
    assert_eq!(evaluation.job_level, JobLevel::Senior);
    assert!(!evaluation.is_internship);
    assert_eq!(evaluation.votes, 3);
    assert_eq!(report.counters.extractions, 1);
    assert_eq!(report.counters.classifications, 1);
    assert_eq!(report.counters.audits, 1);

    let profile = CandidateProfile::new(roles()).with_sponsorship(true);
    assert_eq!(
        report.screen(&profile),
        Screening::Excluded(Exclusion::NoSponsorship)
    );
}

#[tokio::test]
async fn test_coop_internship() {
    let provider = StageProvider::new(
        always(summary_json("intern", None, &[], true)),
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let controller = controller(provider, config(1, true));

    let report = controller
        .run(posting("Software Engineering Co-op"), &roles(), &Default::default())
        .await;

    let evaluation = report.outcome.evaluation().expect("evaluated");
    assert_eq!(evaluation.job_level, JobLevel::Internship);
    assert!(evaluation.is_internship);
    assert!(evaluation.visa_sponsorship);
    assert!(evaluation.is_entry_level());

    let entry_only = CandidateProfile::new(roles());
    assert_eq!(report.screen(&entry_only), Screening::Excluded(Exclusion::Level));

    let interns = CandidateProfile::new(roles()).with_levels([JobLevel::Internship]);
    assert_eq!(report.screen(&interns), Screening::Accepted);
}

#[tokio::test]
async fn test_retry_loop_is_bounded() {
    for max_retries in 0..=3u32 {
        let provider = StageProvider::new(
            always(summary_json("unknown", None, &[], false)),
            always(vote_json(true, true, "junior", false)),
            reject("job_level should be entry"),
        );
        let controller = controller(provider.clone(), config(max_retries, true));

        let report = controller
            .run(posting("Software Engineer"), &roles(), &Default::default())
            .await;

        let expected = max_retries as usize + 1;
        assert_eq!(report.retries, max_retries);
        assert_eq!(report.counters.classifications as usize, expected);
        assert_eq!(report.counters.audits as usize, expected);
        assert_eq!(provider.count(Route::Classification), expected * 3);
        // Extraction runs once however many times classification repeats
        assert_eq!(provider.count(Route::Extraction), 1);
        assert_eq!(report.rejection(), Some("job_level should be entry"));
        assert!(matches!(report.outcome, PostingOutcome::Evaluated { .. }));
    }
}

#[tokio::test]
async fn test_rerun_reuses_existing_summary() {
    let provider = StageProvider::new(
        always(summary_json("entry", Some(0), &[], false)),
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let controller = controller(provider.clone(), config(0, true));

    let mut state = PipelineState::new(
        posting("Software Engineer"),
        roles(),
        FeedbackSnapshot::default(),
        RetryStatus::new(0, true),
    );
    controller.drive(&mut state).await.unwrap();
    assert_eq!(state.stage, Stage::End);
    let first = state.summary.clone().expect("summary");

    state.stage = Stage::Start;
    controller.drive(&mut state).await.unwrap();

    assert_eq!(state.stage, Stage::End);
    assert_eq!(provider.count(Route::Extraction), 1);
    assert_eq!(provider.count(Route::Classification), 6);
    assert_eq!(state.summary, Some(first));
}

#[tokio::test]
async fn test_audit_feedback_reaches_next_round_only() {
    let provider = StageProvider::new(
        always(summary_json("unknown", None, &[], false)),
        always(vote_json(true, true, "junior", false)),
        Box::new(|call: usize| {
            if call == 0 {
                Ok(r#"{"approved": false, "feedback": "keyword_match looks wrong"}"#.to_string())
            } else {
                Ok(r#"{"approved": true, "feedback": ""}"#.to_string())
            }
        }),
    );
    let controller = controller(provider.clone(), config(2, true));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    assert_eq!(report.retries, 1);
    assert_eq!(report.rejection(), None);
    let prompts = provider.prompts(Route::Classification);
    assert_eq!(prompts.len(), 6);
    assert!(prompts[..3].iter().all(|p| !p.contains("REVIEWER CORRECTION")));
    assert!(prompts[3..]
        .iter()
        .all(|p| p.contains("keyword_match looks wrong")));
}

#[tokio::test]
async fn test_audit_disabled_skips_review() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        always(vote_json(true, true, "entry", false)),
        reject("never asked"),
    );
    let controller = controller(provider.clone(), config(1, false));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    assert!(report.outcome.evaluation().is_some());
    assert!(report.verdict.is_none());
    assert_eq!(provider.count(Route::Audit), 0);
}

#[tokio::test]
async fn test_short_description_is_skipped() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(
            Posting::new("Software Engineer", "Acme", "See website."),
            &roles(),
            &Default::default(),
        )
        .await;

    assert_eq!(
        report.outcome,
        PostingOutcome::Skipped {
            reason: "Description too short (12 chars)".to_string()
        }
    );
    assert!(provider.calls.lock().is_empty());
    assert_eq!(
        report.screen(&CandidateProfile::default()),
        Screening::Excluded(Exclusion::Skipped)
    );
}

#[tokio::test]
async fn test_extraction_failure_ends_pipeline() {
    let provider = StageProvider::new(
        Box::new(|_: usize| Err(ProviderError::AuthError)),
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    assert!(report.outcome.is_failed());
    assert_eq!(provider.count(Route::Classification), 0);
}

#[tokio::test]
async fn test_all_members_failing_is_a_failure() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        Box::new(|_: usize| Ok("I cannot answer that.".to_string())),
        approve(),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    match &report.outcome {
        PostingOutcome::Failed { error } => assert!(error.contains("ensemble members failed")),
        other => panic!("expected failure, got {:?}", other),
    }
    // Structured attempt plus text fallback per member
    assert_eq!(provider.count(Route::Classification), 6);
    assert_eq!(provider.count(Route::Audit), 0);
}

#[tokio::test]
async fn test_rate_limit_gives_conservative_evaluation() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        Box::new(|_: usize| Err(ProviderError::RateLimited { retry_after: None })),
        approve(),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    let evaluation = report.outcome.evaluation().expect("conservative evaluation");
    assert!(evaluation.rate_limited);
    assert!(!evaluation.keyword_match);
    assert!(evaluation.requires_phd);
    assert_eq!(provider.count(Route::Audit), 0);
    assert_eq!(
        report.screen(&CandidateProfile::new(roles())),
        Screening::Excluded(Exclusion::Errored)
    );
}

#[tokio::test]
async fn test_audit_failure_auto_approves() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        always(vote_json(true, true, "entry", false)),
        Box::new(|_: usize| {
            Err(ProviderError::ApiError {
                status: 400,
                message: "bad request".to_string(),
            })
        }),
    );
    let controller = controller(provider.clone(), config(1, true));

    let report = controller
        .run(posting("Software Engineer"), &roles(), &Default::default())
        .await;

    let verdict = report.verdict.as_ref().expect("verdict recorded");
    assert!(verdict.approved);
    assert_eq!(report.counters.classifications, 1);
    assert_eq!(
        report.screen(&CandidateProfile::new(roles())),
        Screening::Accepted
    );
}

#[tokio::test(start_paused = true)]
async fn test_batches_cool_down_and_save_rejections() {
    let provider = StageProvider::new(
        always(summary_json("unknown", None, &[], false)),
        always(vote_json(true, true, "junior", false)),
        reject("junior needs 1+ years stated"),
    );
    let controller = Arc::new(controller(provider.clone(), config(0, true)));
    let store = Arc::new(MemoryFeedbackStore::with_entries(["an older correction"]));
    let runner = BatchRunner::new(
        controller,
        BatchConfig {
            size: 2,
            cooldown: Duration::from_secs(60),
        },
        store.clone(),
        20,
    );

    let postings = vec![
        posting("Software Engineer"),
        posting("Backend Engineer"),
        posting("Platform Engineer"),
    ];
    let start = tokio::time::Instant::now();
    let reports = runner.run(postings, &roles()).await;
    let elapsed = start.elapsed();

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[2].posting.title, "Platform Engineer");
    // One cooldown between two batches, none after the last
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_secs(120));

    // Every prompt saw the snapshot, none saw this run's rejections
    let prompts = provider.prompts(Route::Classification);
    assert_eq!(prompts.len(), 9);
    assert!(prompts.iter().all(|p| p.contains("- an older correction")));
    assert!(prompts.iter().all(|p| !p.contains("- junior needs")));

    let saved = store.load(20).await.unwrap();
    assert_eq!(saved.len(), 4);
    assert_eq!(saved[1], "junior needs 1+ years stated");
    assert_eq!(store.records()[3].job_title, "Platform Engineer");
}

#[tokio::test]
async fn test_empty_batch_run() {
    let provider = StageProvider::new(
        always(summary_json("entry", None, &[], false)),
        always(vote_json(true, true, "entry", false)),
        approve(),
    );
    let runner = BatchRunner::new(
        Arc::new(controller(provider.clone(), config(1, true))),
        BatchConfig::default(),
        Arc::new(MemoryFeedbackStore::new()),
        20,
    );

    assert!(runner.run(Vec::new(), &roles()).await.is_empty());
    assert!(provider.calls.lock().is_empty());
}
