//! Integration tests for reply drafting and waiting-zone selection.
//!
//! Each test wires a `TriageService` over the in-memory store with stub LLM
//! providers (no real API calls) and drives it through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use tenant_triage::config::{Rulebook, RunnerConfig, ZoneConfig};
use tenant_triage::error::{LlmError, SelectionError};
use tenant_triage::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};
use tenant_triage::notify::{RecordingNotifier, TEMPLATE_REPLY_SENT};
use tenant_triage::pipeline::processor::TriageService;
use tenant_triage::pipeline::types::InboundMessage;
use tenant_triage::replies::{
    EntryStatus, InMemoryKnowledge, KnowledgeStore, StrategyKind, StrategyRunner, ZoneEvent,
    ZoneHooks,
};
use tenant_triage::store::{MemoryStore, MessageStatus, MessageStore, ReplyLog};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers immediately with a fixed text.
struct StubLlm {
    name: &'static str,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        self.name
    }
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: format!("stub reply from {}", self.name),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Always errors.
struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "failing".to_string(),
            reason: "stub outage".to_string(),
        })
    }
}

/// Answers only after `delay`, recording whether it ever got that far.
struct SlowLlm {
    delay: Duration,
    finished: AtomicBool,
}

#[async_trait]
impl LlmProvider for SlowLlm {
    fn model_name(&self) -> &str {
        "slow"
    }
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: "too late".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

struct Harness {
    service: TriageService,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(providers: Vec<Arc<dyn LlmProvider>>, model_timeout: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let runner = StrategyRunner::new(RunnerConfig {
        model_timeout,
        ..RunnerConfig::default()
    });
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledge::property_defaults());
    let strategies = runner.strategies_for(&providers, Some(knowledge));
    let hooks = ZoneHooks {
        store: store.clone(),
        replies: store.clone(),
        messages: store.clone(),
        notifier: notifier.clone(),
    };
    let service = TriageService::new(
        Arc::new(Rulebook::default()),
        store.clone(),
        hooks,
        runner,
        strategies,
        ZoneConfig::default(),
    );
    Harness {
        service,
        store,
        notifier,
    }
}

fn rent_message() -> InboundMessage {
    InboundMessage::new(
        "Jane Doe <jane@example.com>",
        Some("Rent question".to_string()),
        "When is rent due and what are the late fees?",
    )
}

#[tokio::test]
async fn all_backends_failing_leaves_exactly_the_template() {
    let slow = Arc::new(SlowLlm {
        delay: Duration::from_secs(2),
        finished: AtomicBool::new(false),
    });
    let h = harness(vec![Arc::new(FailingLlm), slow], Duration::from_millis(100));

    let candidates = timeout(TEST_TIMEOUT, h.service.generate_replies(&rent_message(), "Jane Doe"))
        .await
        .expect("generate_replies hung");

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].kind, StrategyKind::Template);
    assert!(candidates[0].content.starts_with("Dear Jane Doe,"));
    assert!(candidates[0].content.contains("Rent is due on the 1st"));
}

#[tokio::test]
async fn candidates_come_back_in_presentation_order() {
    let h = harness(
        vec![
            Arc::new(StubLlm { name: "gpt-4o" }),
            Arc::new(StubLlm { name: "llama3" }),
        ],
        Duration::from_secs(1),
    );

    let candidates = timeout(TEST_TIMEOUT, h.service.generate_replies(&rent_message(), "Jane Doe"))
        .await
        .expect("generate_replies hung");

    let strategies: Vec<_> = candidates.iter().map(|c| c.strategy.as_str()).collect();
    assert_eq!(
        strategies,
        vec!["retrieval", "model:gpt-4o", "model:llama3", "template"]
    );
    let confidences: Vec<_> = candidates.iter().map(|c| c.confidence).collect();
    assert_eq!(confidences, vec![0.85, 0.8, 0.7, 0.75]);
    let indexes: Vec<_> = candidates.iter().map(|c| c.option_index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn timed_out_strategy_never_lands() {
    let slow = Arc::new(SlowLlm {
        delay: Duration::from_millis(300),
        finished: AtomicBool::new(false),
    });
    let h = harness(vec![slow.clone()], Duration::from_millis(50));

    let candidates = h.service.generate_replies(&rent_message(), "Jane").await;
    assert!(candidates.iter().all(|c| c.content != "too late"));

    // Long after the deadline the dropped call still has not completed.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!slow.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn staging_nothing_is_rejected() {
    let h = harness(vec![], Duration::from_secs(1));
    let err = h.service.stage_for_selection("m-1", vec![]).await.unwrap_err();
    assert!(matches!(err, SelectionError::EmptyCandidateSet { .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn second_commit_on_same_entry_fails() {
    let h = harness(vec![Arc::new(StubLlm { name: "gpt-4o" })], Duration::from_secs(1));
    let message = rent_message();
    let candidates = h.service.generate_replies(&message, "Jane").await;
    let first = candidates[0].id;
    let second = candidates[1].id;
    let entry_id = h
        .service
        .stage_for_selection(&message.id, candidates)
        .await
        .unwrap();

    h.service
        .commit_selection(entry_id, first, Some(5), None)
        .await
        .unwrap();
    let err = h
        .service
        .commit_selection(entry_id, second, None, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let entry = h.service.zone().get(entry_id).await.unwrap();
    assert_eq!(entry.status, EntryStatus::Selected);
    assert_eq!(entry.selected_candidate_id, Some(first));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_have_one_winner() {
    const CALLERS: usize = 16;

    let h = Arc::new(harness(
        vec![
            Arc::new(StubLlm { name: "gpt-4o" }),
            Arc::new(StubLlm { name: "llama3" }),
        ],
        Duration::from_secs(1),
    ));
    let message = rent_message();
    let candidates = h.service.generate_replies(&message, "Jane").await;
    let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
    let entry_id = h
        .service
        .stage_for_selection(&message.id, candidates)
        .await
        .unwrap();

    let wins = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(CALLERS);
    for i in 0..CALLERS {
        let h = Arc::clone(&h);
        let wins = Arc::clone(&wins);
        let pick = ids[i % ids.len()];
        handles.push(tokio::spawn(async move {
            match h.service.commit_selection(entry_id, pick, None, None).await {
                Ok(reply) => {
                    wins.fetch_add(1, Ordering::SeqCst);
                    Some(reply.candidate_id)
                }
                Err(e) => {
                    assert!(e.is_not_found(), "unexpected error: {e}");
                    None
                }
            }
        }));
    }

    let mut winner = None;
    for handle in handles {
        if let Some(id) = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap() {
            winner = Some(id);
        }
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    let entry = h.service.zone().get(entry_id).await.unwrap();
    assert_eq!(entry.status, EntryStatus::Selected);
    assert_eq!(entry.selected_candidate_id, winner);
    assert_eq!(h.store.for_message(&message.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ingest_draft_and_commit_end_to_end() {
    let h = harness(vec![Arc::new(StubLlm { name: "claude-sonnet-4" })], Duration::from_secs(1));
    let mut events = h.service.zone().subscribe();

    let message = InboundMessage::new(
        "Jane Doe <jane@example.com>",
        Some("Broken heater".to_string()),
        "The heater in apt 3B is broken and it is freezing.",
    );
    let message_id = message.id.clone();

    let outcome = h.service.ingest(message).await.unwrap();
    assert_eq!(outcome.ticket.assignment_group, "Property Maintenance");
    assert_eq!(outcome.ticket.assigned_to, "hvac@property.com");
    assert_eq!(outcome.ticket.property_id, "P3B0");

    let drafted = timeout(TEST_TIMEOUT, h.service.draft_replies(&message_id))
        .await
        .expect("draft_replies hung")
        .unwrap();
    assert_eq!(drafted.candidates.last().unwrap().kind, StrategyKind::Template);
    assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Staged { .. }));

    let template = drafted.candidates.last().unwrap();
    let reply = h
        .service
        .commit_selection(
            drafted.entry_id,
            template.id,
            Some(4),
            Some("We will send a technician today.".to_string()),
        )
        .await
        .unwrap();
    assert!(reply.modified);
    assert_eq!(reply.original_content.as_deref(), Some(template.content.as_str()));
    assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Selected { .. }));

    assert_eq!(
        h.store.status(&message_id).await.unwrap(),
        Some(MessageStatus::Responded)
    );
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, TEMPLATE_REPLY_SENT);
    assert_eq!(sent[0].subject, "Re: Broken heater");
    assert_eq!(sent[0].body, "We will send a technician today.");
}
