//! Strategy runner: fans out to reply strategies, fans in whatever succeeds.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::error::StrategyError;
use crate::llm::provider::LlmProvider;
use crate::pipeline::types::InboundMessage;
use crate::replies::knowledge::KnowledgeStore;
use crate::replies::model::{ReplyCandidate, StrategyKind};
use crate::replies::strategy::{
    ModelStrategy, ReplyStrategy, RetrievalStrategy, Sampling, StrategyOutput, TemplateStrategy,
};

/// One dispatched strategy's outcome, tagged with its presentation slot.
struct Drafted {
    slot: usize,
    name: String,
    kind: StrategyKind,
    provider: String,
    output: StrategyOutput,
}

/// Runs reply strategies concurrently, each isolated behind its own timeout.
pub struct StrategyRunner {
    template: TemplateStrategy,
    config: RunnerConfig,
}

impl StrategyRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            template: TemplateStrategy::new(),
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Build the strategy list for the configured backends: one retrieval
    /// strategy (if knowledge and a model exist) plus one model strategy per
    /// provider, up to the configured maximum.
    pub fn strategies_for(
        &self,
        providers: &[Arc<dyn LlmProvider>],
        knowledge: Option<Arc<dyn KnowledgeStore>>,
    ) -> Vec<Arc<dyn ReplyStrategy>> {
        let sampling = Sampling {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let mut strategies: Vec<Arc<dyn ReplyStrategy>> = Vec::new();
        if let (Some(knowledge), Some(first)) = (knowledge, providers.first()) {
            if knowledge.is_available() {
                strategies.push(Arc::new(RetrievalStrategy::new(
                    knowledge,
                    first.clone(),
                    self.config.retrieval_top_k,
                    sampling,
                )));
            }
        }
        for provider in providers.iter().take(self.config.max_model_strategies) {
            strategies.push(Arc::new(ModelStrategy::new(provider.clone(), sampling)));
        }
        strategies
    }

    /// Draft replies for a message.
    ///
    /// Never fails: strategy errors and timeouts are logged and dropped, and
    /// the template candidate is always last. Order is retrieval, then model
    /// strategies in the order given, then template.
    pub async fn run(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
        strategies: &[Arc<dyn ReplyStrategy>],
    ) -> Vec<ReplyCandidate> {
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        let retrieval = strategies
            .iter()
            .filter(|s| s.kind() == StrategyKind::Retrieval && s.is_available())
            .take(1);
        let models = strategies
            .iter()
            .filter(|s| s.kind() == StrategyKind::Model)
            .take(self.config.max_model_strategies);

        for (slot, strategy) in retrieval.chain(models).enumerate() {
            let strategy = strategy.clone();
            let message = message.clone();
            let tenant_name = tenant_name.to_string();
            let timeout = self.config.model_timeout;
            dispatched += 1;

            tasks.spawn(async move {
                let name = strategy.name();
                let outcome =
                    match tokio::time::timeout(timeout, strategy.generate(&message, &tenant_name))
                        .await
                    {
                        Ok(result) => result,
                        // The in-flight future is dropped here; a late answer never lands.
                        Err(_) => Err(StrategyError::Timeout {
                            strategy: name.clone(),
                            timeout,
                        }),
                    };
                outcome.map(|output| Drafted {
                    slot,
                    name,
                    kind: strategy.kind(),
                    provider: strategy.provider(),
                    output,
                })
            });
        }

        let mut drafted = Vec::with_capacity(dispatched);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(d)) => {
                    info!(
                        message_id = %message.id,
                        strategy = %d.name,
                        confidence = d.output.confidence,
                        "Strategy produced a reply"
                    );
                    drafted.push(d);
                }
                Ok(Err(e)) => {
                    warn!(message_id = %message.id, error = %e, "Strategy failed, skipping");
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Strategy task aborted, skipping");
                }
            }
        }
        drafted.sort_by_key(|d| d.slot);

        let mut candidates: Vec<ReplyCandidate> = drafted
            .into_iter()
            .map(|d| {
                ReplyCandidate::new(
                    message.id.clone(),
                    d.name,
                    d.kind,
                    d.provider,
                    d.output.content,
                    d.output.confidence,
                )
            })
            .collect();

        let fallback = self.template.draft(message, tenant_name);
        candidates.push(ReplyCandidate::new(
            message.id.clone(),
            self.template.name(),
            StrategyKind::Template,
            self.template.provider(),
            fallback.content,
            fallback.confidence,
        ));

        let candidates: Vec<ReplyCandidate> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_option_index(i + 1))
            .collect();

        info!(
            message_id = %message.id,
            dispatched,
            candidates = candidates.len(),
            "Reply drafting finished"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        kind: StrategyKind,
        delay: Duration,
        fail: bool,
    }

    impl Fixed {
        fn ok(name: &'static str, kind: StrategyKind) -> Arc<dyn ReplyStrategy> {
            Arc::new(Self {
                name,
                kind,
                delay: Duration::ZERO,
                fail: false,
            })
        }

        fn failing(name: &'static str, kind: StrategyKind) -> Arc<dyn ReplyStrategy> {
            Arc::new(Self {
                name,
                kind,
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn slow(name: &'static str, kind: StrategyKind, delay: Duration) -> Arc<dyn ReplyStrategy> {
            Arc::new(Self {
                name,
                kind,
                delay,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl ReplyStrategy for Fixed {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn provider(&self) -> String {
            format!("stub-{}", self.name)
        }

        async fn generate(
            &self,
            _message: &InboundMessage,
            _tenant_name: &str,
        ) -> Result<StrategyOutput, StrategyError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(StrategyError::Failed {
                    strategy: self.name.to_string(),
                    reason: "stub failure".to_string(),
                });
            }
            Ok(StrategyOutput {
                content: format!("reply from {}", self.name),
                confidence: 0.5,
            })
        }
    }

    fn runner(max_models: usize, timeout: Duration) -> StrategyRunner {
        StrategyRunner::new(RunnerConfig {
            max_model_strategies: max_models,
            model_timeout: timeout,
            ..RunnerConfig::default()
        })
    }

    fn message() -> InboundMessage {
        InboundMessage::new("jane@example.com", Some("Leak".into()), "Kitchen sink leak")
    }

    #[tokio::test]
    async fn template_only_when_no_strategies() {
        let out = runner(2, Duration::from_secs(1)).run(&message(), "Jane", &[]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, StrategyKind::Template);
        assert_eq!(out[0].option_index, 1);
    }

    #[tokio::test]
    async fn presentation_order_is_fixed() {
        // Model "a" finishes after "b" but must still come first.
        let strategies = vec![
            Fixed::slow("a", StrategyKind::Model, Duration::from_millis(50)),
            Fixed::ok("b", StrategyKind::Model),
            Fixed::ok("rag", StrategyKind::Retrieval),
        ];
        let out = runner(2, Duration::from_secs(1))
            .run(&message(), "Jane", &strategies)
            .await;
        let names: Vec<_> = out.iter().map(|c| c.strategy.as_str()).collect();
        assert_eq!(names, vec!["rag", "a", "b", "template"]);
        let indexes: Vec<_> = out.iter().map(|c| c.option_index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_dropped() {
        let strategies = vec![
            Fixed::failing("bad", StrategyKind::Model),
            Fixed::slow("late", StrategyKind::Model, Duration::from_secs(5)),
            Fixed::failing("rag", StrategyKind::Retrieval),
        ];
        let out = runner(2, Duration::from_millis(50))
            .run(&message(), "Jane", &strategies)
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy, "template");
    }

    #[tokio::test]
    async fn model_cap_respected() {
        let strategies = vec![
            Fixed::ok("m1", StrategyKind::Model),
            Fixed::ok("m2", StrategyKind::Model),
            Fixed::ok("m3", StrategyKind::Model),
            Fixed::ok("r1", StrategyKind::Retrieval),
            Fixed::ok("r2", StrategyKind::Retrieval),
        ];
        let out = runner(2, Duration::from_secs(1))
            .run(&message(), "Jane", &strategies)
            .await;
        let names: Vec<_> = out.iter().map(|c| c.strategy.as_str()).collect();
        assert_eq!(names, vec!["r1", "m1", "m2", "template"]);
    }

    #[tokio::test]
    async fn extra_template_strategies_are_ignored() {
        let strategies = vec![Fixed::ok("tpl", StrategyKind::Template)];
        let out = runner(2, Duration::from_secs(1))
            .run(&message(), "Jane", &strategies)
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy, "template");
    }
}
