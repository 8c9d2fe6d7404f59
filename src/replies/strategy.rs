//! Reply strategies: template, direct model, and retrieval-augmented model.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StrategyError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::InboundMessage;
use crate::replies::knowledge::KnowledgeStore;
use crate::replies::model::StrategyKind;

const SYSTEM_PROMPT: &str = "You are a professional property management assistant.";

pub const TEMPLATE_CONFIDENCE: f32 = 0.75;
pub const RETRIEVAL_CONFIDENCE: f32 = 0.85;
pub const FLAGSHIP_MODEL_CONFIDENCE: f32 = 0.8;
pub const MODEL_CONFIDENCE: f32 = 0.7;

/// Model-name markers that earn the higher confidence.
const FLAGSHIP_MARKERS: &[&str] = &["gpt-4", "gpt4", "opus", "sonnet"];

/// Text and self-reported confidence from one strategy run.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub content: String,
    pub confidence: f32,
}

/// A reply-generation backend.
#[async_trait]
pub trait ReplyStrategy: Send + Sync {
    /// Stable name recorded on candidates.
    fn name(&self) -> String;

    fn kind(&self) -> StrategyKind;

    /// Provider/model identifier recorded on candidates.
    fn provider(&self) -> String;

    /// Whether the strategy's backing resources are ready.
    fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
    ) -> Result<StrategyOutput, StrategyError>;
}

/// Confidence for a direct model answer.
pub fn model_confidence(model_name: &str) -> f32 {
    let lower = model_name.to_lowercase();
    if FLAGSHIP_MARKERS.iter().any(|m| lower.contains(m)) {
        FLAGSHIP_MODEL_CONFIDENCE
    } else {
        MODEL_CONFIDENCE
    }
}

// ── Template ────────────────────────────────────────────────────────

/// Broad issue type used to pick a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Maintenance,
    Rent,
    Lockout,
    General,
}

impl IssueType {
    /// First matching keyword group wins.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["broken", "fix", "repair", "maintenance", "leak"]) {
            Self::Maintenance
        } else if has(&["rent", "payment", "late fee", "balance"]) {
            Self::Rent
        } else if has(&["locked out", "lost key", "keys", "access"]) {
            Self::Lockout
        } else {
            Self::General
        }
    }
}

/// Static template replies. Never fails, never calls out.
#[derive(Debug, Clone, Default)]
pub struct TemplateStrategy;

impl TemplateStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Render the template for a message.
    pub fn draft(&self, message: &InboundMessage, tenant_name: &str) -> StrategyOutput {
        let topic = message.subject_or_default();
        let middle = match IssueType::detect(&message.content()) {
            IssueType::Maintenance => format!(
                "Thank you for reporting the maintenance issue: {topic}.\n\n\
                 We have received your request and our maintenance team will address this \
                 within 24-48 hours during business days. If this is an emergency, please call \
                 (555) 123-4567 immediately."
            ),
            IssueType::Rent => format!(
                "Thank you for contacting us about {topic}.\n\n\
                 Rent is due on the 1st of each month with a grace period until the 5th. For \
                 payment questions, please contact our office at (555) 123-4567."
            ),
            IssueType::Lockout => "We understand being locked out is stressful and we're here to \
                 help immediately.\n\n\
                 Please call our emergency line at (555) 123-4567 for lockout assistance."
                .to_string(),
            IssueType::General => format!(
                "Thank you for contacting us about {topic}.\n\n\
                 We have received your message and will respond within 24 hours during business \
                 days.\n\n\
                 For urgent matters, please call (555) 123-4567."
            ),
        };
        StrategyOutput {
            content: format!(
                "Dear {tenant_name},\n\n{middle}\n\nBest regards,\nProperty Management Team"
            ),
            confidence: TEMPLATE_CONFIDENCE,
        }
    }
}

#[async_trait]
impl ReplyStrategy for TemplateStrategy {
    fn name(&self) -> String {
        "template".to_string()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Template
    }

    fn provider(&self) -> String {
        "predefined_template".to_string()
    }

    async fn generate(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
    ) -> Result<StrategyOutput, StrategyError> {
        Ok(self.draft(message, tenant_name))
    }
}

// ── Direct model ────────────────────────────────────────────────────

/// Sampling settings shared by model-backed strategies.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

async fn ask(
    llm: &dyn LlmProvider,
    strategy: String,
    prompt: String,
    sampling: Sampling,
) -> Result<String, StrategyError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ])
    .with_temperature(sampling.temperature)
    .with_max_tokens(sampling.max_tokens);

    let response = llm.complete(request).await?;
    let content = response.content.trim().to_string();
    if content.is_empty() {
        return Err(StrategyError::Failed {
            strategy,
            reason: "model returned empty reply".to_string(),
        });
    }
    Ok(content)
}

/// Asks one model to answer the tenant directly.
pub struct ModelStrategy {
    llm: Arc<dyn LlmProvider>,
    sampling: Sampling,
}

impl ModelStrategy {
    pub fn new(llm: Arc<dyn LlmProvider>, sampling: Sampling) -> Self {
        Self { llm, sampling }
    }

    fn prompt(message: &InboundMessage, tenant_name: &str) -> String {
        format!(
            "Write a helpful, empathetic response to this tenant email:\n\n\
             From: {tenant_name}\n\
             Email: Subject: {subject}\n{body}\n\n\
             Write a professional response addressing their concern:",
            subject = message.subject.as_deref().unwrap_or(""),
            body = message.body,
        )
    }
}

#[async_trait]
impl ReplyStrategy for ModelStrategy {
    fn name(&self) -> String {
        format!("model:{}", self.llm.model_name())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Model
    }

    fn provider(&self) -> String {
        self.llm.model_name().to_string()
    }

    async fn generate(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
    ) -> Result<StrategyOutput, StrategyError> {
        let content = ask(
            self.llm.as_ref(),
            self.name(),
            Self::prompt(message, tenant_name),
            self.sampling,
        )
        .await?;
        Ok(StrategyOutput {
            content,
            confidence: model_confidence(self.llm.model_name()),
        })
    }
}

// ── Retrieval-augmented ─────────────────────────────────────────────

/// Retrieves policy snippets and has a model phrase the answer around them.
pub struct RetrievalStrategy {
    knowledge: Arc<dyn KnowledgeStore>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
    sampling: Sampling,
}

impl RetrievalStrategy {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        llm: Arc<dyn LlmProvider>,
        top_k: usize,
        sampling: Sampling,
    ) -> Self {
        Self {
            knowledge,
            llm,
            top_k,
            sampling,
        }
    }

    fn prompt(context: &[String], question: &str, tenant_name: &str) -> String {
        format!(
            "Context:\n{context}\n\n\
             Write a helpful, professional response to this tenant inquiry:\n\
             From: {tenant_name}\n\
             Question: {question}\n\n\
             Response:",
            context = context.join("\n"),
        )
    }
}

#[async_trait]
impl ReplyStrategy for RetrievalStrategy {
    fn name(&self) -> String {
        "retrieval".to_string()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Retrieval
    }

    fn provider(&self) -> String {
        format!("retrieval+{}", self.llm.model_name())
    }

    fn is_available(&self) -> bool {
        self.knowledge.is_available()
    }

    async fn generate(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
    ) -> Result<StrategyOutput, StrategyError> {
        let question = format!(
            "Subject: {}\n{}",
            message.subject.as_deref().unwrap_or(""),
            message.body
        );
        let context = self
            .knowledge
            .retrieve(&question, self.top_k)
            .await
            .map_err(|e| StrategyError::Unavailable {
                strategy: self.name(),
                reason: e.to_string(),
            })?;
        if context.is_empty() {
            return Err(StrategyError::Unavailable {
                strategy: self.name(),
                reason: "no relevant policy context".to_string(),
            });
        }
        debug!(snippets = context.len(), "Retrieved policy context");

        let content = ask(
            self.llm.as_ref(),
            self.name(),
            Self::prompt(&context, &question, tenant_name),
            self.sampling,
        )
        .await?;
        Ok(StrategyOutput {
            content,
            confidence: RETRIEVAL_CONFIDENCE,
        })
    }
}
