//! Policy knowledge used to ground retrieval replies.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;

/// A policy snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDoc {
    pub topic: String,
    pub content: String,
}

impl KnowledgeDoc {
    pub fn new(topic: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
        }
    }
}

/// Source of context snippets for retrieval replies.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Whether the store can answer queries at all.
    fn is_available(&self) -> bool;

    /// Up to `k` snippets most relevant to `query`.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, StoreError>;
}

/// In-memory store ranked by keyword overlap.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledge {
    docs: Vec<KnowledgeDoc>,
}

impl InMemoryKnowledge {
    pub fn new(docs: Vec<KnowledgeDoc>) -> Self {
        Self { docs }
    }

    /// Standard property-management policies.
    pub fn property_defaults() -> Self {
        Self::new(vec![
            KnowledgeDoc::new(
                "maintenance",
                "Standard maintenance requests are handled within 24-48 hours during business days (Monday-Friday, 9 AM - 6 PM).",
            ),
            KnowledgeDoc::new(
                "emergency",
                "Emergency repairs (flooding, gas leaks, electrical hazards, heating/cooling failures) are addressed immediately 24/7.",
            ),
            KnowledgeDoc::new(
                "maintenance",
                "For maintenance requests, call (555) 123-4567 or submit online at portal.property.com/maintenance.",
            ),
            KnowledgeDoc::new(
                "rent",
                "Rent is due on the 1st of each month. Grace period until the 5th without late fees.",
            ),
            KnowledgeDoc::new(
                "rent",
                "Late fees of $50 apply after the 5th of the month. Additional $25 fee for each subsequent week.",
            ),
            KnowledgeDoc::new(
                "rent",
                "Accepted payment methods: online portal, ACH transfer, certified check, money order. Cash not accepted.",
            ),
            KnowledgeDoc::new(
                "lockout",
                "During business hours (9 AM - 6 PM), contact office at (555) 123-4567 for lockout assistance.",
            ),
            KnowledgeDoc::new(
                "lockout",
                "After hours lockout service: call emergency line (555) 123-4567. Service fee: $75 weekdays, $100 weekends/holidays.",
            ),
            KnowledgeDoc::new(
                "emergency",
                "Emergency maintenance: (555) 123-4567 (available 24/7 for true emergencies only).",
            ),
            KnowledgeDoc::new(
                "general",
                "Office hours: Monday-Friday 9 AM - 6 PM, Saturday 10 AM - 4 PM, Closed Sundays.",
            ),
            KnowledgeDoc::new("general", "Main office: (555) 123-4567, Email: info@property.com"),
        ])
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn score(query_terms: &HashSet<String>, doc: &KnowledgeDoc) -> usize {
        let doc_terms = terms(&doc.content);
        let topic_hit = usize::from(query_terms.contains(&doc.topic));
        query_terms.intersection(&doc_terms).count() + topic_hit
    }
}

/// Lowercased words of three or more letters/digits.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledge {
    fn is_available(&self) -> bool {
        !self.docs.is_empty()
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, StoreError> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, usize, &KnowledgeDoc)> = self
            .docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (Self::score(&query_terms, doc), i, doc))
            .filter(|(score, _, _)| *score > 0)
            .collect();
        // Highest score first; ties keep declaration order.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, _, doc)| doc.content.clone())
            .collect())
    }
}
