use std::io::Read;
use std::sync::Arc;

use anyhow::Context;

use tenant_triage::config::{Rulebook, RunnerConfig, ZoneConfig};
use tenant_triage::llm::{LlmConfig, create_providers};
use tenant_triage::notify::{LogNotifier, NotificationDispatcher, SmtpConfig, SmtpNotifier};
use tenant_triage::pipeline::processor::TriageService;
use tenant_triage::pipeline::types::InboundMessage;
use tenant_triage::replies::{
    spawn_expiry_task, InMemoryKnowledge, KnowledgeStore, StrategyRunner, ZoneHooks,
};
use tenant_triage::store::MemoryStore;

/// Split an optional leading `Subject:` line off the body.
fn split_subject(raw: &str) -> (Option<String>, String) {
    match raw.split_once('\n') {
        Some((first, rest)) if first.to_lowercase().starts_with("subject:") => {
            let subject = first["subject:".len()..].trim().to_string();
            (Some(subject).filter(|s| !s.is_empty()), rest.trim().to_string())
        }
        _ => (None, raw.trim().to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let sender = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: tenant-triage <sender> < message.txt");
        eprintln!("  The first line may be \"Subject: ...\".");
        std::process::exit(2);
    });

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read message from stdin")?;
    let (subject, body) = split_subject(&raw);
    if body.is_empty() && subject.is_none() {
        anyhow::bail!("Empty message on stdin");
    }

    let rulebook = Rulebook::from_env()?;
    let runner = StrategyRunner::new(RunnerConfig::from_env());

    let providers = create_providers(&LlmConfig::all_from_env());
    if providers.is_empty() {
        tracing::warn!("No LLM backend configured; only template replies will be drafted");
    }
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledge::property_defaults());
    let strategies = runner.strategies_for(&providers, Some(knowledge));

    let notifier: Arc<dyn NotificationDispatcher> = match SmtpConfig::from_env()? {
        Some(config) => {
            tracing::info!(host = %config.host, "SMTP notifications enabled");
            Arc::new(SmtpNotifier::new(config))
        }
        None => Arc::new(LogNotifier),
    };

    let store = Arc::new(MemoryStore::new());
    let hooks = ZoneHooks {
        store: store.clone(),
        replies: store.clone(),
        messages: store.clone(),
        notifier,
    };
    let service = TriageService::new(
        rulebook,
        store,
        hooks,
        runner,
        strategies,
        ZoneConfig::from_env(),
    );

    // Expire unselected drafts in the background (every 60s)
    let _expiry_handle = spawn_expiry_task(service.zone());

    let message = InboundMessage::new(sender, subject, body);
    let message_id = message.id.clone();
    let outcome = service.ingest(message).await?;
    let drafted = service.draft_replies(&message_id).await?;

    let report = serde_json::json!({
        "ticket": outcome.ticket,
        "summary": outcome.ticket.summary(),
        "sla": service.evaluate_sla(&outcome.ticket),
        "escalations": outcome.escalations,
        "entry_id": drafted.entry_id,
        "candidates": drafted.candidates,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_line_is_split() {
        let (subject, body) = split_subject("Subject: Leak\nWater everywhere");
        assert_eq!(subject.as_deref(), Some("Leak"));
        assert_eq!(body, "Water everywhere");
    }

    #[test]
    fn plain_body() {
        let (subject, body) = split_subject("  No heat in 3A \n");
        assert!(subject.is_none());
        assert_eq!(body, "No heat in 3A");
    }
}
