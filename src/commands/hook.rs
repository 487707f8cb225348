use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use headsync::config::SourceConfig;
use headsync::hooks::{DelayedDispatcher, Dispatched, HookEventType, PushHookProcessor};
use headsync::provider::ClientFactory;
use headsync::provider::server::ServerClientFactory;
use headsync::sync::Cancellation;
use serde_json::json;

pub fn run(
    config: Option<&Path>,
    event: HookEventType,
    payload: Option<&Path>,
    origin: &str,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    let source = Arc::new(super::load_source(config)?);
    let payload = read_payload(payload)?;
    let clients: Arc<dyn ClientFactory> = Arc::new(ServerClientFactory::new(
        &source.server_url,
        source.authenticator()?,
    ));

    let dispatcher = Arc::new(DelayedDispatcher::new({
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        move |item| report(&source, clients.as_ref(), item, &cancel)
    }));
    let processor = PushHookProcessor::new(dispatcher.clone(), source.event_delay());
    let result = processor
        .process(event, &payload, origin, Some(&source.server_url))
        .context("Failed to process hook");

    // Deliver whatever was scheduled before exiting
    dispatcher.shutdown();
    result
}

fn read_payload(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload from {}", path.display())),
        _ => {
            let mut payload = String::new();
            std::io::stdin()
                .read_to_string(&mut payload)
                .context("Failed to read payload from stdin")?;
            Ok(payload)
        }
    }
}

/// Print one JSON line per delivered item.
fn report(source: &SourceConfig, clients: &dyn ClientFactory, item: Dispatched, cancel: &Cancellation) {
    let line = match item {
        Dispatched::Heads(event) => {
            let updates = event.heads(source, clients, cancel);
            json!({ "event": event.kind(), "heads": updates })
        }
        Dispatched::Reindex(request) => json!({
            "reindex": {
                "server-url": request.server_url,
                "owner": request.owner,
                "repository": request.repository,
            }
        }),
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}") {
        log::warn!("Cannot write hook output: {e}");
    }
}
