//! `rookery ask`: answer a single message.

use rookery_agent::{QueryRequest, QueryResponse};
use tokio_util::sync::CancellationToken;

use super::runtime;

pub async fn run(
    message: &str,
    conversation: &str,
    user: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let orchestrator = runtime::build(&config).await?;

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());

    if !json {
        eprint!("  Thinking...");
    }
    let response = orchestrator
        .handle(QueryRequest::new(conversation, user, message), &cancel)
        .await;
    watcher.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&response))?);
    } else {
        eprint!("\r              \r");
        println!("{}", response.answer);
    }

    // Let a pending summarization finish before the process exits.
    orchestrator.wait_for_background().await;

    if response.failed {
        return Err("the request could not be completed".into());
    }
    Ok(())
}

/// Cancel `token` on the first Ctrl+C.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn to_json(response: &QueryResponse) -> serde_json::Value {
    serde_json::json!({
        "answer": response.answer,
        "artifacts": response.artifacts,
        "iterations": response.iterations,
        "failed": response.failed,
        "persisted": response.persisted,
    })
}
