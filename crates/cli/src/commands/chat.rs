//! `rookery chat`: interactive conversation on stdin.

use std::io::Write;

use rookery_agent::QueryRequest;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::ask::cancel_on_ctrl_c;
use super::runtime;

pub async fn run(conversation: &str, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let orchestrator = runtime::build(&config).await?;

    println!();
    println!("  Rookery interactive mode");
    println!();
    println!("  Model:         {}", config.model);
    println!("  Memory:        {}", config.memory.backend);
    println!("  Conversation:  {conversation}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels a running request; type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());
        eprint!("  ...");
        let response = orchestrator
            .handle(QueryRequest::new(conversation, user, text), &cancel)
            .await;
        watcher.abort();
        eprint!("\r     \r");

        println!();
        for line in response.answer.lines() {
            println!("  Rookery > {line}");
        }
        println!();
    }

    orchestrator.wait_for_background().await;
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
