//! Rookery CLI entry point.
//!
//! Commands:
//! - `ask`:    Answer a single message and exit
//! - `chat`:   Interactive conversation on stdin
//! - `tools`:  Print the tool reference the model sees
//! - `config`: Show, locate, or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "rookery",
    about = "Rookery: a tool-using research assistant with long-term memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one message and exit
    Ask {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Conversation to continue
        #[arg(short, long, default_value = "cli")]
        conversation: String,

        /// User whose memory is used
        #[arg(short, long, env = "ROOKERY_USER", default_value = "local")]
        user: String,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Chat interactively
    Chat {
        /// Conversation to continue
        #[arg(short, long, default_value = "cli")]
        conversation: String,

        /// User whose memory is used
        #[arg(short, long, env = "ROOKERY_USER", default_value = "local")]
        user: String,
    },

    /// Print the tool reference
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets omitted
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Ask {
            message,
            conversation,
            user,
            json,
        } => commands::ask::run(&message, &conversation, &user, json).await?,
        Commands::Chat { conversation, user } => commands::chat::run(&conversation, &user).await?,
        Commands::Tools => commands::tools::run(),
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_parses_with_defaults() {
        let cli = Cli::try_parse_from(["rookery", "ask", "-m", "What's the capital of Japan?"]).unwrap();
        match cli.command {
            Commands::Ask {
                message,
                conversation,
                json,
                ..
            } => {
                assert_eq!(message, "What's the capital of Japan?");
                assert_eq!(conversation, "cli");
                assert!(!json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rookery", "tools", "--verbose", "--json-logs"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.json_logs);
    }

    #[test]
    fn ask_requires_message() {
        assert!(Cli::try_parse_from(["rookery", "ask"]).is_err());
    }

    #[test]
    fn config_action_is_optional() {
        let cli = Cli::try_parse_from(["rookery", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { action: None }));
    }
}
