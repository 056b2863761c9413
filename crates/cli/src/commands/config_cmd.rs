//! `rookery config`: configuration management commands.

use rookery_config::AppConfig;

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set ROOKERY_API_KEY or OPENAI_API_KEY)");
            }
            if config.image.endpoint.is_none() {
                warnings.push("No image endpoint set, generate_image will be unavailable");
            }
            if config.tools.fetch_allowlist.is_empty() {
                warnings.push("Fetch allowlist is empty, fetch_url will reject every host");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Endpoint:  {}", config.api_url);
            println!("   Model:     {}", config.model);
            println!("   Memory:    {} ({})", config.memory.backend, config.memory.embedding_provider);
            println!(
                "   Loop:      {} iterations, tool timeout {}ms",
                config.agent.max_iterations, config.agent.tool_timeout_ms
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_redacted_toml());
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
