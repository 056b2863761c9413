//! Wiring: config → stores, providers, tools, loop, orchestrator.

use std::path::Path;
use std::sync::Arc;

use rookery_agent::{AgentLoop, LoopSettings, Orchestrator, SessionSummarizer, SummarizerSettings};
use rookery_config::AppConfig;
use rookery_core::event::EventBus;
use rookery_core::memory::{Embedder, VectorStore};
use rookery_core::message::ConversationStore;
use rookery_core::provider::{CompletionService, ImageService};
use rookery_memory::{
    HashEmbedder, InMemoryConversationStore, InMemoryVectorStore, MemoryManager, SqliteStore,
};
use rookery_providers::{HttpImageService, OpenAiCompatClient};
use tracing::{debug, info};

type Stores = (Arc<dyn VectorStore>, Arc<dyn ConversationStore>);

/// Load the config and fail early with setup help when no key is present.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ROOKERY_API_KEY=...   (takes priority)");
        eprintln!("    OPENAI_API_KEY=...");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    Ok(config)
}

/// Build the orchestrator and everything it depends on.
pub async fn build(config: &AppConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let events = Arc::new(EventBus::default());
    spawn_event_logger(&events);

    let client = Arc::new(OpenAiCompatClient::from_config(config)?);
    let completion: Arc<dyn CompletionService> = client.clone();

    let embedder: Arc<dyn Embedder> = match config.memory.embedding_provider.as_str() {
        "remote" => client as Arc<dyn Embedder>,
        _ => Arc::new(HashEmbedder::new(config.memory.embedding_dimensions)),
    };

    let (facts, store) = open_stores(config).await?;
    let memory = Arc::new(
        MemoryManager::new(facts, embedder)
            .with_recall_limit(config.memory.recall_limit)
            .with_events(events.clone()),
    );

    let image = HttpImageService::from_config(&config.image)?
        .map(|service| Arc::new(service) as Arc<dyn ImageService>);
    if image.is_none() {
        info!("No image endpoint configured, generate_image is unavailable");
    }

    let executor = rookery_tools::default_executor(config, memory.clone(), image, Some(events.clone()))?;

    let mut agent = AgentLoop::new(completion.clone(), Arc::new(executor))
        .with_settings(LoopSettings::from(&config.agent))
        .with_events(events.clone());
    if let Some(persona) = &config.agent.persona {
        agent = agent.with_persona(persona.clone());
    }

    let summarizer = SessionSummarizer::new(store.clone(), memory.clone(), completion)
        .with_settings(SummarizerSettings::new(&config.session, &config.agent))
        .with_events(events);

    Ok(Orchestrator::new(
        store,
        memory,
        Arc::new(agent),
        Arc::new(summarizer),
    ))
}

async fn open_stores(config: &AppConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    match config.memory.backend.as_str() {
        "sqlite" => {
            if let Some(parent) = Path::new(&config.memory.path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = Arc::new(SqliteStore::new(&config.memory.path).await?);
            let facts: Arc<dyn VectorStore> = store.clone();
            let sessions: Arc<dyn ConversationStore> = store;
            Ok((facts, sessions))
        }
        _ => {
            let facts: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
            let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
            Ok((facts, store))
        }
    }
}

/// Mirror domain events into the debug log.
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(kind = event.kind(), event = ?event, "Domain event");
        }
    });
}
