//! Tubeflow application composition root
//!
//! Picks the project store, event sinks and generators from configuration
//! and wires them into a `WorkflowEngine`.

use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use tubeflow_common::Config;
use tubeflow_llm::LlmConfig;
use tubeflow_media::MediaConfig;
use tubeflow_productions::{
    CompositeEventSink, EngineConfig, EventSink, GeneratorFactory, InMemoryProjectStore,
    PgEventSink, PgProjectStore, ProjectStore, TracingEventSink, WorkflowEngine,
};

/// Install the global tracing subscriber (JSON when `LOG_FORMAT=json`)
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

/// Build the workflow engine described by `config`
pub async fn build_engine(config: &Config) -> Result<WorkflowEngine, anyhow::Error> {
    let (store, events): (Arc<dyn ProjectStore>, Arc<dyn EventSink>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                let pool = PgPool::connect(database_url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Database connection failed: {}", e))?;
                tracing::info!("Database connection established");

                let store = PgProjectStore::new(pool.clone());
                store.migrate().await?;

                let events = CompositeEventSink::new(vec![
                    Arc::new(TracingEventSink),
                    Arc::new(PgEventSink::new(pool)),
                ]);
                (Arc::new(store), Arc::new(events))
            }
            None => {
                tracing::info!("DATABASE_URL not set, using in-memory project store");
                (
                    Arc::new(InMemoryProjectStore::new()),
                    Arc::new(TracingEventSink),
                )
            }
        };

    let llm_config = if config.generator_provider == "llm" {
        LlmConfig::from_env()?
    } else {
        LlmConfig::default()
    };
    let media_config = MediaConfig::from_env()?;
    let generators =
        GeneratorFactory::create(&config.generator_provider, llm_config, &media_config)?;
    tracing::info!(generators = ?generators, "Generators ready");

    let engine_config = EngineConfig::from(config);
    tracing::info!(
        stage_timeout = ?engine_config.stage_timeout,
        max_attempts = ?engine_config.max_attempts,
        "Workflow engine configured"
    );

    Ok(WorkflowEngine::new(store, generators, events, engine_config))
}
