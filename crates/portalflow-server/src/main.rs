mod api;
mod config;

use api::ServerCore;
use config::ServerConfig;
use portalflow_browser::PlaywrightDriver;
use portalflow_core::{
    ChallengeStore, GeminiClassifier, InMemorySessionStore, IntentClassifier, Orchestrator,
    UnconfiguredClassifier,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portalflow_server=debug,portalflow_core=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting PortalFlow server");

    let config = ServerConfig::load()?;

    let mut driver = PlaywrightDriver::new().with_node_binary(config.node_binary.clone());
    if let Some(dir) = &config.node_working_dir {
        driver = driver.with_working_dir(dir.clone());
    }
    match driver.probe_runtime().await {
        Ok(probe) if probe.ready => tracing::info!(
            node_version = probe.node_version.as_deref().unwrap_or("unknown"),
            chromium_cached = probe.chromium_cache_detected,
            "Browser runtime ready"
        ),
        Ok(probe) => {
            for note in &probe.notes {
                tracing::warn!("{}", note);
            }
        }
        Err(err) => tracing::warn!(error = %err, "Browser runtime probe failed"),
    }

    let sessions = Arc::new(InMemorySessionStore::new(
        Arc::new(driver),
        config.orchestrator.launch.clone(),
    ));
    let orchestrator = Orchestrator::new(
        sessions,
        Arc::new(ChallengeStore::new()),
        config.orchestrator.clone(),
    )?;
    orchestrator.spawn_sweeper();

    let classifier: Arc<dyn IntentClassifier> = match &config.intent.api_key {
        Some(key) => {
            let mut classifier =
                GeminiClassifier::new(key.clone()).with_model(config.intent.model.clone());
            if let Some(base_url) = &config.intent.base_url {
                classifier = classifier.with_base_url(base_url.clone());
            }
            tracing::info!(model = %config.intent.model, "Intent classification enabled");
            Arc::new(classifier)
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not set, intent classification disabled");
            Arc::new(UnconfiguredClassifier)
        }
    };

    let state = Arc::new(ServerCore {
        orchestrator,
        classifier,
    });
    let app = api::router(state).layer(api::cors());

    let addr = config.bind_address();
    tracing::info!(addr = %addr, "Server running");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
