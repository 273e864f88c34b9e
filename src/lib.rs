pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{MergeError, MergeResult};

// Export the three pipeline stages
pub use logic::{
    to_pretty_json, AnalysisPipeline, AppliedChange, CredentialRegistry, Extractor, FileExtraction,
    MergeEngine, MergeOutcome, NoHeuristics, OrphanMatcher, Reconciler, SameFileMatcher,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{DocumentSource, FsDocumentSource, InMemoryDocumentSource};

/// Start the HTTP surface with configuration from the environment.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;

    let source = Arc::new(FsDocumentSource::new(
        config.source_root(),
        config.source.file_extension.clone(),
    ));
    let pipeline = Arc::new(AnalysisPipeline::from_config(&config, source));

    let app = crate::api::routes::create_router().with_state(pipeline);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("workflow-merge listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
