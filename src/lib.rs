pub mod clarify;
pub mod config;
pub mod extractor;
pub mod html_api;
pub mod sections;
pub mod server;
pub mod templates;
pub mod tree;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::ServerConfig;
use html_api::HtmlStore;
use tree::FileTree;

/// Shared application state passed to every handler and background task.
/// Constructed once at startup; components receive it by handle — nothing
/// reads ambient globals.
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    /// Scanned spec index.
    pub tree: FileTree,
    /// Persisted section cache (the "HTML API").
    pub store: HtmlStore,
    /// Client for the markup-ingestion loopback fetch.
    pub http: reqwest::Client,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let store = HtmlStore::new(&config.data_dir).await?;
        let tree = FileTree::new(config.content_dir.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            tree,
            store,
            http,
            started_at: std::time::Instant::now(),
        })
    }
}
