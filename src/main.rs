//! formwork server: upload endpoint bootstrap

use std::sync::Arc;

use formwork::config::FormworkConfig;
use formwork::handlers::{router, AppState};
use formwork::scan::{ClamAvScanner, MalwareScanner};
use formwork::storage::S3ObjectStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = FormworkConfig::load()?;

    let storage = Arc::new(S3ObjectStorage::from_settings(&config.storage).await);
    let scanner: Option<Arc<dyn MalwareScanner>> = if config.upload.scan_uploads {
        Some(Arc::new(ClamAvScanner::from_settings(&config.scan)))
    } else {
        None
    };
    if let Some(scanner) = &scanner {
        tracing::info!(scanner = scanner.name(), "upload scanning enabled");
    }

    let state = AppState::new(&config, storage, scanner);
    let app = router(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %config.server.bind, "formwork server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
