// Bigtable example - Dependency injection and run
use std::path::Path;
use std::sync::Arc;

use gcp_data_examples::application::reading_service::ReadingService;
use gcp_data_examples::infrastructure::auth::GcpTokenSource;
use gcp_data_examples::infrastructure::bigtable_repository::BigtableRepository;
use gcp_data_examples::infrastructure::config::{WideColumnConfig, DEFAULT_ENV_FILE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gcp_data_examples::init_tracing();

    let config = WideColumnConfig::load(Path::new(DEFAULT_ENV_FILE), None)?;

    let tokens = GcpTokenSource::default_credentials().await?;
    let repository = Arc::new(BigtableRepository::new(tokens, &config));
    tracing::info!("Opened table {}", config.table_id);

    let service = ReadingService::new(repository, config);

    let stdout = std::io::stdout();
    service.run(chrono::Utc::now(), &mut stdout.lock()).await
}
