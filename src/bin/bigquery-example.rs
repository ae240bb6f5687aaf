// BigQuery example - Dependency injection and run
use std::path::Path;
use std::sync::Arc;

use gcp_data_examples::application::event_service::EventService;
use gcp_data_examples::infrastructure::auth::GcpTokenSource;
use gcp_data_examples::infrastructure::bigquery_repository::BigQueryRepository;
use gcp_data_examples::infrastructure::config::{WarehouseConfig, DEFAULT_ENV_FILE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gcp_data_examples::init_tracing();

    // Load configuration before touching any client
    let config = WarehouseConfig::load(Path::new(DEFAULT_ENV_FILE), None)?;

    // Create repository (infrastructure layer)
    let tokens = GcpTokenSource::default_credentials().await?;
    let repository = Arc::new(BigQueryRepository::new(tokens, config.project_id.clone()));

    // Create service (application layer)
    let service = EventService::new(repository, config);

    let stdout = std::io::stdout();
    service.run(chrono::Utc::now(), &mut stdout.lock()).await
}
