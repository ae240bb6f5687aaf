// Repository trait for the analytical event warehouse
use crate::domain::event::EventRow;
use async_trait::async_trait;

/// An event paired with the token the warehouse uses to drop duplicate retries
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub insert_id: String,
    pub row: EventRow,
}

impl InsertRow {
    /// Token is the event's own id
    pub fn deduplicated(row: EventRow) -> Self {
        Self {
            insert_id: row.event_id.clone(),
            row,
        }
    }
}

#[async_trait]
pub trait EventWarehouse: Send + Sync {
    /// Stream rows into `dataset.table`
    async fn insert_rows(&self, dataset_id: &str, table_id: &str, rows: &[InsertRow]) -> anyhow::Result<()>;

    /// Run a standard SQL query and decode every result row as an event
    async fn query_events(&self, sql: &str) -> anyhow::Result<Vec<EventRow>>;
}
