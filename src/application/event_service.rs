// Event service - Use cases for the warehouse example
use crate::application::event_warehouse::{EventWarehouse, InsertRow};
use crate::domain::event::EventRow;
use crate::infrastructure::config::WarehouseConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;

const RECENT_EVENTS_LIMIT: usize = 10;

#[derive(Clone)]
pub struct EventService {
    warehouse: Arc<dyn EventWarehouse>,
    config: WarehouseConfig,
}

impl EventService {
    pub fn new(warehouse: Arc<dyn EventWarehouse>, config: WarehouseConfig) -> Self {
        Self { warehouse, config }
    }

    /// Stream events, each tagged with its own id as the insert token
    pub async fn insert_events(&self, rows: Vec<EventRow>) -> Result<()> {
        let rows: Vec<InsertRow> = rows.into_iter().map(InsertRow::deduplicated).collect();
        self.warehouse
            .insert_rows(&self.config.dataset_id, &self.config.table_id, &rows)
            .await
            .context("Failed to insert events")
    }

    pub fn recent_events_query(&self) -> String {
        format!(
            "SELECT event_id, device_id, timestamp, temperature\n\
             FROM {}\n\
             ORDER BY timestamp DESC\n\
             LIMIT {}",
            self.config.table_ref(),
            RECENT_EVENTS_LIMIT
        )
    }

    pub async fn query_recent_events(&self) -> Result<Vec<EventRow>> {
        self.warehouse
            .query_events(&self.recent_events_query())
            .await
            .context("Failed to run query")
    }

    /// Optional sample insert followed by the recent-events query
    pub async fn run<W: Write>(&self, now: DateTime<Utc>, out: &mut W) -> Result<()> {
        if self.config.insert_sample {
            writeln!(out, "Streaming rows into BigQuery...")?;
            self.insert_events(vec![EventRow::sample(now)]).await?;
            writeln!(out, "Inserted 1 sample row.")?;
        }

        let events = self.query_recent_events().await?;
        tracing::info!("Query returned {} rows", events.len());

        writeln!(out, "Query results from {}:", self.config.table_ref())?;
        for event in &events {
            writeln!(out, "{}", event)?;
        }

        Ok(())
    }
}
