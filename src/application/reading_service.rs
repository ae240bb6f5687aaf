// Reading service - Use cases for the wide-column example
use crate::application::wide_column_store::{ReadFilter, WideColumnStore};
use crate::domain::row_key::{device_prefix, row_key};
use crate::domain::wide_row::{Mutation, WideRow};
use crate::infrastructure::config::WideColumnConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;

pub const DEMO_DEVICE_ID: &str = "sensor-42";
const TEMPERATURE_COLUMN: &str = "temp_c";
const HUMIDITY_COLUMN: &str = "hum_pct";

#[derive(Clone)]
pub struct ReadingService {
    store: Arc<dyn WideColumnStore>,
    config: WideColumnConfig,
}

impl ReadingService {
    pub fn new(store: Arc<dyn WideColumnStore>, config: WideColumnConfig) -> Self {
        Self { store, config }
    }

    /// Write a reading under a time-inverted key and return that key
    pub async fn write_reading(&self, device_id: &str, at: DateTime<Utc>) -> Result<String> {
        let key = row_key(device_id, at);
        // Cell versions are microseconds at millisecond granularity
        let version = at.timestamp_millis() * 1_000;

        let mut mutation = Mutation::new();
        mutation
            .set_cell(&self.config.column_family, TEMPERATURE_COLUMN, version, "27.4")
            .set_cell(&self.config.column_family, HUMIDITY_COLUMN, version, "61");

        self.store
            .apply(&key, &mutation)
            .await
            .context("Failed to write row")?;
        Ok(key)
    }

    pub async fn read_reading(&self, key: &str) -> Result<Option<WideRow>> {
        self.store.read_row(key).await.context("Failed to read row")
    }

    /// Latest version of every row for the prefix
    pub async fn scan_device(&self, prefix: &str) -> Result<Vec<WideRow>> {
        self.store
            .scan_prefix(prefix, Some(ReadFilter::LatestN(1)))
            .await
            .context("Failed to scan rows")
    }

    /// Write, read back, then scan the demo device
    pub async fn run<W: Write>(&self, now: DateTime<Utc>, out: &mut W) -> Result<()> {
        let key = self.write_reading(DEMO_DEVICE_ID, now).await?;
        writeln!(out, "Wrote row: {}", key)?;

        let row = self.read_reading(&key).await?;
        writeln!(out, "Reading row: {}", key)?;
        match row {
            Some(row) => {
                for (family, cells) in row.families() {
                    writeln!(out, "Family: {}", family)?;
                    for cell in cells {
                        writeln!(out, "  {}", cell)?;
                    }
                }
            }
            None => tracing::warn!("Row {} not found after write", key),
        }

        let prefix = device_prefix(DEMO_DEVICE_ID);
        writeln!(out, "Scanning rows with prefix: {}", prefix)?;
        let rows = self.scan_device(&prefix).await?;
        tracing::info!("Scan returned {} rows", rows.len());
        for row in &rows {
            writeln!(out, "Row: {}", row.key)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wide_row::Cell;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Sorted in-memory table with optional failure injection
    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<BTreeMap<String, Vec<Cell>>>,
        calls: Mutex<Vec<&'static str>>,
        fail_on: Option<&'static str>,
    }

    impl FakeStore {
        fn failing(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Default::default()
            }
        }

        fn record(&self, op: &'static str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(op);
            if self.fail_on == Some(op) {
                anyhow::bail!("{} unavailable", op);
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WideColumnStore for FakeStore {
        async fn apply(&self, row_key: &str, mutation: &Mutation) -> anyhow::Result<()> {
            self.record("apply")?;
            let mut rows = self.rows.lock().unwrap();
            let cells = rows.entry(row_key.to_string()).or_default();
            for op in &mutation.ops {
                cells.push(Cell {
                    family: op.family.clone(),
                    qualifier: op.qualifier.as_bytes().to_vec(),
                    timestamp_micros: op.timestamp_micros,
                    value: op.value.clone(),
                });
            }
            Ok(())
        }

        async fn read_row(&self, row_key: &str) -> anyhow::Result<Option<WideRow>> {
            self.record("read")?;
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(row_key)
                .map(|cells| WideRow::new(row_key.to_string(), cells.clone())))
        }

        async fn scan_prefix(&self, prefix: &str, _filter: Option<ReadFilter>) -> anyhow::Result<Vec<WideRow>> {
            self.record("scan")?;
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, cells)| WideRow::new(key.clone(), cells.clone()))
                .collect())
        }
    }

    fn config() -> WideColumnConfig {
        WideColumnConfig {
            project_id: "demo-project".into(),
            instance_id: "iot".into(),
            table_id: "readings".into(),
            column_family: "stats".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_write_reading_uses_inverted_key() {
        let store = Arc::new(FakeStore::default());
        let service = ReadingService::new(store.clone(), config());

        let key = service.write_reading("sensor-42", now()).await.unwrap();

        assert_eq!(key, "sensor-42#18446742373709551615");
        let rows = store.rows.lock().unwrap();
        let cells = &rows[&key];
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].column(), "stats:temp_c");
        assert_eq!(cells[0].value, b"27.4".to_vec());
        assert_eq!(cells[0].timestamp_micros, 1_700_000_000_000_000);
        assert_eq!(cells[1].column(), "stats:hum_pct");
    }

    #[tokio::test]
    async fn test_scan_returns_newest_first() {
        let store = Arc::new(FakeStore::default());
        let service = ReadingService::new(store.clone(), config());

        let first = service.write_reading("sensor-42", now()).await.unwrap();
        let second = service
            .write_reading("sensor-42", now() + Duration::milliseconds(1))
            .await
            .unwrap();
        service.write_reading("sensor-7", now()).await.unwrap();

        let rows = service.scan_device("sensor-42#").await.unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec![second.as_str(), first.as_str()]);
    }

    #[tokio::test]
    async fn test_run_prints_write_read_and_scan() {
        let store = Arc::new(FakeStore::default());
        let service = ReadingService::new(store.clone(), config());
        let mut out = Vec::new();

        service.run(now(), &mut out).await.unwrap();

        let key = "sensor-42#18446742373709551615";
        let expected = format!(
            "Wrote row: {key}\n\
             Reading row: {key}\n\
             Family: stats\n  \
             stats:temp_c @1700000000000000 = 27.4\n  \
             stats:hum_pct @1700000000000000 = 61\n\
             Scanning rows with prefix: sensor-42#\n\
             Row: {key}\n"
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
        assert_eq!(store.calls(), vec!["apply", "read", "scan"]);
    }

    #[tokio::test]
    async fn test_write_failure_aborts_run() {
        let store = Arc::new(FakeStore::failing("apply"));
        let service = ReadingService::new(store.clone(), config());
        let mut out = Vec::new();

        let err = service.run(now(), &mut out).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to write row");
        assert_eq!(store.calls(), vec!["apply"]);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_skips_scan() {
        let store = Arc::new(FakeStore::failing("read"));
        let service = ReadingService::new(store.clone(), config());
        let mut out = Vec::new();

        let err = service.run(now(), &mut out).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to read row");
        assert_eq!(store.calls(), vec!["apply", "read"]);
    }

    #[tokio::test]
    async fn test_scan_failure_is_wrapped() {
        let store = Arc::new(FakeStore::failing("scan"));
        let service = ReadingService::new(store.clone(), config());
        let mut out = Vec::new();

        let err = service.run(now(), &mut out).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to scan rows");
        assert_eq!(err.root_cause().to_string(), "scan unavailable");
        assert_eq!(store.calls(), vec!["apply", "read", "scan"]);
    }
}
