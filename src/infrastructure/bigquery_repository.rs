// BigQuery repository implementation over the v2 REST API
use crate::application::event_warehouse::{EventWarehouse, InsertRow};
use crate::domain::event::EventRow;
use crate::infrastructure::auth::GcpTokenSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const RESULTS_TIMEOUT_MS: u32 = 10_000;

#[derive(Clone)]
pub struct BigQueryRepository {
    client: reqwest::Client,
    tokens: GcpTokenSource,
    base_url: String,
    project_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    rows: Vec<InsertAllRow<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRow<'a> {
    insert_id: &'a str,
    json: EventRecord<'a>,
}

/// Table row as JSON; timestamps at microsecond precision
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    event_id: &'a str,
    device_id: &'a str,
    timestamp: String,
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    format_options: FormatOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

impl BigQueryRepository {
    pub fn new(tokens: GcpTokenSource, project_id: String) -> Self {
        Self::with_base_url(tokens, project_id, BIGQUERY_BASE_URL.to_string())
    }

    pub fn with_base_url(tokens: GcpTokenSource, project_id: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
        }
    }

    fn project_url(&self) -> String {
        format!(
            "{}/projects/{}",
            self.base_url,
            urlencoding::encode(&self.project_id)
        )
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .header("Authorization", self.tokens.bearer().await?)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to BigQuery")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("BigQuery request failed with status {}: {}", status, body);
        }

        response
            .json::<T>()
            .await
            .context("Failed to parse BigQuery response")
    }

    async fn poll_query_results(&self, job: &JobReference) -> Result<QueryResponse> {
        let mut url = format!(
            "{}/queries/{}?timeoutMs={}&formatOptions.useInt64Timestamp=true",
            self.project_url(),
            urlencoding::encode(&job.job_id),
            RESULTS_TIMEOUT_MS
        );
        if let Some(location) = &job.location {
            url.push_str(&format!("&location={}", urlencoding::encode(location)));
        }

        tracing::debug!("Waiting for query job {}", job.job_id);
        self.send(self.client.get(&url)).await
    }
}

#[async_trait]
impl EventWarehouse for BigQueryRepository {
    async fn insert_rows(&self, dataset_id: &str, table_id: &str, rows: &[InsertRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/datasets/{}/tables/{}/insertAll",
            self.project_url(),
            urlencoding::encode(dataset_id),
            urlencoding::encode(table_id)
        );
        let body = InsertAllRequest {
            rows: rows.iter().map(InsertAllRow::from).collect(),
        };

        tracing::debug!("Inserting {} rows into {}.{}", rows.len(), dataset_id, table_id);
        let response: InsertAllResponse = self.send(self.client.post(&url).json(&body)).await?;
        check_insert_errors(&response)
    }

    async fn query_events(&self, sql: &str) -> Result<Vec<EventRow>> {
        let url = format!("{}/queries", self.project_url());
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        };

        tracing::debug!("Executing query: {}", sql);
        let mut response: QueryResponse = self.send(self.client.post(&url).json(&body)).await?;

        while !response.job_complete {
            let job = response
                .job_reference
                .context("Query job is incomplete but has no job reference")?;
            response = self.poll_query_results(&job).await?;
            if response.job_reference.is_none() {
                response.job_reference = Some(job);
            }
        }

        decode_events(response.schema.as_ref(), &response.rows)
    }
}

impl<'a> From<&'a InsertRow> for InsertAllRow<'a> {
    fn from(insert: &'a InsertRow) -> Self {
        Self {
            insert_id: &insert.insert_id,
            json: EventRecord {
                event_id: &insert.row.event_id,
                device_id: &insert.row.device_id,
                timestamp: insert
                    .row
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
                temperature: insert.row.temperature,
            },
        }
    }
}

/// Streaming inserts report per-row failures in a 200 response
fn check_insert_errors(response: &InsertAllResponse) -> Result<()> {
    if let Some(failed) = response.insert_errors.first() {
        let reasons: Vec<String> = failed
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.reason, e.message))
            .collect();
        anyhow::bail!(
            "{} rows rejected, first at index {}: {}",
            response.insert_errors.len(),
            failed.index,
            reasons.join("; ")
        );
    }
    Ok(())
}

/// Map positional result cells onto events by schema field name
fn decode_events(schema: Option<&TableSchema>, rows: &[TableRow]) -> Result<Vec<EventRow>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let fields = &schema.context("Query returned rows without a schema")?.fields;
    let column = |name: &str| {
        fields
            .iter()
            .position(|f| f.name == name)
            .with_context(|| format!("Query result has no {} column", name))
    };
    let event_idx = column("event_id")?;
    let device_idx = column("device_id")?;
    let time_idx = column("timestamp")?;
    let temp_idx = column("temperature")?;

    rows.iter()
        .map(|row| {
            let cell = |idx: usize| row.f.get(idx).map(|c| &c.v).unwrap_or(&serde_json::Value::Null);

            let timestamp = cell(time_idx)
                .as_str()
                .and_then(parse_timestamp)
                .context("Invalid timestamp in query result")?;
            let temperature = match cell(temp_idx) {
                serde_json::Value::Null => None,
                v => Some(parse_float(v).context("Invalid temperature in query result")?),
            };

            Ok(EventRow::new(
                cell(event_idx).as_str().unwrap_or_default().to_string(),
                cell(device_idx).as_str().unwrap_or_default().to_string(),
                timestamp,
                temperature,
            ))
        })
        .collect()
}

/// Integer microseconds, falling back to float seconds
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = raw.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    let seconds = raw.parse::<f64>().ok()?;
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

fn parse_float(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}
