// Bigtable repository implementation over the v2 REST API
use crate::application::wide_column_store::{ReadFilter, WideColumnStore};
use crate::domain::row_key::prefix_successor;
use crate::domain::wide_row::{Cell, Mutation, SetCell, WideRow};
use crate::infrastructure::auth::GcpTokenSource;
use crate::infrastructure::config::WideColumnConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize};

pub const BIGTABLE_BASE_URL: &str = "https://bigtable.googleapis.com/v2";

#[derive(Clone)]
pub struct BigtableRepository {
    client: reqwest::Client,
    tokens: GcpTokenSource,
    base_url: String,
    table_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutateRowRequest {
    row_key: String,
    mutations: Vec<MutationProto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationProto {
    set_cell: SetCellProto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetCellProto {
    family_name: String,
    column_qualifier: String,
    timestamp_micros: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadRowsRequest {
    rows: RowSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<RowFilterProto>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    row_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    row_ranges: Vec<RowRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowRange {
    start_key_closed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_key_open: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowFilterProto {
    cells_per_column_limit_filter: u32,
}

/// Streaming responses arrive as a JSON array of messages
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadRowsBody {
    Stream(Vec<ReadRowsResponse>),
    Single(ReadRowsResponse),
}

#[derive(Debug, Default, Deserialize)]
struct ReadRowsResponse {
    #[serde(default)]
    chunks: Vec<CellChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellChunk {
    #[serde(default)]
    row_key: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    qualifier: Option<String>,
    #[serde(default, deserialize_with = "int64")]
    timestamp_micros: i64,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    value_size: i32,
    #[serde(default)]
    reset_row: bool,
    #[serde(default)]
    commit_row: bool,
}

/// Proto3 JSON encodes int64 as a string but numbers are accepted too
fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }
    match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Repr::Number(n) => Ok(n),
    }
}

fn decode(field: &str, raw: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(raw)
        .with_context(|| format!("Invalid base64 in {}", field))
}

impl BigtableRepository {
    pub fn new(tokens: GcpTokenSource, config: &WideColumnConfig) -> Self {
        Self::with_base_url(tokens, config, BIGTABLE_BASE_URL.to_string())
    }

    pub fn with_base_url(tokens: GcpTokenSource, config: &WideColumnConfig, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            table_name: table_name(config),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.table_name, method)
    }

    async fn post<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.method_url(method))
            .header("Authorization", self.tokens.bearer().await?)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to Bigtable")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Bigtable {} failed with status {}: {}", method, status, body);
        }

        Ok(response)
    }

    async fn read_rows(&self, request: &ReadRowsRequest) -> Result<Vec<WideRow>> {
        let body = self
            .post("readRows", request)
            .await?
            .json::<ReadRowsBody>()
            .await
            .context("Failed to parse Bigtable response")?;

        let messages = match body {
            ReadRowsBody::Stream(messages) => messages,
            ReadRowsBody::Single(message) => vec![message],
        };

        let mut assembler = ChunkAssembler::default();
        for message in &messages {
            for chunk in &message.chunks {
                assembler.push(chunk)?;
            }
        }
        assembler.finish()
    }
}

pub fn table_name(config: &WideColumnConfig) -> String {
    format!(
        "projects/{}/instances/{}/tables/{}",
        config.project_id, config.instance_id, config.table_id
    )
}

#[async_trait]
impl WideColumnStore for BigtableRepository {
    async fn apply(&self, row_key: &str, mutation: &Mutation) -> Result<()> {
        if mutation.is_empty() {
            anyhow::bail!("Mutation for row {} has no cells to set", row_key);
        }
        let request = MutateRowRequest {
            row_key: BASE64.encode(row_key),
            mutations: mutation.ops.iter().map(MutationProto::from).collect(),
        };

        tracing::debug!("Applying {} mutations to {}", request.mutations.len(), row_key);
        self.post("mutateRow", &request).await?;
        Ok(())
    }

    async fn read_row(&self, row_key: &str) -> Result<Option<WideRow>> {
        let request = ReadRowsRequest {
            rows: RowSet {
                row_keys: vec![BASE64.encode(row_key)],
                ..Default::default()
            },
            filter: None,
        };
        let rows = self.read_rows(&request).await?;
        Ok(rows.into_iter().find(|row| row.key == row_key))
    }

    async fn scan_prefix(&self, prefix: &str, filter: Option<ReadFilter>) -> Result<Vec<WideRow>> {
        let request = ReadRowsRequest {
            rows: RowSet {
                row_ranges: vec![prefix_range(prefix)],
                ..Default::default()
            },
            filter: filter.map(RowFilterProto::from),
        };

        tracing::debug!("Scanning prefix {}", prefix);
        self.read_rows(&request).await
    }
}

fn prefix_range(prefix: &str) -> RowRange {
    RowRange {
        start_key_closed: BASE64.encode(prefix),
        end_key_open: prefix_successor(prefix.as_bytes()).map(|end| BASE64.encode(end)),
    }
}

impl From<&SetCell> for MutationProto {
    fn from(op: &SetCell) -> Self {
        Self {
            set_cell: SetCellProto {
                family_name: op.family.clone(),
                column_qualifier: BASE64.encode(&op.qualifier),
                timestamp_micros: op.timestamp_micros.to_string(),
                value: BASE64.encode(&op.value),
            },
        }
    }
}

impl From<ReadFilter> for RowFilterProto {
    fn from(filter: ReadFilter) -> Self {
        match filter {
            ReadFilter::LatestN(n) => Self {
                cells_per_column_limit_filter: n,
            },
        }
    }
}

/// Rebuilds rows from a stream of cell chunks.
///
/// A chunk only repeats the row key, family and qualifier when they change.
/// A cell may be split over several chunks, signalled by a non-zero
/// `value_size` on all but the last piece.
#[derive(Debug, Default)]
struct ChunkAssembler {
    rows: Vec<WideRow>,
    key: Option<Vec<u8>>,
    family: Option<String>,
    qualifier: Option<Vec<u8>>,
    cells: Vec<Cell>,
    partial: Option<Cell>,
}

impl ChunkAssembler {
    fn push(&mut self, chunk: &CellChunk) -> Result<()> {
        if chunk.reset_row {
            self.reset();
            return Ok(());
        }

        if let Some(raw) = chunk.row_key.as_deref().filter(|k| !k.is_empty()) {
            let key = decode("rowKey", raw)?;
            if self.key.as_ref().is_some_and(|current| *current != key) {
                anyhow::bail!("Row key changed before commit");
            }
            self.key = Some(key);
        }
        if self.key.is_none() {
            anyhow::bail!("Chunk arrived without a row key");
        }

        if let Some(family) = &chunk.family_name {
            if chunk.qualifier.is_none() {
                anyhow::bail!("New column family must specify a qualifier");
            }
            self.family = Some(family.clone());
        }
        if let Some(raw) = &chunk.qualifier {
            self.qualifier = Some(decode("qualifier", raw)?);
        }

        let value = match &chunk.value {
            Some(raw) => decode("value", raw)?,
            None => Vec::new(),
        };

        let cell = match self.partial.take() {
            Some(mut cell) => {
                cell.value.extend_from_slice(&value);
                cell
            }
            None => Cell {
                family: self.family.clone().context("Cell has no column family")?,
                qualifier: self.qualifier.clone().context("Cell has no qualifier")?,
                timestamp_micros: chunk.timestamp_micros,
                value,
            },
        };

        if chunk.value_size > 0 {
            self.partial = Some(cell);
        } else {
            self.cells.push(cell);
        }

        if chunk.commit_row {
            if self.partial.is_some() {
                anyhow::bail!("Row committed with a partial cell");
            }
            let key = self.key.take().context("Commit without a row key")?;
            let key = String::from_utf8(key).context("Row key is not valid UTF-8")?;
            self.rows.push(WideRow::new(key, std::mem::take(&mut self.cells)));
            self.reset();
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.key = None;
        self.family = None;
        self.qualifier = None;
        self.cells.clear();
        self.partial = None;
    }

    fn finish(self) -> Result<Vec<WideRow>> {
        if self.key.is_some() {
            anyhow::bail!("Response ended before the row was committed");
        }
        Ok(self.rows)
    }
}
