// Repository trait for the wide-column key-value store
use crate::domain::wide_row::{Mutation, WideRow};
use async_trait::async_trait;

/// Server-side filter applied to reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFilter {
    /// Keep only the newest `n` versions of each column
    LatestN(u32),
}

#[async_trait]
pub trait WideColumnStore: Send + Sync {
    /// Apply all mutations to a single row atomically
    async fn apply(&self, row_key: &str, mutation: &Mutation) -> anyhow::Result<()>;

    /// Look up one row; `None` when the key has no cells
    async fn read_row(&self, row_key: &str) -> anyhow::Result<Option<WideRow>>;

    /// Read every row whose key starts with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &str, filter: Option<ReadFilter>) -> anyhow::Result<Vec<WideRow>>;
}
