// Wide-column row and mutation models
use std::collections::BTreeMap;
use std::fmt;

/// A single versioned cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: String,
    pub qualifier: Vec<u8>,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
}

impl Cell {
    /// Column name in `family:qualifier` form
    pub fn column(&self) -> String {
        format!("{}:{}", self.family, String::from_utf8_lossy(&self.qualifier))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @{} = {}",
            self.column(),
            self.timestamp_micros,
            String::from_utf8_lossy(&self.value)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideRow {
    pub key: String,
    pub cells: Vec<Cell>,
}

impl WideRow {
    pub fn new(key: String, cells: Vec<Cell>) -> Self {
        Self { key, cells }
    }

    /// Cells grouped by family, family names in ascending order
    pub fn families(&self) -> BTreeMap<&str, Vec<&Cell>> {
        let mut families: BTreeMap<&str, Vec<&Cell>> = BTreeMap::new();
        for cell in &self.cells {
            families.entry(cell.family.as_str()).or_default().push(cell);
        }
        families
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCell {
    pub family: String,
    pub qualifier: String,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
}

/// Ordered set of cell writes applied atomically to one row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub ops: Vec<SetCell>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cell(
        &mut self,
        family: &str,
        qualifier: &str,
        timestamp_micros: i64,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(SetCell {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            timestamp_micros,
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
