//! Change containers: row changes grouped by table.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

/// State of a changed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    /// Row was inserted or updated.
    Modified,
    /// Row was deleted.
    Deleted,
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRow {
    /// Row state.
    pub state: RowState,
    /// Cell values, in the table's column order.
    pub values: Vec<Value>,
}

impl SyncRow {
    /// Creates a modified row.
    pub fn modified(values: Vec<Value>) -> Self {
        Self {
            state: RowState::Modified,
            values,
        }
    }

    /// Creates a deleted row.
    pub fn deleted(values: Vec<Value>) -> Self {
        Self {
            state: RowState::Deleted,
            values,
        }
    }
}

/// Row changes of one table, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerTable {
    /// Table name.
    pub table_name: String,
    /// Optional schema name.
    pub schema_name: Option<String>,
    /// Changed rows.
    pub rows: Vec<SyncRow>,
}

impl ContainerTable {
    /// Creates an empty table container.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            rows: Vec::new(),
        }
    }

    /// Sets the schema name.
    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    fn same_table(&self, other: &ContainerTable) -> bool {
        self.table_name == other.table_name && self.schema_name == other.schema_name
    }

    fn empty_like(&self) -> Self {
        Self {
            table_name: self.table_name.clone(),
            schema_name: self.schema_name.clone(),
            rows: Vec::new(),
        }
    }
}

/// Row changes grouped by table.
///
/// A container holds either one batch worth of rows or, on the client
/// side, the merged rows of a whole download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSet {
    /// Tables in first-seen order.
    pub tables: Vec<ContainerTable>,
}

impl ContainerSet {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all tables.
    pub fn rows_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Returns true if at least one table has a row.
    pub fn has_rows(&self) -> bool {
        self.tables.iter().any(|t| !t.rows.is_empty())
    }

    /// Looks up a table by name.
    pub fn table(&self, table_name: &str) -> Option<&ContainerTable> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    /// Appends a row to the named table, creating the table if needed.
    pub fn add_row(&mut self, table_name: &str, row: SyncRow) {
        match self.tables.iter_mut().find(|t| t.table_name == table_name) {
            Some(table) => table.rows.push(row),
            None => {
                let mut table = ContainerTable::new(table_name);
                table.rows.push(row);
                self.tables.push(table);
            }
        }
    }

    /// Appends every row of `other`, table by table.
    ///
    /// Row order within a table is preserved; tables unknown to `self`
    /// are appended in the order `other` lists them.
    pub fn merge(&mut self, other: ContainerSet) {
        for incoming in other.tables {
            match self.tables.iter_mut().find(|t| t.same_table(&incoming)) {
                Some(table) => table.rows.extend(incoming.rows),
                None => self.tables.push(incoming),
            }
        }
    }

    /// Splits the container into chunks of at most `max_rows` rows.
    ///
    /// Rows keep their relative order. A `max_rows` of zero, or a
    /// container that already fits, yields a single chunk; an empty
    /// container also yields a single (empty) chunk.
    pub fn split(&self, max_rows: usize) -> Vec<ContainerSet> {
        if max_rows == 0 || self.rows_count() <= max_rows {
            return vec![self.clone()];
        }

        let mut chunks = Vec::new();
        let mut current = ContainerSet::new();
        let mut current_rows = 0usize;

        for table in &self.tables {
            for row in &table.rows {
                if current_rows == max_rows {
                    chunks.push(std::mem::take(&mut current));
                    current_rows = 0;
                }
                current.push_into(table, row.clone());
                current_rows += 1;
            }
        }

        if current_rows > 0 {
            chunks.push(current);
        }
        chunks
    }

    fn push_into(&mut self, source: &ContainerTable, row: SyncRow) {
        match self.tables.last_mut() {
            Some(last) if last.same_table(source) => last.rows.push(row),
            _ => {
                let mut table = source.empty_like();
                table.rows.push(row);
                self.tables.push(table);
            }
        }
    }
}
