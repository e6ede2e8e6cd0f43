//! Transfer statistics.
//!
//! Two accumulators travel with a transfer: what the server selected to
//! send ([`DatabaseChangesSelected`]) and what was applied on the other
//! side ([`DatabaseChangesApplied`]). Both are built batch by batch with
//! `merge`, which only ever adds, so merging the same batches in any
//! order gives the same totals.

use crate::container::{ContainerSet, RowState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows selected for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChangesSelected {
    /// Table name.
    pub table_name: String,
    /// Inserted or updated rows.
    pub upserts: u64,
    /// Deleted rows.
    pub deletes: u64,
}

impl TableChangesSelected {
    /// Rows selected for this table.
    pub fn total_changes(&self) -> u64 {
        self.upserts.saturating_add(self.deletes)
    }
}

/// Changes selected by the server, per table and in total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangesSelected {
    tables: BTreeMap<String, TableChangesSelected>,
    total_changes_selected: u64,
}

impl DatabaseChangesSelected {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives selection statistics from a container's rows.
    pub fn from_container(container: &ContainerSet) -> Self {
        let mut stats = Self::new();
        for table in &container.tables {
            let deletes = table
                .rows
                .iter()
                .filter(|r| r.state == RowState::Deleted)
                .count() as u64;
            let upserts = table.rows.len() as u64 - deletes;
            stats.add_table(&table.table_name, upserts, deletes);
        }
        stats
    }

    /// Adds counts for one table.
    pub fn add_table(&mut self, table_name: &str, upserts: u64, deletes: u64) {
        let entry = self
            .tables
            .entry(table_name.to_string())
            .or_insert_with(|| TableChangesSelected {
                table_name: table_name.to_string(),
                ..Default::default()
            });
        entry.upserts = entry.upserts.saturating_add(upserts);
        entry.deletes = entry.deletes.saturating_add(deletes);
        self.recompute_total();
    }

    /// Adds every table counter of `other` into `self`.
    pub fn merge(&mut self, other: &DatabaseChangesSelected) {
        for table in other.tables.values() {
            self.add_table(&table.table_name, table.upserts, table.deletes);
        }
    }

    /// Grand total of selected rows.
    pub fn total_changes_selected(&self) -> u64 {
        self.total_changes_selected
    }

    /// Counters for one table.
    pub fn table(&self, table_name: &str) -> Option<&TableChangesSelected> {
        self.tables.get(table_name)
    }

    /// Iterates table counters in table-name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableChangesSelected> {
        self.tables.values()
    }

    fn recompute_total(&mut self) {
        self.total_changes_selected = self
            .tables
            .values()
            .fold(0u64, |acc, t| acc.saturating_add(t.total_changes()));
    }
}

/// Rows applied for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChangesApplied {
    /// Table name.
    pub table_name: String,
    /// Rows applied successfully.
    pub applied: u64,
    /// Rows applied after a conflict was resolved.
    pub resolved_conflicts: u64,
    /// Rows that failed to apply.
    pub failed: u64,
}

/// Changes applied on the receiving side, per table and in total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangesApplied {
    tables: BTreeMap<String, TableChangesApplied>,
    total_changes_applied: u64,
    total_resolved_conflicts: u64,
    total_changes_failed: u64,
}

impl DatabaseChangesApplied {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds counts for one table.
    pub fn add_table(&mut self, table_name: &str, applied: u64, resolved_conflicts: u64, failed: u64) {
        let entry = self
            .tables
            .entry(table_name.to_string())
            .or_insert_with(|| TableChangesApplied {
                table_name: table_name.to_string(),
                ..Default::default()
            });
        entry.applied = entry.applied.saturating_add(applied);
        entry.resolved_conflicts = entry.resolved_conflicts.saturating_add(resolved_conflicts);
        entry.failed = entry.failed.saturating_add(failed);
        self.recompute_totals();
    }

    /// Adds every table counter of `other` into `self`.
    pub fn merge(&mut self, other: &DatabaseChangesApplied) {
        for table in other.tables.values() {
            self.add_table(
                &table.table_name,
                table.applied,
                table.resolved_conflicts,
                table.failed,
            );
        }
    }

    /// Grand total of applied rows.
    pub fn total_changes_applied(&self) -> u64 {
        self.total_changes_applied
    }

    /// Grand total of rows applied after conflict resolution.
    pub fn total_resolved_conflicts(&self) -> u64 {
        self.total_resolved_conflicts
    }

    /// Grand total of rows that failed to apply.
    pub fn total_changes_failed(&self) -> u64 {
        self.total_changes_failed
    }

    /// Counters for one table.
    pub fn table(&self, table_name: &str) -> Option<&TableChangesApplied> {
        self.tables.get(table_name)
    }

    /// Iterates table counters in table-name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableChangesApplied> {
        self.tables.values()
    }

    fn recompute_totals(&mut self) {
        let (applied, resolved, failed) =
            self.tables
                .values()
                .fold((0u64, 0u64, 0u64), |(a, r, f), t| {
                    (
                        a.saturating_add(t.applied),
                        r.saturating_add(t.resolved_conflicts),
                        f.saturating_add(t.failed),
                    )
                });
        self.total_changes_applied = applied;
        self.total_resolved_conflicts = resolved;
        self.total_changes_failed = failed;
    }
}
