use super::value::{CellValue, DEFAULT_VALUE, RowValues};

/// Ledger key. Assigned when a row first acquires a pending change and never reused
/// within one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeKey(pub u64);

/// Stable row identity; survives inserts and removals of other rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RowId(pub(crate) u64);

#[derive(Debug, Clone, Default)]
pub struct RowRecord {
    pub(crate) raw: RowValues,
    pub(crate) change: Option<RowValues>,
    pub(crate) change_key: Option<ChangeKey>,
    pub(crate) is_new_row: bool,
    pub(crate) is_removed: bool,
}

impl RowRecord {
    pub(crate) fn committed(raw: RowValues) -> Self {
        Self {
            raw,
            ..Self::default()
        }
    }

    /// Pending values, present only while the row is tracked as changed.
    pub fn change(&self) -> Option<&RowValues> {
        self.change.as_ref()
    }

    pub fn change_key(&self) -> Option<ChangeKey> {
        self.change_key
    }

    pub fn is_new_row(&self) -> bool {
        self.is_new_row
    }

    pub fn is_removed(&self) -> bool {
        self.is_removed
    }

    pub fn raw_value(&self, name: &str) -> &CellValue {
        self.raw.get(name).unwrap_or(&DEFAULT_VALUE)
    }

    /// Pending value if one exists, otherwise the committed one.
    pub fn value(&self, name: &str) -> &CellValue {
        self.change
            .as_ref()
            .and_then(|c| c.get(name))
            .unwrap_or_else(|| self.raw_value(name))
    }

    pub fn has_change(&self, name: &str) -> bool {
        self.change.as_ref().is_some_and(|c| c.contains_key(name))
    }

    /// Whether the row must be present in the ledger.
    pub(crate) fn needs_tracking(&self) -> bool {
        self.is_new_row || self.is_removed || self.change.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub(crate) fn clear_tracking(&mut self) {
        self.change = None;
        self.change_key = None;
        self.is_new_row = false;
        self.is_removed = false;
    }
}

/// Values the persistence layer reports back for a committed row, such as an assigned
/// rowid or column defaults filled in by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRow {
    pub key: ChangeKey,
    pub values: RowValues,
}
