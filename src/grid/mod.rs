//! Virtualized data-grid engine.
//!
//! [`GridState`] owns one loaded result set together with its pending edits, focus,
//! selection and change ledger. [`RecalcController`] turns scroll and resize input into
//! the [`VisibleRange`] a renderer should draw. Nothing here touches a terminal or a
//! database; those live in the binary.

use std::time::Duration;

mod controller;
mod focus;
pub mod notify;
mod row;
mod state;
mod value;
pub mod viewport;

pub use controller::RecalcController;
pub use focus::{CellPos, FocusState};
pub use notify::{Broadcast, ListenerId, ListenerOrder};
pub use row::{ChangeKey, CommittedRow, RowRecord};
pub use state::{CHAR_WIDTH, GridState, MIN_COLUMN_WIDTH};
pub use value::{CellValue, ColumnDescriptor, ColumnInfo, ColumnType, RowValues};
pub use viewport::{Container, VisibleRange, compute_visible_range};

#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Height of every row, in the same units as column widths.
    pub row_height: f64,
    /// Extra rows kept rendered beyond the visible window.
    pub render_ahead: usize,
    /// Coalescing window for change broadcasts.
    pub debounce: Duration,
    pub read_only: bool,
    pub listener_order: ListenerOrder,
    /// Rows inspected when sizing columns.
    pub sample_rows: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            row_height: 24.0,
            render_ahead: 4,
            debounce: Duration::from_millis(16),
            read_only: false,
            listener_order: ListenerOrder::NewestFirst,
            sample_rows: 100,
        }
    }
}
