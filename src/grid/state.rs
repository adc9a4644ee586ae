use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, warn};

use super::GridConfig;
use super::focus::{CellPos, FocusState};
use super::notify::{self, Broadcast, Clock, ListenerId, Notifier, SystemClock};
use super::row::{ChangeKey, CommittedRow, RowId, RowRecord};
use super::value::{CellValue, ColumnDescriptor, ColumnInfo, RowValues};

/// Width given to integer and real columns.
pub const NUMERIC_COLUMN_WIDTH: u32 = 100;
pub const MIN_TEXT_COLUMN_WIDTH: u32 = 150;
pub const MAX_TEXT_COLUMN_WIDTH: u32 = 500;
/// Width units per character of sampled text.
pub const CHAR_WIDTH: u32 = 8;
/// Smallest width a column can be resized to.
pub const MIN_COLUMN_WIDTH: u32 = 16;

/// Rows, columns, pending edits, focus and selection of one loaded result set.
///
/// Row identity for change tracking is a stable id, so inserting or deleting rows never
/// changes which rows the ledger points at. The ledger holds exactly the rows that carry
/// a non-empty change, are new, or are marked removed.
pub struct GridState {
    columns: Vec<ColumnDescriptor>,
    widths: Vec<u32>,
    order: Vec<RowId>,
    records: HashMap<RowId, RowRecord>,
    ledger: BTreeMap<ChangeKey, RowId>,
    next_row_id: u64,
    next_change_key: u64,
    focus: FocusState,
    selection: BTreeSet<usize>,
    read_only: bool,
    container_focus_requested: bool,
    notifier: Notifier<GridState>,
}

impl GridState {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<RowValues>, config: &GridConfig) -> Self {
        Self::with_clock(columns, rows, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        columns: Vec<ColumnInfo>,
        rows: Vec<RowValues>,
        config: &GridConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        let columns: Vec<ColumnDescriptor> = columns
            .into_iter()
            .map(|info| {
                let initial_width = initial_width(&info, &rows, config.sample_rows);
                ColumnDescriptor {
                    icon: info.primary_key.then_some('⚷'),
                    name: info.name,
                    declared_type: info.declared_type,
                    initial_width,
                    resizable: true,
                    primary_key: info.primary_key,
                }
            })
            .collect();
        let widths = columns.iter().map(|c| c.initial_width).collect();

        let mut order = Vec::with_capacity(rows.len());
        let mut records = HashMap::with_capacity(rows.len());
        for (idx, raw) in rows.into_iter().enumerate() {
            let id = RowId(idx as u64);
            order.push(id);
            records.insert(id, RowRecord::committed(raw));
        }

        Self {
            columns,
            widths,
            next_row_id: order.len() as u64,
            order,
            records,
            ledger: BTreeMap::new(),
            next_change_key: 1,
            focus: FocusState::Unfocused,
            selection: BTreeSet::new(),
            read_only: config.read_only,
            container_focus_requested: false,
            notifier: Notifier::new(config.debounce, config.listener_order, clock),
        }
    }

    // ===== Read accessors =====

    pub fn get_headers(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn get_header_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_rows_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Row record at a display index. Panics when out of bounds.
    pub fn row(&self, row: usize) -> &RowRecord {
        &self.records[&self.order[row]]
    }

    fn row_mut(&mut self, row: usize) -> Option<(RowId, &mut RowRecord)> {
        let id = *self.order.get(row)?;
        self.records.get_mut(&id).map(|r| (id, r))
    }

    /// Current value of a cell: the pending value when there is one (including explicit
    /// NULL and DEFAULT), otherwise the committed value.
    pub fn get_value(&self, row: usize, col: usize) -> &CellValue {
        self.row(row).value(&self.columns[col].name)
    }

    pub fn has_cell_change(&self, row: usize, col: usize) -> bool {
        self.row(row).has_change(&self.columns[col].name)
    }

    pub fn is_removed_row(&self, row: usize) -> bool {
        self.row(row).is_removed
    }

    pub fn is_new_row(&self, row: usize) -> bool {
        self.row(row).is_new_row
    }

    /// Ledger rows in the order they first changed.
    pub fn get_changed_rows(&self) -> Vec<&RowRecord> {
        self.ledger
            .values()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn changed_row_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.ledger.is_empty()
    }

    /// Selected rows as value lists in column order, for copy and export.
    pub fn get_selected_rows_array(&self) -> Vec<Vec<CellValue>> {
        self.selection
            .iter()
            .filter(|&&row| row < self.order.len())
            .map(|&row| {
                let rec = self.row(row);
                self.columns
                    .iter()
                    .map(|c| rec.value(&c.name).clone())
                    .collect()
            })
            .collect()
    }

    pub fn column_widths(&self) -> &[u32] {
        &self.widths
    }

    pub fn column_width(&self, col: usize) -> u32 {
        self.widths[col]
    }

    pub fn focus(&self) -> FocusState {
        self.focus
    }

    pub fn selected_rows(&self) -> &BTreeSet<usize> {
        &self.selection
    }

    pub fn is_row_selected(&self, row: usize) -> bool {
        self.selection.contains(&row)
    }

    /// Whether the ledger matches the rows that carry changes. Used by tests and debug
    /// assertions.
    pub fn check_ledger_invariant(&self) -> bool {
        let tracked: HashSet<RowId> = self.ledger.values().copied().collect();
        if tracked.len() != self.ledger.len() {
            return false;
        }
        self.order.len() == self.records.len()
            && self.order.iter().all(|id| {
                let Some(rec) = self.records.get(id) else {
                    return false;
                };
                let in_ledger = tracked.contains(id);
                let keyed = rec
                    .change_key
                    .is_some_and(|k| self.ledger.get(&k) == Some(id));
                in_ledger == rec.needs_tracking()
                    && in_ledger == keyed
                    && in_ledger == rec.change.is_some()
            })
    }

    // ===== Editing =====

    /// Set a pending value for a cell. Writing back the committed value drops the pending
    /// entry, and the row leaves the ledger once nothing else keeps it there.
    pub fn change_value(&mut self, row: usize, col: usize, value: CellValue) {
        if self.read_only {
            debug!(row, col, "ignoring edit on read-only grid");
            return;
        }
        let Some(name) = self.columns.get(col).map(|c| c.name.clone()) else {
            return;
        };
        let Some((id, rec)) = self.row_mut(row) else {
            return;
        };
        if *rec.raw_value(&name) == value {
            if let Some(change) = rec.change.as_mut() {
                change.remove(&name);
            }
        } else {
            rec.change.get_or_insert_with(RowValues::new).insert(name, value);
        }
        self.sync_ledger(id);
        self.broadcast(Broadcast::Debounced);
    }

    /// Insert an empty new row, by default just below the focused row. Returns its index.
    pub fn insert_new_row(&mut self, at: Option<usize>) -> Option<usize> {
        if self.read_only {
            return None;
        }
        let at = at
            .or_else(|| self.focus.cell().map(|c| c.row + 1))
            .unwrap_or(0)
            .min(self.order.len());
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        self.records.insert(
            id,
            RowRecord {
                change: Some(RowValues::new()),
                is_new_row: true,
                ..RowRecord::default()
            },
        );
        self.order.insert(at, id);
        self.sync_ledger(id);

        self.selection = self
            .selection
            .iter()
            .map(|&r| if r >= at { r + 1 } else { r })
            .collect();
        let col = self.focus.cell().map(|c| c.col).unwrap_or(0);
        self.focus = FocusState::View(CellPos::new(at, col));

        debug!(row = at, pending = self.ledger.len(), "inserted new row");
        self.broadcast(Broadcast::Debounced);
        Some(at)
    }

    /// Remove a row, by default the focused one. New rows disappear at once; committed
    /// rows are only marked and stay visible until the change is applied.
    pub fn remove_row(&mut self, index: Option<usize>) {
        if self.read_only {
            return;
        }
        let Some(row) = index.or_else(|| self.focus.cell().map(|c| c.row)) else {
            return;
        };
        let Some((id, rec)) = self.row_mut(row) else {
            return;
        };
        if rec.is_new_row {
            self.delete_rows(&HashSet::from([id]));
        } else {
            rec.is_removed = true;
            self.sync_ledger(id);
        }
        debug!(row, pending = self.ledger.len(), "removed row");
        self.broadcast(Broadcast::Debounced);
    }

    /// Fold a successful commit back into committed state.
    ///
    /// Edited and new rows get `raw ∪ change ∪ committed values`; removed rows are
    /// deleted. The ledger is empty afterwards. With nothing tracked and nothing
    /// reported this does nothing, not even a broadcast.
    pub fn apply_changes(&mut self, committed: &[CommittedRow], broadcast: Broadcast) {
        if self.ledger.is_empty() && committed.is_empty() {
            return;
        }
        let mut reported: HashMap<ChangeKey, &RowValues> =
            committed.iter().map(|c| (c.key, &c.values)).collect();
        let tracked = std::mem::take(&mut self.ledger);
        let applied = tracked.len();
        let mut doomed = HashSet::new();
        for (key, id) in tracked {
            let Some(rec) = self.records.get_mut(&id) else {
                continue;
            };
            if rec.is_removed {
                doomed.insert(id);
                continue;
            }
            if let Some(change) = rec.change.take() {
                rec.raw.extend(change);
            }
            if let Some(values) = reported.remove(&key) {
                rec.raw
                    .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            rec.clear_tracking();
        }
        let removed = doomed.len();
        self.delete_rows(&doomed);
        if !reported.is_empty() {
            warn!(
                unmatched = reported.len(),
                "commit reported values for rows that are not tracked"
            );
        }
        debug!(applied, removed, "applied changes");
        self.broadcast(broadcast);
    }

    /// Drop every pending change: new rows vanish, everything else returns to its
    /// committed values. Listeners are notified before this returns.
    pub fn discard_all_changes(&mut self) {
        let tracked = std::mem::take(&mut self.ledger);
        let discarded = tracked.len();
        let mut doomed = HashSet::new();
        for id in tracked.into_values() {
            let Some(rec) = self.records.get_mut(&id) else {
                continue;
            };
            if rec.is_new_row {
                doomed.insert(id);
            } else {
                rec.clear_tracking();
            }
        }
        self.delete_rows(&doomed);
        debug!(discarded, "discarded changes");
        self.broadcast(Broadcast::Instant);
    }

    /// Bring a row's ledger entry in line with its record.
    fn sync_ledger(&mut self, id: RowId) {
        let Some(rec) = self.records.get_mut(&id) else {
            return;
        };
        if rec.needs_tracking() {
            if rec.change_key.is_none() {
                let key = ChangeKey(self.next_change_key);
                self.next_change_key += 1;
                rec.change_key = Some(key);
                rec.change.get_or_insert_with(RowValues::new);
                self.ledger.insert(key, id);
            }
        } else if let Some(key) = rec.change_key.take() {
            rec.change = None;
            self.ledger.remove(&key);
        }
    }

    /// Delete rows from the grid, the ledger, and remap focus and selection onto the
    /// surviving rows.
    fn delete_rows(&mut self, doomed: &HashSet<RowId>) {
        if doomed.is_empty() {
            return;
        }
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.order.len());
        let mut kept = Vec::with_capacity(self.order.len());
        for id in self.order.drain(..) {
            if doomed.contains(&id) {
                remap.push(None);
                if let Some(key) = self.records.remove(&id).and_then(|r| r.change_key) {
                    self.ledger.remove(&key);
                }
            } else {
                remap.push(Some(kept.len()));
                kept.push(id);
            }
        }
        self.order = kept;

        self.selection = self
            .selection
            .iter()
            .filter_map(|&r| remap.get(r).copied().flatten())
            .collect();

        if let Some(pos) = self.focus.cell() {
            let len = self.order.len();
            self.focus = match remap.get(pos.row).copied().flatten() {
                Some(row) => self.focus.with_row(row),
                None if len == 0 => FocusState::Unfocused,
                None => {
                    let slid_in = remap.iter().take(pos.row).flatten().count();
                    self.focus.with_row(slid_in.min(len - 1)).to_view()
                }
            };
        }
    }

    // ===== Focus, selection and edit mode =====

    pub fn set_focus(&mut self, row: usize, col: usize) {
        if row >= self.order.len() || col >= self.columns.len() {
            return;
        }
        self.focus = FocusState::View(CellPos::new(row, col));
        self.broadcast(Broadcast::Debounced);
    }

    pub fn clear_focus(&mut self) {
        self.focus = FocusState::Unfocused;
        self.broadcast(Broadcast::Debounced);
    }

    /// Returns whether edit mode is active afterwards.
    pub fn enter_edit_mode(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        if let FocusState::View(pos) = self.focus {
            self.focus = FocusState::Edit(pos);
            self.broadcast(Broadcast::Debounced);
        }
        self.focus.is_editing()
    }

    /// Leave edit mode and ask the host to give keyboard focus back to the grid.
    pub fn exit_edit_mode(&mut self) {
        self.focus = self.focus.to_view();
        self.container_focus_requested = true;
        self.broadcast(Broadcast::Debounced);
    }

    /// Consume a pending request to refocus the grid container.
    pub fn take_container_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.container_focus_requested)
    }

    /// Replace the selection with every row between `a` and `b`, inclusive.
    pub fn select_range(&mut self, a: usize, b: usize) {
        let (lo, hi) = (a.min(b), a.max(b));
        self.selection = (lo..=hi).collect();
        self.broadcast(Broadcast::Debounced);
    }

    pub fn select_row(&mut self, row: usize, toggle: bool) {
        if toggle && self.selection.contains(&row) {
            self.selection.remove(&row);
        } else {
            self.selection.insert(row);
        }
        self.broadcast(Broadcast::Debounced);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.broadcast(Broadcast::Debounced);
    }

    // ===== Column widths =====

    /// Set the display width of a column. Returns whether it changed.
    pub fn set_column_width(&mut self, col: usize, width: u32) -> bool {
        let Some(desc) = self.columns.get(col) else {
            return false;
        };
        if !desc.resizable {
            return false;
        }
        let width = width.max(MIN_COLUMN_WIDTH);
        if self.widths[col] == width {
            return false;
        }
        self.widths[col] = width;
        self.broadcast(Broadcast::Debounced);
        true
    }

    // ===== Change broadcast =====

    pub fn subscribe(&mut self, listener: impl FnMut(&GridState) + 'static) -> ListenerId {
        self.notifier.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn broadcast(&mut self, kind: Broadcast) {
        match kind {
            Broadcast::Debounced => self.notifier.schedule(),
            Broadcast::Instant => self.notify_now(),
        }
    }

    /// Notify every listener right away, cancelling any pending debounced broadcast.
    pub fn notify_now(&mut self) {
        let order = self.notifier.order();
        let mut listeners = self.notifier.take_for_dispatch();
        notify::dispatch(&mut listeners, order, self);
        self.notifier.restore(listeners);
    }

    /// Fire the debounced broadcast if its window has closed. Returns whether it fired.
    pub fn poll_broadcast(&mut self) -> bool {
        if self.notifier.is_due() {
            self.notify_now();
            true
        } else {
            false
        }
    }

    pub fn is_broadcast_pending(&self) -> bool {
        self.notifier.is_pending()
    }

    /// How long until the pending broadcast is due, if one is pending.
    pub fn next_broadcast_in(&self) -> Option<Duration> {
        self.notifier.time_until_due()
    }
}

/// Width from a bounded sample of the first rows, so layout cost does not grow with the
/// result set. Best effort, not an exact fit.
fn initial_width(info: &ColumnInfo, rows: &[RowValues], sample: usize) -> u32 {
    if info.declared_type.is_numeric() {
        return NUMERIC_COLUMN_WIDTH;
    }
    let max_len = rows
        .iter()
        .take(sample)
        .filter_map(|r| r.get(&info.name))
        .map(|v| v.to_string().chars().count())
        .max()
        .unwrap_or(0);
    let max_len = u32::try_from(max_len).unwrap_or(u32::MAX);
    max_len
        .saturating_mul(CHAR_WIDTH)
        .clamp(MIN_TEXT_COLUMN_WIDTH, MAX_TEXT_COLUMN_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ColumnType;
    use crate::grid::notify::{ListenerOrder, ManualClock};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn text_rows(values: &[&str]) -> Vec<RowValues> {
        values
            .iter()
            .map(|v| RowValues::from([("name".to_string(), CellValue::Text(v.to_string()))]))
            .collect()
    }

    fn grid_with(values: &[&str], clock: &ManualClock, config: &GridConfig) -> GridState {
        GridState::with_clock(
            vec![ColumnInfo::new("name", ColumnType::Text)],
            text_rows(values),
            config,
            Box::new(clock.clone()),
        )
    }

    fn counter(grid: &mut GridState) -> Rc<RefCell<usize>> {
        let fired = Rc::new(RefCell::new(0));
        let f = Rc::clone(&fired);
        grid.subscribe(move |_| *f.borrow_mut() += 1);
        fired
    }

    #[test]
    fn width_heuristic() {
        let long = "x".repeat(40);
        let rows = vec![RowValues::from([
            ("short".to_string(), CellValue::Text("ab".into())),
            ("long".to_string(), CellValue::Text(long)),
            ("n".to_string(), CellValue::Integer(123_456_789)),
        ])];
        let huge = vec![RowValues::from([(
            "short".to_string(),
            CellValue::Text("y".repeat(1000)),
        )])];
        let cols = vec![
            ColumnInfo::new("short", ColumnType::Text),
            ColumnInfo::new("long", ColumnType::Text),
            ColumnInfo::new("n", ColumnType::Integer).primary_key(),
        ];
        let grid = GridState::new(cols.clone(), rows, &GridConfig::default());
        assert_eq!(grid.column_widths(), &[150, 320, 100]);
        assert_eq!(grid.get_headers()[2].icon, Some('⚷'));

        let grid = GridState::new(cols, huge, &GridConfig::default());
        assert_eq!(grid.column_width(0), 500);
    }

    #[test]
    fn width_sample_is_bounded() {
        let mut values = vec!["a"; 100];
        let long = "z".repeat(60);
        values.push(&long);
        let clock = ManualClock::new();
        let grid = grid_with(&values, &clock, &GridConfig::default());
        assert_eq!(grid.column_width(0), MIN_TEXT_COLUMN_WIDTH);
    }

    #[test]
    fn edits_coalesce_into_one_broadcast() {
        let clock = ManualClock::new();
        let config = GridConfig::default();
        let mut grid = grid_with(&["a", "b"], &clock, &config);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        grid.subscribe(move |g: &GridState| s.borrow_mut().push(g.get_value(0, 0).clone()));

        grid.change_value(0, 0, CellValue::Text("t".into()));
        clock.advance(config.debounce / 2);
        grid.change_value(0, 0, CellValue::Text("te".into()));
        assert!(!grid.poll_broadcast());
        clock.advance(config.debounce / 2);
        grid.change_value(0, 0, CellValue::Text("tex".into()));
        assert!(grid.poll_broadcast());
        assert!(!grid.poll_broadcast());
        assert_eq!(*seen.borrow(), vec![CellValue::Text("tex".into())]);
    }

    #[test]
    fn instant_broadcast_cancels_pending() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a"], &clock, &GridConfig::default());
        let fired = counter(&mut grid);
        grid.change_value(0, 0, CellValue::Null);
        assert!(grid.is_broadcast_pending());
        grid.discard_all_changes();
        assert_eq!(*fired.borrow(), 1);
        assert!(!grid.is_broadcast_pending());
        clock.advance(Duration::from_secs(1));
        assert!(!grid.poll_broadcast());
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn newest_listener_runs_first_by_default() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a"], &clock, &GridConfig::default());
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["generic", "overlay"] {
            let o = Rc::clone(&order);
            grid.subscribe(move |_| o.borrow_mut().push(tag));
        }
        grid.notify_now();
        assert_eq!(*order.borrow(), vec!["overlay", "generic"]);

        let config = GridConfig {
            listener_order: ListenerOrder::RegistrationOrder,
            ..GridConfig::default()
        };
        let mut grid = grid_with(&["a"], &clock, &config);
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["generic", "overlay"] {
            let o = Rc::clone(&order);
            grid.subscribe(move |_| o.borrow_mut().push(tag));
        }
        grid.notify_now();
        assert_eq!(*order.borrow(), vec!["generic", "overlay"]);
    }

    #[test]
    fn edit_mode_transitions() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a", "b"], &clock, &GridConfig::default());
        assert!(!grid.enter_edit_mode());

        grid.set_focus(1, 0);
        assert_eq!(grid.focus(), FocusState::View(CellPos::new(1, 0)));
        assert!(grid.enter_edit_mode());
        assert!(grid.focus().is_editing_cell(1, 0));

        grid.exit_edit_mode();
        assert_eq!(grid.focus(), FocusState::View(CellPos::new(1, 0)));
        assert!(grid.take_container_focus_request());
        assert!(!grid.take_container_focus_request());

        grid.enter_edit_mode();
        grid.clear_focus();
        assert_eq!(grid.focus(), FocusState::Unfocused);
    }

    #[test]
    fn read_only_grid_rejects_edits() {
        let clock = ManualClock::new();
        let config = GridConfig {
            read_only: true,
            ..GridConfig::default()
        };
        let mut grid = grid_with(&["a"], &clock, &config);
        grid.set_focus(0, 0);
        assert!(!grid.enter_edit_mode());
        assert_eq!(grid.focus(), FocusState::View(CellPos::new(0, 0)));
        grid.change_value(0, 0, CellValue::Null);
        assert_eq!(grid.insert_new_row(None), None);
        grid.remove_row(Some(0));
        assert!(!grid.has_changes());
        assert_eq!(grid.get_value(0, 0), &CellValue::Text("a".into()));
    }

    #[test]
    fn selection_operations() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a", "b", "c", "d"], &clock, &GridConfig::default());
        grid.select_range(3, 1);
        assert_eq!(grid.selected_rows().iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        grid.select_row(2, true);
        grid.select_row(0, false);
        grid.select_row(0, false);
        assert_eq!(grid.selected_rows().iter().copied().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(
            grid.get_selected_rows_array(),
            vec![
                vec![CellValue::Text("a".into())],
                vec![CellValue::Text("b".into())],
                vec![CellValue::Text("d".into())],
            ]
        );
        grid.clear_selection();
        assert!(grid.selected_rows().is_empty());
    }

    #[test]
    fn selection_and_focus_follow_row_identity() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a", "b", "c"], &clock, &GridConfig::default());
        grid.select_row(2, false);
        let at = grid.insert_new_row(Some(1));
        assert_eq!(at, Some(1));
        assert!(grid.is_row_selected(3));
        assert_eq!(grid.focus().cell(), Some(CellPos::new(1, 0)));

        grid.remove_row(None);
        assert_eq!(grid.get_rows_count(), 3);
        assert!(grid.is_row_selected(2));
        assert_eq!(grid.focus().cell(), Some(CellPos::new(1, 0)));
        assert!(grid.check_ledger_invariant());
    }

    #[test]
    fn insert_defaults_below_focus() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a", "b", "c"], &clock, &GridConfig::default());
        assert_eq!(grid.insert_new_row(None), Some(0));
        grid.set_focus(2, 0);
        assert_eq!(grid.insert_new_row(None), Some(3));
        assert!(grid.is_new_row(3));
        assert_eq!(grid.get_value(3, 0), &CellValue::Default);
        assert_eq!(grid.insert_new_row(Some(99)), Some(5));
        assert_eq!(grid.changed_row_count(), 3);
    }

    #[test]
    fn commit_merges_reported_values() {
        let clock = ManualClock::new();
        let mut grid = GridState::with_clock(
            vec![
                ColumnInfo::new("id", ColumnType::Integer).primary_key(),
                ColumnInfo::new("name", ColumnType::Text),
            ],
            vec![RowValues::from([
                ("id".to_string(), CellValue::Integer(1)),
                ("name".to_string(), CellValue::Text("a".into())),
            ])],
            &GridConfig::default(),
            Box::new(clock.clone()),
        );
        let fired = counter(&mut grid);
        let row = grid.insert_new_row(None).unwrap_or_default();
        grid.change_value(row, 1, CellValue::Text("new".into()));
        let key = grid.row(row).change_key().unwrap_or(ChangeKey(0));

        grid.apply_changes(
            &[CommittedRow {
                key,
                values: RowValues::from([("id".to_string(), CellValue::Integer(2))]),
            }],
            Broadcast::Instant,
        );
        assert_eq!(*fired.borrow(), 1);
        assert!(!grid.has_changes());
        assert!(!grid.is_new_row(row));
        assert_eq!(grid.get_value(row, 0), &CellValue::Integer(2));
        assert_eq!(grid.get_value(row, 1), &CellValue::Text("new".into()));
        assert!(grid.row(row).change().is_none());
        assert!(grid.check_ledger_invariant());
    }

    #[test]
    fn removing_focused_last_row_moves_focus_up() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a", "b"], &clock, &GridConfig::default());
        grid.set_focus(1, 0);
        grid.remove_row(None);
        grid.apply_changes(&[], Broadcast::Debounced);
        assert_eq!(grid.get_rows_count(), 1);
        assert_eq!(grid.focus().cell(), Some(CellPos::new(0, 0)));

        grid.set_focus(0, 0);
        grid.enter_edit_mode();
        grid.remove_row(None);
        grid.apply_changes(&[], Broadcast::Debounced);
        assert_eq!(grid.focus(), FocusState::Unfocused);
    }

    #[test]
    fn column_width_floor_and_change_detection() {
        let clock = ManualClock::new();
        let mut grid = grid_with(&["a"], &clock, &GridConfig::default());
        assert!(grid.set_column_width(0, 3));
        assert_eq!(grid.column_width(0), MIN_COLUMN_WIDTH);
        assert!(!grid.set_column_width(0, MIN_COLUMN_WIDTH));
        assert!(!grid.set_column_width(5, 200));
        assert_eq!(grid.get_headers()[0].initial_width, MIN_TEXT_COLUMN_WIDTH);
    }
}
