use std::cell::Cell;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use sqlite_grid::grid::{
    Broadcast, CHAR_WIDTH, CellPos, CellValue, GridConfig, GridState, RecalcController,
};

use crate::db::{DBRequest, DBResponse, ROWID_COLUMN, RowChange, SortDir};

/// Width change applied by one resize key press.
const RESIZE_STEP: u32 = 4 * CHAR_WIDTH;
/// Rows moved by one mouse wheel notch.
const WHEEL_ROWS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Tables,
    Data,
}

pub struct App {
    pub should_quit: bool,
    pub status: String,

    // Schema
    pub tables: Vec<String>,
    pub selected_table: usize,

    // Which pane receives navigation keys
    pub pane: Pane,

    // Loaded page
    pub page_size: usize,
    pub page: usize,
    pub total_rows: Option<usize>,
    pub loaded_table: Option<String>,
    pub grid: Option<GridState>,
    pub recalc: RecalcController,
    pub grid_config: GridConfig,
    /// Data area size in terminal cells, as last drawn
    viewport_cells: (u16, u16),

    // Editing
    pub edit_buffer: String,
    pub edit_cursor: usize,

    /// Row where a range selection started
    pub select_anchor: Option<usize>,
    pub commit_in_flight: bool,

    // Cell viewer (show full text of current cell)
    pub show_cell_viewer: bool,

    // Filter/Sort
    pub filter: Option<String>,
    pub filter_input: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<SortDir>,

    // Help overlay
    pub show_help: bool,

    // Written by grid listeners
    redraw: Rc<Cell<bool>>,
    pending_count: Rc<Cell<usize>>,

    // Channels
    pub req_tx: Sender<DBRequest>,
    pub resp_rx: Receiver<DBResponse>,
}

impl App {
    pub fn new(
        page_size: usize,
        grid_config: GridConfig,
        req_tx: Sender<DBRequest>,
        resp_rx: Receiver<DBResponse>,
    ) -> Self {
        Self {
            should_quit: false,
            status: "Press ? for help, q to quit.".into(),
            tables: vec![],
            selected_table: 0,
            pane: Pane::Tables,
            page_size,
            page: 0,
            total_rows: None,
            loaded_table: None,
            grid: None,
            recalc: RecalcController::from_config(&grid_config),
            grid_config,
            viewport_cells: (0, 0),
            edit_buffer: String::new(),
            edit_cursor: 0,
            select_anchor: None,
            commit_in_flight: false,
            show_cell_viewer: false,
            filter: None,
            filter_input: None,
            sort_by: None,
            sort_dir: None,
            show_help: false,
            redraw: Rc::new(Cell::new(false)),
            pending_count: Rc::new(Cell::new(0)),
            req_tx,
            resp_rx,
        }
    }

    pub fn request_schema_refresh(&mut self) {
        let _ = self.req_tx.send(DBRequest::LoadSchema);
        self.status = "Loading schema...".into();
    }

    pub fn toggle_pane(&mut self) {
        self.pane = match self.pane {
            Pane::Tables => Pane::Data,
            Pane::Data => Pane::Tables,
        };
    }

    pub fn is_editing(&self) -> bool {
        self.grid.as_ref().is_some_and(|g| g.focus().is_editing())
    }

    /// Pending change count as last broadcast by the grid.
    pub fn pending_changes(&self) -> usize {
        self.pending_count.get()
    }

    /// Fire a due grid broadcast. Returns whether the screen needs a redraw.
    pub fn pump_grid(&mut self) -> bool {
        if let Some(grid) = self.grid.as_mut()
            && grid.poll_broadcast()
        {
            self.recalc.refresh(grid);
        }
        self.redraw.replace(false)
    }

    pub fn handle_db_response(&mut self, resp: DBResponse) {
        match resp {
            DBResponse::Schema { tables } => {
                self.tables = tables;
                if self.selected_table >= self.tables.len() {
                    self.selected_table = 0;
                }
                self.status = format!("Loaded {} tables", self.tables.len());
            }
            DBResponse::TableData {
                table,
                columns,
                rows,
                page,
                total_rows,
            } => {
                self.page = page;
                self.total_rows = total_rows;
                let mut grid = GridState::new(columns, rows, &self.grid_config);

                let pending = Rc::clone(&self.pending_count);
                grid.subscribe(move |g: &GridState| pending.set(g.changed_row_count()));
                let redraw = Rc::clone(&self.redraw);
                grid.subscribe(move |_| redraw.set(true));
                self.pending_count.set(0);

                if grid.get_rows_count() > 0 && grid.get_header_count() > 0 {
                    // first real column; __rowid__ sits at 0
                    grid.set_focus(0, 1.min(grid.get_header_count() - 1));
                }
                self.recalc = RecalcController::from_config(&self.grid_config);
                let (w, h) = self.viewport_cells;
                let height = self.rows_to_units(h);
                self.recalc
                    .on_resize(&grid, f64::from(w) * f64::from(CHAR_WIDTH), height);
                self.grid = Some(grid);
                self.select_anchor = None;
                self.loaded_table = Some(table.clone());

                self.status = format!(
                    "Viewing {} - page {} ({} rows/page){}",
                    table,
                    page + 1,
                    self.page_size,
                    total_rows
                        .map(|t| format!(", total ~{}", t))
                        .unwrap_or_default()
                );
            }
            DBResponse::ChangesCommitted {
                ok,
                committed,
                message,
            } => {
                self.commit_in_flight = false;
                if ok {
                    if let Some(grid) = self.grid.as_mut() {
                        grid.apply_changes(&committed, Broadcast::Instant);
                        self.recalc.refresh(grid);
                    }
                    self.status = match message {
                        Some(note) => format!("Changes committed; {note}"),
                        None => "Changes committed".into(),
                    };
                } else {
                    self.status = format!(
                        "Commit failed: {} (changes kept)",
                        message.unwrap_or_default()
                    );
                }
            }
            DBResponse::Error(msg) => {
                self.status = format!("Error: {msg}");
            }
        }
    }

    pub fn current_table_name(&self) -> Option<&str> {
        self.tables.get(self.selected_table).map(|s| s.as_str())
    }

    fn has_pending_changes(&self) -> bool {
        self.grid.as_ref().is_some_and(|g| g.has_changes())
    }

    pub fn load_selected_table_page(&mut self, page: usize) {
        if self.has_pending_changes() {
            self.status = "Commit (w) or discard (x) pending changes first".into();
            return;
        }
        if let Some(table) = self.current_table_name().map(|s| s.to_string()) {
            let _ = self.req_tx.send(DBRequest::LoadTable {
                table,
                page,
                page_size: self.page_size,
                filter: self.filter.clone(),
                sort_by: self.sort_by.clone(),
                sort_dir: self.sort_dir,
            });
            self.status = "Loading table...".into();
        }
    }

    pub fn reload_current_table(&mut self) {
        self.load_selected_table_page(self.page);
    }

    pub fn move_table_selection_up(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        if self.selected_table == 0 {
            self.selected_table = self.tables.len() - 1;
        } else {
            self.selected_table -= 1;
        }
    }

    pub fn move_table_selection_down(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        self.selected_table = (self.selected_table + 1) % self.tables.len();
    }

    pub fn next_page(&mut self) {
        if let Some(total) = self.total_rows
            && (self.page + 1).saturating_mul(self.page_size) >= total
        {
            self.status = "Already on the last page".into();
            return;
        }
        self.load_selected_table_page(self.page + 1);
    }

    pub fn prev_page(&mut self) {
        if self.page > 0 {
            self.load_selected_table_page(self.page - 1);
        }
    }

    // Filter helpers
    pub fn set_filter_string(&mut self, filter: Option<String>) {
        self.filter = filter;
        // Reset to first page when filter changes
        self.load_selected_table_page(0);
    }

    pub fn clear_filter(&mut self) {
        self.set_filter_string(None);
    }

    // Inline filter input state (for visible entry in UI)
    pub fn begin_filter_input(&mut self) {
        self.filter_input = Some(String::new());
    }

    pub fn update_filter_input_char(&mut self, c: char) {
        if let Some(buf) = self.filter_input.as_mut() {
            buf.push(c);
        }
    }

    pub fn backspace_filter_input(&mut self) {
        if let Some(buf) = self.filter_input.as_mut() {
            buf.pop();
        }
    }

    pub fn apply_filter_input(&mut self) {
        let pending = self.filter_input.take();
        match pending {
            Some(s) if !s.is_empty() => self.set_filter_string(Some(s)),
            _ => self.clear_filter(),
        }
    }

    pub fn cancel_filter_input(&mut self) {
        self.filter_input = None;
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    // Cycle sort for the focused column: None -> ASC -> DESC -> None
    pub fn sort_cycle_on_selection(&mut self) {
        let Some(name) = self.focused_column_name() else {
            return;
        };
        self.sort_by = Some(name);
        self.sort_dir = match self.sort_dir {
            None => Some(SortDir::Asc),
            Some(SortDir::Asc) => Some(SortDir::Desc),
            Some(SortDir::Desc) => None,
        };
        self.reload_current_table();
    }

    // Explicitly toggle sort direction (defaults to ASC when not set)
    pub fn sort_toggle_dir(&mut self) {
        self.sort_dir = match self.sort_dir {
            Some(SortDir::Asc) => Some(SortDir::Desc),
            _ => Some(SortDir::Asc),
        };
        self.reload_current_table();
    }

    fn focused_column_name(&self) -> Option<String> {
        let grid = self.grid.as_ref()?;
        let pos = grid.focus().cell()?;
        grid.get_headers().get(pos.col).map(|c| c.name.clone())
    }

    // ===== Viewport =====

    fn rows_to_units(&self, rows: u16) -> f64 {
        f64::from(rows) * self.recalc.row_height()
    }

    /// Record the size of the data area in terminal cells; recalculates on change.
    pub fn set_viewport(&mut self, width: u16, height: u16) {
        if self.viewport_cells == (width, height) {
            return;
        }
        self.viewport_cells = (width, height);
        let height = self.rows_to_units(height);
        if let Some(grid) = self.grid.as_ref() {
            self.recalc
                .on_resize(grid, f64::from(width) * f64::from(CHAR_WIDTH), height);
            if let Some(pos) = grid.focus().cell() {
                self.recalc.ensure_visible(grid, pos.row, pos.col);
            }
        }
    }

    /// Scroll by whole rows (mouse wheel).
    pub fn scroll_rows(&mut self, notches: f64) {
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let c = self.recalc.container();
        let top = c.scroll_top + notches * WHEEL_ROWS * self.recalc.row_height();
        self.recalc.on_scroll(grid, top, c.scroll_left);
    }

    // ===== Focus movement =====

    pub fn move_focus(&mut self, d_row: isize, d_col: isize) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let rows = grid.get_rows_count();
        let cols = grid.get_header_count();
        if rows == 0 || cols == 0 {
            return;
        }
        let cur = grid.focus().cell().unwrap_or(CellPos::new(0, 0));
        let row = cur.row.saturating_add_signed(d_row).min(rows - 1);
        let col = cur.col.saturating_add_signed(d_col).min(cols - 1);
        grid.set_focus(row, col);
        self.recalc.ensure_visible(grid, row, col);
    }

    pub fn move_cell_left(&mut self) {
        self.move_focus(0, -1);
    }

    pub fn move_cell_right(&mut self) {
        self.move_focus(0, 1);
    }

    pub fn move_cell_up(&mut self) {
        self.move_focus(-1, 0);
    }

    pub fn move_cell_down(&mut self) {
        self.move_focus(1, 0);
    }

    // ===== Row edits =====

    /// Whether mutating actions are blocked right now; sets a status message when they are.
    fn edits_blocked(&mut self) -> bool {
        if self.commit_in_flight {
            self.status = "Commit in progress".into();
            return true;
        }
        if self.grid.as_ref().is_some_and(|g| g.is_read_only()) {
            self.status = "Grid is read-only".into();
            return true;
        }
        false
    }

    pub fn insert_row(&mut self) {
        if self.edits_blocked() {
            return;
        }
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if let Some(row) = grid.insert_new_row(None) {
            let col = grid.focus().cell().map(|c| c.col).unwrap_or(0);
            self.recalc.refresh(grid);
            self.recalc.ensure_visible(grid, row, col);
            self.status = format!("Inserted row {}", row + 1);
        }
    }

    pub fn remove_row(&mut self) {
        if self.edits_blocked() {
            return;
        }
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let Some(pos) = grid.focus().cell() else {
            return;
        };
        let was_new = grid.is_new_row(pos.row);
        grid.remove_row(None);
        self.recalc.refresh(grid);
        self.status = if was_new {
            "New row dropped".into()
        } else {
            "Row marked for removal (w to commit, x to discard)".into()
        };
    }

    pub fn commit_changes(&mut self) {
        if self.commit_in_flight {
            self.status = "Commit in progress".into();
            return;
        }
        let (Some(table), Some(grid)) = (self.loaded_table.clone(), self.grid.as_ref()) else {
            return;
        };
        if !grid.has_changes() {
            self.status = "No pending changes".into();
            return;
        }
        let changes: Vec<RowChange> = grid
            .get_changed_rows()
            .into_iter()
            .filter_map(RowChange::from_record)
            .collect();
        // apply_changes clears the whole ledger, so every tracked row must go out
        let unaddressable = grid.changed_row_count() - changes.len();
        if unaddressable > 0 {
            warn!(%table, unaddressable, "commit refused: rows without rowid");
            self.status = format!("Commit refused: {unaddressable} changed row(s) have no rowid");
            return;
        }
        info!(%table, rows = changes.len(), "commit requested");
        let count = changes.len();
        let _ = self.req_tx.send(DBRequest::CommitChanges { table, changes });
        self.commit_in_flight = true;
        self.status = format!("Committing {count} row(s)...");
    }

    pub fn discard_changes(&mut self) {
        if self.commit_in_flight {
            self.status = "Commit in progress".into();
            return;
        }
        if let Some(grid) = self.grid.as_mut() {
            let n = grid.changed_row_count();
            grid.discard_all_changes();
            self.recalc.refresh(grid);
            self.status = format!("Discarded {n} pending row(s)");
        }
    }

    // ===== Selection =====

    pub fn toggle_row_selection(&mut self) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if let Some(pos) = grid.focus().cell() {
            grid.select_row(pos.row, true);
            self.select_anchor = Some(pos.row);
        }
    }

    /// Select every row between the anchor and the focused row.
    pub fn extend_selection(&mut self) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if let Some(pos) = grid.focus().cell() {
            let anchor = *self.select_anchor.get_or_insert(pos.row);
            grid.select_range(anchor, pos.row);
            self.status = format!("{} row(s) selected", grid.selected_rows().len());
        }
    }

    pub fn clear_selection(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            grid.clear_selection();
        }
        self.select_anchor = None;
    }

    // ===== Cell editing =====

    pub fn begin_edit_cell(&mut self) {
        if self.edits_blocked() {
            return;
        }
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let Some(pos) = grid.focus().cell() else {
            return;
        };
        // Prevent editing the __rowid__ column and provide a clear status message.
        if grid.get_headers()[pos.col].name == ROWID_COLUMN {
            self.status = "Editing __rowid__ is not supported".into();
            return;
        }
        if grid.is_removed_row(pos.row) {
            self.status = "Row is marked for removal".into();
            return;
        }
        if !grid.enter_edit_mode() {
            return;
        }
        self.edit_buffer = grid.get_value(pos.row, pos.col).edit_text();
        self.edit_cursor = self.edit_buffer.len();
        self.status = "Editing: Enter to save, Esc to cancel, Ctrl-d NULL, Ctrl-t DEFAULT".into();
    }

    pub fn cancel_edit_cell(&mut self) {
        self.finish_edit(None);
        self.status = "Edit cancelled".into();
    }

    pub fn submit_cell_edit(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let Some(pos) = grid.focus().cell() else {
            return;
        };
        let ty = grid.get_headers()[pos.col].declared_type;
        self.finish_edit(Some(CellValue::parse_for(ty, &self.edit_buffer)));
    }

    pub fn edit_set_null(&mut self) {
        self.finish_edit(Some(CellValue::Null));
        self.status = "Cell set to NULL".into();
    }

    pub fn edit_set_default(&mut self) {
        self.finish_edit(Some(CellValue::Default));
        self.status = "Cell set to DEFAULT".into();
    }

    fn finish_edit(&mut self, value: Option<CellValue>) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if !grid.focus().is_editing() {
            return;
        }
        if let (Some(value), Some(pos)) = (value, grid.focus().cell()) {
            debug!(row = pos.row, col = pos.col, "cell edited");
            grid.change_value(pos.row, pos.col, value);
            self.status = format!("{} pending row(s)", grid.changed_row_count());
        }
        grid.exit_edit_mode();
        if grid.take_container_focus_request() {
            self.pane = Pane::Data;
        }
        self.edit_buffer.clear();
        self.edit_cursor = 0;
    }

    // Editing buffer ops
    pub fn edit_input_insert(&mut self, ch: char) {
        self.edit_buffer.insert(self.edit_cursor, ch);
        self.edit_cursor += ch.len_utf8();
    }

    pub fn edit_input_backspace(&mut self) {
        if self.edit_cursor > 0 {
            let new_cursor = prev_boundary(&self.edit_buffer, self.edit_cursor);
            self.edit_buffer.drain(new_cursor..self.edit_cursor);
            self.edit_cursor = new_cursor;
        }
    }

    pub fn edit_input_delete(&mut self) {
        if self.edit_cursor < self.edit_buffer.len() {
            let next = next_boundary(&self.edit_buffer, self.edit_cursor);
            self.edit_buffer.drain(self.edit_cursor..next);
        }
    }

    pub fn edit_input_left(&mut self) {
        self.edit_cursor = prev_boundary(&self.edit_buffer, self.edit_cursor);
    }

    pub fn edit_input_right(&mut self) {
        self.edit_cursor = next_boundary(&self.edit_buffer, self.edit_cursor);
    }

    pub fn edit_input_home(&mut self) {
        self.edit_cursor = 0;
    }

    pub fn edit_input_end(&mut self) {
        self.edit_cursor = self.edit_buffer.len();
    }

    // ===== Copy to clipboard/file helpers (TSV) =====

    /// Copy the focused cell as text to clipboard; fallback to a temp .tsv file.
    pub fn copy_current_cell_tsv(&mut self) {
        match self.current_cell_text() {
            Some(cell) => self.copy_to_clipboard_or_file(cell, "cell"),
            None => self.status = "Nothing to copy (no data)".into(),
        }
    }

    /// Copy the selected rows (or the focused row) with a header line as TSV.
    pub fn copy_selected_rows_tsv(&mut self) {
        match self.selected_rows_tsv() {
            Some(out) => self.copy_to_clipboard_or_file(out, "rows"),
            None => self.status = "Nothing to copy (no data)".into(),
        }
    }

    pub fn selected_rows_tsv(&self) -> Option<String> {
        let grid = self.grid.as_ref()?;
        let mut rows = grid.get_selected_rows_array();
        if rows.is_empty() {
            let pos = grid.focus().cell()?;
            rows.push(
                (0..grid.get_header_count())
                    .map(|c| grid.get_value(pos.row, c).clone())
                    .collect(),
            );
        }
        let mut out = grid
            .get_headers()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join("\t");
        out.push('\n');
        for row in rows {
            let line = row
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\t");
            out.push_str(&line);
            out.push('\n');
        }
        Some(out)
    }

    /// Best-effort clipboard copy; falls back to writing a temp .tsv file on failure.
    fn copy_to_clipboard_or_file(&mut self, content: String, label: &str) {
        // Try platform clipboards in order
        let candidates: &[(&str, &[&str])] = &[
            // macOS
            ("pbcopy", &[]),
            // Wayland
            ("wl-copy", &[]),
            // X11
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
            // Windows
            ("clip", &[]),
        ];
        for (prog, args) in candidates {
            if try_clipboard_prog(prog, args, &content) {
                self.status = format!("Copied {} to clipboard via {}", label, prog);
                return;
            }
        }
        // Fallback: write to temp file
        let mut file_path = std::env::temp_dir();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        file_path.push(format!("sqlite-grid-{}.tsv", ts));
        self.status = match std::fs::write(&file_path, content.as_bytes()) {
            Ok(_) => format!(
                "Wrote {} TSV to {} (no clipboard tool found)",
                label,
                file_path.display()
            ),
            Err(e) => format!("Failed to write {} TSV: {}", label, e),
        };
    }

    // ===== Column widths =====

    pub fn resize_current_column(&mut self, wider: bool) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let Some(pos) = grid.focus().cell() else {
            return;
        };
        let cur = grid.column_width(pos.col);
        let width = if wider {
            cur.saturating_add(RESIZE_STEP)
        } else {
            cur.saturating_sub(RESIZE_STEP)
        };
        self.recalc.on_column_resize(grid, pos.col, width);
        self.recalc.ensure_visible(grid, pos.row, pos.col);
        self.status = format!(
            "Column width: {} chars",
            grid.column_width(pos.col) / CHAR_WIDTH
        );
    }

    pub fn toggle_cell_viewer(&mut self) {
        self.show_cell_viewer = !self.show_cell_viewer;
    }

    /// Text of the focused cell, including pending edits.
    pub fn current_cell_text(&self) -> Option<String> {
        let grid = self.grid.as_ref()?;
        let pos = grid.focus().cell()?;
        Some(grid.get_value(pos.row, pos.col).to_string())
    }
}

fn try_clipboard_prog(prog: &str, args: &[&str], content: &str) -> bool {
    match std::process::Command::new(prog)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                use std::io::Write;
                let _ = stdin.write_all(content.as_bytes());
            }
            child.wait().is_ok_and(|status| status.success())
        }
        Err(_) => false,
    }
}

fn prev_boundary(s: &str, idx: usize) -> usize {
    s[..idx].char_indices().last().map(|(i, _)| i).unwrap_or(0)
}

fn next_boundary(s: &str, idx: usize) -> usize {
    s[idx..]
        .chars()
        .next()
        .map(|c| idx + c.len_utf8())
        .unwrap_or(s.len())
}
