use super::GridConfig;
use super::state::GridState;
use super::viewport::{Container, VisibleRange, compute_visible_range};

/// Keeps the visible range in step with scrolling, resizing and column resizes.
///
/// Column widths are read from the grid on every recalculation, so a resize shows up
/// in the very next range.
#[derive(Debug, Clone)]
pub struct RecalcController {
    container: Container,
    row_height: f64,
    render_ahead: usize,
    range: VisibleRange,
}

impl RecalcController {
    pub fn new(row_height: f64, render_ahead: usize) -> Self {
        Self {
            container: Container::default(),
            row_height,
            render_ahead,
            range: VisibleRange::default(),
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.row_height, config.render_ahead)
    }

    pub fn visible_range(&self) -> VisibleRange {
        self.range
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn on_scroll(&mut self, grid: &GridState, scroll_top: f64, scroll_left: f64) {
        self.container.scroll_top = scroll_top.clamp(0.0, self.max_scroll_top(grid));
        self.container.scroll_left = scroll_left.clamp(0.0, self.max_scroll_left(grid));
        self.refresh(grid);
    }

    pub fn on_resize(&mut self, grid: &GridState, width: f64, height: f64) {
        self.container.width = width.max(0.0);
        self.container.height = height.max(0.0);
        self.container.scroll_top = self.container.scroll_top.min(self.max_scroll_top(grid));
        self.container.scroll_left = self.container.scroll_left.min(self.max_scroll_left(grid));
        self.refresh(grid);
    }

    /// Store the new width in the grid, then recalculate.
    pub fn on_column_resize(&mut self, grid: &mut GridState, col: usize, width: u32) -> bool {
        let changed = grid.set_column_width(col, width);
        self.refresh(grid);
        changed
    }

    pub fn refresh(&mut self, grid: &GridState) {
        self.range = compute_visible_range(
            &self.container,
            grid.column_widths(),
            grid.get_rows_count(),
            self.row_height,
            self.render_ahead,
        );
    }

    /// Scroll the least amount needed to bring a cell fully on screen.
    pub fn ensure_visible(&mut self, grid: &GridState, row: usize, col: usize) {
        let Container {
            mut scroll_top,
            mut scroll_left,
            width,
            height,
        } = self.container;

        let top = row as f64 * self.row_height;
        let bottom = top + self.row_height;
        if top < scroll_top {
            scroll_top = top;
        } else if bottom > scroll_top + height {
            scroll_top = (bottom - height).min(top);
        }

        let widths = grid.column_widths();
        if col < widths.len() {
            let left: f64 = widths[..col].iter().map(|w| f64::from(*w)).sum();
            let right = left + f64::from(widths[col]);
            if left < scroll_left {
                scroll_left = left;
            } else if right > scroll_left + width {
                scroll_left = (right - width).min(left);
            }
        }

        self.on_scroll(grid, scroll_top, scroll_left);
    }

    fn max_scroll_top(&self, grid: &GridState) -> f64 {
        (grid.get_rows_count() as f64 * self.row_height - self.container.height).max(0.0)
    }

    fn max_scroll_left(&self, grid: &GridState) -> f64 {
        let total: f64 = grid.column_widths().iter().map(|w| f64::from(*w)).sum();
        (total - self.container.width).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellValue, ColumnInfo, ColumnType, RowValues};

    fn grid(rows: usize, cols: usize) -> GridState {
        let columns = (0..cols)
            .map(|c| ColumnInfo::new(format!("c{c}"), ColumnType::Integer))
            .collect();
        let rows = (0..rows)
            .map(|r| RowValues::from([("c0".to_string(), CellValue::Integer(r as i64))]))
            .collect();
        GridState::new(columns, rows, &GridConfig::default())
    }

    #[test]
    fn resize_and_scroll_recalculate() {
        let g = grid(1000, 10);
        let mut ctl = RecalcController::new(20.0, 2);
        ctl.on_resize(&g, 300.0, 200.0);
        assert_eq!(ctl.visible_range().rows(), 0..12);
        assert_eq!(ctl.visible_range().columns(), 0..3);

        ctl.on_scroll(&g, 2000.0, 450.0);
        let r = ctl.visible_range();
        assert_eq!(r.rows(), 97..109);
        assert_eq!(r.columns(), 3..8);
    }

    #[test]
    fn scroll_is_clamped_to_content() {
        let g = grid(10, 2);
        let mut ctl = RecalcController::new(20.0, 0);
        ctl.on_resize(&g, 150.0, 100.0);
        ctl.on_scroll(&g, 10_000.0, 10_000.0);
        assert_eq!(ctl.container().scroll_top, 100.0);
        assert_eq!(ctl.container().scroll_left, 50.0);
        assert_eq!(ctl.visible_range().row_end, 10);
    }

    #[test]
    fn column_resize_writes_width_before_recalculating() {
        let mut g = grid(5, 4);
        let mut ctl = RecalcController::new(20.0, 0);
        ctl.on_resize(&g, 250.0, 100.0);
        assert_eq!(ctl.visible_range().columns(), 0..3);
        assert!(ctl.on_column_resize(&mut g, 0, 300));
        assert_eq!(g.column_width(0), 300);
        assert_eq!(ctl.visible_range().columns(), 0..1);
    }

    #[test]
    fn ensure_visible_scrolls_minimally() {
        let g = grid(100, 10);
        let mut ctl = RecalcController::new(20.0, 0);
        ctl.on_resize(&g, 300.0, 100.0);
        ctl.ensure_visible(&g, 10, 5);
        assert_eq!(ctl.container().scroll_top, 120.0);
        assert_eq!(ctl.container().scroll_left, 300.0);
        assert_eq!(ctl.visible_range().rows(), 5..10);
        assert!(ctl.visible_range().columns().contains(&5));

        ctl.ensure_visible(&g, 2, 0);
        assert_eq!(ctl.container().scroll_top, 40.0);
        assert_eq!(ctl.container().scroll_left, 0.0);
    }
}
