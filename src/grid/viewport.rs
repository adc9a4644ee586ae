use std::ops::Range;

/// Scroll position and size of the scrolling container, in the same units as row
/// height and column widths.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Container {
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub width: f64,
    pub height: f64,
}

/// Rows and columns to render. Both ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRange {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl VisibleRange {
    pub fn rows(&self) -> Range<usize> {
        self.row_start..self.row_end
    }

    pub fn columns(&self) -> Range<usize> {
        self.col_start..self.col_end
    }

    pub fn is_empty(&self) -> bool {
        self.row_start >= self.row_end || self.col_start >= self.col_end
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows().contains(&row) && self.columns().contains(&col)
    }
}

/// Window of rows and columns covering the container plus a render-ahead margin.
///
/// Rows cost O(1); columns walk the width list once.
pub fn compute_visible_range(
    container: &Container,
    column_widths: &[u32],
    total_rows: usize,
    row_height: f64,
    render_ahead: usize,
) -> VisibleRange {
    let (row_start, row_end) = row_window(container, total_rows, row_height, render_ahead);
    let (col_start, col_end) = column_window(container, column_widths);
    VisibleRange {
        row_start,
        row_end,
        col_start,
        col_end,
    }
}

fn row_window(
    container: &Container,
    total_rows: usize,
    row_height: f64,
    render_ahead: usize,
) -> (usize, usize) {
    if total_rows == 0 || row_height.is_nan() || row_height <= 0.0 {
        return (0, 0);
    }
    let first = (container.scroll_top.max(0.0) / row_height).floor() as usize;
    let per_page = (container.height.max(0.0) / row_height).ceil() as usize;
    let start = first
        .saturating_sub(1 + render_ahead)
        .min(total_rows.saturating_sub(1));
    let end = start
        .saturating_add(per_page)
        .saturating_add(render_ahead)
        .min(total_rows);
    (start, end.max(start))
}

fn column_window(container: &Container, widths: &[u32]) -> (usize, usize) {
    if widths.is_empty() {
        return (0, 0);
    }
    let left = container.scroll_left.max(0.0);
    let right = left + container.width.max(0.0);
    let last = widths.len() - 1;

    let mut start = None;
    let mut end = None;
    let mut edge = 0.0;
    for (idx, w) in widths.iter().enumerate() {
        edge += f64::from(*w);
        if start.is_none() && edge >= left {
            start = Some(idx.saturating_sub(1));
        }
        if edge >= right {
            end = Some(idx);
            break;
        }
    }
    let start = start.unwrap_or(last);
    let end = end.unwrap_or(last).max(start);
    (start, end + 1)
}
