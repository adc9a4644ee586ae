use crate::app::{App, Pane};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
};
use sqlite_grid::grid::{CHAR_WIDTH, GridState};

const HELP: &[(&str, &str)] = &[
    ("Tab", "switch tables/data pane"),
    ("Enter", "open table / edit cell"),
    ("arrows, h j k l", "move"),
    ("PgUp/PgDn", "previous/next page"),
    ("e", "edit cell"),
    ("Ctrl-d / Ctrl-t", "set NULL / DEFAULT while editing"),
    ("i / d", "insert row / remove row"),
    ("w / x", "commit / discard changes"),
    ("space / V", "toggle row / select range"),
    ("c / C", "copy cell / copy rows"),
    ("+ / -", "column wider / narrower"),
    ("/", "filter"),
    ("s / S", "cycle sort / flip direction"),
    ("v", "cell viewer"),
    ("r", "reload"),
    ("q", "quit"),
];

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)].as_ref())
        .split(f.size());

    let top = chunks[0];
    let status_area = chunks[1];

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(10)].as_ref())
        .split(top);

    let data_area = if app.show_cell_viewer {
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(6)].as_ref())
            .split(body_chunks[1]);
        draw_cell_viewer(f, split[1], app);
        split[0]
    } else {
        body_chunks[1]
    };

    draw_tables(f, body_chunks[0], app);
    draw_data(f, data_area, app);
    draw_status(f, status_area, app);
    if app.show_help {
        draw_help(f, f.size());
    }
}

fn pane_block(title: String, active: bool) -> Block<'static> {
    let style = if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn draw_tables(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .tables
        .iter()
        .map(|t| ListItem::new(t.clone()))
        .collect();

    let list = List::new(items)
        .block(pane_block("Tables".into(), app.pane == Pane::Tables))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .fg(Color::Yellow),
        );

    f.render_stateful_widget(list, area, &mut list_state(app));
}

fn list_state(app: &App) -> ratatui::widgets::ListState {
    let mut st = ratatui::widgets::ListState::default();
    if !app.tables.is_empty() {
        st.select(Some(app.selected_table));
    }
    st
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = if app.is_editing() { "EDIT" } else { "NORMAL" };
    let mut spans = vec![Span::styled(
        format!("[{mode}] "),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    let pending = app.pending_changes();
    if pending > 0 {
        spans.push(Span::styled(
            format!("{pending} pending "),
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.push(Span::raw(app.status.as_str()));
    if let Some(buf) = &app.filter_input {
        spans.push(Span::raw(format!(" | filter: {buf}_")));
    }
    if app.is_editing() {
        spans.push(Span::raw(format!(" | {}", app.edit_buffer)));
    }
    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_cell_viewer(f: &mut Frame, area: Rect, app: &App) {
    let text = app.current_cell_text().unwrap_or_default();
    let p = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Cell"));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let width = 56.min(area.width);
    let height = (HELP.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(
                    format!("{keys:>18}  "),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(*what),
            ])
        })
        .collect();
    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Keys")),
        popup,
    );
}

fn draw_data(f: &mut Frame, area: Rect, app: &mut App) {
    let title = match (&app.loaded_table, app.total_rows) {
        (Some(t), Some(total)) => format!("{t} - page {} of ~{total} rows", app.page + 1),
        (Some(t), None) => format!("{t} - page {}", app.page + 1),
        _ => "Data".to_string(),
    };
    let block = pane_block(title, app.pane == Pane::Data);
    let inner = block.inner(area);
    // one line goes to the header row
    app.set_viewport(inner.width, inner.height.saturating_sub(1));

    let Some(grid) = app.grid.as_ref() else {
        let p = Paragraph::new("Select a table and press Enter").block(block);
        f.render_widget(p, area);
        return;
    };
    if grid.get_header_count() == 0 {
        f.render_widget(Paragraph::new("No columns").block(block), area);
        return;
    }

    let cols = on_screen_columns(app, grid);
    let rows_on_screen = usize::from(inner.height.saturating_sub(1));
    let range = app.recalc.visible_range();
    let first_row = (app.recalc.container().scroll_top / app.recalc.row_height()).floor() as usize;

    let headers = grid.get_headers();
    let header = Row::new(cols.iter().map(|&c| {
        let h = &headers[c];
        let label = match h.icon {
            Some(icon) => format!("{icon} {}", h.name),
            None => h.name.clone(),
        };
        Cell::from(label)
    }))
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let focus = grid.focus();
    let mut rows = Vec::with_capacity(rows_on_screen);
    // once scrolled, the window stops one row short of the bottom edge
    let last_row = (range.row_end + 1).min(grid.get_rows_count());
    for r in (range.row_start..last_row)
        .filter(|&r| r >= first_row)
        .take(rows_on_screen)
    {
        let mut row_style = Style::default();
        if grid.is_removed_row(r) {
            row_style = row_style
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT);
        } else if grid.is_new_row(r) {
            row_style = row_style.fg(Color::Green);
        }
        if grid.is_row_selected(r) {
            row_style = row_style.add_modifier(Modifier::REVERSED);
        }

        let cells = cols.iter().map(|&c| {
            if focus.is_editing_cell(r, c) {
                return Cell::from(app.edit_buffer.clone()).style(
                    Style::default()
                        .bg(Color::Blue)
                        .fg(Color::White)
                        .add_modifier(Modifier::UNDERLINED),
                );
            }
            let mut cell = Cell::from(grid.get_value(r, c).to_string());
            if grid.has_cell_change(r, c) {
                cell = cell.style(Style::default().fg(Color::Yellow));
            }
            if focus.cell().is_some_and(|p| p.row == r && p.col == c) {
                cell = cell.style(Style::default().bg(Color::Blue).fg(Color::Black));
            }
            cell
        });
        rows.push(Row::new(cells).style(row_style));
    }

    let widths = column_widths(grid, &cols);
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .column_spacing(1);

    f.render_widget(table, area);
}

/// Columns of the visible range whose right edge lies past the horizontal scroll
/// offset; the range itself starts one column early.
fn on_screen_columns(app: &App, grid: &GridState) -> Vec<usize> {
    let range = app.recalc.visible_range();
    let widths = grid.column_widths();
    let scroll_left = app.recalc.container().scroll_left;
    let mut edge: f64 = widths[..range.col_start]
        .iter()
        .map(|w| f64::from(*w))
        .sum();
    let mut out = Vec::new();
    for c in range.columns() {
        edge += f64::from(widths[c]);
        if edge > scroll_left {
            out.push(c);
        }
    }
    out
}

fn column_widths(grid: &GridState, cols: &[usize]) -> Vec<Constraint> {
    cols.iter()
        .map(|&c| {
            let chars = (grid.column_width(c) / CHAR_WIDTH).max(1);
            Constraint::Length(u16::try_from(chars).unwrap_or(u16::MAX))
        })
        .collect()
}
