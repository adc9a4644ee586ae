use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};
use sqlite_grid::grid::{GridConfig, ListenerOrder};
use tracing::info;

mod app;
mod db;
mod ui;

use app::{App, Pane};
use db::{DBRequest, DBResponse, start_db_worker};

#[derive(Parser, Debug)]
#[command(author, version, about = "SQLite data grid editor")]
struct Args {
    /// Path to SQLite database file
    #[arg(value_name = "DB_PATH")]
    db_path: String,

    /// Page size (rows per page)
    #[arg(short = 'n', long, default_value_t = 200)]
    page_size: usize,

    /// Open every table without editing
    #[arg(long)]
    read_only: bool,

    /// Extra rows kept rendered beyond the visible window
    #[arg(long, default_value_t = 4)]
    render_ahead: usize,

    /// Coalescing window for grid change notifications, in milliseconds
    #[arg(long, default_value_t = 16)]
    debounce_ms: u64,

    /// Write logs to this file (the terminal belongs to the UI)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level filter, e.g. "info" or "debug"
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

impl Args {
    fn grid_config(&self) -> GridConfig {
        GridConfig {
            // one terminal line per row
            row_height: 1.0,
            render_ahead: self.render_ahead,
            debounce: Duration::from_millis(self.debounce_ms),
            read_only: self.read_only,
            listener_order: ListenerOrder::NewestFirst,
            ..GridConfig::default()
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_max_level(args.log_level)
        .init();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    info!(db = %args.db_path, page_size = args.page_size, read_only = args.read_only, "starting");

    let mut terminal = setup_terminal()?;

    // DB worker channels
    let (req_tx, req_rx) = crossbeam_channel::unbounded::<DBRequest>();
    let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<DBResponse>();

    // Start DB worker
    let db_path = args.db_path.clone();
    std::thread::spawn(move || start_db_worker(db_path, req_rx, resp_tx));

    // Initialize app state
    let mut app = App::new(args.page_size, args.grid_config(), req_tx, resp_rx);
    app.request_schema_refresh();

    let res = run_app(&mut terminal, &mut app, Duration::from_millis(100));

    restore_terminal(terminal)?;
    if let Err(e) = res {
        eprintln!("Error: {e:?}");
    }
    info!("exiting");
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut filter_mode = false;
    let mut last_tick = Instant::now();
    // Redraw only when state changes or on tick
    let mut dirty = true;
    loop {
        // Process any DB responses without blocking
        while let Ok(msg) = app.resp_rx.try_recv() {
            app.handle_db_response(msg);
            dirty = true;
        }
        if app.pump_grid() {
            dirty = true;
        }

        let tick_due = last_tick.elapsed() >= tick_rate;
        if dirty || tick_due {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
            if tick_due {
                last_tick = Instant::now();
            }
        }

        // Wake up in time for a pending grid broadcast
        let mut timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));
        if let Some(due) = app.grid.as_ref().and_then(|g| g.next_broadcast_in()) {
            timeout = timeout.min(due);
        }

        if !event::poll(timeout)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                dirty = true;
                if filter_mode {
                    filter_mode = handle_key_filter(app, key);
                } else if app.is_editing() {
                    handle_key_editing(app, key);
                } else if key.code == KeyCode::Char('/') {
                    filter_mode = true;
                    app.begin_filter_input();
                    app.status = "Filter: type and Enter to apply (Esc to clear)".into();
                } else {
                    handle_key_normal(app, key);
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollDown => {
                    app.scroll_rows(1.0);
                    dirty = true;
                }
                MouseEventKind::ScrollUp => {
                    app.scroll_rows(-1.0);
                    dirty = true;
                }
                _ => {}
            },
            Event::Resize(..) => dirty = true,
            _ => {}
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Returns whether filter input stays active.
fn handle_key_filter(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Enter => {
            // Apply pending input to filter (or clear if empty)
            app.apply_filter_input();
            if !app.status.starts_with("Commit") {
                app.status = match &app.filter {
                    Some(s) => format!("Filter applied: {}", s),
                    None => "Filter cleared".into(),
                };
            }
            false
        }
        KeyCode::Esc => {
            // Cancel input and clear active filter
            app.cancel_filter_input();
            app.clear_filter();
            false
        }
        KeyCode::Backspace => {
            app.backspace_filter_input();
            true
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.update_filter_input_char(c);
            true
        }
        _ => true,
    }
}

fn handle_key_normal(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if key.code == KeyCode::Char('c') {
            app.copy_selected_rows_tsv();
        }
        return;
    }
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Tab => app.toggle_pane(),
        KeyCode::Up | KeyCode::Char('k') => {
            if app.pane == Pane::Tables {
                app.move_table_selection_up()
            } else {
                app.move_cell_up()
            }
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if app.pane == Pane::Tables {
                app.move_table_selection_down()
            } else {
                app.move_cell_down()
            }
        }
        KeyCode::Left | KeyCode::Char('h') => app.move_cell_left(),
        KeyCode::Right | KeyCode::Char('l') => app.move_cell_right(),
        KeyCode::Enter => {
            if app.pane == Pane::Tables {
                app.load_selected_table_page(0);
                app.pane = Pane::Data;
            } else {
                app.begin_edit_cell();
            }
        }
        KeyCode::PageDown => app.next_page(),
        KeyCode::PageUp => app.prev_page(),
        KeyCode::Char('e') => app.begin_edit_cell(),
        KeyCode::Char('i') => app.insert_row(),
        KeyCode::Char('d') | KeyCode::Delete => app.remove_row(),
        KeyCode::Char('w') => app.commit_changes(),
        KeyCode::Char('x') => app.discard_changes(),
        KeyCode::Char(' ') => app.toggle_row_selection(),
        KeyCode::Char('V') => app.extend_selection(),
        KeyCode::Char('r') => app.reload_current_table(),
        KeyCode::Char('s') => app.sort_cycle_on_selection(),
        KeyCode::Char('S') => app.sort_toggle_dir(),
        KeyCode::Char('c') => app.copy_current_cell_tsv(),
        KeyCode::Char('C') => app.copy_selected_rows_tsv(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.resize_current_column(true),
        KeyCode::Char('-') | KeyCode::Char('_') => app.resize_current_column(false),
        KeyCode::Char('v') => {
            app.toggle_cell_viewer();
            app.status = if app.show_cell_viewer {
                "Cell viewer: ON".into()
            } else {
                "Cell viewer: OFF".into()
            };
        }
        KeyCode::Esc => {
            if app.show_help {
                app.toggle_help();
            } else if app.filter.is_some() {
                app.clear_filter();
            } else {
                app.clear_selection();
            }
        }
        _ => {}
    }
}

fn handle_key_editing(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => app.submit_cell_edit(),
        KeyCode::Esc => app.cancel_edit_cell(),
        KeyCode::Backspace => app.edit_input_backspace(),
        KeyCode::Delete => app.edit_input_delete(),
        KeyCode::Left => app.edit_input_left(),
        KeyCode::Right => app.edit_input_right(),
        KeyCode::Home => app.edit_input_home(),
        KeyCode::End => app.edit_input_end(),
        KeyCode::Char('d') if ctrl => app.edit_set_null(),
        KeyCode::Char('t') if ctrl => app.edit_set_default(),
        // ignore control chars in insert
        KeyCode::Char(c) if !ctrl => app.edit_input_insert(c),
        _ => {}
    }
}
