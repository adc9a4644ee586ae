use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Row};
use tracing::{debug, info, warn};

use sqlite_grid::grid::{
    CellValue, ChangeKey, ColumnInfo, ColumnType, CommittedRow, RowRecord, RowValues,
};

/// Synthetic column carrying SQLite's rowid; every loaded page starts with it.
pub const ROWID_COLUMN: &str = "__rowid__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug)]
pub enum DBRequest {
    LoadSchema,
    LoadTable {
        table: String,
        page: usize,
        page_size: usize,
        /// Optional case-insensitive substring filter across all columns
        filter: Option<String>,
        /// Optional sort column (column name or "__rowid__")
        sort_by: Option<String>,
        /// Optional sort direction (defaults to Asc when Some(sort_by) and None here)
        sort_dir: Option<SortDir>,
    },
    /// Persist a grid's pending changes in one transaction
    CommitChanges {
        table: String,
        changes: Vec<RowChange>,
    },
}

#[derive(Debug)]
pub enum DBResponse {
    Schema {
        tables: Vec<String>,
    },
    TableData {
        table: String,
        columns: Vec<ColumnInfo>,
        rows: Vec<RowValues>,
        page: usize,
        total_rows: Option<usize>,
    },
    ChangesCommitted {
        ok: bool,
        committed: Vec<CommittedRow>,
        message: Option<String>,
    },
    Error(String),
}

/// Owned snapshot of one ledger row, ready to cross to the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert {
        key: ChangeKey,
        values: Vec<(String, CellValue)>,
    },
    Update {
        key: ChangeKey,
        rowid: i64,
        values: Vec<(String, CellValue)>,
    },
    Delete {
        key: ChangeKey,
        rowid: i64,
    },
}

impl RowChange {
    /// Statement kind follows the row's state: new rows insert, removed rows delete,
    /// everything else updates. Rows without a rowid cannot be addressed and are skipped.
    pub fn from_record(rec: &RowRecord) -> Option<Self> {
        let key = rec.change_key()?;
        let pending = || {
            let mut values: Vec<(String, CellValue)> = rec
                .change()
                .into_iter()
                .flatten()
                .filter(|(name, _)| name.as_str() != ROWID_COLUMN)
                .map(|(name, v)| (name.clone(), v.clone()))
                .collect();
            values.sort_by(|a, b| a.0.cmp(&b.0));
            values
        };
        if rec.is_new_row() {
            if rec.is_removed() {
                return None;
            }
            return Some(RowChange::Insert {
                key,
                values: pending(),
            });
        }
        let rowid = match rec.raw_value(ROWID_COLUMN) {
            CellValue::Integer(id) => *id,
            _ => return None,
        };
        if rec.is_removed() {
            Some(RowChange::Delete { key, rowid })
        } else {
            Some(RowChange::Update {
                key,
                rowid,
                values: pending(),
            })
        }
    }
}

pub fn start_db_worker(path: String, req_rx: Receiver<DBRequest>, resp_tx: Sender<DBResponse>) {
    let mut conn = match Connection::open(&path) {
        Ok(c) => c,
        Err(e) => {
            warn!(%path, error = %e, "failed to open database");
            let _ = resp_tx.send(DBResponse::Error(format!("Failed to open DB: {e}")));
            return;
        }
    };
    info!(%path, "database opened");

    // safemode: faster reading
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");

    while let Ok(req) = req_rx.recv() {
        let resp = handle_request(&mut conn, req).unwrap_or_else(|e| {
            warn!(error = %e, "request failed");
            DBResponse::Error(e.to_string())
        });
        if resp_tx.send(resp).is_err() {
            break;
        }
    }
    debug!("db worker stopped");
}

pub fn handle_request(conn: &mut Connection, req: DBRequest) -> Result<DBResponse> {
    match req {
        DBRequest::LoadSchema => load_schema(conn).map(|tables| DBResponse::Schema { tables }),
        DBRequest::LoadTable {
            table,
            page,
            page_size,
            filter,
            sort_by,
            sort_dir,
        } => {
            let params = LoadTableParams {
                table,
                page,
                page_size,
                filter,
                sort_by,
                sort_dir,
            };
            load_table(conn, &params)
        }
        DBRequest::CommitChanges { table, changes } => {
            Ok(match commit_changes(conn, &table, &changes) {
                Ok((committed, ignored_defaults)) => {
                    info!(%table, rows = changes.len(), ignored_defaults, "changes committed");
                    DBResponse::ChangesCommitted {
                        ok: true,
                        committed,
                        message: (ignored_defaults > 0).then(|| {
                            format!("DEFAULT ignored for {ignored_defaults} cell(s) of existing rows")
                        }),
                    }
                }
                Err(e) => {
                    warn!(%table, error = %e, "commit rolled back");
                    DBResponse::ChangesCommitted {
                        ok: false,
                        committed: Vec::new(),
                        message: Some(e.to_string()),
                    }
                }
            })
        }
    }
}

fn load_schema(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

struct LoadTableParams {
    table: String,
    page: usize,
    page_size: usize,
    filter: Option<String>,
    sort_by: Option<String>,
    sort_dir: Option<SortDir>,
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let decl: Option<String> = row.get(2)?;
        let pk: i64 = row.get(5)?;
        out.push(ColumnInfo {
            name,
            declared_type: ColumnType::from_declared(decl.as_deref().unwrap_or_default()),
            primary_key: pk > 0,
        });
    }
    Ok(out)
}

/// Case-insensitive substring match across all columns (cast to TEXT).
fn filter_clause(cols: &[ColumnInfo], filter: Option<&str>) -> (String, Vec<Value>) {
    let Some(f) = filter else {
        return (String::new(), Vec::new());
    };
    if cols.is_empty() {
        return (String::new(), Vec::new());
    }
    let pat = format!("%{}%", f.to_lowercase());
    let ors = cols
        .iter()
        .map(|c| format!("LOWER(CAST({} AS TEXT)) LIKE ?", ident(&c.name)))
        .collect::<Vec<_>>()
        .join(" OR ");
    let params = cols.iter().map(|_| Value::Text(pat.clone())).collect();
    (format!(" WHERE {ors}"), params)
}

fn order_clause(cols: &[ColumnInfo], sort_by: Option<&str>, sort_dir: Option<SortDir>) -> String {
    let Some(col) = sort_by else {
        return String::new();
    };
    let name = if col == ROWID_COLUMN {
        ROWID_COLUMN.to_string()
    } else if cols.iter().any(|c| c.name == col) {
        ident(col)
    } else {
        return String::new();
    };
    let dir = match sort_dir.unwrap_or(SortDir::Asc) {
        SortDir::Asc => "ASC",
        SortDir::Desc => "DESC",
    };
    format!(" ORDER BY {name} {dir}")
}

fn load_table(conn: &Connection, p: &LoadTableParams) -> Result<DBResponse> {
    let table = p.table.as_str();
    let cols = table_columns(conn, table)?;
    let (where_sql, where_params) = filter_clause(&cols, p.filter.as_deref());
    let order_sql = order_clause(&cols, p.sort_by.as_deref(), p.sort_dir);

    let select_list = std::iter::once(format!("rowid AS {ROWID_COLUMN}"))
        .chain(cols.iter().map(|c| ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {select_list} FROM {}{where_sql}{order_sql} LIMIT ? OFFSET ?",
        ident(table)
    );
    let mut data_stmt = conn.prepare(&sql)?;

    let mut all_params = where_params.clone();
    all_params.push(Value::Integer(p.page_size as i64));
    all_params.push(Value::Integer(p.page.saturating_mul(p.page_size) as i64));

    let mut columns = Vec::with_capacity(cols.len() + 1);
    columns.push(ColumnInfo::new(ROWID_COLUMN, ColumnType::Integer).primary_key());
    columns.extend(cols);
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    let rows = data_stmt
        .query_map(rusqlite::params_from_iter(all_params.iter()), |row| {
            row_to_values(row, &names)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    // total count (optional; can be expensive on very large tables)
    let count_sql = format!("SELECT COUNT(*) FROM {}{where_sql}", ident(table));
    let total_rows = conn
        .query_row(
            &count_sql,
            rusqlite::params_from_iter(where_params.iter()),
            |row| row.get::<_, i64>(0),
        )
        .ok()
        .map(|n| n as usize);

    debug!(table, page = p.page, rows = rows.len(), "page loaded");
    Ok(DBResponse::TableData {
        table: table.to_string(),
        columns,
        rows,
        page: p.page,
        total_rows,
    })
}

/// Run every change in one transaction. Any failure rolls the whole batch back.
fn commit_changes(
    conn: &mut Connection,
    table: &str,
    changes: &[RowChange],
) -> Result<(Vec<CommittedRow>, usize)> {
    let tx = conn.transaction()?;
    let mut committed = Vec::with_capacity(changes.len());
    let mut ignored_defaults = 0;
    for change in changes {
        match change {
            RowChange::Insert { key, values } => {
                let explicit: Vec<&(String, CellValue)> = values
                    .iter()
                    .filter(|(_, v)| *v != CellValue::Default)
                    .collect();
                if explicit.is_empty() {
                    tx.execute(&format!("INSERT INTO {} DEFAULT VALUES", ident(table)), [])?;
                } else {
                    let names = explicit
                        .iter()
                        .map(|(n, _)| ident(n))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let marks = vec!["?"; explicit.len()].join(", ");
                    tx.execute(
                        &format!("INSERT INTO {} ({names}) VALUES ({marks})", ident(table)),
                        rusqlite::params_from_iter(explicit.iter().map(|(_, v)| to_sql_value(v))),
                    )?;
                }
                let rowid = tx.last_insert_rowid();
                committed.push(CommittedRow {
                    key: *key,
                    values: reload_row(&tx, table, rowid)?,
                });
            }
            RowChange::Update { key, rowid, values } => {
                let explicit: Vec<&(String, CellValue)> = values
                    .iter()
                    .filter(|(_, v)| *v != CellValue::Default)
                    .collect();
                if explicit.len() != values.len() {
                    // UPDATE has no DEFAULT keyword in SQLite
                    warn!(table, rowid, "DEFAULT ignored for existing row");
                    ignored_defaults += values.len() - explicit.len();
                }
                if !explicit.is_empty() {
                    let sets = explicit
                        .iter()
                        .map(|(n, _)| format!("{} = ?", ident(n)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let params = explicit
                        .iter()
                        .map(|(_, v)| to_sql_value(v))
                        .chain(std::iter::once(Value::Integer(*rowid)));
                    tx.execute(
                        &format!("UPDATE {} SET {sets} WHERE rowid = ?", ident(table)),
                        rusqlite::params_from_iter(params),
                    )?;
                }
                committed.push(CommittedRow {
                    key: *key,
                    values: reload_row(&tx, table, *rowid)?,
                });
            }
            RowChange::Delete { rowid, .. } => {
                tx.execute(
                    &format!("DELETE FROM {} WHERE rowid = ?1", ident(table)),
                    [rowid],
                )?;
            }
        }
    }
    tx.commit()?;
    Ok((committed, ignored_defaults))
}

/// Read a row back so values filled in by the database reach the grid.
fn reload_row(conn: &Connection, table: &str, rowid: i64) -> Result<RowValues> {
    let mut stmt = conn.prepare(&format!(
        "SELECT rowid AS {ROWID_COLUMN}, * FROM {} WHERE rowid = ?1",
        ident(table)
    ))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let values = stmt.query_row([rowid], |row| row_to_values(row, &names))?;
    Ok(values)
}

fn row_to_values(row: &Row, names: &[&str]) -> rusqlite::Result<RowValues> {
    let mut out = RowValues::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        out.insert((*name).to_string(), from_sql_value(row.get_ref(i)?));
    }
    Ok(out)
}

fn from_sql_value(v: ValueRef<'_>) -> CellValue {
    match v {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Real(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
    }
}

fn to_sql_value(v: &CellValue) -> Value {
    match v {
        CellValue::Default | CellValue::Null => Value::Null,
        CellValue::Integer(i) => Value::Integer(*i),
        CellValue::Real(f) => Value::Real(*f),
        CellValue::Text(t) => Value::Text(t.clone()),
        CellValue::Blob(b) => Value::Blob(b.clone()),
    }
}

// Quote identifiers with double-quotes, and escape inner quotes
fn ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}
