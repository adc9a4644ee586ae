use proptest::prelude::*;
use sqlite_grid::grid::{
    Broadcast, CellValue, ColumnInfo, ColumnType, GridConfig, GridState, RowValues,
};

fn id_name_grid() -> GridState {
    let columns = vec![
        ColumnInfo::new("id", ColumnType::Integer).primary_key(),
        ColumnInfo::new("name", ColumnType::Text),
    ];
    let rows = [(1, "a"), (2, "b"), (3, "c")]
        .into_iter()
        .map(|(id, name)| {
            RowValues::from([
                ("id".to_string(), CellValue::Integer(id)),
                ("name".to_string(), CellValue::Text(name.to_string())),
            ])
        })
        .collect();
    GridState::new(columns, rows, &GridConfig::default())
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

#[test]
fn edit_then_discard() {
    let mut grid = id_name_grid();
    grid.change_value(1, 1, text("bee"));
    assert_eq!(grid.get_value(1, 1), &text("bee"));
    assert!(grid.has_cell_change(1, 1));
    assert_eq!(grid.get_changed_rows().len(), 1);

    grid.discard_all_changes();
    assert_eq!(grid.get_value(1, 1), &text("b"));
    assert_eq!(grid.get_changed_rows().len(), 0);
    assert!(grid.check_ledger_invariant());
}

#[test]
fn remove_then_apply() {
    let mut grid = id_name_grid();
    grid.remove_row(Some(0));
    assert!(grid.is_removed_row(0));
    assert_eq!(grid.get_rows_count(), 3);
    assert_eq!(grid.get_changed_rows().len(), 1);

    grid.apply_changes(&[], Broadcast::Debounced);
    assert_eq!(grid.get_rows_count(), 2);
    assert_eq!(grid.get_value(0, 1), &text("b"));
    assert!(!grid.has_changes());
}

#[test]
fn round_trip_edit_leaves_no_trace() {
    let mut grid = id_name_grid();
    grid.change_value(2, 1, text("zzz"));
    grid.change_value(2, 1, text("c"));
    assert_eq!(grid.get_value(2, 1), &text("c"));
    assert!(!grid.has_cell_change(2, 1));
    assert!(grid.get_changed_rows().is_empty());
    assert!(grid.row(2).change_key().is_none());
}

#[test]
fn null_and_default_are_pending_values() {
    let mut grid = id_name_grid();
    grid.change_value(0, 1, CellValue::Null);
    grid.change_value(1, 1, CellValue::Default);
    assert_eq!(grid.get_value(0, 1), &CellValue::Null);
    assert_eq!(grid.get_value(1, 1), &CellValue::Default);
    assert!(grid.has_cell_change(0, 1));
    assert!(grid.has_cell_change(1, 1));
    assert_eq!(grid.changed_row_count(), 2);
}

#[test]
fn apply_with_empty_ledger_is_a_no_op() {
    let mut grid = id_name_grid();
    grid.apply_changes(&[], Broadcast::Debounced);
    assert!(!grid.is_broadcast_pending());
    assert_eq!(grid.get_rows_count(), 3);
    assert_eq!(grid.get_value(0, 1), &text("a"));
}

#[test]
fn insert_then_remove_is_symmetric() {
    let mut grid = id_name_grid();
    let before = grid.get_rows_count();
    let at = grid.insert_new_row(None).unwrap_or_default();
    assert_eq!(grid.get_rows_count(), before + 1);
    assert_eq!(grid.changed_row_count(), 1);

    grid.remove_row(Some(at));
    assert_eq!(grid.get_rows_count(), before);
    assert!(!grid.has_changes());
    assert!(grid.check_ledger_invariant());
}

#[test]
fn ledger_keys_survive_reordering() {
    let mut grid = id_name_grid();
    grid.change_value(2, 1, text("sea"));
    let key = grid.row(2).change_key();
    grid.insert_new_row(Some(0));
    grid.insert_new_row(Some(0));
    assert_eq!(grid.row(4).change_key(), key);
    assert_eq!(grid.get_value(4, 1), &text("sea"));

    let changed: Vec<_> = grid.get_changed_rows().iter().map(|r| r.is_new_row()).collect();
    assert_eq!(changed, vec![false, true, true]);
}

#[test]
fn discard_restores_removed_rows_and_drops_new_ones() {
    let mut grid = id_name_grid();
    grid.remove_row(Some(1));
    grid.insert_new_row(Some(3));
    grid.change_value(3, 1, text("new"));
    grid.discard_all_changes();
    assert_eq!(grid.get_rows_count(), 3);
    assert!(!grid.is_removed_row(1));
    assert!(!grid.has_changes());
}

#[derive(Debug, Clone)]
enum Op {
    Change(usize, usize, u8),
    Revert(usize, usize),
    Insert(Option<usize>),
    Remove(Option<usize>),
    Focus(usize, usize),
    Apply,
    Discard,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..8, 0usize..2, 0u8..4).prop_map(|(r, c, v)| Op::Change(r, c, v)),
        2 => (0usize..8, 0usize..2).prop_map(|(r, c)| Op::Revert(r, c)),
        2 => proptest::option::of(0usize..8).prop_map(Op::Insert),
        2 => proptest::option::of(0usize..8).prop_map(Op::Remove),
        1 => (0usize..8, 0usize..2).prop_map(|(r, c)| Op::Focus(r, c)),
        1 => Just(Op::Apply),
        1 => Just(Op::Discard),
    ]
}

proptest! {
    #[test]
    fn ledger_matches_changed_rows(ops in proptest::collection::vec(op(), 1..60)) {
        let mut grid = id_name_grid();
        for op in ops {
            let rows = grid.get_rows_count();
            match op {
                Op::Change(r, c, v) if rows > 0 => {
                    let value = match v {
                        0 => CellValue::Null,
                        1 => CellValue::Default,
                        2 => CellValue::Integer(i64::from(v)),
                        _ => text("x"),
                    };
                    grid.change_value(r % rows, c, value);
                }
                Op::Revert(r, c) if rows > 0 => {
                    let row = r % rows;
                    let name = grid.get_headers()[c].name.clone();
                    let original = grid.row(row).raw_value(&name).clone();
                    grid.change_value(row, c, original.clone());
                    prop_assert_eq!(grid.get_value(row, c), &original);
                    prop_assert!(!grid.has_cell_change(row, c));
                }
                Op::Insert(at) => {
                    grid.insert_new_row(at);
                }
                Op::Remove(at) => grid.remove_row(at),
                Op::Focus(r, c) if rows > 0 => grid.set_focus(r % rows, c),
                Op::Apply => grid.apply_changes(&[], Broadcast::Debounced),
                Op::Discard => grid.discard_all_changes(),
                _ => {}
            }
            prop_assert!(grid.check_ledger_invariant());
            let expected = (0..grid.get_rows_count())
                .filter(|&r| {
                    let rec = grid.row(r);
                    rec.is_new_row()
                        || rec.is_removed()
                        || rec.change().is_some_and(|c| !c.is_empty())
                })
                .count();
            prop_assert_eq!(grid.changed_row_count(), expected);
            let keyed = (0..grid.get_rows_count())
                .filter(|&r| grid.row(r).change_key().is_some())
                .count();
            prop_assert_eq!(keyed, expected);
        }
    }
}
