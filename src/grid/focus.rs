#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Focus and edit mode. Edit mode only exists on a focused cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Unfocused,
    View(CellPos),
    Edit(CellPos),
}

impl FocusState {
    pub fn cell(&self) -> Option<CellPos> {
        match *self {
            FocusState::Unfocused => None,
            FocusState::View(pos) | FocusState::Edit(pos) => Some(pos),
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, FocusState::Edit(_))
    }

    pub fn is_editing_cell(&self, row: usize, col: usize) -> bool {
        *self == FocusState::Edit(CellPos::new(row, col))
    }

    pub(crate) fn to_view(self) -> Self {
        match self {
            FocusState::Edit(pos) => FocusState::View(pos),
            other => other,
        }
    }

    /// Same mode on another row.
    pub(crate) fn with_row(self, row: usize) -> Self {
        match self {
            FocusState::Unfocused => FocusState::Unfocused,
            FocusState::View(pos) => FocusState::View(CellPos::new(row, pos.col)),
            FocusState::Edit(pos) => FocusState::Edit(CellPos::new(row, pos.col)),
        }
    }
}
