//! Typed worksheet model.
//!
//! A worksheet part is parsed once into [`Worksheet`] (rows, cells, merge regions, dimension),
//! mutated through its methods, and serialized back with [`Worksheet::to_xml`], which streams
//! the original markup and regenerates only `<dimension>`, `<sheetData>` and `<mergeCells>`.

mod read;
mod write;

use std::collections::BTreeMap;

use quick_xml::events::Event;

use qadoc_model::{CellRef, Range};

use crate::{SharedStringTable, XlsxError};

/// Value of a `<c>` element.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    /// `t="s"`: index into the shared-string table.
    SharedString(u32),
    /// `t="inlineStr"` with a single plain `<t>` run.
    InlineString(String),
    /// A lone `<v>` (numbers, booleans, errors, cached formula strings).
    Value { cell_type: Option<String>, raw: String },
    /// Anything else (formulas, rich inline text, extension content). The child events are
    /// replayed verbatim on save; `text` is the cached display text when one was found.
    Preserved {
        cell_type: Option<String>,
        body: Vec<Event<'static>>,
        text: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub style: Option<u32>,
    pub value: CellValue,
    /// Attributes other than `r`, `s` and `t`, as raw (escaped) key/value pairs.
    pub extra_attrs: Vec<(String, String)>,
}

impl Cell {
    pub fn styled(style: Option<u32>) -> Self {
        Self {
            style,
            value: CellValue::Empty,
            extra_attrs: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    /// Attributes other than `r` (`ht`, `customHeight`, `s`, `spans`, ...), raw.
    pub attrs: Vec<(String, String)>,
    /// Cells keyed by 0-based column.
    pub cells: BTreeMap<u32, Cell>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Worksheet {
    rows: BTreeMap<u32, Row>,
    merges: Vec<Range>,
    dimension: Option<Range>,
}

impl Worksheet {
    pub fn rows(&self) -> &BTreeMap<u32, Row> {
        &self.rows
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn merges(&self) -> &[Range] {
        &self.merges
    }

    pub fn dimension(&self) -> Option<Range> {
        self.dimension
    }

    /// Highest row number present in `<sheetData>`.
    pub fn last_row(&self) -> Option<u32> {
        self.rows.keys().next_back().copied()
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.rows.get(&at.row)?.cells.get(&at.col)
    }

    /// Display text of a cell; `""` for missing or empty cells.
    pub fn cell_text(&self, at: CellRef, strings: &SharedStringTable) -> String {
        let Some(cell) = self.cell(at) else {
            return String::new();
        };
        match &cell.value {
            CellValue::Empty => String::new(),
            CellValue::SharedString(idx) => strings.get(*idx).unwrap_or_default().to_string(),
            CellValue::InlineString(text) => text.clone(),
            CellValue::Value { raw, .. } => raw.clone(),
            CellValue::Preserved { text, .. } => text.clone().unwrap_or_default(),
        }
    }

    /// Create `row` if missing, copying the attributes of `template_row` (minus `spans`).
    pub fn ensure_row_like(&mut self, row: u32, template_row: Option<u32>) {
        if self.rows.contains_key(&row) {
            return;
        }
        let attrs = template_row
            .and_then(|t| self.rows.get(&t))
            .map(|t| {
                t.attrs
                    .iter()
                    .filter(|(k, _)| k != "spans")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.rows.insert(
            row,
            Row {
                attrs,
                cells: BTreeMap::new(),
            },
        );
    }

    /// Write `text` as an inline string.
    ///
    /// Existing cells keep their style. Missing cells are created with `new_style`; for empty
    /// `text` a missing cell is only created when there is a style to carry (merge placeholders
    /// keep their borders that way).
    pub fn set_text(&mut self, at: CellRef, text: &str, new_style: Option<u32>) {
        if text.is_empty() {
            match self.cell_mut(at) {
                Some(cell) => cell.value = CellValue::Empty,
                None if new_style.is_some() => {
                    self.rows
                        .entry(at.row)
                        .or_default()
                        .cells
                        .insert(at.col, Cell::styled(new_style));
                }
                None => {}
            }
            return;
        }

        let cell = self
            .rows
            .entry(at.row)
            .or_default()
            .cells
            .entry(at.col)
            .or_insert_with(|| Cell::styled(new_style));
        cell.value = CellValue::InlineString(text.to_string());
    }

    /// Empty the value of a cell, keeping the cell (and its style) in place.
    pub fn clear_value(&mut self, at: CellRef) {
        if let Some(cell) = self.cell_mut(at) {
            cell.value = CellValue::Empty;
        }
    }

    /// Register a merge region. Overlapping an existing region is an error.
    pub fn add_merge(&mut self, range: Range) -> Result<(), XlsxError> {
        if let Some(existing) = self.merges.iter().find(|m| m.intersects(&range)) {
            return Err(XlsxError::Invalid(format!(
                "merge {range} overlaps existing merge {existing}"
            )));
        }
        self.merges.push(range);
        Ok(())
    }

    /// Keep only the merge regions for which `keep` returns true; returns how many were removed.
    pub fn retain_merges(&mut self, mut keep: impl FnMut(&Range) -> bool) -> usize {
        let before = self.merges.len();
        self.merges.retain(|m| keep(m));
        before - self.merges.len()
    }

    /// The merge region covering `at`, if any.
    pub fn merge_at(&self, at: CellRef) -> Option<&Range> {
        self.merges.iter().find(|m| m.contains(at))
    }

    /// Grow the declared dimension so it covers `range`.
    pub fn extend_dimension(&mut self, range: Range) {
        self.dimension = Some(match self.dimension {
            Some(current) => current.union(&range),
            None => range,
        });
    }

    fn cell_mut(&mut self, at: CellRef) -> Option<&mut Cell> {
        self.rows.get_mut(&at.row)?.cells.get_mut(&at.col)
    }
}
