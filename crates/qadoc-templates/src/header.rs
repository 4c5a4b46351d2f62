//! Header row discovery.
//!
//! Templates are edited by people, so the header row may be moved, reworded or partially
//! damaged. The resolver scores the first rows of the sheet against the expected labels, maps
//! columns by label when it finds a header, and degrades to the static layout when it does not.
//! It never fails.

use qadoc_model::text::{labels_match, loosely_matches};
use qadoc_model::CellRef;
use qadoc_xlsx::{SharedStringTable, Worksheet};

use crate::kind::{ColumnSpec, TemplateLayout};

/// Where the data block of a sheet lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderResolution {
    /// The recognised header row, if any.
    pub header_row: Option<u32>,
    /// Row the first record is written to.
    pub data_start_row: u32,
    /// First row that already holds data, for diagnostics.
    pub first_data_row: Option<u32>,
    /// Sheet column (0-based) of each schema column, in schema order.
    pub columns: Vec<u32>,
    /// Effective header label of each schema column.
    pub headers: Vec<String>,
}

impl HeaderResolution {
    /// Sheet columns covered by the data block, lowest to highest.
    pub fn column_span(&self) -> Option<(u32, u32)> {
        let min = self.columns.iter().min()?;
        let max = self.columns.iter().max()?;
        Some((*min, *max))
    }
}

/// Number of header matches a row needs: every label but one.
pub(crate) fn header_threshold(layout: &TemplateLayout) -> usize {
    layout.columns.len().saturating_sub(1).max(1)
}

fn names_column(text: &str, column: &ColumnSpec) -> bool {
    column.names().any(|name| loosely_matches(text, name))
}

/// How many expected labels are matched by some cell text. Each label counts once, and a row
/// never scores more than its number of matching cells, so one sentence naming several labels
/// counts as a single hit.
pub(crate) fn header_score(texts: &[String], layout: &TemplateLayout) -> usize {
    let labels = layout
        .columns
        .iter()
        .filter(|column| texts.iter().any(|text| names_column(text, column)))
        .count();
    let cells = texts
        .iter()
        .filter(|text| layout.columns.iter().any(|column| names_column(text, column)))
        .count();
    labels.min(cells)
}

/// Stricter check used when reading data back: a row repeating the header labels (by variant
/// match, not containment) is not data.
pub(crate) fn repeats_header(texts: &[String], layout: &TemplateLayout) -> bool {
    let hits = layout
        .columns
        .iter()
        .filter(|column| {
            texts
                .iter()
                .any(|text| column.names().any(|name| labels_match(text, name)))
        })
        .count();
    hits >= header_threshold(layout)
}

/// Rows scanned for a header: twice the default header row.
pub fn header_lookahead(layout: &TemplateLayout) -> u32 {
    layout.default_start_row.saturating_sub(1).max(1).saturating_mul(2)
}

/// Non-empty `(column, text)` pairs of `row`, leaving out `excluded` cells.
fn row_texts(
    sheet: &Worksheet,
    strings: &SharedStringTable,
    row: u32,
    excluded: &[CellRef],
) -> Vec<(u32, String)> {
    let Some(cells) = sheet.row(row) else {
        return Vec::new();
    };
    cells
        .cells
        .keys()
        .filter(|col| !excluded.contains(&CellRef::new(row, **col)))
        .filter_map(|col| {
            let text = sheet.cell_text(CellRef::new(row, *col), strings);
            (!text.trim().is_empty()).then_some((*col, text))
        })
        .collect()
}

pub fn resolve_header(
    sheet: &Worksheet,
    strings: &SharedStringTable,
    layout: &TemplateLayout,
) -> HeaderResolution {
    resolve_header_excluding(sheet, strings, layout, &[])
}

/// [`resolve_header`] that ignores the text of `excluded` cells, such as a free-form overview
/// cell that may quote the column labels.
pub fn resolve_header_excluding(
    sheet: &Worksheet,
    strings: &SharedStringTable,
    layout: &TemplateLayout,
    excluded: &[CellRef],
) -> HeaderResolution {
    let lookahead = header_lookahead(layout);
    let threshold = header_threshold(layout);

    for row in 1..=lookahead {
        let texts = row_texts(sheet, strings, row, excluded);
        if texts.is_empty() {
            continue;
        }
        let labels: Vec<String> = texts.iter().map(|(_, t)| t.clone()).collect();
        let score = header_score(&labels, layout);
        if score >= threshold {
            log::debug!("header row {row} matched {score}/{} labels", layout.columns.len());
            return resolution_from_header(sheet, strings, layout, row, &texts);
        }
    }

    let columns: Vec<u32> = (0..layout.columns.len() as u32).collect();
    let first_data_row = (1..=lookahead).find(|row| {
        row_texts(sheet, strings, *row, excluded)
            .iter()
            .any(|(col, text)| {
                columns.contains(col)
                    && !layout
                        .columns
                        .iter()
                        .any(|column| names_column(text, column))
            })
    });
    log::warn!(
        "no header row found in the first {lookahead} rows; writing from default row {} (first populated row: {first_data_row:?})",
        layout.default_start_row
    );

    HeaderResolution {
        header_row: None,
        data_start_row: layout.default_start_row,
        first_data_row,
        columns,
        headers: layout.columns.iter().map(|c| c.label.to_string()).collect(),
    }
}

fn resolution_from_header(
    sheet: &Worksheet,
    strings: &SharedStringTable,
    layout: &TemplateLayout,
    header_row: u32,
    texts: &[(u32, String)],
) -> HeaderResolution {
    let mut found: Vec<Option<(u32, String)>> = vec![None; layout.columns.len()];
    let mut claimed: Vec<u32> = Vec::new();

    // Variant matches first, then loose containment for whatever is left.
    let matchers: [fn(&str, &str) -> bool; 2] = [labels_match, loosely_matches];
    for matcher in matchers {
        for (col, text) in texts {
            if claimed.contains(col) {
                continue;
            }
            let hit = layout.columns.iter().enumerate().position(|(idx, column)| {
                found[idx].is_none() && column.names().any(|name| matcher(text, name))
            });
            if let Some(idx) = hit {
                found[idx] = Some((*col, text.trim().to_string()));
                claimed.push(*col);
            }
        }
    }

    let mut columns = Vec::with_capacity(found.len());
    let mut headers = Vec::with_capacity(found.len());
    for (idx, entry) in found.into_iter().enumerate() {
        match entry {
            Some((col, text)) => {
                columns.push(col);
                headers.push(text);
            }
            None => {
                let label = layout.columns[idx].label;
                log::debug!(
                    "column {label:?} not found in header row {header_row}; using position {idx}"
                );
                columns.push(idx as u32);
                headers.push(label.to_string());
            }
        }
    }

    let data_start_row = header_row + 1;
    let first_data_row = sheet
        .rows()
        .range(data_start_row..)
        .map(|(row, _)| *row)
        .find(|row| {
            columns
                .iter()
                .any(|col| !sheet.cell_text(CellRef::new(*row, *col), strings).is_empty())
        });

    HeaderResolution {
        header_row: Some(header_row),
        data_start_row,
        first_data_row,
        columns,
        headers,
    }
}
