//! Writing a block of records with vertically merged hierarchy columns.

use qadoc_model::{CellRef, DataRecord, Range};
use qadoc_xlsx::{Worksheet, XlsxError};

use crate::header::HeaderResolution;
use crate::kind::TemplateLayout;

/// How repeated hierarchy values are grouped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergePolicy {
    /// Treat two consecutive blank values as equal (and merge them).
    pub merge_blank_values: bool,
}

/// Consecutive records sharing one merged cell, by record index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowGroup {
    pub start: usize,
    pub len: usize,
}

impl RowGroup {
    pub fn end(&self) -> usize {
        self.start + self.len - 1
    }
}

/// Group `values` into runs of equal values.
///
/// A run also ends wherever `parent_breaks` marks the start of a new group in a more
/// significant column. Returns the groups and the break vector for the next column.
pub fn group_rows(
    values: &[&str],
    parent_breaks: &[bool],
    policy: MergePolicy,
) -> (Vec<RowGroup>, Vec<bool>) {
    let mut breaks = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        let starts_group = idx == 0
            || parent_breaks.get(idx).copied().unwrap_or(false)
            || values[idx - 1] != *value
            || (value.is_empty() && !policy.merge_blank_values);
        breaks.push(starts_group);
    }

    let mut groups: Vec<RowGroup> = Vec::new();
    for (idx, starts_group) in breaks.iter().enumerate() {
        match groups.last_mut() {
            Some(group) if !starts_group => group.len += 1,
            _ => groups.push(RowGroup { start: idx, len: 1 }),
        }
    }
    (groups, breaks)
}

/// What [`write_block`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub start_row: u32,
    pub rows_written: usize,
    /// Rows of a previous, longer block that were emptied.
    pub rows_cleared: usize,
    pub merges_removed: usize,
    pub merges: Vec<Range>,
}

/// Last row of the data block currently in the sheet, at or after `start`.
fn previous_block_end(
    sheet: &Worksheet,
    resolution: &HeaderResolution,
    start: u32,
    hier: Option<(u32, u32)>,
) -> Option<u32> {
    let last_value_row = sheet
        .rows()
        .range(start..)
        .rev()
        .find(|(_, row)| {
            resolution.columns.iter().any(|col| {
                row.cells
                    .get(col)
                    .is_some_and(|cell| !matches!(cell.value, qadoc_xlsx::CellValue::Empty))
            })
        })
        .map(|(row, _)| *row);

    let last_merge_row = hier.and_then(|(lo, hi)| {
        sheet
            .merges()
            .iter()
            .filter(|m| m.end.row >= start && m.start.col <= hi && m.end.col >= lo)
            .map(|m| m.end.row)
            .max()
    });

    last_value_row.max(last_merge_row)
}

/// Write `records` starting at `resolution.data_start_row`.
///
/// Every existing merge in the hierarchy column span that intersects the old or new block is
/// removed; hierarchy columns are re-merged per [`group_rows`]. Rows of the previous block past
/// the last record are emptied. New cells take the style of the same column in the start row,
/// new rows copy the start row's attributes.
pub fn write_block(
    sheet: &mut Worksheet,
    resolution: &HeaderResolution,
    layout: &TemplateLayout,
    records: &[DataRecord],
    policy: MergePolicy,
) -> Result<BlockSummary, XlsxError> {
    let start = resolution.data_start_row;
    let hierarchy = layout.hierarchy_indices();
    let hier_cols: Vec<u32> = hierarchy.iter().map(|idx| resolution.columns[*idx]).collect();
    let hier_span = hier_cols
        .iter()
        .min()
        .zip(hier_cols.iter().max())
        .map(|(lo, hi)| (*lo, *hi));

    let count = u32::try_from(records.len())
        .ok()
        .filter(|n| start.saturating_add(*n) <= qadoc_model::EXCEL_MAX_ROWS + 1)
        .ok_or_else(|| {
            XlsxError::Invalid(format!(
                "{} records starting at row {start} do not fit in a worksheet",
                records.len()
            ))
        })?;
    let new_end = (count > 0).then(|| start + count - 1);
    let old_end = previous_block_end(sheet, resolution, start, hier_span);
    let block_end = new_end.max(old_end);

    let mut summary = BlockSummary {
        start_row: start,
        rows_written: records.len(),
        ..BlockSummary::default()
    };

    if let (Some((lo, hi)), Some(end)) = (hier_span, block_end) {
        let block = Range::new(CellRef::new(start, lo), CellRef::new(end, hi));
        summary.merges_removed = sheet.retain_merges(|m| !m.intersects(&block));
    }

    let styles: Vec<Option<u32>> = resolution
        .columns
        .iter()
        .map(|col| sheet.cell(CellRef::new(start, *col)).and_then(|c| c.style))
        .collect();
    let template_row = sheet.row(start).is_some().then_some(start);

    // Record index -> "first row of its group" per schema column.
    let mut group_tops: Vec<Option<Vec<bool>>> = vec![None; layout.columns.len()];
    let mut parent_breaks = vec![false; records.len()];
    for idx in &hierarchy {
        let values: Vec<&str> = records.iter().map(|r| layout.value_of(r, *idx)).collect();
        let (groups, breaks) = group_rows(&values, &parent_breaks, policy);
        let col = resolution.columns[*idx];
        for group in groups.iter().filter(|g| g.len > 1) {
            let top = start + group.start as u32;
            let range = Range::vertical(col, top, top + group.len as u32 - 1);
            sheet.add_merge(range)?;
            summary.merges.push(range);
        }
        group_tops[*idx] = Some(breaks.clone());
        parent_breaks = breaks;
    }

    let sequence_idx = layout.sequence_column.and_then(|label| layout.column_index(label));
    for (offset, record) in records.iter().enumerate() {
        let row = start + offset as u32;
        sheet.ensure_row_like(row, template_row);
        for (idx, col) in resolution.columns.iter().enumerate() {
            let sequence;
            let value = if Some(idx) == sequence_idx {
                sequence = (offset + 1).to_string();
                sequence.as_str()
            } else {
                match &group_tops[idx] {
                    Some(tops) if !tops[offset] => "",
                    _ => layout.value_of(record, idx),
                }
            };
            sheet.set_text(CellRef::new(row, *col), value, styles[idx]);
        }
    }

    if let Some(old_end) = old_end {
        let first_stale = new_end.map_or(start, |end| end + 1);
        for row in first_stale..=old_end {
            for col in &resolution.columns {
                sheet.clear_value(CellRef::new(row, *col));
            }
            summary.rows_cleared += 1;
        }
    }

    if let (Some(end), Some((lo, hi))) = (new_end, resolution.column_span()) {
        sheet.extend_dimension(Range::new(CellRef::new(start, lo), CellRef::new(end, hi)));
    }

    Ok(summary)
}
