use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use qadoc_model::{CellRef, Range};

use super::{Cell, CellValue, Row, Worksheet};
use crate::xml::{element_prefix, local_name, needs_space_preserve, prefixed_tag};
use crate::XlsxError;

/// Elements that come after `<mergeCells>` in the SpreadsheetML schema.
fn after_merge_cells(name: &[u8]) -> bool {
    matches!(
        name,
        b"phoneticPr"
            | b"conditionalFormatting"
            | b"dataValidations"
            | b"hyperlinks"
            | b"printOptions"
            | b"pageMargins"
            | b"pageSetup"
            | b"headerFooter"
            | b"rowBreaks"
            | b"colBreaks"
            | b"customProperties"
            | b"cellWatches"
            | b"ignoredErrors"
            | b"smartTags"
            | b"drawing"
            | b"drawingHF"
            | b"picture"
            | b"oleObjects"
            | b"controls"
            | b"webPublishItems"
            | b"tableParts"
            | b"extLst"
    )
}

/// Elements that come after `<dimension>`.
fn after_dimension(name: &[u8]) -> bool {
    matches!(name, b"sheetViews" | b"sheetFormatPr" | b"cols" | b"sheetData")
}

impl Worksheet {
    /// Serialize the model back over `original` (the markup it was parsed from).
    ///
    /// Only `<dimension>`, `<sheetData>` and `<mergeCells>` are regenerated; a missing
    /// `<dimension>` or `<mergeCells>` is inserted at its schema position and an empty
    /// `<mergeCells>` is dropped. Every other event passes through untouched, including the
    /// namespace prefix the worksheet uses.
    pub fn to_xml(&self, original: &[u8]) -> Result<Vec<u8>, XlsxError> {
        let mut reader = Reader::from_reader(original);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + 1024));
        let mut buf = Vec::new();

        let mut prefix: Option<String> = None;
        let mut skip_depth = 0usize;
        let mut dimension_done = self.dimension.is_none();
        let mut sheet_data_done = false;
        let mut merges_done = false;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            if skip_depth > 0 {
                match event {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    Event::Eof => break,
                    _ => {}
                }
                buf.clear();
                continue;
            }

            let mut pass_through = true;
            match &event {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) => {
                    let is_start = matches!(event, Event::Start(_));
                    let qname = e.name();
                    let name = local_name(qname.as_ref());

                    if name == b"worksheet" {
                        prefix = element_prefix(qname.as_ref());
                    }
                    if !dimension_done && after_dimension(name) {
                        self.write_dimension(&mut writer, prefix.as_deref())?;
                        dimension_done = true;
                    }

                    match name {
                        b"dimension" => {
                            if self.dimension.is_some() {
                                self.write_dimension(&mut writer, prefix.as_deref())?;
                                pass_through = false;
                                skip_depth = usize::from(is_start);
                            }
                            dimension_done = true;
                        }
                        b"sheetData" => {
                            self.write_sheet_data(&mut writer, prefix.as_deref())?;
                            pass_through = false;
                            skip_depth = usize::from(is_start);
                            sheet_data_done = true;
                        }
                        b"mergeCells" => {
                            self.write_merge_cells(&mut writer, prefix.as_deref())?;
                            pass_through = false;
                            skip_depth = usize::from(is_start);
                            merges_done = true;
                        }
                        other if sheet_data_done && !merges_done && after_merge_cells(other) => {
                            self.write_merge_cells(&mut writer, prefix.as_deref())?;
                            merges_done = true;
                        }
                        _ => {}
                    }
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                    if !merges_done {
                        self.write_merge_cells(&mut writer, prefix.as_deref())?;
                        merges_done = true;
                    }
                }
                _ => {}
            }

            if pass_through {
                writer.write_event(event)?;
            }
            buf.clear();
        }

        Ok(writer.into_inner())
    }

    fn write_dimension<W: Write>(
        &self,
        writer: &mut Writer<W>,
        prefix: Option<&str>,
    ) -> Result<(), XlsxError> {
        let Some(dimension) = self.dimension else {
            return Ok(());
        };
        let tag = prefixed_tag(prefix, "dimension");
        let mut elem = BytesStart::new(tag.as_str());
        elem.push_attribute(("ref", dimension.to_string().as_str()));
        writer.write_event(Event::Empty(elem))?;
        Ok(())
    }

    fn write_merge_cells<W: Write>(
        &self,
        writer: &mut Writer<W>,
        prefix: Option<&str>,
    ) -> Result<(), XlsxError> {
        if self.merges.is_empty() {
            return Ok(());
        }
        let mut merges: Vec<&Range> = self.merges.iter().collect();
        merges.sort_by_key(|m| (m.start.col, m.start.row));

        let merge_cells_tag = prefixed_tag(prefix, "mergeCells");
        let merge_cell_tag = prefixed_tag(prefix, "mergeCell");
        let count = merges.len().to_string();
        let mut start = BytesStart::new(merge_cells_tag.as_str());
        start.push_attribute(("count", count.as_str()));
        writer.write_event(Event::Start(start))?;
        for merge in merges {
            let range = merge.to_string();
            let mut elem = BytesStart::new(merge_cell_tag.as_str());
            elem.push_attribute(("ref", range.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }
        writer.write_event(Event::End(BytesEnd::new(merge_cells_tag.as_str())))?;
        Ok(())
    }

    fn write_sheet_data<W: Write>(
        &self,
        writer: &mut Writer<W>,
        prefix: Option<&str>,
    ) -> Result<(), XlsxError> {
        let tag = prefixed_tag(prefix, "sheetData");
        if self.rows.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new(tag.as_str())))?;
            return Ok(());
        }

        writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
        for (row_num, row) in &self.rows {
            write_row(writer, prefix, *row_num, row)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }
}

fn write_row<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    row_num: u32,
    row: &Row,
) -> Result<(), XlsxError> {
    let tag = prefixed_tag(prefix, "row");
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("r", row_num.to_string().as_str()));
    for (key, value) in &row.attrs {
        if key == "spans" {
            let spans = widened_spans(value, row);
            start.push_attribute((key.as_bytes(), spans.as_bytes()));
        } else {
            start.push_attribute((key.as_bytes(), value.as_bytes()));
        }
    }

    if row.cells.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for (col, cell) in &row.cells {
        write_cell(writer, prefix, CellRef::new(row_num, *col), cell)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

/// `spans` is a 1-based `first:last` column hint; widen it when cells were added outside it.
fn widened_spans(spans: &str, row: &Row) -> String {
    let (Some(first), Some(last)) = (
        row.cells.keys().next().map(|c| c + 1),
        row.cells.keys().next_back().map(|c| c + 1),
    ) else {
        return spans.to_string();
    };
    let parsed = spans
        .split_once(':')
        .and_then(|(a, b)| Some((a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((lo, hi)) if lo <= first && last <= hi => spans.to_string(),
        Some((lo, hi)) => format!("{}:{}", lo.min(first), hi.max(last)),
        None => format!("{first}:{last}"),
    }
}

fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    at: CellRef,
    cell: &Cell,
) -> Result<(), XlsxError> {
    let tag = prefixed_tag(prefix, "c");
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("r", at.to_a1().as_str()));
    if let Some(style) = cell.style {
        start.push_attribute(("s", style.to_string().as_str()));
    }
    let cell_type = match &cell.value {
        CellValue::Empty => None,
        CellValue::SharedString(_) => Some("s"),
        CellValue::InlineString(_) => Some("inlineStr"),
        CellValue::Value { cell_type, .. } | CellValue::Preserved { cell_type, .. } => {
            cell_type.as_deref()
        }
    };
    if let Some(t) = cell_type {
        start.push_attribute(("t", t));
    }
    for (key, value) in &cell.extra_attrs {
        start.push_attribute((key.as_bytes(), value.as_bytes()));
    }

    if matches!(cell.value, CellValue::Empty) {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    match &cell.value {
        CellValue::Empty => {}
        CellValue::SharedString(idx) => write_text_element(writer, prefix, "v", &idx.to_string())?,
        CellValue::Value { raw, .. } => write_text_element(writer, prefix, "v", raw)?,
        CellValue::InlineString(text) => {
            let is_tag = prefixed_tag(prefix, "is");
            writer.write_event(Event::Start(BytesStart::new(is_tag.as_str())))?;
            write_text_element(writer, prefix, "t", text)?;
            writer.write_event(Event::End(BytesEnd::new(is_tag.as_str())))?;
        }
        CellValue::Preserved { body, .. } => {
            for event in body {
                writer.write_event(event.borrow())?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    local: &str,
    text: &str,
) -> Result<(), XlsxError> {
    let tag = prefixed_tag(prefix, local);
    let mut start = BytesStart::new(tag.as_str());
    if local == "t" && needs_space_preserve(text) {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}
