use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use qadoc_model::{CellRef, Range};

use super::{Cell, CellValue, Row, Worksheet};
use crate::xml::local_name;
use crate::XlsxError;

impl Worksheet {
    /// Parse a worksheet part.
    ///
    /// Rows or cells without an `r` attribute take the position following their predecessor.
    /// Unparseable `<dimension>`/`<mergeCell>` references are ignored; a worksheet without
    /// `<sheetData>` is rejected.
    pub fn from_xml(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut sheet = Worksheet::default();
        let mut saw_sheet_data = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e)
                    if local_name(e.name().as_ref()) == b"dimension" =>
                {
                    sheet.dimension = parse_ref_attr(&e)?;
                }
                Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    saw_sheet_data = true;
                    sheet.rows = read_sheet_data(&mut reader)?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    saw_sheet_data = true;
                }
                Event::Start(e) | Event::Empty(e)
                    if local_name(e.name().as_ref()) == b"mergeCell" =>
                {
                    match parse_ref_attr(&e)? {
                        Some(range) if !sheet.merges.iter().any(|m| m.intersects(&range)) => {
                            sheet.merges.push(range)
                        }
                        Some(range) => log::warn!("dropping overlapping merge {range}"),
                        None => log::warn!("dropping <mergeCell> without a valid ref"),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_sheet_data {
            return Err(XlsxError::Invalid("worksheet has no <sheetData>".to_string()));
        }
        Ok(sheet)
    }
}

fn parse_ref_attr(e: &BytesStart<'_>) -> Result<Option<Range>, XlsxError> {
    let Some(value) = crate::xml::attr_value(e, b"ref")? else {
        return Ok(None);
    };
    Ok(Range::from_a1(&value).ok())
}

fn read_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
) -> Result<BTreeMap<u32, Row>, XlsxError> {
    let mut rows = BTreeMap::new();
    let mut buf = Vec::new();
    let mut next_row = 1u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let (row_num, attrs) = row_attrs(&e, next_row)?;
                let cells = read_row_cells(reader, row_num)?;
                rows.insert(row_num, Row { attrs, cells });
                next_row = row_num + 1;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let (row_num, attrs) = row_attrs(&e, next_row)?;
                rows.insert(
                    row_num,
                    Row {
                        attrs,
                        cells: BTreeMap::new(),
                    },
                );
                next_row = row_num + 1;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of worksheet inside <sheetData>".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn row_attrs(e: &BytesStart<'_>, fallback: u32) -> Result<(u32, Vec<(String, String)>), XlsxError> {
    let mut row_num = None;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            row_num = attr.unescape_value()?.trim().parse::<u32>().ok();
        } else {
            attrs.push(raw_pair(attr.key.as_ref(), &attr.value));
        }
    }
    let row_num = row_num.filter(|r| *r > 0).unwrap_or(fallback);
    Ok((row_num, attrs))
}

fn read_row_cells<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    row_num: u32,
) -> Result<BTreeMap<u32, Cell>, XlsxError> {
    let mut cells = BTreeMap::new();
    let mut buf = Vec::new();
    let mut next_col = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let head = cell_head(&e, row_num, next_col)?;
                let body = read_cell_body(reader)?;
                next_col = head.col + 1;
                cells.insert(
                    head.col,
                    Cell {
                        style: head.style,
                        value: classify(head.cell_type, body)?,
                        extra_attrs: head.extra_attrs,
                    },
                );
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let head = cell_head(&e, row_num, next_col)?;
                next_col = head.col + 1;
                cells.insert(
                    head.col,
                    Cell {
                        style: head.style,
                        value: CellValue::Empty,
                        extra_attrs: head.extra_attrs,
                    },
                );
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(format!(
                    "unexpected end of worksheet inside row {row_num}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

struct CellHead {
    col: u32,
    style: Option<u32>,
    cell_type: Option<String>,
    extra_attrs: Vec<(String, String)>,
}

fn cell_head(e: &BytesStart<'_>, row_num: u32, fallback_col: u32) -> Result<CellHead, XlsxError> {
    let mut head = CellHead {
        col: fallback_col,
        style: None,
        cell_type: None,
        extra_attrs: Vec::new(),
    };
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let value = attr.unescape_value()?;
                match CellRef::from_a1(&value) {
                    Ok(cell) => {
                        if cell.row != row_num {
                            log::debug!("cell {value} listed under row {row_num}");
                        }
                        head.col = cell.col;
                    }
                    Err(err) => log::debug!("ignoring invalid cell ref {value:?}: {err}"),
                }
            }
            b"s" => head.style = attr.unescape_value()?.trim().parse().ok(),
            b"t" => head.cell_type = Some(attr.unescape_value()?.into_owned()),
            key => head.extra_attrs.push(raw_pair(key, &attr.value)),
        }
    }
    Ok(head)
}

/// Child events of a `<c>` element, up to (not including) its end tag.
fn read_cell_body<R: std::io::BufRead>(
    reader: &mut Reader<R>,
) -> Result<Vec<Event<'static>>, XlsxError> {
    let mut body = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of worksheet inside <c>".to_string(),
                ))
            }
            _ => {}
        }
        body.push(event.into_owned());
        buf.clear();
    }
    Ok(body)
}

/// What the children of a cell look like.
#[derive(Default)]
struct BodyShape {
    value_text: Option<String>,
    inline_runs: Vec<String>,
    /// Any element other than `<v>`, `<is>` and a direct `<is><t>`.
    other_elements: bool,
    /// `<is>` contained rich runs (`<r>`) or phonetic text.
    rich_inline: bool,
}

fn inspect(body: &[Event<'static>]) -> Result<BodyShape, XlsxError> {
    let mut shape = BodyShape::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    for event in body {
        match event {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                note_element(&mut shape, &path, &name);
                path.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                note_element(&mut shape, &path, &name);
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                push_text(&mut shape, &path, &text);
            }
            Event::CData(t) => {
                let text = t.decode().map_err(quick_xml::Error::from)?;
                push_text(&mut shape, &path, &text);
            }
            _ => {}
        }
    }
    Ok(shape)
}

fn note_element(shape: &mut BodyShape, path: &[Vec<u8>], name: &[u8]) {
    match (path.last().map(Vec::as_slice), name) {
        (None, b"v" | b"is") => {}
        (Some(b"is"), b"t") => {}
        (Some(b"is"), b"r" | b"rPh" | b"phoneticPr") => shape.rich_inline = true,
        (Some(_), _) if path.first().map(Vec::as_slice) == Some(&b"is"[..]) => {}
        _ => shape.other_elements = true,
    }
}

fn push_text(shape: &mut BodyShape, path: &[Vec<u8>], text: &str) {
    let in_phonetic = path.iter().any(|p| p.as_slice() == b"rPh");
    match path.last().map(Vec::as_slice) {
        Some(b"v") if path.len() == 1 => {
            shape.value_text.get_or_insert_with(String::new).push_str(text)
        }
        Some(b"t") if path.first().map(Vec::as_slice) == Some(&b"is"[..]) && !in_phonetic => {
            shape.inline_runs.push(text.to_string())
        }
        _ => {}
    }
}

fn classify(cell_type: Option<String>, body: Vec<Event<'static>>) -> Result<CellValue, XlsxError> {
    let shape = inspect(&body)?;
    let inline_text = (!shape.inline_runs.is_empty()).then(|| shape.inline_runs.concat());

    if !shape.other_elements {
        match cell_type.as_deref() {
            Some("s") => {
                if let Some(idx) = shape
                    .value_text
                    .as_deref()
                    .and_then(|v| v.trim().parse::<u32>().ok())
                {
                    return Ok(CellValue::SharedString(idx));
                }
            }
            Some("inlineStr") if !shape.rich_inline && shape.value_text.is_none() => {
                return Ok(match inline_text {
                    Some(text) if shape.inline_runs.len() == 1 => CellValue::InlineString(text),
                    Some(text) => CellValue::Preserved {
                        cell_type,
                        body,
                        text: Some(text),
                    },
                    None => CellValue::Empty,
                });
            }
            Some("inlineStr") => {}
            _ => {
                if let Some(raw) = shape.value_text.clone() {
                    if shape.inline_runs.is_empty() {
                        return Ok(CellValue::Value { cell_type, raw });
                    }
                }
                if body.iter().all(|e| matches!(e, Event::Text(_))) {
                    return Ok(CellValue::Empty);
                }
            }
        }
    }

    let text = shape.value_text.or(inline_text);
    Ok(CellValue::Preserved {
        cell_type,
        body,
        text,
    })
}

fn raw_pair(key: &[u8], value: &[u8]) -> (String, String) {
    (
        String::from_utf8_lossy(key).into_owned(),
        String::from_utf8_lossy(value).into_owned(),
    )
}
