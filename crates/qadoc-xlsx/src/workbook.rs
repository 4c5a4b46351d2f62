use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::package::WorkbookArchive;
use crate::xml::{attr_value, local_name};
use crate::XlsxError;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// A `<sheet>` entry of the workbook, resolved to its worksheet part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: Option<u32>,
    pub rel_id: String,
    /// Worksheet part name, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
}

/// Sheet catalog of a workbook package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbookIndex {
    pub workbook_part: String,
    pub sheets: Vec<SheetEntry>,
    pub shared_strings_part: Option<String>,
}

#[derive(Debug)]
struct Relationship {
    id: String,
    type_uri: String,
    target: String,
    external: bool,
}

impl WorkbookIndex {
    pub fn load(archive: &mut WorkbookArchive<'_>) -> Result<Self, XlsxError> {
        let workbook_part = match archive.read_part("_rels/.rels")? {
            Some(rels) => parse_relationships(&rels)?
                .into_iter()
                .find(|rel| !rel.external && rel.type_uri.ends_with("/officeDocument"))
                .map(|rel| resolve_target("", &rel.target))
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()),
            None => DEFAULT_WORKBOOK_PART.to_string(),
        };

        let workbook_xml = archive.read_required_part(&workbook_part)?;
        let declared = parse_sheet_list(&workbook_xml)?;

        let rels_part = rels_part_name(&workbook_part);
        let rels = match archive.read_part(&rels_part)? {
            Some(bytes) => parse_relationships(&bytes)?,
            None => Vec::new(),
        };
        let by_id: HashMap<&str, &Relationship> =
            rels.iter().map(|rel| (rel.id.as_str(), rel)).collect();

        let mut sheets = Vec::with_capacity(declared.len());
        for (name, sheet_id, rel_id) in declared {
            let rel = by_id.get(rel_id.as_str()).ok_or_else(|| {
                XlsxError::Invalid(format!(
                    "sheet {name:?} references missing relationship {rel_id:?} in {rels_part}"
                ))
            })?;
            if !rel.type_uri.ends_with("/worksheet") {
                log::debug!("skipping non-worksheet sheet {name:?} ({})", rel.type_uri);
                continue;
            }
            sheets.push(SheetEntry {
                name,
                sheet_id,
                rel_id,
                part: resolve_target(&workbook_part, &rel.target),
            });
        }
        if sheets.is_empty() {
            return Err(XlsxError::Invalid(format!(
                "{workbook_part} declares no worksheets"
            )));
        }

        let shared_strings_part = rels
            .iter()
            .find(|rel| !rel.external && rel.type_uri.ends_with("/sharedStrings"))
            .map(|rel| resolve_target(&workbook_part, &rel.target))
            .or_else(|| {
                archive
                    .contains(DEFAULT_SHARED_STRINGS_PART)
                    .then(|| DEFAULT_SHARED_STRINGS_PART.to_string())
            });

        Ok(Self {
            workbook_part,
            sheets,
            shared_strings_part,
        })
    }

    /// Sheet whose name equals `name` exactly.
    pub fn sheet(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// First sheet in workbook order. A loaded index always has one.
    pub fn first_sheet(&self) -> Option<&SheetEntry> {
        self.sheets.first()
    }
}

fn parse_sheet_list(xml: &[u8]) -> Result<Vec<(String, Option<u32>, String)>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                let mut name = None;
                let mut sheet_id = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    let value = attr.unescape_value()?.into_owned();
                    match key {
                        b"name" => name = Some(value),
                        b"sheetId" => sheet_id = value.trim().parse().ok(),
                        // `r:id`, whatever the relationships namespace prefix is.
                        _ if key.contains(&b':') && local_name(key) == b"id" => {
                            rel_id = Some(value)
                        }
                        _ => {}
                    }
                }
                match (name, rel_id) {
                    (Some(name), Some(rel_id)) => sheets.push((name, sheet_id, rel_id)),
                    (name, _) => {
                        return Err(XlsxError::Invalid(format!(
                            "workbook <sheet> {name:?} is missing its name or r:id"
                        )))
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Relationship") =>
            {
                let id = attr_value(&e, b"Id")?;
                let type_uri = attr_value(&e, b"Type")?;
                let target = attr_value(&e, b"Target")?;
                let external = attr_value(&e, b"TargetMode")?
                    .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"));
                if let (Some(id), Some(type_uri), Some(target)) = (id, type_uri, target) {
                    relationships.push(Relationship {
                        id,
                        type_uri,
                        target,
                        external,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// Absolute targets (`/xl/worksheets/sheet1.xml`) are rooted at the package; relative ones are
/// resolved against the source part's folder with `.` and `..` segments applied.
fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map_or(target, |(base, _)| base);
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(absolute) => (absolute, ""),
        None => (
            target,
            base_part.rsplit_once('/').map_or("", |(dir, _)| dir),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}
