use std::collections::BTreeMap;

use serde::Serialize;

use qadoc_model::{parse_records, write_records, CellRef, DataRecord, Range};
use qadoc_xlsx::{SharedStringTable, SheetEntry, WorkbookArchive, WorkbookIndex, Worksheet};

use crate::header::{repeats_header, resolve_header_excluding, HeaderResolution};
use crate::kind::{TemplateKind, TemplateLayout};
use crate::merge::{write_block, MergePolicy};
use crate::overview::{overview_sheet, OVERVIEW_CELL};
use crate::TemplateError;

/// Where the rows returned by [`TemplateEngine::parse_rows`] came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetContext {
    pub sheet_name: String,
    pub start_row: u32,
    pub header_row: Option<u32>,
    pub first_data_row: Option<u32>,
    pub headers: Vec<String>,
    pub project_overview: Option<String>,
    pub overview_sheet_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRows {
    pub context: SheetContext,
    pub records: Vec<DataRecord>,
}

/// Entry points for populating and reading QA document templates.
///
/// Every call works on its own in-memory copy of the workbook; the engine holds no state
/// beyond its configuration and can be shared freely between threads.
#[derive(Clone, Debug)]
pub struct TemplateEngine {
    policy: MergePolicy,
}

/// A workbook opened for one call.
struct OpenWorkbook<'a> {
    archive: WorkbookArchive<'a>,
    index: WorkbookIndex,
    strings: SharedStringTable,
}

impl<'a> OpenWorkbook<'a> {
    fn open(bytes: &'a [u8]) -> Result<Self, TemplateError> {
        let mut archive = WorkbookArchive::open(bytes)?;
        let index = WorkbookIndex::load(&mut archive)?;
        let strings = SharedStringTable::load(&mut archive, index.shared_strings_part.as_deref())?;
        Ok(Self {
            archive,
            index,
            strings,
        })
    }

    fn data_sheet(&self, kind: TemplateKind) -> Result<SheetEntry, TemplateError> {
        let layout = kind.layout();
        if let Some(sheet) = self
            .index
            .sheets
            .iter()
            .find(|sheet| layout.matches_sheet_name(&sheet.name))
        {
            return Ok(sheet.clone());
        }
        let first = self.index.first_sheet().ok_or_else(|| TemplateError::SheetNotFound {
            sheet: layout.sheet_candidates.join(", "),
            part: self.index.workbook_part.clone(),
        })?;
        log::warn!(
            "no sheet named like {:?} for {kind}; using first sheet {:?}",
            layout.sheet_candidates,
            first.name
        );
        Ok(first.clone())
    }

    /// The sheet's original markup plus its parsed model.
    fn load_sheet(&mut self, entry: &SheetEntry) -> Result<(Vec<u8>, Worksheet), TemplateError> {
        let xml = self
            .archive
            .read_part(&entry.part)?
            .ok_or_else(|| TemplateError::SheetNotFound {
                sheet: entry.name.clone(),
                part: entry.part.clone(),
            })?;
        let sheet = Worksheet::from_xml(&xml)?;
        Ok((xml, sheet))
    }

    /// Cells of `entry` left out of header detection: the overview cell, when `entry` holds it.
    fn header_exclusions(&self, layout: &TemplateLayout, entry: &SheetEntry) -> Vec<CellRef> {
        match overview_sheet(&self.index) {
            Some(overview) if layout.has_overview && overview.part == entry.part => {
                vec![OVERVIEW_CELL]
            }
            _ => Vec::new(),
        }
    }
}

impl TemplateEngine {
    /// Fails with [`TemplateError::Unavailable`] when this build cannot write workbooks.
    pub fn new() -> Result<Self, TemplateError> {
        if !qadoc_xlsx::supports_deflate() {
            return Err(TemplateError::Unavailable(
                "built without DEFLATE support; enable the `deflate` feature".to_string(),
            ));
        }
        Ok(Self {
            policy: MergePolicy::default(),
        })
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.policy
    }

    /// Write `csv_text` into the data block of a `kind` template and return the new workbook.
    ///
    /// `overview` replaces the project overview cell; it is only accepted by templates that
    /// have one, and fails with [`TemplateError::OverviewInDataBlock`] when the data block would
    /// cover that cell. Parts other than the touched worksheets are copied byte-for-byte.
    pub fn populate(
        &self,
        kind: TemplateKind,
        workbook: &[u8],
        csv_text: &str,
        overview: Option<&str>,
    ) -> Result<Vec<u8>, TemplateError> {
        let layout = kind.layout();
        let records = parse_records(csv_text, &layout.labels())?;
        let mut book = OpenWorkbook::open(workbook)?;

        // part name -> (original markup, edited model)
        let mut edits: BTreeMap<String, (Vec<u8>, Worksheet)> = BTreeMap::new();

        let data_entry = book.data_sheet(kind)?;
        let (xml, mut sheet) = book.load_sheet(&data_entry)?;
        let excluded = book.header_exclusions(layout, &data_entry);
        let resolution = resolve_header_excluding(&sheet, &book.strings, layout, &excluded);

        let overview_entry = match overview {
            Some(_) if layout.has_overview => {
                let entry = overview_sheet(&book.index)
                    .cloned()
                    .ok_or_else(|| TemplateError::SheetNotFound {
                        sheet: "overview".to_string(),
                        part: book.index.workbook_part.clone(),
                    })?;
                if entry.part == data_entry.part && overview_in_block(&resolution) {
                    return Err(TemplateError::OverviewInDataBlock {
                        sheet: entry.name,
                        cell: OVERVIEW_CELL.to_a1(),
                        data_start_row: resolution.data_start_row,
                    });
                }
                Some(entry)
            }
            Some(_) => {
                log::warn!("{kind} templates have no overview cell; ignoring overview text");
                None
            }
            None => None,
        };

        let summary = write_block(&mut sheet, &resolution, layout, &records, self.policy)?;
        log::info!(
            "{kind}: wrote {} rows to {:?} from row {} ({} merges, {} stale rows cleared)",
            summary.rows_written,
            data_entry.name,
            summary.start_row,
            summary.merges.len(),
            summary.rows_cleared
        );
        edits.insert(data_entry.part.clone(), (xml, sheet));

        if let (Some(text), Some(entry)) = (overview, overview_entry) {
            if !edits.contains_key(&entry.part) {
                let loaded = book.load_sheet(&entry)?;
                edits.insert(entry.part.clone(), loaded);
            }
            if let Some((_, sheet)) = edits.get_mut(&entry.part) {
                write_overview(sheet, text);
            }
            log::debug!("overview written to {:?}!{OVERVIEW_CELL}", entry.name);
        }

        let mut replacements = BTreeMap::new();
        for (part, (xml, sheet)) in &edits {
            replacements.insert(part.clone(), sheet.to_xml(xml)?);
        }
        Ok(book.archive.replace_parts(&replacements)?)
    }

    /// Read the data block of a `kind` template back as records.
    ///
    /// Cells covered by a merge region read the region's top-left value, so feeding the result
    /// back into [`TemplateEngine::populate`] recreates the same merges. Blank rows and rows that
    /// repeat the header are skipped.
    pub fn parse_rows(
        &self,
        kind: TemplateKind,
        workbook: &[u8],
    ) -> Result<ParsedRows, TemplateError> {
        let layout = kind.layout();
        let mut book = OpenWorkbook::open(workbook)?;
        let entry = book.data_sheet(kind)?;
        let (_, sheet) = book.load_sheet(&entry)?;
        let excluded = book.header_exclusions(layout, &entry);
        let resolution = resolve_header_excluding(&sheet, &book.strings, layout, &excluded);
        let records = read_block(&sheet, &book.strings, &resolution, layout);

        let (project_overview, overview_sheet_name) = if layout.has_overview {
            match overview_sheet(&book.index).cloned() {
                Some(overview_entry)
                    if overview_entry.part == entry.part && overview_in_block(&resolution) =>
                {
                    log::debug!("{OVERVIEW_CELL} on {:?} holds record data", entry.name);
                    (None, None)
                }
                Some(overview_entry) if overview_entry.part == entry.part => (
                    Some(sheet.cell_text(OVERVIEW_CELL, &book.strings)),
                    Some(overview_entry.name),
                ),
                Some(overview_entry) => {
                    let (_, overview) = book.load_sheet(&overview_entry)?;
                    (
                        Some(overview.cell_text(OVERVIEW_CELL, &book.strings)),
                        Some(overview_entry.name),
                    )
                }
                None => (None, None),
            }
        } else {
            (None, None)
        };

        log::debug!(
            "{kind}: read {} rows from {:?} starting at row {}",
            records.len(),
            entry.name,
            resolution.data_start_row
        );
        Ok(ParsedRows {
            context: SheetContext {
                sheet_name: entry.name,
                start_row: resolution.data_start_row,
                header_row: resolution.header_row,
                first_data_row: resolution.first_data_row,
                headers: resolution.headers,
                project_overview,
                overview_sheet_name,
            },
            records,
        })
    }

    /// Text of the project overview cell, `""` when it is empty, absent or covered by the
    /// feature list's data block.
    pub fn extract_overview(&self, workbook: &[u8]) -> Result<String, TemplateError> {
        let mut book = OpenWorkbook::open(workbook)?;
        let Some(entry) = overview_sheet(&book.index).cloned() else {
            return Ok(String::new());
        };
        let (_, sheet) = book.load_sheet(&entry)?;

        let kind = TemplateKind::FeatureList;
        if book.data_sheet(kind)?.part == entry.part {
            let layout = kind.layout();
            let resolution =
                resolve_header_excluding(&sheet, &book.strings, layout, &[OVERVIEW_CELL]);
            if overview_in_block(&resolution) {
                log::debug!("{OVERVIEW_CELL} on {:?} holds record data", entry.name);
                return Ok(String::new());
            }
        }
        Ok(sheet.cell_text(OVERVIEW_CELL, &book.strings))
    }

    /// Serialize records in the column order of `kind`.
    pub fn build_csv(
        &self,
        kind: TemplateKind,
        records: &[DataRecord],
    ) -> Result<String, TemplateError> {
        Ok(write_records(records, &kind.layout().labels())?)
    }
}

/// True when rows written from `resolution` would cover the overview cell.
fn overview_in_block(resolution: &HeaderResolution) -> bool {
    OVERVIEW_CELL.row >= resolution.data_start_row
        && resolution.columns.contains(&OVERVIEW_CELL.col)
}

fn write_overview(sheet: &mut Worksheet, text: &str) {
    sheet.set_text(OVERVIEW_CELL, text, None);
    if !text.is_empty() {
        sheet.extend_dimension(Range::new(OVERVIEW_CELL, OVERVIEW_CELL));
    }
}

fn read_block(
    sheet: &Worksheet,
    strings: &SharedStringTable,
    resolution: &HeaderResolution,
    layout: &TemplateLayout,
) -> Vec<DataRecord> {
    let Some(last_row) = sheet.last_row() else {
        return Vec::new();
    };
    let labels = layout.labels();
    let mut records = Vec::new();

    for row in resolution.data_start_row..=last_row {
        let values: Vec<String> = resolution
            .columns
            .iter()
            .map(|col| {
                let at = CellRef::new(row, *col);
                let source = match sheet.merge_at(at) {
                    Some(merge) => merge.start,
                    None => at,
                };
                sheet.cell_text(source, strings).trim().to_string()
            })
            .collect();

        if values.iter().all(String::is_empty) {
            continue;
        }
        if repeats_header(&values, layout) {
            log::debug!("skipping header-like row {row}");
            continue;
        }
        records.push(DataRecord::from_pairs(labels.iter().copied().zip(values)));
    }
    records
}
