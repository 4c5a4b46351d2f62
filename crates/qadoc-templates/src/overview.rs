use qadoc_model::text::labels_match;
use qadoc_model::CellRef;
use qadoc_xlsx::{SheetEntry, WorkbookIndex};

use crate::kind::TemplateKind;

/// The free-form project description cell.
pub const OVERVIEW_CELL: CellRef = CellRef::new(4, 1);

const OVERVIEW_SHEETS: &[&str] = &["개요", "프로젝트 개요", "overview"];

/// Sheet holding the overview cell: a dedicated overview sheet, else the feature list sheet,
/// else the first sheet.
pub fn overview_sheet(index: &WorkbookIndex) -> Option<&SheetEntry> {
    let feature_list = TemplateKind::FeatureList.layout().sheet_candidates;
    OVERVIEW_SHEETS
        .iter()
        .chain(feature_list)
        .find_map(|candidate| {
            index
                .sheets
                .iter()
                .find(|sheet| labels_match(&sheet.name, candidate))
        })
        .or_else(|| index.first_sheet())
}
