//! Population engine for QA document spreadsheet templates.
//!
//! A template workbook has a fixed header layout per [`TemplateKind`]. [`TemplateEngine`]
//! finds that header, writes CSV records below it with hierarchy columns merged vertically,
//! and returns a new workbook in which only the edited worksheet parts differ.
//!
//! ```no_run
//! use qadoc_templates::{TemplateEngine, TemplateKind};
//!
//! # fn main() -> Result<(), qadoc_templates::TemplateError> {
//! let template = std::fs::read("기능리스트 v1.0.xlsx").expect("template");
//! let engine = TemplateEngine::new()?;
//! let filled = engine.populate(
//!     TemplateKind::FeatureList,
//!     &template,
//!     "대분류,중분류,소분류,기능 설명\n회원,가입,,이메일 가입\n",
//!     Some("프로젝트 개요"),
//! )?;
//! assert_eq!(engine.extract_overview(&filled)?, "프로젝트 개요");
//! # Ok(())
//! # }
//! ```

mod engine;
pub mod header;
mod kind;
pub mod merge;
mod overview;

pub use engine::{ParsedRows, SheetContext, TemplateEngine};
pub use header::{header_lookahead, resolve_header, resolve_header_excluding, HeaderResolution};
pub use kind::{ColumnSpec, TemplateKind, TemplateLayout};
pub use merge::{group_rows, write_block, BlockSummary, MergePolicy, RowGroup};
pub use overview::{overview_sheet, OVERVIEW_CELL};

pub use qadoc_model::{DataRecord, RecordsError};
pub use qadoc_xlsx::XlsxError;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("malformed workbook: {0}")]
    MalformedWorkbook(#[from] XlsxError),
    #[error("worksheet {sheet:?} not found ({part})")]
    SheetNotFound { sheet: String, part: String },
    #[error("overview cell {sheet}!{cell} lies inside the data block starting at row {data_start_row}")]
    OverviewInDataBlock {
        sheet: String,
        cell: String,
        data_start_row: u32,
    },
    #[error("invalid CSV input: {0}")]
    InvalidCsv(#[from] RecordsError),
    #[error("spreadsheet support unavailable: {0}")]
    Unavailable(String),
    #[error(
        "unknown template type {0:?} (expected feature-list, testcase-generation, defect-report or security-report)"
    )]
    UnknownTemplate(String),
}
