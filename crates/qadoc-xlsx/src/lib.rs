//! XLSX (SpreadsheetML) package plumbing.
//!
//! The package is treated as an ordered set of named ZIP parts. Only the parts a caller
//! explicitly replaces are re-encoded; everything else is raw-copied so styles, themes and
//! unrelated sheets round-trip byte-for-byte.

mod package;
mod shared_strings;
mod workbook;
pub mod worksheet;
mod xml;
mod zip_util;

pub use package::{replace_parts, WorkbookArchive};
pub use shared_strings::SharedStringTable;
pub use workbook::{SheetEntry, WorkbookIndex};
pub use worksheet::{Cell, CellValue, Row, Worksheet};

#[derive(Debug, thiserror::Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
}

/// Whether this build can encode DEFLATE-compressed parts.
///
/// Workbooks produced by spreadsheet applications compress every part, so rewriting a
/// worksheet needs this.
pub const fn supports_deflate() -> bool {
    cfg!(feature = "deflate")
}
