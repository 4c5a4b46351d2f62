//! Value types shared by the QA document template crates.
//!
//! - [`address`]: A1 cell references and rectangular ranges.
//! - [`text`]: label normalization used for fuzzy header and file-name matching.
//! - [`records`]: delimited text <-> ordered [`DataRecord`]s.

pub mod address;
pub mod records;
pub mod text;

pub use address::{col_to_name, name_to_col, A1ParseError, CellRef, Range, RangeParseError};
pub use records::{parse_records, write_records, DataRecord, RecordsError};

/// Number of rows in an Excel worksheet.
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;
/// Number of columns in an Excel worksheet.
pub const EXCEL_MAX_COLS: u32 = 16_384;
