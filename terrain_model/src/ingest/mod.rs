//! Point ingestion: format sniffing, schema detection and parsing.

pub mod detect;
pub mod parse;

pub use detect::{
    detect_delimiter, detect_header, infer_columns, map_columns_by_name, map_columns_by_position,
    parse_number, ColumnMapping,
};
pub use parse::{parse_points, ParseOptions, ParseReport, RowIssue};

use crate::error::{Result, TerrainError};

/// Four-byte signature at the start of every LAS/LAZ file.
const LAS_MAGIC: &[u8; 4] = b"LASF";

/// Broad kinds of point input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    DelimitedText,
    /// Binary LAS/LAZ point cloud; decoded by a separate reader.
    LasPointCloud,
}

/// Sniffs the input format from the leading bytes.
pub fn detect_input_format(bytes: &[u8]) -> InputFormat {
    if bytes.starts_with(LAS_MAGIC) {
        InputFormat::LasPointCloud
    } else {
        InputFormat::DelimitedText
    }
}

/// Parses raw bytes as delimited text, refusing binary point clouds and
/// non-UTF-8 input.
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<ParseReport> {
    match detect_input_format(bytes) {
        InputFormat::LasPointCloud => Err(TerrainError::UnsupportedFormat(
            "LAS point cloud (LASF signature)".into(),
        )),
        InputFormat::DelimitedText => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                TerrainError::UnsupportedFormat(format!("input is not UTF-8 text: {}", e))
            })?;
            parse_points(text, options)
        }
    }
}
