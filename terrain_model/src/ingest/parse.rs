//! Delimited text to [`SurveyPoint`] conversion.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::detect::{
    detect_delimiter, detect_header, infer_columns, is_skippable, parse_number, split_fields,
    ColumnMapping,
};
use crate::error::{Result, TerrainError};
use crate::points::{Classification, PointSource, Rgb, SurveyPoint};

/// Options for [`parse_points`]. `None` fields are inferred from the text.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub delimiter: Option<char>,
    pub has_header: Option<bool>,
    pub mapping: Option<ColumnMapping>,
    /// Provenance tag applied to every accepted point.
    pub source: PointSource,
}

impl ParseOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_source(mut self, source: PointSource) -> Self {
        self.source = source;
        self
    }
}

/// A problem attached to one input line (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    pub line: usize,
    pub message: String,
}

impl RowIssue {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

enum FieldError {
    Missing(RowIssue),
    Unparsable(RowIssue),
}

/// Outcome of parsing delimited text.
#[derive(Debug, Clone)]
pub struct ParseReport {
    pub points: Vec<SurveyPoint>,
    pub delimiter: char,
    pub has_header: bool,
    pub headers: Option<Vec<String>>,
    pub mapping: ColumnMapping,
    /// Number of data rows seen (comments and blank lines excluded).
    pub rows: usize,
    /// Rows rejected for unparsable numeric fields.
    pub errors: Vec<RowIssue>,
    /// Non-fatal findings: missing values, duplicate coordinates.
    pub warnings: Vec<RowIssue>,
}

/// Parses delimited point text.
///
/// Rows with a missing or non-numeric x/y/z are rejected individually. The
/// parse fails as a whole only when the column mapping cannot be resolved or
/// when no row yields a point.
pub fn parse_points(text: &str, options: &ParseOptions) -> Result<ParseReport> {
    let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(text));
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !is_skippable(l))
        .peekable();

    let first_fields: Vec<&str> = match lines.peek() {
        Some(&(_, line)) => split_fields(line, delimiter),
        None => return Err(TerrainError::NoValidPoints { rows: 0, errors: 0 }),
    };
    let has_header = options.has_header.unwrap_or_else(|| {
        let second = text
            .lines()
            .filter(|l| !is_skippable(l))
            .nth(1)
            .map(|l| split_fields(l, delimiter));
        detect_header(&first_fields, second.as_deref())
    });
    let headers = if has_header {
        lines.next();
        Some(first_fields)
    } else {
        None
    };

    let mapping = match &options.mapping {
        Some(m) => m.clone(),
        None => {
            let sample = lines
                .peek()
                .map(|&(_, l)| split_fields(l, delimiter))
                .unwrap_or_default();
            let sample = if sample.is_empty() {
                headers.clone().unwrap_or_default()
            } else {
                sample
            };
            infer_columns(headers.as_deref(), &sample)?
        }
    };
    log::debug!(
        "parsing with delimiter {:?}, header {}, mapping {:?}",
        delimiter,
        has_header,
        mapping
    );

    let mut report = ParseReport {
        points: Vec::new(),
        delimiter,
        has_header,
        headers: headers.map(|h| h.iter().map(|s| s.to_string()).collect()),
        mapping: mapping.clone(),
        rows: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    let mut seen: FxHashSet<(u64, u64)> = FxHashSet::default();

    for (idx, line) in lines {
        let line_no = idx + 1;
        report.rows += 1;
        let fields = split_fields(line, delimiter);
        let coord = |col: usize, name: &str| -> std::result::Result<f64, FieldError> {
            match fields.get(col).copied().filter(|f| !f.is_empty()) {
                None => Err(FieldError::Missing(RowIssue::new(
                    line_no,
                    format!("missing {} value", name),
                ))),
                Some(token) => parse_number(token).ok_or_else(|| {
                    FieldError::Unparsable(RowIssue::new(
                        line_no,
                        format!("unparsable {} value {:?}", name, token),
                    ))
                }),
            }
        };
        let parsed = coord(mapping.x, "x")
            .and_then(|x| coord(mapping.y, "y").map(|y| (x, y)))
            .and_then(|(x, y)| coord(mapping.z, "z").map(|z| (x, y, z)));
        let (x, y, z) = match parsed {
            Ok(v) => v,
            Err(FieldError::Missing(issue)) => {
                report.warnings.push(issue);
                continue;
            }
            Err(FieldError::Unparsable(issue)) => {
                report.errors.push(issue);
                continue;
            }
        };

        let optional = |col: Option<usize>| {
            col.and_then(|c| fields.get(c).copied())
                .filter(|f| !f.is_empty())
        };
        let id = optional(mapping.id)
            .map(str::to_string)
            .unwrap_or_else(|| (report.points.len() + 1).to_string());
        let mut point = SurveyPoint::new(id, x, y, z).with_source(options.source);
        point.code = optional(mapping.code).map(str::to_string);
        point.classification = optional(mapping.classification).and_then(Classification::parse);
        point.intensity = optional(mapping.intensity).and_then(|t| t.parse::<u16>().ok());
        point.rgb = mapping.rgb.and_then(|[r, g, b]| {
            Some(Rgb {
                r: optional(Some(r))?.parse().ok()?,
                g: optional(Some(g))?.parse().ok()?,
                b: optional(Some(b))?.parse().ok()?,
            })
        });

        if !seen.insert((x.to_bits(), y.to_bits())) {
            report.warnings.push(RowIssue::new(
                line_no,
                format!("duplicate coordinate ({}, {})", x, y),
            ));
        }
        report.points.push(point);
    }

    if report.points.is_empty() {
        return Err(TerrainError::NoValidPoints {
            rows: report.rows,
            errors: report.errors.len(),
        });
    }
    if !report.errors.is_empty() {
        log::warn!(
            "{} of {} rows rejected while parsing points",
            report.errors.len(),
            report.rows
        );
    }
    log::info!("parsed {} points", report.points.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_named_columns() {
        let text = "id,lon,lat,elev,code\nA,1.0,2.0,3.0,TREE\nB,4.0,5.0,6.5,\n";
        let report = parse_points(text, &ParseOptions::default()).unwrap();
        assert!(report.has_header);
        assert_eq!(report.points.len(), 2);
        assert_eq!(report.points[0].id, "A");
        assert_eq!(report.points[0].code.as_deref(), Some("TREE"));
        assert_eq!(report.points[1].code, None);
        assert_eq!(report.points[1].z, 6.5);
    }

    #[test]
    fn rejected_rows_are_collected() {
        let text = "x,y,z\n1,2,3\n4,oops,6\n7,8\n9,10,11\n";
        let report = parse_points(text, &ParseOptions::default()).unwrap();
        assert_eq!(report.points.len(), 2);
        assert_eq!(report.rows, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 3);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("missing z"));
    }

    #[test]
    fn comments_and_semicolons() {
        let text = "# exported\n100,5;200,25;50,1\n101,5;201,25;51,1\n";
        let report = parse_points(text, &ParseOptions::default()).unwrap();
        assert_eq!(report.delimiter, ';');
        assert!(!report.has_header);
        assert_eq!(report.points[1].x, 101.5);
        assert_eq!(report.points[1].id, "2");
    }

    #[test]
    fn duplicate_coordinates_warn_but_keep() {
        let text = "1,2,3\n1,2,3.5\n";
        let report = parse_points(text, &ParseOptions::default()).unwrap();
        assert_eq!(report.points.len(), 2);
        assert!(report.warnings[0].message.contains("duplicate"));
    }

    #[test]
    fn zero_points_is_terminal() {
        let text = "x,y,z\na,b,c\n";
        let err = parse_points(text, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, TerrainError::NoValidPoints { rows: 1, errors: 1 }));
    }

    #[test]
    fn unmappable_columns_return_no_points() {
        let err = parse_points("a;b\n1;2\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, TerrainError::ColumnMapping { .. }));
    }

    #[test]
    fn explicit_options_override_detection() {
        let text = "5 6 7\n8 9 10\n";
        let options = ParseOptions::default()
            .with_delimiter(' ')
            .with_header(false)
            .with_source(PointSource::DemSample);
        let report = parse_points(text, &options).unwrap();
        assert_eq!(report.points.len(), 2);
        assert!(report
            .points
            .iter()
            .all(|p| p.source == PointSource::DemSample));
    }

    #[test]
    fn lidar_attributes() {
        let text = "x,y,z,class,intensity,r,g,b\n1,1,1,2,300,10,20,30\n";
        let report = parse_points(text, &ParseOptions::default()).unwrap();
        let p = &report.points[0];
        assert_eq!(p.classification, Some(Classification::Ground));
        assert_eq!(p.intensity, Some(300));
        assert_eq!(p.rgb, Some(Rgb { r: 10, g: 20, b: 30 }));
    }
}
