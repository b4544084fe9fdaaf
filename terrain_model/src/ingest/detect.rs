//! Schema detection for delimited point files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Delimiters tried, in order of preference when several are consistent.
/// A semicolon or tab never appears inside a number, so they win over a
/// comma that may be a decimal separator.
const DELIMITER_PREFERENCE: [char; 4] = [';', '\t', ',', ' '];

/// Number of non-empty lines sampled for delimiter detection.
const SAMPLE_LINES: usize = 10;

static X_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(x|e|east|easting|este|lon|long|lng|longitude|longitud|coordx|coord_x)$")
        .expect("valid regex")
});
static Y_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(y|n|north|northing|norte|lat|latitude|latitud|coordy|coord_y)$")
        .expect("valid regex")
});
static Z_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(z|h|elev|elevation|elevacion|cota|altura|alt|altitude|height|coordz|coord_z)$")
        .expect("valid regex")
});
static ID_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(id|pt|pnt|point|point_id|pointid|punto|nombre|name|num|number|numero|p)$")
        .expect("valid regex")
});
static CODE_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(code|codigo|cod|desc|description|descripcion|feature)$").expect("valid regex")
});
static CLASS_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(class|classification|clase|clasificacion)$").expect("valid regex")
});
static INTENSITY_NAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(intensity|intensidad|int)$").expect("valid regex"));
static RED_NAMES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(r|red|rojo)$").expect("valid regex"));
static GREEN_NAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(g|green|verde)$").expect("valid regex"));
static BLUE_NAMES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(b|blue|azul)$").expect("valid regex"));

/// Column roles resolved for a delimited file. Indices are zero based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub id: Option<usize>,
    pub code: Option<usize>,
    pub classification: Option<usize>,
    pub intensity: Option<usize>,
    pub rgb: Option<[usize; 3]>,
}

impl ColumnMapping {
    /// Plain `x,y,z` layout.
    pub fn xyz() -> Self {
        Self::positional(None, 0)
    }

    fn positional(id: Option<usize>, first: usize) -> Self {
        Self {
            x: first,
            y: first + 1,
            z: first + 2,
            id,
            code: None,
            classification: None,
            intensity: None,
            rgb: None,
        }
    }

    /// Highest column index referenced by the mapping.
    pub fn max_index(&self) -> usize {
        let mut max = self.x.max(self.y).max(self.z);
        for idx in [self.id, self.code, self.classification, self.intensity]
            .into_iter()
            .flatten()
        {
            max = max.max(idx);
        }
        if let Some(rgb) = self.rgb {
            max = max.max(rgb[0]).max(rgb[1]).max(rgb[2]);
        }
        max
    }
}

/// Returns `true` for lines that carry no data.
pub(crate) fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Splits a line into trimmed fields. Space delimiting collapses runs of
/// whitespace; surrounding quotes are removed.
pub fn split_fields(line: &str, delimiter: char) -> Vec<&str> {
    fn unquote(s: &str) -> &str {
        s.trim().trim_matches('"').trim()
    }
    if delimiter == ' ' {
        line.split_whitespace().map(unquote).collect()
    } else {
        line.split(delimiter).map(unquote).collect()
    }
}

/// Parses a numeric token, accepting `,` as decimal separator when the
/// token has no `.`. Non-finite values are rejected.
pub fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let value = match token.parse::<f64>() {
        Ok(v) => v,
        Err(_) if token.contains(',') && !token.contains('.') => {
            token.replace(',', ".").parse::<f64>().ok()?
        }
        Err(_) => return None,
    };
    value.is_finite().then_some(value)
}

/// Infers the field delimiter from the first data-bearing lines.
///
/// A candidate is consistent when every sampled line splits into the same
/// number (> 1) of fields. Falls back to `,` when nothing is consistent.
pub fn detect_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !is_skippable(l))
        .take(SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return ',';
    }
    for delimiter in DELIMITER_PREFERENCE {
        let mut counts = sample.iter().map(|l| split_fields(l, delimiter).len());
        let Some(first) = counts.next() else {
            continue;
        };
        if first > 1 && counts.all(|c| c == first) {
            return delimiter;
        }
    }
    // Nothing consistent: take the delimiter that splits the most lines.
    DELIMITER_PREFERENCE
        .into_iter()
        .max_by_key(|&d| {
            sample
                .iter()
                .filter(|l| split_fields(l, d).len() > 1)
                .count()
        })
        .filter(|&d| sample.iter().any(|l| split_fields(l, d).len() > 1))
        .unwrap_or(',')
}

/// Lowercases and strips accents and punctuation from a header token.
fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| {
            let c = c.to_lowercase().next().unwrap_or(c);
            match c {
                'á' | 'à' | 'ä' => Some('a'),
                'é' | 'è' | 'ë' => Some('e'),
                'í' | 'ì' | 'ï' => Some('i'),
                'ó' | 'ò' | 'ö' => Some('o'),
                'ú' | 'ù' | 'ü' => Some('u'),
                'ñ' => Some('n'),
                c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
                _ => None,
            }
        })
        .collect()
}

fn is_known_column_name(name: &str) -> bool {
    let n = normalize_name(name);
    [
        &*X_NAMES,
        &*Y_NAMES,
        &*Z_NAMES,
        &*ID_NAMES,
        &*CODE_NAMES,
        &*CLASS_NAMES,
        &*INTENSITY_NAMES,
    ]
    .iter()
    .any(|re| re.is_match(&n))
}

fn is_text(token: &str) -> bool {
    !token.is_empty() && parse_number(token).is_none()
}

/// Returns `true` when the first row looks like a header.
///
/// A row of text holding a known column name is a header. Otherwise the row
/// is a header only when a column that is numeric in the next data row holds
/// text in the first one, so identifier and code columns in headerless files
/// are kept as data. Without a next row, a row of text alone counts.
pub fn detect_header(first: &[&str], next: Option<&[&str]>) -> bool {
    let all_text = first.iter().all(|f| parse_number(f).is_none());
    if all_text && first.iter().any(|f| is_known_column_name(f)) {
        return true;
    }
    match next {
        Some(next) => first
            .iter()
            .zip(next)
            .any(|(f, n)| is_text(f) && parse_number(n).is_some()),
        None => first.iter().filter(|f| !f.is_empty()).all(|f| is_text(f)),
    }
}

/// Resolves column roles by name from a header row.
///
/// Returns `None` unless x, y and z are all found.
pub fn map_columns_by_name(headers: &[&str]) -> Option<ColumnMapping> {
    let names: Vec<String> = headers.iter().map(|h| normalize_name(h)).collect();
    let find = |re: &Regex, taken: &[usize]| -> Option<usize> {
        names
            .iter()
            .enumerate()
            .find(|(i, n)| re.is_match(n) && !taken.contains(i))
            .map(|(i, _)| i)
    };
    let x = find(&X_NAMES, &[])?;
    let y = find(&Y_NAMES, &[x])?;
    let z = find(&Z_NAMES, &[x, y])?;
    let mut taken = vec![x, y, z];
    let mut take = |re: &Regex| {
        let idx = find(re, &taken);
        if let Some(i) = idx {
            taken.push(i);
        }
        idx
    };
    let id = take(&ID_NAMES);
    let code = take(&CODE_NAMES);
    let classification = take(&CLASS_NAMES);
    let intensity = take(&INTENSITY_NAMES);
    let rgb = match (take(&RED_NAMES), take(&GREEN_NAMES), take(&BLUE_NAMES)) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };
    Some(ColumnMapping {
        x,
        y,
        z,
        id,
        code,
        classification,
        intensity,
        rgb,
    })
}

/// Identifier-like: non-numeric, or an integer without a fractional part.
fn looks_like_identifier(token: &str) -> bool {
    let token = token.trim();
    !token.is_empty()
        && (parse_number(token).is_none()
            || token.chars().all(|c| c.is_ascii_digit() || c == '-'))
}

/// Positional fallback: 3 columns map to `(x, y, z)`; 4 or more with an
/// identifier-like leading column map to `(id, x, y, z[, code])`, otherwise
/// to `(x, y, z)` in the first three columns.
pub fn map_columns_by_position(sample_row: &[&str]) -> Option<ColumnMapping> {
    match sample_row.len() {
        0..=2 => None,
        3 => Some(ColumnMapping::xyz()),
        n => {
            let numeric_tail = sample_row[1..4].iter().all(|f| parse_number(f).is_some());
            if numeric_tail && looks_like_identifier(sample_row[0]) {
                let mut mapping = ColumnMapping::positional(Some(0), 1);
                if n > 4 {
                    mapping.code = Some(4);
                }
                Some(mapping)
            } else {
                Some(ColumnMapping::xyz())
            }
        }
    }
}

/// Resolves the column mapping from an optional header and a sample data
/// row, trying names first and positions second.
pub fn infer_columns(headers: Option<&[&str]>, sample_row: &[&str]) -> Result<ColumnMapping> {
    if let Some(mapping) = headers.and_then(map_columns_by_name) {
        return Ok(mapping);
    }
    map_columns_by_position(sample_row).ok_or_else(|| TerrainError::ColumnMapping {
        attempted: format!(
            "headers {:?}, {} fields in first data row",
            headers.unwrap_or(&[]),
            sample_row.len()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_delimiter_detected() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n4,5,6"), ',');
    }

    #[test]
    fn semicolon_with_decimal_commas() {
        let text = "1,5;2,5;3,5\n4,5;5,5;6,5\n";
        assert_eq!(detect_delimiter(text), ';');
    }

    #[test]
    fn tab_and_space_delimiters() {
        assert_eq!(detect_delimiter("1\t2\t3\n4\t5\t6"), '\t');
        assert_eq!(detect_delimiter("# comment\n1  2 3\n4 5   6"), ' ');
    }

    #[test]
    fn header_detection() {
        assert!(detect_header(&["x", "y", "z"], None));
        assert!(detect_header(&["id", "este", "norte", "cota"], None));
        assert!(!detect_header(&["1.0", "2.0", "3.0"], None));
        assert!(detect_header(&["a", "b", "c"], Some(&["1", "2", "3"][..])));
    }

    #[test]
    fn text_columns_in_data_rows_are_not_a_header() {
        let next = ["2", "101.0", "201.0", "11.0", "CURB"];
        assert!(!detect_header(&["1", "100.0", "200.0", "10.0", "TREE"], Some(&next[..])));
        let next = ["P2", "101.0", "201.0", "11.0"];
        assert!(!detect_header(&["P1", "100.0", "200.0", "10.0"], Some(&next[..])));
        assert!(!detect_header(&["P1", "100.0", "200.0", "10.0"], None));
        let next = ["8", "101.0", "201.0", "11.0", "N"];
        assert!(!detect_header(&["7", "100.0", "200.0", "10.0", "E"], Some(&next[..])));
    }

    #[test]
    fn lon_lat_elev_mapping() {
        let mapping = map_columns_by_name(&["lon", "lat", "elev"]).unwrap();
        assert_eq!((mapping.x, mapping.y, mapping.z), (0, 1, 2));
    }

    #[test]
    fn spanish_names_with_extra_columns() {
        let mapping =
            map_columns_by_name(&["Punto", "Norte", "Este", "Cota", "Código"]).unwrap();
        assert_eq!(mapping.id, Some(0));
        assert_eq!(mapping.y, 1);
        assert_eq!(mapping.x, 2);
        assert_eq!(mapping.z, 3);
        assert_eq!(mapping.code, Some(4));
    }

    #[test]
    fn unknown_header_falls_back_to_position() {
        let mapping = infer_columns(Some(&["a", "b", "c"][..]), &["1", "2", "3"]).unwrap();
        assert_eq!(mapping, ColumnMapping::xyz());
    }

    #[test]
    fn leading_identifier_column() {
        let mapping = map_columns_by_position(&["P1", "10.0", "20.0", "5.0"]).unwrap();
        assert_eq!(mapping.id, Some(0));
        assert_eq!((mapping.x, mapping.y, mapping.z), (1, 2, 3));

        let mapping = map_columns_by_position(&["10.5", "20.0", "5.0", "0.3"]).unwrap();
        assert_eq!(mapping, ColumnMapping::xyz());
    }

    #[test]
    fn too_few_columns_is_a_mapping_error() {
        let err = infer_columns(Some(&["foo", "bar"][..]), &["1", "2"]).unwrap_err();
        assert!(matches!(err, TerrainError::ColumnMapping { .. }));
    }

    #[test]
    fn locale_numbers() {
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number(" 7.25 "), Some(7.25));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("abc"), None);
    }
}
