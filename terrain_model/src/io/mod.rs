//! File input and output helpers for points, breaklines and surfaces.

use std::fs::File;
use std::io::{self, Read, Write};

use crate::dtm::{Breakline, BreaklineKind, BreaklineVertex, ConstraintRegion, ContourLine};
use crate::error::Result;
use crate::ingest::{parse_bytes, parse_number, ParseOptions, ParseReport};
use crate::points::SurveyPoint;
use crate::surface::GeneratedSurface;

/// Reads a file to string.
pub fn read_to_string(path: &str) -> io::Result<String> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Writes a string to a file, replacing its contents.
pub fn write_string(path: &str, contents: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())
}

/// Reads and parses a point file. Binary point clouds are refused.
pub fn read_points(path: &str, options: &ParseOptions) -> Result<ParseReport> {
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, options)
}

/// Writes points as `id,x,y,z,code,source` with a header row.
pub fn write_points_csv(path: &str, points: &[SurveyPoint]) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "id,x,y,z,code,source")?;
    for p in points {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            p.id,
            p.x,
            p.y,
            p.z,
            p.code.as_deref().unwrap_or(""),
            p.source.as_str()
        )?;
    }
    Ok(())
}

fn invalid(line: usize, message: impl std::fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line {}: {}", line, message),
    )
}

/// Reads breaklines from rows of `line_id,kind,x,y[,z]`.
///
/// Rows sharing a `line_id` form one breakline in file order. A leading
/// header row and `#` comments are skipped.
pub fn read_breaklines_csv(path: &str) -> io::Result<Vec<Breakline>> {
    let contents = read_to_string(path)?;
    let mut lines: Vec<Breakline> = Vec::new();
    let mut header_checked = false;
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if parts.len() < 4 {
            return Err(invalid(idx + 1, "expected line_id,kind,x,y[,z]"));
        }
        let (Some(x), Some(y)) = (parse_number(parts[2]), parse_number(parts[3])) else {
            if !header_checked {
                header_checked = true;
                continue;
            }
            return Err(invalid(idx + 1, "x and y must be numeric"));
        };
        header_checked = true;
        let z = match parts.get(4) {
            Some(t) if !t.is_empty() => Some(
                parse_number(t).ok_or_else(|| invalid(idx + 1, format!("bad z value {:?}", t)))?,
            ),
            _ => None,
        };
        let kind = BreaklineKind::parse(parts[1])
            .ok_or_else(|| invalid(idx + 1, format!("unknown breakline kind {:?}", parts[1])))?;
        let vertex = BreaklineVertex::new(x, y, z);
        match lines.iter_mut().find(|b| b.id == parts[0]) {
            Some(b) if b.kind != kind => {
                return Err(invalid(
                    idx + 1,
                    format!("breakline {} changes kind", b.id),
                ))
            }
            Some(b) => b.vertices.push(vertex),
            None => lines.push(Breakline::new(parts[0], kind, vec![vertex])),
        }
    }
    Ok(lines)
}

/// Reads constraint regions from a JSON array.
pub fn read_regions_json(path: &str) -> io::Result<Vec<ConstraintRegion>> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes contour vertices as `elevation,line,vertex,x,y,z`.
pub fn write_contours_csv(path: &str, contours: &[ContourLine]) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "elevation,line,vertex,x,y,z")?;
    for (i, c) in contours.iter().enumerate() {
        for (j, v) in c.line.vertices.iter().enumerate() {
            writeln!(file, "{},{},{},{},{},{}", c.elevation, i, j, v.x, v.y, v.z)?;
        }
    }
    Ok(())
}

pub fn write_surface_json(path: &str, surface: &GeneratedSurface) -> io::Result<()> {
    let json = serde_json::to_string_pretty(surface).map_err(std::io::Error::other)?;
    write_string(path, &json)
}

pub fn read_surface_json(path: &str) -> io::Result<GeneratedSurface> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::PointDataset;
    use crate::surface::{SurfaceConfig, SurfaceMethod};
    use tempfile::tempdir;

    #[test]
    fn points_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pts.csv");
        let path = path.to_str().unwrap();
        let pts = vec![
            SurveyPoint::new("1", 1.0, 2.0, 3.5).with_code("TOE"),
            SurveyPoint::new("2", 4.0, 5.0, 6.25),
        ];
        write_points_csv(path, &pts).unwrap();
        let report = read_points(path, &ParseOptions::default()).unwrap();
        assert_eq!(report.points.len(), 2);
        assert_eq!(report.points[0].id, "1");
        assert_eq!(report.points[0].code.as_deref(), Some("TOE"));
        assert_eq!(report.points[1].z, 6.25);
    }

    #[test]
    fn breaklines_group_by_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bl.csv");
        std::fs::write(
            &path,
            "line_id,kind,x,y,z\n# ridge\nA,hard,0,0,10\nA,hard,5,5,12\nB,soft,1,0\nB,soft,1,9,\n",
        )
        .unwrap();
        let lines = read_breaklines_csv(path.to_str().unwrap()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, BreaklineKind::Hard);
        assert_eq!(lines[0].vertices[1].z, Some(12.0));
        assert_eq!(lines[1].vertices.len(), 2);
        assert_eq!(lines[1].vertices[1].z, None);
    }

    #[test]
    fn breakline_errors_name_the_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "A,hard,0,0\nA,ridge,1,1\n").unwrap();
        let err = read_breaklines_csv(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().starts_with("line 2:"));
    }

    #[test]
    fn surface_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("surface.json");
        let path = path.to_str().unwrap();
        let ds = PointDataset::new(
            "ds",
            vec![
                SurveyPoint::new("1", 0.0, 0.0, 1.0),
                SurveyPoint::new("2", 10.0, 0.0, 2.0),
                SurveyPoint::new("3", 0.0, 10.0, 3.0),
            ],
        );
        let s = GeneratedSurface::generate(&ds, SurfaceConfig::new(SurfaceMethod::Delaunay), None)
            .unwrap();
        write_surface_json(path, &s).unwrap();
        let back = read_surface_json(path).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.method, SurfaceMethod::Delaunay);
    }
}
