//! EDA `data` file parsing: `PKG` footprint records and their outlines.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::units::{NUMERIC_PATTERN, Unit, parse_f64};

static PKG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*PKG[ \t]+(?P<name>\S+)[ \t]+(?P<pitch>{n})[ \t]+(?P<xmin>{n})[ \t]+(?P<ymin>{n})[ \t]+(?P<xmax>{n})[ \t]+(?P<ymax>{n})",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static OUTLINE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:RC|CR|SQ)[^\n]*$").unwrap());
static NEXT_STOP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:PKG|PIN)\b").unwrap());
static RC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*RC\s+({n})\s+({n})\s+({n})\s+({n})\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static CR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*CR\s+({n})\s+({n})\s+({n})\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static SQ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*SQ\s+({n})\s+({n})\s+({n})\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});

/// Footprint outline geometry: a rectangle anchored at its lower-left
/// corner, a circle, or a square centered on a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlineShape {
    Rect { llx: f64, lly: f64, w: f64, h: f64 },
    Circle { xc: f64, yc: f64, r: f64 },
    Square { xc: f64, yc: f64, half: f64 },
}

impl OutlineShape {
    pub fn type_tag(&self) -> &'static str {
        match self {
            OutlineShape::Rect { .. } => "RC",
            OutlineShape::Circle { .. } => "CR",
            OutlineShape::Square { .. } => "SQ",
        }
    }

    /// Named parameters in source order, as the job report serializes them.
    pub fn params(&self) -> Vec<(&'static str, f64)> {
        match *self {
            OutlineShape::Rect { llx, lly, w, h } => {
                vec![("llx", llx), ("lly", lly), ("w", w), ("h", h)]
            }
            OutlineShape::Circle { xc, yc, r } => vec![("xc", xc), ("yc", yc), ("r", r)],
            OutlineShape::Square { xc, yc, half } => {
                vec![("xc", xc), ("yc", yc), ("half", half)]
            }
        }
    }

    /// Corner polygon for the rectangular shapes, ordered LL, LR, UR, UL.
    /// Circles have no polygon.
    pub fn polygon(&self) -> Vec<(f64, f64)> {
        match *self {
            OutlineShape::Rect { llx, lly, w, h } => vec![
                (llx, lly),
                (llx + w, lly),
                (llx + w, lly + h),
                (llx, lly + h),
            ],
            OutlineShape::Square { xc, yc, half } => vec![
                (xc - half, yc - half),
                (xc + half, yc - half),
                (xc + half, yc + half),
                (xc - half, yc + half),
            ],
            OutlineShape::Circle { .. } => Vec::new(),
        }
    }

    /// Outline-derived (width, length); both axes are equal for squares and
    /// circles.
    pub fn dimensions(&self) -> (f64, f64) {
        match *self {
            OutlineShape::Rect { w, h, .. } => (w.abs(), h.abs()),
            OutlineShape::Square { half, .. } => {
                let side = half.abs() * 2.0;
                (side, side)
            }
            OutlineShape::Circle { r, .. } => {
                let diameter = r.abs() * 2.0;
                (diameter, diameter)
            }
        }
    }
}

/// One parsed outline primitive plus the raw line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRecord {
    pub shape: OutlineShape,
    pub raw: String,
}

/// One `PKG` footprint section.
#[derive(Debug, Clone)]
pub struct PkgRecord {
    /// 0-based ordinal among all PKG matches in the file. CMP lines
    /// reference packages through this index (possibly off by one, see
    /// `placement::resolve_package`).
    pub index: usize,
    pub name: String,
    pub pitch: f64,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub outlines: Vec<OutlineRecord>,
    pub unit: Unit,
}

/// Parsed EDA data for a step.
#[derive(Debug, Clone)]
pub struct EdaData {
    pub unit: Unit,
    pub data_path: PathBuf,
    pub records: Vec<PkgRecord>,
}

/// Parse an EDA `data` file into its PKG records. Each section body runs
/// from the PKG header to the next `PKG`/`PIN` keyword or end of file.
pub fn parse_eda_data(text: &str) -> (Unit, Vec<PkgRecord>) {
    let unit = Unit::detect(text);
    let mut records = Vec::new();
    for (index, caps) in PKG_RE.captures_iter(text).enumerate() {
        let header = caps.get(0).expect("full match");
        let section_start = header.end();
        let section_end = NEXT_STOP_RE
            .find_at(text, section_start)
            .map(|m| m.start())
            .unwrap_or(text.len());
        records.push(PkgRecord {
            index,
            name: caps["name"].to_string(),
            pitch: parse_f64(&caps["pitch"]),
            xmin: parse_f64(&caps["xmin"]),
            ymin: parse_f64(&caps["ymin"]),
            xmax: parse_f64(&caps["xmax"]),
            ymax: parse_f64(&caps["ymax"]),
            outlines: extract_outlines(text, section_start, section_end),
            unit: unit.clone(),
        });
    }
    (unit, records)
}

fn extract_outlines(text: &str, start: usize, end: usize) -> Vec<OutlineRecord> {
    let mut records = Vec::new();
    let mut pos = start;
    while let Some(found) = OUTLINE_LINE_RE.find_at(text, pos) {
        if found.start() >= end {
            break;
        }
        if let Some(outline) = parse_outline_line(found.as_str().trim()) {
            records.push(outline);
        }
        pos = found.end().max(found.start() + 1);
    }
    records
}

fn parse_outline_line(line: &str) -> Option<OutlineRecord> {
    let type_token = line.split_ascii_whitespace().next()?;
    let shape = match type_token {
        "RC" => {
            let caps = RC_RE.captures(line)?;
            OutlineShape::Rect {
                llx: parse_f64(&caps[1]),
                lly: parse_f64(&caps[2]),
                w: parse_f64(&caps[3]),
                h: parse_f64(&caps[4]),
            }
        }
        "CR" => {
            let caps = CR_RE.captures(line)?;
            OutlineShape::Circle {
                xc: parse_f64(&caps[1]),
                yc: parse_f64(&caps[2]),
                r: parse_f64(&caps[3]),
            }
        }
        "SQ" => {
            let caps = SQ_RE.captures(line)?;
            OutlineShape::Square {
                xc: parse_f64(&caps[1]),
                yc: parse_f64(&caps[2]),
                half: parse_f64(&caps[3]),
            }
        }
        _ => return None,
    };
    Some(OutlineRecord {
        shape,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
UNITS=MM
HDR generated by test
PKG SOIC8 1.27 -2.5 -3.1 2.5 3.1
RC -2.5 -3.1 5 6.2
PIN 1 T 0 0 0 U U
PKG DISC 0 -1 -1 1 1
CR 0 0 1
SQ 0 0 1.5
RC malformed
";

    #[test]
    fn parses_pkg_sections_with_ordinal_indices() {
        let (unit, records) = parse_eda_data(SAMPLE);
        assert_eq!(unit, Unit::Mm);
        assert_eq!(records.len(), 2);

        let soic = &records[0];
        assert_eq!(soic.index, 0);
        assert_eq!(soic.name, "SOIC8");
        assert_eq!(soic.pitch, 1.27);
        assert_eq!((soic.xmin, soic.ymin, soic.xmax, soic.ymax), (-2.5, -3.1, 2.5, 3.1));
        // The PIN keyword terminates the first section.
        assert_eq!(soic.outlines.len(), 1);
        assert_eq!(
            soic.outlines[0].shape,
            OutlineShape::Rect {
                llx: -2.5,
                lly: -3.1,
                w: 5.0,
                h: 6.2
            }
        );

        let disc = &records[1];
        assert_eq!(disc.index, 1);
        // The malformed RC line is dropped; CR and SQ survive.
        assert_eq!(disc.outlines.len(), 2);
        assert_eq!(
            disc.outlines[0].shape,
            OutlineShape::Circle {
                xc: 0.0,
                yc: 0.0,
                r: 1.0
            }
        );
        assert_eq!(disc.outlines[1].raw, "SQ 0 0 1.5");
    }

    #[test]
    fn rect_polygon_corners_are_ordered() {
        let shape = OutlineShape::Rect {
            llx: 1.0,
            lly: 2.0,
            w: 3.0,
            h: 4.0,
        };
        assert_eq!(
            shape.polygon(),
            vec![(1.0, 2.0), (4.0, 2.0), (4.0, 6.0), (1.0, 6.0)]
        );
    }

    #[test]
    fn square_and_circle_dimensions_are_symmetric() {
        let square = OutlineShape::Square {
            xc: 0.0,
            yc: 0.0,
            half: -1.5,
        };
        assert_eq!(square.dimensions(), (3.0, 3.0));
        assert_eq!(square.polygon().len(), 4);

        let circle = OutlineShape::Circle {
            xc: 0.0,
            yc: 0.0,
            r: 0.03,
        };
        assert_eq!(circle.dimensions(), (0.06, 0.06));
        assert!(circle.polygon().is_empty());
    }

    #[test]
    fn file_without_pkg_entries_yields_empty_list() {
        let (unit, records) = parse_eda_data("UNITS=INCH\nFID 0 1 2\n");
        assert_eq!(unit, Unit::Inch);
        assert!(records.is_empty());
    }
}
