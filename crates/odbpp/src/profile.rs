//! Step `profile` parsing: the board outline as surfaces of closed paths.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::geom::BoundingBox;
use crate::units::{NUMERIC_PATTERN, Unit, parse_f64};

static SURFACE_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*S\s+P\s+0(?:\s*;;\s*ID\s*=\s*(\d+))?\s*$").unwrap());
static OB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*OB\s+({n})\s+({n})\s+([IH])\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static OS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*OS\s+({n})\s+({n})\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static OC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*OC\s+({n})\s+({n})\s+({n})\s+({n})\s+([YN])\s*$",
        n = NUMERIC_PATTERN
    ))
    .unwrap()
});
static OE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*OE\s*$").unwrap());
static SE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*SE\s*$").unwrap());

/// Whether a path outlines board material or a cutout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Island,
    Hole,
}

impl PathKind {
    pub fn as_char(self) -> char {
        match self {
            PathKind::Island => 'I',
            PathKind::Hole => 'H',
        }
    }
}

/// One raw record line inside a profile path.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRecord {
    Open { x: f64, y: f64 },
    Segment { x: f64, y: f64 },
    Arc { x: f64, y: f64, xc: f64, yc: f64, clockwise: bool },
    End,
}

impl ProfileRecord {
    /// The record's primary point, when it has one.
    pub fn point(&self) -> Option<(f64, f64)> {
        match *self {
            ProfileRecord::Open { x, y }
            | ProfileRecord::Segment { x, y }
            | ProfileRecord::Arc { x, y, .. } => Some((x, y)),
            ProfileRecord::End => None,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            ProfileRecord::Open { .. } => "OB",
            ProfileRecord::Segment { .. } => "OS",
            ProfileRecord::Arc { .. } => "OC",
            ProfileRecord::End => "OE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfilePath {
    pub kind: PathKind,
    pub records: Vec<ProfileRecord>,
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub id: Option<i64>,
    pub paths: Vec<ProfilePath>,
}

/// A step's parsed board outline.
#[derive(Debug, Clone)]
pub struct StepProfile {
    pub unit: Unit,
    pub surfaces: Vec<Surface>,
}

impl StepProfile {
    /// Box over the primary point of every record, `None` when the profile
    /// carries no points at all.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(
            self.surfaces
                .iter()
                .flat_map(|surface| surface.paths.iter())
                .flat_map(|path| path.records.iter())
                .filter_map(|record| record.point()),
        )
    }
}

/// Line-at-a-time state machine over a profile body.
///
/// State is (outside surface | in surface | in path), tracked by the two
/// options below. A new `OB` closes whatever path is open, and `SE` or
/// end-of-input flushes both levels, so truncated files still yield their
/// records.
struct ProfileParser {
    surfaces: Vec<Surface>,
    surface: Option<Surface>,
    path: Option<ProfilePath>,
}

impl ProfileParser {
    fn new() -> Self {
        ProfileParser {
            surfaces: Vec::new(),
            surface: None,
            path: None,
        }
    }

    fn on_surface_start(&mut self, id: Option<i64>) {
        // `S P 0` lines inside an open surface are ignored, matching the
        // tolerant single-pass reading of the format.
        if self.surface.is_some() {
            return;
        }
        self.surface = Some(Surface {
            id,
            paths: Vec::new(),
        });
    }

    fn on_open(&mut self, x: f64, y: f64, kind: PathKind) {
        if self.surface.is_none() {
            return;
        }
        self.close_path();
        self.path = Some(ProfilePath {
            kind,
            records: vec![ProfileRecord::Open { x, y }],
        });
    }

    fn on_segment(&mut self, x: f64, y: f64) {
        if let Some(path) = &mut self.path {
            path.records.push(ProfileRecord::Segment { x, y });
        }
    }

    fn on_arc(&mut self, x: f64, y: f64, xc: f64, yc: f64, clockwise: bool) {
        if let Some(path) = &mut self.path {
            path.records.push(ProfileRecord::Arc {
                x,
                y,
                xc,
                yc,
                clockwise,
            });
        }
    }

    fn on_path_end(&mut self) {
        if let Some(path) = &mut self.path {
            path.records.push(ProfileRecord::End);
        }
        self.close_path();
    }

    fn on_surface_end(&mut self) {
        self.end_surface();
    }

    fn close_path(&mut self) {
        if let Some(path) = self.path.take() {
            if let Some(surface) = &mut self.surface {
                surface.paths.push(path);
            }
        }
    }

    fn end_surface(&mut self) {
        self.close_path();
        if let Some(surface) = self.surface.take() {
            self.surfaces.push(surface);
        }
    }

    fn finish(mut self) -> Vec<Surface> {
        self.end_surface();
        self.surfaces
    }
}

/// Parse a profile file body. Blank and `#` comment lines are skipped in
/// any state; unrecognized lines are ignored.
pub fn parse_profile(text: &str) -> StepProfile {
    let unit = Unit::detect(text);
    let mut parser = ProfileParser::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(caps) = SURFACE_START_RE.captures(line) {
            let id = caps.get(1).and_then(|m| m.as_str().parse().ok());
            parser.on_surface_start(id);
        } else if SE_RE.is_match(line) {
            parser.on_surface_end();
        } else if let Some(caps) = OB_RE.captures(line) {
            let kind = if caps[3].eq_ignore_ascii_case("H") {
                PathKind::Hole
            } else {
                PathKind::Island
            };
            parser.on_open(parse_f64(&caps[1]), parse_f64(&caps[2]), kind);
        } else if let Some(caps) = OS_RE.captures(line) {
            parser.on_segment(parse_f64(&caps[1]), parse_f64(&caps[2]));
        } else if let Some(caps) = OC_RE.captures(line) {
            parser.on_arc(
                parse_f64(&caps[1]),
                parse_f64(&caps[2]),
                parse_f64(&caps[3]),
                parse_f64(&caps[4]),
                caps[5].eq_ignore_ascii_case("Y"),
            );
        } else if OE_RE.is_match(line) {
            parser.on_path_end();
        }
    }

    StepProfile {
        unit,
        surfaces: parser.finish(),
    }
}
