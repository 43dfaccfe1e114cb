//! Layer `components` file parsing (`CMP` placement records).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::units::Unit;

static CMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*CMP\s+(?P<pkg_ref>\d+)\s+(?P<x>-?\d+(?:\.\d+)?)\s+(?P<y>-?\d+(?:\.\d+)?)\s+(?P<rot>-?\d+(?:\.\d+)?)\s+(?P<mirror>[NM])\s+(?P<comp_name>\S+)\s+(?P<part_name>\S+)",
    )
    .unwrap()
});

/// One raw `CMP` line. Numeric fields stay as written in the source; they
/// are parsed (leniently, defaulting to zero) only when placements are
/// computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub pkg_ref: String,
    pub x: String,
    pub y: String,
    /// Clockwise degrees as written in the source.
    pub rot: String,
    pub mirror: String,
    pub component_name: String,
    pub part_name: String,
    pub unit: Unit,
}

impl ComponentRecord {
    pub fn is_mirrored(&self) -> bool {
        self.mirror.trim().eq_ignore_ascii_case("M")
    }
}

/// All components parsed out of one layer file.
#[derive(Debug, Clone)]
pub struct ComponentList {
    pub unit: Unit,
    pub records: Vec<ComponentRecord>,
}

/// Parse a `components` file. Lines that do not match the `CMP` grammar are
/// skipped without error; trailing tokens after the part name are ignored.
pub fn parse_components(text: &str) -> ComponentList {
    let unit = Unit::detect(text);
    let records = text
        .lines()
        .filter_map(|line| {
            let caps = CMP_RE.captures(line)?;
            Some(ComponentRecord {
                pkg_ref: caps["pkg_ref"].to_string(),
                x: caps["x"].to_string(),
                y: caps["y"].to_string(),
                rot: caps["rot"].to_string(),
                mirror: caps["mirror"].to_string(),
                component_name: caps["comp_name"].to_string(),
                part_name: caps["part_name"].to_string(),
                unit: unit.clone(),
            })
        })
        .collect();
    ComponentList { unit, records }
}
