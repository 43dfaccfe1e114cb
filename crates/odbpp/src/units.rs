//! Measurement units as they appear in ODB++ text files.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^[ \t]*U(?:NITS)?[ \t]*=[ \t]*(INCH|MM)\b").unwrap());

/// Signed decimal token accepted by every numeric field in the line grammars.
pub(crate) const NUMERIC_PATTERN: &str = r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)";

pub const MM_PER_INCH: f64 = 25.4;

/// A length unit declared by a `UNITS =` line. Tokens other than the two
/// the format actually uses are preserved uppercased; conversion treats
/// them as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Inch,
    Mm,
    Other(String),
}

impl Unit {
    /// Normalize a raw unit token (`IN`/`INCH`, `MM`/`MILLIMETER(S)`).
    /// Returns `None` for blank input.
    pub fn normalize(token: &str) -> Option<Unit> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return None;
        }
        let upper = trimmed.to_ascii_uppercase();
        Some(match upper.as_str() {
            "IN" | "INCH" => Unit::Inch,
            "MM" | "MILLIMETER" | "MILLIMETERS" => Unit::Mm,
            _ => Unit::Other(upper),
        })
    }

    /// Detect the unit declared in an ODB++ text file. Defaults to inches
    /// when no `U[NITS] =` line is present.
    pub fn detect(text: &str) -> Unit {
        match UNIT_RE.captures(text) {
            Some(caps) => Unit::normalize(&caps[1]).unwrap_or(Unit::Inch),
            None => Unit::Inch,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Unit::Inch => "INCH",
            Unit::Mm => "MM",
            Unit::Other(name) => name,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert between inches and millimeters; any other pairing is a no-op.
pub fn convert(value: f64, from: &Unit, to: &Unit) -> f64 {
    match (from, to) {
        (Unit::Inch, Unit::Mm) => value * MM_PER_INCH,
        (Unit::Mm, Unit::Inch) => value / MM_PER_INCH,
        _ => value,
    }
}

/// Lenient numeric parse used across the line grammars: malformed numbers
/// become 0.0 rather than errors.
pub(crate) fn parse_f64(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_tokens() {
        assert_eq!(Unit::normalize("inch"), Some(Unit::Inch));
        assert_eq!(Unit::normalize(" IN "), Some(Unit::Inch));
        assert_eq!(Unit::normalize("mm"), Some(Unit::Mm));
        assert_eq!(Unit::normalize("Millimeters"), Some(Unit::Mm));
        assert_eq!(Unit::normalize("mil"), Some(Unit::Other("MIL".into())));
        assert_eq!(Unit::normalize("   "), None);
    }

    #[test]
    fn detects_unit_lines() {
        assert_eq!(Unit::detect("# header\nUNITS = MM\n"), Unit::Mm);
        assert_eq!(Unit::detect("U=INCH\n"), Unit::Inch);
        assert_eq!(Unit::detect("units=mm\n"), Unit::Mm);
        // Defaults to inches when nothing is declared.
        assert_eq!(Unit::detect("CMP 0 1 2 0 N a b\n"), Unit::Inch);
    }

    #[test]
    fn conversion_round_trips() {
        let value = 1.234_567;
        let there = convert(value, &Unit::Inch, &Unit::Mm);
        let back = convert(there, &Unit::Mm, &Unit::Inch);
        assert!((back - value).abs() / value < 1e-9);
        assert_eq!(convert(value, &Unit::Mm, &Unit::Mm), value);
        assert_eq!(convert(value, &Unit::Other("MIL".into()), &Unit::Mm), value);
    }

    #[test]
    fn lenient_numeric_parse() {
        assert_eq!(parse_f64("1.5"), 1.5);
        assert_eq!(parse_f64(" -2 "), -2.0);
        assert_eq!(parse_f64("bogus"), 0.0);
    }
}
