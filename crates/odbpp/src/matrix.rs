//! `matrix` file parsing: step names and component-layer names.

use once_cell::sync::Lazy;
use regex::Regex;

static STEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)STEP\s*\{\s*(?:[^{}]|\{[^{}]*\})*?\bNAME\s*=\s*([^\r\n}]+)").unwrap()
});
static LAYER_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)LAYER\s*\{\s*(.*?)\s*\}").unwrap());
static CONTEXT_BOARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bCONTEXT\s*=\s*BOARD\b").unwrap());
static TYPE_COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bTYPE\s*=\s*COMPONENT\b").unwrap());
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNAME\s*=\s*([^\r\n}]+)").unwrap());

/// Steps and component layers named by a job's matrix file, in file order.
#[derive(Debug, Default, Clone)]
pub struct MatrixInfo {
    pub steps: Vec<String>,
    /// Layers whose blocks carry both `CONTEXT=BOARD` and `TYPE=COMPONENT`.
    pub component_layers: Vec<String>,
}

/// Extract every `STEP` block's name and the names of all component layers.
/// Attribute order within a block is irrelevant; blocks missing a `NAME`
/// are skipped rather than treated as errors.
pub fn parse_matrix(text: &str) -> MatrixInfo {
    let steps = STEP_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps[1].trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect();

    let mut component_layers = Vec::new();
    for block in LAYER_BLOCK_RE.captures_iter(text) {
        let body = &block[1];
        if !CONTEXT_BOARD_RE.is_match(body) || !TYPE_COMPONENT_RE.is_match(body) {
            continue;
        }
        if let Some(caps) = NAME_RE.captures(body) {
            let name = caps[1].trim();
            if !name.is_empty() {
                component_layers.push(name.to_string());
            }
        }
    }

    MatrixInfo {
        steps,
        component_layers,
    }
}
