//! The in-memory job model and the builder that walks an extracted tree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::archive::read_text_maybe_gzip;
use crate::components::{ComponentList, parse_components};
use crate::eda::{EdaData, parse_eda_data};
use crate::geom::{BoundingBox, is_zero};
use crate::lzw;
use crate::matrix::parse_matrix;
use crate::profile::{StepProfile, parse_profile};
use crate::units::Unit;

/// Root of one extraction. Built once, immutable afterwards.
#[derive(Debug)]
pub struct Job {
    /// File name of the source archive or directory.
    pub source_archive: String,
    pub source_path: PathBuf,
    pub extract_dir: PathBuf,
    pub matrix_path: PathBuf,
    pub extracted_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    /// Merge of all per-step profile boxes; informational only.
    pub bounding_box: Option<BoundingBox>,
}

/// One PCB step (panel position) within a job.
#[derive(Debug)]
pub struct Step {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub unit: Option<Unit>,
    pub profile: Option<StepProfile>,
    pub bounding_box: Option<BoundingBox>,
    pub layers: Vec<Layer>,
    pub eda: Option<EdaData>,
}

/// One component layer within a step.
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub components_path: Option<PathBuf>,
    pub components: Option<ComponentList>,
}

/// Walk an extracted job tree and assemble the [`Job`] model.
///
/// Returns `None` when no `matrix` file can be located — the only condition
/// fatal to the whole walk. Missing steps, layers or EDA data degrade to
/// absent entries instead.
pub fn build_job(extract_dir: &Path, source_path: &Path) -> Option<Job> {
    let matrix_path = find_matrix_file(extract_dir)?;
    let matrix_text = match read_text_maybe_gzip(&matrix_path) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("failed to read {}: {err}", matrix_path.display());
            return None;
        }
    };
    let info = parse_matrix(&matrix_text);
    log::debug!(
        "matrix names {} step(s) and {} component layer(s)",
        info.steps.len(),
        info.component_layers.len()
    );

    let steps_root = matrix_path
        .parent()
        .and_then(|matrix_dir| matrix_dir.parent())
        .map(|job_root| job_root.join("steps"));
    let walk_steps = steps_root.as_ref().is_some_and(|root| root.is_dir());
    if !walk_steps {
        log::debug!("no steps directory adjacent to the matrix folder");
    }

    let mut job_bbox: Option<BoundingBox> = None;
    let mut steps = Vec::with_capacity(info.steps.len());
    for step_name in &info.steps {
        let step_dir = steps_root
            .as_ref()
            .map(|root| root.join(step_name))
            .unwrap_or_default();
        let exists = walk_steps && step_dir.is_dir();
        let mut step = Step {
            name: step_name.clone(),
            path: step_dir.clone(),
            exists,
            unit: None,
            profile: None,
            bounding_box: None,
            layers: Vec::new(),
            eda: None,
        };

        if walk_steps {
            if exists {
                load_profile(&mut step, &step_dir);
            } else {
                log::debug!("step '{step_name}' directory missing: {}", step_dir.display());
            }

            for layer_name in &info.component_layers {
                step.layers.push(load_layer(&step_dir, layer_name));
            }

            if exists {
                load_eda(&mut step, &step_dir);
            }

            if let Some(bbox) = step.bounding_box {
                job_bbox = Some(match job_bbox {
                    Some(merged) => merged.merge(&bbox),
                    None => bbox,
                });
            }
        }

        steps.push(step);
    }

    if let Some(bbox) = job_bbox {
        warn_if_offset_origin(&bbox, "overall");
    }

    Some(Job {
        source_archive: source_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string(),
        source_path: source_path.to_path_buf(),
        extract_dir: extract_dir.to_path_buf(),
        matrix_path,
        extracted_at: Utc::now(),
        steps,
        bounding_box: job_bbox,
    })
}

/// Locate the matrix file: the first directory literally named `matrix`
/// anywhere under `root`, then the first file named `matrix` inside it.
fn find_matrix_file(root: &Path) -> Option<PathBuf> {
    let matrix_dir = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case("matrix"))
        })?
        .into_path();

    let mut entries: Vec<_> = std::fs::read_dir(&matrix_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());
    entries
        .into_iter()
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.eq_ignore_ascii_case("matrix"))
        })
}

fn load_profile(step: &mut Step, step_dir: &Path) {
    let profile_path = step_dir.join("profile");
    if !profile_path.is_file() {
        log::debug!("step '{}' has no profile file", step.name);
        return;
    }
    let text = match read_text_maybe_gzip(&profile_path) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("failed to read {}: {err}", profile_path.display());
            return;
        }
    };
    let profile = parse_profile(&text);
    step.unit = Some(profile.unit.clone());
    if let Some(bbox) = profile.bounding_box() {
        warn_if_offset_origin(&bbox, &step.name);
        step.bounding_box = Some(bbox);
    }
    step.profile = Some(profile);
}

fn load_layer(step_dir: &Path, layer_name: &str) -> Layer {
    let layer_dir = step_dir.join("layers").join(layer_name.to_lowercase());
    let exists = layer_dir.is_dir();
    let mut layer = Layer {
        name: layer_name.to_string(),
        path: layer_dir.clone(),
        exists,
        components_path: None,
        components: None,
    };
    if !exists {
        log::debug!("layer '{layer_name}' missing: {}", layer_dir.display());
        return layer;
    }

    if let Some(components_path) = ensure_plain_file(&layer_dir, "components") {
        match read_text_maybe_gzip(&components_path) {
            Ok(text) => {
                let list = parse_components(&text);
                log::debug!(
                    "parsed {} CMP record(s) from {} (unit {})",
                    list.records.len(),
                    components_path.display(),
                    list.unit
                );
                layer.components = Some(list);
            }
            Err(err) => log::warn!("failed to read {}: {err}", components_path.display()),
        }
        layer.components_path = Some(components_path);
    }
    layer
}

fn load_eda(step: &mut Step, step_dir: &Path) {
    let eda_dir = step_dir.join("eda");
    if !eda_dir.is_dir() {
        log::debug!("step '{}' has no eda directory", step.name);
        return;
    }
    let Some(data_path) = ensure_plain_file(&eda_dir, "data") else {
        return;
    };
    match read_text_maybe_gzip(&data_path) {
        Ok(text) => {
            let (unit, records) = parse_eda_data(&text);
            log::debug!(
                "parsed {} PKG record(s) from {} (unit {unit})",
                records.len(),
                data_path.display()
            );
            step.eda = Some(EdaData {
                unit,
                data_path,
                records,
            });
        }
        Err(err) => log::warn!("failed to read {}: {err}", data_path.display()),
    }
}

/// Return `<dir>/<name>`, decompressing a `<name>.Z` sibling next to it
/// when only the compressed form exists. Any failure leaves the unit
/// absent.
fn ensure_plain_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Some(plain);
    }
    let compressed = dir.join(format!("{name}.Z"));
    if !compressed.is_file() {
        log::debug!("no {name} or {name}.Z in {}", dir.display());
        return None;
    }

    let data = match std::fs::read(&compressed) {
        Ok(data) => data,
        Err(err) => {
            log::warn!("failed to read {}: {err}", compressed.display());
            return None;
        }
    };
    match lzw::decompress(&data) {
        Ok(bytes) => match std::fs::write(&plain, bytes) {
            Ok(()) => Some(plain),
            Err(err) => {
                log::warn!("failed to write {}: {err}", plain.display());
                None
            }
        },
        Err(err) => {
            log::warn!("failed to decompress {}: {err}", compressed.display());
            None
        }
    }
}

fn warn_if_offset_origin(bbox: &BoundingBox, context: &str) {
    if !is_zero(bbox.min_x) || !is_zero(bbox.min_y) {
        log::warn!(
            "{context} profile bounding box minimum expected at the origin, found ({}, {})",
            bbox.min_x,
            bbox.min_y
        );
    }
}
