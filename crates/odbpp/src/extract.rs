//! Top-level extraction workflow: input classification, archive unpacking,
//! job building and report export.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::archive;
use crate::job::{Job, build_job};
use crate::placement::{CoordinateOrigin, FlipOptions, PlacementOptions, compute_placements};
use crate::report;
use crate::units::Unit;

/// Fatal extraction failures. Everything below this level degrades the
/// affected step/layer instead of failing the job.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("file or directory not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("failed to unpack {}: {source}", path.display())]
    Unpack {
        path: PathBuf,
        extract_dir: PathBuf,
        source: std::io::Error,
    },

    #[error("matrix file not found under {}", extract_dir.display())]
    MatrixNotFound {
        input: PathBuf,
        extract_dir: PathBuf,
    },

    #[error("I/O failure during extraction: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Which placement reports to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementExportMode {
    None,
    BottomLeft,
    TopLeft,
    #[default]
    Both,
}

/// Preferences for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub export_job_report: bool,
    pub placement_mode: PlacementExportMode,
    /// Write one placement document per layer instead of one per origin.
    pub separate_by_layer: bool,
    /// Case-insensitive layer names to export; `None` or empty exports all.
    pub layer_filter: Option<Vec<String>>,
    /// Convert placement coordinates and dimensions to this unit.
    pub target_unit: Option<Unit>,
    pub flip: Option<FlipOptions>,
    /// Directory the XML reports are written to.
    pub report_dir: PathBuf,
    /// Directory hosting the temporary extraction dir for archive inputs.
    /// Defaults to the system temp dir.
    pub work_dir: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            export_job_report: true,
            placement_mode: PlacementExportMode::default(),
            separate_by_layer: false,
            layer_filter: None,
            target_unit: None,
            flip: None,
            report_dir: PathBuf::from("reports"),
            work_dir: None,
        }
    }
}

/// Outcome of a successful extraction.
#[derive(Debug)]
pub struct Extraction {
    pub input_path: PathBuf,
    /// Directory the job was read from. For archive inputs this is a
    /// temporary directory that has already been cleaned up.
    pub extract_dir: PathBuf,
    pub job: Job,
    pub job_report_path: Option<PathBuf>,
    pub placement_report_paths: Vec<PathBuf>,
    pub top_left_placement_report_paths: Vec<PathBuf>,
}

/// Extract an ODB++ job from a `.tgz`/`.tar.gz` archive or an already
/// extracted directory and write the requested reports.
///
/// Archive inputs are unpacked into an engine-owned temporary directory
/// that is deleted on every exit path; a directory input is read in place
/// and never modified.
pub fn extract(input: &Path, options: &ExtractOptions) -> Result<Extraction> {
    let is_archive = input.is_file() && archive::is_gzip_tar(input);
    let is_directory = input.is_dir();
    if !is_archive && !is_directory {
        return Err(ExtractionError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    // Keeping the TempDir alive until return guarantees cleanup on every
    // exit path, errors included.
    let mut temp_guard: Option<TempDir> = None;
    let extract_dir = if is_archive {
        let prefix = format!("{}_", archive::base_name(input));
        let temp = match &options.work_dir {
            Some(work_dir) => {
                std::fs::create_dir_all(work_dir)?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(work_dir)
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir(),
        }?;
        let dir = temp.path().to_path_buf();
        archive::unpack_tar_gz(input, &dir).map_err(|source| ExtractionError::Unpack {
            path: input.to_path_buf(),
            extract_dir: dir.clone(),
            source,
        })?;
        temp_guard = Some(temp);
        dir
    } else {
        std::fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf())
    };

    let job = build_job(&extract_dir, input).ok_or_else(|| ExtractionError::MatrixNotFound {
        input: input.to_path_buf(),
        extract_dir: extract_dir.clone(),
    })?;

    let job_report_path = if options.export_job_report {
        Some(save_job_report(&job, &options.report_dir)?)
    } else {
        None
    };

    let placement_options = |origin| PlacementOptions {
        origin,
        target_unit: options.target_unit.clone(),
        flip: options.flip,
    };
    let mut placement_report_paths = Vec::new();
    let mut top_left_placement_report_paths = Vec::new();
    if matches!(
        options.placement_mode,
        PlacementExportMode::BottomLeft | PlacementExportMode::Both
    ) {
        placement_report_paths = export_placement_reports(
            &job,
            &placement_options(CoordinateOrigin::BottomLeft),
            options.separate_by_layer,
            options.layer_filter.as_deref(),
            &options.report_dir,
        )?;
    }
    if matches!(
        options.placement_mode,
        PlacementExportMode::TopLeft | PlacementExportMode::Both
    ) {
        top_left_placement_report_paths = export_placement_reports(
            &job,
            &placement_options(CoordinateOrigin::TopLeft),
            options.separate_by_layer,
            options.layer_filter.as_deref(),
            &options.report_dir,
        )?;
    }

    drop(temp_guard);
    Ok(Extraction {
        input_path: input.to_path_buf(),
        extract_dir,
        job,
        job_report_path,
        placement_report_paths,
        top_left_placement_report_paths,
    })
}

/// Write the job-wide report and return its path.
pub fn save_job_report(job: &Job, report_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(report_dir)?;
    let path = report_dir.join(format!("{}.xml", report_file_stem(job)));
    let xml = report::job_report_xml(job)?;
    std::fs::write(&path, xml)?;
    log::debug!("job report saved to {}", path.display());
    Ok(path)
}

/// Write component placement reports for one origin. Returns the written
/// paths; an empty list means no component had resolvable package data.
pub fn export_placement_reports(
    job: &Job,
    placement_options: &PlacementOptions,
    separate_by_layer: bool,
    layer_filter: Option<&[String]>,
    report_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut placements = compute_placements(job, placement_options);
    if let Some(filter) = layer_filter {
        let allowed: HashSet<String> = filter
            .iter()
            .map(|name| name.trim().to_ascii_uppercase())
            .collect();
        if !allowed.is_empty() {
            placements.retain(|placement| {
                allowed.contains(&placement.layer.trim().to_ascii_uppercase())
            });
        }
    }

    let origin = placement_options.origin;
    if placements.is_empty() {
        log::debug!(
            "placement report ({}) skipped: no components with package data",
            origin.as_str()
        );
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(report_dir)?;
    let stem = report_file_stem(job);
    let mut paths = Vec::new();

    if !separate_by_layer {
        let xml = report::placement_report_xml(job, &placements, origin, None)?;
        let path = report_dir.join(format!("{stem}_components.xml"));
        std::fs::write(&path, xml)?;
        log::debug!(
            "placement report ({}) saved to {}",
            origin.as_str(),
            path.display()
        );
        paths.push(path);
        return Ok(paths);
    }

    let mut used_suffixes = HashSet::new();
    let mut layer_groups: Vec<(String, Vec<crate::placement::ComponentPlacement>)> = Vec::new();
    for placement in placements {
        match layer_groups
            .iter_mut()
            .find(|(layer, _)| *layer == placement.layer)
        {
            Some((_, group)) => group.push(placement),
            None => layer_groups.push((placement.layer.clone(), vec![placement])),
        }
    }

    for (layer_name, group) in layer_groups {
        let display = if layer_name.trim().is_empty() {
            "layer"
        } else {
            layer_name.as_str()
        };
        let suffix = format!("_components_{}", report::sanitize_file_name(display));
        let mut unique = suffix.clone();
        let mut counter = 1;
        while used_suffixes.contains(&unique.to_ascii_uppercase()) {
            unique = format!("{suffix}_{counter}");
            counter += 1;
        }
        used_suffixes.insert(unique.to_ascii_uppercase());

        let xml = report::placement_report_xml(job, &group, origin, Some(display))?;
        let path = report_dir.join(format!("{stem}{unique}.xml"));
        std::fs::write(&path, xml)?;
        log::debug!(
            "placement report ({} layer={display}) saved to {}",
            origin.as_str(),
            path.display()
        );
        paths.push(path);
    }
    Ok(paths)
}

fn report_file_stem(job: &Job) -> String {
    let base = if job.source_archive.is_empty() {
        "job".to_string()
    } else {
        archive::base_name(Path::new(&job.source_archive))
    };
    let timestamp = job.extracted_at.format("%Y%m%d%H%M%S");
    format!("{}_{timestamp}", report::sanitize_file_name(&base))
}
