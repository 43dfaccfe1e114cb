//! Component placement computation: the pipeline that turns raw CMP
//! records into oriented, unit-converted board coordinates.

use std::collections::HashMap;

use crate::components::ComponentRecord;
use crate::eda::{EdaData, OutlineShape, PkgRecord};
use crate::geom::is_zero;
use crate::job::{Job, Layer, Step};
use crate::units::{self, Unit, parse_f64};

/// Where (0,0) sits in exported coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordinateOrigin {
    #[default]
    BottomLeft,
    TopLeft,
}

impl CoordinateOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateOrigin::BottomLeft => "bottom-left",
            CoordinateOrigin::TopLeft => "top-left",
        }
    }
}

/// Post-transform axis mirroring requested by the caller, applied after
/// every other coordinate adjustment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlipOptions {
    pub flip_x: bool,
    pub flip_y: bool,
    /// Restrict the flips to `*_BOT` layers.
    pub bottom_layers_only: bool,
}

impl FlipOptions {
    pub fn any(&self) -> bool {
        self.flip_x || self.flip_y
    }
}

/// Options for one placement computation.
#[derive(Debug, Clone, Default)]
pub struct PlacementOptions {
    pub origin: CoordinateOrigin,
    /// Convert final coordinates and dimensions to this unit.
    pub target_unit: Option<Unit>,
    pub flip: Option<FlipOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rect,
    Circle,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Rect => "rect",
            Shape::Circle => "circle",
        }
    }
}

/// One fully transformed component placement.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlacement {
    pub step: String,
    pub layer: String,
    pub name: String,
    pub package_name: String,
    pub center_x: f64,
    pub center_y: f64,
    /// Counter-clockwise degrees in `[0, 360)`.
    pub rotation: f64,
    pub width: f64,
    pub length: f64,
    pub shape: Shape,
    pub unit: Unit,
}

/// Compute placements for every (step, layer, component) triple in the job.
/// Steps without package data and layers without component records simply
/// contribute nothing; components whose package reference cannot be
/// resolved are dropped with a log entry.
pub fn compute_placements(job: &Job, options: &PlacementOptions) -> Vec<ComponentPlacement> {
    let mut placements = Vec::new();
    for step in &job.steps {
        let Some(eda) = &step.eda else { continue };
        if eda.records.is_empty() || step.layers.is_empty() {
            continue;
        }
        let packages: HashMap<usize, &PkgRecord> =
            eda.records.iter().map(|pkg| (pkg.index, pkg)).collect();
        for layer in &step.layers {
            let Some(components) = &layer.components else {
                continue;
            };
            for record in &components.records {
                if let Some(placement) =
                    place_component(step, layer, record, eda, &packages, options)
                {
                    placements.push(placement);
                }
            }
        }
    }
    placements
}

fn place_component(
    step: &Step,
    layer: &Layer,
    record: &ComponentRecord,
    eda: &EdaData,
    packages: &HashMap<usize, &PkgRecord>,
    options: &PlacementOptions,
) -> Option<ComponentPlacement> {
    let Some(pkg) = resolve_package(&record.pkg_ref, packages) else {
        log::debug!(
            "pkg_ref {} not resolved for component {}",
            record.pkg_ref,
            record.component_name
        );
        return None;
    };

    // Working unit: the component's own, then the layer's, then the EDA
    // file's, inches as the last resort. The package resolves the same way
    // but falls back to the component's unit.
    let component_unit = first_unit([
        Some(&record.unit),
        layer.components.as_ref().map(|list| &list.unit),
        Some(&eda.unit),
    ])
    .unwrap_or(Unit::Inch);
    let package_unit =
        first_unit([Some(&pkg.unit), Some(&eda.unit)]).unwrap_or_else(|| component_unit.clone());

    let convert = |value: f64| units::convert(value, &package_unit, &component_unit);

    let (xa, xb) = (convert(pkg.xmin), convert(pkg.xmax));
    let (min_x, max_x) = if xa <= xb { (xa, xb) } else { (xb, xa) };
    let (ya, yb) = (convert(pkg.ymin), convert(pkg.ymax));
    let (min_y, max_y) = if ya <= yb { (ya, yb) } else { (yb, ya) };
    let bounds_width = max_x - min_x;
    let bounds_length = max_y - min_y;
    let pkg_center = (min_x + bounds_width / 2.0, min_y + bounds_length / 2.0);

    let outline = pkg.outlines.first();
    let outline_dims = outline.map(|o| {
        let (w, l) = o.shape.dimensions();
        (convert(w).abs(), convert(l).abs())
    });
    let shape = match outline.map(|o| &o.shape) {
        Some(OutlineShape::Circle { .. }) => Shape::Circle,
        _ => Shape::Rect,
    };

    let quarter_turns = normalize_quarter_turns(parse_f64(&record.rot));
    let (mut offset_x, offset_y) = rotate_clockwise(pkg_center, quarter_turns);
    if record.is_mirrored() {
        offset_x = -offset_x;
    }

    let anchor_x = parse_f64(&record.x);
    let anchor_y = parse_f64(&record.y);
    let mut center_x = anchor_x + offset_x;
    let mut center_y = anchor_y + offset_y;

    let is_bottom = is_bottom_layer(&layer.name);
    if is_bottom {
        if let Some((step_min_x, step_max_x)) = step_horizontal_bounds(step, &component_unit) {
            // Reflect the anchor about the step's horizontal midline, then
            // re-apply the rotated offset.
            let mirrored_x = step_min_x + step_max_x - anchor_x;
            center_x = mirrored_x + offset_x;
        } else {
            log::warn!(
                "cannot mirror component '{}' on layer '{}': step width unknown",
                record.component_name,
                layer.name
            );
        }
    }

    if let Some((origin_x, origin_y)) = step_origin_offset(step, &component_unit) {
        if !is_zero(origin_x) || !is_zero(origin_y) {
            center_x -= origin_x;
            center_y -= origin_y;
        }
    }

    if options.origin == CoordinateOrigin::TopLeft {
        if let Some(step_height) = step_height(step, &component_unit) {
            center_y = step_height - center_y;
        }
    }

    if let Some(flip) = &options.flip {
        if flip.any() && (!flip.bottom_layers_only || is_bottom) {
            if flip.flip_x {
                center_x = -center_x;
            }
            if flip.flip_y {
                center_y = -center_y;
            }
        }
    }

    let rotation = ccw_rotation_degrees(quarter_turns);
    let (base_width, base_length) = outline_dims.unwrap_or((bounds_width, bounds_length));
    let (width, length) = swap_for_rotation(base_width, base_length, quarter_turns);
    let (mut width, mut length) = (width.abs(), length.abs());

    let unit = options
        .target_unit
        .clone()
        .unwrap_or_else(|| component_unit.clone());
    if let Some(target) = &options.target_unit {
        center_x = units::convert(center_x, &component_unit, target);
        center_y = units::convert(center_y, &component_unit, target);
        width = units::convert(width, &component_unit, target);
        length = units::convert(length, &component_unit, target);
    }

    Some(ComponentPlacement {
        step: step.name.clone(),
        layer: layer.name.clone(),
        name: record.component_name.clone(),
        package_name: pkg.name.clone(),
        center_x,
        center_y,
        rotation,
        width,
        length,
        shape,
        unit,
    })
}

fn first_unit<const N: usize>(candidates: [Option<&Unit>; N]) -> Option<Unit> {
    candidates.into_iter().flatten().next().cloned()
}

/// Resolve a CMP package reference against the indexed packages: exact
/// index first, then index−1 to tolerate 1-based references in the source.
pub fn resolve_package<'a>(
    pkg_ref: &str,
    packages: &HashMap<usize, &'a PkgRecord>,
) -> Option<&'a PkgRecord> {
    let parsed: i64 = pkg_ref.trim().parse().ok()?;
    let index = usize::try_from(parsed).ok()?;
    packages.get(&index).copied().or_else(|| {
        index
            .checked_sub(1)
            .and_then(|previous| packages.get(&previous).copied())
    })
}

/// Snap a clockwise rotation to quarter turns in {0,1,2,3}, rounding ties
/// away from zero.
pub fn normalize_quarter_turns(rotation_degrees: f64) -> u8 {
    if !rotation_degrees.is_finite() {
        return 0;
    }
    let turns = (rotation_degrees / 90.0).round() as i64;
    turns.rem_euclid(4) as u8
}

/// Exact clockwise rotation of a point by quarter turns; never
/// trigonometry, so right angles stay free of floating drift.
pub fn rotate_clockwise(point: (f64, f64), quarter_turns: u8) -> (f64, f64) {
    let (x, y) = point;
    match quarter_turns % 4 {
        1 => (y, -x),
        2 => (-x, -y),
        3 => (-y, x),
        _ => (x, y),
    }
}

/// Counter-clockwise output angle in `[0, 360)` for a snapped rotation.
pub fn ccw_rotation_degrees(quarter_turns: u8) -> f64 {
    match quarter_turns % 4 {
        0 => 0.0,
        turns => 360.0 - 90.0 * f64::from(turns),
    }
}

/// Width and length trade places on odd quarter turns.
pub fn swap_for_rotation(width: f64, length: f64, quarter_turns: u8) -> (f64, f64) {
    if quarter_turns % 2 == 0 {
        (width, length)
    } else {
        (length, width)
    }
}

fn is_bottom_layer(name: &str) -> bool {
    name.trim_end().to_ascii_uppercase().ends_with("_BOT")
}

fn convert_from_step(value: f64, step: &Step, target: &Unit) -> f64 {
    match &step.unit {
        Some(step_unit) => units::convert(value, step_unit, target),
        None => value,
    }
}

fn step_horizontal_bounds(step: &Step, target: &Unit) -> Option<(f64, f64)> {
    let bbox = step.bounding_box?;
    let a = convert_from_step(bbox.min_x, step, target);
    let b = convert_from_step(bbox.max_x, step, target);
    Some(if a <= b { (a, b) } else { (b, a) })
}

fn step_origin_offset(step: &Step, target: &Unit) -> Option<(f64, f64)> {
    let bbox = step.bounding_box?;
    Some((
        convert_from_step(bbox.min_x, step, target),
        convert_from_step(bbox.min_y, step, target),
    ))
}

fn step_height(step: &Step, target: &Unit) -> Option<f64> {
    let bbox = step.bounding_box?;
    let min_y = convert_from_step(bbox.min_y, step, target);
    let max_y = convert_from_step(bbox.max_y, step, target);
    Some((max_y - min_y).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eda::OutlineRecord;
    use crate::geom::BoundingBox;
    use crate::{ComponentList, EdaData, Job, Layer, Step};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(pkg_ref: &str, x: &str, y: &str, rot: &str, mirror: &str, name: &str) -> ComponentRecord {
        ComponentRecord {
            pkg_ref: pkg_ref.into(),
            x: x.into(),
            y: y.into(),
            rot: rot.into(),
            mirror: mirror.into(),
            component_name: name.into(),
            part_name: "part".into(),
            unit: Unit::Inch,
        }
    }

    fn rect_pkg(index: usize, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> PkgRecord {
        PkgRecord {
            index,
            name: format!("PKG{index}"),
            pitch: 0.0,
            xmin,
            ymin,
            xmax,
            ymax,
            outlines: vec![OutlineRecord {
                shape: OutlineShape::Rect {
                    llx: xmin,
                    lly: ymin,
                    w: xmax - xmin,
                    h: ymax - ymin,
                },
                raw: String::new(),
            }],
            unit: Unit::Inch,
        }
    }

    fn job_with(
        layer_name: &str,
        records: Vec<ComponentRecord>,
        pkgs: Vec<PkgRecord>,
        bbox: Option<BoundingBox>,
    ) -> Job {
        Job {
            source_archive: "job.tgz".into(),
            source_path: PathBuf::from("job.tgz"),
            extract_dir: PathBuf::new(),
            matrix_path: PathBuf::new(),
            extracted_at: Utc::now(),
            steps: vec![Step {
                name: "pcb1".into(),
                path: PathBuf::new(),
                exists: true,
                unit: bbox.map(|_| Unit::Inch),
                profile: None,
                bounding_box: bbox,
                layers: vec![Layer {
                    name: layer_name.into(),
                    path: PathBuf::new(),
                    exists: true,
                    components_path: None,
                    components: Some(ComponentList {
                        unit: Unit::Inch,
                        records,
                    }),
                }],
                eda: Some(EdaData {
                    unit: Unit::Inch,
                    data_path: PathBuf::new(),
                    records: pkgs,
                }),
            }],
            bounding_box: bbox,
        }
    }

    fn board_bbox() -> Option<BoundingBox> {
        BoundingBox::from_points([(0.0, 0.0), (2.0, 1.0)])
    }

    #[test]
    fn snapping_rounds_ties_away_from_zero() {
        assert_eq!(normalize_quarter_turns(0.0), 0);
        assert_eq!(normalize_quarter_turns(44.0), 0);
        assert_eq!(normalize_quarter_turns(45.0), 1);
        assert_eq!(normalize_quarter_turns(-45.0), 3);
        assert_eq!(normalize_quarter_turns(180.0), 2);
        assert_eq!(normalize_quarter_turns(269.0), 3);
        assert_eq!(normalize_quarter_turns(f64::NAN), 0);
    }

    #[test]
    fn rotation_is_stable_under_full_turns() {
        for degrees in [-450.0, -90.0, 0.0, 45.0, 90.0, 135.0, 270.0, 359.0] {
            let base = normalize_quarter_turns(degrees);
            assert_eq!(base, normalize_quarter_turns(degrees + 360.0));
            assert_eq!(base, normalize_quarter_turns(degrees - 360.0));
            let ccw = ccw_rotation_degrees(base);
            assert!((0.0..360.0).contains(&ccw));
        }
        assert_eq!(ccw_rotation_degrees(0), 0.0);
        assert_eq!(ccw_rotation_degrees(1), 270.0);
        assert_eq!(ccw_rotation_degrees(2), 180.0);
        assert_eq!(ccw_rotation_degrees(3), 90.0);
    }

    #[test]
    fn dimensions_swap_only_on_odd_turns() {
        for turns in 0..4u8 {
            let (w, l) = swap_for_rotation(2.0, 5.0, turns);
            if turns % 2 == 1 {
                assert_eq!((w, l), (5.0, 2.0));
            } else {
                assert_eq!((w, l), (2.0, 5.0));
            }
        }
    }

    #[test]
    fn quarter_turn_rotation_table() {
        let p = (2.0, 3.0);
        assert_eq!(rotate_clockwise(p, 0), (2.0, 3.0));
        assert_eq!(rotate_clockwise(p, 1), (3.0, -2.0));
        assert_eq!(rotate_clockwise(p, 2), (-2.0, -3.0));
        assert_eq!(rotate_clockwise(p, 3), (-3.0, 2.0));
    }

    #[test]
    fn mirror_flag_negates_only_offset_x() {
        // Package center offset (0.05, 0.02) from the anchor.
        let pkgs = vec![rect_pkg(0, 0.0, -0.005, 0.1, 0.045)];
        let normal = job_with(
            "comp_+_top",
            vec![record("0", "1", "0.5", "0", "N", "C1")],
            pkgs.clone(),
            board_bbox(),
        );
        let mirrored = job_with(
            "comp_+_top",
            vec![record("0", "1", "0.5", "0", "M", "C1")],
            pkgs,
            board_bbox(),
        );

        let options = PlacementOptions::default();
        let normal = compute_placements(&normal, &options);
        let mirrored = compute_placements(&mirrored, &options);
        let (n, m) = (&normal[0], &mirrored[0]);
        assert!((n.center_x - 1.05).abs() < 1e-12);
        assert!((m.center_x - 0.95).abs() < 1e-12);
        assert!((n.center_y - m.center_y).abs() < 1e-12);
    }

    #[test]
    fn top_left_equals_flipped_bottom_left() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let job = job_with(
            "comp_+_top",
            vec![record("0", "0.5", "0.25", "90", "N", "C1")],
            pkgs,
            board_bbox(),
        );

        let bottom = compute_placements(
            &job,
            &PlacementOptions {
                origin: CoordinateOrigin::BottomLeft,
                ..Default::default()
            },
        );
        let top = compute_placements(
            &job,
            &PlacementOptions {
                origin: CoordinateOrigin::TopLeft,
                ..Default::default()
            },
        );
        let step_height = 1.0;
        assert!((top[0].center_y - (step_height - bottom[0].center_y)).abs() < 1e-12);
        assert!((top[0].center_x - bottom[0].center_x).abs() < 1e-12);
    }

    #[test]
    fn one_based_reference_falls_back_to_previous_index() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let zero_based = job_with(
            "comp_+_top",
            vec![record("0", "0.5", "0.25", "0", "N", "C1")],
            pkgs.clone(),
            board_bbox(),
        );
        let one_based = job_with(
            "comp_+_top",
            vec![record("1", "0.5", "0.25", "0", "N", "C1")],
            pkgs,
            board_bbox(),
        );

        let options = PlacementOptions::default();
        assert_eq!(
            compute_placements(&zero_based, &options),
            compute_placements(&one_based, &options)
        );
    }

    #[test]
    fn unresolved_reference_drops_the_component() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let job = job_with(
            "comp_+_top",
            vec![
                record("7", "0.5", "0.25", "0", "N", "GHOST"),
                record("0", "0.5", "0.25", "0", "N", "C1"),
            ],
            pkgs,
            board_bbox(),
        );
        let placements = compute_placements(&job, &PlacementOptions::default());
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].name, "C1");
    }

    #[test]
    fn bottom_layer_mirrors_about_step_midline() {
        let pkgs = vec![rect_pkg(0, 0.0, -0.025, 0.1, 0.025)];
        let job = job_with(
            "comp_+_bot",
            vec![record("0", "0.5", "0.25", "0", "M", "R2")],
            pkgs,
            board_bbox(),
        );
        let placements = compute_placements(&job, &PlacementOptions::default());
        // Anchor 0.5 reflects to 1.5; the mirrored offset −0.05 re-applies.
        assert!((placements[0].center_x - 1.45).abs() < 1e-12);
        assert!((placements[0].center_y - 0.25).abs() < 1e-12);
    }

    #[test]
    fn bottom_layer_without_step_extent_skips_mirroring() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let job = job_with(
            "comp_+_bot",
            vec![record("0", "0.5", "0.25", "0", "N", "R2")],
            pkgs,
            None,
        );
        let placements = compute_placements(&job, &PlacementOptions::default());
        assert!((placements[0].center_x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn flip_restricted_to_bottom_layers_leaves_top_untouched() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let options_flip = PlacementOptions {
            flip: Some(FlipOptions {
                flip_x: true,
                flip_y: false,
                bottom_layers_only: true,
            }),
            ..Default::default()
        };

        let top = job_with(
            "comp_+_top",
            vec![record("0", "0.5", "0.25", "0", "N", "C1")],
            pkgs.clone(),
            board_bbox(),
        );
        let plain = compute_placements(&top, &PlacementOptions::default());
        let flipped = compute_placements(&top, &options_flip);
        assert_eq!(plain, flipped);

        let bottom = job_with(
            "comp_+_bot",
            vec![record("0", "0.5", "0.25", "0", "N", "C1")],
            pkgs,
            board_bbox(),
        );
        let plain = compute_placements(&bottom, &PlacementOptions::default());
        let flipped = compute_placements(&bottom, &options_flip);
        assert!((flipped[0].center_x + plain[0].center_x).abs() < 1e-12);
        assert_eq!(flipped[0].center_y, plain[0].center_y);
    }

    #[test]
    fn target_unit_converts_coordinates_and_dimensions() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let job = job_with(
            "comp_+_top",
            vec![record("0", "0.5", "0.25", "0", "N", "C1")],
            pkgs,
            board_bbox(),
        );
        let placements = compute_placements(
            &job,
            &PlacementOptions {
                target_unit: Some(Unit::Mm),
                ..Default::default()
            },
        );
        let p = &placements[0];
        assert_eq!(p.unit, Unit::Mm);
        assert!((p.center_x - 12.7).abs() < 1e-9);
        assert!((p.center_y - 6.35).abs() < 1e-9);
        assert!((p.width - 2.54).abs() < 1e-9);
        assert!((p.length - 1.27).abs() < 1e-9);
    }

    #[test]
    fn malformed_rotation_and_position_parse_to_zero() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let mut bad = record("0", "0.5", "0.25", "0", "N", "C1");
        bad.rot = "bogus".into();
        let job = job_with("comp_+_top", vec![bad], pkgs, board_bbox());
        let placements = compute_placements(&job, &PlacementOptions::default());
        assert_eq!(placements[0].rotation, 0.0);
    }

    #[test]
    fn circle_outline_sets_shape_and_diameter() {
        let pkg = PkgRecord {
            index: 0,
            name: "DISC".into(),
            pitch: 0.0,
            xmin: -0.03,
            ymin: -0.03,
            xmax: 0.03,
            ymax: 0.03,
            outlines: vec![OutlineRecord {
                shape: OutlineShape::Circle {
                    xc: 0.0,
                    yc: 0.0,
                    r: 0.03,
                },
                raw: String::new(),
            }],
            unit: Unit::Inch,
        };
        let job = job_with(
            "comp_+_top",
            vec![record("0", "1", "0.5", "90", "N", "C1")],
            vec![pkg],
            board_bbox(),
        );
        let placements = compute_placements(&job, &PlacementOptions::default());
        let p = &placements[0];
        assert_eq!(p.shape, Shape::Circle);
        assert_eq!(p.rotation, 270.0);
        assert!((p.width - 0.06).abs() < 1e-12);
        assert!((p.length - 0.06).abs() < 1e-12);
    }

    #[test]
    fn empty_component_list_yields_no_placements() {
        let pkgs = vec![rect_pkg(0, -0.05, -0.025, 0.05, 0.025)];
        let job = job_with("comp_+_top", Vec::new(), pkgs, board_bbox());
        assert!(compute_placements(&job, &PlacementOptions::default()).is_empty());
    }
}
