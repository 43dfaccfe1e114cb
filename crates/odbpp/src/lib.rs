//! ODB++ job extraction: parse a fabrication job's matrix, step profiles,
//! component layers and EDA package data, and derive normalized component
//! placements in a caller-chosen unit and coordinate convention.
//!
//! The crate is a stateless engine. [`extract`] performs one full pass over
//! an archive or extracted directory and returns an immutable [`Job`] plus
//! the report files it wrote; [`compute_placements`] derives placements from
//! a job without touching the filesystem again.

pub mod archive;
pub mod components;
pub mod eda;
pub mod extract;
pub mod geom;
pub mod job;
pub mod lzw;
pub mod matrix;
pub mod placement;
pub mod profile;
pub mod report;
pub mod units;

pub use components::{ComponentList, ComponentRecord, parse_components};
pub use eda::{EdaData, OutlineRecord, OutlineShape, PkgRecord, parse_eda_data};
pub use extract::{
    ExtractOptions, Extraction, ExtractionError, PlacementExportMode, Result,
    export_placement_reports, extract, save_job_report,
};
pub use geom::BoundingBox;
pub use job::{Job, Layer, Step, build_job};
pub use matrix::{MatrixInfo, parse_matrix};
pub use placement::{
    ComponentPlacement, CoordinateOrigin, FlipOptions, PlacementOptions, Shape,
    compute_placements,
};
pub use profile::{PathKind, ProfilePath, ProfileRecord, StepProfile, Surface, parse_profile};
pub use units::Unit;
