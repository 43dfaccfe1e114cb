//! XML report serialization: the job-wide dump and the component placement
//! documents. Purely mechanical construction from already-computed data.

use std::io::{self, Cursor};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::eda::EdaData;
use crate::job::{Job, Layer, Step};
use crate::placement::{ComponentPlacement, CoordinateOrigin};
use crate::profile::{ProfileRecord, StepProfile};

/// Invariant numeric formatting: up to six fractional digits, trailing
/// zeros trimmed, non-finite values and values within 1e-9 of zero
/// collapse to `0`.
pub(crate) fn format_double(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let normalized = if value.abs() < 1e-9 { 0.0 } else { value };
    let mut text = format!("{normalized:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" { "0".to_string() } else { text }
}

/// Replace characters that cannot appear in file names.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || (c as u32) < 0x20
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Thin wrapper over the event writer: one element call per line, errors
/// mapped into `io::Error` at a single point.
struct Xml {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl Xml {
    fn new() -> io::Result<Self> {
        let mut xml = Xml {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        };
        xml.write(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(xml)
    }

    fn write(&mut self, event: Event<'_>) -> io::Result<()> {
        self.writer
            .write_event(event)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
        self.write(Event::Start(element(name, attrs)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
        self.write(Event::Empty(element(name, attrs)))
    }

    fn text(&mut self, text: &str) -> io::Result<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    fn end(&mut self, name: &str) -> io::Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> io::Result<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

fn element<'a>(name: &'a str, attrs: &'a [(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    for (key, value) in attrs {
        element.push_attribute((*key, *value));
    }
    element
}

/// Render the job-wide report document.
pub fn job_report_xml(job: &Job) -> io::Result<String> {
    let mut xml = Xml::new()?;

    let extracted_at = job.extracted_at.to_rfc3339();
    xml.start(
        "job",
        &[
            ("sourceArchive", &job.source_archive),
            ("sourcePath", &job.source_path.to_string_lossy()),
            ("extractDir", &job.extract_dir.to_string_lossy()),
            ("extractedAt", &extracted_at),
        ],
    )?;
    xml.empty("matrix", &[("path", &job.matrix_path.to_string_lossy())])?;

    xml.start("steps", &[])?;
    for step in &job.steps {
        write_step(&mut xml, step)?;
    }
    xml.end("steps")?;

    xml.end("job")?;
    xml.finish()
}

fn write_step(xml: &mut Xml, step: &Step) -> io::Result<()> {
    let exists = step.exists.to_string();
    let path = step.path.to_string_lossy();
    let mut attrs: Vec<(&str, &str)> =
        vec![("name", &step.name), ("exists", &exists), ("path", &path)];
    if let Some(unit) = &step.unit {
        attrs.push(("unit", unit.as_str()));
    }
    xml.start("step", &attrs)?;

    if let Some(bbox) = &step.bounding_box {
        let width = format_double(bbox.width());
        let height = format_double(bbox.height());
        let min_x = format_double(bbox.min_x);
        let min_y = format_double(bbox.min_y);
        let max_x = format_double(bbox.max_x);
        let max_y = format_double(bbox.max_y);
        xml.empty(
            "size",
            &[
                ("width", &width),
                ("height", &height),
                ("minX", &min_x),
                ("minY", &min_y),
                ("maxX", &max_x),
                ("maxY", &max_y),
            ],
        )?;
    }

    xml.start("layers", &[])?;
    for layer in &step.layers {
        write_layer(xml, layer)?;
    }
    xml.end("layers")?;

    if let Some(profile) = &step.profile {
        write_profile(xml, profile)?;
    }
    if let Some(eda) = &step.eda {
        write_eda(xml, eda)?;
    }

    xml.end("step")
}

fn write_layer(xml: &mut Xml, layer: &Layer) -> io::Result<()> {
    let exists = layer.exists.to_string();
    let path = layer.path.to_string_lossy();
    xml.start(
        "layer",
        &[("name", &layer.name), ("exists", &exists), ("path", &path)],
    )?;

    let components_path = layer
        .components_path
        .as_ref()
        .map(|path| path.to_string_lossy());
    let mut attrs: Vec<(&str, &str)> = Vec::new();
    if let Some(path) = &components_path {
        attrs.push(("path", path));
    }
    match &layer.components {
        Some(list) => {
            attrs.push(("unit", list.unit.as_str()));
            xml.start("components", &attrs)?;
            for record in &list.records {
                xml.empty(
                    "component",
                    &[
                        ("pkgRef", &record.pkg_ref),
                        ("x", &record.x),
                        ("y", &record.y),
                        ("rot", &record.rot),
                        ("mirror", &record.mirror),
                        ("name", &record.component_name),
                        ("part", &record.part_name),
                    ],
                )?;
            }
            xml.end("components")?;
        }
        None => xml.empty("components", &attrs)?,
    }

    xml.end("layer")
}

fn write_profile(xml: &mut Xml, profile: &StepProfile) -> io::Result<()> {
    xml.start("profile", &[("unit", profile.unit.as_str())])?;

    for surface in &profile.surfaces {
        let id = surface.id.map(|id| id.to_string());
        let paths = surface.paths.len().to_string();
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(id) = &id {
            attrs.push(("id", id));
        }
        attrs.push(("paths", &paths));
        xml.start("surface", &attrs)?;

        for path in &surface.paths {
            let kind = path.kind.as_char().to_string();
            let records = path.records.len().to_string();
            xml.start("path", &[("kind", &kind), ("records", &records)])?;
            for record in &path.records {
                write_profile_record(xml, record)?;
            }
            xml.end("path")?;
        }

        xml.end("surface")?;
    }

    xml.end("profile")
}

fn write_profile_record(xml: &mut Xml, record: &ProfileRecord) -> io::Result<()> {
    let tag = record.type_tag();
    match *record {
        ProfileRecord::Open { x, y } | ProfileRecord::Segment { x, y } => {
            let x = format_double(x);
            let y = format_double(y);
            xml.empty("record", &[("type", tag), ("x", &x), ("y", &y)])
        }
        ProfileRecord::Arc {
            x,
            y,
            xc,
            yc,
            clockwise,
        } => {
            let x = format_double(x);
            let y = format_double(y);
            let xc = format_double(xc);
            let yc = format_double(yc);
            xml.empty(
                "record",
                &[
                    ("type", tag),
                    ("x", &x),
                    ("y", &y),
                    ("xc", &xc),
                    ("yc", &yc),
                    ("cw", if clockwise { "Y" } else { "N" }),
                ],
            )
        }
        ProfileRecord::End => xml.empty("record", &[("type", tag)]),
    }
}

fn write_eda(xml: &mut Xml, eda: &EdaData) -> io::Result<()> {
    let data_path = eda.data_path.to_string_lossy();
    xml.start("eda", &[("path", &data_path), ("unit", eda.unit.as_str())])?;

    for pkg in &eda.records {
        let index = pkg.index.to_string();
        let pitch = format_double(pkg.pitch);
        let xmin = format_double(pkg.xmin);
        let ymin = format_double(pkg.ymin);
        let xmax = format_double(pkg.xmax);
        let ymax = format_double(pkg.ymax);
        let attrs: Vec<(&str, &str)> = vec![
            ("index", &index),
            ("name", &pkg.name),
            ("pitch", &pitch),
            ("xmin", &xmin),
            ("ymin", &ymin),
            ("xmax", &xmax),
            ("ymax", &ymax),
        ];

        if pkg.outlines.is_empty() {
            xml.empty("pkg", &attrs)?;
            continue;
        }
        xml.start("pkg", &attrs)?;
        xml.start("outlines", &[])?;

        for (idx, outline) in pkg.outlines.iter().enumerate() {
            let idx = idx.to_string();
            xml.start(
                "outline",
                &[("idx", &idx), ("type", outline.shape.type_tag())],
            )?;

            xml.start("params", &[])?;
            for (name, value) in outline.shape.params() {
                let value = format_double(value);
                xml.empty("param", &[("name", name), ("value", &value)])?;
            }
            xml.end("params")?;

            let polygon = outline.shape.polygon();
            if !polygon.is_empty() {
                xml.start("polygon", &[])?;
                for (x, y) in polygon {
                    let x = format_double(x);
                    let y = format_double(y);
                    xml.empty("point", &[("x", &x), ("y", &y)])?;
                }
                xml.end("polygon")?;
            }

            if !outline.raw.trim().is_empty() {
                xml.start("raw", &[])?;
                xml.text(&outline.raw)?;
                xml.end("raw")?;
            }

            xml.end("outline")?;
        }

        xml.end("outlines")?;
        xml.end("pkg")?;
    }

    xml.end("eda")
}

/// Render one component placement document. `layer` names the single layer
/// the document covers when placements were split per layer.
pub fn placement_report_xml(
    job: &Job,
    placements: &[ComponentPlacement],
    origin: CoordinateOrigin,
    layer: Option<&str>,
) -> io::Result<String> {
    let mut xml = Xml::new()?;

    let generated_at = job.extracted_at.to_rfc3339();
    let count = placements.len().to_string();
    let mut attrs: Vec<(&str, &str)> = vec![
        ("generatedAt", &generated_at),
        ("origin", origin.as_str()),
        ("count", &count),
    ];
    if let Some(layer) = layer {
        attrs.push(("layer", layer));
    }
    xml.start("boards", &attrs)?;

    for (step_name, step_placements) in group_by(placements, |p| p.step.clone()) {
        let step = job.steps.iter().find(|step| step.name == step_name);
        let unit = step.and_then(|step| step.unit.clone());
        let dims = step
            .and_then(|step| step.bounding_box)
            .map(|bbox| (format_double(bbox.width()), format_double(bbox.height())));
        let mut attrs: Vec<(&str, &str)> = vec![("name", &step_name)];
        if let Some(unit) = &unit {
            attrs.push(("unit", unit.as_str()));
        }
        if let Some((width, length)) = &dims {
            attrs.push(("width", width));
            attrs.push(("length", length));
        }
        xml.start("step", &attrs)?;

        for (layer_name, layer_placements) in
            group_by(step_placements.iter().copied(), |p| p.layer.clone())
        {
            let unit = layer_placements
                .first()
                .map(|p| p.unit.as_str())
                .unwrap_or_default();
            xml.start("layer", &[("name", &layer_name), ("unit", unit)])?;

            for placement in layer_placements {
                let rotation = format_double(placement.rotation);
                let center_x = format_double(placement.center_x);
                let center_y = format_double(placement.center_y);
                let width = format_double(placement.width);
                let length = format_double(placement.length);
                xml.empty(
                    "component",
                    &[
                        ("name", &placement.name),
                        ("rotation", &rotation),
                        ("shape", placement.shape.as_str()),
                        ("packageName", &placement.package_name),
                        ("centerX", &center_x),
                        ("centerY", &center_y),
                        ("width", &width),
                        ("length", &length),
                    ],
                )?;
            }

            xml.end("layer")?;
        }

        xml.end("step")?;
    }

    xml.end("boards")?;
    xml.finish()
}

/// Group placements by key, preserving first-appearance order.
fn group_by<'a, K, F, I>(placements: I, key: F) -> Vec<(K, Vec<&'a ComponentPlacement>)>
where
    I: IntoIterator<Item = &'a ComponentPlacement>,
    K: PartialEq,
    F: Fn(&ComponentPlacement) -> K,
{
    let mut groups: Vec<(K, Vec<&ComponentPlacement>)> = Vec::new();
    for placement in placements {
        let group_key = key(placement);
        match groups.iter_mut().find(|(existing, _)| *existing == group_key) {
            Some((_, members)) => members.push(placement),
            None => groups.push((group_key, vec![placement])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_doubles_like_reports_expect() {
        assert_eq!(format_double(0.0), "0");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(-2.0), "-2");
        assert_eq!(format_double(12.700001), "12.700001");
        assert_eq!(format_double(1e-12), "0");
        assert_eq!(format_double(-1e-12), "0");
        assert_eq!(format_double(f64::NAN), "0");
        assert_eq!(format_double(f64::INFINITY), "0");
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("comp_+_top"), "comp_+_top");
        assert_eq!(sanitize_file_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_file_name("   "), "report");
    }
}
