// Flat review file: one line per annotation of the displayed image,
// `<id> <property> <x> <y> ...` with coordinates in source space.

use std::fs;
use std::path::Path;

use crate::error::{AnnotatorError, Result};
use crate::export::coco::coordinate_number;
use crate::state::Annotation;
use crate::transform::CoordinateTransform;

pub fn render_review(annotations: &[Annotation], transform: &CoordinateTransform) -> String {
    let mut out = String::new();
    for annotation in annotations {
        out.push_str(&annotation.id.to_string());
        for (property, corner) in annotation.corner_property.iter().zip(annotation.corners()) {
            out.push_str(&format!(
                " {} {} {}",
                property,
                format_coordinate(transform.to_persisted(corner.x)),
                format_coordinate(transform.to_persisted(corner.y)),
            ));
        }
        out.push('\n');
    }
    out
}

fn format_coordinate(value: f64) -> String {
    coordinate_number(value)
        .map(|n| n.to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn write_review(
    path: &Path,
    annotations: &[Annotation],
    transform: &CoordinateTransform,
) -> Result<()> {
    fs::write(path, render_review(annotations, transform)).map_err(|e| AnnotatorError::io(path, e))
}
