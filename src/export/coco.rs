// Merge of corrected annotations back into the COCO-style source document.
// Only the `annotations` array is replaced; every other top-level key is
// carried over from a fresh read of the original file.

use serde_json::{Number, Value};
use std::fs;
use std::path::Path;

use crate::error::{AnnotatorError, Result};
use crate::state::{Annotation, FolderAnnotations, RawAnnotation};
use crate::transform::CoordinateTransform;

pub const OUTPUT_FILE_NAME: &str = "corrected_result.json";

/// Largest magnitude written as a JSON integer.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Integral values become JSON integers, everything else a float.
pub fn coordinate_number(value: f64) -> Option<Number> {
    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}

/// Values still equal to what was ingested keep their source token; only
/// moved values are converted back.
fn persisted_keypoints(
    annotation: &Annotation,
    transform: &CoordinateTransform,
) -> std::result::Result<Vec<Number>, String> {
    let source = annotation
        .source_keypoints
        .as_ref()
        .filter(|s| s.stored.len() == annotation.keypoints.len());

    annotation
        .keypoints
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if let Some(source) = source {
                if source.stored[i] == *v {
                    return Ok(source.raw[i].clone());
                }
            }
            coordinate_number(transform.to_persisted(*v))
                .ok_or_else(|| format!("keypoint {v} is not a finite number"))
        })
        .collect()
}

/// Annotation in storage space -> wire record in source space.
pub fn to_raw(
    annotation: &Annotation,
    transform: &CoordinateTransform,
) -> std::result::Result<RawAnnotation, String> {
    Ok(RawAnnotation {
        id: annotation.id,
        image_id: annotation.image_id,
        category_id: annotation.category_id,
        keypoints: persisted_keypoints(annotation, transform)?,
        corner_property: annotation.corner_property.clone(),
        group_id: annotation.group_id,
        t_or_l: annotation.t_or_l.clone(),
        parking_slot_property_1: annotation.parking_slot_property_1.clone(),
        parking_slot_property_2: annotation.parking_slot_property_2.clone(),
        ground_lock_state: annotation.ground_lock_state.clone(),
        extra: annotation.extra.clone(),
    })
}

/// Replace the `annotations` array of `original` with the folder's
/// annotations, flattened image by image in bucket order.
pub fn merge_folder(
    original: Value,
    folder: &FolderAnnotations,
    transform: &CoordinateTransform,
) -> Result<Value> {
    let label = folder.source_path.display().to_string();
    let Value::Object(mut document) = original else {
        return Err(AnnotatorError::schema(
            label,
            "<root>",
            "document root is not an object",
        ));
    };

    let mut annotations = Vec::with_capacity(folder.annotation_count());
    for annotation in folder.buckets.values().flatten() {
        let raw = to_raw(annotation, transform).map_err(|reason| {
            AnnotatorError::schema(&label, format!("id={}", annotation.id), reason)
        })?;
        let value = serde_json::to_value(&raw)
            .map_err(|e| AnnotatorError::json(&folder.source_path, e))?;
        annotations.push(value);
    }

    document.insert("annotations".to_string(), Value::Array(annotations));
    Ok(Value::Object(document))
}

/// Reload the folder's original document, merge and write it to `path`.
pub fn write_folder(
    folder: &FolderAnnotations,
    path: &Path,
    transform: &CoordinateTransform,
) -> Result<()> {
    let source = &folder.source_path;
    let content = fs::read_to_string(source).map_err(|e| AnnotatorError::io(source, e))?;
    let original: Value =
        serde_json::from_str(&content).map_err(|e| AnnotatorError::json(source, e))?;

    let merged = merge_folder(original, folder, transform)?;
    let json = serde_json::to_string_pretty(&merged)
        .map_err(|e| AnnotatorError::json(source, e))?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| AnnotatorError::io(dir, e))?;
    }
    fs::write(path, json).map_err(|e| AnnotatorError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::normalize_document;
    use serde_json::json;

    fn source() -> Value {
        json!({
            "info": {"version": "3"},
            "categories": [{"id": 1, "name": "parking_space"}],
            "images": [{"id": 10, "file_name": "a.jpg"}],
            "annotations": [{
                "id": 1, "image_id": 10, "category_id": 1,
                "keypoints": [100.25, 100, 200, 100, 200, 150, 100, 150],
                "corner_property": ["visible", "visible", "covered", "covered"],
                "parking_slot_property_1": ["idle"],
                "score": 0.91
            }],
            "licenses": []
        })
    }

    fn folder(transform: &CoordinateTransform) -> FolderAnnotations {
        normalize_document(
            serde_json::from_value(source()).unwrap(),
            Path::new("lot/result_adjust_order.json"),
            transform,
        )
        .unwrap()
    }

    #[test]
    fn untouched_document_round_trips() {
        let t = CoordinateTransform::new(150.0, 0.85);
        let merged = merge_folder(source(), &folder(&t), &t).unwrap();
        assert_eq!(merged, source());
    }

    #[test]
    fn top_level_key_order_is_kept() {
        let t = CoordinateTransform::new(150.0, 1.0);
        let merged = merge_folder(source(), &folder(&t), &t).unwrap();
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["info", "categories", "images", "annotations", "licenses"]);
    }

    #[test]
    fn edited_coordinates_drop_the_offset() {
        let t = CoordinateTransform::new(150.0, 1.0);
        let mut folder = folder(&t);
        folder.buckets["a.jpg"][0].keypoints[0] = 300.5;
        let merged = merge_folder(source(), &folder, &t).unwrap();
        assert_eq!(
            merged["annotations"][0]["keypoints"],
            json!([150.5, 100, 200, 100, 200, 150, 100, 150])
        );
    }

    #[test]
    fn untouched_values_keep_their_tokens_when_a_corner_moves() {
        let t = CoordinateTransform::new(150.0, 1.0);
        let mut document = source();
        document["annotations"][0]["keypoints"] =
            json!([100.1, 100.3, 200.7, 100.9, 200.2, 150.6, 100.4, 150.8]);
        let mut folder = normalize_document(
            serde_json::from_value(document.clone()).unwrap(),
            Path::new("lot/result_adjust_order.json"),
            &t,
        )
        .unwrap();
        folder.buckets["a.jpg"][0].keypoints[0] = 300.0;
        folder.buckets["a.jpg"][0].keypoints[1] = 300.0;

        let merged = merge_folder(document, &folder, &t).unwrap();
        assert_eq!(
            merged["annotations"][0]["keypoints"],
            json!([150, 150, 200.7, 100.9, 200.2, 150.6, 100.4, 150.8])
        );
    }

    #[test]
    fn integral_values_are_integers() {
        assert_eq!(coordinate_number(100.0), Some(Number::from(100)));
        assert_eq!(coordinate_number(-3.0), Some(Number::from(-3)));
        assert_eq!(coordinate_number(2.5).and_then(|n| n.as_f64()), Some(2.5));
        assert_eq!(coordinate_number(f64::NAN), None);
    }
}
