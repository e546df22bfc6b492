//! Source document discovery and normalization into the canonical model.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{AnnotatorError, Result};
use crate::state::types::{
    Annotation, CategoryRecord, ImageRecord, RawAnnotation, SourceDocument, SourceKeypoints,
};
use crate::transform::CoordinateTransform;

/// Accepted names for the annotations document, in order of precedence when
/// a directory holds more than one.
pub const DOCUMENT_NAMES: [&str; 2] = ["corrected_result.json", "result_adjust_order.json"];

/// Annotations of one source folder, bucketed per image file name.
#[derive(Debug, Clone)]
pub struct FolderAnnotations {
    /// Where the original document was read from; reloaded fresh on save.
    pub source_path: PathBuf,
    pub categories: Vec<CategoryRecord>,
    pub images: Vec<ImageRecord>,
    /// Image file name -> annotations, in document order.
    pub buckets: IndexMap<String, Vec<Annotation>>,
}

impl FolderAnnotations {
    pub fn category_id(&self, name: &str) -> Option<i64> {
        self.categories.iter().find(|c| c.name == name).map(|c| c.id)
    }

    pub fn image_id(&self, file_name: &str) -> Option<i64> {
        self.images
            .iter()
            .find(|i| i.file_name == file_name)
            .map(|i| i.id)
    }

    pub fn annotation_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Folder name -> folder annotations.
pub type AnnotationCollection = IndexMap<String, FolderAnnotations>;

/// Load every annotations document under `root`.
///
/// A file path is loaded as a single document; a directory is scanned
/// recursively. Each document is keyed by its immediate parent directory.
pub fn load_collection(root: &Path, transform: &CoordinateTransform) -> Result<AnnotationCollection> {
    let mut collection = AnnotationCollection::new();
    for (folder, path) in discover_documents(root)? {
        let annotations = load_document(&path, transform)?;
        tracing::info!(
            folder = %folder,
            images = annotations.buckets.len(),
            annotations = annotations.annotation_count(),
            "Loaded annotations document"
        );
        collection.insert(folder, annotations);
    }
    Ok(collection)
}

/// Find annotation documents under `root`, keyed by parent directory name.
///
/// Symlinked directories are not followed. Any traversal error fails the
/// scan rather than leaving a folder out of the save set.
pub fn discover_documents(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    if root.is_file() {
        return Ok(vec![(folder_name_of(root), root.to_path_buf())]);
    }

    // parent directory -> (precedence rank, document path)
    let mut chosen: IndexMap<PathBuf, (usize, PathBuf)> = IndexMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            AnnotatorError::io(path, e.into())
        })?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(rank) = DOCUMENT_NAMES
            .iter()
            .position(|name| entry.file_name() == *name)
        else {
            continue;
        };
        let Some(parent) = entry.path().parent() else {
            continue;
        };

        let candidate = (rank, entry.path().to_path_buf());
        match chosen.get_mut(parent) {
            Some(current) if current.0 <= rank => {}
            Some(current) => *current = candidate,
            None => {
                chosen.insert(parent.to_path_buf(), candidate);
            }
        }
    }

    let mut found: Vec<(String, PathBuf)> = Vec::with_capacity(chosen.len());
    for (_, path) in chosen.into_values() {
        let folder = folder_name_of(&path);
        if let Some((_, first)) = found.iter().find(|(f, _)| *f == folder) {
            return Err(AnnotatorError::DuplicateFolder {
                folder,
                first: first.clone(),
                second: path,
            });
        }
        found.push((folder, path));
    }
    Ok(found)
}

fn folder_name_of(document: &Path) -> String {
    document
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Read and normalize one document.
pub fn load_document(path: &Path, transform: &CoordinateTransform) -> Result<FolderAnnotations> {
    let content = fs::read_to_string(path).map_err(|e| AnnotatorError::io(path, e))?;
    let document: SourceDocument =
        serde_json::from_str(&content).map_err(|e| AnnotatorError::json(path, e))?;
    normalize_document(document, path, transform)
}

/// Turn a parsed source document into per-image buckets.
///
/// Keypoints get the storage offset applied here and nowhere else. Any
/// record with a dangling reference or broken geometry fails the whole
/// document.
pub fn normalize_document(
    document: SourceDocument,
    source_path: &Path,
    transform: &CoordinateTransform,
) -> Result<FolderAnnotations> {
    let label = source_path.display().to_string();

    let categories: HashMap<i64, &str> = document
        .categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();
    let images: HashMap<i64, &str> = document
        .images
        .iter()
        .map(|i| (i.id, i.file_name.as_str()))
        .collect();

    let mut buckets: IndexMap<String, Vec<Annotation>> = IndexMap::new();
    for image in &document.images {
        buckets.entry(image.file_name.clone()).or_default();
    }

    for (position, value) in document.annotations.into_iter().enumerate() {
        let record = record_label(&value, position);
        let raw: RawAnnotation = serde_json::from_value(value)
            .map_err(|e| AnnotatorError::schema(&label, &record, e.to_string()))?;

        let category = categories.get(&raw.category_id).ok_or_else(|| {
            AnnotatorError::schema(
                &label,
                &record,
                format!("unknown category_id {}", raw.category_id),
            )
        })?;
        let file_name = images.get(&raw.image_id).ok_or_else(|| {
            AnnotatorError::schema(&label, &record, format!("unknown image_id {}", raw.image_id))
        })?;

        let annotation = ingest_record(raw, category, transform)
            .map_err(|reason| AnnotatorError::schema(&label, &record, reason))?;

        if let Some(bucket) = buckets.get_mut(*file_name) {
            bucket.push(annotation);
        }
    }

    Ok(FolderAnnotations {
        source_path: source_path.to_path_buf(),
        categories: document.categories,
        images: document.images,
        buckets,
    })
}

fn record_label(value: &Value, position: usize) -> String {
    match value.get("id") {
        Some(id) => format!("id={id}"),
        None => format!("#{position}"),
    }
}

fn ingest_record(
    raw: RawAnnotation,
    category: &str,
    transform: &CoordinateTransform,
) -> std::result::Result<Annotation, String> {
    let keypoints = raw
        .keypoints
        .iter()
        .map(|n| n.as_f64().map(|v| transform.ingest(v)))
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| "keypoints contains a non-finite number".to_string())?;

    let annotation = Annotation {
        id: raw.id,
        image_id: raw.image_id,
        category_id: raw.category_id,
        category: category.to_string(),
        source_keypoints: Some(SourceKeypoints {
            raw: raw.keypoints,
            stored: keypoints.clone(),
        }),
        keypoints,
        corner_property: raw.corner_property,
        t_or_l: raw.t_or_l,
        parking_slot_property_1: raw.parking_slot_property_1,
        parking_slot_property_2: raw.parking_slot_property_2,
        group_id: raw.group_id,
        ground_lock_state: raw.ground_lock_state,
        extra: raw.extra,
    };
    annotation.check_invariants()?;
    Ok(annotation)
}
