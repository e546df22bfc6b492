//! In-memory owner of the annotation collection for the working set.

use std::fmt;

use crate::config::AnnotationTemplate;
use crate::error::{AnnotatorError, Result};
use crate::state::dataset::{AnnotationCollection, FolderAnnotations};
use crate::state::types::{
    Annotation, AnnotationKind, CornerProperty, GroupId, SESSION_ID_BASE, TOrL,
};
use crate::transform::{CoordinateTransform, Point};

/// Address of one image bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub folder: String,
    pub file_name: String,
}

impl ImageKey {
    pub fn new(folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.file_name)
    }
}

/// Position of a corner inside an image bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CornerRef {
    pub annotation: usize,
    pub corner: usize,
}

/// What the view needs to draw one annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayAnnotation {
    pub id: i64,
    pub category: String,
    pub corners: Vec<Point>,
    pub corner_property: Vec<CornerProperty>,
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    folders: AnnotationCollection,
    next_id: i64,
}

impl AnnotationStore {
    /// Wrap a loaded collection. The id counter is raised above every id
    /// already present; it is never lowered.
    pub fn new(folders: AnnotationCollection, next_id: i64) -> Self {
        let max_id = folders
            .values()
            .flat_map(|f| f.buckets.values())
            .flatten()
            .map(|a| a.id)
            .max();

        let mut repaired = next_id.max(SESSION_ID_BASE);
        if let Some(max_id) = max_id {
            if repaired <= max_id {
                tracing::warn!(
                    persisted = next_id,
                    max_id,
                    "Id counter collides with existing annotations, raising it"
                );
                repaired = max_id + 1;
            }
        }

        Self {
            folders,
            next_id: repaired,
        }
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub fn folders(&self) -> &AnnotationCollection {
        &self.folders
    }

    pub fn folder(&self, name: &str) -> Option<&FolderAnnotations> {
        self.folders.get(name)
    }

    /// Annotations of one image, in bucket order. Unknown images are empty.
    pub fn annotations(&self, key: &ImageKey) -> &[Annotation] {
        self.folders
            .get(&key.folder)
            .and_then(|f| f.buckets.get(&key.file_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn bucket_mut(&mut self, key: &ImageKey) -> Option<&mut Vec<Annotation>> {
        self.folders
            .get_mut(&key.folder)
            .and_then(|f| f.buckets.get_mut(&key.file_name))
    }

    fn annotation_mut(&mut self, key: &ImageKey, index: usize) -> Option<&mut Annotation> {
        self.bucket_mut(key).and_then(|b| b.get_mut(index))
    }

    /// The image's annotations converted to display space.
    pub fn display_annotations(
        &self,
        key: &ImageKey,
        transform: &CoordinateTransform,
    ) -> Vec<DisplayAnnotation> {
        self.annotations(key)
            .iter()
            .map(|a| DisplayAnnotation {
                id: a.id,
                category: a.category.clone(),
                corners: a.corners().map(|p| transform.to_display(p)).collect(),
                corner_property: a.corner_property.clone(),
            })
            .collect()
    }

    /// Append a new annotation built from `template` and return its id.
    pub fn create(&mut self, key: &ImageKey, template: &AnnotationTemplate) -> Result<i64> {
        let folder = self
            .folders
            .get(&key.folder)
            .ok_or_else(|| AnnotatorError::UnknownFolder(key.folder.clone()))?;
        let image_id = folder
            .image_id(&key.file_name)
            .ok_or_else(|| AnnotatorError::UnknownImage {
                folder: key.folder.clone(),
                file_name: key.file_name.clone(),
            })?;
        let category_id = folder.category_id(&template.category).ok_or_else(|| {
            AnnotatorError::CategoryUnavailable {
                folder: key.folder.clone(),
                category: template.category.clone(),
            }
        })?;

        let id = self.next_id;
        let annotation = Annotation {
            id,
            image_id,
            category_id,
            category: template.category.clone(),
            keypoints: template.keypoints.clone(),
            corner_property: template.corner_property.clone(),
            t_or_l: template.t_or_l.clone(),
            parking_slot_property_1: template.parking_slot_property_1.clone(),
            parking_slot_property_2: template.parking_slot_property_2.clone(),
            group_id: template.group_id,
            ground_lock_state: None,
            extra: Default::default(),
            source_keypoints: None,
        };
        annotation
            .check_invariants()
            .map_err(|reason| AnnotatorError::Config(format!("{} template: {reason}", template.category)))?;

        self.next_id += 1;
        if let Some(bucket) = self.bucket_mut(key) {
            bucket.push(annotation);
        } else if let Some(folder) = self.folders.get_mut(&key.folder) {
            folder.buckets.insert(key.file_name.clone(), vec![annotation]);
        }
        tracing::debug!(id, image = %key, category = %template.category, "Created annotation");
        Ok(id)
    }

    /// First corner within `tolerance` (box distance, display units) of
    /// `display_point`. Annotations are scanned in bucket order and corners
    /// in index order; the first match wins.
    pub fn find_near(
        &self,
        key: &ImageKey,
        display_point: Point,
        tolerance: f64,
        transform: &CoordinateTransform,
    ) -> Option<CornerRef> {
        self.annotations(key)
            .iter()
            .enumerate()
            .find_map(|(annotation, ann)| {
                ann.corners()
                    .position(|c| transform.to_display(c).within_box(&display_point, tolerance))
                    .map(|corner| CornerRef { annotation, corner })
            })
    }

    /// Move a corner to a display-space position.
    pub fn mutate_corner(
        &mut self,
        key: &ImageKey,
        at: CornerRef,
        display_point: Point,
        transform: &CoordinateTransform,
    ) -> bool {
        let stored = transform.to_storage(display_point);
        self.annotation_mut(key, at.annotation)
            .is_some_and(|a| a.set_corner(at.corner, stored))
    }

    /// Remove an annotation by bucket index.
    pub fn delete(&mut self, key: &ImageKey, index: usize) -> Option<Annotation> {
        let bucket = self.bucket_mut(key)?;
        if index >= bucket.len() {
            return None;
        }
        let removed = bucket.remove(index);
        tracing::debug!(id = removed.id, image = %key, "Deleted annotation");
        Some(removed)
    }

    pub fn set_corner_property(
        &mut self,
        key: &ImageKey,
        at: CornerRef,
        property: CornerProperty,
    ) -> bool {
        match self
            .annotation_mut(key, at.annotation)
            .and_then(|a| a.corner_property.get_mut(at.corner))
        {
            Some(slot) => {
                *slot = property;
                true
            }
            None => false,
        }
    }

    /// Only the first two corners of a parking space that already carries
    /// `T_or_L` can be changed.
    pub fn set_t_or_l(&mut self, key: &ImageKey, at: CornerRef, value: TOrL) -> bool {
        let Some(annotation) = self.annotation_mut(key, at.annotation) else {
            return false;
        };
        if annotation.kind() != AnnotationKind::ParkingSpace {
            return false;
        }
        match annotation
            .t_or_l
            .as_mut()
            .and_then(|entries| entries.get_mut(at.corner))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Dataset-original annotations keep their group id; the call is a no-op.
    pub fn set_group_id(&mut self, key: &ImageKey, index: usize, group_id: GroupId) -> bool {
        let Some(annotation) = self.annotation_mut(key, index) else {
            return false;
        };
        if !annotation.is_session_created() {
            tracing::debug!(id = annotation.id, "Group id is read-only on dataset annotations");
            return false;
        }
        annotation.group_id = Some(group_id);
        true
    }
}
