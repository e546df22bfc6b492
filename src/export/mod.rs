//! Everything that leaves the process: the review file, the session state
//! file and the corrected per-folder documents.

pub mod coco;
pub mod review;

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::config::PathsConfig;
use crate::error::{AnnotatorError, Result};
use crate::state::{Annotation, AnnotationStore, SessionState};
use crate::transform::CoordinateTransform;

/// Save result with statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub documents: Vec<PathBuf>,
    pub annotations_written: usize,
}

#[derive(Debug, Clone)]
pub struct PersistenceController {
    output_root: PathBuf,
    review_path: PathBuf,
    session_path: PathBuf,
    /// Offset-only transform; the zoom is never used when persisting.
    transform: CoordinateTransform,
}

impl PersistenceController {
    pub fn new(paths: &PathsConfig, storage_offset: f64) -> Self {
        Self {
            output_root: paths.output_root.clone(),
            review_path: paths.review_file.clone(),
            session_path: paths.session_file.clone(),
            transform: CoordinateTransform::new(storage_offset, 1.0),
        }
    }

    pub fn output_path(&self, folder: &str) -> PathBuf {
        self.output_root.join(folder).join(coco::OUTPUT_FILE_NAME)
    }

    /// Missing file means first run.
    pub fn load_session(&self) -> Result<SessionState> {
        let path = &self.session_path;
        match fs::read_to_string(path) {
            Ok(text) => {
                let state = SessionState::parse(&text).map_err(|reason| {
                    AnnotatorError::InvalidSessionState {
                        path: path.clone(),
                        reason,
                    }
                })?;
                tracing::info!(
                    index = state.current_image_index,
                    next_id = state.next_annotation_id,
                    "Resuming session"
                );
                Ok(state)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SessionState::default()),
            Err(e) => Err(AnnotatorError::io(path, e)),
        }
    }

    pub fn save_session(&self, state: &SessionState) -> Result<()> {
        fs::write(&self.session_path, state.render())
            .map_err(|e| AnnotatorError::io(&self.session_path, e))
    }

    /// Overwrite the review file with the displayed image's annotations.
    pub fn write_review(&self, annotations: &[Annotation]) -> Result<()> {
        review::write_review(&self.review_path, annotations, &self.transform)
    }

    /// Write one corrected document per loaded folder.
    ///
    /// Takes the store by shared reference, so nothing can edit a folder
    /// between reading its original document and writing the merge.
    pub fn save_documents(&self, store: &AnnotationStore) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        for (name, folder) in store.folders() {
            let path = self.output_path(name);
            coco::write_folder(folder, &path, &self.transform)?;
            report.annotations_written += folder.annotation_count();
            report.documents.push(path);
        }
        tracing::info!(
            documents = report.documents.len(),
            annotations = report.annotations_written,
            "Saved corrected documents"
        );
        Ok(report)
    }
}
