// Shared fixtures for the integration tests
#![allow(dead_code)]

use parking_annotator::config::AppConfig;
use parking_annotator::editing::{EditOutcome, EditRequest, EditingSession, HostView};
use parking_annotator::export::PersistenceController;
use parking_annotator::state::{load_collection, AnnotationStore, ImageKey};
use parking_annotator::transform::CoordinateTransform;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// One image, one parking space at raw `[100,100,200,100,200,150,100,150]`.
pub fn single_slot_document() -> Value {
    json!({
        "info": {"description": "lot survey", "version": 2},
        "categories": [
            {"id": 1, "name": "parking_space"},
            {"id": 2, "name": "limiter"}
        ],
        "images": [
            {"id": 7, "file_name": "0001.jpg", "width": 1062, "height": 1062},
            {"id": 8, "file_name": "0002.jpg", "width": 1062, "height": 1062}
        ],
        "annotations": [
            {
                "id": 42,
                "image_id": 7,
                "category_id": 1,
                "keypoints": [100, 100, 200, 100, 200, 150, 100, 150],
                "corner_property": ["visible", "visible", "covered", "covered"],
                "T_or_L": ["T", "L"],
                "parking_slot_property_1": ["idle"],
                "parking_slot_property_2": ["parallel"]
            },
            {
                "id": 43,
                "image_id": 8,
                "category_id": 2,
                "keypoints": [10.5, 20, 30, 40],
                "corner_property": ["visible", "truncated"],
                "group_id": 42,
                "ground_lock_state": "open"
            }
        ],
        "custom": {"reviewed_by": ["ops"]}
    })
}

pub fn write_document(dir: &Path, name: &str, document: &Value) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

pub fn config_for(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.dataset_root = root.join("dataset");
    config.paths.images_dir = root.join("images");
    config.paths.output_root = root.join("out");
    config.paths.review_file = root.join("annotations.txt");
    config.paths.session_file = root.join("saved_data.txt");
    config.transform.storage_offset = 150.0;
    config.transform.initial_scale = 1.0;
    config.editing.save_documents_on_release = false;
    config
}

pub fn load_store(config: &AppConfig, next_id: i64) -> AnnotationStore {
    let transform = CoordinateTransform::new(config.transform.storage_offset, 1.0);
    let collection = load_collection(&config.paths.dataset_root, &transform).unwrap();
    AnnotationStore::new(collection, next_id)
}

/// Dataset with one folder `lot_a` holding the single-slot document.
pub fn session_in(root: &Path) -> (AppConfig, EditingSession) {
    let config = config_for(root);
    write_document(
        &config.paths.dataset_root.join("lot_a"),
        "result_adjust_order.json",
        &single_slot_document(),
    );
    let persistence = PersistenceController::new(&config.paths, config.transform.storage_offset);
    let resume = persistence.load_session().unwrap();
    let store = load_store(&config, resume.next_annotation_id);
    let images = vec![
        ImageKey::new("lot_a", "0001.jpg"),
        ImageKey::new("lot_a", "0002.jpg"),
    ];
    let session = EditingSession::new(store, persistence, images, &resume, &config);
    (config, session)
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Host with a fixed zoom that answers every dialog the same way.
pub struct ScriptedHost {
    pub scale: f64,
    pub answer: EditOutcome,
    pub requests: Vec<EditRequest>,
}

impl ScriptedHost {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            answer: EditOutcome::Cancel,
            requests: Vec::new(),
        }
    }
}

impl HostView for ScriptedHost {
    fn scale(&self) -> f64 {
        self.scale
    }

    fn edit_corner(&mut self, request: &EditRequest) -> EditOutcome {
        self.requests.push(request.clone());
        self.answer.clone()
    }
}
