use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{AnnotatorError, Result};
use crate::state::{CornerProperty, GroupId, TOrL, LIMITER, PARKING_SPACE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub editing: EditingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for annotation documents, or a single document.
    #[serde(default = "default_dataset_root")]
    pub dataset_root: PathBuf,
    /// Directory holding the images under review.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    /// Corrected documents are written to `<output_root>/<folder>/`.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_review_file")]
    pub review_file: PathBuf,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Added to every coordinate on load, removed on save.
    #[serde(default = "default_storage_offset")]
    pub storage_offset: f64,
    #[serde(default = "default_initial_scale")]
    pub initial_scale: f64,
    /// Corner hit radius in display units.
    #[serde(default = "default_hit_tolerance")]
    pub hit_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditingConfig {
    /// Also merge and write every folder document after a drag ends.
    #[serde(default = "default_true")]
    pub save_documents_on_release: bool,
    #[serde(default = "default_parking_template")]
    pub parking_template: AnnotationTemplate,
    #[serde(default = "default_limiter_template")]
    pub limiter_template: AnnotationTemplate,
}

/// Shape and attributes of a freshly created annotation, in storage space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTemplate {
    pub category: String,
    pub keypoints: Vec<f64>,
    pub corner_property: Vec<CornerProperty>,
    #[serde(default, rename = "T_or_L", skip_serializing_if = "Option::is_none")]
    pub t_or_l: Option<Vec<TOrL>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parking_slot_property_1: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parking_slot_property_2: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

// Default value functions
fn default_dataset_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("corrected")
}

fn default_review_file() -> PathBuf {
    PathBuf::from("annotations.txt")
}

fn default_session_file() -> PathBuf {
    PathBuf::from("saved_data.txt")
}

fn default_storage_offset() -> f64 {
    150.0
}

fn default_initial_scale() -> f64 {
    0.85
}

fn default_hit_tolerance() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_parking_template() -> AnnotationTemplate {
    AnnotationTemplate {
        category: PARKING_SPACE.to_string(),
        keypoints: vec![400.0, 400.0, 600.0, 400.0, 600.0, 500.0, 400.0, 500.0],
        corner_property: vec![
            CornerProperty::Visible,
            CornerProperty::Visible,
            CornerProperty::Covered,
            CornerProperty::Covered,
        ],
        t_or_l: Some(vec![TOrL::T, TOrL::T]),
        parking_slot_property_1: Some(Value::from(vec!["idle"])),
        parking_slot_property_2: None,
        group_id: None,
    }
}

fn default_limiter_template() -> AnnotationTemplate {
    AnnotationTemplate {
        category: LIMITER.to_string(),
        keypoints: vec![400.0, 400.0, 600.0, 400.0],
        corner_property: vec![CornerProperty::Visible, CornerProperty::Visible],
        t_or_l: None,
        parking_slot_property_1: None,
        parking_slot_property_2: None,
        group_id: None,
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_root: default_dataset_root(),
            images_dir: default_images_dir(),
            output_root: default_output_root(),
            review_file: default_review_file(),
            session_file: default_session_file(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            storage_offset: default_storage_offset(),
            initial_scale: default_initial_scale(),
            hit_tolerance: default_hit_tolerance(),
        }
    }
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            save_documents_on_release: true,
            parking_template: default_parking_template(),
            limiter_template: default_limiter_template(),
        }
    }
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "parking-annotator")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration.
///
/// An explicit path must exist and parse. The default location is optional:
/// a missing or broken file there falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let Some(path) = config_path() else {
        return Ok(AppConfig::default());
    };
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    match read_config(&path) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!(error = %e, "Using default configuration");
            Ok(AppConfig::default())
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AnnotatorError::io(path, e))?;
    toml::from_str(&content)
        .map_err(|e| AnnotatorError::Config(format!("Failed to parse {}: {e}", path.display())))
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AnnotatorError::io(parent, e))?;
    }

    let toml = toml::to_string_pretty(config)
        .map_err(|e| AnnotatorError::Config(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, toml).map_err(|e| AnnotatorError::io(path, e))
}
