//! Annotation model shared by the normalizer, the store and persistence.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

use crate::transform::Point;

/// First id handed out to annotations created during a session. Anything
/// below comes from the dataset.
pub const SESSION_ID_BASE: i64 = 1_000_000;

pub const PARKING_SPACE: &str = "parking_space";
pub const LIMITER: &str = "limiter";
pub const GROUND_LOCK: &str = "ground_lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CornerProperty {
    Visible,
    Covered,
    Truncated,
}

impl CornerProperty {
    pub const ALL: [CornerProperty; 3] = [Self::Visible, Self::Covered, Self::Truncated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Covered => "covered",
            Self::Truncated => "truncated",
        }
    }
}

impl fmt::Display for CornerProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CornerProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown corner property '{s}'"))
    }
}

/// Junction shape of the entrance-line corners of a parking slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TOrL {
    T,
    L,
}

impl FromStr for TOrL {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T" | "t" => Ok(Self::T),
            "L" | "l" => Ok(Self::L),
            other => Err(format!("unknown T_or_L value '{other}'")),
        }
    }
}

/// Group link of an annotation: an integer id or the literal `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GroupIdWire", into = "GroupIdWire")]
pub enum GroupId {
    Linked(i64),
    Unlinked,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GroupIdWire {
    Id(i64),
    Label(String),
}

impl TryFrom<GroupIdWire> for GroupId {
    type Error = String;

    fn try_from(wire: GroupIdWire) -> Result<Self, Self::Error> {
        match wire {
            GroupIdWire::Id(id) => Ok(Self::Linked(id)),
            GroupIdWire::Label(label) if label == "none" => Ok(Self::Unlinked),
            GroupIdWire::Label(label) => Err(format!("invalid group id '{label}'")),
        }
    }
}

impl From<GroupId> for GroupIdWire {
    fn from(id: GroupId) -> Self {
        match id {
            GroupId::Linked(id) => GroupIdWire::Id(id),
            GroupId::Unlinked => GroupIdWire::Label("none".to_string()),
        }
    }
}

impl FromStr for GroupId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "none" {
            return Ok(Self::Unlinked);
        }
        s.parse::<i64>()
            .map(Self::Linked)
            .map_err(|_| format!("invalid group id '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Four corners, entrance line first.
    ParkingSpace,
    /// Two corners.
    Limiter,
    Other,
}

impl AnnotationKind {
    pub fn from_category(name: &str) -> Self {
        match name {
            PARKING_SPACE => Self::ParkingSpace,
            LIMITER | GROUND_LOCK => Self::Limiter,
            _ => Self::Other,
        }
    }

    pub fn expected_corners(&self) -> Option<usize> {
        match self {
            Self::ParkingSpace => Some(4),
            Self::Limiter => Some(2),
            Self::Other => None,
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    pub file_name: String,
}

/// The three arrays the normalizer reads. Annotations stay untyped until
/// each record is validated on its own, so errors can name the record.
#[derive(Debug, Deserialize)]
pub struct SourceDocument {
    pub categories: Vec<CategoryRecord>,
    pub images: Vec<ImageRecord>,
    pub annotations: Vec<Value>,
}

/// One annotation record as it appears in the source and output documents.
///
/// Optional fields distinguish "absent" from "present": an absent key stays
/// `None` and is not written back; a present key (even `null` for the opaque
/// ones) round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnnotation {
    pub id: i64,
    pub image_id: i64,
    pub category_id: i64,
    pub keypoints: Vec<Number>,
    pub corner_property: Vec<CornerProperty>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(
        rename = "T_or_L",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub t_or_l: Option<Vec<TOrL>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub parking_slot_property_1: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub parking_slot_property_2: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub ground_lock_state: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Present key -> `Some`, even when the value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ============================================================================
// Canonical model
// ============================================================================

/// Original numeric tokens of an ingested annotation, kept so an untouched
/// annotation is written back exactly as it was read.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SourceKeypoints {
    pub raw: Vec<Number>,
    pub stored: Vec<f64>,
}

/// An annotation in storage space.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub image_id: i64,
    pub category_id: i64,
    pub category: String,
    /// Flattened `x, y` pairs in storage space.
    pub keypoints: Vec<f64>,
    pub corner_property: Vec<CornerProperty>,
    pub t_or_l: Option<Vec<TOrL>>,
    pub parking_slot_property_1: Option<Value>,
    pub parking_slot_property_2: Option<Value>,
    pub group_id: Option<GroupId>,
    pub ground_lock_state: Option<Value>,
    /// Fields this tool does not know about, passed through untouched.
    pub extra: Map<String, Value>,
    pub(crate) source_keypoints: Option<SourceKeypoints>,
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        AnnotationKind::from_category(&self.category)
    }

    pub fn is_session_created(&self) -> bool {
        self.id >= SESSION_ID_BASE
    }

    pub fn corner_count(&self) -> usize {
        self.keypoints.len() / 2
    }

    pub fn corner(&self, index: usize) -> Option<Point> {
        let x = *self.keypoints.get(index * 2)?;
        let y = *self.keypoints.get(index * 2 + 1)?;
        Some(Point::new(x, y))
    }

    pub fn corners(&self) -> impl Iterator<Item = Point> + '_ {
        self.keypoints
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
    }

    pub(crate) fn set_corner(&mut self, index: usize, p: Point) -> bool {
        if index >= self.corner_count() {
            return false;
        }
        self.keypoints[index * 2] = p.x;
        self.keypoints[index * 2 + 1] = p.y;
        true
    }

    /// Structural checks every annotation must pass, whatever its origin.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.keypoints.len() % 2 != 0 {
            return Err(format!(
                "keypoints has odd length {}",
                self.keypoints.len()
            ));
        }
        if self.keypoints.len() != 2 * self.corner_property.len() {
            return Err(format!(
                "{} keypoint values but {} corner properties",
                self.keypoints.len(),
                self.corner_property.len()
            ));
        }
        if let Some(expected) = self.kind().expected_corners() {
            if self.corner_count() != expected {
                return Err(format!(
                    "{} needs {} corners, found {}",
                    self.category,
                    expected,
                    self.corner_count()
                ));
            }
        }
        if let Some(t_or_l) = &self.t_or_l {
            if self.kind() != AnnotationKind::ParkingSpace {
                return Err(format!("T_or_L is not valid on {}", self.category));
            }
            if t_or_l.len() != 2 {
                return Err(format!("T_or_L needs 2 entries, found {}", t_or_l.len()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Resume position and id counter, persisted as two lines of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub current_image_index: usize,
    pub next_annotation_id: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_image_index: 0,
            next_annotation_id: SESSION_ID_BASE,
        }
    }
}

impl SessionState {
    /// First line is the image index, second (optional) line the next id.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines();
        let mut state = Self::default();

        let index = lines.next().map(str::trim).unwrap_or_default();
        if !index.is_empty() {
            state.current_image_index = index
                .parse()
                .map_err(|_| format!("bad image index '{index}'"))?;
        }
        if let Some(next) = lines.next().map(str::trim).filter(|l| !l.is_empty()) {
            state.next_annotation_id = next
                .parse()
                .map_err(|_| format!("bad annotation id '{next}'"))?;
        }
        Ok(state)
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.current_image_index, self.next_annotation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_wire_forms() {
        let linked: GroupId = serde_json::from_str("7").unwrap();
        let unlinked: GroupId = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(linked, GroupId::Linked(7));
        assert_eq!(unlinked, GroupId::Unlinked);
        assert_eq!(serde_json::to_string(&unlinked).unwrap(), "\"none\"");
        assert!(serde_json::from_str::<GroupId>("\"seven\"").is_err());
    }

    #[test]
    fn absent_and_null_optional_fields_stay_distinct() {
        let absent: RawAnnotation = serde_json::from_value(serde_json::json!({
            "id": 1, "image_id": 1, "category_id": 1,
            "keypoints": [1, 2], "corner_property": ["visible"]
        }))
        .unwrap();
        assert_eq!(absent.parking_slot_property_2, None);

        let null: RawAnnotation = serde_json::from_value(serde_json::json!({
            "id": 1, "image_id": 1, "category_id": 1,
            "keypoints": [1, 2], "corner_property": ["visible"],
            "parking_slot_property_2": null
        }))
        .unwrap();
        assert_eq!(null.parking_slot_property_2, Some(Value::Null));
        let back = serde_json::to_value(&null).unwrap();
        assert!(back.as_object().unwrap().contains_key("parking_slot_property_2"));
        assert!(!back.as_object().unwrap().contains_key("T_or_L"));
    }

    #[test]
    fn unknown_fields_are_kept() {
        let raw: RawAnnotation = serde_json::from_value(serde_json::json!({
            "id": 1, "image_id": 1, "category_id": 1,
            "keypoints": [1, 2], "corner_property": ["covered"],
            "reviewer": "alice"
        }))
        .unwrap();
        assert_eq!(raw.extra.get("reviewer"), Some(&Value::from("alice")));
    }

    #[test]
    fn session_state_text() {
        let state = SessionState::parse("12\n1000042").unwrap();
        assert_eq!(state.current_image_index, 12);
        assert_eq!(state.next_annotation_id, 1_000_042);
        assert_eq!(state.render(), "12\n1000042");

        let only_index = SessionState::parse("3\n").unwrap();
        assert_eq!(only_index.next_annotation_id, SESSION_ID_BASE);
        assert_eq!(SessionState::parse("").unwrap(), SessionState::default());
        assert!(SessionState::parse("three").is_err());
    }
}
