//! Pointer-driven editing of the current image's annotations.
//!
//! States:
//! - `Idle` - no corner is held; a previously clicked annotation may still be
//!   remembered as "last selected" for delete
//! - `PointSelected` - pointer went down on a corner
//! - `Dragging` - the held corner follows the pointer
//!
//! Releasing the pointer drops the held corner and returns to `Idle`.

mod dialog;

pub use dialog::*;

use crate::config::{AppConfig, EditingConfig};
use crate::error::{AnnotatorError, Result};
use crate::export::{PersistenceController, SaveReport};
use crate::state::{
    AnnotationKind, AnnotationStore, CornerRef, DisplayAnnotation, ImageKey, SessionState,
};
use crate::transform::{CoordinateTransform, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    PointSelected(CornerRef),
    Dragging(CornerRef),
}

impl EditState {
    fn active(&self) -> Option<CornerRef> {
        match self {
            Self::Idle => None,
            Self::PointSelected(at) | Self::Dragging(at) => Some(*at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    ParkingSpace,
    Limiter,
}

pub struct EditingSession {
    store: AnnotationStore,
    persistence: PersistenceController,
    images: Vec<ImageKey>,
    current_index: usize,
    state: EditState,
    last_selected: Option<usize>,
    base_transform: CoordinateTransform,
    hit_tolerance: f64,
    editing: EditingConfig,
}

impl EditingSession {
    /// Start on the resumed image if it is still part of the working set.
    pub fn new(
        store: AnnotationStore,
        persistence: PersistenceController,
        images: Vec<ImageKey>,
        resume: &SessionState,
        config: &AppConfig,
    ) -> Self {
        let current_index = if resume.current_image_index < images.len() {
            resume.current_image_index
        } else {
            0
        };
        Self {
            store,
            persistence,
            images,
            current_index,
            state: EditState::Idle,
            last_selected: None,
            base_transform: CoordinateTransform::new(
                config.transform.storage_offset,
                config.transform.initial_scale,
            ),
            hit_tolerance: config.transform.hit_tolerance,
            editing: config.editing.clone(),
        }
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn last_selected(&self) -> Option<usize> {
        self.last_selected
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn current_image(&self) -> Option<&ImageKey> {
        self.images.get(self.current_index)
    }

    /// "3 / 120" style label for the host.
    pub fn position_label(&self) -> String {
        format!("{} / {}", self.current_index + 1, self.images.len())
    }

    pub fn session_state(&self) -> SessionState {
        SessionState {
            current_image_index: self.current_index,
            next_annotation_id: self.store.next_id(),
        }
    }

    fn transform(&self, host: &dyn HostView) -> CoordinateTransform {
        self.base_transform.with_scale(host.scale())
    }

    fn current_key(&self) -> Result<ImageKey> {
        self.current_image()
            .cloned()
            .ok_or(AnnotatorError::NoImageLoaded)
    }

    /// Current image's annotations in display space.
    pub fn display_annotations(&self, host: &dyn HostView) -> Vec<DisplayAnnotation> {
        match self.current_image() {
            Some(key) => self.store.display_annotations(key, &self.transform(host)),
            None => Vec::new(),
        }
    }

    pub fn hit_test(&self, host: &dyn HostView, point: Point) -> Option<CornerRef> {
        let key = self.current_image()?;
        self.store
            .find_near(key, point, self.hit_tolerance, &self.transform(host))
    }

    /// Pointer pressed. Clears any previous selection, then grabs the first
    /// corner under the pointer.
    pub fn pointer_down(&mut self, host: &dyn HostView, point: Point) -> Option<CornerRef> {
        self.state = EditState::Idle;
        self.last_selected = None;

        let hit = self.hit_test(host, point)?;
        self.state = EditState::PointSelected(hit);
        self.last_selected = Some(hit.annotation);
        tracing::debug!(annotation = hit.annotation, corner = hit.corner, "Corner selected");
        Some(hit)
    }

    /// Pointer moved with the button held. Returns whether a corner moved.
    pub fn pointer_move(&mut self, host: &dyn HostView, point: Point) -> bool {
        let Some(at) = self.state.active() else {
            return false;
        };
        let Some(key) = self.current_image().cloned() else {
            return false;
        };
        let transform = self.transform(host);
        if self.store.mutate_corner(&key, at, point, &transform) {
            self.state = EditState::Dragging(at);
            true
        } else {
            false
        }
    }

    /// Pointer released. Drops the held corner and rewrites the review file,
    /// whether or not a corner was held.
    ///
    /// The in-memory edit is kept even when writing fails.
    pub fn pointer_up(&mut self) -> Result<()> {
        let dragged = matches!(self.state, EditState::Dragging(_));
        if let Some(at) = self.state.active() {
            tracing::debug!(annotation = at.annotation, dragged, "Corner released");
        }
        self.state = EditState::Idle;

        self.persist_current()?;
        if dragged && self.editing.save_documents_on_release {
            self.persistence.save_documents(&self.store)?;
        }
        Ok(())
    }

    /// Open the corner dialog for the corner under the pointer. Returns
    /// whether an edit was committed.
    pub fn double_click(&mut self, host: &mut dyn HostView, point: Point) -> Result<bool> {
        let Some(hit) = self.hit_test(host, point) else {
            return Ok(false);
        };
        let key = self.current_key()?;
        let Some(annotation) = self.store.annotations(&key).get(hit.annotation) else {
            return Ok(false);
        };

        let t_or_l = match annotation.kind() {
            AnnotationKind::ParkingSpace if hit.corner < 2 => annotation
                .t_or_l
                .as_ref()
                .and_then(|entries| entries.get(hit.corner).copied()),
            _ => None,
        };
        let request = EditRequest {
            annotation_id: annotation.id,
            category: annotation.category.clone(),
            corner: hit.corner,
            corner_property: annotation.corner_property[hit.corner],
            t_or_l,
            group_id_editable: annotation.is_session_created(),
            group_id: annotation.group_id,
        };

        let values = match host.edit_corner(&request) {
            EditOutcome::Commit(values) => values,
            EditOutcome::Cancel => {
                tracing::debug!(id = request.annotation_id, "Corner edit cancelled");
                return Ok(false);
            }
        };

        self.store
            .set_corner_property(&key, hit, values.corner_property);
        if let (Some(_), Some(value)) = (request.t_or_l, values.t_or_l) {
            self.store.set_t_or_l(&key, hit, value);
        }
        if let (true, Some(group_id)) = (request.group_id_editable, values.group_id) {
            self.store.set_group_id(&key, hit.annotation, group_id);
        }
        tracing::debug!(id = request.annotation_id, corner = hit.corner, "Corner edit committed");
        self.persist_current()?;
        Ok(true)
    }

    /// Delete the last selected annotation. No-op without a selection.
    pub fn delete_selected(&mut self) -> Result<Option<i64>> {
        let Some(index) = self.last_selected.take() else {
            return Ok(None);
        };
        self.state = EditState::Idle;
        let key = self.current_key()?;
        let removed = self.store.delete(&key, index).map(|a| a.id);
        self.persist_current()?;
        Ok(removed)
    }

    /// Append a default annotation to the current image and persist.
    pub fn create(&mut self, kind: CreateKind) -> Result<i64> {
        let key = self.current_key()?;
        let template = match kind {
            CreateKind::ParkingSpace => &self.editing.parking_template,
            CreateKind::Limiter => &self.editing.limiter_template,
        };
        let id = self.store.create(&key, template)?;
        self.state = EditState::Idle;
        self.persist_current()?;
        Ok(id)
    }

    pub fn next_image(&mut self) -> bool {
        if self.current_index + 1 < self.images.len() {
            self.switch_to(self.current_index + 1);
            true
        } else {
            false
        }
    }

    pub fn previous_image(&mut self) -> bool {
        if self.current_index > 0 && !self.images.is_empty() {
            self.switch_to(self.current_index - 1);
            true
        } else {
            false
        }
    }

    fn switch_to(&mut self, index: usize) {
        self.current_index = index;
        self.state = EditState::Idle;
        self.last_selected = None;
        if let Some(key) = self.current_image() {
            tracing::debug!(index, image = %key, "Switched image");
        }
    }

    fn persist_current(&self) -> Result<()> {
        match self.current_image() {
            Some(key) => self.persistence.write_review(self.store.annotations(key)),
            None => Ok(()),
        }
    }

    pub fn save_documents(&self) -> Result<SaveReport> {
        self.persistence.save_documents(&self.store)
    }

    /// Session end: session state first, then every folder document.
    pub fn finish(&self) -> Result<SaveReport> {
        self.persistence.save_session(&self.session_state())?;
        self.save_documents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::{normalize_document, AnnotationCollection, CornerProperty, GroupId};
    use serde_json::json;
    use std::path::Path;

    struct FakeHost {
        scale: f64,
        answer: EditOutcome,
        requests: Vec<EditRequest>,
    }

    impl FakeHost {
        fn new(scale: f64) -> Self {
            Self {
                scale,
                answer: EditOutcome::Cancel,
                requests: Vec::new(),
            }
        }
    }

    impl HostView for FakeHost {
        fn scale(&self) -> f64 {
            self.scale
        }

        fn edit_corner(&mut self, request: &EditRequest) -> EditOutcome {
            self.requests.push(request.clone());
            self.answer.clone()
        }
    }

    fn session(dir: &Path) -> EditingSession {
        let mut config = AppConfig::default();
        config.paths.output_root = dir.join("out");
        config.paths.review_file = dir.join("annotations.txt");
        config.paths.session_file = dir.join("saved_data.txt");
        config.editing.save_documents_on_release = false;

        let document = serde_json::from_value(json!({
            "categories": [{"id": 1, "name": "parking_space"}, {"id": 2, "name": "limiter"}],
            "images": [{"id": 10, "file_name": "a.jpg"}, {"id": 11, "file_name": "b.jpg"}],
            "annotations": [
                {"id": 42, "image_id": 10, "category_id": 1,
                 "keypoints": [100, 100, 200, 100, 200, 150, 100, 150],
                 "corner_property": ["visible", "visible", "covered", "covered"],
                 "T_or_L": ["T", "L"]}
            ]
        }))
        .unwrap();
        let folder = normalize_document(
            document,
            Path::new("lot/result_adjust_order.json"),
            &CoordinateTransform::new(150.0, 1.0),
        )
        .unwrap();
        let mut folders = AnnotationCollection::new();
        folders.insert("lot".to_string(), folder);

        EditingSession::new(
            AnnotationStore::new(folders, 1_000_000),
            PersistenceController::new(&config.paths, config.transform.storage_offset),
            vec![ImageKey::new("lot", "a.jpg"), ImageKey::new("lot", "b.jpg")],
            &SessionState::default(),
            &config,
        )
    }

    #[test]
    fn click_drag_release_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let host = FakeHost::new(1.0);

        let hit = session.pointer_down(&host, Point::new(352.0, 248.0));
        let at = CornerRef { annotation: 0, corner: 1 };
        assert_eq!(hit, Some(at));
        assert_eq!(session.state(), EditState::PointSelected(at));

        assert!(session.pointer_move(&host, Point::new(360.0, 260.0)));
        assert_eq!(session.state(), EditState::Dragging(at));

        session.pointer_up().unwrap();
        assert_eq!(session.state(), EditState::Idle);
        assert_eq!(session.last_selected(), Some(0));

        let key = ImageKey::new("lot", "a.jpg");
        assert_eq!(
            session.store().annotations(&key)[0].corner(1),
            Some(Point::new(360.0, 260.0))
        );
        let review = std::fs::read_to_string(dir.path().join("annotations.txt")).unwrap();
        assert!(review.starts_with("42 visible 100 100 visible 210 110 "));
    }

    #[test]
    fn miss_clears_selection_and_makes_delete_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let host = FakeHost::new(1.0);

        session.pointer_down(&host, Point::new(250.0, 250.0));
        assert_eq!(session.last_selected(), Some(0));
        assert_eq!(session.pointer_down(&host, Point::new(10.0, 10.0)), None);
        assert_eq!(session.last_selected(), None);
        assert_eq!(session.delete_selected().unwrap(), None);
        assert_eq!(session.store().annotations(&ImageKey::new("lot", "a.jpg")).len(), 1);
    }

    #[test]
    fn move_without_selection_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let host = FakeHost::new(1.0);
        assert!(!session.pointer_move(&host, Point::new(1.0, 1.0)));
        assert_eq!(session.state(), EditState::Idle);
    }

    #[test]
    fn zoom_is_read_at_every_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());

        // corner 0 is at storage (250, 250)
        assert!(session.pointer_down(&FakeHost::new(2.0), Point::new(500.0, 500.0)).is_some());
        assert!(session.pointer_move(&FakeHost::new(0.5), Point::new(130.0, 130.0)));
        let key = ImageKey::new("lot", "a.jpg");
        assert_eq!(
            session.store().annotations(&key)[0].corner(0),
            Some(Point::new(260.0, 260.0))
        );
    }

    #[test]
    fn double_click_offers_t_or_l_on_entrance_corners_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = FakeHost::new(1.0);

        assert!(!session.double_click(&mut host, Point::new(250.0, 250.0)).unwrap());
        assert!(!session.double_click(&mut host, Point::new(350.0, 300.0)).unwrap());
        assert_eq!(host.requests[0].t_or_l, Some(crate::state::TOrL::T));
        assert_eq!(host.requests[1].t_or_l, None);
        assert!(!host.requests[0].group_id_editable);
    }

    #[test]
    fn committed_edit_is_applied_and_group_id_stays_locked() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = FakeHost::new(1.0);
        host.answer = EditOutcome::Commit(EditValues {
            corner_property: CornerProperty::Truncated,
            t_or_l: Some(crate::state::TOrL::L),
            group_id: Some(GroupId::Linked(5)),
        });

        assert!(session.double_click(&mut host, Point::new(250.0, 250.0)).unwrap());
        let ann = &session.store().annotations(&ImageKey::new("lot", "a.jpg"))[0];
        assert_eq!(ann.corner_property[0], CornerProperty::Truncated);
        assert_eq!(
            ann.t_or_l,
            Some(vec![crate::state::TOrL::L, crate::state::TOrL::L])
        );
        assert_eq!(ann.group_id, None);
    }

    #[test]
    fn cancelled_edit_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let before = session.store().folders()["lot"].buckets["a.jpg"].clone();
        let mut host = FakeHost::new(1.0);
        assert!(!session.double_click(&mut host, Point::new(250.0, 250.0)).unwrap());
        assert_eq!(session.store().folders()["lot"].buckets["a.jpg"], before);
    }

    #[test]
    fn group_id_editable_on_created_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = FakeHost::new(1.0);
        session.create(CreateKind::Limiter).unwrap();
        host.answer = EditOutcome::Commit(EditValues {
            corner_property: CornerProperty::Covered,
            t_or_l: None,
            group_id: Some(GroupId::Linked(5)),
        });

        // limiter template corner 0 sits at storage (400, 400)
        assert!(session.double_click(&mut host, Point::new(400.0, 400.0)).unwrap());
        assert!(host.requests[0].group_id_editable);
        let created = &session.store().annotations(&ImageKey::new("lot", "a.jpg"))[1];
        assert_eq!(created.group_id, Some(GroupId::Linked(5)));
        assert_eq!(created.corner_property[0], CornerProperty::Covered);
    }

    #[test]
    fn navigation_resets_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let host = FakeHost::new(1.0);

        session.pointer_down(&host, Point::new(250.0, 250.0));
        assert!(session.next_image());
        assert_eq!(session.state(), EditState::Idle);
        assert_eq!(session.last_selected(), None);
        assert!(!session.next_image());
        assert_eq!(session.position_label(), "2 / 2");
        assert!(session.previous_image());
        assert!(!session.previous_image());
    }

    #[test]
    fn resume_index_out_of_range_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let config = AppConfig::default();
        let resumed = EditingSession::new(
            session.store().clone(),
            PersistenceController::new(&config.paths, 150.0),
            vec![ImageKey::new("lot", "a.jpg")],
            &SessionState {
                current_image_index: 9,
                next_annotation_id: 1_000_000,
            },
            &config,
        );
        assert_eq!(resumed.current_index(), 0);
    }
}
