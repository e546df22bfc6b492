//! Contract between the editing session and the host view.
//!
//! The corner edit dialog is a plain request/response call: the session
//! hands over the current values together with which fields may change, and
//! the host answers with either the confirmed values or a cancellation. The
//! session is mutably borrowed for the whole call, so no other pointer event
//! can reach it while the dialog is open.

use crate::state::{CornerProperty, GroupId, TOrL};

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub annotation_id: i64,
    pub category: String,
    pub corner: usize,
    pub corner_property: CornerProperty,
    /// Only set for the entrance corners of a parking space carrying `T_or_L`.
    pub t_or_l: Option<TOrL>,
    /// Group ids can only be edited on session-created annotations.
    pub group_id_editable: bool,
    pub group_id: Option<GroupId>,
}

/// Values confirmed by the reviewer. Fields the request did not offer are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct EditValues {
    pub corner_property: CornerProperty,
    pub t_or_l: Option<TOrL>,
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Commit(EditValues),
    /// Dialog closed without confirming.
    Cancel,
}

impl EditRequest {
    /// The values as they are now, for hosts that pre-fill their dialog.
    pub fn current_values(&self) -> EditValues {
        EditValues {
            corner_property: self.corner_property,
            t_or_l: self.t_or_l,
            group_id: self.group_id,
        }
    }
}

/// What the editing core needs from the UI toolkit.
pub trait HostView {
    /// Current zoom control value. Read before every geometry access.
    fn scale(&self) -> f64;

    /// Show the corner edit dialog and block until it closes.
    fn edit_corner(&mut self, request: &EditRequest) -> EditOutcome;
}
