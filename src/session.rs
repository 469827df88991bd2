use bevy::prelude::Resource;

/// What the user has chosen so far. `Pending` is shown with the
/// confirm/cancel bar, `Idle` with the model picker; there is no third
/// visual state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    Pending(String),
}

/// Per-session placement state, owned by the app and handed to the
/// control surface and the scene bridge. All mutation happens on the
/// main schedule in response to input events.
#[derive(Resource, Debug)]
pub struct PlacementSession {
    pub selection: SelectionState,
    requested: Option<String>,
    pub status: String,
}

impl Default for PlacementSession {
    fn default() -> Self {
        Self {
            selection: SelectionState::Idle,
            requested: None,
            status: "Ready".to_string(),
        }
    }
}

impl PlacementSession {
    /// Picker tap. The picker only offers catalog members, so `name` is
    /// trusted to be a valid model identifier.
    pub fn select_model(&mut self, name: impl Into<String>) {
        self.selection = SelectionState::Pending(name.into());
    }

    /// Cancel the pending selection. No-op when nothing is pending.
    pub fn cancel(&mut self) {
        self.selection = SelectionState::Idle;
    }

    /// Confirm the pending selection: back to `Idle`, and the selected
    /// model becomes the outstanding placement request. A new confirm
    /// overwrites an unconsumed request; it never queues. No-op while
    /// `Idle`.
    pub fn confirm(&mut self) {
        if let SelectionState::Pending(name) =
            std::mem::replace(&mut self.selection, SelectionState::Idle)
        {
            self.requested = Some(name);
        }
    }

    pub fn pending_model(&self) -> Option<&str> {
        match &self.selection {
            SelectionState::Pending(name) => Some(name),
            SelectionState::Idle => None,
        }
    }

    /// The outstanding placement request, if any. Consumed by the scene
    /// bridge via [`clear_request`](Self::clear_request).
    pub fn requested_model(&self) -> Option<&str> {
        self.requested.as_deref()
    }

    pub fn clear_request(&mut self) {
        self.requested = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_idle_with_no_request() {
        let session = PlacementSession::default();
        assert_eq!(session.selection, SelectionState::Idle);
        assert_eq!(session.requested_model(), None);
    }

    #[test]
    fn select_then_cancel_returns_to_idle_without_request() {
        let mut session = PlacementSession::default();
        session.select_model("chair");
        assert_eq!(
            session.selection,
            SelectionState::Pending("chair".to_string())
        );

        session.cancel();
        assert_eq!(session.selection, SelectionState::Idle);
        assert_eq!(session.requested_model(), None);
    }

    #[test]
    fn select_then_confirm_emits_exactly_one_request() {
        let mut session = PlacementSession::default();
        session.select_model("lamp");
        session.confirm();

        assert_eq!(session.selection, SelectionState::Idle);
        assert_eq!(session.requested_model(), Some("lamp"));

        session.clear_request();
        assert_eq!(session.requested_model(), None);

        // Nothing new was confirmed, so a later look at the slot still
        // finds it empty.
        assert_eq!(session.requested_model(), None);
    }

    #[test]
    fn confirm_while_idle_is_a_no_op() {
        let mut session = PlacementSession::default();
        session.confirm();
        assert_eq!(session.selection, SelectionState::Idle);
        assert_eq!(session.requested_model(), None);
    }

    #[test]
    fn cancel_while_idle_is_a_no_op() {
        let mut session = PlacementSession::default();
        session.cancel();
        assert_eq!(session.selection, SelectionState::Idle);
        assert_eq!(session.requested_model(), None);
    }

    #[test]
    fn a_new_confirm_overwrites_an_unconsumed_request() {
        let mut session = PlacementSession::default();
        session.select_model("chair");
        session.confirm();
        session.select_model("lamp");
        session.confirm();

        // Single slot, not a queue.
        assert_eq!(session.requested_model(), Some("lamp"));
    }

    #[test]
    fn pending_model_tracks_selection() {
        let mut session = PlacementSession::default();
        assert_eq!(session.pending_model(), None);
        session.select_model("chair");
        assert_eq!(session.pending_model(), Some("chair"));
        session.cancel();
        assert_eq!(session.pending_model(), None);
    }
}
