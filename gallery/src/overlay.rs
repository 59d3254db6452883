//! Info panel state machine and the sinks that present it.

use engine_core::logging;
use gallery_layout::ArtworkRecord;

use crate::artwork::{ArtworkId, Catalog};
use crate::gaze::GazeChange;

const TARGET: &str = "overlay";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayPanel {
    pub name: String,
    pub lifespan: String,
    pub description: String,
    pub achievement: String,
}

impl From<&ArtworkRecord> for OverlayPanel {
    fn from(record: &ArtworkRecord) -> Self {
        Self {
            name: record.name.clone(),
            lifespan: record.lifespan.clone(),
            description: record.description.clone(),
            achievement: record.achievement.clone(),
        }
    }
}

pub trait OverlaySink {
    fn show(&mut self, panel: &OverlayPanel);
    fn hide(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Hidden,
    Showing(ArtworkId),
}

#[derive(Clone, Debug, Default)]
pub struct InfoOverlay {
    state: OverlayState,
}

impl InfoOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Shows `artwork`'s panel. Ids outside the catalog hide instead.
    pub fn show(&mut self, artwork: ArtworkId, catalog: &Catalog, sink: &mut dyn OverlaySink) {
        let Some(record) = catalog.get(artwork) else {
            logging::debug(TARGET, format!("{} not in catalog, hiding", artwork));
            self.hide(sink);
            return;
        };
        if self.state == OverlayState::Showing(artwork) {
            return;
        }
        sink.show(&OverlayPanel::from(record));
        self.state = OverlayState::Showing(artwork);
    }

    pub fn hide(&mut self, sink: &mut dyn OverlaySink) {
        if self.state == OverlayState::Hidden {
            return;
        }
        sink.hide();
        self.state = OverlayState::Hidden;
    }

    pub fn apply(&mut self, change: GazeChange, catalog: &Catalog, sink: &mut dyn OverlaySink) {
        match change {
            GazeChange::Unchanged => {}
            GazeChange::Show(artwork) => self.show(artwork, catalog, sink),
            GazeChange::Hide => self.hide(sink),
        }
    }
}

/// Sink that keeps the current panel for a UI layer to draw and logs each change.
#[derive(Clone, Debug, Default)]
pub struct PanelSlot {
    current: Option<OverlayPanel>,
}

impl PanelSlot {
    pub fn current(&self) -> Option<&OverlayPanel> {
        self.current.as_ref()
    }
}

impl OverlaySink for PanelSlot {
    fn show(&mut self, panel: &OverlayPanel) {
        logging::info(
            TARGET,
            format!("show '{}' ({})", panel.name, panel.lifespan),
        );
        self.current = Some(panel.clone());
    }

    fn hide(&mut self) {
        logging::info(TARGET, "hide");
        self.current = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use gallery_layout::{WallSide, WallSlot};

    /// Records every call it receives.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub shown: Vec<OverlayPanel>,
        pub hides: usize,
    }

    impl OverlaySink for RecordingSink {
        fn show(&mut self, panel: &OverlayPanel) {
            self.shown.push(panel.clone());
        }

        fn hide(&mut self) {
            self.hides += 1;
        }
    }

    fn catalog() -> Catalog {
        let record = |name: &str| ArtworkRecord {
            name: name.to_string(),
            lifespan: "1932-1973".to_string(),
            description: format!("{} description", name),
            achievement: format!("{} achievement", name),
            image: None,
            wall: WallSide::Front,
            slot: WallSlot::Start,
        };
        Catalog::new(vec![record("First"), record("Second")])
    }

    #[test]
    fn show_copies_fields_verbatim() {
        let catalog = catalog();
        let mut overlay = InfoOverlay::new();
        let mut sink = RecordingSink::default();
        overlay.show(ArtworkId(1), &catalog, &mut sink);
        assert_eq!(overlay.state(), OverlayState::Showing(ArtworkId(1)));
        assert_eq!(sink.shown.len(), 1);
        let panel = &sink.shown[0];
        assert_eq!(panel.name, "Second");
        assert_eq!(panel.lifespan, "1932-1973");
        assert_eq!(panel.description, "Second description");
        assert_eq!(panel.achievement, "Second achievement");
    }

    #[test]
    fn out_of_range_id_hides() {
        let catalog = catalog();
        let mut overlay = InfoOverlay::new();
        let mut sink = RecordingSink::default();
        overlay.show(ArtworkId(0), &catalog, &mut sink);
        overlay.show(ArtworkId(99), &catalog, &mut sink);
        assert_eq!(overlay.state(), OverlayState::Hidden);
        assert_eq!(sink.hides, 1);
    }

    #[test]
    fn hide_when_hidden_does_not_reach_sink() {
        let mut overlay = InfoOverlay::new();
        let mut sink = RecordingSink::default();
        overlay.hide(&mut sink);
        overlay.apply(GazeChange::Hide, &catalog(), &mut sink);
        assert_eq!(sink.hides, 0);
    }

    #[test]
    fn repeated_show_is_idempotent() {
        let catalog = catalog();
        let mut overlay = InfoOverlay::new();
        let mut sink = RecordingSink::default();
        for _ in 0..4 {
            overlay.apply(GazeChange::Show(ArtworkId(0)), &catalog, &mut sink);
        }
        assert_eq!(sink.shown.len(), 1);
    }

    #[test]
    fn panel_slot_tracks_current_panel() {
        let catalog = catalog();
        let mut overlay = InfoOverlay::new();
        let mut slot = PanelSlot::default();
        overlay.show(ArtworkId(0), &catalog, &mut slot);
        assert_eq!(slot.current().map(|p| p.name.as_str()), Some("First"));
        overlay.hide(&mut slot);
        assert!(slot.current().is_none());
    }
}
