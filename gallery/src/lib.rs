//! Walkable gallery: scene registry, artwork loading, gaze-driven info overlay
//! and the per-frame update that ties them to the player and physics world.
#![forbid(unsafe_code)]

pub mod artwork;
pub mod frame;
pub mod gaze;
pub mod hall;
pub mod overlay;
pub mod scene;
pub mod settings;
pub mod shading;

pub use artwork::{ArtworkId, Catalog};
pub use frame::{FrameRenderer, Gallery, GalleryError, GalleryOptions, Mode};
pub use overlay::{InfoOverlay, OverlayPanel, OverlaySink, PanelSlot};
pub use scene::Scene;
