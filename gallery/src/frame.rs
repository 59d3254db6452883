//! Per-frame orchestration: input, player, gaze, physics, sync, camera, render.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use engine_core::jobs::{JobsConfig, JobsTelemetry};
use engine_core::logging;
use gallery_layout::{ArtworkPlacement, GalleryLayout, LayoutError, LightRig};
use physics_rapier::{PhysicsWorld, FIXED_DT, MAX_SUBSTEPS};
use platform_winit::WindowInitError;
use player_camera::{CameraPose, PlayerCamera, Projection};
use player_controller::{ControllerConfig, InputState, MoveAxis, PlayerBodyConfig, PlayerController};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;
use render_wgpu::{MeshError, RenderInitError};

use crate::artwork::{ArtworkLoader, Canvas, Catalog};
use crate::gaze::{GazeChange, GazeDetector};
use crate::hall::{build_hall, place_canvas};
use crate::overlay::{InfoOverlay, OverlaySink, OverlayState};
use crate::scene::Scene;
use crate::settings::Settings;

const TARGET: &str = "frame";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// No cursor capture: the world keeps stepping and rendering, the player and
    /// gaze do not update.
    #[default]
    LockedOut,
    Active,
}

#[derive(Debug)]
pub enum GalleryError {
    Layout(LayoutError),
    Window(WindowInitError),
    Render(RenderInitError),
    Mesh(MeshError),
}

impl fmt::Display for GalleryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalleryError::Layout(err) => write!(f, "layout: {}", err),
            GalleryError::Window(err) => write!(f, "window: {}", err),
            GalleryError::Render(err) => write!(f, "renderer: {}", err),
            GalleryError::Mesh(err) => write!(f, "scene mesh: {}", err),
        }
    }
}

impl std::error::Error for GalleryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GalleryError::Layout(err) => Some(err),
            GalleryError::Window(err) => Some(err),
            GalleryError::Render(err) => Some(err),
            GalleryError::Mesh(err) => Some(err),
        }
    }
}

impl From<LayoutError> for GalleryError {
    fn from(err: LayoutError) -> Self {
        GalleryError::Layout(err)
    }
}

impl From<WindowInitError> for GalleryError {
    fn from(err: WindowInitError) -> Self {
        GalleryError::Window(err)
    }
}

impl From<RenderInitError> for GalleryError {
    fn from(err: RenderInitError) -> Self {
        GalleryError::Render(err)
    }
}

impl From<MeshError> for GalleryError {
    fn from(err: MeshError) -> Self {
        GalleryError::Mesh(err)
    }
}

#[derive(Clone, Debug)]
pub struct GalleryOptions {
    pub controller: ControllerConfig,
    pub player_body: PlayerBodyConfig,
    pub eye_height: Real,
    pub mouse_sensitivity: Real,
    pub camera_smoothing: Real,
    pub gaze_interval: Duration,
    pub asset_root: PathBuf,
    pub jobs: JobsConfig,
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl GalleryOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            controller: ControllerConfig {
                move_speed: settings.move_speed,
                jump_speed: settings.jump_speed,
            },
            player_body: PlayerBodyConfig::default(),
            eye_height: settings.eye_height,
            mouse_sensitivity: settings.mouse_sensitivity,
            camera_smoothing: settings.camera_smoothing,
            gaze_interval: settings.gaze_interval(),
            asset_root: PathBuf::from("assets"),
            jobs: JobsConfig::threaded(2, 32),
        }
    }
}

/// Everything a renderer needs for one frame.
pub struct FrameView<'a> {
    pub scene: &'a Scene,
    pub lights: &'a LightRig,
    pub camera: CameraPose,
    pub projection: &'a Projection,
    pub mode: Mode,
}

/// The single render call at the end of a tick. `overlay` is the sink the
/// tick just updated, handed over read-only so UI can be drawn from it.
pub trait FrameRenderer<S: ?Sized> {
    type Error;

    fn draw(&mut self, view: &FrameView<'_>, overlay: &S) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub dt: Real,
    pub substeps: usize,
    pub canvases_placed: usize,
    /// Image decode pool after this tick's poll.
    pub loads: JobsTelemetry,
    pub gaze: GazeChange,
}

/// Simulation context for one gallery session.
pub struct Gallery {
    world: PhysicsWorld,
    scene: Scene,
    catalog: Catalog,
    placements: Vec<ArtworkPlacement>,
    placed: Vec<bool>,
    lights: LightRig,
    loader: ArtworkLoader,
    controller: PlayerController,
    input: InputState,
    camera: PlayerCamera,
    projection: Projection,
    gaze: GazeDetector,
    overlay: InfoOverlay,
    mode: Mode,
    last_tick: Option<Instant>,
}

impl Gallery {
    pub fn new(layout: &GalleryLayout, options: GalleryOptions) -> Result<Self, GalleryError> {
        let resolved = layout.resolve()?;
        let hall = build_hall(&resolved, &options.player_body);
        let catalog = Catalog::new(layout.artworks.clone());
        let loader = ArtworkLoader::new(options.jobs, options.asset_root, resolved.frame);
        let mut camera = PlayerCamera::new(options.eye_height)
            .with_smoothing(options.camera_smoothing)
            .with_sensitivity(options.mouse_sensitivity);
        if let Some(pose) = hall.world.body_pose(hall.player) {
            camera.snap_to(pose.translation.vector);
        }

        let mut gallery = Self {
            world: hall.world,
            scene: hall.scene,
            placed: vec![false; catalog.len()],
            catalog,
            placements: resolved.placements,
            lights: resolved.lights,
            loader,
            controller: PlayerController::new(options.controller, hall.player),
            input: InputState::default(),
            camera,
            projection: Projection::default(),
            gaze: GazeDetector::new(options.gaze_interval),
            overlay: InfoOverlay::new(),
            mode: Mode::LockedOut,
            last_tick: None,
        };
        gallery.request_artworks();
        logging::info(
            TARGET,
            format!(
                "gallery '{}' ready: {} artworks, {} loading",
                layout.name,
                gallery.catalog.len(),
                gallery.loader.pending()
            ),
        );
        Ok(gallery)
    }

    fn request_artworks(&mut self) {
        let ready: Vec<Canvas> = self
            .catalog
            .iter()
            .filter_map(|(id, record)| self.loader.request(id, record))
            .collect();
        for canvas in ready {
            self.place(canvas);
        }
    }

    /// Adds the canvas unless its record already has one.
    fn place(&mut self, canvas: Canvas) -> bool {
        let index = canvas.artwork.0;
        let (Some(placed), Some(placement)) =
            (self.placed.get_mut(index), self.placements.get(index))
        else {
            logging::warn(TARGET, format!("{} has no placement, dropped", canvas.artwork));
            return false;
        };
        if *placed {
            return false;
        }
        *placed = true;
        place_canvas(&mut self.scene, &canvas, placement);
        true
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Capture acquired or lost. Losing it releases every held movement key and
    /// drops a jump press that has not been issued.
    pub fn set_capture(&mut self, captured: bool) {
        let mode = if captured { Mode::Active } else { Mode::LockedOut };
        if mode == self.mode {
            return;
        }
        if mode == Mode::LockedOut {
            self.input.release_all();
            self.controller.cancel_jump();
        }
        logging::debug(TARGET, format!("mode {:?} -> {:?}", self.mode, mode));
        self.mode = mode;
    }

    pub fn set_move(&mut self, axis: MoveAxis, pressed: bool) {
        self.input.set(axis, pressed);
    }

    /// Fresh (non-repeat) jump press. Rejected while locked out.
    pub fn press_jump(&mut self) -> bool {
        if self.mode != Mode::Active {
            return false;
        }
        self.controller.press_jump()
    }

    /// Raw pointer motion; ignored unless capture is held.
    pub fn look(&mut self, dx: Real, dy: Real) {
        if self.mode == Mode::Active {
            self.camera.apply_mouse_delta(dx, dy);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.set_viewport(width, height);
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }

    pub fn controller(&self) -> &PlayerController {
        &self.controller
    }

    pub fn camera(&self) -> CameraPose {
        self.camera.pose()
    }

    pub fn camera_mut(&mut self) -> &mut PlayerCamera {
        &mut self.camera
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.overlay.state()
    }

    pub fn pending_loads(&self) -> usize {
        self.loader.pending()
    }

    pub fn player_position(&self) -> Vector<Real> {
        self.world
            .body_pose(self.controller.body())
            .map(|pose| pose.translation.vector)
            .unwrap_or_else(Vector::zeros)
    }

    pub fn tick<S, R>(
        &mut self,
        now: Instant,
        sink: &mut S,
        renderer: &mut R,
    ) -> Result<TickReport, R::Error>
    where
        S: OverlaySink,
        R: FrameRenderer<S>,
    {
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let mut canvases_placed = 0;
        for canvas in self.loader.poll() {
            if self.place(canvas) {
                canvases_placed += 1;
            }
        }
        self.controller.absorb_contacts(self.world.drain_contacts());

        let mut gaze = GazeChange::Unchanged;
        if self.mode == Mode::Active {
            self.controller
                .update(&mut self.world, &self.input, self.camera.yaw());
            let ray = self.camera.pose().screen_ray([0.0, 0.0], &self.projection);
            gaze = self.gaze.update(now, &ray, &self.scene);
            self.overlay.apply(gaze, &self.catalog, sink);
        }

        let substeps = self.world.step_frame(FIXED_DT, dt, MAX_SUBSTEPS);
        self.scene
            .sync_bodies(&self.world, Some(self.controller.body()));
        let position = self.player_position();
        let camera = self.camera.follow(position);

        let view = FrameView {
            scene: &self.scene,
            lights: &self.lights,
            camera,
            projection: &self.projection,
            mode: self.mode,
        };
        renderer.draw(&view, sink)?;

        Ok(TickReport {
            dt,
            substeps,
            canvases_placed,
            loads: self.loader.telemetry(),
            gaze,
        })
    }
}
