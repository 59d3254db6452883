use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use engine_core::logging::{self, LogLevel};
use engine_core::observability;
use gallery::frame::{FrameView, TickReport};
use gallery::overlay::PanelSlot;
use gallery::scene::Scene;
use gallery::settings::Settings;
use gallery::shading::scene_mesh;
use gallery::{FrameRenderer, Gallery, GalleryError, GalleryOptions, Mode};
use gallery_layout::GalleryLayout;
use platform_winit::{
    create_window, key_action, set_cursor_capture, ControlFlow, DeviceEvent, ElementState, Event,
    KeyAction, MouseButton, Window, WindowEvent,
};
use player_controller::MoveAxis;
use render_wgpu::{MeshError, RenderError, Renderer};

mod ui;

use ui::UiLayer;

const TARGET: &str = "gallery";
const EXIT_USAGE: i32 = 2;

#[derive(Parser)]
#[command(name = "gallery", version, about = "Walk through a virtual portrait gallery")]
struct Args {
    /// key=value settings file.
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,
    /// TOML hall and catalog; defaults to the built-in gallery.
    #[arg(long, value_name = "PATH")]
    layout: Option<PathBuf>,
    /// Directory that artwork image paths are resolved against.
    #[arg(long, value_name = "DIR", default_value = "assets")]
    assets: PathBuf,
    /// error, warn, info or debug. Overrides the settings file.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug)]
enum DrawError {
    Mesh(MeshError),
    Surface(RenderError),
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::Mesh(err) => write!(f, "scene mesh: {}", err),
            DrawError::Surface(err) => write!(f, "surface: {}", err),
        }
    }
}

/// Window renderer: rebuilds the baked mesh when the scene changes, then draws
/// the scene with the egui layer on top.
struct WindowView {
    renderer: Renderer<'static>,
    ui: UiLayer,
    scene_revision: Option<u64>,
}

impl FrameRenderer<PanelSlot> for WindowView {
    type Error = DrawError;

    fn draw(&mut self, view: &FrameView<'_>, overlay: &PanelSlot) -> Result<(), DrawError> {
        let revision = view.scene.revision();
        if self.scene_revision != Some(revision) {
            upload_textures(&mut self.renderer, view.scene);
            let mesh = scene_mesh(view.scene, view.lights).map_err(DrawError::Mesh)?;
            self.renderer.set_scene(&mesh).map_err(DrawError::Mesh)?;
            self.scene_revision = Some(revision);
            logging::debug(
                TARGET,
                format!(
                    "scene mesh rebuilt: {} vertices in {} batches (revision {})",
                    mesh.vertices.len(),
                    mesh.batches.len(),
                    revision
                ),
            );
        }
        self.renderer
            .update_camera(view.camera.view_proj(view.projection));

        let ui_frame = self.ui.prepare(overlay.current(), view.mode);
        let ui = &mut self.ui;
        self.renderer
            .render_with_overlay(|device, queue, encoder, target| {
                ui.render(device, queue, encoder, target, &ui_frame);
            })
            .map_err(DrawError::Surface)
    }
}

/// Sends images of newly placed canvases to the GPU. Objects whose upload is
/// rejected keep drawing lit but untextured.
fn upload_textures(renderer: &mut Renderer<'_>, scene: &Scene) {
    for (id, image) in scene.textured() {
        let key = id.texture_key();
        if renderer.has_texture(key) {
            continue;
        }
        if let Err(err) = renderer.upload_texture(key, image.width, image.height, &image.rgba) {
            let name = scene.object(id).map_or("?", |object| object.name.as_str());
            logging::warn(TARGET, format!("texture for {} rejected: {}", name, err));
        }
    }
}

fn main() {
    let args = Args::parse();
    observability::install_panic_hook();

    let settings = args
        .settings
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();
    let log_level = match args.log_level.as_deref() {
        Some(value) => match LogLevel::parse(value) {
            Some(level) => level,
            None => {
                eprintln!("unknown log level '{}'", value);
                std::process::exit(EXIT_USAGE);
            }
        },
        None => settings.log_level,
    };
    logging::set_max_level(log_level);

    let layout = match load_layout(&args) {
        Ok(layout) => layout,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(EXIT_USAGE);
        }
    };
    for warning in layout.validate().warnings {
        logging::warn(TARGET, format!("layout: {}", warning));
    }

    if let Err(err) = run(settings, layout, args.assets) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn load_layout(args: &Args) -> Result<GalleryLayout, GalleryError> {
    let layout = match &args.layout {
        Some(path) => GalleryLayout::load(path)?,
        None => GalleryLayout::builtin()?,
    };
    Ok(layout)
}

fn run(settings: Settings, layout: GalleryLayout, assets: PathBuf) -> Result<(), GalleryError> {
    let options = GalleryOptions {
        asset_root: assets,
        ..GalleryOptions::from_settings(&settings)
    };
    let mut gallery = Gallery::new(&layout, options)?;

    let [width, height] = settings.resolution;
    let (event_loop, window) = create_window(&layout.name, width, height)?;
    let window: &'static Window = Box::leak(Box::new(window));
    let mut renderer = Renderer::new(window)?;
    let size = renderer.size();
    gallery.resize(size.width, size.height);
    // The hall itself must bake; artwork arrivals rebuild later from the frame loop.
    upload_textures(&mut renderer, gallery.scene());
    renderer.set_scene(&scene_mesh(gallery.scene(), gallery.lights())?)?;
    let ui = UiLayer::new(window, renderer.device(), renderer.surface_format());
    let mut view = WindowView {
        renderer,
        ui,
        scene_revision: Some(gallery.scene().revision()),
    };
    let mut panel = PanelSlot::default();
    let main_window_id = window.id();

    let result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, window_id } if window_id == main_window_id => {
                view.ui.handle_window_event(&event);
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(size) => {
                        view.renderer.resize(size);
                        gallery.resize(size.width, size.height);
                    }
                    WindowEvent::Focused(false) => {
                        set_capture(window, &mut gallery, false);
                    }
                    WindowEvent::MouseInput {
                        state: ElementState::Pressed,
                        button: MouseButton::Left,
                        ..
                    } => {
                        if gallery.mode() == Mode::LockedOut {
                            set_capture(window, &mut gallery, true);
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.repeat {
                            return;
                        }
                        let pressed = event.state == ElementState::Pressed;
                        match key_action(event.physical_key) {
                            Some(KeyAction::Forward) => gallery.set_move(MoveAxis::Forward, pressed),
                            Some(KeyAction::Back) => gallery.set_move(MoveAxis::Back, pressed),
                            Some(KeyAction::Left) => gallery.set_move(MoveAxis::Left, pressed),
                            Some(KeyAction::Right) => gallery.set_move(MoveAxis::Right, pressed),
                            Some(KeyAction::Jump) if pressed => {
                                gallery.press_jump();
                            }
                            Some(KeyAction::ReleaseCapture) if pressed => {
                                set_capture(window, &mut gallery, false);
                            }
                            _ => {}
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        match gallery.tick(Instant::now(), &mut panel, &mut view) {
                            Ok(report) => trace_tick(&report),
                            Err(DrawError::Surface(RenderError::Lost | RenderError::Outdated)) => {
                                let size = view.renderer.size();
                                view.renderer.resize(size);
                            }
                            Err(DrawError::Surface(RenderError::OutOfMemory)) => {
                                logging::error(TARGET, "render error: out of memory");
                                elwt.exit();
                            }
                            Err(err) => logging::error(TARGET, format!("render error: {}", err)),
                        }
                        if let Some(fault) = observability::take_sticky_error() {
                            logging::warn(TARGET, format!("continuing after fault in {}", fault.origin));
                        }
                    }
                    _ => {}
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                gallery.look(delta.0 as f32, delta.1 as f32);
            }
            Event::AboutToWait => {
                view.renderer.request_redraw();
            }
            _ => {}
        }
    });
    if let Err(err) = result {
        logging::error(TARGET, format!("event loop exited with error: {}", err));
    }
    Ok(())
}

/// Grabs or releases the pointer and moves the gallery to the matching mode.
fn set_capture(window: &Window, gallery: &mut Gallery, captured: bool) {
    let grabbed = set_cursor_capture(window, captured);
    if captured && !grabbed {
        logging::warn(TARGET, "cursor capture unavailable");
    }
    gallery.set_capture(grabbed);
}

fn trace_tick(report: &TickReport) {
    if report.canvases_placed > 0 {
        let loads = report.loads;
        logging::debug(
            TARGET,
            format!(
                "{} artwork canvases placed; loads: {} queued, {} decoding, {} in flight",
                report.canvases_placed, loads.queue_depth, loads.workers_active, loads.in_flight
            ),
        );
    }
}
