use egui::{Align2, Context, RichText};
use egui_wgpu::ScreenDescriptor;
use gallery::frame::Mode;
use gallery::OverlayPanel;
use platform_winit::{Window, WindowEvent};

const PANEL_WIDTH: f32 = 360.0;
const PANEL_MARGIN: f32 = 16.0;

/// One tessellated egui frame, ready to be recorded into the scene's encoder.
pub struct UiFrame {
    primitives: Vec<egui::ClippedPrimitive>,
    textures: egui::TexturesDelta,
    screen: ScreenDescriptor,
}

/// egui layer drawn over the scene: the artwork panel and the capture prompt.
pub struct UiLayer {
    window: &'static Window,
    ctx: Context,
    input: egui_winit::State,
    painter: egui_wgpu::Renderer,
}

impl UiLayer {
    pub fn new(window: &'static Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let ctx = Context::default();
        let input = egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        Self {
            window,
            ctx,
            input,
            painter: egui_wgpu::Renderer::new(device, format, None, 1),
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        // Nothing in the layer is interactive; egui only needs size and scale updates.
        let _ = self.input.on_window_event(self.window, event);
    }

    pub fn prepare(&mut self, panel: Option<&OverlayPanel>, mode: Mode) -> UiFrame {
        let raw_input = self.input.take_egui_input(self.window);
        let output = self.ctx.run(raw_input, |ctx| {
            if let Some(panel) = panel {
                info_panel(ctx, panel);
            }
            if mode == Mode::LockedOut {
                capture_prompt(ctx);
            }
        });
        self.input
            .handle_platform_output(self.window, output.platform_output);

        let size = self.window.inner_size();
        UiFrame {
            primitives: self.ctx.tessellate(output.shapes, output.pixels_per_point),
            textures: output.textures_delta,
            screen: ScreenDescriptor {
                size_in_pixels: [size.width, size.height],
                pixels_per_point: output.pixels_per_point,
            },
        }
    }

    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        frame: &UiFrame,
    ) {
        for (id, delta) in &frame.textures.set {
            self.painter.update_texture(device, queue, *id, delta);
        }
        self.painter
            .update_buffers(device, queue, encoder, &frame.primitives, &frame.screen);
        if !frame.primitives.is_empty() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gallery.egui.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    // Composite over the scene that was just drawn.
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.painter
                .render(&mut pass, &frame.primitives, &frame.screen);
        }
        frame
            .textures
            .free
            .iter()
            .for_each(|id| self.painter.free_texture(id));
    }
}

fn info_panel(ctx: &Context, panel: &OverlayPanel) {
    egui::Area::new(egui::Id::new("artwork_info"))
        .anchor(Align2::LEFT_BOTTOM, [PANEL_MARGIN, -PANEL_MARGIN])
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_max_width(PANEL_WIDTH);
                ui.heading(&panel.name);
                ui.label(RichText::new(&panel.lifespan).italics());
                ui.separator();
                ui.label(&panel.description);
                ui.add_space(6.0);
                ui.label(RichText::new(&panel.achievement).strong());
            });
        });
}

fn capture_prompt(ctx: &Context) {
    egui::Area::new(egui::Id::new("capture_prompt"))
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.heading("Click to explore");
                    ui.label("WASD / arrows to walk, Space to jump, Esc to release");
                });
            });
        });
}
