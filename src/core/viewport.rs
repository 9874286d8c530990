//! Interactive viewport: change tracking and drawing.
//!
//! `view_update` runs when the scene changes and decides whether the tree
//! must run again; `view_draw` runs on every redraw and must stay cheap. It
//! only rebuilds its `DrawData` texture when the region size changes or a
//! newer image was stored.

use log::{debug, trace, warn};

use super::executor::{execute, RunOutcome};
use super::render::RenderEngine;
use crate::entities::{Frame, NodeTree, SceneSnapshot};

/// Viewport region the host is drawing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    pub region_width: usize,
    pub region_height: usize,
}

impl ViewContext {
    pub fn new(region_width: usize, region_height: usize) -> Self {
        Self {
            region_width,
            region_height,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.region_width, self.region_height)
    }
}

/// GPU blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBlend {
    None,
    AlphaPremult,
}

/// Display side of the viewport, implemented by the host's GPU layer.
pub trait DisplayBackend {
    fn blend_set(&mut self, mode: GpuBlend);

    /// Scene-linear to display-space conversion for the following draws
    fn bind_display_space_shader(&mut self, scene: &SceneSnapshot);

    fn unbind_display_space_shader(&mut self);

    fn draw_texture(&mut self, draw: &DrawData);
}

/// Texture ready for drawing: premultiplied RGBA at region size.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawData {
    pub dimensions: (usize, usize),
    /// Image revision this texture was built from
    pub revision: u64,
    pub texture: Frame,
}

impl DrawData {
    pub fn new(dimensions: (usize, usize), image: Option<&Frame>, revision: u64) -> Self {
        let (w, h) = dimensions;
        let texture = match image {
            Some(image) => image.resize(w, h).premultiplied(),
            None => Frame::new(w, h, crate::entities::Channels::Rgba),
        };
        Self {
            dimensions,
            revision,
            texture,
        }
    }
}

/// Viewport state kept by the engine between callbacks.
#[derive(Debug, Default)]
pub struct Viewport {
    /// Re-run the tree on scene changes
    pub live_render: bool,
    initialized: bool,
    stale: bool,
    image: Option<Frame>,
    revision: u64,
    draw_data: Option<DrawData>,
    rebuilds: u64,
    last_error: Option<String>,
}

impl Viewport {
    pub fn image(&self) -> Option<&Frame> {
        self.image.as_ref()
    }

    /// Store a new image; the next draw rebuilds its texture.
    pub fn set_image(&mut self, image: Frame) {
        self.image = Some(image);
        self.revision += 1;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn draw_data(&self) -> Option<&DrawData> {
        self.draw_data.as_ref()
    }

    /// How many times `DrawData` was (re)created
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Message of the last failed viewport render
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl RenderEngine {
    /// Scene changed (or first call): mark stale and, when live rendering is
    /// enabled, run the tree at the region size.
    pub fn view_update(&mut self, ctx: &ViewContext, tree: &NodeTree, scene: &SceneSnapshot) {
        let first_time = !self.viewport.initialized;
        self.viewport.initialized = true;

        if first_time {
            debug!("Viewport: first update");
            self.viewport.stale = true;
        } else if !scene.updates.is_empty() {
            for update in &scene.updates {
                trace!("Viewport: datablock updated: {} ({:?})", update.id, update.kind);
            }
            self.viewport.stale = true;
        }

        if !self.viewport.stale || !self.viewport.live_render {
            return;
        }
        let (w, h) = ctx.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        let view_scene = scene.with_resolution(w, h);
        let cancel = self.cancel_token();
        let outcome = execute(tree, &view_scene, self.backends(), &cancel, &mut ());
        cancel.reset();
        match outcome {
            Ok(RunOutcome::Finished(frame)) => {
                self.viewport.set_image(frame);
                self.viewport.last_error = None;
                self.viewport.stale = false;
            }
            Ok(RunOutcome::Cancelled) => debug!("Viewport: render cancelled"),
            Err(e) => {
                warn!("Viewport render failed, keeping previous image: {}", e);
                self.viewport.last_error = Some(e.to_string());
                self.viewport.stale = false;
            }
        }
    }

    /// Draw the last image into the region.
    pub fn view_draw(&mut self, ctx: &ViewContext, scene: &SceneSnapshot, display: &mut dyn DisplayBackend) {
        let dimensions = ctx.dimensions();
        let vp = &mut self.viewport;

        display.blend_set(GpuBlend::AlphaPremult);
        display.bind_display_space_shader(scene);

        let outdated = vp
            .draw_data
            .as_ref()
            .is_none_or(|d| d.dimensions != dimensions || d.revision != vp.revision);
        if outdated {
            trace!("Viewport: new draw data {}x{} rev {}", dimensions.0, dimensions.1, vp.revision);
            vp.draw_data = Some(DrawData::new(dimensions, vp.image.as_ref(), vp.revision));
            vp.rebuilds += 1;
        }
        if let Some(draw) = &vp.draw_data {
            display.draw_texture(draw);
        }

        display.unbind_display_space_shader();
        display.blend_set(GpuBlend::None);
    }
}
