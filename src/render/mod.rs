//! Render capture: turns a completed execution's figure into a PNG.
//!
//! There is one process-wide [`RenderBackend`]. It owns the RGB framebuffer
//! behind an async mutex, and every execution holds that lock from
//! preparation until teardown. Two snippets therefore never share a surface,
//! and whatever one of them drew is wiped before the next one starts.

mod canvas;
pub mod figure;
mod text;

use std::sync::{Arc, OnceLock};

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::VizConfig;
use crate::error::RenderError;

pub use figure::{Artist, Axes, Figure, FormatSpec, LineStyle, Marker, Rgb};

/// Largest raster a figure may produce; larger figures are scaled down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self::from_config(&VizConfig::default())
    }
}

impl RenderLimits {
    pub fn from_config(config: &VizConfig) -> Self {
        Self {
            max_width: config.max_raster_width.max(1),
            max_height: config.max_raster_height.max(1),
        }
    }
}

/// The shared drawing surface.
///
/// Pixels only live between [`render`](Self::render) starting and the
/// framebuffer being [`clear`](Self::clear)ed; the allocation is kept for
/// the next execution.
#[derive(Debug, Default)]
pub struct Framebuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    renders: u64,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rasterize `figure` and encode it as PNG, leaving the surface blank.
    pub fn render(&mut self, figure: &Figure, limits: &RenderLimits) -> Result<Vec<u8>, RenderError> {
        let (width, height) = figure.pixel_size(limits.max_width, limits.max_height);
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 3, 0);
        self.renders += 1;

        let encoded = canvas::rasterize(figure, &mut self.pixels, width, height)
            .and_then(|()| encode_png(&self.pixels, width, height));
        self.clear();
        encoded
    }

    /// Wipe the surface. Idempotent.
    pub fn clear(&mut self) {
        self.pixels.clear();
        self.width = 0;
        self.height = 0;
    }

    pub fn is_clear(&self) -> bool {
        self.pixels.is_empty() && self.width == 0 && self.height == 0
    }

    /// Number of figures rendered on this surface so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

fn encode_png(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(pixels, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(png)
}

/// Owner of the process-wide framebuffer and its lock.
#[derive(Debug, Default)]
pub struct RenderBackend {
    surface: Arc<Mutex<Framebuffer>>,
}

static SHARED: OnceLock<Arc<RenderBackend>> = OnceLock::new();

impl RenderBackend {
    /// A private backend. Production code uses [`shared`](Self::shared).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide backend.
    pub fn shared() -> Arc<RenderBackend> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(RenderBackend::new())))
    }

    /// Wait for exclusive use of the framebuffer.
    pub async fn acquire(&self) -> OwnedMutexGuard<Framebuffer> {
        Arc::clone(&self.surface).lock_owned().await
    }

    /// Whether an execution currently holds the framebuffer.
    pub fn is_busy(&self) -> bool {
        self.surface.try_lock().is_err()
    }
}

/// Render a completed execution's figure.
///
/// Returns `None` when nothing was drawn; titles or labels alone do not count.
pub fn capture(
    figure: &Figure,
    surface: &mut Framebuffer,
    limits: &RenderLimits,
) -> Result<Option<Vec<u8>>, RenderError> {
    if figure.is_empty() {
        return Ok(None);
    }
    surface.render(figure, limits).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn bar_figure() -> Figure {
        let mut figure = Figure::new();
        figure.axes.title = Some("Monthly".to_string());
        figure.axes.x_categories = vec!["Jan".to_string(), "Feb".to_string()];
        figure.push(Artist::Bars {
            positions: vec![0.0, 1.0],
            lengths: vec![50.0, 60.0],
            bases: vec![0.0, 0.0],
            thickness: 0.8,
            colors: vec![figure::COLOR_CYCLE[0]],
            horizontal: false,
            alpha: 1.0,
            label: None,
        });
        figure
    }

    #[test]
    fn test_capture_empty_figure_is_none() {
        let mut surface = Framebuffer::new();
        let mut figure = Figure::new();
        figure.axes.title = Some("only a title".to_string());
        assert_eq!(capture(&figure, &mut surface, &RenderLimits::default()).unwrap(), None);
        assert_eq!(surface.renders(), 0);
    }

    #[test]
    fn test_capture_produces_png_and_clears_surface() {
        let mut surface = Framebuffer::new();
        let png = capture(&bar_figure(), &mut surface, &RenderLimits::default())
            .unwrap()
            .unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert!(surface.is_clear());
        assert_eq!(surface.renders(), 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut surface = Framebuffer::new();
        let limits = RenderLimits::default();
        let first = surface.render(&bar_figure(), &limits).unwrap();
        let second = surface.render(&bar_figure(), &limits).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_raster_respects_limits() {
        let mut surface = Framebuffer::new();
        let limits = RenderLimits { max_width: 320, max_height: 240 };
        let png = surface.render(&bar_figure(), &limits).unwrap();
        let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
        let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
        assert!(width <= 320 && height <= 240);
        assert_eq!(width, 320);
    }

    #[tokio::test]
    async fn test_backend_lock_is_exclusive() {
        let backend = RenderBackend::new();
        let guard = backend.acquire().await;
        assert!(backend.is_busy());
        drop(guard);
        assert!(!backend.is_busy());
    }

    #[test]
    fn test_shared_backend_is_a_singleton() {
        assert!(Arc::ptr_eq(&RenderBackend::shared(), &RenderBackend::shared()));
    }
}
