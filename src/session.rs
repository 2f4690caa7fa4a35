//! The interactive session over one loaded document. The session owns the stamp
//! configuration, mediates every preview interaction (sliders, drags, resizes, page
//! flips) through the pure placement engine, and hands the final configuration to the
//! document mutator. It never rasterizes a page itself; the host supplies a
//! [`PageRasterizer`] and the session only sequences and cancels its renders.

use std::path::PathBuf;

use crate::config::{
    clamp_to_range, FontFamily, StampConfig, StampType, TEXT_SIZE_RANGE, X_OFFSET_RANGE,
    Y_OFFSET_RANGE,
};
use crate::error::{StampError, StampErrorKind};
use crate::fonts::FontResource;
use crate::image_stamp::PreparedImage;
use crate::placement::{
    compute_placement, offsets_from_drag, paints_anything, size_from_resize, PlacementRect,
    StampExtent,
};
use crate::stamp::stamp_pdf;

/// A rendered page bitmap, RGBA, row-major.
pub struct RasterPage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// The rasterization capability the host supplies. Page indices are zero-based and
/// sizes are in points.
pub trait PageRasterizer {
    fn page_count(&self) -> usize;
    fn page_size(&self, page: usize) -> Option<(f32, f32)>;
    fn render_page(&self, page: usize, scale: f32) -> Result<RasterPage, StampError>;
}

/// A generation ticket handed out for each page render. Only the most recently
/// issued ticket is current; earlier ones report as superseded when they finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    generation: u64,
    pub page: usize,
}

/// Whether a finished render is still worth presenting. A superseded render is a
/// normal outcome of flipping pages quickly, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Current,
    Superseded,
}

pub struct StampSession<R: PageRasterizer> {
    rasterizer: R,
    document_bytes: Vec<u8>,
    handwritten_font: Option<PathBuf>,
    config: StampConfig,
    /// Resolved from the configured family, re-resolved whenever the family changes.
    font: FontResource,
    /// Fixed at image upload time by a single decode, never re-derived.
    image_aspect_ratio: Option<f32>,
    current_page: usize,
    scale: f32,
    render_generation: u64,
    processing: bool,
}

impl<R: PageRasterizer> StampSession<R> {
    /// Opens a session over the given document bytes with the default
    /// configuration.
    pub fn open(
        rasterizer: R,
        document_bytes: Vec<u8>,
        handwritten_font: Option<PathBuf>,
    ) -> StampSession<R> {
        let config = StampConfig::default();
        let font = FontResource::resolve(config.font, handwritten_font.as_deref());
        StampSession {
            rasterizer,
            document_bytes,
            handwritten_font,
            config,
            font,
            image_aspect_ratio: None,
            current_page: 0,
            scale: 1.0,
            render_generation: 0,
            processing: false,
        }
    }

    pub fn config(&self) -> &StampConfig {
        &self.config
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Fits the current page into the given container and remembers the resulting
    /// display scale. The page is never blown up beyond 1.5x.
    pub fn fit_scale(&mut self, container_width: f32, container_height: f32) -> f32 {
        if let Some((page_width, page_height)) = self.rasterizer.page_size(self.current_page) {
            self.scale =
                (container_width / page_width).min(container_height / page_height).min(1.5);
        }
        self.scale
    }

    pub fn set_stamp_type(&mut self, stamp_type: StampType) {
        self.config.stamp_type = stamp_type;
    }

    pub fn set_initials(&mut self, initials: String) {
        self.config.initials = initials;
    }

    pub fn set_font(&mut self, family: FontFamily) {
        self.config.font = family;
        self.font = FontResource::resolve(family, self.handwritten_font.as_deref());
    }

    pub fn set_size(&mut self, size: f32) {
        self.config.size = clamp_to_range(size, TEXT_SIZE_RANGE);
    }

    pub fn set_x_offset(&mut self, x_offset: f32) {
        self.config.x_offset = clamp_to_range(x_offset, X_OFFSET_RANGE);
    }

    pub fn set_y_offset(&mut self, y_offset: f32) {
        self.config.y_offset = clamp_to_range(y_offset, Y_OFFSET_RANGE);
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.config.opacity = opacity.min(100);
    }

    /// Stores an image payload after decoding it once to pin its aspect ratio. A
    /// payload that cannot be decoded is rejected and the previous one stays.
    pub fn set_stamp_image(&mut self, data_url: String) -> Result<(), StampError> {
        let prepared = PreparedImage::from_data_url(&data_url)?;
        self.image_aspect_ratio = Some(prepared.aspect_ratio());
        self.config.stamp_image = Some(data_url);
        Ok(())
    }

    /// Restores the default configuration, dropping the uploaded image.
    pub fn reset(&mut self) {
        self.config = StampConfig::default();
        self.font = FontResource::resolve(self.config.font, self.handwritten_font.as_deref());
        self.image_aspect_ratio = None;
    }

    fn extent(&self) -> StampExtent {
        match self.config.stamp_type {
            StampType::Text => {
                StampExtent::Text(self.font.text_metrics(&self.config.initials, self.config.size))
            }
            StampType::Image => StampExtent::Image {
                aspect_ratio: self.image_aspect_ratio.unwrap_or(0.0),
            },
        }
    }

    /// The preview rectangle for the current page, recomputed from the configuration
    /// on every call. `None` when the page geometry is unknown or the stamp has
    /// nothing to paint yet (an image stamp before its upload).
    pub fn placement(&self) -> Option<PlacementRect> {
        let (page_width, page_height) = self.rasterizer.page_size(self.current_page)?;
        let extent = self.extent();
        if self.config.stamp_type == StampType::Image && !paints_anything(&self.config, &extent) {
            return None;
        }
        Some(compute_placement(
            &self.config,
            &extent,
            page_width,
            page_height,
            self.scale,
        ))
    }

    /// Moves the stamp so its rectangle's top-left lands at the given canvas
    /// position, kept inside the canvas, and folds the move back into the offsets.
    pub fn drag_to(&mut self, canvas_x: f32, canvas_y: f32) {
        let Some((page_width, page_height)) = self.rasterizer.page_size(self.current_page) else {
            return;
        };
        let Some(mut rect) = self.placement() else {
            return;
        };
        rect.x = canvas_x.clamp(0.0, (page_width * self.scale - rect.width).max(0.0));
        rect.y = canvas_y.clamp(0.0, (page_height * self.scale - rect.height).max(0.0));

        let (x_offset, y_offset) =
            offsets_from_drag(&rect, &self.extent(), page_width, page_height, self.scale);
        self.set_x_offset(x_offset);
        self.set_y_offset(y_offset);
    }

    /// Resizes the stamp from the pointer's distance to the rectangle center.
    pub fn resize_to(&mut self, pointer_x: f32, pointer_y: f32) {
        if let Some(rect) = self.placement() {
            self.config.size = size_from_resize(&rect, pointer_x, pointer_y, self.scale);
        }
    }

    /// Switches the visible page and issues a fresh render ticket, superseding any
    /// render still in flight.
    pub fn go_to_page(&mut self, page: usize) -> RenderTicket {
        let last_page = self.rasterizer.page_count().saturating_sub(1);
        self.current_page = page.min(last_page);
        self.render_generation += 1;
        RenderTicket {
            generation: self.render_generation,
            page: self.current_page,
        }
    }

    /// Renders the page a ticket refers to. The host calls `finish_render`
    /// afterwards to decide whether to present the bitmap.
    pub fn render(&self, ticket: RenderTicket) -> Result<RasterPage, StampError> {
        self.rasterizer.render_page(ticket.page, self.scale)
    }

    /// Reports whether a finished render is still the one the session wants on
    /// screen. Supersession is silent; nothing is logged and nothing fails.
    pub fn finish_render(&self, ticket: RenderTicket) -> RenderOutcome {
        if ticket.generation == self.render_generation {
            RenderOutcome::Current
        } else {
            RenderOutcome::Superseded
        }
    }

    /// Marks a stamp-and-save as running. A second invocation while one is running
    /// is refused; there is no queue.
    pub fn begin_processing(&mut self) -> Result<(), StampError> {
        if self.processing {
            return Err(StampError::with_context(
                StampErrorKind::Document,
                "A stamp operation is already in progress",
            ));
        }
        self.processing = true;
        Ok(())
    }

    pub fn finish_processing(&mut self) {
        self.processing = false;
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Stamps the loaded document with the current configuration and returns the new
    /// document bytes. Guarded by the processing flag.
    pub fn stamp(&mut self) -> Result<Vec<u8>, StampError> {
        self.begin_processing()?;
        let result = stamp_pdf(
            &self.document_bytes,
            &self.config,
            self.handwritten_font.as_deref(),
        );
        self.finish_processing();
        result
    }
}
