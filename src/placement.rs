//! The pure geometry behind the interactive preview. Everything here maps between the
//! two coordinate systems of the application: PDF user space (origin at the bottom-left
//! of the page, y grows upwards, units are points) and the preview canvas (origin at
//! the top-left, y grows downwards, units are points multiplied by the display scale).
//!
//! Offsets are measured from the bottom-right page corner. A text stamp is anchored on
//! its baseline, an image stamp on the bottom edge of its box; the two anchors differ
//! on purpose and every inversion below has to honour the same asymmetry.

use crate::config::{clamp_to_range, StampConfig, StampType, RESIZE_SIZE_RANGE};
use crate::metrics::TextMetrics;

/// An axis-aligned rectangle on the preview canvas, top-left origin, y growing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlacementRect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The measured extent of the stamp at the configured size, before any display
/// scaling. The text variant carries the full glyph run measurement; the image
/// variant only needs the aspect ratio because its height is the configured size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StampExtent {
    Text(TextMetrics),
    Image { aspect_ratio: f32 },
}

/// The anchor point in PDF user space: the right end of the baseline for text, the
/// bottom-right box corner for an image. Only the page width matters because the
/// vertical offset is already measured from the bottom, which is where PDF y starts.
pub fn pdf_anchor(config: &StampConfig, page_width: f32) -> (f32, f32) {
    (page_width - config.x_offset, config.y_offset)
}

/// Computes the canvas rectangle of the stamp for the current configuration. The
/// right edge stays pinned at `page_width - x_offset` whatever the measured width
/// is, which is what makes the stamp right-aligned. An empty glyph run yields a
/// zero-width rectangle. Placements partially or fully off the page are returned
/// as they are, nothing is clamped here.
pub fn compute_placement(
    config: &StampConfig,
    extent: &StampExtent,
    page_width: f32,
    page_height: f32,
    scale: f32,
) -> PlacementRect {
    let (anchor_x, anchor_y) = pdf_anchor(config, page_width);
    let canvas_anchor_x = anchor_x * scale;
    let canvas_anchor_y = (page_height - anchor_y) * scale;

    match extent {
        StampExtent::Text(metrics) => {
            let width = metrics.advance_width * scale;
            let ascent = metrics.ascent * scale;
            let descent = metrics.descent * scale;
            PlacementRect {
                x: canvas_anchor_x - width,
                y: canvas_anchor_y - ascent,
                width,
                height: ascent + descent,
            }
        }
        StampExtent::Image { aspect_ratio } => {
            let height = config.size * scale;
            let width = height * aspect_ratio;
            PlacementRect {
                x: canvas_anchor_x - width,
                y: canvas_anchor_y - height,
                width,
                height,
            }
        }
    }
}

/// Inverts a dragged canvas rectangle back into bottom-right corner offsets, in
/// whole points. The horizontal offset comes from the right edge in both cases; the
/// vertical offset comes from the baseline for text (the rectangle top plus the
/// ascent) and from the box bottom for an image. Getting the two mixed up shifts
/// every text stamp by its descent, so the asymmetry is tested explicitly.
pub fn offsets_from_drag(
    rect: &PlacementRect,
    extent: &StampExtent,
    page_width: f32,
    page_height: f32,
    scale: f32,
) -> (f32, f32) {
    let x_offset = ((page_width * scale - rect.right()) / scale).round();
    let anchor_line = match extent {
        StampExtent::Text(metrics) => rect.y + metrics.ascent * scale,
        StampExtent::Image { .. } => rect.bottom(),
    };
    let y_offset = ((page_height * scale - anchor_line) / scale).round();

    (x_offset, y_offset)
}

/// Derives a new stamp size from the pointer position during a resize drag: the
/// distance from the pointer to the rectangle center, converted back to points and
/// clamped to the resize range. The radial distance makes the gesture direction
/// agnostic, dragging any handle outward grows the stamp.
pub fn size_from_resize(rect: &PlacementRect, pointer_x: f32, pointer_y: f32, scale: f32) -> f32 {
    let (center_x, center_y) = rect.center();
    let distance = ((pointer_x - center_x).powi(2) + (pointer_y - center_y).powi(2)).sqrt();
    clamp_to_range((distance / scale).round(), RESIZE_SIZE_RANGE)
}

/// True when the stamp paints anything at all. An image stamp without a decoded
/// payload and an empty glyph run both place nothing.
pub fn paints_anything(config: &StampConfig, extent: &StampExtent) -> bool {
    match (config.stamp_type, extent) {
        (StampType::Text, StampExtent::Text(metrics)) => metrics.advance_width > 0.0,
        (StampType::Image, StampExtent::Image { aspect_ratio }) => *aspect_ratio > 0.0,
        _ => false,
    }
}
