use std::collections::HashMap;

use crate::error::{StampError, StampErrorKind};
use crate::fonts::StandardFont;

/// The measured geometry of a glyph run, in points at the size it was measured at.
/// The ascent and descent are both positive distances from the baseline, so the
/// bounding height of the run is `ascent + descent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub advance_width: f32,
    pub ascent: f32,
    pub descent: f32,
}

/// The natural pixel dimensions of a decoded stamp image. The aspect ratio is fixed
/// once the image has been decoded and never re-derived afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetrics {
    pub natural_width: u32,
    pub natural_height: u32,
}

impl ImageMetrics {
    pub fn aspect_ratio(&self) -> f32 {
        if self.natural_height == 0 {
            return 0.0;
        }
        self.natural_width as f32 / self.natural_height as f32
    }
}

/// Character width information for the built-in standard fonts. All widths are in
/// 1/1000 of a unit at font size 1.0, following the Adobe font metrics files, and the
/// vertical metrics come from the same source.
struct StandardFontMetrics {
    widths: HashMap<char, u16>,
    default_width: u16,
    /// AFM ascender, in 1/1000 units.
    ascent: i16,
    /// AFM descender, in 1/1000 units (negative, below the baseline).
    descent: i16,
}

impl StandardFontMetrics {
    fn new(default_width: u16, ascent: i16, descent: i16) -> Self {
        Self {
            widths: HashMap::new(),
            default_width,
            ascent,
            descent,
        }
    }

    fn with_widths(mut self, widths: &[(char, u16)]) -> Self {
        for &(character, width) in widths {
            self.widths.insert(character, width);
        }
        self
    }

    fn char_width(&self, character: char) -> u16 {
        self.widths
            .get(&character)
            .copied()
            .unwrap_or(self.default_width)
    }
}

lazy_static::lazy_static! {
    static ref HELVETICA: StandardFontMetrics = StandardFontMetrics::new(556, 718, -207)
        .with_widths(&[
            (' ', 278), ('!', 278), ('"', 355), ('#', 556), ('$', 556), ('%', 889),
            ('&', 667), ('\'', 191), ('(', 333), (')', 333), ('*', 389), ('+', 584),
            (',', 278), ('-', 333), ('.', 278), ('/', 278), ('0', 556), ('1', 556),
            ('2', 556), ('3', 556), ('4', 556), ('5', 556), ('6', 556), ('7', 556),
            ('8', 556), ('9', 556), (':', 278), (';', 278), ('<', 584), ('=', 584),
            ('>', 584), ('?', 556), ('@', 1015), ('A', 667), ('B', 667), ('C', 722),
            ('D', 722), ('E', 667), ('F', 611), ('G', 778), ('H', 722), ('I', 278),
            ('J', 500), ('K', 667), ('L', 556), ('M', 833), ('N', 722), ('O', 778),
            ('P', 667), ('Q', 778), ('R', 722), ('S', 667), ('T', 611), ('U', 722),
            ('V', 667), ('W', 944), ('X', 667), ('Y', 667), ('Z', 611), ('[', 278),
            ('\\', 278), (']', 278), ('^', 469), ('_', 556), ('`', 333), ('a', 556),
            ('b', 556), ('c', 500), ('d', 556), ('e', 556), ('f', 278), ('g', 556),
            ('h', 556), ('i', 222), ('j', 222), ('k', 500), ('l', 222), ('m', 833),
            ('n', 556), ('o', 556), ('p', 556), ('q', 556), ('r', 333), ('s', 500),
            ('t', 278), ('u', 556), ('v', 500), ('w', 722), ('x', 500), ('y', 500),
            ('z', 500), ('{', 334), ('|', 260), ('}', 334), ('~', 584),
        ]);

    static ref TIMES_ROMAN: StandardFontMetrics = StandardFontMetrics::new(500, 683, -217)
        .with_widths(&[
            (' ', 250), ('!', 333), ('"', 408), ('#', 500), ('$', 500), ('%', 833),
            ('&', 778), ('\'', 180), ('(', 333), (')', 333), ('*', 500), ('+', 564),
            (',', 250), ('-', 333), ('.', 250), ('/', 278), ('0', 500), ('1', 500),
            ('2', 500), ('3', 500), ('4', 500), ('5', 500), ('6', 500), ('7', 500),
            ('8', 500), ('9', 500), (':', 278), (';', 278), ('<', 564), ('=', 564),
            ('>', 564), ('?', 444), ('@', 921), ('A', 722), ('B', 667), ('C', 667),
            ('D', 722), ('E', 611), ('F', 556), ('G', 722), ('H', 722), ('I', 333),
            ('J', 389), ('K', 722), ('L', 611), ('M', 889), ('N', 722), ('O', 722),
            ('P', 556), ('Q', 722), ('R', 667), ('S', 556), ('T', 611), ('U', 722),
            ('V', 722), ('W', 944), ('X', 722), ('Y', 722), ('Z', 611), ('[', 333),
            ('\\', 278), (']', 333), ('^', 469), ('_', 500), ('`', 333), ('a', 444),
            ('b', 500), ('c', 444), ('d', 500), ('e', 444), ('f', 333), ('g', 500),
            ('h', 500), ('i', 278), ('j', 278), ('k', 500), ('l', 278), ('m', 778),
            ('n', 500), ('o', 500), ('p', 500), ('q', 500), ('r', 333), ('s', 389),
            ('t', 278), ('u', 500), ('v', 500), ('w', 722), ('x', 500), ('y', 500),
            ('z', 444), ('{', 480), ('|', 200), ('}', 480), ('~', 541),
        ]);

    // Courier is monospaced, every character advances by 600 units.
    static ref COURIER: StandardFontMetrics = StandardFontMetrics::new(600, 629, -157);
}

fn metrics_for(font: StandardFont) -> &'static StandardFontMetrics {
    match font {
        StandardFont::Helvetica | StandardFont::HelveticaOblique => &HELVETICA,
        StandardFont::TimesRoman => &TIMES_ROMAN,
        StandardFont::Courier => &COURIER,
    }
}

/// Measure a glyph run in one of the built-in standard fonts at the given point size.
/// A zero-length string measures to a zero advance width without failing. Characters
/// outside ASCII are painted as `'?'` in these fonts, so they are measured as `'?'`
/// too; measuring them any other way would unpin the right edge of the painted run.
pub fn standard_text_metrics(text: &str, font: StandardFont, size: f32) -> TextMetrics {
    let metrics = metrics_for(font);
    let width_units: u32 = text
        .chars()
        .map(|character| {
            let painted = if character.is_ascii() { character } else { '?' };
            u32::from(metrics.char_width(painted))
        })
        .sum();

    TextMetrics {
        advance_width: width_units as f32 / 1000.0 * size,
        ascent: f32::from(metrics.ascent) / 1000.0 * size,
        descent: f32::from(-metrics.descent) / 1000.0 * size,
    }
}

/// The documented last-resort approximation used when no exact vertical metrics are
/// available: 0.8 × size of ascent and 0.2 × size of descent. Exact metrics from the
/// font tables are always preferred, this is a known precision gap.
pub fn approximate_vertical_metrics(size: f32) -> (f32, f32) {
    (0.8 * size, 0.2 * size)
}

/// Decode an image payload once and report its natural dimensions. The bytes are
/// sniffed rather than trusted to be in any declared format.
pub fn measure_image(image_bytes: &[u8]) -> Result<ImageMetrics, StampError> {
    let decoded = image::load_from_memory(image_bytes).map_err(|error| {
        StampError::with_error(
            StampErrorKind::ImageDecode,
            "Failed to decode the stamp image for measurement",
            &error,
        )
    })?;
    use image::GenericImageView as _;
    let (natural_width, natural_height) = decoded.dimensions();

    Ok(ImageMetrics {
        natural_width,
        natural_height,
    })
}
