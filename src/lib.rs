//! Stampr applies a personal stamp, a short run of text such as initials or an
//! uploaded image, to every page of an existing PDF document. The stamp is positioned
//! from the bottom-right corner of each page and painted right-aligned at that anchor,
//! so documents with mixed page sizes end up with the stamp in the same visual spot on
//! every page.
//!
//! The crate splits the work in two halves. The interactive half (`session`,
//! `placement`, `metrics`) keeps a live configuration in sync with a preview: sliders,
//! drags and resizes all flow through the same pure geometry, so what the preview
//! shows is exactly what gets written. The mutation half (`stamp`, `fonts`,
//! `image_stamp`) takes the finished configuration and the document bytes and
//! produces the stamped bytes in one all-or-nothing pass over `lopdf`.

/// The stamp configuration: what is painted, with which font or image, at which
/// size, offsets and opacity. Serializes to the camel-cased JSON wire shape.
pub mod config;

/// The `StampError` type used throughout this library, a category plus a context
/// string and the optionally propagated source error, so the end user always gets an
/// explanation of what failed and why.
pub mod error;

/// Font resolution and embedding: the built-in standard fonts and the handwritten
/// TTF face, which is embedded as a Type0 font with its glyph widths and a ToUnicode
/// map so the stamped text stays selectable and extractable.
pub mod fonts;

/// Decoding of the image stamp payload from its data URL form, normalization into an
/// embeddable encoding and insertion as an XObject.
pub mod image_stamp;

/// Measurement of glyph runs and images. Both the preview and the mutator measure
/// through this module, which is what keeps them in agreement.
pub mod metrics;

/// The pure geometry mapping between PDF user space and the preview canvas: forward
/// placement, drag inversion and the resize rule.
pub mod placement;

/// The interactive session over one loaded document: the live configuration, the
/// display scale, cancelable page renders and the single-operation guard.
pub mod session;

/// The document mutator: `stamp_pdf` paints the configured stamp onto every page of
/// the given document bytes and returns the re-serialized document.
pub mod stamp;
