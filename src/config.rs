use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{StampError, StampErrorKind};

/// The range of the text size slider, in points.
pub const TEXT_SIZE_RANGE: (f32, f32) = (6.0, 200.0);
/// The range the interactive resize handle clamps the size to, in points.
pub const RESIZE_SIZE_RANGE: (f32, f32) = (10.0, 200.0);
/// The range of the horizontal offset slider, in points from the right page edge.
pub const X_OFFSET_RANGE: (f32, f32) = (5.0, 600.0);
/// The range of the vertical offset slider, in points from the bottom page edge.
pub const Y_OFFSET_RANGE: (f32, f32) = (5.0, 900.0);

/// Whether the stamp paints a run of text or a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StampType {
    Text,
    Image,
}

/// The font families the user can pick for a text stamp. Three are built-in standard
/// fonts which every PDF viewer ships; the handwritten one is an external TTF that is
/// embedded into the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    Handwritten,
    Helvetica,
    Courier,
    Times,
}

/// The stamp configuration, the sole entity that survives for the whole session over a
/// loaded document. It is created with defaults when a document is opened, mutated live
/// by the interaction (sliders, drags, resizes), consumed read-only by the document
/// mutator at download time and discarded when the document is closed.
///
/// The serialized form keeps the camel-cased JSON shape of the original product
/// (`stampType`, `xOffset`, ...), so existing configuration payloads parse unchanged.
///
/// All offsets are measured from the bottom-right corner of the page, in points. This
/// convention is documented in-product and must be preserved: `x_offset` is the
/// distance from the right page edge to the stamp's right edge, `y_offset` the distance
/// from the bottom page edge to the text baseline (text) or box bottom (image).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StampConfig {
    pub stamp_type: StampType,
    /// The text painted by a text stamp. May be empty, it is not validated.
    pub initials: String,
    /// The image payload of an image stamp, as a base64 data URL.
    pub stamp_image: Option<String>,
    pub font: FontFamily,
    /// Point size of the text, or nominal height in points of the image.
    pub size: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    /// Integer percent in [0, 100], applied uniformly to every page.
    pub opacity: u8,
}

impl Default for StampConfig {
    fn default() -> Self {
        StampConfig {
            stamp_type: StampType::Text,
            initials: "ABC".into(),
            stamp_image: None,
            font: FontFamily::Handwritten,
            size: 24.0,
            x_offset: 50.0,
            y_offset: 50.0,
            opacity: 100,
        }
    }
}

impl StampConfig {
    /// Read a configuration from a JSON file in the documented wire shape.
    pub fn from_path(configuration_path: &Path) -> Result<StampConfig, StampError> {
        let configuration_content =
            std::fs::read_to_string(configuration_path).map_err(|error| {
                StampError::with_error(
                    StampErrorKind::Document,
                    format!(
                        "Unable to read the stamp configuration {:?}",
                        configuration_path
                    ),
                    &error,
                )
            })?;
        let configuration: StampConfig =
            serde_json::from_str(&configuration_content).map_err(|error| {
                StampError::with_error(
                    StampErrorKind::Document,
                    format!(
                        "Unable to parse the stamp configuration {:?}",
                        configuration_path
                    ),
                    &error,
                )
            })?;

        Ok(configuration)
    }

    /// The paint alpha derived from the opacity percent, in [0, 1].
    pub fn alpha(&self) -> f32 {
        f32::from(self.opacity.min(100)) / 100.0
    }
}

/// Clamps a value into an inclusive `(low, high)` range pair.
pub(crate) fn clamp_to_range(value: f32, range: (f32, f32)) -> f32 {
    value.clamp(range.0, range.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_defaults_match_the_product() {
        let configuration = StampConfig::default();
        assert_eq!(configuration.stamp_type, StampType::Text);
        assert_eq!(configuration.initials, "ABC");
        assert_eq!(configuration.font, FontFamily::Handwritten);
        assert_eq!(configuration.size, 24.0);
        assert_eq!(configuration.x_offset, 50.0);
        assert_eq!(configuration.y_offset, 50.0);
        assert_eq!(configuration.opacity, 100);
        assert!(configuration.stamp_image.is_none());
    }

    #[test]
    fn the_wire_shape_is_camel_cased() {
        let json = r#"{
            "stampType": "text",
            "initials": "JS",
            "stampImage": null,
            "font": "courier",
            "size": 24,
            "xOffset": 50,
            "yOffset": 50,
            "opacity": 100
        }"#;
        let configuration: StampConfig = serde_json::from_str(json).unwrap();
        assert_eq!(configuration.initials, "JS");
        assert_eq!(configuration.font, FontFamily::Courier);

        let serialized = serde_json::to_string(&configuration).unwrap();
        assert!(serialized.contains("\"stampType\":\"text\""));
        assert!(serialized.contains("\"xOffset\":50.0"));
    }

    #[test]
    fn missing_fields_fall_back_to_the_defaults() {
        let configuration: StampConfig = serde_json::from_str(r#"{"initials": "Z"}"#).unwrap();
        assert_eq!(configuration.initials, "Z");
        assert_eq!(configuration.size, 24.0);
        assert_eq!(configuration.opacity, 100);
    }

    #[test]
    fn alpha_is_the_opacity_percent() {
        let mut configuration = StampConfig::default();
        configuration.opacity = 0;
        assert_eq!(configuration.alpha(), 0.0);
        configuration.opacity = 100;
        assert_eq!(configuration.alpha(), 1.0);
        configuration.opacity = 45;
        assert!((configuration.alpha() - 0.45).abs() < f32::EPSILON);
    }
}
