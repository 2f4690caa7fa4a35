//! Decoding, normalization and embedding of the image stamp payload. The payload
//! arrives as a base64 data URL; the declared media type is only a hint, the bytes are
//! verified and if necessary re-decoded through a normalization pass before anything
//! touches the document. JPEG bytes that the viewer can render natively are passed
//! through as a `DCTDecode` stream, everything else is flattened to raw samples.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::GenericImageView as _;
use lopdf::{dictionary, Object, Stream};

use crate::error::{StampError, StampErrorKind};

/// The media type a data URL declares for its payload. Unknown types still go
/// through the full decode chain, the declaration only picks which decoder is
/// tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredFormat {
    Png,
    Jpeg,
}

/// An image payload decoded and normalized into an embeddable form, together with
/// its pixel dimensions. Built exactly once per stamp operation.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    encoding: ImageEncoding,
}

#[derive(Debug, Clone)]
enum ImageEncoding {
    /// The original JPEG byte stream, embedded as-is under `DCTDecode`.
    Jpeg {
        bytes: Vec<u8>,
        grayscale: bool,
    },
    /// Raw 8-bit RGB samples, with the alpha plane split off for an `SMask` when
    /// the source had one.
    Raw {
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
}

impl PreparedImage {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Decode a base64 data URL into an embeddable image. The declared media type is
    /// tried first, then the other supported decoder, then a sniffing normalization
    /// pass. Only when every path fails is the payload rejected.
    pub fn from_data_url(data_url: &str) -> Result<PreparedImage, StampError> {
        let (declared_format, image_bytes) = decode_data_url(data_url)?;

        if declared_format == Some(DeclaredFormat::Jpeg) {
            if let Some(prepared) = try_jpeg_passthrough(&image_bytes) {
                return Ok(prepared);
            }
        }
        if let Some(prepared) = try_raw_decode(&image_bytes, image::ImageFormat::Png) {
            return Ok(prepared);
        }
        if declared_format != Some(DeclaredFormat::Jpeg) {
            if let Some(prepared) = try_jpeg_passthrough(&image_bytes) {
                return Ok(prepared);
            }
        }
        // Last resort: let the decoder sniff the format and flatten whatever it
        // finds to raw samples.
        match image::load_from_memory(&image_bytes) {
            Ok(decoded) => Ok(PreparedImage::from_decoded(decoded)),
            Err(error) => Err(StampError::with_error(
                StampErrorKind::ImageDecode,
                "The stamp image could not be decoded in any supported format",
                &error,
            )),
        }
    }

    fn from_decoded(decoded: image::DynamicImage) -> PreparedImage {
        let (width, height) = decoded.dimensions();
        let rgba = decoded.into_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut fully_opaque = true;
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
            if pixel.0[3] != 255 {
                fully_opaque = false;
            }
        }

        PreparedImage {
            width,
            height,
            encoding: ImageEncoding::Raw {
                rgb,
                alpha: if fully_opaque { None } else { Some(alpha) },
            },
        }
    }

    /// Insert the image as an XObject into the document and return its object ID.
    /// Raw sample streams are left to the document-wide compression pass; JPEG
    /// streams already carry their own filter and are stored verbatim.
    pub(crate) fn insert_into_document(&self, document: &mut lopdf::Document) -> lopdf::ObjectId {
        match &self.encoding {
            ImageEncoding::Jpeg { bytes, grayscale } => {
                let color_space = if *grayscale { "DeviceGray" } else { "DeviceRGB" };
                document.add_object(
                    Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => Object::Integer(i64::from(self.width)),
                            "Height" => Object::Integer(i64::from(self.height)),
                            "ColorSpace" => color_space,
                            "BitsPerComponent" => Object::Integer(8),
                            "Filter" => "DCTDecode",
                        },
                        bytes.clone(),
                    )
                    .with_compression(false),
                )
            }
            ImageEncoding::Raw { rgb, alpha } => {
                let mut image_dictionary = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(i64::from(self.width)),
                    "Height" => Object::Integer(i64::from(self.height)),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => Object::Integer(8),
                };
                if let Some(alpha_samples) = alpha {
                    let mask_id = document.add_object(Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => Object::Integer(i64::from(self.width)),
                            "Height" => Object::Integer(i64::from(self.height)),
                            "ColorSpace" => "DeviceGray",
                            "BitsPerComponent" => Object::Integer(8),
                        },
                        alpha_samples.clone(),
                    ));
                    image_dictionary.set("SMask", Object::Reference(mask_id));
                }
                document.add_object(Stream::new(image_dictionary, rgb.clone()))
            }
        }
    }

    #[cfg(test)]
    fn is_jpeg_passthrough(&self) -> bool {
        matches!(self.encoding, ImageEncoding::Jpeg { .. })
    }

    #[cfg(test)]
    fn has_alpha(&self) -> bool {
        matches!(
            self.encoding,
            ImageEncoding::Raw { alpha: Some(_), .. }
        )
    }
}

/// Split a `data:<media type>;base64,<payload>` URL into its declared format and the
/// decoded payload bytes. A bare base64 string without the URL wrapper is accepted
/// too, with no declared format.
fn decode_data_url(data_url: &str) -> Result<(Option<DeclaredFormat>, Vec<u8>), StampError> {
    let (declared_format, payload) = match data_url.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or(StampError::with_context(
                StampErrorKind::ImageDecode,
                "The stamp image data URL has no payload separator",
            ))?;
            let media_type = header.split(';').next().unwrap_or("");
            let declared = match media_type {
                "image/png" => Some(DeclaredFormat::Png),
                "image/jpeg" | "image/jpg" => Some(DeclaredFormat::Jpeg),
                _ => None,
            };
            (declared, payload)
        }
        None => (None, data_url),
    };

    let image_bytes = STANDARD.decode(payload.trim()).map_err(|error| {
        StampError::with_error(
            StampErrorKind::ImageDecode,
            "The stamp image payload is not valid base64",
            &error,
        )
    })?;

    Ok((declared_format, image_bytes))
}

/// Keep the original JPEG bytes when the sample layout maps directly onto a PDF
/// color space. Anything else (CMYK, 16 bit) falls back to the raw path.
fn try_jpeg_passthrough(image_bytes: &[u8]) -> Option<PreparedImage> {
    let decoded =
        image::load_from_memory_with_format(image_bytes, image::ImageFormat::Jpeg).ok()?;
    let grayscale = match decoded.color() {
        image::ColorType::L8 => true,
        image::ColorType::Rgb8 => false,
        _ => return None,
    };
    let (width, height) = decoded.dimensions();

    Some(PreparedImage {
        width,
        height,
        encoding: ImageEncoding::Jpeg {
            bytes: image_bytes.to_vec(),
            grayscale,
        },
    })
}

fn try_raw_decode(image_bytes: &[u8], format: image::ImageFormat) -> Option<PreparedImage> {
    image::load_from_memory_with_format(image_bytes, format)
        .ok()
        .map(PreparedImage::from_decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_data_url(width: u32, height: u32, alpha: u8) -> String {
        let canvas = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, alpha]));
        let mut png_bytes = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(&png_bytes))
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let canvas = image::RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn a_png_data_url_decodes_to_raw_samples() {
        let prepared = PreparedImage::from_data_url(&png_data_url(200, 100, 255)).unwrap();
        assert_eq!((prepared.width, prepared.height), (200, 100));
        assert!((prepared.aspect_ratio() - 2.0).abs() < f32::EPSILON);
        assert!(!prepared.is_jpeg_passthrough());
        // A fully opaque image does not get a soft mask.
        assert!(!prepared.has_alpha());
    }

    #[test]
    fn translucent_pixels_keep_their_alpha_plane() {
        let prepared = PreparedImage::from_data_url(&png_data_url(4, 4, 128)).unwrap();
        assert!(prepared.has_alpha());
    }

    #[test]
    fn declared_jpeg_bytes_pass_through_untouched() {
        let bytes = jpeg_bytes(60, 30);
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes));
        let prepared = PreparedImage::from_data_url(&data_url).unwrap();
        assert!(prepared.is_jpeg_passthrough());
        assert_eq!((prepared.width, prepared.height), (60, 30));
    }

    #[test]
    fn a_mislabeled_payload_still_decodes() {
        // JPEG bytes declared as PNG must survive through the fallback chain.
        let data_url = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(jpeg_bytes(8, 8))
        );
        let prepared = PreparedImage::from_data_url(&data_url).unwrap();
        assert_eq!((prepared.width, prepared.height), (8, 8));
    }

    #[test]
    fn invalid_base64_is_an_image_decode_error() {
        let error = PreparedImage::from_data_url("data:image/png;base64,@@@not-base64@@@")
            .unwrap_err();
        assert_eq!(error.kind(), StampErrorKind::ImageDecode);
    }

    #[test]
    fn undecodable_bytes_are_an_image_decode_error() {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(b"not an image"));
        let error = PreparedImage::from_data_url(&data_url).unwrap_err();
        assert_eq!(error.kind(), StampErrorKind::ImageDecode);
    }

    #[test]
    fn embedding_a_translucent_image_writes_a_soft_mask() {
        let prepared = PreparedImage::from_data_url(&png_data_url(4, 4, 40)).unwrap();
        let mut document = lopdf::Document::with_version("1.5");
        let image_id = prepared.insert_into_document(&mut document);
        let image_dictionary = document
            .get_object(image_id)
            .and_then(Object::as_stream)
            .unwrap();
        assert!(image_dictionary.dict.get(b"SMask").is_ok());
    }
}
