use lopdf::{dictionary, Object, StringFormat};
use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use unicode_normalization::UnicodeNormalization as _;

use crate::config::FontFamily;
use crate::error::{StampError, StampErrorKind};
use crate::metrics::{standard_text_metrics, TextMetrics};

/// The built-in fonts a stamp can use without embedding a font program. Every PDF
/// viewer ships these, so the font dictionary only has to name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    /// The fallback used when the handwritten font cannot be loaded.
    HelveticaOblique,
    Courier,
    TimesRoman,
}

impl StandardFont {
    /// The PostScript name used as the `BaseFont` entry of the font dictionary.
    pub fn base_font_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::Courier => "Courier",
            StandardFont::TimesRoman => "Times-Roman",
        }
    }
}

/// A font loaded from a TTF file, together with its measure of units per em and the
/// byte data it was loaded from, ready to be embedded into a PDF document.
#[derive(Debug, Clone)]
pub struct TtfFont {
    /// The byte data the font was loaded from.
    bytes: Vec<u8>,
    /// The underlying font face which is represented through the `ttf_parser` crate.
    face: Arc<OwnedFace>,
    /// The number of units per em of the font face.
    units_per_em: u16,
    /// The name used for the `BaseFont` and `FontName` entries.
    base_font: String,
}

impl TtfFont {
    /// Constructs a font from the raw data of a TTF font file.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, StampError> {
        let face = OwnedFace::from_vec(bytes.clone(), 0).map_err(|error| {
            StampError::with_error(StampErrorKind::FontLoad, "Failed to parse the font", &error)
        })?;
        let units_per_em = face.as_face_ref().units_per_em();
        if units_per_em == 0 {
            return Err(StampError::with_context(
                StampErrorKind::FontLoad,
                "The font declares zero units per em",
            ));
        }
        let base_font = postscript_name(face.as_face_ref());

        Ok(Self {
            bytes,
            face: Arc::new(face),
            units_per_em,
            base_font,
        })
    }

    fn face(&self) -> &Face<'_> {
        self.face.as_face_ref()
    }

    fn glyph_count(&self) -> u16 {
        self.face().number_of_glyphs()
    }

    /// Measure a glyph run at the given point size using the horizontal advances of
    /// the font. Characters without a glyph are skipped with a warning, so a string
    /// made only of unmapped characters measures to a zero advance width.
    pub fn text_metrics(&self, text: &str, size: f32) -> TextMetrics {
        let scale = size / f32::from(self.units_per_em);
        let mut advance_units: u32 = 0;
        for character in text.nfc() {
            let advance = self
                .face()
                .glyph_index(character)
                .and_then(|glyph_id| self.face().glyph_hor_advance(glyph_id));
            match advance {
                Some(width) => advance_units += u32::from(width),
                None => {
                    log::warn!(
                        "Unable to find the character {:?} in the font {:?}",
                        character,
                        self.base_font
                    )
                }
            }
        }

        TextMetrics {
            advance_width: advance_units as f32 * scale,
            ascent: f32::from(self.face().ascender()) * scale,
            descent: f32::from(-self.face().descender()) * scale,
        }
    }

    /// Convert the text into the big-endian glyph ID bytes expected by an Identity-H
    /// encoded font. Unmapped characters are skipped, matching `text_metrics`.
    fn encode_glyph_run(&self, text: &str) -> Vec<u8> {
        let mut glyph_id_bytes = Vec::new();
        for character in text.nfc() {
            if let Some(glyph_id) = self.face().glyph_index(character) {
                glyph_id_bytes.push((glyph_id.0 >> 8) as u8);
                glyph_id_bytes.push((glyph_id.0 & 255) as u8);
            }
        }
        glyph_id_bytes
    }

    /// The association between the glyph IDs and the characters, taken from the
    /// unicode cmap subtables of the face. It feeds the ToUnicode map so that the
    /// stamped text stays extractable.
    fn glyph_to_codepoint_map(&self) -> BTreeMap<u16, char> {
        let mut gid_to_codepoint = BTreeMap::new();
        let Some(cmap) = self.face().tables().cmap else {
            return gid_to_codepoint;
        };
        for subtable in cmap.subtables.into_iter().filter(|s| s.is_unicode()) {
            subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    if let Some(glyph_id) = subtable
                        .glyph_index(codepoint)
                        .filter(|glyph_id| glyph_id.0 > 0)
                    {
                        gid_to_codepoint.entry(glyph_id.0).or_insert(character);
                    }
                }
            });
        }
        gid_to_codepoint
    }

    /// Takes the font and inserts it into the PDF document as a Type0 font with a
    /// CIDFontType2 descendant carrying the font program, the glyph widths and a
    /// ToUnicode map. Returns the object ID of the font dictionary.
    fn insert_into_document(&self, document: &mut lopdf::Document) -> lopdf::ObjectId {
        use lopdf::Object::*;

        // Scale the font units so that they fit into the 1000 unit glyph space the
        // PDF specification expects.
        let scaling = 1000.0 / f32::from(self.units_per_em);
        let base_font_name = Name(self.base_font.clone().into_bytes());

        // The font program itself. The PDF specification requires the byte length of
        // the program in `Length1` because the stream mixes text and byte data.
        let font_stream = lopdf::Stream::new(
            dictionary! { "Length1" => Integer(self.bytes.len() as i64) },
            self.bytes.clone(),
        )
        .with_compression(false);
        let font_file_id = document.add_object(font_stream);

        // Encode the glyph widths in the run-length `W` form of page 439 of the PDF
        // 1.7 reference: `start [w0 w1 ...]` covers consecutive glyph IDs.
        let mut width_objects = Vec::<Object>::new();
        let mut run_start = 0u16;
        let mut current_run = Vec::<Object>::new();
        for glyph_id in 0..self.glyph_count() {
            match self
                .face()
                .glyph_hor_advance(owned_ttf_parser::GlyphId(glyph_id))
            {
                Some(width) => {
                    if current_run.is_empty() {
                        run_start = glyph_id;
                    }
                    current_run.push(Integer((f32::from(width) * scaling) as i64));
                }
                None => {
                    if !current_run.is_empty() {
                        width_objects.push(Integer(i64::from(run_start)));
                        width_objects.push(Array(std::mem::take(&mut current_run)));
                    }
                }
            }
        }
        if !current_run.is_empty() {
            width_objects.push(Integer(i64::from(run_start)));
            width_objects.push(Array(current_run));
        }

        let to_unicode_map = to_unicode_cmap(&self.glyph_to_codepoint_map());
        let to_unicode_id = document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            to_unicode_map.into_bytes(),
        ));

        let bounding_box = self
            .face()
            .global_bounding_box();
        let font_descriptor_id = document.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => base_font_name.clone(),
            "Ascent" => Integer((f32::from(self.face().ascender()) * scaling) as i64),
            "Descent" => Integer((f32::from(self.face().descender()) * scaling) as i64),
            "CapHeight" => Integer((f32::from(self.face().ascender()) * scaling) as i64),
            "ItalicAngle" => Integer(0),
            // The font uses the Adobe standard Latin character set or a subset of it.
            "Flags" => Integer(32),
            // 80 is the customary approximation, the value cannot be read from a TTF.
            "StemV" => Integer(80),
            "FontBBox" => Array(vec![
                Integer((f32::from(bounding_box.x_min) * scaling) as i64),
                Integer((f32::from(bounding_box.y_min) * scaling) as i64),
                Integer((f32::from(bounding_box.x_max) * scaling) as i64),
                Integer((f32::from(bounding_box.y_max) * scaling) as i64),
            ]),
            "FontFile2" => Reference(font_file_id),
        });

        let descendant_font = dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => base_font_name.clone(),
            "CIDSystemInfo" => Dictionary(dictionary! {
                "Registry" => Object::String("Adobe".into(), StringFormat::Literal),
                "Ordering" => Object::String("Identity".into(), StringFormat::Literal),
                "Supplement" => Integer(0),
            }),
            "FontDescriptor" => Reference(font_descriptor_id),
            "W" => Array(width_objects),
            "DW" => Integer(1000),
            "CIDToGIDMap" => "Identity",
        };

        document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => base_font_name,
            // `Identity-H` maps the two-byte strings of the content streams straight
            // onto glyph IDs, horizontal writing.
            "Encoding" => "Identity-H",
            "DescendantFonts" => Array(vec![Dictionary(descendant_font)]),
            "ToUnicode" => Reference(to_unicode_id),
        })
    }
}

/// The paint resource resolved from the configured font family, exactly once per
/// stamp invocation. The preview measures through the same resource so the geometry
/// on screen and the geometry in the output bytes come from one source.
#[derive(Debug, Clone)]
pub enum FontResource {
    Standard(StandardFont),
    Embedded(TtfFont),
}

impl FontResource {
    /// Resolve the configured family. The three built-in families always succeed;
    /// the handwritten family loads the external TTF and falls back to the built-in
    /// oblique font if reading or parsing fails. The fallback is recovered locally
    /// and never fails the operation, it is only logged for diagnostics.
    pub fn resolve(family: FontFamily, handwritten_font: Option<&Path>) -> FontResource {
        match family {
            FontFamily::Helvetica => FontResource::Standard(StandardFont::Helvetica),
            FontFamily::Courier => FontResource::Standard(StandardFont::Courier),
            FontFamily::Times => FontResource::Standard(StandardFont::TimesRoman),
            FontFamily::Handwritten => match load_handwritten(handwritten_font) {
                Ok(font) => FontResource::Embedded(font),
                Err(error) => {
                    log::warn!(
                        "Failed to load the handwritten font, using the fallback: {}",
                        error
                    );
                    FontResource::Standard(StandardFont::HelveticaOblique)
                }
            },
        }
    }

    /// Measure a glyph run at the given point size through whichever metrics source
    /// backs this resource.
    pub fn text_metrics(&self, text: &str, size: f32) -> TextMetrics {
        match self {
            FontResource::Standard(font) => standard_text_metrics(text, *font, size),
            FontResource::Embedded(font) => font.text_metrics(text, size),
        }
    }

    /// Insert the font dictionary (embedding the font program where one exists) into
    /// the document and return its object ID. Called once per stamp invocation.
    pub(crate) fn insert_into_document(&self, document: &mut lopdf::Document) -> lopdf::ObjectId {
        match self {
            FontResource::Standard(font) => document.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font_name(),
            }),
            FontResource::Embedded(font) => font.insert_into_document(document),
        }
    }

    /// Encode the stamp text into the string object a `Tj` operator expects for this
    /// font: plain literal bytes for a standard font, hexadecimal glyph IDs for an
    /// embedded Identity-H font.
    pub(crate) fn encode_text(&self, text: &str) -> Object {
        match self {
            FontResource::Standard(_) => {
                // Standard fonts are painted through their default single-byte
                // encoding; characters outside it are replaced.
                let bytes = text
                    .chars()
                    .map(|character| {
                        if character.is_ascii() {
                            character as u8
                        } else {
                            log::warn!(
                                "The character {:?} is not representable in a standard font",
                                character
                            );
                            b'?'
                        }
                    })
                    .collect();
                Object::String(bytes, StringFormat::Literal)
            }
            FontResource::Embedded(font) => {
                Object::String(font.encode_glyph_run(text), StringFormat::Hexadecimal)
            }
        }
    }
}

fn load_handwritten(handwritten_font: Option<&Path>) -> Result<TtfFont, StampError> {
    let font_path = handwritten_font.ok_or(StampError::with_context(
        StampErrorKind::FontLoad,
        "No handwritten font file was provided",
    ))?;
    let font_bytes = std::fs::read(font_path).map_err(|error| {
        StampError::with_error(
            StampErrorKind::FontLoad,
            format!("Failed to read the handwritten font {:?}", font_path),
            &error,
        )
    })?;
    TtfFont::from_bytes(font_bytes)
}

/// The PostScript name of the face, falling back to a fixed identifier when the name
/// table does not carry one.
fn postscript_name(face: &Face<'_>) -> String {
    face.names()
        .into_iter()
        .find(|name| {
            name.is_unicode() && name.name_id == owned_ttf_parser::name_id::POST_SCRIPT_NAME
        })
        .and_then(|name| name.to_string())
        .unwrap_or_else(|| "Embedded-Handwritten".into())
}

/// Generates the ToUnicode character map from the glyph ID to codepoint association.
/// Glyph IDs are bucketed into `beginbfchar` blocks of at most 100 entries sharing
/// their first byte, as the CMap format requires.
fn to_unicode_cmap(gid_to_codepoint: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo <</Registry (Adobe) /Ordering (UCS) /Supplement 0>> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <ffff>\n\
         endcodespacerange\n",
    );

    let mut blocks: Vec<Vec<(u16, char)>> = Vec::new();
    let mut current_block: Vec<(u16, char)> = Vec::new();
    let mut current_first_byte: u16 = 0;
    for (&glyph_id, &character) in gid_to_codepoint {
        if (glyph_id >> 8) != current_first_byte || current_block.len() >= 100 {
            if !current_block.is_empty() {
                blocks.push(std::mem::take(&mut current_block));
            }
            current_first_byte = glyph_id >> 8;
        }
        current_block.push((glyph_id, character));
    }
    if !current_block.is_empty() {
        blocks.push(current_block);
    }

    for block in blocks {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph_id, character) in block {
            cmap.push_str(&format!("<{:04x}> <{:04x}>\n", glyph_id, character as u32));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}
