//! The document mutator. Takes the bytes of a PDF document and a stamp configuration,
//! paints the stamp on every page and returns the re-serialized bytes. The operation
//! is all-or-nothing: the paint resource is resolved and embedded before the first
//! page is touched, every page mutation happens in memory, and serialization only
//! runs once every page carries the stamp. No partially stamped bytes can escape.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use std::path::Path;

use crate::config::{StampConfig, StampType};
use crate::error::{StampError, StampErrorKind};
use crate::fonts::FontResource;
use crate::image_stamp::PreparedImage;

/// The resource names registered on every page. Fixed names keep the content
/// streams identical across pages; the probability of a collision with existing
/// resources is accepted and documented.
const FONT_RESOURCE_NAME: &str = "StampFont";
const IMAGE_RESOURCE_NAME: &str = "StampImg";
const GRAPHICS_STATE_NAME: &str = "StampGS";

/// How many `Parent` links a page attribute lookup will follow before giving up,
/// guarding against cyclic page trees in malformed documents.
const MAX_PARENT_DEPTH: usize = 32;

/// The paint resource embedded once per operation and referenced from every page.
#[derive(Debug)]
enum Paint {
    Text {
        font: FontResource,
        font_id: ObjectId,
        advance_width: f32,
    },
    Image {
        image_id: ObjectId,
        width: f32,
        height: f32,
    },
}

/// Stamps every page of the given document bytes and returns the new document
/// bytes. The handwritten font path backs the `handwritten` family; when it cannot
/// be loaded the built-in oblique fallback is used and the operation still
/// succeeds. Undecodable input bytes and undecodable image payloads fail the whole
/// operation without producing output.
pub fn stamp_pdf(
    document_bytes: &[u8],
    config: &StampConfig,
    handwritten_font: Option<&Path>,
) -> Result<Vec<u8>, StampError> {
    let mut document = lopdf::Document::load_mem(document_bytes).map_err(|error| {
        StampError::with_error(
            StampErrorKind::InvalidDocument,
            "The input bytes are not a readable PDF document",
            &error,
        )
    })?;

    let paint = resolve_paint(&mut document, config, handwritten_font)?;
    let graphics_state_id = document.add_object(dictionary! {
        "Type" => "ExtGState",
        // Opacity applies to fills and strokes alike; zero still paints, invisibly.
        "ca" => Object::Real(config.alpha()),
        "CA" => Object::Real(config.alpha()),
    });

    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    log::info!("Stamping {} page(s)", page_ids.len());
    for page_id in page_ids {
        let (page_width, _page_height) = resolve_page_size(&document, page_id)?;
        let operations = stamp_operations(config, &paint, page_width);
        append_content(&mut document, page_id, operations)?;
        register_resources(&mut document, page_id, &paint, graphics_state_id)?;
    }

    document.compress();
    let mut output_bytes = Vec::new();
    document.save_to(&mut output_bytes).map_err(|error| {
        StampError::with_error(
            StampErrorKind::Document,
            "Failed to serialize the stamped document",
            &error,
        )
    })?;

    Ok(output_bytes)
}

/// The conventional output name for a stamped document: the original file name with
/// a `stamped_` prefix.
pub fn stamped_file_name(original: &Path) -> String {
    match original.file_name().and_then(|name| name.to_str()) {
        Some(name) => format!("stamped_{}", name),
        None => "stamped_document.pdf".into(),
    }
}

/// Resolve and embed the paint resource exactly once. Text stamps resolve their
/// font (with the handwritten fallback) and measure the glyph run at the configured
/// size; image stamps decode the data URL payload and derive their box from the
/// configured size and the natural aspect ratio.
fn resolve_paint(
    document: &mut lopdf::Document,
    config: &StampConfig,
    handwritten_font: Option<&Path>,
) -> Result<Paint, StampError> {
    match config.stamp_type {
        StampType::Text => {
            let font = FontResource::resolve(config.font, handwritten_font);
            let advance_width = font.text_metrics(&config.initials, config.size).advance_width;
            let font_id = font.insert_into_document(document);
            Ok(Paint::Text {
                font,
                font_id,
                advance_width,
            })
        }
        StampType::Image => {
            let data_url = config.stamp_image.as_deref().ok_or(StampError::with_context(
                StampErrorKind::ImageDecode,
                "An image stamp was requested but no stamp image was provided",
            ))?;
            let prepared = PreparedImage::from_data_url(data_url)?;
            let height = config.size;
            let width = height * prepared.aspect_ratio();
            let image_id = prepared.insert_into_document(document);
            Ok(Paint::Image {
                image_id,
                width,
                height,
            })
        }
    }
}

/// The content stream painted onto a page: a `q .. Q` block activating the shared
/// graphics state and drawing the stamp right-aligned at the bottom-right anchor.
fn stamp_operations(config: &StampConfig, paint: &Paint, page_width: f32) -> Vec<Operation> {
    let anchor_x = page_width - config.x_offset;
    let anchor_y = config.y_offset;

    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![GRAPHICS_STATE_NAME.into()]),
    ];
    match paint {
        Paint::Text {
            font,
            advance_width,
            ..
        } => {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![FONT_RESOURCE_NAME.into(), Object::Real(config.size)],
            ));
            operations.push(Operation::new(
                "rg",
                vec![0.into(), 0.into(), 0.into()],
            ));
            // The baseline starts where the run ends up right-aligned at the anchor.
            operations.push(Operation::new(
                "Td",
                vec![
                    Object::Real(anchor_x - advance_width),
                    Object::Real(anchor_y),
                ],
            ));
            operations.push(Operation::new("Tj", vec![font.encode_text(&config.initials)]));
            operations.push(Operation::new("ET", vec![]));
        }
        Paint::Image { width, height, .. } => {
            operations.push(Operation::new(
                "cm",
                vec![
                    Object::Real(*width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(*height),
                    Object::Real(anchor_x - width),
                    Object::Real(anchor_y),
                ],
            ));
            operations.push(Operation::new("Do", vec![IMAGE_RESOURCE_NAME.into()]));
        }
    }
    operations.push(Operation::new("Q", vec![]));
    operations
}

/// Appends a new content stream to the page, preserving whatever content is already
/// there. The existing `Contents` entry may be a single reference, an array, or
/// absent on an empty page.
fn append_content(
    document: &mut lopdf::Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), StampError> {
    let encoded = Content { operations }.encode().map_err(|error| {
        StampError::with_error(
            StampErrorKind::Document,
            "Failed to encode the stamp content stream",
            &error,
        )
    })?;
    let stream_id = document.add_object(Stream::new(dictionary! {}, encoded));

    let existing_contents = page_dictionary_mut(document, page_id)?
        .get(b"Contents")
        .ok()
        .cloned();
    match existing_contents {
        Some(Object::Array(mut streams)) => {
            streams.push(Object::Reference(stream_id));
            page_dictionary_mut(document, page_id)?.set("Contents", Object::Array(streams));
        }
        Some(Object::Reference(existing_id)) => {
            // The reference may point at a single stream or at an array of streams.
            // A referenced array may be shared between pages, so it is copied down
            // onto the page instead of mutated in place; pushing into the shared
            // object would paint every page's stamp on every sharing page.
            let streams = match document.get_object(existing_id) {
                Ok(Object::Array(shared)) => {
                    let mut owned = shared.clone();
                    owned.push(Object::Reference(stream_id));
                    owned
                }
                _ => vec![
                    Object::Reference(existing_id),
                    Object::Reference(stream_id),
                ],
            };
            page_dictionary_mut(document, page_id)?.set("Contents", Object::Array(streams));
        }
        _ => {
            page_dictionary_mut(document, page_id)?
                .set("Contents", Object::Reference(stream_id));
        }
    }

    Ok(())
}

/// Registers the stamp resources on the page. Inherited or shared resource
/// dictionaries are copied down onto the page first, so the mutation never leaks
/// into a dictionary other pages may also reference.
fn register_resources(
    document: &mut lopdf::Document,
    page_id: ObjectId,
    paint: &Paint,
    graphics_state_id: ObjectId,
) -> Result<(), StampError> {
    let mut resources = resolve_inherited_dictionary(document, page_id, b"Resources")?
        .unwrap_or_default();

    let (category, name, object_id) = match paint {
        Paint::Text { font_id, .. } => ("Font", FONT_RESOURCE_NAME, *font_id),
        Paint::Image { image_id, .. } => ("XObject", IMAGE_RESOURCE_NAME, *image_id),
    };
    set_resource_entry(document, &mut resources, category, name, object_id)?;
    set_resource_entry(
        document,
        &mut resources,
        "ExtGState",
        GRAPHICS_STATE_NAME,
        graphics_state_id,
    )?;

    page_dictionary_mut(document, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Adds `name => object_id` under the given sub-dictionary of a resources
/// dictionary, materializing a referenced sub-dictionary into an owned copy first.
fn set_resource_entry(
    document: &lopdf::Document,
    resources: &mut Dictionary,
    category: &str,
    name: &str,
    object_id: ObjectId,
) -> Result<(), StampError> {
    let mut entries = match resources.get(category.as_bytes()) {
        Ok(existing) => resolved_dictionary(document, existing)?,
        Err(_) => Dictionary::new(),
    };
    entries.set(name, Object::Reference(object_id));
    resources.set(category, Object::Dictionary(entries));
    Ok(())
}

/// Resolves the page size from the `MediaBox`, walking `Parent` links for inherited
/// boxes so that documents with mixed page sizes are honored per page.
pub(crate) fn resolve_page_size(
    document: &lopdf::Document,
    page_id: ObjectId,
) -> Result<(f32, f32), StampError> {
    let media_box = resolve_inherited_entry(document, page_id, b"MediaBox")?.ok_or(
        StampError::with_context(
            StampErrorKind::Document,
            "The page has no resolvable MediaBox",
        ),
    )?;
    let corners = resolved_object(document, &media_box)
        .as_array()
        .map_err(|error| {
            StampError::with_error(StampErrorKind::Document, "The MediaBox is not an array", &error)
        })?
        .iter()
        .map(|corner| number_value(document, corner))
        .collect::<Result<Vec<f32>, StampError>>()?;
    if corners.len() != 4 {
        return Err(StampError::with_context(
            StampErrorKind::Document,
            "The MediaBox does not have four corners",
        ));
    }

    Ok(((corners[2] - corners[0]).abs(), (corners[3] - corners[1]).abs()))
}

/// Looks an entry up on the page dictionary, walking `Parent` links when the page
/// itself does not carry it. Depth-limited against cyclic parent chains.
fn resolve_inherited_entry(
    document: &lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Object>, StampError> {
    let mut current_id = page_id;
    for _ in 0..MAX_PARENT_DEPTH {
        let dictionary = document
            .get_object(current_id)
            .and_then(Object::as_dict)
            .map_err(|error| {
                StampError::with_error(
                    StampErrorKind::Document,
                    "A page tree node is not a dictionary",
                    &error,
                )
            })?;
        if let Ok(value) = dictionary.get(key) {
            return Ok(Some(value.clone()));
        }
        match dictionary.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current_id = *parent_id,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Like `resolve_inherited_entry` for entries that must be dictionaries, returning
/// an owned copy ready to be edited and written back onto the page.
fn resolve_inherited_dictionary(
    document: &lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Dictionary>, StampError> {
    match resolve_inherited_entry(document, page_id, key)? {
        Some(value) => Ok(Some(resolved_dictionary(document, &value)?)),
        None => Ok(None),
    }
}

fn resolved_dictionary(
    document: &lopdf::Document,
    object: &Object,
) -> Result<Dictionary, StampError> {
    resolved_object(document, object)
        .as_dict()
        .cloned()
        .map_err(|error| {
            StampError::with_error(
                StampErrorKind::Document,
                "A resource entry is not a dictionary",
                &error,
            )
        })
}

/// Follows at most one level of indirection, which is all the entries touched here
/// legitimately use.
fn resolved_object<'a>(document: &'a lopdf::Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn number_value(document: &lopdf::Document, object: &Object) -> Result<f32, StampError> {
    match resolved_object(document, object) {
        Object::Integer(value) => Ok(*value as f32),
        Object::Real(value) => Ok(*value),
        other => Err(StampError::with_context(
            StampErrorKind::Document,
            format!("Expected a number in the page geometry, found {:?}", other),
        )),
    }
}

fn page_dictionary_mut(
    document: &mut lopdf::Document,
    page_id: ObjectId,
) -> Result<&mut Dictionary, StampError> {
    document
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|error| {
            StampError::with_error(
                StampErrorKind::Document,
                "The page object is not a dictionary",
                &error,
            )
        })
}
