use base64::{engine::general_purpose::STANDARD, Engine as _};
use lopdf::content::Content;
use lopdf::{dictionary, Object, ObjectId};
use similar_asserts::assert_eq as assert_similar;

use stampr::config::{FontFamily, StampConfig, StampType};
use stampr::error::StampErrorKind;
use stampr::stamp::stamp_pdf;

/// Builds a document with one page per entry, each with its own MediaBox and a
/// small pre-existing content stream, and returns its serialized bytes.
fn document_bytes(page_sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut document = lopdf::Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let mut kids = Vec::new();
    for &(width, height) in page_sizes {
        let content_id = document.add_object(lopdf::Stream::new(
            dictionary! {},
            b"BT ET".to_vec(),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => Object::Array(vec![
                0.into(), 0.into(), width.into(), height.into(),
            ]),
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(kids),
            "Count" => page_count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    document.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).unwrap();
    bytes
}

fn png_data_url(width: u32, height: u32) -> String {
    let canvas = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(&png_bytes))
}

fn nth_page(document: &lopdf::Document, index: usize) -> ObjectId {
    *document.get_pages().values().nth(index).unwrap()
}

/// Decodes the content stream the stamping appended to the page, which is the last
/// entry of the page's `Contents` array.
fn appended_operations(document: &lopdf::Document, page_id: ObjectId) -> Vec<lopdf::content::Operation> {
    let page = document.get_object(page_id).and_then(Object::as_dict).unwrap();
    let contents = page.get(b"Contents").and_then(Object::as_array).unwrap();
    let last_id = contents.last().and_then(|entry| entry.as_reference().ok()).unwrap();
    let stream = document.get_object(last_id).and_then(Object::as_stream).unwrap();
    let bytes = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    Content::decode(&bytes).unwrap().operations
}

fn operand_f32(operation: &lopdf::content::Operation, index: usize) -> f32 {
    match &operation.operands[index] {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value,
        other => panic!("operand {} is not a number: {:?}", index, other),
    }
}

fn find<'a>(
    operations: &'a [lopdf::content::Operation],
    operator: &str,
) -> &'a lopdf::content::Operation {
    operations
        .iter()
        .find(|operation| operation.operator == operator)
        .unwrap_or_else(|| panic!("no {} operator in the appended stream", operator))
}

fn resource_object<'a>(
    document: &'a lopdf::Document,
    page_id: ObjectId,
    category: &[u8],
    name: &[u8],
) -> &'a Object {
    let page = document.get_object(page_id).and_then(Object::as_dict).unwrap();
    let resources = page.get(b"Resources").and_then(Object::as_dict).unwrap();
    let entries = resources.get(category).and_then(Object::as_dict).unwrap();
    let reference = entries.get(name).and_then(Object::as_reference).unwrap();
    document.get_object(reference).unwrap()
}

fn number(object: &Object) -> f32 {
    match object {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value,
        other => panic!("not a number: {:?}", other),
    }
}

#[test]
fn a_text_stamp_lands_right_aligned_at_the_anchor() {
    let config = StampConfig {
        initials: "JS".into(),
        font: FontFamily::Courier,
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let page_id = nth_page(&document, 0);
    let operations = appended_operations(&document, page_id);

    let operators: Vec<&str> = operations
        .iter()
        .map(|operation| operation.operator.as_str())
        .collect();
    assert_similar!(
        operators,
        vec!["q", "gs", "BT", "Tf", "rg", "Td", "Tj", "ET", "Q"]
    );

    // Two Courier characters at 24 points advance 28.8, so the baseline starts at
    // 612 - 50 - 28.8 and the right edge sits exactly 50 points from the page edge.
    let td = find(&operations, "Td");
    assert!((operand_f32(td, 0) - 533.2).abs() < 1e-3);
    assert!((operand_f32(td, 1) - 50.0).abs() < 1e-3);

    let tf = find(&operations, "Tf");
    assert_eq!(tf.operands[0], Object::Name(b"StampFont".to_vec()));
    assert!((operand_f32(tf, 1) - 24.0).abs() < 1e-3);

    let font = resource_object(&document, page_id, b"Font", b"StampFont")
        .as_dict()
        .unwrap();
    assert_eq!(font.get(b"Subtype").unwrap(), &Object::Name(b"Type1".to_vec()));
    assert_eq!(
        font.get(b"BaseFont").unwrap(),
        &Object::Name(b"Courier".to_vec())
    );
}

#[test]
fn an_image_stamp_scales_by_its_aspect_ratio() {
    let config = StampConfig {
        stamp_type: StampType::Image,
        stamp_image: Some(png_data_url(200, 100)),
        size: 40.0,
        x_offset: 20.0,
        y_offset: 20.0,
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let page_id = nth_page(&document, 0);
    let operations = appended_operations(&document, page_id);

    // A 200x100 image at height 40 is 80 wide; its bottom-right corner sits at
    // (612 - 20, 20), so the matrix places its origin at (512, 20).
    let cm = find(&operations, "cm");
    let matrix: Vec<f32> = (0..6).map(|index| operand_f32(cm, index)).collect();
    assert_eq!(matrix, vec![80.0, 0.0, 0.0, 40.0, 512.0, 20.0]);

    let image = resource_object(&document, page_id, b"XObject", b"StampImg")
        .as_stream()
        .unwrap();
    assert_eq!(image.dict.get(b"Width").unwrap(), &Object::Integer(200));
    assert_eq!(image.dict.get(b"Height").unwrap(), &Object::Integer(100));
}

#[test]
fn every_page_of_a_mixed_size_document_uses_its_own_width() {
    let config = StampConfig {
        initials: "JS".into(),
        font: FontFamily::Courier,
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792), (200, 400)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let first = appended_operations(&document, nth_page(&document, 0));
    let second = appended_operations(&document, nth_page(&document, 1));

    // The anchor moves with the page width while the offsets stay fixed.
    assert!((operand_f32(find(&first, "Td"), 0) - 533.2).abs() < 1e-3);
    assert!((operand_f32(find(&second, "Td"), 0) - 121.2).abs() < 1e-3);
    assert!((operand_f32(find(&second, "Td"), 1) - 50.0).abs() < 1e-3);
}

#[test]
fn the_existing_page_content_is_preserved_in_front_of_the_stamp() {
    let stamped = stamp_pdf(
        &document_bytes(&[(612, 792)]),
        &StampConfig::default(),
        None,
    )
    .unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let page = document
        .get_object(nth_page(&document, 0))
        .and_then(Object::as_dict)
        .unwrap();
    let contents = page.get(b"Contents").and_then(Object::as_array).unwrap();
    assert_eq!(contents.len(), 2);

    let original_id = contents[0].as_reference().unwrap();
    let original = document
        .get_object(original_id)
        .and_then(Object::as_stream)
        .unwrap();
    let original_bytes = original
        .decompressed_content()
        .unwrap_or_else(|_| original.content.clone());
    assert_eq!(original_bytes, b"BT ET");
}

#[test]
fn pages_sharing_a_contents_array_each_get_exactly_one_stamp() {
    // Two pages whose Contents entries reference the same array object. The
    // stamping must copy that array down per page instead of appending into the
    // shared object, otherwise both stamps end up painted on both pages.
    let mut document = lopdf::Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let stream_id = document.add_object(lopdf::Stream::new(dictionary! {}, b"BT ET".to_vec()));
    let shared_array_id =
        document.add_object(Object::Array(vec![Object::Reference(stream_id)]));

    let mut kids = Vec::new();
    for _ in 0..2 {
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            "Contents" => Object::Reference(shared_array_id),
        });
        kids.push(Object::Reference(page_id));
    }
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(kids),
            "Count" => 2,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    document.trailer.set("Root", Object::Reference(catalog_id));
    let mut bytes = Vec::new();
    document.save_to(&mut bytes).unwrap();

    let stamped = stamp_pdf(&bytes, &StampConfig::default(), None).unwrap();
    let output = lopdf::Document::load_mem(&stamped).unwrap();
    for index in 0..2 {
        let page_id = nth_page(&output, index);
        let page = output.get_object(page_id).and_then(Object::as_dict).unwrap();
        let contents = page.get(b"Contents").and_then(Object::as_array).unwrap();
        // The original shared stream plus exactly one stamp stream for this page.
        assert_eq!(contents.len(), 2);

        let stamp_count: usize = contents
            .iter()
            .map(|entry| {
                let id = entry.as_reference().unwrap();
                let stream = output.get_object(id).and_then(Object::as_stream).unwrap();
                let bytes = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                Content::decode(&bytes)
                    .unwrap()
                    .operations
                    .iter()
                    .filter(|operation| operation.operator == "Tj")
                    .count()
            })
            .sum();
        assert_eq!(stamp_count, 1);
    }
}

#[test]
fn opacity_zero_still_paints_with_a_zero_alpha() {
    let config = StampConfig {
        opacity: 0,
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let page_id = nth_page(&document, 0);
    let operations = appended_operations(&document, page_id);
    assert!(operations.iter().any(|operation| operation.operator == "Tj"));

    let graphics_state = resource_object(&document, page_id, b"ExtGState", b"StampGS")
        .as_dict()
        .unwrap();
    assert_eq!(number(graphics_state.get(b"ca").unwrap()), 0.0);
    assert_eq!(number(graphics_state.get(b"CA").unwrap()), 0.0);
}

#[test]
fn the_default_handwritten_family_falls_back_without_failing() {
    // No handwritten font file is supplied, so the stamp falls back to the built-in
    // oblique font and the operation still succeeds.
    let stamped = stamp_pdf(
        &document_bytes(&[(612, 792)]),
        &StampConfig::default(),
        None,
    )
    .unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let font = resource_object(&document, nth_page(&document, 0), b"Font", b"StampFont")
        .as_dict()
        .unwrap();
    assert_eq!(
        font.get(b"BaseFont").unwrap(),
        &Object::Name(b"Helvetica-Oblique".to_vec())
    );
}

#[test]
fn empty_initials_stamp_an_empty_run_without_panicking() {
    let config = StampConfig {
        initials: String::new(),
        font: FontFamily::Helvetica,
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let operations = appended_operations(&document, nth_page(&document, 0));
    let tj = find(&operations, "Tj");
    assert_eq!(tj.operands[0], Object::String(vec![], lopdf::StringFormat::Literal));
    // With nothing to advance, the anchor and the baseline start coincide.
    assert!((operand_f32(find(&operations, "Td"), 0) - 562.0).abs() < 1e-3);
}

fn count_type1_fonts(document: &lopdf::Document) -> usize {
    document
        .objects
        .values()
        .filter(|object| {
            object
                .as_dict()
                .map(|dictionary| {
                    let has = |key: &[u8], name: &[u8]| {
                        dictionary
                            .get(key)
                            .map(|value| value == &Object::Name(name.to_vec()))
                            .unwrap_or(false)
                    };
                    has(b"Type", b"Font") && has(b"Subtype", b"Type1")
                })
                .unwrap_or(false)
        })
        .count()
}

#[test]
fn each_invocation_embeds_the_font_resource_exactly_once() {
    let config = StampConfig {
        initials: "JS".into(),
        font: FontFamily::Courier,
        ..StampConfig::default()
    };
    let first = stamp_pdf(&document_bytes(&[(612, 792), (612, 792)]), &config, None).unwrap();
    let first_document = lopdf::Document::load_mem(&first).unwrap();
    // Two pages share one embedded font object.
    assert_eq!(count_type1_fonts(&first_document), 1);

    // Stamping the stamped bytes is an independent invocation: it adds its own
    // single resource instead of reusing or duplicating per page.
    let second = stamp_pdf(&first, &config, None).unwrap();
    let second_document = lopdf::Document::load_mem(&second).unwrap();
    assert_eq!(count_type1_fonts(&second_document), 2);
}

#[test]
fn malformed_input_bytes_fail_before_any_output_is_produced() {
    let error = stamp_pdf(b"this is not a pdf", &StampConfig::default(), None).unwrap_err();
    assert_eq!(error.kind(), StampErrorKind::InvalidDocument);
}

#[test]
fn an_undecodable_image_payload_fails_the_whole_operation() {
    let config = StampConfig {
        stamp_type: StampType::Image,
        stamp_image: Some(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(b"junk bytes")
        )),
        ..StampConfig::default()
    };
    let error = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap_err();
    assert_eq!(error.kind(), StampErrorKind::ImageDecode);
}

#[test]
fn a_translucent_png_gets_a_soft_mask_in_the_output() {
    let canvas = image::RgbaImage::from_pixel(10, 10, image::Rgba([255, 0, 0, 120]));
    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    let config = StampConfig {
        stamp_type: StampType::Image,
        stamp_image: Some(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(&png_bytes)
        )),
        ..StampConfig::default()
    };
    let stamped = stamp_pdf(&document_bytes(&[(612, 792)]), &config, None).unwrap();

    let document = lopdf::Document::load_mem(&stamped).unwrap();
    let page = document
        .get_object(nth_page(&document, 0))
        .and_then(Object::as_dict)
        .unwrap();
    let resources = page.get(b"Resources").and_then(Object::as_dict).unwrap();
    let xobjects = resources.get(b"XObject").and_then(Object::as_dict).unwrap();
    let image_id = xobjects.get(b"StampImg").and_then(Object::as_reference).unwrap();
    let image_stream = document
        .get_object(image_id)
        .and_then(Object::as_stream)
        .unwrap();
    assert!(image_stream.dict.get(b"SMask").is_ok());
}
