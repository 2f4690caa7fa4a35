use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use std::path::{Path, PathBuf};

use stampr::config::{FontFamily, StampConfig, StampType};
use stampr::error::{StampError, StampErrorKind};
use stampr::stamp::{stamp_pdf, stamped_file_name};

#[derive(Parser, Debug)]
#[command(version, about = "Stamp initials or an image onto every page of a PDF")]
struct CliArguments {
    /// The PDF document to stamp.
    #[arg(value_name = "input_pdf")]
    input_path: PathBuf,
    /// Where to write the stamped document. Defaults to the input file name with a
    /// `stamped_` prefix, next to the input.
    #[arg(short = 'o', long = "output", value_name = "file_path")]
    output_path: Option<PathBuf>,
    /// A JSON stamp configuration in the camel-cased wire shape. Flags below
    /// override individual fields of it.
    #[arg(short = 'c', long = "config", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    /// The text to stamp.
    #[arg(long, value_name = "text")]
    initials: Option<String>,
    /// An image file to stamp instead of text.
    #[arg(long, value_name = "image_file")]
    image: Option<PathBuf>,
    #[arg(long, value_enum)]
    font: Option<FontFamily>,
    /// Point size of the text, or height in points of the image.
    #[arg(long)]
    size: Option<f32>,
    /// Distance from the right page edge, in points.
    #[arg(long)]
    x_offset: Option<f32>,
    /// Distance from the bottom page edge, in points.
    #[arg(long)]
    y_offset: Option<f32>,
    /// Opacity percent in [0, 100].
    #[arg(long)]
    opacity: Option<u8>,
    /// The TTF file backing the handwritten font family.
    #[arg(long, value_name = "ttf_file")]
    handwritten_font: Option<PathBuf>,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), StampError> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let arguments = CliArguments::parse();
    log::debug!("{:?}", arguments);

    let config = build_configuration(&arguments)?;

    let document_bytes = std::fs::read(&arguments.input_path).map_err(|error| {
        StampError::with_error(
            StampErrorKind::Document,
            format!("Failed to read the input file {:?}", arguments.input_path),
            &error,
        )
    })?;
    let stamped_bytes = stamp_pdf(
        &document_bytes,
        &config,
        arguments.handwritten_font.as_deref(),
    )?;

    let output_path = arguments.output_path.unwrap_or_else(|| {
        arguments
            .input_path
            .with_file_name(stamped_file_name(&arguments.input_path))
    });
    std::fs::write(&output_path, stamped_bytes).map_err(|error| {
        StampError::with_error(
            StampErrorKind::Document,
            format!("Failed to write the output file {:?}", output_path),
            &error,
        )
    })?;
    log::info!("Saved the stamped document to the path: {:?}", output_path);
    Ok(())
}

/// Builds the effective configuration: the JSON file (or the defaults) with the
/// individual flags layered on top. Passing an image file switches the stamp to its
/// image form.
fn build_configuration(arguments: &CliArguments) -> Result<StampConfig, StampError> {
    let mut config = match &arguments.configuration_path {
        Some(path) => StampConfig::from_path(path)?,
        None => StampConfig::default(),
    };

    if let Some(initials) = &arguments.initials {
        config.initials = initials.clone();
        config.stamp_type = StampType::Text;
    }
    if let Some(image_path) = &arguments.image {
        config.stamp_image = Some(file_to_data_url(image_path)?);
        config.stamp_type = StampType::Image;
    }
    if let Some(font) = arguments.font {
        config.font = font;
    }
    if let Some(size) = arguments.size {
        config.size = size;
    }
    if let Some(x_offset) = arguments.x_offset {
        config.x_offset = x_offset;
    }
    if let Some(y_offset) = arguments.y_offset {
        config.y_offset = y_offset;
    }
    if let Some(opacity) = arguments.opacity {
        config.opacity = opacity.min(100);
    }

    Ok(config)
}

/// Wraps an image file into the data URL form the configuration carries, guessing
/// the media type from the file extension. The type is only a decoding hint, the
/// payload bytes are verified downstream anyway.
fn file_to_data_url(image_path: &Path) -> Result<String, StampError> {
    let image_bytes = std::fs::read(image_path).map_err(|error| {
        StampError::with_error(
            StampErrorKind::ImageDecode,
            format!("Failed to read the stamp image {:?}", image_path),
            &error,
        )
    })?;
    let media_type = match image_path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };

    Ok(format!(
        "data:{};base64,{}",
        media_type,
        STANDARD.encode(&image_bytes)
    ))
}
