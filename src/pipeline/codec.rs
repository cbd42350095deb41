//! Image encode/decode helpers.
//!
//! Codec work is CPU bound, so the async variants run on the blocking pool.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageResult};

use crate::pipeline::error::{PipelineError, PipelineResult};

/// MIME type of every image the gateway produces.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Encode to PNG in memory.
pub fn encode_png(image: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode any format the `image` crate can sniff from the leading bytes.
pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Decode a request body. Failures are client errors.
pub async fn decode_input(bytes: impl AsRef<[u8]> + Send + 'static) -> PipelineResult<DynamicImage> {
    tokio::task::spawn_blocking(move || decode(bytes.as_ref()))
        .await?
        .map_err(PipelineError::InputDecode)
}

/// Encode an image to PNG off the async workers.
pub async fn encode_png_blocking(image: DynamicImage) -> PipelineResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_png(&image))
        .await?
        .map_err(PipelineError::Encode)
}
