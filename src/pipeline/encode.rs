//! Image encoding: `DynamicImage` → PNG [`MediaAsset`].
//!
//! Figures lifted from the PDF are re-encoded as PNG because it is lossless
//! and every slide renderer accepts it. Huge scans are downscaled first so a
//! single poster-sized bitmap cannot bloat the deck.

use crate::model::MediaAsset;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Longest edge, in pixels, kept for an embedded figure.
pub const MAX_MEDIA_EDGE: u32 = 1600;

/// Encode an extracted image as PNG, downscaling it to [`MAX_MEDIA_EDGE`].
pub fn encode_media(img: &DynamicImage) -> Result<MediaAsset, image::ImageError> {
    let img = if img.width().max(img.height()) > MAX_MEDIA_EDGE {
        img.resize(MAX_MEDIA_EDGE, MAX_MEDIA_EDGE, image::imageops::FilterType::Triangle)
    } else {
        img.clone()
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded figure {}x{} → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );

    Ok(MediaAsset {
        png: buf,
        width: img.width(),
        height: img.height(),
    })
}
