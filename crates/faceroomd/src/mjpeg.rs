//! JPEG encoding and multipart framing for MJPEG streaming.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, RgbImage};

/// Multipart boundary used in `Content-Type: multipart/x-mixed-replace; boundary=frame`.
pub const BOUNDARY: &str = "frame";

const PART_TRAILER: &[u8] = b"\r\n";

fn part_header() -> String {
    format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n")
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}

/// Wrap a JPEG payload as one multipart segment.
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = part_header();
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + PART_TRAILER.len());
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(PART_TRAILER);
    chunk
}
