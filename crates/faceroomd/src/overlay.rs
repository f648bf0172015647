//! Face box overlays and error placeholder frames.

use crate::font::{draw_text, fill_rect, text_size};
use faceroom_core::FaceBox;
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 140, 0]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i64 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: i64 = 3;

const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;
const PLACEHOLDER_TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PLACEHOLDER_SCALE: u32 = 3;

/// What to draw for one face.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// Box only.
    Plain,
    /// Box with the matched user id.
    Known(String),
    /// Box labelled "Unknown".
    Unknown,
}

/// Draw markers onto a copy of `frame`. The input is never modified.
pub fn annotate(frame: &RgbImage, faces: &[(FaceBox, Marker)]) -> RgbImage {
    let mut out = frame.clone();
    for (face, marker) in faces {
        let color = match marker {
            Marker::Unknown => UNKNOWN_COLOR,
            Marker::Plain | Marker::Known(_) => BOX_COLOR,
        };
        draw_box(&mut out, face, color);
        match marker {
            Marker::Plain => {}
            Marker::Known(user_id) => draw_label(&mut out, face, user_id, color),
            Marker::Unknown => draw_label(&mut out, face, "Unknown", color),
        }
    }
    out
}

fn draw_box(img: &mut RgbImage, face: &FaceBox, color: Rgb<u8>) {
    let (top, right, bottom, left) = (
        face.top as i64,
        face.right as i64,
        face.bottom as i64,
        face.left as i64,
    );
    let t = BOX_THICKNESS;
    fill_rect(img, left, top, right, top + t, color);
    fill_rect(img, left, bottom - t, right, bottom, color);
    fill_rect(img, left, top, left + t, bottom, color);
    fill_rect(img, right - t, top, right, bottom, color);
}

/// Filled label bar above the box, or just inside it when the box touches the top edge.
fn draw_label(img: &mut RgbImage, face: &FaceBox, text: &str, color: Rgb<u8>) {
    let (text_w, text_h) = text_size(text, LABEL_SCALE);
    let bar_h = text_h as i64 + 2 * LABEL_PADDING;
    let bar_w = text_w as i64 + 2 * LABEL_PADDING;
    let left = face.left as i64;
    let bar_top = if face.top as i64 >= bar_h {
        face.top as i64 - bar_h
    } else {
        face.top as i64
    };
    fill_rect(img, left, bar_top, left + bar_w, bar_top + bar_h, color);
    draw_text(
        img,
        left + LABEL_PADDING,
        bar_top + LABEL_PADDING,
        text,
        LABEL_SCALE,
        LABEL_TEXT_COLOR,
    );
}

/// Black 640x480 frame with `message` centred in red.
pub fn placeholder_frame(message: &str) -> RgbImage {
    let mut img = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    let (w, h) = text_size(message, PLACEHOLDER_SCALE);
    let x = (PLACEHOLDER_WIDTH as i64 - w as i64) / 2;
    let y = (PLACEHOLDER_HEIGHT as i64 - h as i64) / 2;
    draw_text(&mut img, x, y, message, PLACEHOLDER_SCALE, PLACEHOLDER_TEXT_COLOR);
    img
}
