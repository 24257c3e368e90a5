//! Box and caption overlay drawn directly on BGR frames.

use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgb};
use video_ingest::{Frame, FrameFormat};

use crate::detection::Detection;

// Pixels are stored in BGR order; `Rgb` is only used as a 3-channel container.
type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CAPTION_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_ADVANCE: i32 = 6;

/// Caption shown above a detection box, e.g. `bird 0.87`.
pub fn caption(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Return a copy of `frame` with every detection boxed and captioned.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Result<Frame> {
    if frame.format != FrameFormat::Bgr8 {
        return Err(anyhow!("cannot annotate {:?} frame", frame.format));
    }
    let mut image = BgrImage::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data.clone(),
    )
    .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;

    for detection in detections {
        let bbox = &detection.bbox;
        for inset in 0..BOX_THICKNESS {
            draw_rectangle(
                &mut image,
                bbox.x1 + inset,
                bbox.y1 + inset,
                bbox.x2 - 1 - inset,
                bbox.y2 - 1 - inset,
                BOX_COLOR,
            );
        }

        let text = caption(detection);
        let label_x = bbox.x1;
        let label_y = (bbox.y1 - 12).max(0);
        let text_width = text.chars().count() as i32 * GLYPH_ADVANCE;
        fill_rect(
            &mut image,
            label_x,
            label_y,
            label_x + text_width,
            label_y + 8,
            CAPTION_BACKGROUND,
        );
        draw_label(&mut image, label_x + 1, label_y + 1, &text, BOX_COLOR);
    }

    Ok(Frame {
        data: image.into_raw(),
        ..frame.clone()
    })
}

fn draw_rectangle(image: &mut BgrImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        image.put_pixel(x as u32, top as u32, color);
        image.put_pixel(x as u32, bottom as u32, color);
    }
    for y in top..=bottom {
        image.put_pixel(left as u32, y as u32, color);
        image.put_pixel(right as u32, y as u32, color);
    }
}

fn fill_rect(image: &mut BgrImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut BgrImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn grey_frame(width: i32, height: i32) -> Frame {
        Frame::bgr(vec![50; (width * height * 3) as usize], width, height)
    }

    fn pixel(frame: &Frame, x: i32, y: i32) -> [u8; 3] {
        let offset = ((y * frame.width + x) * 3) as usize;
        [frame.data[offset], frame.data[offset + 1], frame.data[offset + 2]]
    }

    #[test]
    fn no_detections_leaves_pixels_untouched() {
        let frame = grey_frame(32, 24);
        let annotated = annotate(&frame, &[]).unwrap();
        assert_eq!(annotated.data, frame.data);
        assert_eq!((annotated.width, annotated.height), (32, 24));
    }

    #[test]
    fn boxes_are_drawn_in_green() {
        let frame = grey_frame(64, 64);
        let detection = Detection {
            label: "bird".into(),
            confidence: 0.87,
            bbox: BoundingBox { x1: 20, y1: 30, x2: 50, y2: 60 },
        };
        let annotated = annotate(&frame, &[detection]).unwrap();

        assert_eq!(pixel(&annotated, 35, 59), [0, 255, 0]);
        assert_eq!(pixel(&annotated, 21, 45), [0, 255, 0]);
        assert_eq!(pixel(&annotated, 35, 45), [50, 50, 50]);
        assert_eq!(pixel(&annotated, 5, 5), [50, 50, 50]);
        assert_eq!(annotated.timestamp_ms, frame.timestamp_ms);
    }

    #[test]
    fn captions_use_two_decimals() {
        let detection = Detection {
            label: "bird".into(),
            confidence: 0.876,
            bbox: BoundingBox { x1: 0, y1: 0, x2: 1, y2: 1 },
        };
        assert_eq!(caption(&detection), "bird 0.88");
    }

    #[test]
    fn every_letter_has_a_glyph() {
        assert!(('A'..='Z').all(|c| glyph_bits(c).is_some()));
        assert!(('0'..='9').all(|c| glyph_bits(c).is_some()));
    }
}
