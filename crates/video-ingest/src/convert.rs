//! Conversion of device-native pixel layouts into canonical BGR.

use crate::types::{CaptureError, Frame, FrameFormat};

/// Convert any supported frame layout into packed BGR.
///
/// Buffers whose length does not match the declared layout are rejected
/// instead of being partially converted.
pub fn to_bgr(frame: Frame) -> Result<Frame, CaptureError> {
    frame.validate()?;
    match frame.format {
        FrameFormat::Bgr8 => Ok(frame),
        FrameFormat::Rgb8 => {
            let mut data = frame.data;
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(Frame {
                data,
                format: FrameFormat::Bgr8,
                ..frame
            })
        }
        FrameFormat::I420 => {
            let data = i420_to_bgr(&frame.data, frame.width as usize, frame.height as usize);
            Ok(Frame {
                data,
                format: FrameFormat::Bgr8,
                ..frame
            })
        }
    }
}

/// BT.601 limited-range YUV 4:2:0 to BGR.
fn i420_to_bgr(input: &[u8], width: usize, height: usize) -> Vec<u8> {
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);
    let (y_plane, rest) = input.split_at(width * height);
    let (u_plane, v_plane) = rest.split_at(chroma_w * chroma_h);

    let mut output = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col] as i32;
            let chroma = (row / 2) * chroma_w + col / 2;
            let c = y - 16;
            let d = u_plane[chroma] as i32 - 128;
            let e = v_plane[chroma] as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            output.push(b.clamp(0, 255) as u8);
            output.push(g.clamp(0, 255) as u8);
            output.push(r.clamp(0, 255) as u8);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: i32, height: i32, format: FrameFormat) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp_ms: 7,
            format,
        }
    }

    #[test]
    fn rgb_frames_swap_red_and_blue() {
        let rgb = frame(vec![10, 20, 30, 40, 50, 60], 2, 1, FrameFormat::Rgb8);
        let bgr = to_bgr(rgb).unwrap();
        assert_eq!(bgr.format, FrameFormat::Bgr8);
        assert_eq!(bgr.data, vec![30, 20, 10, 60, 50, 40]);
        assert_eq!(bgr.timestamp_ms, 7);
    }

    #[test]
    fn bgr_frames_pass_through() {
        let bgr = frame(vec![1, 2, 3], 1, 1, FrameFormat::Bgr8);
        assert_eq!(to_bgr(bgr).unwrap().data, vec![1, 2, 3]);
    }

    #[test]
    fn i420_neutral_chroma_is_grey() {
        // 2x2 luma, one chroma sample per plane.
        let data = vec![16, 16, 235, 126, 128, 128];
        let bgr = to_bgr(frame(data, 2, 2, FrameFormat::I420)).unwrap();
        assert_eq!(bgr.data.len(), 12);
        assert_eq!(&bgr.data[0..3], &[0, 0, 0]);
        assert_eq!(&bgr.data[6..9], &[255, 255, 255]);
        assert_eq!(&bgr.data[9..12], &[128, 128, 128]);
    }

    #[test]
    fn i420_strong_v_is_red() {
        let data = vec![82, 82, 82, 82, 90, 240];
        let bgr = to_bgr(frame(data, 2, 2, FrameFormat::I420)).unwrap();
        let (b, g, r) = (bgr.data[0], bgr.data[1], bgr.data[2]);
        assert!(r > 200, "red channel {r}");
        assert!(g < 40, "green channel {g}");
        assert!(b < 40, "blue channel {b}");
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        assert_eq!(FrameFormat::I420.buffer_len(3, 3), 9 + 2 * 4);
        let data = vec![128; 17];
        let bgr = to_bgr(frame(data, 3, 3, FrameFormat::I420)).unwrap();
        assert_eq!(bgr.data.len(), 27);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = to_bgr(frame(vec![0; 5], 2, 1, FrameFormat::Rgb8)).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidFrame {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }
}
