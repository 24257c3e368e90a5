//! FFmpeg invocation for the process-backed grabber engine.
//!
//! FFmpeg decodes whatever the input produces and emits packed `bgr24`
//! frames scaled to the configured capture size on stdout.

use std::process::Command;

use crate::source::{GrabberBackend, SourceId};

/// Build the FFmpeg command for a grabber input.
pub(crate) fn grabber_command(
    source: &SourceId,
    backend: Option<GrabberBackend>,
    frame_size: (i32, i32),
    framerate: u32,
) -> Command {
    let input = source.to_string();
    let is_device = matches!(source, SourceId::Index(_)) || input.starts_with("/dev/video");
    let scale_arg = format!("scale={}:{}", frame_size.0, frame_size.1);

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");

    if is_device || backend == Some(GrabberBackend::V4l2) {
        cmd.arg("-f").arg("video4linux2");
    } else if input.starts_with("rtsp://") || input.starts_with("rtsps://") {
        cmd.arg("-rtsp_transport")
            .arg("tcp")
            .arg("-fflags")
            .arg("nobuffer")
            .arg("-flags")
            .arg("low_delay");
    }

    cmd.arg("-i").arg(&input).arg("-an").arg("-vf").arg(&scale_arg);
    if framerate > 0 {
        cmd.arg("-r").arg(framerate.to_string());
    }
    cmd.arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-");
    cmd
}
