use std::{collections::BTreeSet, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use ml_core::LabelFilter;
use tracing::warn;
use video_ingest::{CaptureDriver, CaptureSettings, GrabberBackend, SourceId};

use crate::{pipeline::RecoveryPolicy, stream::DEFAULT_JPEG_QUALITY};

const DEFAULT_MODEL: &str = "yolov8n.torchscript";
const DEFAULT_LABEL: &str = "bird";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;
const DEFAULT_RESOLUTION: (i32, i32) = (1280, 720);
const DEFAULT_FPS: u32 = 30;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_READ_FAILURES: u32 = 5;

/// Raw command-line/environment values. Parsing is lenient: anything invalid
/// falls back to its default with a warning when resolved into [`AppConfig`].
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bird-cctv",
    version,
    about = "Camera MJPEG streaming service with optional bird detection"
)]
pub struct CliArgs {
    /// Camera index, device path, or stream URI.
    #[arg(long, env = "VIDEO_SOURCE", default_value = "0")]
    pub source: String,
    /// `opencv` (generic grabber) or `picamera2` (board camera).
    #[arg(long, env = "CAMERA_DRIVER", default_value = "opencv")]
    pub driver: String,
    /// Grabber backend hint: `v4l2`, `gstreamer`, or `ffmpeg`.
    #[arg(long, env = "VIDEO_BACKEND")]
    pub backend: Option<String>,
    /// TorchScript model path; `none` disables detection.
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Comma-separated labels to keep.
    #[arg(long, env = "BIRD_LABELS", default_value = DEFAULT_LABEL)]
    pub labels: String,
    #[arg(long, env = "MIN_CONFIDENCE", default_value = "0.4")]
    pub min_confidence: String,
    /// Resize frames to this width before detection.
    #[arg(long, env = "FRAME_WIDTH")]
    pub frame_width: Option<String>,
    /// Capture resolution, e.g. `1280x720`.
    #[arg(long, env = "PICAMERA_RESOLUTION", default_value = "1280x720")]
    pub resolution: String,
    #[arg(long, env = "PICAMERA_FPS", default_value = "30")]
    pub fps: String,
    /// JPEG quality for the stream (1-100).
    #[arg(long, env = "JPEG_QUALITY", default_value = "85")]
    pub jpeg_quality: String,
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind: String,
    #[arg(long, env = "RECOVERY_BACKOFF_MS", default_value = "1000")]
    pub recovery_backoff_ms: String,
    #[arg(long, env = "MAX_READ_FAILURES", default_value = "5")]
    pub max_read_failures: String,
}

/// Resolved service configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub capture: CaptureSettings,
    /// `None` runs the service in stream-only mode.
    pub model_path: Option<PathBuf>,
    pub labels: Vec<String>,
    pub min_confidence: f32,
    pub frame_width: Option<u32>,
    pub jpeg_quality: u8,
    pub bind: String,
    pub recovery: RecoveryPolicy,
}

impl AppConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let capture = CaptureSettings {
            driver: CaptureDriver::from_name(&args.driver),
            source: SourceId::parse(&args.source),
            backend: args.backend.as_deref().and_then(GrabberBackend::from_name),
            resolution: parse_resolution(&args.resolution),
            framerate: parse_positive("PICAMERA_FPS", &args.fps, DEFAULT_FPS),
        };
        let jpeg_quality = match args.jpeg_quality.trim().parse::<u8>() {
            Ok(quality) if (1..=100).contains(&quality) => quality,
            _ => {
                warn!(
                    "Invalid JPEG_QUALITY '{}', using {DEFAULT_JPEG_QUALITY}",
                    args.jpeg_quality
                );
                DEFAULT_JPEG_QUALITY
            }
        };
        let recovery = RecoveryPolicy {
            max_read_failures: parse_or(
                "MAX_READ_FAILURES",
                &args.max_read_failures,
                DEFAULT_MAX_READ_FAILURES,
            ),
            backoff: Duration::from_millis(parse_or(
                "RECOVERY_BACKOFF_MS",
                &args.recovery_backoff_ms,
                DEFAULT_BACKOFF_MS,
            )),
            ..RecoveryPolicy::default()
        };

        Self {
            capture,
            model_path: parse_model_path(&args.model),
            labels: parse_labels(&args.labels),
            min_confidence: parse_or(
                "MIN_CONFIDENCE",
                &args.min_confidence,
                DEFAULT_MIN_CONFIDENCE,
            ),
            frame_width: args
                .frame_width
                .as_deref()
                .filter(|value| !value.trim().is_empty())
                .and_then(|value| match value.trim().parse::<u32>() {
                    Ok(width) if width > 0 => Some(width),
                    _ => {
                        warn!("Invalid FRAME_WIDTH '{value}', frames will not be resized");
                        None
                    }
                }),
            jpeg_quality,
            bind: args.bind.trim().to_string(),
            recovery,
        }
    }

    pub fn label_filter(&self) -> LabelFilter {
        LabelFilter::new(&self.labels, self.min_confidence)
    }

    pub fn labels_display(&self) -> String {
        labels_to_display(&self.labels)
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, value: &str, default: T) -> T {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default;
    }
    trimmed.parse().unwrap_or_else(|_| {
        warn!("Invalid {name} '{value}', using {default}");
        default
    })
}

fn parse_positive(name: &str, value: &str, default: u32) -> u32 {
    match parse_or(name, value, default) {
        0 => {
            warn!("{name} must be positive, using {default}");
            default
        }
        parsed => parsed,
    }
}

fn parse_model_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(PathBuf::from(DEFAULT_MODEL));
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "none" | "no" | "off" | "disable" | "disabled" => None,
        _ => Some(PathBuf::from(trimmed)),
    }
}

fn parse_labels(value: &str) -> Vec<String> {
    let labels: Vec<String> = value
        .split(',')
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect();
    if labels.is_empty() {
        vec![DEFAULT_LABEL.to_string()]
    } else {
        labels
    }
}

/// `WxH`, with `x`, `*`, `,` or whitespace between the numbers.
fn parse_resolution(value: &str) -> (i32, i32) {
    let normalized = value.to_lowercase().replace(['x', '*', ','], " ");
    let parts: Vec<&str> = normalized.split_whitespace().collect();
    let parsed = match parts.as_slice() {
        [w, h] => w.parse::<i32>().ok().zip(h.parse::<i32>().ok()),
        _ => None,
    };
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => {
            if !value.trim().is_empty() {
                warn!(
                    "Invalid resolution '{value}', using {}x{}",
                    DEFAULT_RESOLUTION.0, DEFAULT_RESOLUTION.1
                );
            }
            DEFAULT_RESOLUTION
        }
    }
}

/// Title-case, deduplicate and sort labels for display: `bird, Bird ` → `Bird`.
pub fn labels_to_display<I, S>(labels: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let titled: BTreeSet<String> = labels
        .into_iter()
        .map(|label| title_case(label.as_ref().trim()))
        .filter(|label| !label.is_empty())
        .collect();
    titled.into_iter().collect::<Vec<_>>().join(", ")
}

fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &[&str]) -> AppConfig {
        let mut argv = vec!["bird-cctv"];
        argv.extend_from_slice(extra);
        AppConfig::from_args(CliArgs::try_parse_from(argv).unwrap())
    }

    #[test]
    fn labels_display_is_titled_deduplicated_and_sorted() {
        assert_eq!(labels_to_display(["bird", "Bird ", "crow"]), "Bird, Crow");
        assert_eq!(labels_to_display(["blue jay", "ROBIN"]), "Blue Jay, Robin");
        assert_eq!(labels_to_display(Vec::<String>::new()), "");
    }

    #[test]
    fn resolution_accepts_several_separators() {
        assert_eq!(parse_resolution("640x480"), (640, 480));
        assert_eq!(parse_resolution("640*480"), (640, 480));
        assert_eq!(parse_resolution(" 640, 480 "), (640, 480));
        assert_eq!(parse_resolution("640 X 480"), (640, 480));
        assert_eq!(parse_resolution("640"), DEFAULT_RESOLUTION);
        assert_eq!(parse_resolution("0x480"), DEFAULT_RESOLUTION);
        assert_eq!(parse_resolution("wide"), DEFAULT_RESOLUTION);
    }

    #[test]
    fn model_path_can_be_disabled() {
        assert_eq!(parse_model_path("Disabled"), None);
        assert_eq!(parse_model_path(" off "), None);
        assert_eq!(parse_model_path(""), Some(PathBuf::from(DEFAULT_MODEL)));
        assert_eq!(
            parse_model_path("/models/birds.torchscript"),
            Some(PathBuf::from("/models/birds.torchscript"))
        );
    }

    #[test]
    fn labels_are_lowercased_with_bird_fallback() {
        assert_eq!(parse_labels(" Bird, CROW ,,"), vec!["bird", "crow"]);
        assert_eq!(parse_labels(" , "), vec!["bird"]);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let cfg = config(&[
            "--min-confidence",
            "lots",
            "--fps",
            "0",
            "--jpeg-quality",
            "150",
            "--frame-width=-3",
            "--max-read-failures",
            "many",
        ]);
        assert_eq!(cfg.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(cfg.capture.framerate, DEFAULT_FPS);
        assert_eq!(cfg.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(cfg.frame_width, None);
        assert_eq!(cfg.recovery.max_read_failures, DEFAULT_MAX_READ_FAILURES);
    }

    #[test]
    fn flags_resolve_into_capture_settings() {
        let cfg = config(&[
            "--source",
            "rtsp://cam.local/live",
            "--driver",
            "picamera2",
            "--backend",
            "gstreamer",
            "--resolution",
            "640x480",
            "--fps",
            "15",
            "--frame-width",
            "800",
            "--recovery-backoff-ms",
            "250",
            "--model",
            "none",
        ]);
        assert_eq!(cfg.capture.driver, CaptureDriver::Board);
        assert_eq!(
            cfg.capture.source,
            SourceId::Uri("rtsp://cam.local/live".into())
        );
        assert_eq!(cfg.capture.backend, Some(GrabberBackend::Gstreamer));
        assert_eq!(cfg.capture.resolution, (640, 480));
        assert_eq!(cfg.capture.framerate, 15);
        assert_eq!(cfg.frame_width, Some(800));
        assert_eq!(cfg.recovery.backoff, Duration::from_millis(250));
        assert_eq!(cfg.recovery.retries_per_failure, 1);
        assert_eq!(cfg.model_path, None);
    }
}
