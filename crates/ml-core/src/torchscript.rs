//! YOLOv8 TorchScript backend.

use std::{convert::TryFrom, path::Path};

use anyhow::{Result, anyhow, bail};
use image::{ImageBuffer, Rgb, imageops::FilterType};
use tch::{self, Device, Kind, Tensor};
use tracing::info;
use video_ingest::Frame;

use crate::{
    detection::{RawDetection, non_max_suppression},
    detector::ObjectModel,
};

const MAX_CANDIDATES: usize = 300;

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub struct TorchScriptModel {
    module: tch::CModule,
    device: Device,
    input_size: i64,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TorchScriptModel {
    /// Load a YOLOv8 TorchScript export, on CUDA when available.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let device = Device::cuda_if_available();
        let module = tch::CModule::load_on_device(model_path.as_ref(), device)
            .map_err(|err| anyhow!("failed to load {}: {err}", model_path.as_ref().display()))?;
        info!(
            "Loaded TorchScript model {} on {:?}",
            model_path.as_ref().display(),
            device
        );
        Ok(Self {
            module,
            device,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    fn frame_to_tensor(&self, frame: &Frame) -> Result<Tensor> {
        let rgb: Vec<u8> = frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
            frame.width as u32,
            frame.height as u32,
            rgb,
        )
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let size = self.input_size as u32;
        let resized = image::imageops::resize(&image, size, size, FilterType::Triangle);

        let tensor = Tensor::from_slice(resized.as_raw())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, self.input_size, self.input_size, 3])
            .permute([0, 3, 1, 2])
            / 255.0;
        Ok(tensor)
    }

    fn decode(&self, rows: Vec<Vec<f32>>, frame: &Frame) -> Vec<RawDetection> {
        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for row in rows {
            if row.len() < 5 {
                continue;
            }
            let Some((class_id, score)) = row[4..]
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            if score < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            let label = COCO_LABELS
                .get(class_id)
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("class{class_id}"));
            candidates.push(RawDetection {
                label,
                confidence: score,
                bbox_xyxy: [
                    (cx - w / 2.0) * scale_x,
                    (cy - h / 2.0) * scale_y,
                    (cx + w / 2.0) * scale_x,
                    (cy + h / 2.0) * scale_y,
                ],
            });
        }

        let mut kept = non_max_suppression(candidates, self.iou_threshold);
        kept.truncate(MAX_CANDIDATES);
        kept
    }
}

impl ObjectModel for TorchScriptModel {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.frame_to_tensor(frame)?;
        let output = tch::no_grad(|| self.module.forward_ts(&[input]))?;
        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            bail!("unexpected detector output shape: {shape:?}");
        }
        if shape[1] < 5 {
            bail!(
                "detector output requires at least 5 channels (x,y,w,h,score), got {}",
                shape[1]
            );
        }

        let preds = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&preds)?;
        Ok(self.decode(rows, frame))
    }
}
