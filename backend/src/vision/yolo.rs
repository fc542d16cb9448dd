use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::ArrayView2;

use crate::config::DetectionParams;
use crate::vision::detector::{DetectorError, RawDetection};

const PAD_VALUE: u8 = 114;

/// Geometry of a letterboxed model input relative to the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    /// Maps a point from model input space back to original pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        let x = ((x - self.pad_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let y = ((y - self.pad_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (x, y)
    }
}

/// Resizes `image` into a `size`x`size` canvas keeping aspect ratio and
/// returns the CHW float tensor data in `[0, 1]`.
pub fn letterbox(image: &DynamicImage, size: u32) -> Result<(Vec<f32>, Letterbox), DetectorError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(DetectorError::Preprocessing("image has no pixels".to_string()));
    }

    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(&image.to_rgb8(), new_width, new_height, FilterType::Triangle);

    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let plane = (size * size) as usize;
    let mut data = vec![0f32; plane * 3];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        for channel in 0..3 {
            data[channel * plane + idx] = pixel[channel] as f32 / 255.0;
        }
    }

    Ok((
        data,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_width: width,
            orig_height: height,
        },
    ))
}

/// Decodes a YOLOv8/11 detection head of shape `[4 + classes, anchors]`
/// (rows: cx, cy, w, h, then one score per class).
///
/// Candidates under the confidence threshold are dropped, the rest go through
/// per-class non-maximum suppression. Output is sorted by confidence.
pub fn decode_predictions(
    output: ArrayView2<f32>,
    letterbox: &Letterbox,
    params: &DetectionParams,
) -> Result<Vec<RawDetection>, DetectorError> {
    let (rows, anchors) = output.dim();
    if rows < 5 {
        return Err(DetectorError::OutputShape(vec![rows as i64, anchors as i64]));
    }

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..rows)
            .map(|row| (row - 4, output[[row, anchor]]))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 { current } else { best }
            });

        if confidence < params.confidence_threshold {
            continue;
        }

        let cx = output[[0, anchor]];
        let cy = output[[1, anchor]];
        let half_w = output[[2, anchor]] / 2.0;
        let half_h = output[[3, anchor]] / 2.0;

        let (x_min, y_min) = letterbox.unmap(cx - half_w, cy - half_h);
        let (x_max, y_max) = letterbox.unmap(cx + half_w, cy + half_h);

        candidates.push(RawDetection {
            bbox: [x_min, y_min, x_max, y_max],
            confidence: confidence.clamp(0.0, 1.0),
            class_id,
        });
    }

    Ok(non_max_suppression(candidates, params.iou_threshold, params.max_detections))
}

pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}
