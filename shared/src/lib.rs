use derive_more::From;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Axis-aligned box in pixel coordinates of the original image.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Builds a box from two corners, swapping coordinates so that
    /// `x_min <= x_max` and `y_min <= y_max` always hold.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x_min: x1.min(x2),
            y_min: y1.min(y2),
            x_max: x1.max(x2),
            y_max: y1.max(y2),
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(rename = "class")]
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_name: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            class_name: class_name.into(),
        }
    }
}

/// Detections for one submitted image, keyed by its upload filename.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageResult {
    pub filename: String,
    pub detections: Vec<Detection>,
}

#[derive(Serialize, Deserialize, Clone, Debug, From)]
pub struct DetectResponse {
    pub all_detections: Vec<ImageResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug, From)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, From)]
pub struct MessageResponse {
    pub message: String,
}

/// Top-level folders of the exported zip bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExportFolder {
    OutputJson,
    OutputImages,
}

impl ExportFolder {
    pub fn entry(&self, name: &str) -> String {
        format!("{}/{}", self, name)
    }
}
