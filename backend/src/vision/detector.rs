use image::DynamicImage;

use crate::vision::class_names::ClassNamesError;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Unexpected model output shape {0:?}")]
    OutputShape(Vec<i64>),
    #[error(transparent)]
    ClassNames(#[from] ClassNamesError),
    #[error("No detection backend available: {0}")]
    Unavailable(String),
}

/// One box as produced by a detector, before label resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// `[x_min, y_min, x_max, y_max]` in pixels of the input image.
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Object-detection capability used by the submission pipeline.
///
/// Implementations are called from the blocking pool, once per image and in
/// submission order.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError>;

    /// Class label for a detector class id.
    fn label(&self, class_id: usize) -> Option<&str>;
}
