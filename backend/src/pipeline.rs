use std::io::Cursor;
use std::sync::Arc;

use actix_web::web::{self, Bytes};
use image::{DynamicImage, ImageFormat, ImageReader};
use shared::{BoundingBox, Detection, ImageResult};
use uuid::Uuid;

use crate::store::{ResultStore, StoredImage};
use crate::vision::annotate::encode_png;
use crate::vision::{Annotator, Detector, DetectorError};

/// One file of a submitted batch.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No images were submitted")]
    EmptyBatch,
    #[error("Failed to decode {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Detection failed for {filename}: {source}")]
    Detection {
        filename: String,
        #[source]
        source: DetectorError,
    },
    #[error("Detector returned unknown class id {class_id} for {filename}")]
    UnknownClass { filename: String, class_id: usize },
    #[error("Failed to encode annotated {filename}: {source}")]
    Encode {
        filename: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Detection worker failed: {0}")]
    Worker(String),
}

/// Per-image outputs of a batch, held back until the whole batch succeeds.
#[derive(Debug, Default)]
pub struct ProcessedBatch {
    pub results: Vec<ImageResult>,
    pub images: Vec<StoredImage>,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    annotator: Arc<Annotator>,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, annotator: Arc<Annotator>) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    /// Runs detection over the batch and commits it to `store`.
    ///
    /// Nothing is written to the store unless every image succeeds. Returns
    /// the full aggregated log, not only this batch.
    pub async fn submit(
        &self,
        store: &ResultStore,
        images: Vec<UploadedImage>,
    ) -> Result<Vec<ImageResult>, PipelineError> {
        if images.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let batch_id = Uuid::new_v4();
        log::info!("[batch {}] received {} image(s)", batch_id, images.len());

        let detector = self.detector.clone();
        let annotator = self.annotator.clone();
        let batch = web::block(move || {
            process_batch(batch_id, detector.as_ref(), annotator.as_ref(), images)
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
        .inspect_err(|e| log::error!("[batch {}] {}", batch_id, e))?;

        let log = store.commit_batch(batch.results, batch.images).await;
        log::info!("[batch {}] committed, {} result(s) in store", batch_id, log.len());
        Ok(log)
    }
}

pub fn process_batch(
    batch_id: Uuid,
    detector: &dyn Detector,
    annotator: &Annotator,
    images: Vec<UploadedImage>,
) -> Result<ProcessedBatch, PipelineError> {
    let mut batch = ProcessedBatch::default();

    for upload in images {
        log::info!("[batch {}] processing file: {}", batch_id, upload.filename);
        let (result, image) = process_image(detector, annotator, upload)?;
        log::debug!(
            "[batch {}] {} -> {} detection(s)",
            batch_id,
            result.filename,
            result.detections.len()
        );
        batch.results.push(result);
        batch.images.push(image);
    }

    Ok(batch)
}

pub fn process_image(
    detector: &dyn Detector,
    annotator: &Annotator,
    upload: UploadedImage,
) -> Result<(ImageResult, StoredImage), PipelineError> {
    let filename = upload.filename.clone();

    let decoded = decode_image(&upload).map_err(|source| PipelineError::Decode {
        filename: filename.clone(),
        source,
    })?;

    let raw = detector
        .detect(&decoded)
        .map_err(|source| PipelineError::Detection {
            filename: filename.clone(),
            source,
        })?;

    let detections = raw
        .into_iter()
        .map(|det| {
            let label = detector
                .label(det.class_id)
                .ok_or_else(|| PipelineError::UnknownClass {
                    filename: filename.clone(),
                    class_id: det.class_id,
                })?;
            let [x1, y1, x2, y2] = det.bbox;
            Ok(Detection::new(
                BoundingBox::from_corners(x1, y1, x2, y2),
                det.confidence,
                label,
            ))
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let annotated = annotator.annotate(&decoded, &detections);
    let png = encode_png(annotated).map_err(|source| PipelineError::Encode {
        filename: filename.clone(),
        source,
    })?;

    Ok((
        ImageResult {
            filename: filename.clone(),
            detections,
        },
        StoredImage {
            filename,
            png: Bytes::from(png),
        },
    ))
}

/// Sniffs the format from the payload; the declared content type is only
/// used when sniffing finds nothing.
fn decode_image(upload: &UploadedImage) -> Result<DynamicImage, image::ImageError> {
    let mut reader = ImageReader::new(Cursor::new(upload.bytes.as_ref())).with_guessed_format()?;
    if reader.format().is_none() {
        if let Some(format) = upload
            .content_type
            .as_deref()
            .and_then(ImageFormat::from_mime_type)
        {
            reader.set_format(format);
        }
    }
    reader.decode()
}
