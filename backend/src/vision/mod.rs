pub mod annotate;
pub mod class_names;
pub mod detector;
#[cfg(feature = "rten")]
pub mod rten_model;
#[cfg(feature = "torch")]
pub mod torch_model;
pub mod yolo;

use std::sync::Arc;

pub use annotate::Annotator;
pub use class_names::ClassNames;
pub use detector::{Detector, DetectorError, RawDetection};

use crate::config::BackendConfig;

#[cfg(any(feature = "torch", feature = "rten"))]
fn class_names(config: &BackendConfig) -> Result<ClassNames, DetectorError> {
    match &config.class_names_path {
        Some(path) => Ok(ClassNames::load(path)?),
        None => Ok(ClassNames::coco()),
    }
}

/// Builds the detector selected at compile time.
#[cfg(feature = "torch")]
pub fn load_detector(config: &BackendConfig) -> Result<Arc<dyn Detector>, DetectorError> {
    let detector = torch_model::TorchYoloDetector::load(
        &config.model_path,
        class_names(config)?,
        config.detection.clone(),
    )?;
    Ok(Arc::new(detector))
}

/// Builds the detector selected at compile time.
#[cfg(all(feature = "rten", not(feature = "torch")))]
pub fn load_detector(config: &BackendConfig) -> Result<Arc<dyn Detector>, DetectorError> {
    let detector = rten_model::RtenYoloDetector::load(
        &config.model_path,
        class_names(config)?,
        config.detection.clone(),
    )?;
    Ok(Arc::new(detector))
}

#[cfg(not(any(feature = "torch", feature = "rten")))]
pub fn load_detector(config: &BackendConfig) -> Result<Arc<dyn Detector>, DetectorError> {
    Err(DetectorError::Unavailable(format!(
        "cannot load {}: backend was built without a detector feature (`rten` or `torch`)",
        config.model_path.display()
    )))
}
