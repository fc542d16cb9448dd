use std::path::Path;

use image::DynamicImage;
use ndarray::ArrayView2;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use crate::config::DetectionParams;
use crate::vision::class_names::ClassNames;
use crate::vision::detector::{Detector, DetectorError, RawDetection};
use crate::vision::yolo::{decode_predictions, letterbox};

/// YOLO detector running on the `rten` runtime. Expects an ONNX export
/// converted with `rten-convert yolo11m.onnx`.
pub struct RtenYoloDetector {
    model: Model,
    names: ClassNames,
    params: DetectionParams,
}

impl RtenYoloDetector {
    pub fn load(
        model_path: &Path,
        names: ClassNames,
        params: DetectionParams,
    ) -> Result<Self, DetectorError> {
        let model = Model::load_file(model_path).map_err(|e| {
            DetectorError::Model(format!("cannot load {}: {}", model_path.display(), e))
        })?;

        log::info!(
            "Loaded rten model {} ({} classes)",
            model_path.display(),
            names.num_classes()
        );

        Ok(Self {
            model,
            names,
            params,
        })
    }
}

impl Detector for RtenYoloDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError> {
        let size = self.params.input_size as usize;
        let (data, geometry) = letterbox(image, self.params.input_size)?;
        let input = NdTensor::from_data([1, 3, size, size], data);

        let value = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| DetectorError::Model(e.to_string()))?;
        let output = NdTensor::<f32, 3>::try_from(value)
            .map_err(|e| DetectorError::Model(e.to_string()))?;

        let [batch, rows, anchors] = output.shape();
        let shape = vec![batch as i64, rows as i64, anchors as i64];
        if batch != 1 {
            return Err(DetectorError::OutputShape(shape));
        }

        let values = output.to_vec();
        let view = ArrayView2::from_shape((rows, anchors), &values)
            .map_err(|_| DetectorError::OutputShape(shape))?;

        decode_predictions(view, &geometry, &self.params)
    }

    fn label(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id)
    }
}
