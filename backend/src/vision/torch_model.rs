use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ndarray::ArrayView2;
use tch::{CModule, Device, Kind, Tensor};

use crate::config::DetectionParams;
use crate::vision::class_names::ClassNames;
use crate::vision::detector::{Detector, DetectorError, RawDetection};
use crate::vision::yolo::{decode_predictions, letterbox};

/// YOLO detector backed by a TorchScript export (`yolo export format=torchscript`).
pub struct TorchYoloDetector {
    model: Mutex<CModule>,
    device: Device,
    names: ClassNames,
    params: DetectionParams,
}

impl TorchYoloDetector {
    pub fn load(
        model_path: &Path,
        names: ClassNames,
        params: DetectionParams,
    ) -> Result<Self, DetectorError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device)
            .map_err(|e| DetectorError::Model(e.to_string()))?;

        log::info!(
            "Loaded TorchScript model {} on {:?} ({} classes)",
            model_path.display(),
            device,
            names.num_classes()
        );

        Ok(Self {
            model: Mutex::new(model),
            device,
            names,
            params,
        })
    }
}

impl Detector for TorchYoloDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError> {
        let size = self.params.input_size as i64;
        let (data, geometry) = letterbox(image, self.params.input_size)?;
        let input = Tensor::from_slice(&data)
            .view([1, 3, size, size])
            .to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| DetectorError::Model("model lock poisoned".to_string()))?;
            tch::no_grad(|| model.forward_ts(&[input]))
        }
        .map_err(|e| DetectorError::Model(e.to_string()))?;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(DetectorError::OutputShape(shape));
        }
        let (rows, anchors) = (shape[1] as usize, shape[2] as usize);

        let flat = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .view([-1]);
        let values = Vec::<f32>::try_from(flat).map_err(|e| DetectorError::Model(e.to_string()))?;
        let view = ArrayView2::from_shape((rows, anchors), &values)
            .map_err(|_| DetectorError::OutputShape(shape.clone()))?;

        decode_predictions(view, &geometry, &self.params)
    }

    fn label(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id)
    }
}
