use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

#[derive(Debug, thiserror::Error)]
pub enum ClassNamesError {
    #[error("Failed to read class names file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse class names: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Class names file does not define any names")]
    Empty,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamesSpec {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

/// Dataset description in the Ultralytics layout; only `names` is used.
#[derive(Debug, Deserialize)]
struct DatasetConfig {
    names: NamesSpec,
}

/// Class id to label mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNames(BTreeMap<usize, String>);

impl ClassNames {
    pub fn coco() -> Self {
        Self(
            COCO_CLASSES
                .iter()
                .enumerate()
                .map(|(id, name)| (id, name.to_string()))
                .collect(),
        )
    }

    pub fn load(path: &Path) -> Result<Self, ClassNamesError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Accepts `names:` either as a list or as an `id: name` mapping.
    pub fn from_yaml_str(content: &str) -> Result<Self, ClassNamesError> {
        let config: DatasetConfig = serde_yaml::from_str(content)?;
        let names: BTreeMap<usize, String> = match config.names {
            NamesSpec::List(list) => list.into_iter().enumerate().collect(),
            NamesSpec::Map(map) => map,
        };
        if names.is_empty() {
            return Err(ClassNamesError::Empty);
        }
        Ok(Self(names))
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(&class_id).map(String::as_str)
    }

    /// Number of classes the model head is expected to score.
    pub fn num_classes(&self) -> usize {
        self.0.keys().next_back().map_or(0, |last| last + 1)
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}
