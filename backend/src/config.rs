use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use url::{Origin, Url};

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8001,http://127.0.0.1:8001";

#[cfg(feature = "torch")]
const DEFAULT_MODEL_PATH: &str = "yolo11m.torchscript";
#[cfg(not(feature = "torch"))]
const DEFAULT_MODEL_PATH: &str = "yolo11m.rten";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be within {range}, got {value}")]
    OutOfRange {
        key: &'static str,
        range: &'static str,
        value: String,
    },
    #[error("Invalid CORS origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// Tunables for the YOLO decoding stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub bind_host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub detection: DetectionParams,
}

impl BackendConfig {
    /// Reads the service configuration from the process environment.
    /// Call `dotenv::dotenv()` first to pick up a local `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DetectionParams::default();

        let bind_host = lookup("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8000u16)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(parse_origin)
            .collect::<Result<Vec<_>, _>>()?;

        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let class_names_path = lookup("CLASS_NAMES_PATH").map(PathBuf::from);
        let font_path = lookup("FONT_PATH").map(PathBuf::from);

        let confidence_threshold =
            parse_or(&lookup, "CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?;
        check_unit_interval("CONFIDENCE_THRESHOLD", confidence_threshold)?;
        let iou_threshold = parse_or(&lookup, "IOU_THRESHOLD", defaults.iou_threshold)?;
        check_unit_interval("IOU_THRESHOLD", iou_threshold)?;

        let input_size = parse_or(&lookup, "MODEL_INPUT_SIZE", defaults.input_size)?;
        if input_size == 0 || input_size % 32 != 0 {
            return Err(ConfigError::OutOfRange {
                key: "MODEL_INPUT_SIZE",
                range: "positive multiples of 32",
                value: input_size.to_string(),
            });
        }

        let max_detections = parse_or(&lookup, "MAX_DETECTIONS", defaults.max_detections)?;

        Ok(Self {
            bind_host,
            port,
            cors_origins,
            model_path,
            class_names_path,
            font_path,
            detection: DetectionParams {
                input_size,
                confidence_threshold,
                iou_threshold,
                max_detections,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

/// Normalises one `CORS_ORIGINS` entry to the form browsers send in the
/// `Origin` header. `*` allows any origin.
fn parse_origin(raw: &str) -> Result<String, ConfigError> {
    if raw == "*" {
        return Ok(raw.to_string());
    }

    let invalid = |reason: String| ConfigError::InvalidOrigin {
        origin: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("an origin cannot carry a path or query".to_string()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("an origin cannot carry credentials".to_string()));
    }

    match url.origin() {
        origin @ Origin::Tuple(..) => Ok(origin.ascii_serialization()),
        Origin::Opaque(_) => Err(invalid("opaque origin".to_string())),
    }
}

fn check_unit_interval(key: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key,
            range: "[0, 1]",
            value: value.to_string(),
        })
    }
}
