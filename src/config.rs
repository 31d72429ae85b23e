use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("camera source is not configured")]
    NoSource,
    #[error("detector model is not configured")]
    NoModel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    /// Device node (e.g. /dev/video0) or network stream URL
    pub source: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_sample_fps")]
    pub sample_fps: u32,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_sample_fps() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Model path, local file or http(s) URL
    pub model: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_max_labels_per_object")]
    pub max_labels_per_object: usize,
    /// One class name per line; built-in COCO classes when unset
    #[serde(default)]
    pub labels_file: Option<String>,
    #[serde(default)]
    pub allowed_labels: Vec<String>,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_max_labels_per_object() -> usize {
    3
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        if config.camera.source.is_empty() {
            return Err(ConfigError::NoSource);
        }
        if config.detector.model.is_empty() {
            return Err(ConfigError::NoModel);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            id = "front"
            source = "/dev/video0"

            [detector]
            model = "model.onnx"
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.sample_fps, 10);
        assert_eq!(config.detector.confidence_threshold, 0.5);
        assert_eq!(config.detector.max_labels_per_object, 3);
        assert!(config.detector.labels_file.is_none());
        assert!(config.detector.allowed_labels.is_empty());
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            id = "door"
            source = "rtsp://cam.local/stream"
            width = 1280
            height = 720
            sample_fps = 5

            [detector]
            model = "https://example.com/model.onnx"
            confidence_threshold = 0.6
            max_labels_per_object = 2
            allowed_labels = ["person", "dog"]

            [http]
            port = 9090
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.detector.max_labels_per_object, 2);
        assert_eq!(config.detector.allowed_labels, vec!["person", "dog"]);
        assert_eq!(config.http.port, 9090);
    }

    #[test]
    fn empty_camera_source_is_rejected() {
        let err = Config::parse(
            r#"
            [camera]
            id = "front"
            source = ""

            [detector]
            model = "model.onnx"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::NoSource));
    }

    #[test]
    fn empty_model_path_is_rejected() {
        let err = Config::parse(
            r#"
            [camera]
            id = "front"
            source = "/dev/video0"

            [detector]
            model = ""
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::NoModel));
    }
}
