use crate::request::{FanOutPolicy, InferenceOptions};
use common::config::env_or;
use media::video::{DEFAULT_EXTRACTION_TIMEOUT, default_backend};
use media::{ClassifyOptions, FrameExtractor, InputClassifier};
use std::env;
use std::time::Duration;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub log_level: String,
    pub fps: f64,
    pub input_size: (u32, u32),
    pub normalize: bool,
    pub labels: Vec<String>,
    pub fan_out_policy: FanOutPolicy,
    pub max_in_flight: Option<usize>,
    pub extraction_timeout: Duration,
    pub detector_model_path: Option<String>,
    pub confidence_threshold: f32,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let environment = Environment::from_env();
        let defaults = InferenceOptions::default();

        let labels = env::var("LABELS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let fan_out_policy = env::var("FAN_OUT_POLICY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let max_in_flight = env::var("MAX_IN_FLIGHT")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);

        let extraction_timeout = Duration::from_millis(env_or(
            "EXTRACTION_TIMEOUT_MS",
            DEFAULT_EXTRACTION_TIMEOUT.as_millis() as u64,
        ));

        let detector_model_path = env::var("DETECTOR_MODEL_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            environment,
            log_level: env_or("LOG_LEVEL", "info".to_string()),
            fps: env_or("FPS", ClassifyOptions::default().fps),
            input_size: (
                env_or("INPUT_WIDTH", defaults.target_width),
                env_or("INPUT_HEIGHT", defaults.target_height),
            ),
            normalize: env_or("NORMALIZE", defaults.normalize),
            labels,
            fan_out_policy,
            max_in_flight,
            extraction_timeout,
            detector_model_path,
            confidence_threshold: env_or("CONFIDENCE_THRESHOLD", 0.5),
        }
    }

    pub fn inference_options(&self) -> InferenceOptions {
        InferenceOptions {
            target_width: self.input_size.0,
            target_height: self.input_size.1,
            normalize: self.normalize,
            labels: self.labels.clone(),
        }
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions { fps: self.fps }
    }

    /// Input classifier with the compiled-in video backend and the configured
    /// extraction timeout.
    pub fn input_classifier(&self) -> InputClassifier {
        InputClassifier::new(default_backend(), FrameExtractor::new(self.extraction_timeout))
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "debug".to_string(),
            fps: 1.0,
            input_size: (224, 224),
            normalize: true,
            labels: Vec::new(),
            fan_out_policy: FanOutPolicy::FailFast,
            max_in_flight: None,
            extraction_timeout: Duration::from_secs(10),
            detector_model_path: None,
            confidence_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 9] = [
        "LOG_LEVEL",
        "FPS",
        "INPUT_WIDTH",
        "LABELS",
        "FAN_OUT_POLICY",
        "MAX_IN_FLIGHT",
        "EXTRACTION_TIMEOUT_MS",
        "DETECTOR_MODEL_PATH",
        "CONFIDENCE_THRESHOLD",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = InferenceConfig::from_env();
        let expected = InferenceConfig::test_default();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.fps, expected.fps);
        assert_eq!(config.input_size, expected.input_size);
        assert!(config.labels.is_empty());
        assert_eq!(config.fan_out_policy, FanOutPolicy::FailFast);
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.extraction_timeout, expected.extraction_timeout);
        assert!(config.detector_model_path.is_none());
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        clear_env();
        unsafe {
            env::set_var("FPS", "2.5");
            env::set_var("INPUT_WIDTH", "128");
            env::set_var("LABELS", "cat, dog,,bird ");
            env::set_var("FAN_OUT_POLICY", "collect-partial");
            env::set_var("MAX_IN_FLIGHT", "4");
            env::set_var("EXTRACTION_TIMEOUT_MS", "250");
            env::set_var("DETECTOR_MODEL_PATH", "/models/detr.onnx");
        }

        let config = InferenceConfig::from_env();
        clear_env();

        assert_eq!(config.fps, 2.5);
        assert_eq!(config.input_size, (128, 224));
        assert_eq!(config.labels, vec!["cat", "dog", "bird"]);
        assert_eq!(config.fan_out_policy, FanOutPolicy::CollectPartial);
        assert_eq!(config.max_in_flight, Some(4));
        assert_eq!(config.extraction_timeout, Duration::from_millis(250));
        assert_eq!(config.detector_model_path.as_deref(), Some("/models/detr.onnx"));
        assert_eq!(config.inference_options().labels.len(), 3);
        assert_eq!(config.classify_options().fps, 2.5);
    }

    #[test]
    #[serial]
    fn test_zero_in_flight_means_unbounded() {
        clear_env();
        unsafe { env::set_var("MAX_IN_FLIGHT", "0") };
        let config = InferenceConfig::from_env();
        clear_env();

        assert_eq!(config.max_in_flight, None);
    }
}
