use facegate_core::matcher::TriggerPolicy;
use facegate_core::types::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Built from defaults, optionally overlaid with the TOML file named by
/// `FACEGATE_CONFIG`, then with `FACEGATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address (default: 127.0.0.1:8080).
    pub listen_addr: SocketAddr,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Set to false to run without live comparison (enrollment only).
    pub camera_enabled: bool,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Directory containing the ONNX model bundle.
    pub model_dir: PathBuf,
    /// Label attached to every enrollment.
    pub enrollment_label: String,
    /// Euclidean distance below which a live face matches the enrollment.
    ///
    /// The 0.5 default is calibrated for 128-d face-api style descriptors.
    /// The bundled ArcFace provider emits L2-normalised 512-d descriptors,
    /// where the same person typically lands around 0.8 to 1.1 (different
    /// people near 1.3 to 1.4), so with that provider set this to roughly
    /// 1.0 via `FACEGATE_MATCH_THRESHOLD` and lower the trigger percentage
    /// accordingly.
    pub match_threshold: f32,
    /// Match percentage required to mark the session verified.
    pub trigger_percentage: i32,
    /// Match loop tick interval.
    pub poll_interval_ms: u64,
    /// Upper bound on one live detection call.
    pub detect_timeout_ms: u64,
    /// Delay between verification and navigation to the protected route.
    pub redirect_delay_ms: u64,
    /// Secret for signing the verification cookie. Random per process if unset.
    pub cookie_secret: Option<String>,
    /// Mark the verification cookie `Secure` (serve behind TLS).
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            camera_device: "/dev/video0".to_string(),
            camera_enabled: true,
            warmup_frames: 4,
            model_dir: facegate_core::default_model_dir(),
            enrollment_label: "User".to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            trigger_percentage: TriggerPolicy::PERFECT.min_percentage,
            poll_interval_ms: 1000,
            detect_timeout_ms: 5000,
            redirect_delay_ms: 2000,
            cookie_secret: None,
            cookie_secure: false,
        }
    }
}

impl Config {
    /// Load from `FACEGATE_CONFIG` (if set) and `FACEGATE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FACEGATE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from environment-style lookups. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key);

        override_parsed(&mut self.listen_addr, "FACEGATE_LISTEN_ADDR", &get);
        if let Some(v) = get("FACEGATE_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = get("FACEGATE_CAMERA_ENABLED") {
            self.camera_enabled = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        override_parsed(&mut self.warmup_frames, "FACEGATE_WARMUP_FRAMES", &get);
        if let Some(v) = get("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("FACEGATE_ENROLLMENT_LABEL") {
            self.enrollment_label = v;
        }
        override_parsed(&mut self.match_threshold, "FACEGATE_MATCH_THRESHOLD", &get);
        override_parsed(&mut self.trigger_percentage, "FACEGATE_TRIGGER_PERCENTAGE", &get);
        override_parsed(&mut self.poll_interval_ms, "FACEGATE_POLL_INTERVAL_MS", &get);
        override_parsed(&mut self.detect_timeout_ms, "FACEGATE_DETECT_TIMEOUT_MS", &get);
        override_parsed(&mut self.redirect_delay_ms, "FACEGATE_REDIRECT_DELAY_MS", &get);
        if let Some(v) = get("FACEGATE_COOKIE_SECRET") {
            self.cookie_secret = Some(v);
        }
        if let Some(v) = get("FACEGATE_COOKIE_SECURE") {
            self.cookie_secure = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        TriggerPolicy {
            min_percentage: self.trigger_percentage,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

fn override_parsed<T: FromStr>(field: &mut T, key: &str, get: &impl Fn(&str) -> Option<String>) {
    let Some(raw) = get(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *field = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_follow_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.redirect_delay(), Duration::from_millis(2000));
        assert_eq!(config.trigger_policy(), TriggerPolicy::PERFECT);
        assert_eq!(config.enrollment_label, "User");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("FACEGATE_LISTEN_ADDR", "0.0.0.0:9000"),
            ("FACEGATE_MATCH_THRESHOLD", "0.6"),
            ("FACEGATE_TRIGGER_PERCENTAGE", "50"),
            ("FACEGATE_CAMERA_ENABLED", "0"),
            ("FACEGATE_COOKIE_SECRET", "hunter2"),
        ]));
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.trigger_percentage, 50);
        assert!(!config.camera_enabled);
        assert_eq!(config.cookie_secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_arcface_calibration_via_env() {
        use facegate_core::matcher::{EuclideanMatcher, Matcher};
        use facegate_core::{EnrollmentRecord, FaceDescriptor};

        // Same-person ArcFace pair at distance 0.9 on unit vectors.
        let enrolled = EnrollmentRecord::new("User", FaceDescriptor::new(vec![1.0, 0.0]));
        let probe = FaceDescriptor::new(vec![0.595, 0.8037]);

        let defaults = Config::default();
        let result = EuclideanMatcher
            .compare(&probe, &enrolled, defaults.match_threshold)
            .unwrap();
        assert!(!result.is_match);

        let mut tuned = Config::default();
        tuned.apply_env(env(&[
            ("FACEGATE_MATCH_THRESHOLD", "1.0"),
            ("FACEGATE_TRIGGER_PERCENTAGE", "0"),
        ]));
        let result = EuclideanMatcher
            .compare(&probe, &enrolled, tuned.match_threshold)
            .unwrap();
        assert!(result.is_match);
        assert!(tuned.trigger_policy().should_trigger(&result));
    }

    #[test]
    fn test_bad_env_value_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[("FACEGATE_POLL_INTERVAL_MS", "soon")]));
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_toml_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "camera_device = \"/dev/video4\"\nredirect_delay_ms = 500").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.redirect_delay_ms, 500);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_toml_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = \"fast\"").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Parse { .. })));
    }
}
