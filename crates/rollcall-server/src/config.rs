use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Decoded pixels may take this many times `max_image_bytes`.
const DECODE_EXPANSION: u64 = 4;

/// Longest login session accepted from configuration (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Listen address when none is configured.
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Daemon configuration: `ROLLCALL_*` environment variables over an optional
/// TOML file (named by `ROLLCALL_CONFIG`) over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address to listen on.
    pub bind: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Largest Euclidean distance accepted by 1:1 verification.
    pub verify_tolerance: f32,
    /// Identification reports a match only strictly below this distance.
    pub identify_threshold: f32,
    /// Lifetime of a login session.
    pub session_ttl_secs: u64,
    /// bcrypt work factor for new password hashes.
    pub bcrypt_cost: u32,
    /// Secret used to seal stored face templates; `None` stores them plain.
    pub template_key: Option<String>,
    /// Add `Secure` to the session cookie.
    pub cookie_secure: bool,
    /// Largest decoded face image accepted.
    pub max_image_bytes: usize,
}

/// Keys accepted in the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub db_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub verify_tolerance: Option<f32>,
    pub identify_threshold: Option<f32>,
    pub session_ttl_secs: Option<u64>,
    pub bcrypt_cost: Option<u32>,
    pub template_key: Option<String>,
    pub cookie_secure: Option<bool>,
    pub max_image_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            db_path: rollcall_core::data_home().join("rollcall").join("rollcall.db"),
            model_dir: rollcall_core::default_model_dir(),
            verify_tolerance: 1.10,
            identify_threshold: 1.00,
            session_ttl_secs: 12 * 60 * 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            template_key: None,
            cookie_secure: false,
            max_image_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load from the process environment (and `ROLLCALL_CONFIG`, if set).
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => FileConfig::read(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Layer `env` over `file` over the defaults.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let template_key = env("ROLLCALL_TEMPLATE_KEY")
            .or(file.template_key)
            .filter(|k| !k.is_empty());

        Self {
            bind: env("ROLLCALL_BIND").or(file.bind).unwrap_or(d.bind),
            db_path: env("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or(d.db_path),
            model_dir: env("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or(d.model_dir),
            verify_tolerance: layered(&env, "ROLLCALL_VERIFY_TOLERANCE", file.verify_tolerance, d.verify_tolerance),
            identify_threshold: layered(
                &env,
                "ROLLCALL_IDENTIFY_THRESHOLD",
                file.identify_threshold,
                d.identify_threshold,
            ),
            session_ttl_secs: capped_ttl(layered(
                &env,
                "ROLLCALL_SESSION_TTL_SECS",
                file.session_ttl_secs,
                d.session_ttl_secs,
            )),
            bcrypt_cost: layered(&env, "ROLLCALL_BCRYPT_COST", file.bcrypt_cost, d.bcrypt_cost),
            template_key,
            cookie_secure: env("ROLLCALL_COOKIE_SECURE")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(file.cookie_secure)
                .unwrap_or(d.cookie_secure),
            max_image_bytes: layered(&env, "ROLLCALL_MAX_IMAGE_BYTES", file.max_image_bytes, d.max_image_bytes),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Largest pixel buffer a capture may decode into.
    pub fn max_decoded_bytes(&self) -> u64 {
        u64::try_from(self.max_image_bytes)
            .unwrap_or(u64::MAX)
            .saturating_mul(DECODE_EXPANSION)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = self.session_ttl_secs.min(MAX_SESSION_TTL_SECS);
        chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(0)).unwrap_or(chrono::Duration::zero())
    }
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

// An unparsable environment value is ignored with a warning.
fn layered<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, file: Option<T>, default: T) -> T {
    if let Some(raw) = env(key) {
        match raw.trim().parse() {
            Ok(v) => return v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
    file.unwrap_or(default)
}

fn capped_ttl(secs: u64) -> u64 {
    if secs > MAX_SESSION_TTL_SECS {
        tracing::warn!(secs, max = MAX_SESSION_TTL_SECS, "session ttl too long, capping");
    }
    secs.min(MAX_SESSION_TTL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(FileConfig::default(), env_of(&[]));
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.verify_tolerance, 1.10);
        assert_eq!(config.identify_threshold, 1.00);
        assert_eq!(config.session_ttl_secs, 43_200);
        assert_eq!(config.bcrypt_cost, 12);
        assert!(config.template_key.is_none());
        assert!(!config.cookie_secure);
        assert_eq!(config.max_image_bytes, 8 * 1024 * 1024);
        assert!(config.db_path.ends_with("rollcall/rollcall.db"));
    }

    #[test]
    fn test_session_ttl_is_capped() {
        let config = Config::from_sources(
            FileConfig::default(),
            env_of(&[("ROLLCALL_SESSION_TTL_SECS", "1000000000000000")]),
        );
        assert_eq!(config.session_ttl_secs, MAX_SESSION_TTL_SECS);
        assert_eq!(config.session_ttl().num_days(), 3650);

        let wild = Config {
            session_ttl_secs: u64::MAX,
            ..Config::default()
        };
        assert_eq!(wild.session_ttl().num_days(), 3650);
    }

    #[test]
    fn test_env_wins_over_file() {
        let file: FileConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:8080"
            verify_tolerance = 0.9
            bcrypt_cost = 10
            cookie_secure = true
            "#,
        )
        .unwrap();
        let config = Config::from_sources(
            file,
            env_of(&[("ROLLCALL_BIND", "127.0.0.1:9000"), ("ROLLCALL_COOKIE_SECURE", "0")]),
        );
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.verify_tolerance, 0.9);
        assert_eq!(config.bcrypt_cost, 10);
        assert!(!config.cookie_secure);
    }

    #[test]
    fn test_bad_env_value_falls_back() {
        let file = FileConfig {
            identify_threshold: Some(0.8),
            ..Default::default()
        };
        let config = Config::from_sources(
            file,
            env_of(&[("ROLLCALL_IDENTIFY_THRESHOLD", "strict"), ("ROLLCALL_SESSION_TTL_SECS", "60")]),
        );
        assert_eq!(config.identify_threshold, 0.8);
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.session_ttl(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_empty_template_key_means_plain() {
        let config = Config::from_sources(FileConfig::default(), env_of(&[("ROLLCALL_TEMPLATE_KEY", "")]));
        assert!(config.template_key.is_none());
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "camera_device = \"/dev/video0\"\n").unwrap();
        assert!(matches!(FileConfig::read(&path), Err(ConfigError::Toml { .. })));
        assert!(matches!(
            FileConfig::read(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_model_paths() {
        let config = Config {
            model_dir: PathBuf::from("/opt/models"),
            ..Default::default()
        };
        assert_eq!(config.detector_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(config.recognizer_model_path(), "/opt/models/w600k_r50.onnx");
    }
}
