use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use thiserror::Error;

use crate::plate_detection::region_render::DEFAULT_WINDOW_TITLE;
use crate::plate_detection::PreprocessParams;
use crate::plate_detection::RegionGeometry;

pub const DEFAULT_CONFIG_FILE: &str = "plate_gate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config file {} does not exist", path.display())]
    NotFound { path: PathBuf },
    #[error("invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Values accepted from `plate_gate.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_index: Option<i32>,
    video_file: Option<PathBuf>,
    video_fps: Option<u32>,
    tessdata: Option<PathBuf>,
    language: Option<String>,
    debounce_ms: Option<u64>,
    region_width_pct: Option<u32>,
    region_height_pct: Option<u32>,
    bilateral_diameter: Option<i32>,
    sigma_color: Option<f64>,
    sigma_space: Option<f64>,
    binary_threshold: Option<u8>,
    registry: Option<PathBuf>,
    headless: Option<bool>,
    window_title: Option<String>,
}

/// Flags of the `scan` command. They win over the config file.
#[derive(Debug, Default, Clone, Args)]
pub struct ScanArgs {
    /// Capture device index
    #[arg(long = "camera")]
    pub camera_index: Option<i32>,

    /// Read frames from a video file instead of a camera
    #[arg(long = "video-file", value_name = "FILE")]
    pub video_file: Option<PathBuf>,

    /// Playback rate for --video-file
    #[arg(long = "video-fps")]
    pub video_fps: Option<u32>,

    /// Directory holding the tesseract language data
    #[arg(long = "tessdata", value_name = "DIR")]
    pub tessdata: Option<PathBuf>,

    /// Tesseract language
    #[arg(long = "language")]
    pub language: Option<String>,

    /// Minimum time between two recognition attempts
    #[arg(long = "debounce-ms")]
    pub debounce_ms: Option<u64>,

    /// Luminance cut used to binarize the plate window (0-255)
    #[arg(long = "threshold")]
    pub binary_threshold: Option<u8>,

    /// Run without a preview window
    #[arg(long = "headless")]
    pub headless: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub camera_index: i32,
    pub video_file: Option<PathBuf>,
    pub video_fps: u32,
    pub tessdata: Option<PathBuf>,
    pub language: String,
    pub debounce: Duration,
    pub geometry: RegionGeometry,
    pub preprocess: PreprocessParams,
    pub registry: PathBuf,
    pub headless: bool,
    pub window_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_index: 0,
            video_file: None,
            video_fps: 20,
            tessdata: None,
            language: "eng".to_string(),
            debounce: Duration::from_millis(600),
            geometry: RegionGeometry::default(),
            preprocess: PreprocessParams::default(),
            registry: PathBuf::from("plates.toml"),
            headless: false,
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
        }
    }
}

impl Settings {
    /// Loads `config` (or `plate_gate.toml` when present) and applies `args` on top.
    pub fn resolve(config: Option<&Path>, args: &ScanArgs) -> Result<Self, ConfigError> {
        let file = load_config(config)?;
        let mut settings = Self::default();
        settings.apply_file(file);
        settings.apply_args(args);
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from the config file alone, for commands without scan flags.
    pub fn from_file(config: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve(config, &ScanArgs::default())
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(index) = file.camera_index {
            self.camera_index = index;
        }
        if file.video_file.is_some() {
            self.video_file = file.video_file;
        }
        if let Some(fps) = file.video_fps {
            self.video_fps = fps;
        }
        if file.tessdata.is_some() {
            self.tessdata = file.tessdata;
        }
        if let Some(language) = file.language {
            self.language = language;
        }
        if let Some(ms) = file.debounce_ms {
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(pct) = file.region_width_pct {
            self.geometry.width_pct = pct;
        }
        if let Some(pct) = file.region_height_pct {
            self.geometry.height_pct = pct;
        }
        if let Some(diameter) = file.bilateral_diameter {
            self.preprocess.bilateral_diameter = diameter;
        }
        if let Some(sigma) = file.sigma_color {
            self.preprocess.sigma_color = sigma;
        }
        if let Some(sigma) = file.sigma_space {
            self.preprocess.sigma_space = sigma;
        }
        if let Some(threshold) = file.binary_threshold {
            self.preprocess.binary_threshold = threshold;
        }
        if let Some(registry) = file.registry {
            self.registry = registry;
        }
        if let Some(headless) = file.headless {
            self.headless = headless;
        }
        if let Some(title) = file.window_title {
            self.window_title = title;
        }
    }

    fn apply_args(&mut self, args: &ScanArgs) {
        if let Some(index) = args.camera_index {
            self.camera_index = index;
        }
        if let Some(path) = &args.video_file {
            self.video_file = Some(path.clone());
        }
        if let Some(fps) = args.video_fps {
            self.video_fps = fps;
        }
        if let Some(path) = &args.tessdata {
            self.tessdata = Some(path.clone());
        }
        if let Some(language) = &args.language {
            self.language = language.clone();
        }
        if let Some(ms) = args.debounce_ms {
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(threshold) = args.binary_threshold {
            self.preprocess.binary_threshold = threshold;
        }
        if args.headless {
            self.headless = true;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.video_fps == 0 {
            return Err(invalid("video_fps", self.video_fps));
        }
        if !(1..=100).contains(&self.geometry.width_pct) {
            return Err(invalid("region_width_pct", self.geometry.width_pct));
        }
        if !(1..=100).contains(&self.geometry.height_pct) {
            return Err(invalid("region_height_pct", self.geometry.height_pct));
        }
        if self.preprocess.bilateral_diameter <= 0 {
            return Err(invalid(
                "bilateral_diameter",
                self.preprocess.bilateral_diameter,
            ));
        }
        if !positive(self.preprocess.sigma_color) {
            return Err(invalid("sigma_color", self.preprocess.sigma_color));
        }
        if !positive(self.preprocess.sigma_space) {
            return Err(invalid("sigma_space", self.preprocess.sigma_space));
        }
        if self.language.trim().is_empty() {
            return Err(invalid("language", &self.language));
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn load_config(path_override: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = match path_override {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default_path.exists() {
                return Ok(FileConfig::default());
            }
            default_path
        }
    };

    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate_gate.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_match_the_scanner_constants() {
        let settings = Settings::default();
        assert_eq!(settings.camera_index, 0);
        assert_eq!(settings.debounce, Duration::from_millis(600));
        assert_eq!(settings.geometry, RegionGeometry::default());
        assert_eq!(settings.preprocess, PreprocessParams::default());
    }

    #[test]
    fn file_values_are_applied() {
        let (_dir, path) = write_config(
            "camera_index = 2\ndebounce_ms = 250\nregistry = \"gate.toml\"\nbinary_threshold = 120\n",
        );
        let settings = Settings::from_file(Some(&path)).unwrap();
        assert_eq!(settings.camera_index, 2);
        assert_eq!(settings.debounce, Duration::from_millis(250));
        assert_eq!(settings.registry, PathBuf::from("gate.toml"));
        assert_eq!(settings.preprocess.binary_threshold, 120);
    }

    #[test]
    fn flags_override_file() {
        let (_dir, path) = write_config("camera_index = 2\nheadless = false\n");
        let args = ScanArgs {
            camera_index: Some(1),
            headless: true,
            ..ScanArgs::default()
        };
        let settings = Settings::resolve(Some(&path), &args).unwrap();
        assert_eq!(settings.camera_index, 1);
        assert!(settings.headless);
    }

    #[test]
    fn invalid_values_name_the_field() {
        let (_dir, path) = write_config("region_width_pct = 0\n");
        let err = Settings::from_file(Some(&path)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "region_width_pct",
                ..
            }
        ));
    }

    #[test]
    fn filter_sigmas_must_be_positive() {
        for (contents, field) in [
            ("sigma_color = 0.0\n", "sigma_color"),
            ("sigma_space = -3.5\n", "sigma_space"),
        ] {
            let (_dir, path) = write_config(contents);
            match Settings::from_file(Some(&path)) {
                Err(ConfigError::InvalidValue { field: got, .. }) => assert_eq!(got, field),
                other => panic!("{contents:?} was accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (_dir, path) = write_config("camera = 3\n");
        assert!(matches!(
            Settings::from_file(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::from_file(Some(Path::new("/nonexistent/plate_gate.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
