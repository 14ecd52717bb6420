//! Configuration types for extraction, sampling, writing and routing.
//!
//! Every setting is passed explicitly at call time. [`AppConfig`] groups them
//! so a TOML file can configure the command-line tool in one place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MicroImgError, Result};

/// Default payload copy chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: u64 = 25_600_000;

/// Default XY size above which FolderIndex/SingleImage images get converted.
pub const DEFAULT_XY_THRESHOLD: u32 = 3192;

/// Default fraction of rows read by the intensity sampler.
pub const DEFAULT_SAMPLE_FRACTION: f64 = 0.1;

/// Settings for preview extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Output height of preview planes in pixels.
    pub preview_height: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { preview_height: 512 }
    }
}

/// How the sampler reads its strided rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleStrategy {
    /// One partial memory mapping over the plane.
    #[default]
    Mapped,
    /// One seek + read per retained row.
    Seek,
}

/// Settings for the intensity sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Fraction of rows to read, in `(0, 1]`.
    pub sample_fraction: f64,
    /// Row read strategy.
    pub strategy: SampleStrategy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_fraction: DEFAULT_SAMPLE_FRACTION,
            strategy: SampleStrategy::Mapped,
        }
    }
}

impl SamplerConfig {
    /// Row stride derived from the sample fraction.
    ///
    /// Fractions outside `(0, 1]` fall back to the default fraction.
    pub fn row_stride(&self) -> usize {
        let fraction = if self.sample_fraction <= 0.0
            || self.sample_fraction > 1.0
            || !self.sample_fraction.is_finite()
        {
            DEFAULT_SAMPLE_FRACTION
        } else {
            self.sample_fraction
        };
        ((1.0 / fraction).round() as usize).max(1)
    }
}

/// Settings for the sub-container writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Payload copy chunk size in bytes.
    pub chunk_size: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Settings for the conversion router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum X and Y size for passing FolderIndex/SingleImage files through.
    pub xy_threshold: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            xy_threshold: DEFAULT_XY_THRESHOLD,
        }
    }
}

/// Output locations for one conversion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Primary output folder. `None` means next to the source file.
    pub output_dir: Option<PathBuf>,
    /// Secondary folder receiving a byte-for-byte copy.
    pub alt_output_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Output into the given folder.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
            alt_output_dir: None,
        }
    }

    /// Also copy results into a secondary folder.
    pub fn with_alt(mut self, alt: impl Into<PathBuf>) -> Self {
        self.alt_output_dir = Some(alt.into());
        self
    }

    /// Resolve the primary folder for a given source file.
    pub fn resolve_output_dir(&self, source: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Grouped configuration for the command-line tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Preview extraction settings.
    pub extract: ExtractConfig,
    /// Sampler settings.
    pub sampler: SamplerConfig,
    /// Writer settings.
    pub writer: WriterConfig,
    /// Router settings.
    pub router: RouterConfig,
}

impl AppConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MicroImgError::Config(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.writer.chunk_size == 0 {
            return Err(MicroImgError::Config("writer.chunk_size must be > 0".into()));
        }
        if self.extract.preview_height == 0 {
            return Err(MicroImgError::Config(
                "extract.preview_height must be > 0".into(),
            ));
        }
        Ok(())
    }
}
