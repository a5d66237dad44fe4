//! Configuration surface for building an ObsSpace.
//!
//! Loaded from YAML. Validation happens at load time so that an unknown
//! obs type, an inverted window or an unknown distribution is reported
//! before any file is touched.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use obs_engines::{default_compat_range, Hdf5CompatRange};

use crate::distribution::is_known_distribution;
use crate::error::{IngestError, IngestResult};

/// Obs-domain front ends this pipeline recognizes.
pub const OBS_TYPES: &[&str] = &[
    "Radiance",
    "Radiosonde",
    "SeaIceFraction",
    "StericHeight",
    "SeaIceThickness",
    "Aod",
];

/// Top-level ObsSpace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    /// Chooses the obs-domain front end; must be one of [`OBS_TYPES`].
    pub obs_type: String,
    pub window: WindowConfig,
    #[serde(default = "default_distribution")]
    pub distribution: String,
    #[serde(default)]
    pub obsdatain: Option<ObsFileConfig>,
    #[serde(default)]
    pub obsdataout: Option<ObsFileConfig>,
    #[serde(default)]
    pub engine: EngineOptions,
}

/// Assimilation window bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Input or output file location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsFileConfig {
    pub obsfile: PathBuf,
}

/// HDF5-specific engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default = "default_compat_range")]
    pub compatibility_range: Hdf5CompatRange,
    #[serde(default = "default_image_size")]
    pub memory_image_initial_size: usize,
    #[serde(default)]
    pub flush_on_close: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            compatibility_range: default_compat_range(),
            memory_image_initial_size: default_image_size(),
            flush_on_close: false,
        }
    }
}

fn default_distribution() -> String {
    "roundrobin".to_string()
}

fn default_image_size() -> usize {
    obs_engines::hdf5_io::DEFAULT_IMAGE_INCREMENT
}

impl ObsConfig {
    /// Load and validate a config from a YAML file.
    pub fn from_yaml_file(path: &Path) -> IngestResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a config from YAML text.
    pub fn from_yaml_str(text: &str) -> IngestResult<Self> {
        let config: ObsConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if !OBS_TYPES.contains(&self.obs_type.as_str()) {
            return Err(IngestError::InvalidConfig(format!(
                "unknown obs type: '{}'",
                self.obs_type
            )));
        }
        if self.window.begin >= self.window.end {
            return Err(IngestError::InvalidConfig(format!(
                "window begin {} is not before window end {}",
                self.window.begin, self.window.end
            )));
        }
        if !is_known_distribution(&self.distribution) {
            return Err(IngestError::InvalidConfig(format!(
                "unknown distribution: '{}'",
                self.distribution
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_YAML: &str = "\
obs_type: Radiosonde
window:
  begin: 2018-04-14T21:00:00Z
  end: 2018-04-15T03:00:00Z
obsdatain:
  obsfile: testinput/sonde.nc
";

    #[test]
    fn test_parse_minimal_config() {
        let config = ObsConfig::from_yaml_str(GOOD_YAML).unwrap();
        assert_eq!(config.obs_type, "Radiosonde");
        assert_eq!(config.distribution, "roundrobin");
        assert_eq!(
            config.obsdatain.unwrap().obsfile,
            PathBuf::from("testinput/sonde.nc")
        );
        assert!(config.obsdataout.is_none());
    }

    #[test]
    fn test_unknown_obs_type() {
        let yaml = GOOD_YAML.replace("Radiosonde", "Seismograph");
        assert!(matches!(
            ObsConfig::from_yaml_str(&yaml),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_distribution() {
        let yaml = format!("{}distribution: scatter\n", GOOD_YAML);
        assert!(matches!(
            ObsConfig::from_yaml_str(&yaml),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_inverted_window() {
        let yaml = GOOD_YAML
            .replace("2018-04-14T21:00:00Z", "2018-04-16T00:00:00Z");
        assert!(matches!(
            ObsConfig::from_yaml_str(&yaml),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_engine_options() {
        let yaml = format!(
            "{}engine:\n  compatibility_range: [v18, latest]\n  flush_on_close: true\n",
            GOOD_YAML
        );
        let config = ObsConfig::from_yaml_str(&yaml).unwrap();
        assert!(config.engine.flush_on_close);
        assert_eq!(
            config.engine.compatibility_range,
            (obs_engines::Hdf5Compat::V18, obs_engines::Hdf5Compat::Latest)
        );
    }
}
