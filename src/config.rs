// Robot configuration: bus endpoint, wheel mapping, motion and scan timing.
//
// All fields have defaults matching the reference hardware; a JSON file can
// override any subset. The wheel role map defaults mirror how the base is
// wired in practice but must be verified per robot (see WheelRoleMap).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bus::scanner::ScanConfig;
use crate::bus::transport::{RetryPolicy, DEFAULT_BAUDRATE};
use crate::chassis::controller::{MotionConfig, WheelRoleMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Serial device for the wheel bus (typically a udev symlink)
    pub port: String,
    pub baud: u32,
    pub wheels: WheelRoleMap,
    pub motion: MotionConfig,
    pub scan: ScanConfig,
    pub retry: RetryPolicy,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM1".to_string(),
            baud: DEFAULT_BAUDRATE,
            wheels: WheelRoleMap::default(),
            motion: MotionConfig::default(),
            scan: ScanConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl RobotConfig {
    /// Load from a JSON file; fields not present fall back to defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
