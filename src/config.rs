//! # Configuration
//!
//! An explicit, non-global configuration value. The source this crate is
//! modeled on keeps server settings behind a module-wide singleton; here
//! `Config` is constructed once at startup and passed by reference (or
//! cheaply cloned) into every component that needs a setting. Tests build
//! their own private `Config` pointed at a temporary directory.

use crate::error::{Result, RoboTvError};
use std::path::{Path, PathBuf};

/// Default max on-disk size of one client's timeshift ring: 1 GiB.
pub const DEFAULT_MAX_TIMESHIFT_SIZE: u64 = 1024 * 1024 * 1024;

/// Default TCP listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 34892;

/// Live-streaming-core subset of the head-end's configuration file.
///
/// Parsed from a flat `name = value` text file; unrecognized keys are
/// ignored (they belong to collaborators outside this crate's scope).
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding per-session timeshift ring files.
    pub timeshift_dir: PathBuf,
    /// Maximum size in bytes of one timeshift ring (excludes the 1 MiB slack).
    pub max_timeshift_size: u64,
    /// TCP port the listener binds.
    pub listen_port: u16,
    /// Whether the channel list is filtered (consumed by an external collaborator;
    /// carried here because it lives in the same config file).
    pub filter_channels: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeshift_dir: PathBuf::from("/video"),
            max_timeshift_size: DEFAULT_MAX_TIMESHIFT_SIZE,
            listen_port: DEFAULT_LISTEN_PORT,
            filter_channels: false,
        }
    }
}

impl Config {
    /// Parses a configuration file of `name = value` lines. Missing file is
    /// not an error: defaults apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Config::default();

        let content = match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "no config file at {}, using defaults",
                    path.as_ref().display()
                );
                return Ok(config);
            }
            Err(err) => return Err(RoboTvError::Io(err)),
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');

            match key {
                "TimeShiftDir" => config.timeshift_dir = PathBuf::from(value),
                "MaxTimeShiftSize" => config.max_timeshift_size = value.parse()?,
                "ListenPort" => config.listen_port = value.parse()?,
                "FilterChannels" => config.filter_channels = value.eq_ignore_ascii_case("true"),
                other => log::debug!("ignoring unrecognized config key: {other}"),
            }
        }

        Ok(config)
    }
}
