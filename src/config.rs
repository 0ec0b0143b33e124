use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveEndpoint, default_endpoints};
use crate::domain::Archive;
use crate::error::RinexError;

pub const CONFIG_FILE: &str = "rinex-fetch.json";
pub const ENV_OUTPUT_DIR: &str = "RINEX_OUTPUT_DIR";
pub const ENV_EXE_DIR: &str = "RINEX_EXE_DIR";
pub const ENV_STATION_DB: &str = "RINEX_STATION_DB";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// On-disk configuration file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub exe_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub station_db: Option<Utf8PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Endpoint templates keyed by archive name; replaces the built-in entry.
    #[serde(default)]
    pub archives: BTreeMap<String, ArchiveEndpoint>,
}

/// Environment overrides, captured once.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub output_dir: Option<Utf8PathBuf>,
    pub exe_dir: Option<Utf8PathBuf>,
    pub station_db: Option<Utf8PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(Utf8PathBuf::from)
        };
        Self {
            output_dir: read(ENV_OUTPUT_DIR),
            exe_dir: read(ENV_EXE_DIR),
            station_db: read(ENV_STATION_DB),
        }
    }
}

/// Resolved configuration handed to every component at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: Utf8PathBuf,
    pub exe_dir: Option<Utf8PathBuf>,
    pub station_db: Option<Utf8PathBuf>,
    pub timeout: Duration,
    pub endpoints: BTreeMap<Archive, ArchiveEndpoint>,
}

impl Settings {
    /// Fails fast when a configured directory is missing.
    pub fn validate(&self) -> Result<(), RinexError> {
        if !self.output_dir.as_std_path().is_dir() {
            return Err(RinexError::Config(format!(
                "output directory does not exist: {}",
                self.output_dir
            )));
        }
        if let Some(exe_dir) = &self.exe_dir {
            if !exe_dir.as_std_path().is_dir() {
                return Err(RinexError::Config(format!(
                    "executable directory does not exist: {exe_dir}"
                )));
            }
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file, applies the environment and validates the result.
    pub fn resolve(path: Option<&str>) -> Result<Settings, RinexError> {
        let config = Self::load(path)?;
        let settings = Self::resolve_config(config, EnvOverrides::from_env())?;
        settings.validate()?;
        Ok(settings)
    }

    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&str>) -> Result<Config, RinexError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| RinexError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| RinexError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, env: EnvOverrides) -> Result<Settings, RinexError> {
        let output_dir = match env.output_dir.or(config.output_dir) {
            Some(dir) => dir,
            None => current_dir()?,
        };
        let exe_dir = env.exe_dir.or(config.exe_dir);
        let station_db = env
            .station_db
            .or(config.station_db)
            .or_else(default_station_db);

        let mut endpoints = default_endpoints();
        for (name, endpoint) in config.archives {
            let archive: Archive = name.parse().map_err(|_| {
                RinexError::ConfigParse(format!("unknown archive in config: {name}"))
            })?;
            endpoints.insert(archive, endpoint);
        }

        Ok(Settings {
            output_dir,
            exe_dir,
            station_db,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            endpoints,
        })
    }
}

fn current_dir() -> Result<Utf8PathBuf, RinexError> {
    let cwd = std::env::current_dir().map_err(|err| RinexError::Config(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| RinexError::Config("working directory is not valid UTF-8".to_string()))
}

fn default_station_db() -> Option<Utf8PathBuf> {
    BaseDirs::new().and_then(|dirs| {
        Utf8PathBuf::from_path_buf(dirs.data_dir().join("rinex-fetch").join("stations.json")).ok()
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn environment_wins_over_file() {
        let config = Config {
            output_dir: Some(Utf8PathBuf::from("/from/file")),
            ..Config::default()
        };
        let env = EnvOverrides {
            output_dir: Some(Utf8PathBuf::from("/from/env")),
            ..EnvOverrides::default()
        };
        let settings = ConfigLoader::resolve_config(config, env).unwrap();
        assert_eq!(settings.output_dir, Utf8PathBuf::from("/from/env"));
        assert_eq!(settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn unknown_archive_in_config_is_rejected() {
        let mut config = Config::default();
        config
            .archives
            .insert("atlantis".to_string(), ArchiveEndpoint::default());
        let err = ConfigLoader::resolve_config(config, EnvOverrides::default()).unwrap_err();
        assert_matches!(err, RinexError::ConfigParse(_));
    }

    #[test]
    fn missing_output_dir_fails_validation() {
        let temp = tempfile::tempdir().unwrap();
        let missing = Utf8PathBuf::from_path_buf(temp.path().join("nope")).unwrap();
        let env = EnvOverrides {
            output_dir: Some(missing),
            ..EnvOverrides::default()
        };
        let settings = ConfigLoader::resolve_config(Config::default(), env).unwrap();
        assert_matches!(settings.validate(), Err(RinexError::Config(_)));
    }
}
