use std::{
    fs, io,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

pub const ENV_DATADIR: &str = "FSVAULT_DATADIR";
pub const ENV_SECRET_KEYS: &str = "FSVAULT_SECRET_KEYS";
pub const ENV_DEBUG: &str = "FSVAULT_DEBUG";

/// User-level configuration loaded from `~/.config/fsvault/config.toml`
/// (platform-specific), overridden by `FSVAULT_*` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Root directory of the datastore.
    pub data_dir: Option<PathBuf>,
    /// Encryption keys, primary first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_keys: Vec<String>,
    #[serde(default)]
    pub debug: bool,
}

/// Load config from the default path, then apply the process environment.
pub fn load() -> Result<Config> {
    load_from_path(default_path()?, |name| std::env::var(name).ok())
}

/// Read the TOML file at `path` and overlay the environment seen through
/// `lookup`. A missing or blank file contributes only defaults.
pub fn load_from_path(
    path: impl AsRef<Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let contents = match fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };
    let file = if contents.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&contents)?
    };
    Ok(apply_env(file, lookup))
}

/// Overlay environment values onto `config`. `lookup` stands in for
/// `std::env::var` so tests need not touch the process environment.
pub fn apply_env(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(dir) = lookup(ENV_DATADIR) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(keys) = lookup(ENV_SECRET_KEYS) {
        config.secret_keys = keys.split(',').map(str::to_string).collect();
    }
    if let Some(debug) = lookup(ENV_DEBUG).as_deref().and_then(parse_bool) {
        config.debug = debug;
    }
    config
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// `<platform config dir>/fsvault/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    config_dir()
        .map(|base| base.join("fsvault").join("config.toml"))
        .ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))
}

/// Write `config` to the default path unless a file is already there.
/// Secret keys are never persisted from here.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_if_missing(config, &path)?;
    Ok(path)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let persisted = Config {
        secret_keys: Vec::new(),
        ..config.clone()
    };
    let body = toml::to_string_pretty(&persisted)?;
    fs::write(path, body)?;
    Ok(())
}
