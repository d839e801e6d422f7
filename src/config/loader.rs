//! Config file discovery, environment expansion and validation

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::duration::parse_duration;
use super::types::Config;

/// File name searched for in the default locations
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default search order for the config file
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("vigil").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/vigil").join(CONFIG_FILE_NAME));
    paths
}

/// Locate the config file: the explicit path if given, else the first
/// default location that exists.
pub fn find_config(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        return Ok(path.to_path_buf());
    }

    let candidates = default_config_paths();
    match candidates.iter().position(|p| p.exists()) {
        Some(idx) => Ok(candidates[idx].clone()),
        None => Err(ConfigError::NoConfig(candidates)),
    }
}

/// Read, expand and parse a config file
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&raw)
}

/// Expand environment references in `raw` and parse it as YAML
pub fn parse_str(raw: &str) -> Result<Config, ConfigError> {
    let expanded = expand_vars(raw, |name| std::env::var(name).ok());
    serde_yaml::from_str(&expanded).map_err(ConfigError::Parse)
}

/// Locate and load the config, filling `globals.hostname` from the machine
/// when it is not configured.
pub fn resolve(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = find_config(explicit)?;
    tracing::debug!(path = %path.display(), "loading config");

    let mut config = load(&path)?;

    let has_hostname = config
        .globals
        .get("hostname")
        .and_then(|v| v.as_str())
        .map_or(false, |h| !h.is_empty());
    if !has_hostname {
        let hostname = sysinfo::System::host_name().ok_or(ConfigError::Hostname)?;
        config
            .globals
            .insert("hostname".to_string(), serde_json::Value::String(hostname));
    }

    Ok(config)
}

fn env_regex() -> &'static Regex {
    static ENV_REF: OnceLock<Regex> = OnceLock::new();
    ENV_REF.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("valid env regex")
    })
}

/// Substitute `${VAR}`, `${VAR:-default}` and `$VAR` using `lookup`.
///
/// Unset variables expand to the default if one is given, else to "".
pub fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_regex()
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            match lookup(name).filter(|v| !v.is_empty()) {
                Some(value) => value,
                None => caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

impl Config {
    /// Check cross-references and value formats, collecting every problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (idx, alert) in self.alerts.iter().enumerate() {
            let label = if alert.name.is_empty() {
                problems.push(format!("alert #{}: name is empty", idx + 1));
                format!("#{}", idx + 1)
            } else {
                alert.name.clone()
            };

            if !alert.name.is_empty() && !seen.insert(alert.name.as_str()) {
                problems.push(format!("alert {}: duplicate name", label));
            }
            if alert.check.is_empty() {
                problems.push(format!("alert {}: check is empty", label));
            }
            if alert.trigger.set_count() > 1 {
                problems.push(format!(
                    "alert {}: trigger must set only one of interval, cron, watch",
                    label
                ));
            }
            if let Some(interval) = alert.trigger.interval.as_deref().filter(|s| !s.is_empty()) {
                if let Err(e) = parse_duration(interval) {
                    problems.push(format!("alert {}: trigger interval: {}", label, e));
                }
            }
            if !alert.timeout.is_empty() {
                if let Err(e) = parse_duration(&alert.timeout) {
                    problems.push(format!("alert {}: timeout: {}", label, e));
                }
            }
            if let Some(cooldown) = &alert.cooldown {
                for d in cooldown.durations() {
                    if let Err(e) = parse_duration(d) {
                        problems.push(format!("alert {}: cooldown: {}", label, e));
                    }
                }
            }
            for target in &alert.notify {
                if !self.services.contains_key(&target.service) {
                    problems.push(format!(
                        "alert {}: unknown service {:?}",
                        label, target.service
                    ));
                }
            }
        }

        for (name, service) in &self.services {
            if service.url.is_empty() {
                problems.push(format!("service {}: url is empty", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// A command-line overridable option
pub struct ConfigOption {
    pub name: &'static str,
    pub help: &'static str,
    apply: fn(&mut Config, String),
}

/// Options that can be overridden from the command line
pub const OPTIONS: &[ConfigOption] = &[
    ConfigOption {
        name: "checks-dir",
        help: "directory holding file:// checks",
        apply: set_checks_dir,
    },
    ConfigOption {
        name: "cache-dir",
        help: "cache directory",
        apply: set_cache_dir,
    },
    ConfigOption {
        name: "logs-dir",
        help: "log directory",
        apply: set_logs_dir,
    },
];

fn set_checks_dir(config: &mut Config, value: String) {
    config.dirs.checks = PathBuf::from(value);
}

fn set_cache_dir(config: &mut Config, value: String) {
    config.dirs.cache = Some(PathBuf::from(value));
}

fn set_logs_dir(config: &mut Config, value: String) {
    config.dirs.logs = Some(PathBuf::from(value));
}

/// Apply a named option override
pub fn apply_option(config: &mut Config, name: &str, value: String) -> Result<(), ConfigError> {
    let option = OPTIONS
        .iter()
        .find(|o| o.name == name)
        .ok_or_else(|| ConfigError::UnknownOption(name.to_string()))?;
    (option.apply)(config, value);
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no config file found (searched {0:?})")]
    NoConfig(Vec<PathBuf>),

    #[error("reading config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("resolving hostname: unavailable")]
    Hostname,

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("invalid config:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}
