//! Configuration model and loader
//!
//! The pipeline only reads a [`Config`]; this module also knows how to find,
//! expand and validate the YAML file that produces one.

pub mod duration;
pub mod loader;
pub mod types;

pub use duration::{parse_duration, DurationError};
pub use loader::{
    apply_option, default_config_paths, expand_vars, find_config, load, parse_str, resolve,
    ConfigError, ConfigOption, OPTIONS,
};
pub use types::{
    Alert, Config, Cooldown, Dirs, NotifyTarget, Service, Sha256Pin, Trigger, TriggerKind,
    DEFAULT_CHECKS_DIR,
};
