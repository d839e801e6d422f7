//! Configuration types for alerts, services and directories

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default location of check executables referenced as `file://name`
pub const DEFAULT_CHECKS_DIR: &str = "/etc/vigil/checks";

/// Fully loaded configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working directories
    #[serde(default)]
    pub dirs: Dirs,
    /// Values exposed to templates under `globals`
    #[serde(default)]
    pub globals: Map<String, Value>,
    /// Notification services keyed by name
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    /// Alert definitions, in declaration order
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl Config {
    /// Find an alert by name
    pub fn alert(&self, name: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.name == name)
    }
}

/// Directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dirs {
    #[serde(default = "default_checks_dir")]
    pub checks: PathBuf,
    #[serde(default)]
    pub cache: Option<PathBuf>,
    #[serde(default)]
    pub logs: Option<PathBuf>,
}

impl Default for Dirs {
    fn default() -> Self {
        Self {
            checks: default_checks_dir(),
            cache: None,
            logs: None,
        }
    }
}

fn default_checks_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKS_DIR)
}

/// Notification service definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    /// Dispatch URL, e.g. `telegram://token@telegram`
    pub url: String,
    /// Base parameters folded into the URL as query pairs
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Service {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Alert definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert name
    pub name: String,
    /// Check reference, e.g. `file://disk_usage`
    pub check: String,
    /// Optional integrity pin for the check executable
    #[serde(default)]
    pub sha256: Sha256Pin,
    /// Firing condition (consumed by a scheduler)
    #[serde(default)]
    pub trigger: Trigger,
    /// Execution timeout as a duration string; empty means no timeout
    #[serde(default)]
    pub timeout: String,
    /// Arguments passed to the check environment
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    /// Notification suppression window
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
    /// Default message template
    #[serde(default)]
    pub template: String,
    /// Notification references, in dispatch order
    #[serde(default)]
    pub notify: Vec<NotifyTarget>,
}

impl Alert {
    /// Create a new alert
    pub fn new(name: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: check.into(),
            sha256: Sha256Pin::Unset,
            trigger: Trigger::default(),
            timeout: String::new(),
            args: BTreeMap::new(),
            cooldown: None,
            template: String::new(),
            notify: Vec::new(),
        }
    }

    /// Set the default message template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the execution timeout
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Add a check argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Add a notification reference
    pub fn with_notify(mut self, target: NotifyTarget) -> Self {
        self.notify.push(target);
        self
    }

    /// Set the trigger
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Pin the check executable to a SHA-256 digest
    pub fn with_sha256(mut self, pin: Sha256Pin) -> Self {
        self.sha256 = pin;
        self
    }
}

/// Trigger descriptor. Only one field is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<String>,
}

impl Trigger {
    pub fn interval(every: impl Into<String>) -> Self {
        Self {
            interval: Some(every.into()),
            ..Self::default()
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            cron: Some(expr.into()),
            ..Self::default()
        }
    }

    pub fn watch(path: impl Into<String>) -> Self {
        Self {
            watch: Some(path.into()),
            ..Self::default()
        }
    }

    /// Trigger kind with precedence watch > cron > interval
    pub fn kind(&self) -> TriggerKind {
        if is_set(&self.watch) {
            TriggerKind::Watch
        } else if is_set(&self.cron) {
            TriggerKind::Cron
        } else {
            TriggerKind::Interval
        }
    }

    /// Number of non-empty trigger fields
    pub fn set_count(&self) -> usize {
        [&self.interval, &self.cron, &self.watch]
            .into_iter()
            .filter(|f| is_set(f))
            .count()
    }
}

fn is_set(field: &Option<String>) -> bool {
    field.as_deref().map_or(false, |s| !s.is_empty())
}

/// Label passed to checks describing what fired them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Interval,
    Cron,
    Watch,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Interval => "interval",
            TriggerKind::Cron => "cron",
            TriggerKind::Watch => "watch",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooldown window, either one duration or per-severity durations.
///
/// Carried for schedulers; nothing in the pipeline enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cooldown {
    /// `cooldown: 5m`
    Simple(String),
    /// `cooldown: { warning: 10m, critical: 1m, recovery: true }`
    PerStatus {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        critical: Option<String>,
        #[serde(default)]
        recovery: bool,
    },
}

impl Cooldown {
    /// Duration strings carried by this cooldown
    pub fn durations(&self) -> Vec<&str> {
        match self {
            Cooldown::Simple(d) => vec![d.as_str()],
            Cooldown::PerStatus {
                warning, critical, ..
            } => [warning, critical]
                .into_iter()
                .filter_map(|d| d.as_deref())
                .collect(),
        }
    }
}

/// Integrity pin for a check executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Sha256Repr", into = "Sha256Repr")]
pub enum Sha256Pin {
    /// No pin configured
    #[default]
    Unset,
    /// Explicit opt-out (`sha256: false`)
    Disabled,
    /// Hex-encoded digest the executable must match
    Pinned(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Sha256Repr {
    Flag(bool),
    Hash(String),
    Unset(()),
}

impl TryFrom<Sha256Repr> for Sha256Pin {
    type Error = String;

    fn try_from(repr: Sha256Repr) -> Result<Self, Self::Error> {
        match repr {
            Sha256Repr::Flag(false) => Ok(Sha256Pin::Disabled),
            Sha256Repr::Flag(true) => {
                Err("sha256: true is not valid, use a hash string or false".to_string())
            }
            Sha256Repr::Hash(hash) if hash.is_empty() => Ok(Sha256Pin::Unset),
            Sha256Repr::Hash(hash) => Ok(Sha256Pin::Pinned(hash)),
            Sha256Repr::Unset(()) => Ok(Sha256Pin::Unset),
        }
    }
}

impl From<Sha256Pin> for Sha256Repr {
    fn from(pin: Sha256Pin) -> Self {
        match pin {
            Sha256Pin::Unset => Sha256Repr::Unset(()),
            Sha256Pin::Disabled => Sha256Repr::Flag(false),
            Sha256Pin::Pinned(hash) => Sha256Repr::Hash(hash),
        }
    }
}

/// Reference from an alert to a notification service.
///
/// Written either as a bare service name or as an object with overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NotifyTargetRepr")]
pub struct NotifyTarget {
    pub service: String,
    /// Message template overriding the alert default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Parameters overriding the service base parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl NotifyTarget {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service: name.into(),
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotifyTargetRepr {
    Name(String),
    Full {
        service: String,
        #[serde(default)]
        template: Option<String>,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl From<NotifyTargetRepr> for NotifyTarget {
    fn from(repr: NotifyTargetRepr) -> Self {
        match repr {
            NotifyTargetRepr::Name(service) => NotifyTarget::service(service),
            NotifyTargetRepr::Full {
                service,
                template,
                params,
            } => NotifyTarget {
                service,
                template: template.filter(|t| !t.is_empty()),
                params,
            },
        }
    }
}
