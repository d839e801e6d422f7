//! Per-scheme notification senders

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::providers;
use super::target::ResolvedTarget;

/// A configured notification sender.
///
/// Construction through a [`SenderFactory`] validates the configuration;
/// `send` performs the delivery.
#[async_trait]
pub trait NotifySender: Send + Sync {
    /// URL scheme this sender handles
    fn scheme(&self) -> &'static str;

    /// Deliver a message
    async fn send(&self, message: &str) -> Result<(), SendError>;
}

/// Builds a sender from a dispatch URL
pub type SenderFactory = Arc<dyn Fn(&Url) -> Result<Box<dyn NotifySender>, SendError> + Send + Sync>;

/// Registry mapping URL schemes to sender factories
#[derive(Clone, Default)]
pub struct SenderRegistry {
    factories: HashMap<String, SenderFactory>,
}

impl SenderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        providers::register_defaults(&mut registry);
        registry
    }

    /// Register (or replace) the factory for a scheme
    pub fn register<F>(&mut self, scheme: impl Into<String>, factory: F)
    where
        F: Fn(&Url) -> Result<Box<dyn NotifySender>, SendError> + Send + Sync + 'static,
    {
        self.factories.insert(scheme.into(), Arc::new(factory));
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Build the sender for a target
    pub fn build(&self, target: &ResolvedTarget) -> Result<Box<dyn NotifySender>, DispatchError> {
        let wrap = |source| DispatchError::Build {
            service: target.service.clone(),
            source,
        };

        let url = apply_params(&target.url, &target.params).map_err(wrap)?;
        let factory = self
            .factories
            .get(url.scheme())
            .ok_or_else(|| wrap(SendError::UnknownScheme(url.scheme().to_string())))?;
        factory(&url).map_err(wrap)
    }

    /// Confirm a target is well-formed without sending anything
    pub fn validate(&self, target: &ResolvedTarget) -> Result<(), DispatchError> {
        self.build(target).map(|_| ())
    }

    /// Deliver a target's message
    pub async fn send(&self, target: &ResolvedTarget) -> Result<(), DispatchError> {
        let sender = self.build(target)?;
        sender
            .send(&target.message)
            .await
            .map_err(|source| {
                if let SendError::Multiple(errors) = &source {
                    for e in errors {
                        tracing::warn!(service = %target.service, error = %e, "delivery error");
                    }
                }
                DispatchError::Send {
                    service: target.service.clone(),
                    source,
                }
            })
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Fold parameters into a URL's query string.
///
/// Existing pairs are kept unless a parameter overrides them; overridden
/// and new keys are appended in key order.
pub fn apply_params(raw_url: &str, params: &BTreeMap<String, String>) -> Result<Url, SendError> {
    let mut url = Url::parse(raw_url).map_err(|e| SendError::InvalidUrl(format!("{}: {}", raw_url, e)))?;
    if params.is_empty() {
        return Ok(url);
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.contains_key(k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params.iter());

    Ok(url)
}

/// Look up a query parameter on a dispatch URL
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Errors from building or using a sender
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("unknown notification scheme {0:?}")]
    UnknownScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("missing required parameter {0:?}")]
    MissingParam(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{} ({} errors)", .0.first().map(ToString::to_string).unwrap_or_default(), .0.len())]
    Multiple(Vec<SendError>),
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        SendError::Transport(e.to_string())
    }
}

impl SendError {
    /// Collapse a list of delivery errors: none is success, one is itself
    pub fn from_many(mut errors: Vec<SendError>) -> Result<(), SendError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SendError::Multiple(errors)),
        }
    }
}

/// A sender failure attributed to a service
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("creating sender for {service}: {source}")]
    Build {
        service: String,
        #[source]
        source: SendError,
    },

    #[error("sending to {service}: {source}")]
    Send {
        service: String,
        #[source]
        source: SendError,
    },
}

impl DispatchError {
    pub fn service(&self) -> &str {
        match self {
            DispatchError::Build { service, .. } | DispatchError::Send { service, .. } => service,
        }
    }
}
