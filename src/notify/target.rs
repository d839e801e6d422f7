//! Resolution of notification references into dispatch-ready targets

use std::collections::BTreeMap;

use serde::Serialize;

use super::template::{Renderer, TemplateData, TemplateError};
use crate::config::{NotifyTarget, Service};

/// A notification target with its final message and parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub service: String,
    pub url: String,
    pub message: String,
    pub params: BTreeMap<String, String>,
}

/// Resolve an alert's notification references, in order.
///
/// Parameters start from the service base and are overridden per target;
/// every parameter value is rendered as a template too. Any failure aborts
/// the whole resolution.
pub fn resolve_targets(
    refs: &[NotifyTarget],
    services: &BTreeMap<String, Service>,
    default_template: &str,
    data: &TemplateData,
    renderer: &Renderer,
) -> Result<Vec<ResolvedTarget>, TargetError> {
    refs.iter()
        .map(|target| resolve_target(target, services, default_template, data, renderer))
        .collect()
}

fn resolve_target(
    target: &NotifyTarget,
    services: &BTreeMap<String, Service>,
    default_template: &str,
    data: &TemplateData,
    renderer: &Renderer,
) -> Result<ResolvedTarget, TargetError> {
    let service = services
        .get(&target.service)
        .ok_or_else(|| TargetError::UnknownService(target.service.clone()))?;

    let template = target.template.as_deref().unwrap_or(default_template);
    let message = renderer
        .render(template, data)
        .map_err(|source| TargetError::Message {
            service: target.service.clone(),
            source,
        })?;

    let mut params = service.params.clone();
    params.extend(
        target
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    for (key, value) in params.iter_mut() {
        *value = renderer
            .render(value, data)
            .map_err(|source| TargetError::Param {
                service: target.service.clone(),
                key: key.clone(),
                source,
            })?;
    }

    Ok(ResolvedTarget {
        service: target.service.clone(),
        url: service.url.clone(),
        message,
        params,
    })
}

/// Target resolution errors
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("rendering template for {service}: {source}")]
    Message {
        service: String,
        #[source]
        source: TemplateError,
    },

    #[error("rendering param {key:?} for {service}: {source}")]
    Param {
        service: String,
        key: String,
        #[source]
        source: TemplateError,
    },
}
