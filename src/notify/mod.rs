//! Notification rendering and delivery

pub mod providers;
pub mod sender;
pub mod target;
pub mod template;

pub use sender::{apply_params, DispatchError, NotifySender, SendError, SenderFactory, SenderRegistry};
pub use target::{resolve_targets, ResolvedTarget, TargetError};
pub use template::{render, Renderer, TemplateData, TemplateError};
