//! Vigil: health-check execution and alerting
//!
//! An alert names a check executable, how to run it and whom to notify.
//! Running an alert moves it through a fixed pipeline:
//!
//! - **resolve**: map the check reference (`file://name`) to an executable
//! - **exec**: run it with an isolated environment and a timeout
//! - **parse**: read `key=value` lines, requiring `status`
//! - **template**: render notification messages and parameters
//! - **notify**: send (or, in dry-run, validate) each target
//!
//! Failures are attributed to the stage they occurred in and recorded on the
//! [`RunResult`] rather than returned as errors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil::config;
//! use vigil::runner::Runner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = config::resolve(None)?;
//! let runner = Runner::new(Arc::new(config));
//!
//! for result in runner.run_all(true).await {
//!     println!("{}: {:?}", result.alert, result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod notify;
pub mod runner;

// Re-export commonly used types
pub use config::{Alert, Config, ConfigError};
pub use notify::{SenderRegistry, TemplateError};
pub use runner::{PipelineError, RunResult, Runner, Stage};
