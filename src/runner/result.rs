//! Outcome of a single alert run

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::check::{ExecError, ParseError, ResolveError};
use crate::notify::{DispatchError, TargetError};

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Exec,
    Parse,
    Template,
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Exec => "exec",
            Stage::Parse => "parse",
            Stage::Template => "template",
            Stage::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure inside the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Template(#[from] TargetError),

    #[error(transparent)]
    Notify(#[from] DispatchError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Resolve(_) => Stage::Resolve,
            PipelineError::Exec(_) => Stage::Exec,
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::Template(_) => Stage::Template,
            PipelineError::Notify(_) => Stage::Notify,
        }
    }
}

/// A pipeline error tagged with its stage
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

impl From<PipelineError> for StageFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            stage: error.stage(),
            error,
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.error)
    }
}

impl Serialize for StageFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StageFailure", 2)?;
        state.serialize_field("stage", &self.stage)?;
        state.serialize_field("message", &self.error.to_string())?;
        state.end()
    }
}

/// Result of running one alert through the pipeline
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub alert: String,
    pub check_uri: String,
    pub check_path: Option<PathBuf>,
    pub status: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub lines: Vec<String>,
    /// Rendered message per service
    pub rendered: BTreeMap<String, String>,
    /// Services notified, or that would be under dry-run
    pub notified: Vec<String>,
    pub dry_run: bool,
    #[serde(serialize_with = "duration_ms")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub failure: Option<StageFailure>,
}

impl RunResult {
    pub(crate) fn new(alert: &str, check_uri: &str, dry_run: bool) -> Self {
        Self {
            alert: alert.to_string(),
            check_uri: check_uri.to_string(),
            check_path: None,
            status: None,
            fields: BTreeMap::new(),
            lines: Vec::new(),
            rendered: BTreeMap::new(),
            notified: Vec::new(),
            dry_run,
            duration: Duration::ZERO,
            started_at: Utc::now(),
            exit_code: None,
            stderr: String::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Stage the run failed in, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.failure.as_ref().map(|f| f.stage)
    }
}

fn duration_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis().min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let names: Vec<String> = [
            Stage::Resolve,
            Stage::Exec,
            Stage::Parse,
            Stage::Template,
            Stage::Notify,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, vec!["resolve", "exec", "parse", "template", "notify"]);
    }

    #[test]
    fn test_failure_serializes_stage_and_message() {
        let failure = StageFailure::from(PipelineError::from(ParseError::MissingStatus));
        assert_eq!(failure.stage, Stage::Parse);

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["stage"], "parse");
        assert_eq!(json["message"], "check output missing required 'status' key");
    }

    #[test]
    fn test_result_json_shape() {
        let mut result = RunResult::new("disk", "file://disk.sh", true);
        result.duration = Duration::from_millis(1500);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["alert"], "disk");
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["dry_run"], true);
        assert!(json["failure"].is_null());
        assert!(result.is_success());
    }
}
