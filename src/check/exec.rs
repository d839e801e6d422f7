//! Sandboxed check execution

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::TriggerKind;

/// Environment variable carrying the trigger label
pub const TRIGGER_VAR: &str = "HEALTHCHECK_TRIGGER";
/// Prefix for per-argument environment variables
pub const ARG_VAR_PREFIX: &str = "HEALTHCHECK_ARG_";

/// How long to keep draining pipes after the child was killed
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Execution request for a single check
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub path: PathBuf,
    pub timeout: Option<Duration>,
    pub trigger: TriggerKind,
    pub args: BTreeMap<String, Value>,
    pub stdin: Option<Vec<u8>>,
}

impl ExecRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: None,
            trigger: TriggerKind::Interval,
            args: BTreeMap::new(),
            stdin: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_args(mut self, args: BTreeMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Captured output of a check run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Process exit code; -1 when terminated by a signal
    pub exit_code: i32,
}

/// Run a check executable and capture its output.
///
/// The child sees only the trigger and argument variables. A non-zero exit
/// is returned as data; only spawn failures and timeouts are errors.
pub async fn execute(request: &ExecRequest) -> Result<ExecOutput, ExecError> {
    let mut command = Command::new(&request.path);
    command
        .env_clear()
        .envs(build_env(request.trigger, &request.args))
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        path: request.path.clone(),
        source,
    })?;

    let mut stdout = Capture::spawn(child.stdout.take());
    let mut stderr = Capture::spawn(child.stderr.take());

    if let (Some(input), Some(mut pipe)) = (request.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&input).await {
                tracing::debug!(error = %e, "check closed stdin early");
            }
        });
    }

    let run = async {
        let status = child.wait().await?;
        stdout.drain().await;
        stderr.drain().await;
        Ok::<_, std::io::Error>(status)
    };

    let status = match request.timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(status) => status,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(path = %request.path.display(), error = %e, "failed to kill timed-out check");
                }
                let output = ExecOutput {
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                    duration: start.elapsed(),
                    exit_code: -1,
                };
                return Err(ExecError::Timeout {
                    timeout: limit,
                    output,
                });
            }
        },
        None => run.await,
    }
    .map_err(|source| ExecError::Wait {
        path: request.path.clone(),
        source,
    })?;

    Ok(ExecOutput {
        stdout: stdout.finish().await,
        stderr: stderr.finish().await,
        duration: start.elapsed(),
        exit_code: status.code().unwrap_or(-1),
    })
}

/// Environment handed to a check: the trigger label plus one
/// `HEALTHCHECK_ARG_<KEY>` variable per argument.
pub fn build_env(trigger: TriggerKind, args: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut env = Vec::with_capacity(args.len() + 1);
    env.push((TRIGGER_VAR.to_string(), trigger.as_str().to_string()));

    for (key, value) in args {
        env.push((arg_var_name(key), value_to_string(value)));
    }
    env
}

fn arg_var_name(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", ARG_VAR_PREFIX, suffix)
}

/// Render a scalar argument the way it is written in config
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collects one output pipe in the background
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Capture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            tracing::debug!(error = %e, "check output pipe read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    /// Wait until the pipe reaches EOF
    async fn drain(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                tracing::warn!(error = %e, "check output reader failed");
            }
        }
    }

    /// Stop reading (after a short grace period) and return what was read
    async fn finish(&mut self) -> String {
        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

/// Check execution errors
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("check timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        output: ExecOutput,
    },

    #[error("executing check {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("waiting for check {}: {source}", path.display())]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Output captured before the failure, if the child ran at all
    pub fn output(&self) -> Option<&ExecOutput> {
        match self {
            ExecError::Timeout { output, .. } => Some(output),
            ExecError::Spawn { .. } | ExecError::Wait { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn script(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("check.sh");
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = TempDir::new().unwrap();
        let path = script(dir.path(), "#!/bin/sh\necho status=ok\necho usage=10\n");

        let output = execute(&ExecRequest::new(path)).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("status=ok"));
        assert!(output.stdout.contains("usage=10"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let dir = TempDir::new().unwrap();
        let path = script(dir.path(), "#!/bin/sh\necho status=critical\nexit 3\n");

        let output = execute(&ExecRequest::new(path)).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.stdout.contains("status=critical"));
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let dir = TempDir::new().unwrap();
        let path = script(dir.path(), "#!/bin/sh\necho started\nexec sleep 10\n");

        let started = Instant::now();
        let err = execute(
            &ExecRequest::new(path).with_timeout(Some(Duration::from_millis(200))),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        let output = err.output().expect("timeout keeps partial output");
        assert!(output.stdout.contains("started"));
    }

    #[tokio::test]
    async fn test_env_is_isolated() {
        std::env::set_var("VIGIL_TEST_LEAK", "secret");
        let dir = TempDir::new().unwrap();
        let path = script(
            dir.path(),
            "#!/bin/sh\necho status=ok\necho leak=$VIGIL_TEST_LEAK\necho home=$HOME\n",
        );

        let output = execute(&ExecRequest::new(path)).await.unwrap();
        assert!(output.stdout.contains("leak=\n"));
        assert!(output.stdout.contains("home=\n"));
    }

    #[tokio::test]
    async fn test_trigger_and_args_env() {
        let dir = TempDir::new().unwrap();
        let path = script(
            dir.path(),
            "#!/bin/sh\necho trigger=$HEALTHCHECK_TRIGGER\necho mount=$HEALTHCHECK_ARG_MOUNT\necho limit=$HEALTHCHECK_ARG_MAX_USAGE\n",
        );

        let mut args = BTreeMap::new();
        args.insert("mount".to_string(), Value::from("/data"));
        args.insert("max-usage".to_string(), serde_json::json!(0.8));

        let output = execute(
            &ExecRequest::new(path)
                .with_trigger(TriggerKind::Cron)
                .with_args(args),
        )
        .await
        .unwrap();

        assert!(output.stdout.contains("trigger=cron"));
        assert!(output.stdout.contains("mount=/data"));
        assert!(output.stdout.contains("limit=0.8"));
    }

    #[tokio::test]
    async fn test_stderr_and_stdin() {
        let dir = TempDir::new().unwrap();
        let path = script(
            dir.path(),
            "#!/bin/sh\nread line\necho status=ok\necho line=$line\necho debug info >&2\n",
        );

        let output = execute(
            &ExecRequest::new(path)
                .with_trigger(TriggerKind::Watch)
                .with_stdin("hello world\n"),
        )
        .await
        .unwrap();

        assert!(output.stdout.contains("line=hello world"));
        assert!(output.stderr.contains("debug info"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = execute(&ExecRequest::new("/nonexistent/check"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(err.output().is_none());
    }

    #[test]
    fn test_build_env() {
        let mut args = BTreeMap::new();
        args.insert("mount".to_string(), Value::from("/"));
        args.insert("verbose".to_string(), Value::Bool(true));

        let env = build_env(TriggerKind::Interval, &args);
        assert_eq!(
            env,
            vec![
                ("HEALTHCHECK_TRIGGER".to_string(), "interval".to_string()),
                ("HEALTHCHECK_ARG_MOUNT".to_string(), "/".to_string()),
                ("HEALTHCHECK_ARG_VERBOSE".to_string(), "true".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_keeps_output_after_read_error() {
        let pipe = tokio_test::io::Builder::new()
            .read(b"status=ok\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::Other, "pipe reset"))
            .build();

        let mut capture = Capture::spawn(Some(pipe));
        capture.drain().await;
        assert_eq!(capture.finish().await, "status=ok\n");
    }

    #[tokio::test]
    async fn test_capture_without_pipe() {
        let mut capture = Capture::spawn(None::<tokio::io::Empty>);
        capture.drain().await;
        assert_eq!(capture.finish().await, "");
    }
}
