//! Alert pipeline orchestration
//!
//! A run moves through `resolve → exec → parse → template → notify`. The
//! first failing stage ends the run and is recorded on the [`RunResult`];
//! nothing escapes as an error.

mod result;

pub use result::{PipelineError, RunResult, Stage, StageFailure};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::check::{self, ExecRequest};
use crate::config::{parse_duration, Alert, Config};
use crate::notify::{resolve_targets, Renderer, SenderRegistry, TemplateData};

/// Status that skips notification
pub const OK_STATUS: &str = "ok";

/// Runs alerts against a loaded configuration
pub struct Runner {
    config: Arc<Config>,
    senders: SenderRegistry,
    renderer: Renderer,
}

impl Runner {
    /// Create a runner with the built-in senders
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            senders: SenderRegistry::with_defaults(),
            renderer: Renderer::new(),
        }
    }

    /// Replace the sender registry
    pub fn with_senders(mut self, senders: SenderRegistry) -> Self {
        self.senders = senders;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up an alert by name
    pub fn find_alert(&self, name: &str) -> Result<&Alert, RunnerError> {
        self.config
            .alert(name)
            .ok_or_else(|| RunnerError::UnknownAlert(name.to_string()))
    }

    /// Run one named alert, or every alert when `name` is `None`
    pub async fn run(&self, name: Option<&str>, dry_run: bool) -> Result<Vec<RunResult>, RunnerError> {
        match name {
            Some(name) => {
                let alert = self.find_alert(name)?;
                Ok(vec![self.run_alert(alert, dry_run).await])
            }
            None => Ok(self.run_all(dry_run).await),
        }
    }

    /// Run every configured alert, one after another
    pub async fn run_all(&self, dry_run: bool) -> Vec<RunResult> {
        let mut results = Vec::with_capacity(self.config.alerts.len());
        for alert in &self.config.alerts {
            results.push(self.run_alert(alert, dry_run).await);
        }
        results
    }

    /// Run a single alert through the pipeline
    pub async fn run_alert(&self, alert: &Alert, dry_run: bool) -> RunResult {
        let start = Instant::now();
        let mut result = RunResult::new(&alert.name, &alert.check, dry_run);

        tracing::info!(alert = %alert.name, check = %alert.check, dry_run, "running alert");

        if let Err(e) = self.pipeline(alert, dry_run, &mut result).await {
            let failure = StageFailure::from(e);
            tracing::error!(
                alert = %alert.name,
                stage = %failure.stage,
                error = %failure.error,
                "alert run failed"
            );
            result.failure = Some(failure);
        }

        result.duration = start.elapsed();
        tracing::debug!(
            alert = %alert.name,
            duration_ms = result.duration.as_millis() as u64,
            "alert run finished"
        );
        result
    }

    async fn pipeline(
        &self,
        alert: &Alert,
        dry_run: bool,
        result: &mut RunResult,
    ) -> Result<(), PipelineError> {
        // resolve
        tracing::debug!(alert = %alert.name, stage = %Stage::Resolve, "resolving check");
        let resolved = check::resolve(&alert.check, &self.config.dirs.checks)?;
        check::verify_pin(&resolved, &alert.sha256)?;
        result.check_path = Some(resolved.path.clone());

        // exec
        let trigger = alert.trigger.kind();
        let request = ExecRequest::new(&resolved.path)
            .with_timeout(alert_timeout(alert))
            .with_trigger(trigger)
            .with_args(alert.args.clone());
        tracing::debug!(
            alert = %alert.name,
            stage = %Stage::Exec,
            path = %resolved.path.display(),
            trigger = %trigger,
            "executing check"
        );
        let output = match check::execute(&request).await {
            Ok(output) => output,
            Err(e) => {
                if let Some(partial) = e.output() {
                    result.stderr = partial.stderr.clone();
                }
                return Err(e.into());
            }
        };
        result.stderr = output.stderr.clone();
        result.exit_code = Some(output.exit_code);
        tracing::debug!(
            alert = %alert.name,
            exit_code = output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            "check finished"
        );

        // parse
        let parsed = check::parse_output(&output.stdout)?;
        result.status = Some(parsed.status.clone());
        result.fields = parsed.fields.clone();
        result.lines = parsed.lines.clone();
        tracing::info!(alert = %alert.name, status = %parsed.status, "check reported");

        // template
        let data = TemplateData::build(&self.config.globals, &alert.name, &parsed.fields, &alert.args);
        let targets = resolve_targets(
            &alert.notify,
            &self.config.services,
            &alert.template,
            &data,
            &self.renderer,
        )?;
        for target in &targets {
            result.rendered.insert(target.service.clone(), target.message.clone());
        }

        if parsed.status == OK_STATUS {
            tracing::debug!(alert = %alert.name, "status ok, skipping notification");
            return Ok(());
        }

        // notify
        for target in &targets {
            if dry_run {
                self.senders.validate(target)?;
            } else {
                self.senders.send(target).await?;
            }
            tracing::info!(alert = %alert.name, service = %target.service, dry_run, "notified");
            result.notified.push(target.service.clone());
        }

        Ok(())
    }
}

/// Timeout for an alert's check; empty, zero or unparseable means none
fn alert_timeout(alert: &Alert) -> Option<Duration> {
    if alert.timeout.trim().is_empty() {
        return None;
    }
    match parse_duration(&alert.timeout) {
        Ok(timeout) if timeout.is_zero() => None,
        Ok(timeout) => Some(timeout),
        Err(e) => {
            tracing::warn!(alert = %alert.name, timeout = %alert.timeout, error = %e, "ignoring invalid timeout");
            None
        }
    }
}

/// Errors selecting alerts to run
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("alert {0:?} not found")]
    UnknownAlert(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{file_sha256, ExecError, ResolveError};
    use crate::config::{NotifyTarget, Service, Sha256Pin, Trigger};
    use crate::notify::{DispatchError, NotifySender, SendError, TargetError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;
    use url::Url;

    const E2E_TEMPLATE: &str = "{{check.status | upper}} {{globals.hostname}}: usage={{check.usage}}%";

    fn script(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn config(dir: &Path, alerts: Vec<Alert>) -> Config {
        let mut config = Config::default();
        config.dirs.checks = dir.to_path_buf();
        config
            .globals
            .insert("hostname".to_string(), serde_json::json!("test-host"));
        config
            .services
            .insert("log".to_string(), Service::new("logger://"));
        config.alerts = alerts;
        config
    }

    fn warning_alert() -> Alert {
        Alert::new("disk", "file://disk.sh")
            .with_template(E2E_TEMPLATE)
            .with_notify(NotifyTarget::service("log"))
    }

    struct Recorder {
        name: String,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotifySender for Recorder {
        fn scheme(&self) -> &'static str {
            "record"
        }

        async fn send(&self, message: &str) -> Result<(), SendError> {
            if self.name == "fail" {
                return Err(SendError::Transport("refused".to_string()));
            }
            self.sent.lock().push(format!("{}: {}", self.name, message));
            Ok(())
        }
    }

    fn with_recorder(mut registry: SenderRegistry, sent: Arc<Mutex<Vec<String>>>) -> SenderRegistry {
        registry.register("record", move |url: &Url| {
            Ok(Box::new(Recorder {
                name: url.host_str().unwrap_or_default().to_string(),
                sent: Arc::clone(&sent),
            }) as Box<dyn NotifySender>)
        });
        registry
    }

    #[tokio::test]
    async fn test_end_to_end_dry_run() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=warning\necho usage=84\n");
        let runner = Runner::new(Arc::new(config(dir.path(), vec![warning_alert()])));

        let results = runner.run(Some("disk"), true).await.unwrap();
        let result = &results[0];

        assert!(result.is_success(), "unexpected failure: {:?}", result.failure);
        assert_eq!(result.status.as_deref(), Some("warning"));
        assert_eq!(result.rendered["log"], "WARNING test-host: usage=84%");
        assert_eq!(result.notified, vec!["log"]);
        assert_eq!(result.lines, vec!["status=warning", "usage=84"]);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.dry_run);
    }

    #[tokio::test]
    async fn test_live_send_uses_registry() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=critical\necho usage=97\n");
        let alert = warning_alert().with_notify(NotifyTarget::service("rec"));
        let mut cfg = config(dir.path(), vec![alert]);
        cfg.services.insert("rec".to_string(), Service::new("record://a"));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let senders = with_recorder(SenderRegistry::with_defaults(), Arc::clone(&sent));
        let runner = Runner::new(Arc::new(cfg)).with_senders(senders);
        let result = runner.run_alert(&runner.config().alerts[0], false).await;

        assert!(result.is_success(), "unexpected failure: {:?}", result.failure);
        assert_eq!(result.notified, vec!["log", "rec"]);
        assert_eq!(*sent.lock(), vec!["a: CRITICAL test-host: usage=97%".to_string()]);
    }

    #[tokio::test]
    async fn test_ok_status_skips_notify() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=ok\necho usage=12\n");
        let alert = warning_alert().with_notify(NotifyTarget::service("broken"));
        let mut cfg = config(dir.path(), vec![alert]);
        // Would fail validation if dispatch were attempted.
        cfg.services
            .insert("broken".to_string(), Service::new("nosuchscheme://x"));
        let runner = Runner::new(Arc::new(cfg));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert!(result.is_success());
        assert_eq!(result.status.as_deref(), Some("ok"));
        assert!(result.notified.is_empty());
        assert_eq!(result.rendered["log"], "OK test-host: usage=12%");
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let dir = TempDir::new().unwrap();
        let runner = Runner::new(Arc::new(config(dir.path(), vec![warning_alert()])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert_eq!(result.failed_stage(), Some(Stage::Resolve));
        assert!(matches!(
            result.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::Resolve(ResolveError::NotFound(_)))
        ));
        assert!(result.status.is_none());
    }

    #[tokio::test]
    async fn test_sha256_pin_mismatch_fails_resolve() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=warning\n");
        let good = file_sha256(&dir.path().join("disk.sh")).unwrap();

        let pinned = warning_alert().with_sha256(Sha256Pin::Pinned(good.to_uppercase()));
        let wrong = Alert::new("wrong", "file://disk.sh").with_sha256(Sha256Pin::Pinned("00".repeat(32)));
        let runner = Runner::new(Arc::new(config(dir.path(), vec![pinned, wrong])));

        let results = runner.run_all(true).await;
        assert!(results[0].is_success());
        assert_eq!(results[1].failed_stage(), Some(Stage::Resolve));
    }

    #[tokio::test]
    async fn test_exec_timeout_keeps_stderr() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho starting >&2\nexec sleep 10\n");
        let alert = warning_alert().with_timeout("200ms");
        let runner = Runner::new(Arc::new(config(dir.path(), vec![alert])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert_eq!(result.failed_stage(), Some(Stage::Exec));
        assert!(matches!(
            result.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::Exec(ExecError::Timeout { .. }))
        ));
        assert_eq!(result.stderr.trim(), "starting");
        assert!(result.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_parse_failure_records_stderr() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho usage=84\necho oops >&2\nexit 2\n");
        let runner = Runner::new(Arc::new(config(dir.path(), vec![warning_alert()])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert_eq!(result.failed_stage(), Some(Stage::Parse));
        assert_eq!(result.stderr.trim(), "oops");
        assert_eq!(result.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_service_fails_template() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=warning\n");
        let alert = warning_alert().with_notify(NotifyTarget::service("missing"));
        let runner = Runner::new(Arc::new(config(dir.path(), vec![alert])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert_eq!(result.failed_stage(), Some(Stage::Template));
        assert!(matches!(
            result.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::Template(TargetError::UnknownService(_)))
        ));
        assert!(result.rendered.is_empty());
        assert!(result.notified.is_empty());
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_earlier_targets() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=critical\n");
        let alert = Alert::new("disk", "file://disk.sh")
            .with_template("{{status}}")
            .with_notify(NotifyTarget::service("first"))
            .with_notify(NotifyTarget::service("bad"))
            .with_notify(NotifyTarget::service("last"));
        let mut cfg = config(dir.path(), vec![alert]);
        cfg.services.insert("first".to_string(), Service::new("record://ok"));
        cfg.services.insert("bad".to_string(), Service::new("record://fail"));
        cfg.services.insert("last".to_string(), Service::new("record://ok"));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let runner = Runner::new(Arc::new(cfg)).with_senders(with_recorder(SenderRegistry::new(), Arc::clone(&sent)));

        let result = runner.run_alert(&runner.config().alerts[0], false).await;
        assert_eq!(result.failed_stage(), Some(Stage::Notify));
        assert_eq!(result.notified, vec!["first"]);
        assert_eq!(sent.lock().len(), 1);
        match result.failure.map(|f| f.error) {
            Some(PipelineError::Notify(e @ DispatchError::Send { .. })) => assert_eq!(e.service(), "bad"),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trigger_and_args_reach_check() {
        let dir = TempDir::new().unwrap();
        script(
            dir.path(),
            "disk.sh",
            "#!/bin/sh\necho status=ok\necho trigger=$HEALTHCHECK_TRIGGER\necho mount=$HEALTHCHECK_ARG_MOUNT\n",
        );
        let alert = warning_alert()
            .with_trigger(Trigger::cron("*/5 * * * *"))
            .with_arg("mount", "/data");
        let runner = Runner::new(Arc::new(config(dir.path(), vec![alert])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert_eq!(result.fields["trigger"], "cron");
        assert_eq!(result.fields["mount"], "/data");
    }

    #[tokio::test]
    async fn test_unknown_alert() {
        let dir = TempDir::new().unwrap();
        let runner = Runner::new(Arc::new(config(dir.path(), vec![])));
        assert!(matches!(
            runner.run(Some("nope"), true).await,
            Err(RunnerError::UnknownAlert(_))
        ));
        assert!(runner.run(None, true).await.unwrap().is_empty());
    }

    #[test]
    fn test_alert_timeout() {
        assert_eq!(alert_timeout(&Alert::new("a", "file://x")), None);
        assert_eq!(
            alert_timeout(&Alert::new("a", "file://x").with_timeout("30s")),
            Some(Duration::from_secs(30))
        );
        assert_eq!(alert_timeout(&Alert::new("a", "file://x").with_timeout("soon")), None);
        assert_eq!(alert_timeout(&Alert::new("a", "file://x").with_timeout("0s")), None);
        assert_eq!(alert_timeout(&Alert::new("a", "file://x").with_timeout("0")), None);
    }

    #[tokio::test]
    async fn test_zero_timeout_means_no_timeout() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "disk.sh", "#!/bin/sh\necho status=warning\necho usage=84\n");
        let alert = warning_alert().with_timeout("0s");
        let runner = Runner::new(Arc::new(config(dir.path(), vec![alert])));

        let result = runner.run_alert(&runner.config().alerts[0], true).await;
        assert!(result.is_success(), "unexpected failure: {:?}", result.failure);
        assert_eq!(result.notified, vec!["log"]);
    }
}
