//! Linux traffic control (`tc qdisc ... netem`) plumbing.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::CommandError;

/// Installs and removes an egress delay on a network interface.
#[async_trait]
pub trait TrafficControl: Send + Sync {
    async fn install_delay(&self, interface: &str, delay_ms: u64) -> Result<(), CommandError>;

    /// Removes the root qdisc. Succeeds when there was nothing to remove.
    async fn clear_delay(&self, interface: &str) -> Result<(), CommandError>;
}

/// Argument vector that adds a netem delay on `interface`.
pub fn install_args(interface: &str, delay_ms: u64) -> Vec<String> {
    ["qdisc", "add", "dev", interface, "root", "netem", "delay"]
        .iter()
        .map(ToString::to_string)
        .chain(std::iter::once(format!("{delay_ms}ms")))
        .collect()
}

/// Argument vector that deletes the root qdisc on `interface`.
pub fn clear_args(interface: &str) -> Vec<String> {
    ["qdisc", "del", "dev", interface, "root"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// `tc` reports a missing root qdisc with one of these depending on the
/// kernel and iproute2 version.
pub fn is_missing_rule(output: &str) -> bool {
    const MARKERS: [&str; 3] = [
        "No such file or directory",
        "No qdisc",
        "Cannot delete qdisc with handle of zero",
    ];
    MARKERS.iter().any(|marker| output.contains(marker))
}

/// Treats a delete that found no root qdisc as success.
fn tolerate_missing_rule(
    result: Result<(), CommandError>,
    interface: &str,
) -> Result<(), CommandError> {
    match result {
        Err(CommandError::Failed { ref output, .. }) if is_missing_rule(output) => {
            debug!(interface, "no qdisc to remove");
            Ok(())
        }
        other => other,
    }
}

/// Runs the real `tc` binary.
#[derive(Debug, Clone)]
pub struct TcCommand {
    program: String,
}

impl TcCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<(), CommandError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running traffic control command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));
        Err(CommandError::Failed {
            command,
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        })
    }
}

impl Default for TcCommand {
    fn default() -> Self {
        Self::new("tc")
    }
}

#[async_trait]
impl TrafficControl for TcCommand {
    async fn install_delay(&self, interface: &str, delay_ms: u64) -> Result<(), CommandError> {
        self.run(&install_args(interface, delay_ms)).await
    }

    async fn clear_delay(&self, interface: &str) -> Result<(), CommandError> {
        tolerate_missing_rule(self.run(&clear_args(interface)).await, interface)
    }
}

const NOT_PERMITTED: &str = "RTNETLINK answers: Operation not permitted";
const NO_RULE: &str = "RTNETLINK answers: No such file or directory";

/// Records `tc` invocations without touching the host.
///
/// Used when the process lacks `CAP_NET_ADMIN`, and by tests that need to see
/// exactly which commands a fault issued.
#[derive(Debug, Default)]
pub struct DryRunTrafficControl {
    commands: Mutex<Vec<Vec<String>>>,
    fail_install: AtomicBool,
    fail_clear: AtomicBool,
    no_rule: AtomicBool,
}

impl DryRunTrafficControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every argument vector seen so far, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes subsequent installs fail as if `tc` rejected them.
    pub fn fail_install(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::Release);
    }

    /// Makes subsequent clears fail with an error other than "no rule".
    pub fn fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::Release);
    }

    /// Makes subsequent clears report that no root qdisc exists, as `tc`
    /// does on an interface without a delay installed.
    pub fn report_no_rule(&self, missing: bool) {
        self.no_rule.store(missing, Ordering::Release);
    }

    fn record(&self, args: Vec<String>, failure: Option<&str>) -> Result<(), CommandError> {
        let command = format!("tc {}", args.join(" "));
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args);

        if let Some(output) = failure {
            return Err(CommandError::Failed {
                command,
                status: "exit status: 2".to_string(),
                output: output.to_string(),
            });
        }
        info!(%command, "dry run: traffic control command skipped");
        Ok(())
    }
}

#[async_trait]
impl TrafficControl for DryRunTrafficControl {
    async fn install_delay(&self, interface: &str, delay_ms: u64) -> Result<(), CommandError> {
        let failure = self
            .fail_install
            .load(Ordering::Acquire)
            .then_some(NOT_PERMITTED);
        self.record(install_args(interface, delay_ms), failure)
    }

    async fn clear_delay(&self, interface: &str) -> Result<(), CommandError> {
        let failure = if self.fail_clear.load(Ordering::Acquire) {
            Some(NOT_PERMITTED)
        } else if self.no_rule.load(Ordering::Acquire) {
            Some(NO_RULE)
        } else {
            None
        };
        tolerate_missing_rule(self.record(clear_args(interface), failure), interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_install_args() {
        assert_eq!(
            install_args("eth0", 250).join(" "),
            "qdisc add dev eth0 root netem delay 250ms"
        );
    }

    #[test]
    fn test_clear_args() {
        assert_eq!(clear_args("lo").join(" "), "qdisc del dev lo root");
    }

    #[test_case("RTNETLINK answers: No such file or directory", true)]
    #[test_case("Error: Cannot delete qdisc with handle of zero.", true)]
    #[test_case("Error: No qdisc found", true)]
    #[test_case("RTNETLINK answers: Operation not permitted", false)]
    #[test_case("", false)]
    fn test_missing_rule_detection(output: &str, expected: bool) {
        assert_eq!(is_missing_rule(output), expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_program() {
        let tc = TcCommand::new("true");
        tc.install_delay("eth0", 100).await.unwrap();
        tc.clear_delay("eth0").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_reported() {
        let tc = TcCommand::new("false");
        let err = tc.install_delay("eth0", 100).await.unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
        assert!(tc.clear_delay("eth0").await.is_err());
    }

    /// A stand-in `tc` that prints `stderr` and exits with status 2.
    #[cfg(unix)]
    fn fake_tc(dir: &std::path::Path, stderr: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tc");
        std::fs::write(&path, format!("#!/bin/sh\necho '{stderr}' >&2\nexit 2\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clear_without_rule_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let tc = TcCommand::new(fake_tc(dir.path(), NO_RULE));

        tc.clear_delay("eth0").await.unwrap();
        // The same output on install is a real failure.
        assert!(matches!(
            tc.install_delay("eth0", 100).await,
            Err(CommandError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clear_other_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tc = TcCommand::new(fake_tc(dir.path(), NOT_PERMITTED));

        let err = tc.clear_delay("eth0").await.unwrap_err();
        assert!(err.to_string().contains("Operation not permitted"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let tc = TcCommand::new("faultbox-no-such-tc-binary");
        let err = tc.install_delay("eth0", 100).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_records_commands() {
        let tc = DryRunTrafficControl::new();
        tc.install_delay("eth0", 300).await.unwrap();
        tc.clear_delay("eth0").await.unwrap();

        let commands = tc.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], install_args("eth0", 300));
        assert_eq!(commands[1], clear_args("eth0"));
    }

    #[tokio::test]
    async fn test_dry_run_failure_switches() {
        let tc = DryRunTrafficControl::new();
        tc.fail_install(true);
        assert!(tc.install_delay("eth0", 300).await.is_err());
        tc.fail_clear(true);
        assert!(tc.clear_delay("eth0").await.is_err());
        assert_eq!(tc.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_clear_without_rule_succeeds() {
        let tc = DryRunTrafficControl::new();
        tc.report_no_rule(true);
        tc.clear_delay("eth0").await.unwrap();
        assert_eq!(tc.commands(), vec![clear_args("eth0")]);

        // A real failure still wins over the missing-rule report.
        tc.fail_clear(true);
        assert!(tc.clear_delay("eth0").await.is_err());
    }
}
