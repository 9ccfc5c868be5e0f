//! Shell command execution for bootstrap steps.
//!
//! Every step command is a shell line (`sh -c` on Unix, `cmd /C` on Windows)
//! that inherits the terminal's stdout/stderr. A non-zero exit is an
//! [`DevbootError::ExternalCommandFailure`]; callers propagate it so the
//! bootstrap stops at the first broken step.
//!
//! On interrupt the child is sent SIGINT, given a grace period, then killed.
//! The server step runs in its own process group so the signal and the final
//! kill reach every process it started (reloaders, workers), not just `sh`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio::process::Child;

use crate::error::{DevbootError, Result};
use crate::signal::Interrupt;

/// How long an interrupted child gets to exit on its own before it is killed.
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// A terminal Ctrl+C reaches a foreground child and us together; give our
/// handler a moment to latch before judging a failed exit.
const INTERRUPT_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

/// Which processes an interrupt is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Child shares our process group and terminal; signal it directly.
    Child,
    /// Child leads its own process group; signal the whole group.
    Group,
}

/// Build a shell invocation for `line`. `args` are passed as positional
/// parameters after the line, never re-parsed by the shell.
pub fn shell(line: &str, args: &[String]) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        if args.is_empty() {
            cmd.args(["-c", line]);
        } else {
            cmd.arg("-c").arg(format!("{line} \"$@\"")).arg("devboot");
            cmd.args(args);
        }
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd.args(args);
        cmd
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub struct CommandRunner {
    root: PathBuf,
    envs: Vec<(String, String)>,
    grace: Duration,
}

impl CommandRunner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            envs: Vec::new(),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run `line` to completion, or until `interrupt` fires.
    pub async fn run(&self, line: &str, interrupt: &mut Interrupt) -> Result<RunOutcome> {
        self.execute(line, None, Scope::Child, interrupt).await
    }

    /// Run a long-lived server. Unlike [`run`](Self::run), the command gets
    /// its own process group, and an interrupt stops every process in it.
    /// The server no longer owns the terminal, so it cannot read stdin.
    pub async fn serve(&self, line: &str, interrupt: &mut Interrupt) -> Result<RunOutcome> {
        self.execute(line, None, Scope::Group, interrupt).await
    }

    /// Like [`run`](Self::run) but with stdout written to `dest` (truncated).
    pub async fn run_to_file(
        &self,
        line: &str,
        dest: &Path,
        interrupt: &mut Interrupt,
    ) -> Result<RunOutcome> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(dest)?;
        self.execute(line, Some(file), Scope::Child, interrupt).await
    }

    async fn execute(
        &self,
        line: &str,
        stdout: Option<File>,
        scope: Scope,
        interrupt: &mut Interrupt,
    ) -> Result<RunOutcome> {
        if interrupt.is_triggered() {
            return Ok(RunOutcome::Interrupted);
        }

        tracing::info!(command = %line, "executing");

        let mut cmd = shell(line, &[]);
        cmd.current_dir(&self.root).stdin(Stdio::inherit());
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        match stdout {
            Some(file) => cmd.stdout(Stdio::from(file)),
            None => cmd.stdout(Stdio::inherit()),
        };
        cmd.stderr(Stdio::inherit());
        #[cfg(unix)]
        if scope == Scope::Group {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);
        let mut child = cmd.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    return Ok(RunOutcome::Completed);
                }
                tokio::time::sleep(INTERRUPT_SETTLE).await;
                if interrupt.is_triggered() {
                    return Ok(RunOutcome::Interrupted);
                }
                tracing::error!(command = %line, code = ?status.code(), "command failed");
                Err(DevbootError::ExternalCommandFailure {
                    command: line.to_string(),
                    code: status.code(),
                })
            }
            _ = interrupt.triggered() => {
                self.stop(line, &mut child, scope, interrupt).await;
                Ok(RunOutcome::Interrupted)
            }
        }
    }

    async fn stop(
        &self,
        line: &str,
        child: &mut Child,
        scope: Scope,
        interrupt: &mut Interrupt,
    ) {
        let pid = child.id();

        #[cfg(unix)]
        if let Some(pid) = pid {
            match send_signal(pid, "INT", scope) {
                Ok(()) => tracing::debug!(command = %line, pid, "forwarded interrupt"),
                Err(e) => {
                    tracing::debug!(command = %line, pid, error = %e, "could not forward interrupt")
                }
            }
        }

        let exited = tokio::select! {
            waited = tokio::time::timeout(self.grace, child.wait()) => waited.is_ok(),
            _ = interrupt.forced() => false,
        };
        if exited {
            tracing::debug!(command = %line, "child exited after interrupt");
        } else {
            tracing::warn!(command = %line, "child still running after interrupt, killing");
        }

        // Stragglers in the group outlive a shell that exited on SIGINT.
        #[cfg(unix)]
        if let (Some(pid), Scope::Group) = (pid, scope) {
            if let Err(e) = send_signal(pid, "KILL", scope) {
                tracing::debug!(command = %line, pid, error = %e, "process group already gone");
            }
        }
        #[cfg(not(unix))]
        let _ = (pid, scope);

        if !exited {
            if let Err(e) = child.kill().await {
                tracing::warn!(command = %line, error = %e, "kill failed");
            }
        }
    }
}

/// `kill -<signal> -- <pid>`, or `-<pid>` for the whole process group.
#[cfg(unix)]
fn send_signal(pid: u32, signal: &str, scope: Scope) -> std::io::Result<()> {
    let target = match scope {
        Scope::Child => pid.to_string(),
        Scope::Group => format!("-{pid}"),
    };
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg("--")
        .arg(&target)
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "kill -{signal} -- {target} failed with exit code {:?}",
            status.code()
        )));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn successful_command_completes() {
        let dir = TempDir::new().unwrap();
        let (_trigger, mut interrupt) = Interrupt::channel();
        let outcome = CommandRunner::new(dir.path())
            .run("true", &mut interrupt)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn non_zero_exit_is_command_failure() {
        let dir = TempDir::new().unwrap();
        let (_trigger, mut interrupt) = Interrupt::channel();
        let err = CommandRunner::new(dir.path())
            .run("exit 3", &mut interrupt)
            .await
            .unwrap_err();
        match err {
            DevbootError::ExternalCommandFailure { command, code } => {
                assert_eq!(command, "exit 3");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn runs_in_root_with_env() {
        let dir = TempDir::new().unwrap();
        let (_trigger, mut interrupt) = Interrupt::channel();
        CommandRunner::new(dir.path())
            .with_env("DEVBOOT_TEST_VALUE", "marker")
            .run("echo \"$DEVBOOT_TEST_VALUE\" > out.txt", &mut interrupt)
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written.trim(), "marker");
    }

    #[tokio::test]
    async fn run_to_file_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested/out.json");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "stale content that must disappear").unwrap();
        let (_trigger, mut interrupt) = Interrupt::channel();
        CommandRunner::new(dir.path())
            .run_to_file("echo '[]'", &dest, &mut interrupt)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "[]\n");
    }

    #[tokio::test]
    async fn interrupt_stops_long_running_command() {
        let dir = TempDir::new().unwrap();
        let (trigger, mut interrupt) = Interrupt::channel();
        let runner = CommandRunner::new(dir.path()).with_grace(Duration::from_millis(50));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        });
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run("sleep 30", &mut interrupt),
        )
        .await
        .expect("interrupt should end the run")
        .unwrap();
        assert_eq!(outcome, RunOutcome::Interrupted);
    }

    fn is_running(pid: &str) -> bool {
        // A reparented zombie still answers `kill -0`; read its state instead.
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            return stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z'));
        }
        if Path::new("/proc").is_dir() {
            return false;
        }
        Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    async fn wait_for_file(path: &Path) -> String {
        for _ in 0..200 {
            if let Ok(text) = std::fs::read_to_string(path) {
                if !text.trim().is_empty() {
                    return text.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[tokio::test]
    async fn serve_interrupt_reaches_every_descendant() {
        let dir = TempDir::new().unwrap();
        let (trigger, mut interrupt) = Interrupt::channel();
        let runner = CommandRunner::new(dir.path()).with_grace(Duration::from_millis(200));
        let pid_file = dir.path().join("server.pid");

        let run = runner.serve("sleep 300 & echo $! > server.pid; wait", &mut interrupt);
        let stop = async {
            let pid = wait_for_file(&pid_file).await;
            trigger.trigger();
            pid
        };
        let (outcome, server_pid) =
            tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(run, stop) })
                .await
                .expect("interrupt should end serving");
        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);

        let mut alive = true;
        for _ in 0..100 {
            alive = is_running(&server_pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive, "server process {server_pid} outlived the interrupt");
    }

    #[tokio::test]
    async fn serve_interrupt_is_forwarded_before_grace_expires() {
        let dir = TempDir::new().unwrap();
        let (trigger, mut interrupt) = Interrupt::channel();
        let runner = CommandRunner::new(dir.path()).with_grace(Duration::from_secs(30));

        let run = runner.serve(
            "trap 'echo stopped > stopped.txt; exit 0' INT; echo up > ready.txt; \
             while :; do sleep 1; done",
            &mut interrupt,
        );
        let stop = async {
            wait_for_file(&dir.path().join("ready.txt")).await;
            trigger.trigger();
        };
        let (outcome, ()) =
            tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(run, stop) })
                .await
                .expect("forwarded SIGINT should stop the server well before the grace period");
        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("stopped.txt")).unwrap(),
            "stopped\n"
        );
    }

    #[tokio::test]
    async fn forced_interrupt_skips_grace_period() {
        let dir = TempDir::new().unwrap();
        let (trigger, mut interrupt) = Interrupt::channel();
        let runner = CommandRunner::new(dir.path()).with_grace(Duration::from_secs(60));

        let run = runner.serve("trap '' INT; echo up > ready.txt; sleep 300", &mut interrupt);
        let stop = async {
            wait_for_file(&dir.path().join("ready.txt")).await;
            trigger.trigger();
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.force();
        };
        let (outcome, ()) =
            tokio::time::timeout(Duration::from_secs(10), async { tokio::join!(run, stop) })
                .await
                .expect("a forced interrupt should not wait out the grace period");
        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
    }

    #[tokio::test]
    async fn already_interrupted_skips_spawn() {
        let dir = TempDir::new().unwrap();
        let (trigger, mut interrupt) = Interrupt::channel();
        trigger.trigger();
        let outcome = CommandRunner::new(dir.path())
            .run("touch spawned", &mut interrupt)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Interrupted);
        assert!(!dir.path().join("spawned").exists());
    }

    #[test]
    fn shell_passes_args_positionally() {
        let dir = TempDir::new().unwrap();
        let output = shell("printf '%s|'", &["a b".to_string(), "c;rm -rf x".to_string()])
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "a b|c;rm -rf x|");
    }
}
