use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Runs `command` to completion with captured output, or `None` if it
/// outlived `timeout`. The child is killed whenever the returned future is
/// dropped before it exits, which covers both the timeout and an aborted
/// caller.
pub async fn run_captured(mut command: Command, timeout: Duration) -> std::io::Result<Option<Output>> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(Some(output?)),
        Err(_) => Ok(None),
    }
}

/// Trimmed stderr, falling back to stdout when stderr is empty.
pub fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        format!("process exited with {}", output.status)
    } else {
        stdout
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_run_captured_success() {
        let output = run_captured(shell("echo hello"), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_captured_timeout() {
        let output = run_captured(shell("sleep 5"), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn test_diagnostics_prefers_stderr() {
        let output = run_captured(shell("echo out; echo boom >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert!(!output.status.success());
        assert_eq!(diagnostics(&output), "boom");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_io_error() {
        let command = Command::new("/definitely/not/a/program");
        assert!(run_captured(command, Duration::from_secs(1)).await.is_err());
    }
}
