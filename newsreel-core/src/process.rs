use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Seam for external command execution so tests can substitute the
/// transcoder with a stub.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        command.output().await
    }
}

/// Runs a command through the executor, bounded by `limit`. The child is
/// spawned with kill-on-drop so an expired timeout does not leave a
/// stalled transcoder behind.
pub async fn run_bounded(
    executor: &dyn CommandExecutor,
    command: &mut Command,
    limit: Duration,
) -> std::io::Result<Output> {
    command.kill_on_drop(true);
    match timeout(limit, executor.run(command)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("command exceeded {limit:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_run_reports_timeout() {
        let executor = SystemCommandExecutor;
        let mut command = Command::new("sleep");
        command.arg("5");
        let err = run_bounded(&executor, &mut command, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn bounded_run_passes_through_output() {
        let executor = SystemCommandExecutor;
        let mut command = Command::new("true");
        let output = run_bounded(&executor, &mut command, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.status.success());
    }
}
