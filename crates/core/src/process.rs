use std::process::Stdio;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::shell::ShellCommand;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub(crate) fn into_error(self, command: &ShellCommand) -> Error {
        Error::ExternalTool {
            command: command.script().to_string(),
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Runs a command with stdin closed and captures its output.
pub async fn output(command: &ShellCommand) -> Result<CommandOutput> {
    debug!(script = %command.script(), "running command");
    let output = command
        .to_command()
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    let result = CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(script = %command.script(), status = ?result.status, "command finished");
    Ok(result)
}

/// Runs a command and fails with [`Error::ExternalTool`] on a non-zero exit.
pub async fn run(command: &ShellCommand) -> Result<CommandOutput> {
    let result = output(command).await?;
    if result.success() {
        Ok(result)
    } else {
        warn!(script = %command.script(), status = ?result.status, "command failed");
        Err(result.into_error(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn environment_block_reaches_the_script() {
        let command = ShellCommand::new("printf '%s' \"$GREETING\"")
            .with_env(vec![("GREETING".into(), "hello".into())]);
        let result = run(&command).await.unwrap();
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_external_tool_error() {
        let command = ShellCommand::new("echo boom >&2; exit 3");
        match run(&command).await.unwrap_err() {
            Error::ExternalTool { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
