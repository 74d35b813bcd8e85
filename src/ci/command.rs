//! Running external commands with a timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Result of running an external command.
#[derive(Debug)]
pub struct CommandResult {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Raw stdout (may be binary, e.g. a zip archive).
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// How long the command took to run in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Why a command produced no [`CommandResult`].
#[derive(Debug)]
pub enum CommandError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
}

/// Run `program args...` with a timeout.
///
/// The child is killed when the timeout elapses.
pub async fn run_command_with_timeout(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandResult, CommandError> {
    let start = Instant::now();

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(CommandError::Spawn)?;

    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => {
            tracing::debug!(
                "{} {} exited with {:?} in {}ms",
                program,
                args.join(" "),
                output.status.code(),
                duration_ms
            );
            Ok(CommandResult {
                code: output.status.code(),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration_ms,
            })
        }
        Ok(Err(e)) => Err(CommandError::Wait(e)),
        Err(_) => Err(CommandError::TimedOut(timeout)),
    }
}
