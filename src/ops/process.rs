//! Child process helpers for the GDAL command-line tools

use crate::error::{BasinError, BasinResult};
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Combine stdout and stderr and keep the last `ERROR_TAIL_LINES` lines.
pub(crate) fn error_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > ERROR_TAIL_LINES {
        lines[total - ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Run a program to completion, returning stdout on success
///
/// A missing binary maps to `CommandFailed`, a non-zero exit to
/// `CommandExecution` carrying the tail of the output.
pub(crate) async fn run<I, S>(program: &str, args: I) -> BasinResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    let cmdline = format!(
        "{} {}",
        program,
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    debug!("Executing: {}", cmdline);

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| BasinError::command_failed(program, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(BasinError::command_exec(cmdline, error_tail(&stdout, &stderr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tail_keeps_last_lines() {
        let stdout: String = (0..80).map(|i| format!("line {}\n", i)).collect();
        let tail = error_tail(&stdout, "ERROR 1: boom");
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), ERROR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"ERROR 1: boom"));
    }

    #[test]
    fn error_tail_short_output_unchanged() {
        assert_eq!(error_tail("a\nb", "c"), "a\nb\nc");
    }

    #[tokio::test]
    async fn missing_program_is_command_failed() {
        let err = run("basin-no-such-program", ["--version"]).await.unwrap_err();
        assert!(matches!(err, BasinError::CommandFailed { .. }));
    }
}
