//! External command execution for uploaders and video compression

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt kept in an error message
const MAX_STDERR_CHARS: usize = 2_000;

/// Errors from running an external command
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Empty command")]
    Empty,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {code}: {stderr}")]
    Failed { program: String, code: i32, stderr: String },
}

/// Replace `{name}` placeholders in every argument
///
/// Substitution is per argument, so values containing spaces or newlines stay
/// a single argument and never go through a shell.
pub fn substitute(argv: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter()
                .fold(arg.clone(), |acc, (name, value)| acc.replace(&format!("{{{}}}", name), value))
        })
        .collect()
}

/// Run `argv` to completion and return its stdout
pub async fn run(argv: &[String], timeout: Duration) -> Result<String, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::Empty)?;
    debug!(%program, arg_count = args.len(), ?timeout, "exec::run: called");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            debug!(%program, error = %source, "exec::run: spawn failed");
            return Err(ExecError::Spawn {
                program: program.clone(),
                source,
            });
        }
        Err(_) => {
            debug!(%program, "exec::run: timed out");
            return Err(ExecError::Timeout {
                program: program.clone(),
                timeout,
            });
        }
    };

    if !output.status.success() {
        let stderr: String = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(MAX_STDERR_CHARS)
            .collect();
        debug!(%program, code = ?output.status.code(), "exec::run: command failed");
        return Err(ExecError::Failed {
            program: program.clone(),
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
