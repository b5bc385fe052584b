use std::ffi::OsStr;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::core::error::PrimitiveError;
use crate::core::hardware::PrimitiveResult;

pub(super) fn map_spawn_err(program: &str, err: std::io::Error) -> PrimitiveError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return PrimitiveError::CommandNotFound(program.to_string());
    }
    PrimitiveError::Io(err)
}

pub(super) fn failed(program: &str, output: &Output) -> PrimitiveError {
    PrimitiveError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Run to completion and capture output, whatever the exit status.
pub(super) async fn output<I, S>(program: &str, args: I) -> PrimitiveResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = ?cmd.as_std(), "Running");

    let output = cmd
        .output()
        .await
        .map_err(|e| map_spawn_err(program, e))?;

    debug!(program, code = ?output.status.code(), "Finished");
    Ok(output)
}

/// Run to completion; any non-zero exit is an error.
pub(super) async fn run<I, S>(program: &str, args: I) -> PrimitiveResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = output(program, args).await?;
    if !output.status.success() {
        return Err(failed(program, &output));
    }
    Ok(output)
}
