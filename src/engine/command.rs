use super::ToolError;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Run an external tool to completion and return its combined stdout/stderr.
///
/// The child is killed if the returned future is dropped, so callers can bound it
/// with `tokio::time::timeout`. A non-zero exit becomes `ToolError::Failed` carrying
/// the combined output.
pub async fn run_tool<I, S>(program: &str, args: I) -> Result<String, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, args = ?cmd.as_std().get_args().collect::<Vec<_>>(), "executing");
    let started = Instant::now();

    let output = cmd.output().await.map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    debug!(
        program,
        status = %output.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool exited"
    );

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        });
    }

    Ok(combined)
}
