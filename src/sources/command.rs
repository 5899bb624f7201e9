//! Shell-out helper shared by the container runtime adapters

use std::io::ErrorKind;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{SourceError, SourceResult};

use super::CollectContext;

/// Run `program args...` and return its stdout
///
/// The child is killed if the calling future is dropped (e.g. by the scheduler's
/// per-source timeout). A missing binary or a non-zero exit is `Unavailable`,
/// output that is not UTF-8 is a `ParseFailure`.
pub async fn run(program: &str, args: &[&str], ctx: &CollectContext) -> SourceResult<String> {
    trace!("running {program} {}", args.join(" "));
    let started = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => SourceError::unavailable(format!("{program} not found")),
            _ => SourceError::unavailable(format!("failed to start {program}: {e}")),
        })?;

    let output = match tokio::time::timeout_at(ctx.deadline, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => return Err(SourceError::Timeout(started.elapsed())),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::unavailable(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| SourceError::parse(format!("{program} produced non UTF-8 output")))
}
