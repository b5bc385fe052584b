use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::command::map_spawn_err;
use crate::core::error::PrimitiveError;
use crate::core::hardware::PrimitiveResult;
use crate::logging::LogThrottle;

const PROGRAM: &str = "rsync";

// "  12,345,678   45%  10.2MB/s    0:00:05"
static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\d,]+)\s+(\d+)%").expect("valid progress regex"));

/// Bytes transferred and overall percentage from an `--info=progress2` line.
pub(super) fn parse_progress(line: &str) -> Option<(u64, u8)> {
    let caps = PROGRESS.captures(line)?;
    let bytes = caps[1].replace(',', "").parse().ok()?;
    let percent = caps[2].parse().ok()?;
    Some((bytes, percent))
}

/// Argument list for mirroring `src` onto `dst`.
///
/// Directories get trailing slashes so the contents of `src` land in `dst`
/// rather than in `dst/basename(src)`. Owner, group and permission bits are
/// not carried over; exFAT cannot store them.
pub(super) fn mirror_args(src: &Path, dst: &Path, is_dir: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-rltD",
        "--delete",
        "--no-owner",
        "--no-group",
        "--no-perms",
        "--info=progress2",
        "--",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    if is_dir {
        args.push(with_trailing_slash(src));
        args.push(with_trailing_slash(dst));
    } else {
        args.push(src.as_os_str().to_owned());
        args.push(dst.as_os_str().to_owned());
    }
    args
}

/// Exactly one trailing `/`, keeping the path's raw bytes.
fn with_trailing_slash(path: &Path) -> OsString {
    let bytes = path.as_os_str().as_bytes();
    let end = bytes.iter().rposition(|b| *b != b'/').map_or(0, |i| i + 1);
    let mut out = bytes[..end].to_vec();
    out.push(b'/');
    OsString::from_vec(out)
}

pub(super) async fn mirror(src: &Path, dst: &Path) -> PrimitiveResult<()> {
    let is_dir = tokio::fs::metadata(src).await?.is_dir();

    let mut child = Command::new(PROGRAM)
        .args(mirror_args(src, dst, is_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| map_spawn_err(PROGRAM, e))?;

    info!(src = %src.display(), dst = %dst.display(), "Mirror sync started");

    let stderr_task = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            if let Err(e) = stderr.read_to_string(&mut buf).await {
                debug!(error = %e, "Failed to read rsync stderr");
            }
            buf
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let throttle = LogThrottle::new(Duration::from_secs(2));
        let mut reader = BufReader::new(stdout);
        let mut line = Vec::new();
        let mut chunk = [0u8; 4096];

        // progress2 redraws with \r, so split on both terminators
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            for &b in &chunk[..n] {
                if b != b'\r' && b != b'\n' {
                    line.push(b);
                    continue;
                }
                if let Some((bytes, percent)) = parse_progress(&String::from_utf8_lossy(&line)) {
                    if throttle.should_log() {
                        debug!(bytes_copied = bytes, percent, "Mirror progress");
                    }
                }
                line.clear();
            }
        }
    }

    let status = child.wait().await?;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(PrimitiveError::CommandFailed {
            program: PROGRAM.to_string(),
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    info!(dst = %dst.display(), "Mirror sync finished");
    Ok(())
}
