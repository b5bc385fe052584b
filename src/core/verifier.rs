use std::path::Path;

use tracing::{debug, info, warn};

use crate::core::hardware::{TreeComparison, VerifyOps};
use crate::core::models::VerifyOutcome;

/// Result of comparing a transferred artifact against its source.
#[derive(Debug)]
pub struct VerifyResult {
    pub outcome: VerifyOutcome,
    pub source_bytes: Option<u64>,
    pub destination_bytes: Option<u64>,
    /// Why the outcome is a mismatch; empty on match.
    pub detail: String,
}

/// Structural verification: measure both sides, then compare recursively.
///
/// A size difference alone is only logged; the recursive comparison decides
/// the outcome. Failing to read either side is a mismatch.
pub async fn verify_transfer<V: VerifyOps + ?Sized>(
    ops: &V,
    job_id: &str,
    source: &Path,
    destination: &Path,
) -> VerifyResult {
    info!(job_id = %job_id, destination = %destination.display(), "Starting verification");

    let source_bytes = measure(ops, source).await;
    let destination_bytes = measure(ops, destination).await;

    let (outcome, detail) = match (source_bytes, destination_bytes) {
        (None, _) => (VerifyOutcome::Mismatch, unreadable(source)),
        (_, None) => (VerifyOutcome::Mismatch, unreadable(destination)),
        (Some(s), Some(d)) => {
            if s != d {
                warn!(
                    job_id = %job_id,
                    source_bytes = s,
                    destination_bytes = d,
                    "Source and destination sizes differ"
                );
            }
            compare(ops, source, destination).await
        }
    };

    match outcome {
        VerifyOutcome::Match => info!(
            job_id = %job_id,
            bytes_verified = source_bytes.unwrap_or(0),
            "Verification complete"
        ),
        _ => info!(job_id = %job_id, detail = %detail, "Verification failed"),
    }

    VerifyResult {
        outcome,
        source_bytes,
        destination_bytes,
        detail,
    }
}

async fn compare<V: VerifyOps + ?Sized>(
    ops: &V,
    source: &Path,
    destination: &Path,
) -> (VerifyOutcome, String) {
    match ops.compare_trees(source, destination).await {
        Ok(TreeComparison::Identical) => (VerifyOutcome::Match, String::new()),
        Ok(TreeComparison::Differs(report)) => (VerifyOutcome::Mismatch, summarize(&report)),
        Err(e) => (VerifyOutcome::Mismatch, format!("comparison failed: {}", e)),
    }
}

fn unreadable(path: &Path) -> String {
    format!("could not measure {}", path.display())
}

async fn measure<V: VerifyOps + ?Sized>(ops: &V, path: &Path) -> Option<u64> {
    match ops.byte_size(path).await {
        Ok(size) => Some(size),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to measure size");
            None
        }
    }
}

/// Keep the first 10 lines of a difference report.
fn summarize(report: &str) -> String {
    let lines: Vec<&str> = report.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.is_empty() {
        return "trees differ".to_string();
    }

    let mut msg = lines.iter().take(10).copied().collect::<Vec<_>>().join("\n  - ");
    if lines.len() > 10 {
        msg.push_str(&format!("\n  ... and {} more", lines.len() - 10));
    }
    msg
}
