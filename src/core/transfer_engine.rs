use std::path::{Path, PathBuf};

use tracing::{Instrument, info, info_span};

use crate::core::error::{PrimitiveError, TransferError};
use crate::core::hardware::{CopyOps, MountOps, VerifyOps};
use crate::core::models::{TransferJob, TransferStrategy, VerifiedTransfer, VerifyOutcome};
use crate::core::verifier::verify_transfer;

/// Moves a source onto the mounted destination and verifies the result.
///
/// The destination artifact is always `mount_point/basename(source)`.
/// Copies overwrite in place: a crash mid-transfer can leave a partial
/// destination, and a failed verification is reported, never rolled back.
pub struct TransferEngine<'a, A: ?Sized> {
    ops: &'a A,
}

impl<'a, A> TransferEngine<'a, A>
where
    A: MountOps + CopyOps + VerifyOps + ?Sized,
{
    pub fn new(ops: &'a A) -> Self {
        Self { ops }
    }

    pub async fn transfer(&self, job: &mut TransferJob) -> Result<VerifiedTransfer, TransferError> {
        let span = info_span!(
            "transfer",
            job_id = %job.job_id,
            strategy = job.strategy.as_str(),
            source = %job.source.display()
        );

        async {
            job.source = resolve_source(&job.source).await?;
            let destination = self.write(job).await?;

            let result = verify_transfer(self.ops, &job.job_id, &job.source, &destination).await;
            job.outcome = result.outcome;

            if result.outcome != VerifyOutcome::Match {
                return Err(TransferError::VerificationFailed {
                    source_path: job.source.clone(),
                    destination,
                    detail: result.detail,
                });
            }

            info!(destination = %destination.display(), "Transfer verified");

            Ok(VerifiedTransfer {
                job_id: job.job_id.clone(),
                source: job.source.clone(),
                destination,
                strategy: job.strategy,
                source_bytes: result.source_bytes.unwrap_or(0),
                destination_bytes: result.destination_bytes.unwrap_or(0),
            })
        }
        .instrument(span)
        .await
    }

    /// Run the strategy's primitive and flush. Returns the destination artifact.
    async fn write(&self, job: &TransferJob) -> Result<PathBuf, TransferError> {
        let copy_failed = |cause| TransferError::CopyFailed {
            source_path: job.source.clone(),
            cause,
        };

        let destination =
            destination_for(&job.source, job.mount_point.path()).map_err(copy_failed)?;

        let metadata = tokio::fs::metadata(&job.source)
            .await
            .map_err(|e| copy_failed(PrimitiveError::Io(e)))?;

        info!(destination = %destination.display(), "Starting transfer");

        match job.strategy {
            TransferStrategy::VerbatimCopy => {
                self.ops
                    .copy(&job.source, &destination, metadata.is_dir())
                    .await
                    .map_err(copy_failed)?;
            }
            TransferStrategy::MirrorSync => {
                self.ops
                    .mirror_sync(&job.source, &destination)
                    .await
                    .map_err(copy_failed)?;
            }
        }

        // Verification must see the device, not the page cache.
        self.ops
            .flush(job.mount_point.path())
            .await
            .map_err(copy_failed)?;

        Ok(destination)
    }
}

/// Absolute, symlink-free form of `source`, so `.` and `photos/..` get a
/// real name to copy to. Fails if the source does not exist or is `/`.
pub async fn resolve_source(source: &Path) -> Result<PathBuf, TransferError> {
    let copy_failed = |cause| TransferError::CopyFailed {
        source_path: source.to_path_buf(),
        cause,
    };

    let resolved = tokio::fs::canonicalize(source)
        .await
        .map_err(|e| copy_failed(PrimitiveError::Io(e)))?;

    if resolved.file_name().is_none() {
        return Err(copy_failed(no_file_name(&resolved)));
    }
    Ok(resolved)
}

fn no_file_name(path: &Path) -> PrimitiveError {
    PrimitiveError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{} has no file name to copy to", path.display()),
    ))
}

fn destination_for(source: &Path, mount_point: &Path) -> Result<PathBuf, PrimitiveError> {
    match source.file_name() {
        Some(name) => Ok(mount_point.join(name)),
        None => Err(no_file_name(source)),
    }
}
