//! Command-level workflows: capability gate first, then the primitives.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{Instrument, error, info, info_span, warn};

use crate::context::AppContext;
use crate::core::capability::{
    Capability, CapabilityGate, copy_requirements, format_requirements, inventory_requirements,
    mirror_requirements,
};
use crate::core::error::WorkflowError;
use crate::core::format::FormatGuard;
use crate::core::hardware::BlockDevice;
use crate::core::models::{
    Device, FormatRequest, MountPoint, Signature, TransferJob, TransferStrategy, VerifiedTransfer,
};
use crate::core::mount::MountManager;
use crate::core::transfer_engine::{TransferEngine, resolve_source};

pub struct Orchestrator {
    ctx: AppContext,
    mounts: MountManager,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        let mounts = MountManager::new(
            MountPoint::new(&ctx.config.mount_point),
            ctx.config.binding_policy,
            ctx.config.remove_mount_point,
        );
        Self { ctx, mounts }
    }

    pub fn mount_manager(&self) -> &MountManager {
        &self.mounts
    }

    fn gate(&self, required: &BTreeSet<Capability>) -> Result<(), WorkflowError> {
        CapabilityGate::new(self.ctx.locator.as_ref()).verify(required)?;
        Ok(())
    }

    /// Mount `device`, transfer `source` onto it, verify, unmount.
    ///
    /// If the transfer fails the device is still unmounted on a best-effort
    /// basis and the transfer error is what gets reported.
    pub async fn run_transfer(
        &self,
        source: &Path,
        device: &Device,
        strategy: TransferStrategy,
    ) -> Result<VerifiedTransfer, WorkflowError> {
        let required = match strategy {
            TransferStrategy::VerbatimCopy => copy_requirements(),
            TransferStrategy::MirrorSync => mirror_requirements(),
        };
        self.gate(&required)?;

        // A bad source must not leave the device mounted.
        let source = resolve_source(source).await?;

        let ops = self.ctx.adapter.as_ref();
        let mount_point = self.mounts.ensure_mounted(ops, device).await?;

        let mut job = TransferJob::new(source, mount_point, strategy);
        let span = info_span!("job", job_id = %job.job_id, device = %device);

        self.transfer_and_unmount(&mut job, device)
            .instrument(span)
            .await
    }

    async fn transfer_and_unmount(
        &self,
        job: &mut TransferJob,
        device: &Device,
    ) -> Result<VerifiedTransfer, WorkflowError> {
        let ops = self.ctx.adapter.as_ref();

        match TransferEngine::new(ops).transfer(job).await {
            Ok(verified) => {
                self.mounts.safe_unmount(ops, device).await?;
                info!(
                    destination = %verified.destination.display(),
                    bytes = verified.source_bytes,
                    "Job complete"
                );
                Ok(verified)
            }
            Err(e) => {
                error!(error = %e, outcome = ?job.outcome, "Job failed");
                if let Err(unmount) = self.mounts.safe_unmount(ops, device).await {
                    warn!(error = %unmount, "Cleanup unmount failed, device left mounted");
                }
                Err(e.into())
            }
        }
    }

    /// Reformat `device` as exFAT behind the signature probe and `confirm`.
    pub async fn run_format<F>(
        &self,
        device: &Device,
        confirm: F,
    ) -> Result<FormatRequest, WorkflowError>
    where
        F: FnOnce(&Signature) -> bool,
    {
        self.gate(&format_requirements())?;

        let guard = FormatGuard::new(&self.mounts, self.ctx.config.format_label.clone());
        let request = guard
            .format(self.ctx.adapter.as_ref(), device, confirm)
            .instrument(info_span!("format", device = %device))
            .await?;
        Ok(request)
    }

    pub async fn list_devices(&self) -> Result<Vec<BlockDevice>, WorkflowError> {
        self.gate(&inventory_requirements())?;

        self.ctx
            .adapter
            .list_devices()
            .await
            .map_err(WorkflowError::Inventory)
    }
}
