use tracing::{info, warn};

use crate::core::error::FormatError;
use crate::core::hardware::{FormatOps, MountOps};
use crate::core::models::{ConfirmDecision, Device, FormatRequest, Signature};
use crate::core::mount::MountManager;

/// Gate in front of the destructive reformat primitive.
///
/// Order is fixed: unmount, probe, confirm (only if something is there),
/// format. A device is never reformatted underneath an active mount.
pub struct FormatGuard<'a> {
    mounts: &'a MountManager,
    label: Option<String>,
}

impl<'a> FormatGuard<'a> {
    pub fn new(mounts: &'a MountManager, label: Option<String>) -> Self {
        Self { mounts, label }
    }

    pub async fn probe_signature<A: FormatOps + ?Sized>(
        &self,
        ops: &A,
        device: &Device,
    ) -> Result<Option<Signature>, FormatError> {
        ops.probe_signature(device.path())
            .await
            .map_err(|cause| FormatError::ProbeFailed {
                device: device.path.clone(),
                cause,
            })
    }

    /// Irreversibly reformat `device` as exFAT.
    ///
    /// `confirm` is only consulted when the probe finds an existing
    /// signature; returning false stops before any mutation.
    pub async fn format<A, F>(
        &self,
        ops: &A,
        device: &Device,
        confirm: F,
    ) -> Result<FormatRequest, FormatError>
    where
        A: MountOps + FormatOps + ?Sized,
        F: FnOnce(&Signature) -> bool,
    {
        self.mounts.safe_unmount(ops, device).await?;

        let signature = self.probe_signature(ops, device).await?;

        let decision = match &signature {
            None => {
                info!(device = %device, "No existing signature found");
                ConfirmDecision::NotRequired
            }
            Some(sig) => {
                warn!(device = %device, signature = %sig, "Device has existing data");
                if confirm(sig) {
                    ConfirmDecision::Granted
                } else {
                    ConfirmDecision::Declined
                }
            }
        };

        let request = FormatRequest {
            device: device.clone(),
            signature,
            decision,
        };

        if let (ConfirmDecision::Declined, Some(sig)) = (request.decision, &request.signature) {
            info!(device = %device, "Format declined");
            return Err(FormatError::Declined {
                device: device.path.clone(),
                signature: sig.clone(),
            });
        }

        info!(device = %device, label = ?self.label, "Formatting device as exFAT");
        ops.format_exfat(device.path(), self.label.as_deref())
            .await
            .map_err(|cause| FormatError::FormatFailed {
                device: device.path.clone(),
                cause,
            })?;

        info!(device = %device, "Format complete");
        Ok(request)
    }
}
