//! Mount lifecycle for the single well-known mount point.
//!
//! `MountManager` owns the [`MountPoint`] handle for the duration of an
//! invocation. It does no locking: two processes driving the same mount
//! point at once is undefined, so callers that need concurrency must take
//! an external advisory lock (e.g. `flock(1)`) around the whole command.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{MountError, UnmountError};
use crate::core::hardware::MountOps;
use crate::core::models::{Device, MountPoint, MountState};

/// What `ensure_mounted` accepts when the mount point is already bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BindingPolicy {
    /// The bound device must be the requested one.
    #[default]
    SameDevice,
    /// Any existing binding counts as mounted.
    Any,
}

pub struct MountManager {
    mount_point: MountPoint,
    policy: BindingPolicy,
    remove_on_unmount: bool,
}

impl MountManager {
    pub fn new(mount_point: MountPoint, policy: BindingPolicy, remove_on_unmount: bool) -> Self {
        Self {
            mount_point,
            policy,
            remove_on_unmount,
        }
    }

    pub fn mount_point(&self) -> &MountPoint {
        &self.mount_point
    }

    pub async fn state<M: MountOps + ?Sized>(
        &self,
        ops: &M,
        device: &Device,
    ) -> Result<MountState, UnmountError> {
        let mounts = ops
            .mounts_of(device.path())
            .await
            .map_err(|cause| UnmountError {
                device: device.path.clone(),
                cause,
            })?;

        if mounts.is_empty() {
            Ok(MountState::Unmounted)
        } else {
            Ok(MountState::MountedAt(mounts))
        }
    }

    /// Bind `device` to the mount point unless it is already bound.
    pub async fn ensure_mounted<M: MountOps + ?Sized>(
        &self,
        ops: &M,
        device: &Device,
    ) -> Result<MountPoint, MountError> {
        let target = self.mount_point.path();

        let bound = ops
            .bound_device(target)
            .await
            .map_err(|cause| MountError::Failed {
                device: device.path.clone(),
                cause,
            })?;

        if let Some(bound) = bound {
            return self.accept_existing(device, bound).await;
        }

        ops.prepare_target(target)
            .await
            .map_err(|cause| MountError::Prepare {
                path: target.to_path_buf(),
                cause,
            })?;

        ops.mount(device.path(), target)
            .await
            .map_err(|cause| MountError::Failed {
                device: device.path.clone(),
                cause,
            })?;

        info!(device = %device, mount_point = %target.display(), "Mounted device");
        Ok(self.mount_point.clone())
    }

    async fn accept_existing(
        &self,
        device: &Device,
        bound: PathBuf,
    ) -> Result<MountPoint, MountError> {
        let target = self.mount_point.path();

        if same_node(&bound, device.path()).await {
            debug!(device = %device, mount_point = %target.display(), "Already mounted");
            return Ok(self.mount_point.clone());
        }

        match self.policy {
            BindingPolicy::Any => {
                warn!(
                    requested = %device,
                    bound = %bound.display(),
                    mount_point = %target.display(),
                    "Mount point is bound to a different device; using it anyway"
                );
                Ok(self.mount_point.clone())
            }
            BindingPolicy::SameDevice => Err(MountError::WrongDevice {
                device: device.path.clone(),
                mount_point: target.to_path_buf(),
                bound,
            }),
        }
    }

    /// Flush and unmount `device`. A device that is not mounted is a no-op.
    pub async fn safe_unmount<M: MountOps + ?Sized>(
        &self,
        ops: &M,
        device: &Device,
    ) -> Result<(), UnmountError> {
        let fail = |cause| UnmountError {
            device: device.path.clone(),
            cause,
        };

        let mounts = match self.state(ops, device).await? {
            MountState::Unmounted => {
                debug!(device = %device, "Device not mounted, nothing to unmount");
                return Ok(());
            }
            MountState::MountedAt(mounts) => mounts,
        };

        // Unmount must never queue writeback we cannot observe.
        for mount in &mounts {
            debug!(mount = %mount.display(), "Flushing filesystem");
            ops.flush(mount).await.map_err(fail)?;
        }

        ops.unmount(device.path()).await.map_err(fail)?;
        info!(device = %device, mounts = mounts.len(), "Unmounted device");

        let target = self.mount_point.path();
        if self.remove_on_unmount && contains_node(&mounts, target).await {
            if let Err(e) = ops.remove_target(target).await {
                warn!(mount_point = %target.display(), error = %e, "Failed to remove mount point");
            }
        }

        Ok(())
    }
}

/// Resolve symlinks like `/dev/disk/by-id/*` to the node they point at.
///
/// Relative names (`tmpfs`, `proc` in the mount table) and paths that do
/// not resolve are returned unchanged.
pub async fn resolve_node(path: &Path) -> PathBuf {
    if !path.is_absolute() {
        return path.to_path_buf();
    }
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

pub async fn same_node(a: &Path, b: &Path) -> bool {
    a == b || resolve_node(a).await == resolve_node(b).await
}

async fn contains_node(paths: &[PathBuf], target: &Path) -> bool {
    for path in paths {
        if same_node(path, target).await {
            return true;
        }
    }
    false
}
