//! Seams to the external primitives the workflow orchestrates.
//!
//! Every call that touches a block device or the mount table goes through
//! one of these traits so the workflow can run against
//! [`SimulatedAdapter`](crate::adapters::SimulatedAdapter) in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::core::error::PrimitiveError;
use crate::core::models::Signature;

pub type PrimitiveResult<T> = Result<T, PrimitiveError>;

/// Result of a recursive content comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeComparison {
    Identical,
    /// The comparison found differences; holds the tool's report.
    Differs(String),
}

/// An attached block device as reported by the inventory primitive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockDevice {
    pub name: String,
    pub path: PathBuf,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub vendor: Option<String>,
    pub transport: Option<String>,
    pub size: Option<u64>,
    pub kind: Option<String>,
}

#[async_trait]
pub trait MountOps: Send + Sync {
    /// Create the mount point directory (and parents) if missing.
    async fn prepare_target(&self, target: &Path) -> PrimitiveResult<()>;

    /// Remove an empty, unbound mount point directory.
    async fn remove_target(&self, target: &Path) -> PrimitiveResult<()>;

    /// Bind `device` to the existing directory `target`.
    async fn mount(&self, device: &Path, target: &Path) -> PrimitiveResult<()>;

    /// Unmount every mount of `device`.
    async fn unmount(&self, device: &Path) -> PrimitiveResult<()>;

    /// Durability barrier for the filesystem containing `path`.
    async fn flush(&self, path: &Path) -> PrimitiveResult<()>;

    /// Device currently bound at `target`, if any.
    async fn bound_device(&self, target: &Path) -> PrimitiveResult<Option<PathBuf>>;

    /// Every path `device` is currently mounted at.
    async fn mounts_of(&self, device: &Path) -> PrimitiveResult<Vec<PathBuf>>;
}

#[async_trait]
pub trait CopyOps: Send + Sync {
    /// Copy `src` to exactly `dst`, overwriting whatever is there.
    async fn copy(&self, src: &Path, dst: &Path, recursive: bool) -> PrimitiveResult<()>;

    /// Make `dst` mirror `src` without preserving owner or permission metadata.
    async fn mirror_sync(&self, src: &Path, dst: &Path) -> PrimitiveResult<()>;
}

#[async_trait]
pub trait VerifyOps: Send + Sync {
    async fn byte_size(&self, path: &Path) -> PrimitiveResult<u64>;

    async fn compare_trees(&self, a: &Path, b: &Path) -> PrimitiveResult<TreeComparison>;
}

#[async_trait]
pub trait FormatOps: Send + Sync {
    /// Read-only probe. `None` means the device looks blank.
    async fn probe_signature(&self, device: &Path) -> PrimitiveResult<Option<Signature>>;

    async fn format_exfat(&self, device: &Path, label: Option<&str>) -> PrimitiveResult<()>;
}

#[async_trait]
pub trait InventoryOps: Send + Sync {
    async fn list_devices(&self) -> PrimitiveResult<Vec<BlockDevice>>;
}

/// Everything a full adapter provides.
pub trait HardwareAdapter: MountOps + CopyOps + VerifyOps + FormatOps + InventoryOps {
    fn name(&self) -> &'static str;
}
