//! Adapter backed by the standard Linux userland tools.

mod command;
mod inventory;
mod mount_table;
mod rsync;

use std::ffi::OsStr;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::errno::Errno;
use tracing::{debug, info};

use crate::core::error::PrimitiveError;
use crate::core::hardware::{
    BlockDevice, CopyOps, FormatOps, HardwareAdapter, InventoryOps, MountOps, PrimitiveResult,
    TreeComparison, VerifyOps,
};
use crate::core::models::Signature;
use crate::core::mount::resolve_node;

const PROC_MOUNTS: &str = "/proc/self/mounts";
const SYS_BLOCK: &str = "/sys/class/block";

pub struct LinuxAdapter {
    mount_table: PathBuf,
    sys_block: PathBuf,
}

impl LinuxAdapter {
    pub fn new() -> Self {
        Self::with_mount_table(PROC_MOUNTS)
    }

    /// Read mounts from somewhere other than `/proc/self/mounts`.
    pub fn with_mount_table(path: impl Into<PathBuf>) -> Self {
        Self {
            mount_table: path.into(),
            sys_block: PathBuf::from(SYS_BLOCK),
        }
    }

    /// Look up partitions somewhere other than `/sys/class/block`.
    pub fn with_sys_block(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_block = path.into();
        self
    }

    /// Mount table with device sources resolved to their real nodes.
    async fn mount_entries(&self) -> PrimitiveResult<Vec<mount_table::MountEntry>> {
        let table = tokio::fs::read_to_string(&self.mount_table).await?;
        let mut entries = mount_table::parse(&table);
        for entry in &mut entries {
            if entry.source.starts_with("/dev") {
                entry.source = resolve_node(&entry.source).await;
            }
        }
        Ok(entries)
    }

    /// `device` plus every partition the kernel lists under it, so a whole
    /// disk counts as mounted while any of its partitions is.
    async fn device_family(&self, device: &Path) -> Vec<PathBuf> {
        let node = resolve_node(device).await;
        let mut family = vec![node.clone()];

        let (Some(name), Some(dev_dir)) = (node.file_name(), node.parent()) else {
            return family;
        };
        let name = name.to_string_lossy().into_owned();

        let Ok(mut children) = tokio::fs::read_dir(self.sys_block.join(&name)).await else {
            return family;
        };
        while let Ok(Some(child)) = children.next_entry().await {
            let child = child.file_name().to_string_lossy().into_owned();
            if child.len() > name.len() && child.starts_with(&name) {
                family.push(dev_dir.join(child));
            }
        }

        family[1..].sort();
        debug!(device = %device.display(), nodes = ?family, "Resolved device family");
        family
    }

    async fn targets_of(&self, device: &Path) -> PrimitiveResult<Vec<PathBuf>> {
        let family = self.device_family(device).await;
        Ok(mount_table::targets_of(&self.mount_entries().await?, &family))
    }
}

impl Default for LinuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MountOps for LinuxAdapter {
    async fn prepare_target(&self, target: &Path) -> PrimitiveResult<()> {
        tokio::fs::create_dir_all(target).await?;
        Ok(())
    }

    async fn remove_target(&self, target: &Path) -> PrimitiveResult<()> {
        tokio::fs::remove_dir(target).await?;
        Ok(())
    }

    async fn mount(&self, device: &Path, target: &Path) -> PrimitiveResult<()> {
        command::run("mount", [device.as_os_str(), target.as_os_str()]).await?;
        info!(device = %device.display(), target = %target.display(), "Mounted");
        Ok(())
    }

    async fn unmount(&self, device: &Path) -> PrimitiveResult<()> {
        let targets = self.targets_of(device).await?;

        // Innermost first for stacked mounts.
        for target in targets.iter().rev() {
            command::run("umount", [target.as_os_str()]).await?;
            info!(device = %device.display(), target = %target.display(), "Unmounted");
        }
        Ok(())
    }

    async fn flush(&self, path: &Path) -> PrimitiveResult<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> PrimitiveResult<()> {
            let dir = std::fs::File::open(&path)?;
            // SAFETY: the descriptor stays open for the duration of the call.
            Errno::result(unsafe { libc::syncfs(dir.as_raw_fd()) })
                .map_err(|e| PrimitiveError::Io(e.into()))?;
            debug!(path = %path.display(), "Filesystem flushed");
            Ok(())
        })
        .await
        .map_err(|e| PrimitiveError::Io(std::io::Error::other(e)))?
    }

    async fn bound_device(&self, target: &Path) -> PrimitiveResult<Option<PathBuf>> {
        let target = resolve_node(target).await;
        Ok(mount_table::bound_at(&self.mount_entries().await?, &target))
    }

    async fn mounts_of(&self, device: &Path) -> PrimitiveResult<Vec<PathBuf>> {
        self.targets_of(device).await
    }
}

#[async_trait]
impl CopyOps for LinuxAdapter {
    async fn copy(&self, src: &Path, dst: &Path, recursive: bool) -> PrimitiveResult<()> {
        // -T: treat dst as the destination itself, never as a parent.
        let flags: &[&str] = if recursive { &["-R", "-T", "--"] } else { &["-T", "--"] };
        let args = flags
            .iter()
            .map(OsStr::new)
            .chain([src.as_os_str(), dst.as_os_str()]);
        command::run("cp", args).await?;
        Ok(())
    }

    async fn mirror_sync(&self, src: &Path, dst: &Path) -> PrimitiveResult<()> {
        rsync::mirror(src, dst).await
    }
}

#[async_trait]
impl VerifyOps for LinuxAdapter {
    async fn byte_size(&self, path: &Path) -> PrimitiveResult<u64> {
        let out = command::run("du", [OsStr::new("-sb"), OsStr::new("--"), path.as_os_str()]).await?;
        parse_du(&String::from_utf8_lossy(&out.stdout))
    }

    async fn compare_trees(&self, a: &Path, b: &Path) -> PrimitiveResult<TreeComparison> {
        let out = command::output(
            "diff",
            [OsStr::new("-r"), OsStr::new("-q"), OsStr::new("--"), a.as_os_str(), b.as_os_str()],
        )
        .await?;

        match out.status.code() {
            Some(0) => Ok(TreeComparison::Identical),
            Some(1) => Ok(TreeComparison::Differs(
                String::from_utf8_lossy(&out.stdout).into_owned(),
            )),
            _ => Err(command::failed("diff", &out)),
        }
    }
}

#[async_trait]
impl FormatOps for LinuxAdapter {
    async fn probe_signature(&self, device: &Path) -> PrimitiveResult<Option<Signature>> {
        let out = command::output(
            "blkid",
            [OsStr::new("-p"), OsStr::new("-o"), OsStr::new("export"), device.as_os_str()],
        )
        .await?;

        match out.status.code() {
            Some(0) => Ok(parse_blkid_export(&String::from_utf8_lossy(&out.stdout))),
            // Nothing recognisable on the device.
            Some(2) => Ok(None),
            _ => Err(command::failed("blkid", &out)),
        }
    }

    async fn format_exfat(&self, device: &Path, label: Option<&str>) -> PrimitiveResult<()> {
        let mut args: Vec<&OsStr> = Vec::new();
        if let Some(label) = label {
            args.push(OsStr::new("-L"));
            args.push(OsStr::new(label));
        }
        args.push(device.as_os_str());

        command::run("mkfs.exfat", args).await?;
        info!(device = %device.display(), "exFAT filesystem created");
        Ok(())
    }
}

#[async_trait]
impl InventoryOps for LinuxAdapter {
    async fn list_devices(&self) -> PrimitiveResult<Vec<BlockDevice>> {
        let out = command::run("lsblk", inventory::LSBLK_ARGS).await?;
        inventory::parse(&String::from_utf8_lossy(&out.stdout))
    }
}

impl HardwareAdapter for LinuxAdapter {
    fn name(&self) -> &'static str {
        "linux"
    }
}

/// First field of `du -sb` output: "4096\t/path".
fn parse_du(stdout: &str) -> PrimitiveResult<u64> {
    stdout
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| PrimitiveError::Parse {
            program: "du".to_string(),
            detail: format!("unexpected output: {:?}", stdout.trim()),
        })
}

/// `TYPE` and `PTTYPE` from `blkid -o export` key=value lines.
fn parse_blkid_export(stdout: &str) -> Option<Signature> {
    let mut signature = Signature {
        fs_type: None,
        partition_table: None,
    };

    for line in stdout.lines() {
        match line.trim().split_once('=') {
            Some(("TYPE", v)) if !v.is_empty() => signature.fs_type = Some(v.to_string()),
            Some(("PTTYPE", v)) if !v.is_empty() => signature.partition_table = Some(v.to_string()),
            _ => {}
        }
    }

    if signature.fs_type.is_none() && signature.partition_table.is_none() {
        None
    } else {
        Some(signature)
    }
}
