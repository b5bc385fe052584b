//! Linux adapter tests against the real userland tools.
//!
//! Transfer tests run `cp`, `rsync`, `du` and `diff` on temp directories and
//! skip themselves when a tool is missing. Mount and format tests need root
//! plus losetup and mkfs.exfat.
//!
//! Run ignored tests: `sudo cargo test --test linux_adapter -- --ignored`

#![cfg(target_os = "linux")]

use std::path::{Path, PathBuf};
use std::process::Command;

use nix::unistd::Uid;
use stickcp::adapters::LinuxAdapter;
use stickcp::core::hardware::{CopyOps, FormatOps, InventoryOps, MountOps, TreeComparison, VerifyOps};
use stickcp::core::models::{MountPoint, TransferJob, VerifyOutcome};
use stickcp::core::{
    BindingPolicy, Device, FormatGuard, MountManager, TransferEngine, TransferError,
    TransferStrategy,
};
use tempfile::{NamedTempFile, TempDir, tempdir};

fn has_tools(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools.iter().filter(|t| which::which(t).is_err()).collect();
    if !missing.is_empty() {
        eprintln!("Skipping: missing {:?}", missing);
    }
    missing.is_empty()
}

fn is_root() -> bool {
    Uid::effective().is_root()
}

fn create_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Source tree with ten files across nested directories, plus an empty
/// directory standing in for the mounted destination.
fn fixture() -> (TempDir, PathBuf, MountPoint) {
    let temp = tempdir().unwrap();
    let source = temp.path().join("src").join("photos");
    for i in 0..10 {
        let sub = if i < 5 { "2024" } else { "2025/raw" };
        create_file(
            &source.join(sub).join(format!("img_{i:03}.jpg")),
            format!("image {i}").repeat(100 + i).as_bytes(),
        );
    }
    let mount = temp.path().join("stick");
    std::fs::create_dir_all(&mount).unwrap();
    (temp, source, MountPoint::new(mount))
}

#[tokio::test]
async fn test_copy_tree_verifies_and_rerun_still_matches() {
    if !has_tools(&["cp", "du", "diff"]) {
        return;
    }
    let (_temp, source, mount) = fixture();
    let adapter = LinuxAdapter::new();
    let engine = TransferEngine::new(&adapter);

    let mut job = TransferJob::new(&source, mount.clone(), TransferStrategy::VerbatimCopy);
    let first = engine.transfer(&mut job).await.unwrap();
    assert_eq!(job.outcome, VerifyOutcome::Match);
    assert_eq!(first.destination, mount.path().join("photos"));
    assert!(first.destination.join("2025/raw/img_009.jpg").is_file());

    let mut again = TransferJob::new(&source, mount.clone(), TransferStrategy::VerbatimCopy);
    engine.transfer(&mut again).await.unwrap();
    assert!(!first.destination.join("photos").exists(), "copy must not nest");
    assert_eq!(
        adapter.compare_trees(&source, &first.destination).await.unwrap(),
        TreeComparison::Identical
    );
}

#[tokio::test]
async fn test_copy_single_file() {
    if !has_tools(&["cp", "du", "diff"]) {
        return;
    }
    let temp = tempdir().unwrap();
    let file = temp.path().join("disk.img");
    create_file(&file, &[7u8; 4096]);
    let mount = MountPoint::new(temp.path().join("stick"));
    std::fs::create_dir_all(mount.path()).unwrap();

    let adapter = LinuxAdapter::new();
    let mut job = TransferJob::new(&file, mount.clone(), TransferStrategy::VerbatimCopy);
    let verified = TransferEngine::new(&adapter).transfer(&mut job).await.unwrap();

    assert_eq!(verified.destination, mount.path().join("disk.img"));
    assert_eq!(verified.destination_bytes, 4096);
}

#[tokio::test]
async fn test_mirror_removes_stale_entries() {
    if !has_tools(&["rsync", "du", "diff"]) {
        return;
    }
    let (_temp, source, mount) = fixture();
    let stale = mount.path().join("photos").join("deleted_long_ago.jpg");
    create_file(&stale, b"old");

    let adapter = LinuxAdapter::new();
    let mut job = TransferJob::new(&source, mount.clone(), TransferStrategy::MirrorSync);
    TransferEngine::new(&adapter).transfer(&mut job).await.unwrap();

    assert!(!stale.exists());
    assert!(mount.path().join("photos/2024/img_000.jpg").is_file());
    assert!(!mount.path().join("photos/photos").exists());
}

#[tokio::test]
async fn test_compare_detects_difference() {
    if !has_tools(&["cp", "diff"]) {
        return;
    }
    let (_temp, source, mount) = fixture();
    let dest = mount.path().join("photos");
    let adapter = LinuxAdapter::new();

    adapter.copy(&source, &dest, true).await.unwrap();
    std::fs::write(dest.join("2024/img_001.jpg"), b"tampered").unwrap();

    match adapter.compare_trees(&source, &dest).await.unwrap() {
        TreeComparison::Differs(report) => assert!(report.contains("img_001.jpg"), "{report}"),
        TreeComparison::Identical => panic!("tampered tree reported identical"),
    }
}

#[tokio::test]
async fn test_missing_source_is_copy_failure() {
    if !has_tools(&["cp"]) {
        return;
    }
    let (temp, _source, mount) = fixture();
    let adapter = LinuxAdapter::new();

    let mut job = TransferJob::new(temp.path().join("gone"), mount, TransferStrategy::VerbatimCopy);
    let err = TransferEngine::new(&adapter).transfer(&mut job).await.unwrap_err();

    assert!(matches!(err, TransferError::CopyFailed { .. }));
    assert_eq!(job.outcome, VerifyOutcome::NotYetRun);
}

#[tokio::test]
async fn test_byte_size_counts_apparent_bytes() {
    if !has_tools(&["du"]) {
        return;
    }
    let temp = tempdir().unwrap();
    let file = temp.path().join("blob");
    create_file(&file, &[0u8; 12345]);

    assert_eq!(LinuxAdapter::new().byte_size(&file).await.unwrap(), 12345);
}

#[tokio::test]
async fn test_list_devices() {
    if !has_tools(&["lsblk"]) {
        return;
    }
    let result = LinuxAdapter::new().list_devices().await;
    assert!(result.is_ok(), "list_devices should not error: {:?}", result.err());
}

/// Attach a zeroed image file to a free loop device.
fn setup_loopback(image: &Path, size_mb: u64) -> Option<String> {
    let status = Command::new("truncate")
        .args(["-s", &format!("{size_mb}M")])
        .arg(image)
        .status()
        .ok()?;
    if !status.success() {
        return None;
    }

    let output = Command::new("losetup")
        .arg("--find")
        .arg("--show")
        .arg(image)
        .output()
        .ok()?;
    if !output.status.success() {
        eprintln!("losetup failed: {}", String::from_utf8_lossy(&output.stderr));
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn teardown_loopback(loop_device: &str) {
    let _ = Command::new("losetup").args(["-d", loop_device]).output();
}

#[tokio::test]
#[ignore = "requires root privileges, losetup and mkfs.exfat"]
async fn test_format_mount_copy_unmount_on_loop_device() {
    if !is_root() || !has_tools(&["losetup", "mkfs.exfat", "blkid", "mount", "umount", "cp"]) {
        eprintln!("Skipping: requires root and loop device tools");
        return;
    }

    let image = NamedTempFile::new().unwrap();
    let Some(loop_device) = setup_loopback(image.path(), 64) else {
        eprintln!("Failed to set up loop device");
        return;
    };
    let device = Device::new(&loop_device);
    let adapter = LinuxAdapter::new();
    let mount_dir = tempdir().unwrap();
    let manager = MountManager::new(
        MountPoint::new(mount_dir.path().join("stick")),
        BindingPolicy::SameDevice,
        true,
    );

    let blank = adapter.probe_signature(device.path()).await;

    let guard = FormatGuard::new(&manager, Some("STICKCP".to_string()));
    let formatted = guard.format(&adapter, &device, |_| true).await;
    let signature = adapter.probe_signature(device.path()).await;

    let mounted = manager.ensure_mounted(&adapter, &device).await;
    let bound = adapter.bound_device(manager.mount_point().path()).await;

    let (_src_temp, source, _) = fixture();
    let mut job = TransferJob::new(&source, manager.mount_point().clone(), TransferStrategy::VerbatimCopy);
    let transferred = TransferEngine::new(&adapter).transfer(&mut job).await;

    let unmounted = manager.safe_unmount(&adapter, &device).await;
    let still_mounted = adapter.mounts_of(device.path()).await;

    teardown_loopback(&loop_device);

    assert_eq!(blank.unwrap(), None);
    formatted.unwrap();
    assert_eq!(signature.unwrap().and_then(|s| s.fs_type).as_deref(), Some("exfat"));
    mounted.unwrap();
    assert!(bound.unwrap().is_some());
    transferred.unwrap();
    unmounted.unwrap();
    assert!(still_mounted.unwrap().is_empty());
    assert!(!manager.mount_point().path().exists());
}
