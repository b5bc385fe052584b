//! End-to-end workflows against the in-memory adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stickcp::adapters::SimulatedAdapter;
use stickcp::adapters::simulated::{FailPoint, Operation};
use stickcp::config::AppConfig;
use stickcp::context::AppContext;
use stickcp::core::capability::{AssumeAll, ToolLocator};
use stickcp::core::hardware::{FormatOps, TreeComparison, VerifyOps};
use stickcp::core::models::{MountState, Signature};
use stickcp::core::{
    BindingPolicy, Device, FormatError, MountError, Orchestrator, TransferError, TransferStrategy,
    WorkflowError,
};
use tempfile::TempDir;

const MOUNT_POINT: &str = "/mnt/stickcp-it";

fn orchestrator(sim: &SimulatedAdapter, policy: BindingPolicy) -> Orchestrator {
    orchestrator_with(sim, policy, Arc::new(AssumeAll))
}

fn orchestrator_with(
    sim: &SimulatedAdapter,
    policy: BindingPolicy,
    locator: Arc<dyn ToolLocator>,
) -> Orchestrator {
    let config = AppConfig {
        mount_point: PathBuf::from(MOUNT_POINT),
        binding_policy: policy,
        ..Default::default()
    };
    Orchestrator::new(AppContext::with_adapter(config, Arc::new(sim.clone()), locator))
}

/// A source tree with ten files.
fn ten_file_tree() -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("album");
    for i in 0..10 {
        let dir = root.join(format!("disc{}", i % 3));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("track{i:02}.flac")), vec![i as u8; 128]).unwrap();
    }
    let root = std::fs::canonicalize(root).unwrap();
    (temp, root)
}

fn exfat() -> Signature {
    Signature {
        fs_type: Some("exfat".to_string()),
        partition_table: Some("dos".to_string()),
    }
}

#[tokio::test]
async fn test_copy_matches_and_rerun_still_matches() {
    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();
    let device = Device::new("/dev/sim0");

    let first = orch
        .run_transfer(&source, &device, TransferStrategy::VerbatimCopy)
        .await
        .unwrap();
    assert_eq!(
        sim.compare_trees(&source, &first.destination).await.unwrap(),
        TreeComparison::Identical
    );

    let second = orch
        .run_transfer(&source, &device, TransferStrategy::VerbatimCopy)
        .await
        .unwrap();
    assert_eq!(first.destination, second.destination);
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(sim.count(|op| matches!(op, Operation::Copy { .. })), 2);
    assert!(!sim.is_mounted("/dev/sim0"));
}

#[tokio::test]
async fn test_mirror_workflow() {
    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();

    let verified = orch
        .run_transfer(&source, &Device::new("/dev/sim1"), TransferStrategy::MirrorSync)
        .await
        .unwrap();

    assert_eq!(verified.destination, Path::new(MOUNT_POINT).join("album"));
    assert!(sim.has_operation(|op| matches!(op, Operation::MirrorSync { .. })));
}

#[tokio::test]
async fn test_copy_failure_never_verifies() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.fail_next(FailPoint::Copy);
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();

    let err = orch
        .run_transfer(&source, &Device::new("/dev/sim0"), TransferStrategy::VerbatimCopy)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Transfer(TransferError::CopyFailed { .. })));
    assert!(!sim.has_operation(|op| matches!(op, Operation::CompareTrees { .. })));
    assert!(!sim.has_operation(|op| matches!(op, Operation::ByteSize { .. })));
}

#[tokio::test]
async fn test_mirror_failure_never_verifies_and_unmounts() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.fail_next(FailPoint::MirrorSync);
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();

    let err = orch
        .run_transfer(&source, &Device::new("/dev/sim1"), TransferStrategy::MirrorSync)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Transfer(TransferError::CopyFailed { .. })));
    let ops = sim.operations();
    let mirror_at = ops
        .iter()
        .position(|op| matches!(op, Operation::MirrorSync { .. }))
        .unwrap();
    assert!(!ops[mirror_at..]
        .iter()
        .any(|op| matches!(op, Operation::ByteSize { .. } | Operation::CompareTrees { .. })));
    assert!(!sim.is_mounted("/dev/sim1"));
}

#[tokio::test]
async fn test_mount_failure_stops_before_transfer() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.fail_next(FailPoint::Mount);
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();

    let err = orch
        .run_transfer(&source, &Device::new("/dev/sim0"), TransferStrategy::VerbatimCopy)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Mount(MountError::Failed { .. })));
    assert!(!sim.has_operation(|op| matches!(op, Operation::Copy { .. })));
    assert!(!sim.is_mounted("/dev/sim0"));
}

#[tokio::test]
async fn test_mismatch_is_reported() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.fail_next(FailPoint::CompareTrees);
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let (_temp, source) = ten_file_tree();

    let err = orch
        .run_transfer(&source, &Device::new("/dev/sim0"), TransferStrategy::VerbatimCopy)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Transfer(TransferError::VerificationFailed { .. })
    ));
}

#[tokio::test]
async fn test_ensure_mounted_twice_binds_once() {
    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let mounts = orch.mount_manager();
    let device = Device::new("/dev/sim0");

    mounts.ensure_mounted(&sim, &device).await.unwrap();
    mounts.ensure_mounted(&sim, &device).await.unwrap();

    assert_eq!(sim.count(|op| matches!(op, Operation::Mount { .. })), 1);
    assert_eq!(
        mounts.state(&sim, &device).await.unwrap(),
        MountState::MountedAt(vec![PathBuf::from(MOUNT_POINT)])
    );
}

#[tokio::test]
async fn test_safe_unmount_twice() {
    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let mounts = orch.mount_manager();
    let device = Device::new("/dev/sim0");

    mounts.ensure_mounted(&sim, &device).await.unwrap();
    mounts.safe_unmount(&sim, &device).await.unwrap();
    sim.clear_operations();

    mounts.safe_unmount(&sim, &device).await.unwrap();
    assert_eq!(sim.mutation_count(), 0);
    assert!(!sim.has_operation(|op| matches!(op, Operation::Flush { .. })));
}

#[tokio::test]
async fn test_foreign_binding_depends_on_policy() {
    let (_temp, source) = ten_file_tree();

    let sim = SimulatedAdapter::with_demo_devices();
    sim.mount_externally("/dev/sim1", MOUNT_POINT);
    let strict = orchestrator(&sim, BindingPolicy::SameDevice);
    let err = strict
        .run_transfer(&source, &Device::new("/dev/sim0"), TransferStrategy::VerbatimCopy)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Mount(MountError::WrongDevice { .. })));
    assert_eq!(sim.mutation_count(), 0);

    let sim = SimulatedAdapter::with_demo_devices();
    sim.mount_externally("/dev/sim1", MOUNT_POINT);
    let lenient = orchestrator(&sim, BindingPolicy::Any);
    let mounts = lenient.mount_manager();
    let mp = mounts.ensure_mounted(&sim, &Device::new("/dev/sim0")).await.unwrap();
    assert_eq!(mp.path(), Path::new(MOUNT_POINT));
    assert!(!sim.has_operation(|op| matches!(op, Operation::Mount { .. })));
}

#[tokio::test]
async fn test_format_declined_keeps_signature() {
    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);
    let device = Device::new("/dev/sim0");

    let err = orch.run_format(&device, |_| false).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Format(FormatError::Declined { ref signature, .. }) if *signature == exfat()));
    assert_eq!(sim.mutation_count(), 0);
    assert_eq!(
        sim.probe_signature(device.path()).await.unwrap(),
        Some(exfat())
    );
}

#[tokio::test]
async fn test_format_never_runs_on_mounted_device() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.mount_externally("/dev/sim0", "/media/user/STICK");
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);

    let request = orch
        .run_format(&Device::new("/dev/sim0"), |_| true)
        .await
        .unwrap();

    assert_eq!(request.signature, Some(exfat()));
    let ops = sim.operations();
    let format_at = ops
        .iter()
        .position(|op| matches!(op, Operation::FormatExfat { .. }))
        .unwrap();
    let unmount_at = ops
        .iter()
        .position(|op| matches!(op, Operation::Unmount { .. }))
        .unwrap();
    assert!(unmount_at < format_at);
    assert!(!sim.is_mounted("/dev/sim0"));
}

#[tokio::test]
async fn test_format_stops_when_device_busy() {
    let sim = SimulatedAdapter::with_demo_devices();
    sim.mount_externally("/dev/sim0", "/media/user/STICK");
    sim.set_busy("/dev/sim0", true);
    let orch = orchestrator(&sim, BindingPolicy::SameDevice);

    let err = orch
        .run_format(&Device::new("/dev/sim0"), |_| true)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Format(FormatError::UnmountFailed(_))));
    assert!(!sim.has_operation(|op| matches!(op, Operation::FormatExfat { .. })));
    assert_eq!(sim.signature_of("/dev/sim0"), Some(exfat()));
}

#[tokio::test]
async fn test_missing_tools_touch_nothing() {
    struct Bare;
    impl ToolLocator for Bare {
        fn locate(&self, _program: &str) -> Option<PathBuf> {
            None
        }
    }

    let sim = SimulatedAdapter::with_demo_devices();
    let orch = orchestrator_with(&sim, BindingPolicy::SameDevice, Arc::new(Bare));
    let (_temp, source) = ten_file_tree();

    let err = orch
        .run_transfer(&source, &Device::new("/dev/sim0"), TransferStrategy::VerbatimCopy)
        .await
        .unwrap_err();
    match err {
        WorkflowError::MissingCapabilities(missing) => assert_eq!(missing.names.len(), 5),
        other => panic!("unexpected error: {other}"),
    }

    assert!(orch.run_format(&Device::new("/dev/sim0"), |_| true).await.is_err());
    assert!(orch.list_devices().await.is_err());
    assert!(sim.operations().is_empty());
}
