//! In-memory adapter that records operations without touching hardware.
//!
//! Models devices, the mount table, signatures and which destination was
//! written from which source, so workflows can be exercised end to end in
//! tests and with `--simulation`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::error::PrimitiveError;
use crate::core::hardware::{
    BlockDevice, CopyOps, FormatOps, HardwareAdapter, InventoryOps, MountOps, PrimitiveResult,
    TreeComparison, VerifyOps,
};
use crate::core::models::Signature;

/// A recorded primitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    PrepareTarget { target: PathBuf },
    RemoveTarget { target: PathBuf },
    Mount { device: PathBuf, target: PathBuf },
    Unmount { device: PathBuf },
    Flush { path: PathBuf },
    BoundDevice { target: PathBuf },
    MountsOf { device: PathBuf },
    Copy { src: PathBuf, dst: PathBuf, recursive: bool },
    MirrorSync { src: PathBuf, dst: PathBuf },
    ByteSize { path: PathBuf },
    CompareTrees { a: PathBuf, b: PathBuf },
    ProbeSignature { device: PathBuf },
    FormatExfat { device: PathBuf, label: Option<String> },
    ListDevices,
}

impl Operation {
    /// Whether the call changes device, mount or destination state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::PrepareTarget { .. }
                | Self::RemoveTarget { .. }
                | Self::Mount { .. }
                | Self::Unmount { .. }
                | Self::Copy { .. }
                | Self::MirrorSync { .. }
                | Self::FormatExfat { .. }
        )
    }
}

/// Primitive that should fail the next time it is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Mount,
    Flush,
    Copy,
    MirrorSync,
    ByteSize,
    CompareTrees,
    ProbeSignature,
    Format,
    ListDevices,
}

#[derive(Debug, Clone, Default)]
struct SimDevice {
    signature: Option<Signature>,
    busy: bool,
    size: u64,
}

#[derive(Debug, Default)]
struct SimState {
    operations: Vec<Operation>,
    devices: BTreeMap<PathBuf, SimDevice>,
    /// (device, target) pairs, in mount order.
    mounts: Vec<(PathBuf, PathBuf)>,
    /// destination -> source it was last written from
    written: HashMap<PathBuf, PathBuf>,
    corrupted: HashSet<PathBuf>,
    sizes: HashMap<PathBuf, u64>,
    pending_failures: Vec<FailPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedAdapter {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two attached sticks: one already carrying exFAT, one blank.
    pub fn with_demo_devices() -> Self {
        let sim = Self::new();
        sim.add_device(
            "/dev/sim0",
            Some(Signature {
                fs_type: Some("exfat".to_string()),
                partition_table: Some("dos".to_string()),
            }),
        );
        sim.add_device("/dev/sim1", None);
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_device(&self, path: impl Into<PathBuf>, signature: Option<Signature>) {
        self.lock().devices.insert(
            path.into(),
            SimDevice {
                signature,
                busy: false,
                size: 64 * 1024 * 1024 * 1024,
            },
        );
    }

    /// A busy device refuses to unmount.
    pub fn set_busy(&self, path: impl AsRef<Path>, busy: bool) {
        if let Some(dev) = self.lock().devices.get_mut(path.as_ref()) {
            dev.busy = busy;
        }
    }

    /// Bind `device` at `target` behind the workflow's back.
    pub fn mount_externally(&self, device: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.lock().mounts.push((device.into(), target.into()));
    }

    pub fn fail_next(&self, point: FailPoint) {
        self.lock().pending_failures.push(point);
    }

    /// Make comparisons against `path` report a difference until it is
    /// written again.
    pub fn corrupt(&self, path: impl Into<PathBuf>) {
        self.lock().corrupted.insert(path.into());
    }

    pub fn set_byte_size(&self, path: impl Into<PathBuf>, size: u64) {
        self.lock().sizes.insert(path.into(), size);
    }

    pub fn signature_of(&self, device: impl AsRef<Path>) -> Option<Signature> {
        self.lock()
            .devices
            .get(device.as_ref())
            .and_then(|d| d.signature.clone())
    }

    pub fn is_mounted(&self, device: impl AsRef<Path>) -> bool {
        let device = device.as_ref();
        self.lock().mounts.iter().any(|(d, _)| d == device)
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    pub fn count(&self, check: impl Fn(&Operation) -> bool) -> usize {
        self.lock().operations.iter().filter(|&op| check(op)).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.count(Operation::is_mutating)
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }
}

impl SimState {
    fn record(&mut self, op: Operation) {
        self.operations.push(op);
    }

    fn take_failure(&mut self, point: FailPoint) -> bool {
        match self.pending_failures.iter().position(|p| *p == point) {
            Some(idx) => {
                self.pending_failures.remove(idx);
                true
            }
            None => false,
        }
    }

    fn source_size(&self, path: &Path) -> u64 {
        if let Some(size) = self.sizes.get(path) {
            return *size;
        }
        match self.written.get(path) {
            Some(src) if !self.corrupted.contains(path) => self.sizes.get(src).copied().unwrap_or(0),
            _ => 0,
        }
    }
}

fn io_error() -> PrimitiveError {
    PrimitiveError::Io(std::io::Error::from_raw_os_error(libc::EIO))
}

fn command_failed(program: &str, code: i32, stderr: String) -> PrimitiveError {
    PrimitiveError::CommandFailed {
        program: program.to_string(),
        code: Some(code),
        stderr,
    }
}

#[async_trait]
impl MountOps for SimulatedAdapter {
    async fn prepare_target(&self, target: &Path) -> PrimitiveResult<()> {
        self.lock().record(Operation::PrepareTarget {
            target: target.to_path_buf(),
        });
        Ok(())
    }

    async fn remove_target(&self, target: &Path) -> PrimitiveResult<()> {
        self.lock().record(Operation::RemoveTarget {
            target: target.to_path_buf(),
        });
        Ok(())
    }

    async fn mount(&self, device: &Path, target: &Path) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
        });

        if state.take_failure(FailPoint::Mount) {
            return Err(command_failed("mount", 32, "wrong fs type, bad superblock".into()));
        }
        if !state.devices.contains_key(device) {
            return Err(command_failed(
                "mount",
                32,
                format!("special device {} does not exist", device.display()),
            ));
        }

        state.mounts.push((device.to_path_buf(), target.to_path_buf()));
        Ok(())
    }

    async fn unmount(&self, device: &Path) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::Unmount {
            device: device.to_path_buf(),
        });

        if state.devices.get(device).is_some_and(|d| d.busy) {
            return Err(command_failed(
                "umount",
                32,
                format!("{}: target is busy", device.display()),
            ));
        }

        state.mounts.retain(|(d, _)| d != device);
        Ok(())
    }

    async fn flush(&self, path: &Path) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::Flush {
            path: path.to_path_buf(),
        });
        if state.take_failure(FailPoint::Flush) {
            return Err(io_error());
        }
        Ok(())
    }

    async fn bound_device(&self, target: &Path) -> PrimitiveResult<Option<PathBuf>> {
        let mut state = self.lock();
        state.record(Operation::BoundDevice {
            target: target.to_path_buf(),
        });
        Ok(state
            .mounts
            .iter()
            .rev()
            .find(|(_, t)| t == target)
            .map(|(d, _)| d.clone()))
    }

    async fn mounts_of(&self, device: &Path) -> PrimitiveResult<Vec<PathBuf>> {
        let mut state = self.lock();
        state.record(Operation::MountsOf {
            device: device.to_path_buf(),
        });
        Ok(state
            .mounts
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[async_trait]
impl CopyOps for SimulatedAdapter {
    async fn copy(&self, src: &Path, dst: &Path, recursive: bool) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::Copy {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            recursive,
        });
        if state.take_failure(FailPoint::Copy) {
            return Err(io_error());
        }
        state.written.insert(dst.to_path_buf(), src.to_path_buf());
        state.corrupted.remove(dst);
        Ok(())
    }

    async fn mirror_sync(&self, src: &Path, dst: &Path) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::MirrorSync {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
        if state.take_failure(FailPoint::MirrorSync) {
            return Err(command_failed("rsync", 23, "some files could not be transferred".into()));
        }
        state.written.insert(dst.to_path_buf(), src.to_path_buf());
        state.corrupted.remove(dst);
        Ok(())
    }
}

#[async_trait]
impl VerifyOps for SimulatedAdapter {
    async fn byte_size(&self, path: &Path) -> PrimitiveResult<u64> {
        let mut state = self.lock();
        state.record(Operation::ByteSize {
            path: path.to_path_buf(),
        });
        if state.take_failure(FailPoint::ByteSize) {
            return Err(io_error());
        }
        Ok(state.source_size(path))
    }

    async fn compare_trees(&self, a: &Path, b: &Path) -> PrimitiveResult<TreeComparison> {
        let mut state = self.lock();
        state.record(Operation::CompareTrees {
            a: a.to_path_buf(),
            b: b.to_path_buf(),
        });
        if state.take_failure(FailPoint::CompareTrees) {
            return Err(io_error());
        }

        if state.corrupted.contains(b) {
            return Ok(TreeComparison::Differs(format!(
                "Files {} and {} differ",
                a.display(),
                b.display()
            )));
        }
        if a == b || state.written.get(b).is_some_and(|src| src == a) {
            return Ok(TreeComparison::Identical);
        }
        Ok(TreeComparison::Differs(format!(
            "Only in {}: {}",
            a.parent().unwrap_or(a).display(),
            a.file_name().unwrap_or_default().to_string_lossy()
        )))
    }
}

#[async_trait]
impl FormatOps for SimulatedAdapter {
    async fn probe_signature(&self, device: &Path) -> PrimitiveResult<Option<Signature>> {
        let mut state = self.lock();
        state.record(Operation::ProbeSignature {
            device: device.to_path_buf(),
        });
        if state.take_failure(FailPoint::ProbeSignature) {
            return Err(io_error());
        }
        match state.devices.get(device) {
            Some(dev) => Ok(dev.signature.clone()),
            None => Err(command_failed(
                "blkid",
                4,
                format!("error: {}: No such file or directory", device.display()),
            )),
        }
    }

    async fn format_exfat(&self, device: &Path, label: Option<&str>) -> PrimitiveResult<()> {
        let mut state = self.lock();
        state.record(Operation::FormatExfat {
            device: device.to_path_buf(),
            label: label.map(str::to_string),
        });

        if state.take_failure(FailPoint::Format) {
            return Err(command_failed("mkfs.exfat", 1, "write failed".into()));
        }
        if state.mounts.iter().any(|(d, _)| d == device) {
            return Err(command_failed(
                "mkfs.exfat",
                1,
                format!("{} is mounted", device.display()),
            ));
        }

        let dev = state.devices.get_mut(device).ok_or_else(|| {
            command_failed(
                "mkfs.exfat",
                1,
                format!("{}: No such file or directory", device.display()),
            )
        })?;
        dev.signature = Some(Signature {
            fs_type: Some("exfat".to_string()),
            partition_table: None,
        });
        Ok(())
    }
}

#[async_trait]
impl InventoryOps for SimulatedAdapter {
    async fn list_devices(&self) -> PrimitiveResult<Vec<BlockDevice>> {
        let mut state = self.lock();
        state.record(Operation::ListDevices);
        if state.take_failure(FailPoint::ListDevices) {
            return Err(io_error());
        }
        Ok(state
            .devices
            .iter()
            .map(|(path, dev)| BlockDevice {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.clone(),
                model: Some("Simulated Flash".to_string()),
                serial: None,
                vendor: Some("SIM".to_string()),
                transport: Some("usb".to_string()),
                size: Some(dev.size),
                kind: Some("disk".to_string()),
            })
            .collect())
    }
}

impl HardwareAdapter for SimulatedAdapter {
    fn name(&self) -> &'static str {
        "simulated"
    }
}
