use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A block device node, e.g. `/dev/sdb1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub path: PathBuf,
}

impl Device {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The well-known binding location for whichever device is currently mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
}

impl MountPoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    MountedAt(Vec<PathBuf>),
}

/// Existing on-disk identification found by the signature probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub fs_type: Option<String>,
    pub partition_table: Option<String>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.fs_type, &self.partition_table) {
            (Some(fs), Some(pt)) => write!(f, "{} filesystem, {} partition table", fs, pt),
            (Some(fs), None) => write!(f, "{} filesystem", fs),
            (None, Some(pt)) => write!(f, "{} partition table", pt),
            (None, None) => write!(f, "unknown signature"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStrategy {
    /// `cp`-style recursive copy, overwriting in place.
    VerbatimCopy,
    /// `rsync`-style mirror that drops owner and permission metadata.
    MirrorSync,
}

impl TransferStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerbatimCopy => "verbatim-copy",
            Self::MirrorSync => "mirror-sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    NotYetRun,
    Match,
    Mismatch,
}

#[derive(Debug, Clone)]
pub struct TransferJob {
    pub job_id: String,
    pub source: PathBuf,
    pub mount_point: MountPoint,
    pub strategy: TransferStrategy,
    pub outcome: VerifyOutcome,
}

impl TransferJob {
    pub fn new(source: impl Into<PathBuf>, mount_point: MountPoint, strategy: TransferStrategy) -> Self {
        Self {
            job_id: uuid::Uuid::now_v7().to_string(),
            source: source.into(),
            mount_point,
            strategy,
            outcome: VerifyOutcome::NotYetRun,
        }
    }
}

/// Summary of a transfer whose destination matched its source.
#[derive(Debug, Clone)]
pub struct VerifiedTransfer {
    pub job_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub strategy: TransferStrategy,
    pub source_bytes: u64,
    pub destination_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    NotRequired,
    Granted,
    Declined,
}

#[derive(Debug, Clone)]
pub struct FormatRequest {
    pub device: Device,
    pub signature: Option<Signature>,
    pub decision: ConfirmDecision,
}
